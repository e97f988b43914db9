//! X11 protocol error codes and client error handling

use super::cursor::Cursor;
use std::fmt;
use std::io;

/// X11 error codes as defined in the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    Request = 1,
    Value = 2,
    Window = 3,
    Pixmap = 4,
    Atom = 5,
    Cursor = 6,
    Font = 7,
    Match = 8,
    Drawable = 9,
    Access = 10,
    Alloc = 11,
    Colormap = 12,
    GContext = 13,
    IDChoice = 14,
    Name = 15,
    Length = 16,
    Implementation = 17,
}

impl ErrorCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(ErrorCode::Request),
            2 => Some(ErrorCode::Value),
            3 => Some(ErrorCode::Window),
            4 => Some(ErrorCode::Pixmap),
            5 => Some(ErrorCode::Atom),
            6 => Some(ErrorCode::Cursor),
            7 => Some(ErrorCode::Font),
            8 => Some(ErrorCode::Match),
            9 => Some(ErrorCode::Drawable),
            10 => Some(ErrorCode::Access),
            11 => Some(ErrorCode::Alloc),
            12 => Some(ErrorCode::Colormap),
            13 => Some(ErrorCode::GContext),
            14 => Some(ErrorCode::IDChoice),
            15 => Some(ErrorCode::Name),
            16 => Some(ErrorCode::Length),
            17 => Some(ErrorCode::Implementation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Request => "Request: bad request code",
            ErrorCode::Value => "Value: integer parameter out of range",
            ErrorCode::Window => "Window: invalid Window parameter",
            ErrorCode::Pixmap => "Pixmap: invalid Pixmap parameter",
            ErrorCode::Atom => "Atom: invalid Atom parameter",
            ErrorCode::Cursor => "Cursor: invalid Cursor parameter",
            ErrorCode::Font => "Font: invalid Font parameter",
            ErrorCode::Match => "Match: parameter mismatch",
            ErrorCode::Drawable => "Drawable: invalid Drawable parameter",
            ErrorCode::Access => "Access: attempt to access private resource",
            ErrorCode::Alloc => "Alloc: insufficient resources",
            ErrorCode::Colormap => "Colormap: invalid Colormap parameter",
            ErrorCode::GContext => "GContext: invalid GC parameter",
            ErrorCode::IDChoice => "IDChoice: invalid resource ID for this connection",
            ErrorCode::Name => "Name: font or color name doesn't exist",
            ErrorCode::Length => "Length: request length incorrect",
            ErrorCode::Implementation => "Implementation: server implementation error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error packet received from the server (32 bytes, leading byte 0)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Raw error code; extension errors fall outside [`ErrorCode`]
    pub code: u8,
    pub sequence: u16,
    pub bad_value: u32,
    pub minor_opcode: u16,
    pub major_opcode: u8,
}

impl ServerError {
    /// Decode an error record. The cursor must sit on the leading 0 byte.
    pub fn parse(cursor: &mut Cursor<'_>) -> ClientResult<Self> {
        cursor.skip(1)?; // error marker
        let code = cursor.read_u8()?;
        let sequence = cursor.read_u16()?;
        let bad_value = cursor.read_u32()?;
        let minor_opcode = cursor.read_u16()?;
        let major_opcode = cursor.read_u8()?;
        cursor.skip(21)?;

        Ok(ServerError {
            code,
            sequence,
            bad_value,
            minor_opcode,
            major_opcode,
        })
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match ErrorCode::from_u8(self.code) {
            Some(code) => write!(f, "X11 Error: {}", code)?,
            None => write!(f, "X11 Error: extension error {}", self.code)?,
        }
        write!(
            f,
            " (sequence: {}, value: 0x{:08x}, major: {}, minor: {})",
            self.sequence, self.bad_value, self.major_opcode, self.minor_opcode
        )
    }
}

/// Failure latched by a [`Builder`](super::Builder)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// A length-prefixed region (or a request, in 4-byte units) does not fit its length field
    #[error("length-prefixed region of {length} exceeds its {width}-byte length field")]
    PrefixOverflow { length: usize, width: usize },

    /// Buffer length plus write length wrapped around
    #[error("builder length overflow")]
    SizeOverflow,

    /// A fixed-capacity builder ran out of room
    #[error("write needs {needed} bytes but the fixed buffer holds {capacity}")]
    FixedCapacityExceeded { capacity: usize, needed: usize },
}

impl BuildError {
    /// True for both overflow flavours (prefix width and total size)
    pub fn is_overflow(&self) -> bool {
        matches!(self, BuildError::PrefixOverflow { .. } | BuildError::SizeOverflow)
    }
}

/// Everything that can end a client session
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("connection setup refused: {0}")]
    SetupFailed(String),

    #[error("server requires further authentication")]
    SetupNeedsAuth,

    #[error("unknown connection setup status {0}")]
    SetupUnknownStatus(u8),

    #[error("unexpected end of buffer at offset {offset}: needed {needed} bytes, {remaining} left")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("failed to build request: {0}")]
    BuildFailed(#[from] BuildError),

    #[error("{0}")]
    Server(ServerError),

    #[error("record announces {0} trailing bytes, the stream is out of sync")]
    RecordTooLong(usize),

    #[error("expected a reply but received a record of type {0}")]
    UnexpectedRecord(u8),

    #[error("extension {0} is not available on this server")]
    MissingExtension(&'static str),

    #[error("server buffer is {got:?}, expected {expected:?}")]
    BufferMismatch { expected: (u16, u16), got: (u16, u16) },

    #[error("server buffer holds {size} bytes but the image needs {needed}")]
    BufferTooSmall { needed: usize, size: usize },

    #[error("expected a file descriptor alongside the reply")]
    MissingFd,

    #[error("invalid display name {0:?}")]
    InvalidDisplay(String),

    #[cfg(unix)]
    #[error("system call failed: {0}")]
    Sys(#[from] nix::Error),
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
