//! X11 connection setup protocol
//!
//! This module handles the initial connection handshake between client and server.
//! Only the no-credential path is supported: the setup request carries empty
//! authorization fields, and a server asking for more authentication ends the
//! handshake.

use super::*;
use crate::resources::ResourceIdAllocator;
use std::io::{Read, Write};

/// Size of the fixed setup reply header
pub const SETUP_HEADER_SIZE: usize = 8;

/// Connection setup request from client
#[derive(Debug, Clone)]
pub struct SetupRequest {
    pub byte_order: ByteOrder,
    pub protocol_major_version: u16,
    pub protocol_minor_version: u16,
}

impl SetupRequest {
    pub fn new(byte_order: ByteOrder) -> Self {
        SetupRequest {
            byte_order,
            protocol_major_version: PROTOCOL_MAJOR_VERSION,
            protocol_minor_version: PROTOCOL_MINOR_VERSION,
        }
    }

    /// Encode the 12-byte setup packet. The builder must use the same byte
    /// order the request announces.
    pub fn encode(&self, b: &mut Builder) {
        debug_assert_eq!(b.byte_order(), self.byte_order);
        b.add_u8(self.byte_order.marker())
            .add_u8(0)
            .add_u16(self.protocol_major_version)
            .add_u16(self.protocol_minor_version)
            .add_u16(0) // authorization protocol name length
            .add_u16(0) // authorization protocol data length
            .add_padding(2);
    }
}

/// Setup response status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStatus {
    Failed,
    Success,
    Authenticate,
    Unknown(u8),
}

impl SetupStatus {
    pub fn from_u8(status: u8) -> Self {
        match status {
            0 => SetupStatus::Failed,
            1 => SetupStatus::Success,
            2 => SetupStatus::Authenticate,
            other => SetupStatus::Unknown(other),
        }
    }
}

/// Fixed 8-byte header preceding every setup reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupReplyHeader {
    pub status: SetupStatus,
    /// Reason length for a failed setup, unused otherwise
    pub detail: u8,
    pub protocol_major_version: u16,
    pub protocol_minor_version: u16,
    /// Body length in 4-byte units
    pub length: u16,
}

impl SetupReplyHeader {
    pub fn parse(cursor: &mut Cursor<'_>) -> ClientResult<Self> {
        let status = SetupStatus::from_u8(cursor.read_u8()?);
        let detail = cursor.read_u8()?;
        let protocol_major_version = cursor.read_u16()?;
        let protocol_minor_version = cursor.read_u16()?;
        let length = cursor.read_u16()?;

        Ok(SetupReplyHeader {
            status,
            detail,
            protocol_major_version,
            protocol_minor_version,
            length,
        })
    }

    pub fn body_len(&self) -> usize {
        self.length as usize * 4
    }
}

/// What the client keeps from a successful setup reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupInfo {
    pub resource_id_base: u32,
    pub resource_id_mask: u32,
    pub vendor: String,
    pub maximum_request_length: u16,
    pub root: Window,
    pub root_visual: VisualID,
    pub root_depth: u8,
}

impl SetupInfo {
    /// Parse the body of a successful setup reply (everything after the
    /// 8-byte header). Only the first screen is examined.
    pub fn parse(body: &[u8], byte_order: ByteOrder) -> ClientResult<Self> {
        let mut cursor = Cursor::new(body, byte_order);

        cursor.skip(4)?; // release number
        let resource_id_base = cursor.read_u32()?;
        let resource_id_mask = cursor.read_u32()?;
        cursor.skip(4)?; // motion buffer size
        let vendor_len = cursor.read_u16()? as usize;
        let maximum_request_length = cursor.read_u16()?;
        cursor.skip(1)?; // number of screens
        let format_count = cursor.read_u8()? as usize;
        // image byte order, bitmap bit order, scanline unit, scanline pad
        cursor.skip(4)?;
        cursor.skip(2)?; // min/max keycode
        cursor.skip(4)?;

        let vendor = String::from_utf8_lossy(cursor.read_bytes(vendor_len)?).into_owned();
        cursor.skip(pad(vendor_len))?;
        cursor.skip(format_count * 8)?;

        // First screen
        let root = Window::new(cursor.read_u32()?);
        // default colormap, white pixel, black pixel, current input masks
        cursor.skip(16)?;
        // width/height in pixels and millimeters, min/max installed maps
        cursor.skip(12)?;
        let root_visual = VisualID::new(cursor.read_u32()?);
        cursor.skip(2)?; // backing stores, save unders
        let root_depth = cursor.read_u8()?;

        Ok(SetupInfo {
            resource_id_base,
            resource_id_mask,
            vendor,
            maximum_request_length,
            root,
            root_visual,
            root_depth,
        })
    }

    /// Fresh allocator over this connection's id range
    pub fn id_allocator(&self) -> ResourceIdAllocator {
        ResourceIdAllocator::new(self.resource_id_base, self.resource_id_mask)
    }
}

/// Progress of the connection handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Unsent,
    SentSetup,
    AwaitingReply,
    Authenticated,
    Rejected,
    NeedsFurtherAuth,
    UnknownStatus,
}

/// Client side of the connection setup exchange
#[derive(Debug)]
pub struct Handshake {
    byte_order: ByteOrder,
    state: HandshakeState,
}

impl Handshake {
    pub fn new(byte_order: ByteOrder) -> Self {
        Handshake {
            byte_order,
            state: HandshakeState::Unsent,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Run the whole exchange over `stream`, blocking until the server answers.
    pub fn perform<S: Read + Write>(&mut self, stream: &mut S) -> ClientResult<SetupInfo> {
        assert_eq!(self.state, HandshakeState::Unsent, "handshake already performed");

        let mut b = Builder::new(self.byte_order);
        SetupRequest::new(self.byte_order).encode(&mut b);
        stream.write_all(&b.finish()?)?;
        stream.flush()?;
        self.state = HandshakeState::SentSetup;
        log::debug!("Sent setup request ({:?})", self.byte_order);

        let mut raw = [0u8; SETUP_HEADER_SIZE];
        stream.read_exact(&mut raw)?;
        let header = SetupReplyHeader::parse(&mut Cursor::new(&raw, self.byte_order))?;
        self.state = HandshakeState::AwaitingReply;
        log::debug!(
            "Setup reply: status {:?}, protocol {}.{}, {} bytes follow",
            header.status,
            header.protocol_major_version,
            header.protocol_minor_version,
            header.body_len()
        );

        match header.status {
            SetupStatus::Success => {
                let body = read_body(stream, header.body_len())?;
                let info = SetupInfo::parse(&body, self.byte_order).inspect_err(|_| {
                    log::error!("Malformed setup reply:\n{}", hex_dump(&body));
                })?;
                self.state = HandshakeState::Authenticated;
                log::info!(
                    "Connected to {} (root 0x{:08x}, visual 0x{:x}, depth {})",
                    info.vendor,
                    info.root.id().get(),
                    info.root_visual.get(),
                    info.root_depth
                );
                Ok(info)
            }
            SetupStatus::Failed => {
                let body = read_body(stream, header.body_len())?;
                let len = (header.detail as usize).min(body.len());
                let reason = String::from_utf8_lossy(&body[..len]).into_owned();
                self.state = HandshakeState::Rejected;
                Err(ClientError::SetupFailed(reason))
            }
            SetupStatus::Authenticate => {
                let body = read_body(stream, header.body_len())?;
                let reason = String::from_utf8_lossy(&body);
                log::warn!("Server asks for authentication: {}", reason.trim_end_matches('\0'));
                self.state = HandshakeState::NeedsFurtherAuth;
                Err(ClientError::SetupNeedsAuth)
            }
            SetupStatus::Unknown(status) => {
                self.state = HandshakeState::UnknownStatus;
                Err(ClientError::SetupUnknownStatus(status))
            }
        }
    }
}

fn read_body<R: Read>(stream: &mut R, len: usize) -> ClientResult<Vec<u8>> {
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body)?;
    Ok(body)
}
