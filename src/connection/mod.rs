//! Connection layer
//!
//! This module opens the transport to the X server (Unix socket or TCP) and
//! reads inbound traffic as whole records: 32 bytes, plus the trailing data
//! replies and generic events announce in their length field.

use crate::protocol::*;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;

#[cfg(unix)]
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// First TCP port; display N listens on 6000 + N
pub const X_TCP_PORT: u16 = 6000;

/// Parsed display name: `[host]:display[.screen]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayName {
    /// `None` for the local Unix socket
    pub host: Option<String>,
    pub display: u16,
    pub screen: u16,
}

impl DisplayName {
    pub fn parse(name: &str) -> ClientResult<Self> {
        let invalid = || ClientError::InvalidDisplay(name.to_string());

        let (host, rest) = name.rsplit_once(':').ok_or_else(invalid)?;
        let (display, screen) = match rest.split_once('.') {
            Some((display, screen)) => (display, Some(screen)),
            None => (rest, None),
        };

        let display = display.parse().map_err(|_| invalid())?;
        let screen = match screen {
            Some(screen) => screen.parse().map_err(|_| invalid())?,
            None => 0,
        };
        let host = match host {
            "" | "unix" => None,
            host => Some(host.to_string()),
        };

        Ok(DisplayName {
            host,
            display,
            screen,
        })
    }

    /// Display named by `$DISPLAY`, or `:0` when unset
    pub fn from_env() -> ClientResult<Self> {
        match std::env::var("DISPLAY") {
            Ok(name) if !name.is_empty() => Self::parse(&name),
            _ => Self::parse(":0"),
        }
    }

    #[cfg(unix)]
    pub fn socket_path(&self) -> String {
        format!("/tmp/.X11-unix/X{}", self.display)
    }

    pub fn tcp_port(&self) -> u16 {
        X_TCP_PORT.saturating_add(self.display)
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}.{}",
            self.host.as_deref().unwrap_or(""),
            self.display,
            self.screen
        )
    }
}

/// Connection type
pub enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Connection {
    /// Connect to the server for `display`
    pub fn open(display: &DisplayName) -> ClientResult<Self> {
        let connection = match &display.host {
            Some(host) => {
                let stream = TcpStream::connect((host.as_str(), display.tcp_port()))?;
                stream.set_nodelay(true)?;
                Connection::Tcp(stream)
            }
            #[cfg(unix)]
            None => Connection::Unix(connect_local(display)?),
            #[cfg(not(unix))]
            None => {
                let stream = TcpStream::connect(("127.0.0.1", display.tcp_port()))?;
                stream.set_nodelay(true)?;
                Connection::Tcp(stream)
            }
        };

        log::debug!("Connected to display {}", display);
        Ok(connection)
    }

    /// Write a batch of requests and flush it
    pub fn send(&mut self, bytes: &[u8]) -> ClientResult<()> {
        self.write_all(bytes)?;
        self.flush()?;
        Ok(())
    }

    /// Close both directions; later reads see end-of-stream
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Connection::Tcp(stream) => stream.shutdown(std::net::Shutdown::Both),
            #[cfg(unix)]
            Connection::Unix(stream) => stream.shutdown(std::net::Shutdown::Both),
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Connection::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Connection::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Connection::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Connection::Unix(stream) => stream.flush(),
        }
    }
}

#[cfg(unix)]
impl AsFd for Connection {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            Connection::Tcp(stream) => stream.as_fd(),
            Connection::Unix(stream) => stream.as_fd(),
        }
    }
}

/// Local connection: the abstract socket first on Linux, then the socket file
#[cfg(unix)]
fn connect_local(display: &DisplayName) -> ClientResult<UnixStream> {
    let path = display.socket_path();

    #[cfg(target_os = "linux")]
    {
        use nix::sys::socket::{connect, socket, AddressFamily, SockFlag, SockType, UnixAddr};
        use std::os::fd::AsRawFd;

        let fd = socket(
            AddressFamily::Unix,
            SockType::Stream,
            SockFlag::SOCK_CLOEXEC,
            None,
        )?;
        let addr = UnixAddr::new_abstract(path.as_bytes())?;
        match connect(fd.as_raw_fd(), &addr) {
            Ok(()) => return Ok(UnixStream::from(fd)),
            Err(e) => log::debug!("Abstract socket @{} unavailable: {}", path, e),
        }
    }

    Ok(UnixStream::connect(&path)?)
}

/// Read `buf.len()` bytes. Returns `Ok(false)` if the stream ended before
/// the first byte; ending later is a desynchronization error.
fn fill<R: Read>(stream: &mut R, buf: &mut [u8], offset: usize) -> ClientResult<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 && offset == 0 => return Ok(false),
            Ok(0) => {
                return Err(ClientError::UnexpectedEof {
                    offset: offset + filled,
                    needed: buf.len() - filled,
                    remaining: 0,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

/// Largest trailing data accepted after a record header. Nothing this client
/// asks for comes close; a bigger length means the stream is out of step.
pub const MAX_TRAILING_LEN: usize = 1 << 24;

/// Read the data following a record header, if it announces any
fn read_trailing<R: Read>(
    stream: &mut R,
    record: &mut Vec<u8>,
    byte_order: ByteOrder,
) -> ClientResult<()> {
    let extra = trailing_len(record, byte_order)?;
    if extra > MAX_TRAILING_LEN {
        log::error!(
            "Record announces {} trailing bytes:\n{}",
            extra,
            hex_dump(&record[..RECORD_SIZE])
        );
        return Err(ClientError::RecordTooLong(extra));
    }
    if extra > 0 {
        record.resize(RECORD_SIZE + extra, 0);
        fill(stream, &mut record[RECORD_SIZE..], RECORD_SIZE)?;
    }
    Ok(())
}

/// Read one inbound record. `Ok(None)` means the server closed the
/// connection cleanly.
pub fn read_record<R: Read>(stream: &mut R, byte_order: ByteOrder) -> ClientResult<Option<Vec<u8>>> {
    let mut record = vec![0u8; RECORD_SIZE];
    if !fill(stream, &mut record, 0)? {
        return Ok(None);
    }
    read_trailing(stream, &mut record, byte_order)?;
    Ok(Some(record))
}

/// Block until the next reply arrives. Events received meanwhile are
/// dropped; an error record fails the call.
pub fn read_reply<R: Read>(stream: &mut R, byte_order: ByteOrder) -> ClientResult<Vec<u8>> {
    loop {
        let record = read_record(stream, byte_order)?
            .ok_or_else(|| ClientError::Transport(io::ErrorKind::UnexpectedEof.into()))?;

        match record[0] {
            0 => {
                let error = ServerError::parse(&mut Cursor::new(&record, byte_order))?;
                return Err(ClientError::Server(error));
            }
            1 => return Ok(record),
            code => log::debug!("Dropping event {} while waiting for a reply", code),
        }
    }
}

/// Like [`read_reply`], but also collects the file descriptor the server
/// passes alongside the reply (SCM_RIGHTS).
#[cfg(unix)]
pub fn recv_reply_with_fd<S: Read + AsFd>(
    stream: &mut S,
    byte_order: ByteOrder,
) -> ClientResult<(Vec<u8>, OwnedFd)> {
    use nix::sys::socket::{self, ControlMessageOwned, MsgFlags, UnixAddr};
    use std::io::IoSliceMut;
    use std::os::fd::{AsRawFd, FromRawFd, RawFd};

    loop {
        let mut record = vec![0u8; RECORD_SIZE];
        let mut fds = Vec::new();

        let received = {
            let mut iovs = [IoSliceMut::new(&mut record)];
            let mut cmsg_fds = nix::cmsg_space!([RawFd; 4]);
            let resp = socket::recvmsg::<UnixAddr>(
                stream.as_fd().as_raw_fd(),
                &mut iovs,
                Some(&mut cmsg_fds),
                MsgFlags::empty(),
            )?;
            for msg in resp.cmsgs()? {
                match msg {
                    ControlMessageOwned::ScmRights(received) => {
                        for fd in received {
                            // SAFETY: fd was just received, and is recorded nowhere else
                            fds.push(unsafe { OwnedFd::from_raw_fd(fd) });
                        }
                    }
                    other => log::warn!("Unexpected control message: {:?}, ignoring", other),
                }
            }
            resp.bytes
        };

        if received == 0 {
            return Err(ClientError::Transport(io::ErrorKind::UnexpectedEof.into()));
        }
        fill(stream, &mut record[received..], received)?;
        read_trailing(stream, &mut record, byte_order)?;

        match record[0] {
            0 => {
                let error = ServerError::parse(&mut Cursor::new(&record, byte_order))?;
                return Err(ClientError::Server(error));
            }
            1 => {
                let fd = fds.into_iter().next().ok_or(ClientError::MissingFd)?;
                return Ok((record, fd));
            }
            code => log::debug!("Dropping event {} while waiting for a reply", code),
        }
    }
}
