//! Server capabilities the session depends on
//!
//! The close protocol (`WM_PROTOCOLS` / `WM_DELETE_WINDOW`) and the major
//! opcodes of the Present, DRI3 and MIT-SHM extensions differ between servers.
//! They are gathered here once, either by asking the server or from a fixed
//! table, so request encoders only ever see a [`Capabilities`] value.

use crate::connection::read_reply;
use crate::protocol::*;
use std::io::{Read, Write};

pub const PRESENT_NAME: &str = "Present";
pub const DRI3_NAME: &str = "DRI3";
pub const SHM_NAME: &str = "MIT-SHM";

const EXTENSIONS: [&str; 3] = [PRESENT_NAME, DRI3_NAME, SHM_NAME];

/// Negotiated (or assumed) close-protocol atoms and extension opcodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub wm_protocols: Atom,
    pub wm_delete_window: Atom,
    pub present_opcode: Option<u8>,
    pub dri3_opcode: Option<u8>,
    pub shm_opcode: Option<u8>,
}

impl Capabilities {
    /// Values observed on a stock Xorg server. Nothing guarantees them on
    /// another server; use only when negotiation is switched off.
    pub fn assumed() -> Self {
        Capabilities {
            wm_protocols: Atom::new(441),
            wm_delete_window: Atom::new(439),
            present_opcode: Some(148),
            dri3_opcode: Some(149),
            shm_opcode: Some(130),
        }
    }

    /// Ask the server: two InternAtom and three QueryExtension requests,
    /// sent as one batch and answered in order.
    pub fn negotiate<S: Read + Write>(stream: &mut S, byte_order: ByteOrder) -> ClientResult<Self> {
        let mut b = Builder::new(byte_order);
        for name in ["WM_PROTOCOLS", "WM_DELETE_WINDOW"] {
            InternAtomRequest {
                only_if_exists: false,
                name: name.to_string(),
            }
            .encode(&mut b);
        }
        for name in EXTENSIONS {
            QueryExtensionRequest {
                name: name.to_string(),
            }
            .encode(&mut b);
        }
        stream.write_all(&b.finish()?)?;
        stream.flush()?;

        let mut atom = || -> ClientResult<Atom> {
            let reply = read_reply(stream, byte_order)?;
            Ok(InternAtomReply::parse(&mut Cursor::new(&reply, byte_order))?.atom)
        };
        let wm_protocols = atom()?;
        let wm_delete_window = atom()?;

        let mut opcodes = [None; 3];
        for (name, opcode) in EXTENSIONS.iter().zip(opcodes.iter_mut()) {
            let reply = read_reply(stream, byte_order)?;
            let ext = QueryExtensionReply::parse(&mut Cursor::new(&reply, byte_order))?;
            if ext.present {
                log::debug!("Extension {} has major opcode {}", name, ext.major_opcode);
                *opcode = Some(ext.major_opcode);
            } else {
                log::info!("Extension {} is not available", name);
            }
        }
        let [present_opcode, dri3_opcode, shm_opcode] = opcodes;

        Ok(Capabilities {
            wm_protocols,
            wm_delete_window,
            present_opcode,
            dri3_opcode,
            shm_opcode,
        })
    }

    pub fn present(&self) -> ClientResult<u8> {
        self.present_opcode.ok_or(ClientError::MissingExtension(PRESENT_NAME))
    }

    pub fn dri3(&self) -> ClientResult<u8> {
        self.dri3_opcode.ok_or(ClientError::MissingExtension(DRI3_NAME))
    }

    pub fn shm(&self) -> ClientResult<u8> {
        self.shm_opcode.ok_or(ClientError::MissingExtension(SHM_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor as IoCursor};

    struct Scripted {
        input: IoCursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn atom_reply(b: &mut Builder, sequence: u16, atom: u32) {
        b.add_u8(1)
            .add_u8(0)
            .add_u16(sequence)
            .add_u32(0)
            .add_u32(atom)
            .add_padding(20);
    }

    fn extension_reply(b: &mut Builder, sequence: u16, present: bool, opcode: u8) {
        b.add_u8(1)
            .add_u8(0)
            .add_u16(sequence)
            .add_u32(0)
            .add_u8(present as u8)
            .add_u8(opcode)
            .add_u8(0)
            .add_u8(0)
            .add_padding(20);
    }

    #[test]
    fn test_negotiate() {
        let mut b = Builder::new(ByteOrder::LSBFirst);
        atom_reply(&mut b, 1, 300);
        atom_reply(&mut b, 2, 301);
        extension_reply(&mut b, 3, true, 150);
        extension_reply(&mut b, 4, true, 151);
        extension_reply(&mut b, 5, false, 0);

        let mut stream = Scripted {
            input: IoCursor::new(b.finish().unwrap()),
            written: Vec::new(),
        };
        let caps = Capabilities::negotiate(&mut stream, ByteOrder::LSBFirst).unwrap();

        assert_eq!(caps.wm_protocols, Atom::new(300));
        assert_eq!(caps.wm_delete_window, Atom::new(301));
        assert_eq!(caps.present().unwrap(), 150);
        assert_eq!(caps.dri3().unwrap(), 151);
        assert!(matches!(caps.shm(), Err(ClientError::MissingExtension("MIT-SHM"))));

        // InternAtom x2 (20 + 24 bytes), QueryExtension x3 (16 + 12 + 16 bytes)
        assert_eq!(stream.written.len(), 20 + 24 + 16 + 12 + 16);
        assert_eq!(stream.written[0], RequestOpcode::InternAtom as u8);
        assert_eq!(&stream.written[8..20], b"WM_PROTOCOLS");
    }

    #[test]
    fn test_negotiate_server_error() {
        let mut record = vec![0u8; 32];
        record[1] = 11; // BadAlloc
        let mut stream = Scripted {
            input: IoCursor::new(record),
            written: Vec::new(),
        };
        assert!(matches!(
            Capabilities::negotiate(&mut stream, ByteOrder::MSBFirst),
            Err(ClientError::Server(ServerError { code: 11, .. }))
        ));
    }

    #[test]
    fn test_assumed() {
        let caps = Capabilities::assumed();
        assert_eq!(caps.wm_protocols, Atom::new(441));
        assert_eq!(caps.wm_delete_window, Atom::new(439));
        assert_eq!(caps.present().unwrap(), 148);
        assert_eq!(caps.dri3().unwrap(), 149);
    }
}
