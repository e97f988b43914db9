//! End-to-end session tests against an in-process fake X server
//!
//! The server side runs on a thread over a `UnixStream::pair` and speaks
//! just enough of the protocol to walk the client through setup, one
//! redraw, a close request and cleanup.

#![cfg(unix)]

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::thread;

use x11present::protocol::*;
use x11present::{CapabilitySource, ClientError, LoopExit, PresentMode, Session, SessionConfig};

const ROOT: u32 = 0x0000_0042;
const ID_BASE: u32 = 0x0020_0000;
const ID_MASK: u32 = 0x001F_FFFF;

struct FakeServer {
    stream: UnixStream,
    order: ByteOrder,
    sequence: u16,
}

impl FakeServer {
    fn new(stream: UnixStream, order: ByteOrder) -> Self {
        FakeServer {
            stream,
            order,
            sequence: 0,
        }
    }

    fn send(&mut self, b: Builder) {
        self.stream.write_all(&b.finish().unwrap()).unwrap();
    }

    fn read_exact(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        self.stream.read_exact(&mut buf).unwrap();
        buf
    }

    /// One request, header included
    fn read_request(&mut self) -> Vec<u8> {
        let mut request = self.read_exact(4);
        let units = Cursor::new(&request[2..4], self.order).read_u16().unwrap() as usize;
        assert!(units >= 1, "request with zero length");
        request.extend(self.read_exact(units * 4 - 4));
        self.sequence = self.sequence.wrapping_add(1);
        request
    }

    fn read_requests(&mut self, n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|_| self.read_request()).collect()
    }

    fn u32_at(&self, bytes: &[u8], offset: usize) -> u32 {
        Cursor::new(&bytes[offset..], self.order).read_u32().unwrap()
    }

    fn i16_at(&self, bytes: &[u8], offset: usize) -> i16 {
        Cursor::new(&bytes[offset..], self.order).read_i16().unwrap()
    }

    fn accept_setup(&mut self) {
        let request = self.read_exact(12);
        assert_eq!(request[0], self.order.marker());

        let mut b = Builder::new(self.order);
        b.add_u8(1).add_u8(0).add_u16(11).add_u16(0).add_u16(19);
        b.add_u32(1) // release
            .add_u32(ID_BASE)
            .add_u32(ID_MASK)
            .add_u32(0)
            .add_u16(4)
            .add_u16(0xffff)
            .add_u8(1)
            .add_u8(0)
            .add_padding(6)
            .add_padding(4)
            .add_bytes(b"Fake");
        b.add_u32(ROOT)
            .add_padding(16)
            .add_u16(1920)
            .add_u16(1080)
            .add_padding(8)
            .add_u32(0x21) // root visual
            .add_u8(0)
            .add_u8(0)
            .add_u8(24) // root depth
            .add_u8(0);
        self.send(b);
    }

    fn reject_setup(&mut self, reason: &str) {
        self.read_exact(12);
        let mut b = Builder::new(self.order);
        b.add_u8(0)
            .add_u8(reason.len() as u8)
            .add_u16(11)
            .add_u16(0)
            .add_u16(padded_len(reason.len()) as u16 / 4)
            .add_bytes(reason.as_bytes())
            .add_padding(pad(reason.len()));
        self.send(b);
    }

    fn reply_header(&self, b: &mut Builder, detail: u8) {
        b.add_u8(1).add_u8(detail).add_u16(self.sequence).add_u32(0);
    }

    /// Answer the negotiation batch: atoms 300/301, Present 150, DRI3 151, MIT-SHM 152
    fn negotiate(&mut self) {
        let mut b = Builder::new(self.order);
        for (atom, request) in [300u32, 301].into_iter().zip(self.read_requests(2)) {
            assert_eq!(request[0], 16);
            self.reply_header(&mut b, 0);
            b.add_u32(atom).add_padding(20);
        }
        for (opcode, request) in [150u8, 151, 152].into_iter().zip(self.read_requests(3)) {
            assert_eq!(request[0], 98);
            self.reply_header(&mut b, 0);
            b.add_u8(1).add_u8(opcode).add_u8(0).add_u8(0).add_padding(20);
        }
        self.send(b);
    }

    /// DRI3 BufferFromPixmap reply carrying a file as the "dma-buf"
    #[cfg(target_os = "linux")]
    fn send_buffer(&mut self, width: u16, height: u16) {
        use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags, UnixAddr};
        use std::io::IoSlice;
        use std::os::fd::AsRawFd;

        let stride = width as u32 * 4;
        let size = stride * height as u32;
        let path = std::env::temp_dir().join(format!(
            "x11present-session-{}-{}x{}",
            std::process::id(),
            width,
            height
        ));
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        file.set_len(size as u64).unwrap();
        std::fs::remove_file(&path).unwrap();

        let mut b = Builder::new(self.order);
        self.reply_header(&mut b, 1);
        b.add_u32(size)
            .add_u16(width)
            .add_u16(height)
            .add_u16(stride as u16)
            .add_u8(24)
            .add_u8(32)
            .add_padding(12);
        let reply = b.finish().unwrap();

        let fds = [file.as_raw_fd()];
        sendmsg::<UnixAddr>(
            self.stream.as_raw_fd(),
            &[IoSlice::new(&reply)],
            &[ControlMessage::ScmRights(&fds)],
            MsgFlags::empty(),
            None,
        )
        .unwrap();
    }

    fn expose(&mut self, window: u32, width: u16, height: u16) {
        let mut b = Builder::new(self.order);
        b.add_u8(12)
            .add_u8(0)
            .add_u16(self.sequence)
            .add_u32(window)
            .add_u16(0)
            .add_u16(0)
            .add_u16(width)
            .add_u16(height)
            .add_u16(0)
            .add_padding(14);
        self.send(b);
    }

    fn close_window(&mut self, window: u32, protocols: u32, delete: u32) {
        let mut b = Builder::new(self.order);
        b.add_u8(161)
            .add_u8(32)
            .add_u16(self.sequence)
            .add_u32(window)
            .add_u32(protocols)
            .add_u32(delete)
            .add_padding(16);
        self.send(b);
    }

    fn expect_eof(&mut self) {
        let mut rest = Vec::new();
        self.stream.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty(), "unexpected trailing bytes: {:?}", rest);
    }
}

fn opcodes(requests: &[Vec<u8>]) -> Vec<u8> {
    requests.iter().map(|r| r[0]).collect()
}

#[cfg(target_os = "linux")]
#[test]
fn test_present_session() {
    let (client, server) = UnixStream::pair().unwrap();
    let window = ID_BASE + 1;

    let handle = thread::spawn(move || {
        let mut srv = FakeServer::new(server, ByteOrder::MSBFirst);
        srv.accept_setup();
        srv.negotiate();

        let setup = srv.read_requests(2);
        assert_eq!(opcodes(&setup), vec![53, 151]);
        assert_eq!(setup[0][1], 24); // pixmap depth = root depth
        assert_eq!(srv.u32_at(&setup[0], 8), ROOT);
        assert_eq!(setup[1][1], 3);
        assert_eq!(srv.u32_at(&setup[1], 4), ID_BASE);
        srv.send_buffer(64, 32);

        let batch = srv.read_requests(5);
        assert_eq!(opcodes(&batch), vec![1, 18, 18, 150, 8]);
        assert_eq!(srv.u32_at(&batch[0], 4), window);
        assert_eq!(srv.u32_at(&batch[0], 8), ROOT);
        // WM_PROTOCOLS = [WM_DELETE_WINDOW]
        assert_eq!(srv.u32_at(&batch[1], 8), 300);
        assert_eq!(srv.u32_at(&batch[1], 24), 301);
        assert_eq!(&batch[2][24..28], b"test");
        assert_eq!(batch[3].len(), 72);
        assert_eq!(srv.u32_at(&batch[3], 12), 0);

        srv.expose(window, 800, 600);
        let redraw = srv.read_request();
        assert_eq!(redraw[..2], [150, 1]);
        assert_eq!(srv.u32_at(&redraw, 4), window);
        assert_eq!(srv.u32_at(&redraw, 8), ID_BASE);
        assert_eq!(srv.u32_at(&redraw, 12), 1);

        // unrelated client message, then the real close request
        srv.close_window(window, 300, 7);
        srv.close_window(window, 300, 301);

        let cleanup = srv.read_requests(2);
        assert_eq!(opcodes(&cleanup), vec![54, 4]);
        assert_eq!(srv.u32_at(&cleanup[1], 4), window);
        srv.expect_eof();
    });

    let config = SessionConfig {
        display: ":0".to_string(),
        width: 64,
        height: 32,
        byte_order: ByteOrder::MSBFirst,
        mode: PresentMode::Present,
        capabilities: CapabilitySource::Negotiate,
        title: "test".to_string(),
    };
    let mut session = Session::establish(client, &config).unwrap();
    assert_eq!(session.window(), Window::new(window));
    assert_eq!(session.capabilities().present_opcode, Some(150));
    assert_eq!(session.setup().vendor, "Fake");

    assert_eq!(session.run().unwrap(), LoopExit::CloseRequested);
    session.shutdown().unwrap();
    handle.join().unwrap();
}

#[cfg(target_os = "linux")]
#[test]
fn test_present_buffer_size_mismatch() {
    let (client, server) = UnixStream::pair().unwrap();

    let handle = thread::spawn(move || {
        let mut srv = FakeServer::new(server, ByteOrder::MSBFirst);
        srv.accept_setup();
        srv.negotiate();
        srv.read_requests(2);
        // server hands back a smaller buffer than the pixmap asked for
        srv.send_buffer(32, 32);
    });

    let config = SessionConfig {
        display: ":0".to_string(),
        width: 64,
        height: 32,
        mode: PresentMode::Present,
        capabilities: CapabilitySource::Negotiate,
        ..SessionConfig::default()
    };
    match Session::establish(client, &config) {
        Err(ClientError::BufferMismatch { expected, got }) => {
            assert_eq!(expected, (64, 32));
            assert_eq!(got, (32, 32));
        }
        Err(other) => panic!("expected BufferMismatch, got {}", other),
        Ok(_) => panic!("mismatched buffer should be refused"),
    }
    handle.join().unwrap();
}

#[test]
fn test_shm_session_lsb_assumed() {
    let (client, server) = UnixStream::pair().unwrap();
    let shmseg = ID_BASE;
    let gc = ID_BASE + 1;
    let window = ID_BASE + 2;

    let handle = thread::spawn(move || {
        let mut srv = FakeServer::new(server, ByteOrder::LSBFirst);
        srv.accept_setup();

        // no negotiation round trips with assumed capabilities
        let setup = srv.read_requests(2);
        assert_eq!(opcodes(&setup), vec![130, 55]);
        assert_eq!(setup[0][1], 1); // ShmAttach
        assert_eq!(srv.u32_at(&setup[0], 4), shmseg);
        assert_eq!(srv.u32_at(&setup[1], 4), gc);

        let batch = srv.read_requests(5);
        assert_eq!(opcodes(&batch), vec![1, 18, 18, 130, 8]);
        assert_eq!(srv.u32_at(&batch[1], 8), 441);
        assert_eq!(srv.u32_at(&batch[1], 24), 439);
        assert_eq!(batch[3][1], 3); // ShmPutImage
        assert_eq!(batch[3].len(), 40);

        srv.expose(window, 800, 600);
        let redraw = srv.read_request();
        assert_eq!(redraw[..2], [130, 3]);
        assert_eq!(srv.i16_at(&redraw, 24), 200);
        assert_eq!(srv.i16_at(&redraw, 26), 150);

        srv.close_window(window, 441, 439);

        let cleanup = srv.read_requests(3);
        assert_eq!(opcodes(&cleanup), vec![130, 60, 4]);
        assert_eq!(cleanup[0][1], 2); // ShmDetach
        srv.expect_eof();
    });

    let config = SessionConfig {
        display: ":0".to_string(),
        width: 400,
        height: 300,
        byte_order: ByteOrder::LSBFirst,
        mode: PresentMode::Shm,
        capabilities: CapabilitySource::Assumed,
        title: "test".to_string(),
    };
    let mut session = Session::establish(client, &config).unwrap();
    session.draw(|pixels, stride| {
        assert_eq!(stride, 1600);
        pixels.fill(0x80);
    })
    .unwrap();
    assert_eq!(session.tracker().counts().shm_segments, 1);

    assert_eq!(session.run().unwrap(), LoopExit::CloseRequested);
    session.shutdown().unwrap();
    handle.join().unwrap();
}

#[test]
fn test_server_closing_ends_loop() {
    let (client, server) = UnixStream::pair().unwrap();

    let handle = thread::spawn(move || {
        let mut srv = FakeServer::new(server, ByteOrder::MSBFirst);
        srv.accept_setup();
        srv.read_requests(2 + 5);
        // dropping the stream ends the session
    });

    let config = SessionConfig {
        display: ":0".to_string(),
        width: 16,
        height: 16,
        mode: PresentMode::Shm,
        capabilities: CapabilitySource::Assumed,
        ..SessionConfig::default()
    };
    let mut session = Session::establish(client, &config).unwrap();
    handle.join().unwrap();

    assert_eq!(session.run().unwrap(), LoopExit::ServerClosed);
    session.shutdown().unwrap();
}

#[test]
fn test_rejected_setup() {
    let (client, server) = UnixStream::pair().unwrap();

    let handle = thread::spawn(move || {
        let mut srv = FakeServer::new(server, ByteOrder::MSBFirst);
        srv.reject_setup("No protocol specified");
    });

    let config = SessionConfig {
        display: ":0".to_string(),
        ..SessionConfig::default()
    };
    match Session::establish(client, &config) {
        Err(ClientError::SetupFailed(reason)) => assert_eq!(reason, "No protocol specified"),
        Err(other) => panic!("expected SetupFailed, got {}", other),
        Ok(_) => panic!("setup should have been rejected"),
    }
    handle.join().unwrap();
}
