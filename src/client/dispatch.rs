//! Event dispatch loop
//!
//! One blocking read per iteration, at most one write in response. Expose
//! events re-send the image; the window manager's WM_DELETE_WINDOW message
//! ends the loop.

use crate::capabilities::Capabilities;
use crate::connection::read_record;
use crate::protocol::*;
use std::io::{Read, Write};

/// How the image reaches the window
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentPath {
    /// Present extension, pixmap backed by a dma-buf
    Present { major_opcode: u8, pixmap: Pixmap },
    /// MIT-SHM PutImage from an attached segment
    Shm {
        major_opcode: u8,
        shmseg: ShmSeg,
        gc: GContext,
        depth: u8,
    },
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The window manager asked the window to close
    CloseRequested,
    /// Our window was destroyed by someone else
    WindowDestroyed,
    /// End of stream
    ServerClosed,
}

/// What to do after one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Continue,
    Send(Vec<u8>),
    Exit(LoopExit),
}

/// Offset that centers an image inside an area, clamped at the origin
pub fn centering_offset(area: (u16, u16), image: (u16, u16)) -> (i16, i16) {
    let center = |outer: u16, inner: u16| -> i16 {
        let offset = (outer as i32 - inner as i32) / 2;
        offset.clamp(0, i16::MAX as i32) as i16
    };
    (center(area.0, image.0), center(area.1, image.1))
}

#[derive(Debug)]
pub struct Dispatcher {
    byte_order: ByteOrder,
    window: Window,
    wm_protocols: Atom,
    wm_delete_window: Atom,
    image: (u16, u16),
    path: PresentPath,
    serial: u32,
}

impl Dispatcher {
    pub fn new(
        byte_order: ByteOrder,
        window: Window,
        capabilities: &Capabilities,
        image: (u16, u16),
        path: PresentPath,
    ) -> Self {
        Dispatcher {
            byte_order,
            window,
            wm_protocols: capabilities.wm_protocols,
            wm_delete_window: capabilities.wm_delete_window,
            image,
            path,
            serial: 0,
        }
    }

    /// Serial of the most recent Present request
    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Encode the first presentation of the image (serial 0, no offset)
    pub fn encode_initial(&self, b: &mut Builder) {
        self.encode_present(b, (0, 0));
    }

    /// Encode a presentation for a window area of `area` pixels
    pub fn encode_redraw(&mut self, b: &mut Builder, area: (u16, u16)) {
        let offset = centering_offset(area, self.image);
        if let PresentPath::Present { .. } = self.path {
            self.serial = self.serial.wrapping_add(1);
        }
        self.encode_present(b, offset);
    }

    fn encode_present(&self, b: &mut Builder, (dst_x, dst_y): (i16, i16)) {
        match self.path {
            PresentPath::Present {
                major_opcode,
                pixmap,
            } => {
                PresentPixmapRequest::immediate(major_opcode, self.window, pixmap, self.serial)
                    .encode(b);
            }
            PresentPath::Shm {
                major_opcode,
                shmseg,
                gc,
                depth,
            } => {
                ShmPutImageRequest {
                    major_opcode,
                    drawable: self.window.id(),
                    gc,
                    total_width: self.image.0,
                    total_height: self.image.1,
                    src_x: 0,
                    src_y: 0,
                    src_width: self.image.0,
                    src_height: self.image.1,
                    dst_x,
                    dst_y,
                    depth,
                    format: ImageFormat::ZPixmap,
                    send_event: false,
                    shmseg,
                    offset: 0,
                }
                .encode(b);
            }
        }
    }

    /// Decide what one inbound record calls for
    pub fn handle(&mut self, record: &[u8]) -> ClientResult<Action> {
        let inbound = Inbound::parse(record, self.byte_order).inspect_err(|e| {
            log::error!("Malformed record ({}):\n{}", e, hex_dump(record));
        })?;

        let action = match inbound {
            Inbound::Error(error) => {
                log::warn!("{}", error);
                Action::Continue
            }
            Inbound::Reply(reply) => {
                log::debug!("Unsolicited reply (sequence {}):\n{}", reply.sequence, hex_dump(record));
                Action::Continue
            }
            Inbound::Event(Event::Expose(expose)) => {
                log::debug!(
                    "Expose {}x{}+{}+{} (count {})",
                    expose.width,
                    expose.height,
                    expose.x,
                    expose.y,
                    expose.count
                );
                let mut b = Builder::new(self.byte_order);
                self.encode_redraw(&mut b, (expose.width, expose.height));
                Action::Send(b.finish()?)
            }
            Inbound::Event(Event::ClientMessage(message)) => {
                if message.is_protocol_message(self.wm_protocols, self.wm_delete_window) {
                    log::info!("Window manager requested close");
                    Action::Exit(LoopExit::CloseRequested)
                } else {
                    log::debug!("Ignoring client message of type {}", message.type_.get());
                    Action::Continue
                }
            }
            Inbound::Event(Event::DestroyNotify(destroy)) if destroy.window == self.window => {
                log::info!("Window {} destroyed", self.window.id());
                Action::Exit(LoopExit::WindowDestroyed)
            }
            Inbound::Event(Event::DestroyNotify(_)) => Action::Continue,
            Inbound::Event(Event::Other { code }) => {
                match EventType::from_u8(code) {
                    Some(ty) => log::debug!("Ignoring {:?} event", ty),
                    None => log::debug!("Ignoring event {}:\n{}", code, hex_dump(record)),
                }
                Action::Continue
            }
        };
        Ok(action)
    }

    /// Read and dispatch until the window closes or the stream ends
    pub fn run<S: Read + Write>(&mut self, stream: &mut S) -> ClientResult<LoopExit> {
        loop {
            let Some(record) = read_record(stream, self.byte_order)? else {
                log::info!("Server closed the connection");
                return Ok(LoopExit::ServerClosed);
            };

            match self.handle(&record)? {
                Action::Continue => {}
                Action::Send(bytes) => {
                    stream.write_all(&bytes)?;
                    stream.flush()?;
                }
                Action::Exit(exit) => return Ok(exit),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor as IoCursor};

    const WINDOW: u32 = 0x0020_0001;

    struct Scripted {
        input: IoCursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Scripted {
        fn new(records: &[Vec<u8>]) -> Self {
            Scripted {
                input: IoCursor::new(records.concat()),
                written: Vec::new(),
            }
        }
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

    fn present_dispatcher() -> Dispatcher {
        Dispatcher::new(
            ByteOrder::MSBFirst,
            Window::new(WINDOW),
            &Capabilities::assumed(),
            (1024, 1024),
            PresentPath::Present {
                major_opcode: 148,
                pixmap: Pixmap::new(0x0020_0000),
            },
        )
    }

    fn shm_dispatcher() -> Dispatcher {
        Dispatcher::new(
            ByteOrder::MSBFirst,
            Window::new(WINDOW),
            &Capabilities::assumed(),
            (400, 300),
            PresentPath::Shm {
                major_opcode: 130,
                shmseg: ShmSeg::new(0x0020_0002),
                gc: GContext::new(0x0020_0003),
                depth: 24,
            },
        )
    }

    fn expose(width: u16, height: u16) -> Vec<u8> {
        let mut b = Builder::new(ByteOrder::MSBFirst);
        b.add_u8(12)
            .add_u8(0)
            .add_u16(3)
            .add_u32(WINDOW)
            .add_u16(0)
            .add_u16(0)
            .add_u16(width)
            .add_u16(height)
            .add_u16(0)
            .add_padding(14);
        b.finish().unwrap()
    }

    fn client_message(code: u8, type_: u32, data0: u32) -> Vec<u8> {
        let mut b = Builder::new(ByteOrder::MSBFirst);
        b.add_u8(code)
            .add_u8(32)
            .add_u16(4)
            .add_u32(WINDOW)
            .add_u32(type_)
            .add_u32(data0)
            .add_padding(16);
        b.finish().unwrap()
    }

    #[test]
    fn test_centering_offset() {
        assert_eq!(centering_offset((800, 600), (400, 300)), (200, 150));
        assert_eq!(centering_offset((801, 600), (400, 300)), (200, 150));
        assert_eq!(centering_offset((100, 100), (400, 300)), (0, 0));
        assert_eq!(centering_offset((u16::MAX, 0), (0, 0)), (i16::MAX, 0));
    }

    #[test]
    fn test_expose_sends_one_present() {
        let mut stream = Scripted::new(&[expose(800, 600)]);
        let mut dispatcher = present_dispatcher();

        let exit = dispatcher.run(&mut stream).unwrap();
        assert_eq!(exit, LoopExit::ServerClosed);

        // exactly one 72-byte PresentPixmap
        assert_eq!(stream.written.len(), 72);
        assert_eq!(&stream.written[..4], &[148, 1, 0, 18]);
        // serial was incremented before encoding
        assert_eq!(&stream.written[12..16], &1u32.to_be_bytes());
        assert_eq!(dispatcher.serial(), 1);
    }

    #[test]
    fn test_serial_increments_per_redraw() {
        let mut dispatcher = present_dispatcher();
        let mut b = Builder::new(ByteOrder::MSBFirst);
        dispatcher.encode_initial(&mut b);
        dispatcher.encode_redraw(&mut b, (10, 10));
        dispatcher.encode_redraw(&mut b, (10, 10));
        let bytes = b.finish().unwrap();

        let serials: Vec<&[u8]> = bytes.chunks(72).map(|r| &r[12..16]).collect();
        assert_eq!(serials, vec![&[0u8, 0, 0, 0][..], &[0, 0, 0, 1][..], &[0, 0, 0, 2][..]]);
    }

    #[test]
    fn test_shm_redraw_is_centered() {
        let mut dispatcher = shm_dispatcher();
        match dispatcher.handle(&expose(800, 600)).unwrap() {
            Action::Send(bytes) => {
                assert_eq!(bytes.len(), 40);
                assert_eq!(&bytes[..4], &[130, 3, 0, 10]);
                // dst_x, dst_y
                assert_eq!(&bytes[24..28], &[0, 200, 0, 150]);
            }
            other => panic!("expected a request, got {:?}", other),
        }
    }

    #[test]
    fn test_close_request_ends_loop_silently() {
        let mut stream = Scripted::new(&[client_message(161, 441, 439), expose(10, 10)]);
        let exit = present_dispatcher().run(&mut stream).unwrap();

        assert_eq!(exit, LoopExit::CloseRequested);
        assert!(stream.written.is_empty());
    }

    #[test]
    fn test_plain_client_message_also_closes() {
        let mut dispatcher = present_dispatcher();
        assert_eq!(
            dispatcher.handle(&client_message(33, 441, 439)).unwrap(),
            Action::Exit(LoopExit::CloseRequested)
        );
    }

    #[test]
    fn test_other_client_messages_ignored() {
        let mut stream = Scripted::new(&[
            client_message(161, 441, 1),
            client_message(161, 7, 439),
        ]);
        let exit = present_dispatcher().run(&mut stream).unwrap();

        assert_eq!(exit, LoopExit::ServerClosed);
        assert!(stream.written.is_empty());
    }

    #[test]
    fn test_errors_and_unknown_events_are_logged_only() {
        let mut error = vec![0u8; 32];
        error[1] = 8;
        let mut unknown = vec![0u8; 32];
        unknown[0] = 22;

        let mut dispatcher = present_dispatcher();
        assert_eq!(dispatcher.handle(&error).unwrap(), Action::Continue);
        assert_eq!(dispatcher.handle(&unknown).unwrap(), Action::Continue);
    }

    #[test]
    fn test_destroy_notify_for_own_window() {
        let mut record = vec![0u8; 32];
        record[0] = 17;
        record[8..12].copy_from_slice(&WINDOW.to_be_bytes());
        assert_eq!(
            present_dispatcher().handle(&record).unwrap(),
            Action::Exit(LoopExit::WindowDestroyed)
        );

        record[8..12].copy_from_slice(&0x0020_0009u32.to_be_bytes());
        assert_eq!(present_dispatcher().handle(&record).unwrap(), Action::Continue);
    }

    #[test]
    fn test_truncated_record_is_fatal() {
        let mut stream = Scripted::new(&[expose(800, 600)[..16].to_vec()]);
        assert!(matches!(
            present_dispatcher().run(&mut stream),
            Err(ClientError::UnexpectedEof { .. })
        ));
    }
}
