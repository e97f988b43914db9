//! Client session
//!
//! A [`Session`] owns one connection to the X server and one window showing
//! a shared pixel buffer. Setting it up runs the whole startup sequence:
//!
//! 1. connection setup (handshake)
//! 2. capability negotiation
//! 3. buffer setup: a DRI3 pixmap exported as a dma-buf, or an MIT-SHM segment
//! 4. one batch creating the window, advertising WM_DELETE_WINDOW, presenting
//!    the image and mapping the window
//!
//! after which [`Session::run`] dispatches events until the window closes.

pub mod dispatch;

pub use dispatch::{centering_offset, Action, Dispatcher, LoopExit, PresentPath};

use crate::buffer::PixelBuffer;
use crate::capabilities::Capabilities;
use crate::connection::{Connection, DisplayName};
use crate::protocol::*;
use crate::resources::{ResourceIdAllocator, ResourceTracker};
use std::io::{Read, Write};
use std::os::fd::AsFd;

/// How the image is handed to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentMode {
    /// DRI3 dma-buf pixmap shown with PresentPixmap
    #[default]
    Present,
    /// MIT-SHM segment copied with ShmPutImage
    Shm,
}

/// Where atom ids and extension opcodes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapabilitySource {
    /// InternAtom / QueryExtension round trips
    #[default]
    Negotiate,
    /// [`Capabilities::assumed`]
    Assumed,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Display name, `[host]:display[.screen]`
    pub display: String,
    pub width: u16,
    pub height: u16,
    pub byte_order: ByteOrder,
    pub mode: PresentMode,
    pub capabilities: CapabilitySource,
    pub title: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            display: std::env::var("DISPLAY")
                .ok()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| ":0".to_string()),
            width: 1024,
            height: 1024,
            byte_order: ByteOrder::default(),
            mode: PresentMode::default(),
            capabilities: CapabilitySource::default(),
            title: "x11present".to_string(),
        }
    }
}

/// One window on one connection
pub struct Session<S: Read + Write + AsFd = Connection> {
    stream: S,
    byte_order: ByteOrder,
    setup: SetupInfo,
    capabilities: Capabilities,
    ids: ResourceIdAllocator,
    tracker: ResourceTracker,
    window: Window,
    dispatcher: Dispatcher,
    buffer: Box<dyn PixelBuffer>,
    closed: bool,
}

impl Session<Connection> {
    /// Connect to the configured display and bring up the window
    pub fn connect(config: &SessionConfig) -> ClientResult<Self> {
        let display = DisplayName::parse(&config.display)?;
        let stream = Connection::open(&display)?;
        log::info!("Connected to display {}", display);
        Session::establish(stream, config)
    }
}

impl<S: Read + Write + AsFd> Session<S> {
    /// Run the startup sequence over an already open stream
    pub fn establish(mut stream: S, config: &SessionConfig) -> ClientResult<Self> {
        let byte_order = config.byte_order;
        let setup = Handshake::new(byte_order).perform(&mut stream)?;
        let mut ids = setup.id_allocator();

        let capabilities = match config.capabilities {
            CapabilitySource::Negotiate => Capabilities::negotiate(&mut stream, byte_order)?,
            CapabilitySource::Assumed => {
                log::warn!("Using assumed atom ids and extension opcodes");
                Capabilities::assumed()
            }
        };
        log::debug!("Capabilities: {:?}", capabilities);

        let mut tracker = ResourceTracker::new();
        let image = (config.width, config.height);
        let (buffer, path) = match config.mode {
            PresentMode::Present => setup_dmabuf(
                &mut stream,
                byte_order,
                &setup,
                &capabilities,
                &mut ids,
                &mut tracker,
                image,
            )?,
            PresentMode::Shm => setup_shm(
                &mut stream,
                byte_order,
                &setup,
                &capabilities,
                &mut ids,
                &mut tracker,
                image,
            )?,
        };

        let window = Window::new(ids.allocate());
        let dispatcher = Dispatcher::new(byte_order, window, &capabilities, image, path);

        let mut b = Builder::new(byte_order);
        CreateWindowRequest {
            depth: 0, // copy from parent
            wid: window,
            parent: setup.root,
            x: 0,
            y: 0,
            width: config.width,
            height: config.height,
            border_width: 0,
            class: WindowClass::InputOutput,
            visual: VisualID::COPY_FROM_PARENT,
            background_pixel: Some(0),
            border_pixel: None,
            event_mask: Some(event_mask::EXPOSURE | event_mask::STRUCTURE_NOTIFY),
        }
        .encode(&mut b);
        ChangePropertyRequest {
            mode: PropertyMode::Replace,
            window,
            property: capabilities.wm_protocols,
            type_: Atom::ATOM,
            data: PropertyData::Longs(vec![capabilities.wm_delete_window.get()]),
        }
        .encode(&mut b);
        ChangePropertyRequest {
            mode: PropertyMode::Replace,
            window,
            property: Atom::WM_NAME,
            type_: Atom::STRING,
            data: PropertyData::Bytes(config.title.as_bytes().to_vec()),
        }
        .encode(&mut b);
        dispatcher.encode_initial(&mut b);
        MapWindowRequest { window }.encode(&mut b);

        stream.write_all(&b.finish()?)?;
        stream.flush()?;
        tracker.track_window(window);
        log::info!(
            "Mapped window {} ({}x{}, {:?})",
            window.id(),
            config.width,
            config.height,
            config.mode
        );

        Ok(Session {
            stream,
            byte_order,
            setup,
            capabilities,
            ids,
            tracker,
            window,
            dispatcher,
            buffer,
            closed: false,
        })
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn setup(&self) -> &SetupInfo {
        &self.setup
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    /// Ids allocated from the connection's range so far
    pub fn allocated_ids(&self) -> u32 {
        self.ids.allocated()
    }

    /// Write into the pixel buffer. `f` gets the pixels and the row stride.
    pub fn draw<F>(&mut self, mut f: F) -> ClientResult<()>
    where
        F: FnMut(&mut [u8], usize),
    {
        let stride = self.buffer.stride();
        self.buffer.with_cpu_access(&mut |pixels| f(pixels, stride))
    }

    /// Show the current buffer contents again
    pub fn present(&mut self) -> ClientResult<()> {
        let mut b = Builder::new(self.byte_order);
        let image = (self.buffer.width(), self.buffer.height());
        self.dispatcher.encode_redraw(&mut b, image);
        self.stream.write_all(&b.finish()?)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Dispatch events until the window is closed or the server goes away
    pub fn run(&mut self) -> ClientResult<LoopExit> {
        let exit = self.dispatcher.run(&mut self.stream)?;
        match exit {
            LoopExit::WindowDestroyed => self.tracker.forget_window(self.window),
            LoopExit::ServerClosed => self.closed = true,
            LoopExit::CloseRequested => {}
        }
        Ok(exit)
    }

    /// Release server resources and close the connection
    pub fn shutdown(mut self) -> ClientResult<()> {
        self.release()
    }

    fn release(&mut self) -> ClientResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let cleanup = self.tracker.drain_cleanup();
        if !cleanup.is_empty() {
            let mut b = Builder::new(self.byte_order);
            for request in &cleanup {
                request.encode(&mut b);
            }
            self.stream.write_all(&b.finish()?)?;
            self.stream.flush()?;
            log::debug!("Sent {} cleanup requests", cleanup.len());
        }
        Ok(())
    }
}

impl<S: Read + Write + AsFd> Drop for Session<S> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::debug!("Cleanup on drop failed: {}", e);
        }
    }
}

/// Present path: a server pixmap exported through DRI3 and mapped here
#[cfg(target_os = "linux")]
fn setup_dmabuf<S: Read + Write + AsFd>(
    stream: &mut S,
    byte_order: ByteOrder,
    setup: &SetupInfo,
    capabilities: &Capabilities,
    ids: &mut ResourceIdAllocator,
    tracker: &mut ResourceTracker,
    (width, height): (u16, u16),
) -> ClientResult<(Box<dyn PixelBuffer>, PresentPath)> {
    use crate::buffer::DmaBuffer;
    use crate::connection::recv_reply_with_fd;

    let present_opcode = capabilities.present()?;
    let dri3_opcode = capabilities.dri3()?;
    let pixmap = Pixmap::new(ids.allocate());

    let mut b = Builder::new(byte_order);
    CreatePixmapRequest {
        depth: setup.root_depth,
        pid: pixmap,
        drawable: setup.root.id(),
        width,
        height,
    }
    .encode(&mut b);
    Dri3BufferFromPixmapRequest {
        major_opcode: dri3_opcode,
        pixmap,
    }
    .encode(&mut b);
    stream.write_all(&b.finish()?)?;
    stream.flush()?;
    tracker.track_pixmap(pixmap);

    let (reply, fd) = recv_reply_with_fd(stream, byte_order)?;
    let info = Dri3BufferFromPixmapReply::parse(&mut Cursor::new(&reply, byte_order))?;
    log::debug!(
        "dma-buf for pixmap {}: {}x{} stride {} depth {} bpp {} ({} bytes)",
        pixmap.id(),
        info.width,
        info.height,
        info.stride,
        info.depth,
        info.bpp,
        info.size
    );

    if (info.width, info.height) != (width, height) {
        return Err(ClientError::BufferMismatch {
            expected: (width, height),
            got: (info.width, info.height),
        });
    }
    let buffer = DmaBuffer::map(fd, width, height, info.stride as usize, info.size as usize)?;
    Ok((
        Box::new(buffer),
        PresentPath::Present {
            major_opcode: present_opcode,
            pixmap,
        },
    ))
}

#[cfg(not(target_os = "linux"))]
fn setup_dmabuf<S: Read + Write + AsFd>(
    _stream: &mut S,
    _byte_order: ByteOrder,
    _setup: &SetupInfo,
    _capabilities: &Capabilities,
    _ids: &mut ResourceIdAllocator,
    _tracker: &mut ResourceTracker,
    _image: (u16, u16),
) -> ClientResult<(Box<dyn PixelBuffer>, PresentPath)> {
    Err(ClientError::MissingExtension(crate::capabilities::DRI3_NAME))
}

/// Shared-memory path: a System-V segment attached on both sides
fn setup_shm<S: Read + Write + AsFd>(
    stream: &mut S,
    byte_order: ByteOrder,
    setup: &SetupInfo,
    capabilities: &Capabilities,
    ids: &mut ResourceIdAllocator,
    tracker: &mut ResourceTracker,
    (width, height): (u16, u16),
) -> ClientResult<(Box<dyn PixelBuffer>, PresentPath)> {
    use crate::buffer::ShmSegment;

    let shm_opcode = capabilities.shm()?;
    let segment = ShmSegment::create(width, height)?;
    let shmseg = ShmSeg::new(ids.allocate());
    let gc = GContext::new(ids.allocate());

    let mut b = Builder::new(byte_order);
    ShmAttachRequest {
        major_opcode: shm_opcode,
        shmseg,
        shmid: segment.shmid(),
        read_only: false,
    }
    .encode(&mut b);
    CreateGCRequest {
        cid: gc,
        drawable: setup.root.id(),
        foreground: None,
        background: None,
        graphics_exposures: Some(false),
    }
    .encode(&mut b);
    stream.write_all(&b.finish()?)?;
    stream.flush()?;
    tracker.track_shm_segment(shm_opcode, shmseg);
    tracker.track_gc(gc);

    Ok((
        Box::new(segment),
        PresentPath::Shm {
            major_opcode: shm_opcode,
            shmseg,
            gc,
            depth: setup.root_depth,
        },
    ))
}
