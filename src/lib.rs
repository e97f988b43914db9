/// x11present - a minimal X11 client that shows a shared pixel buffer
///
/// The library speaks the X11 wire protocol directly: connection setup,
/// request encoding, reply and event decoding. It puts one window on screen
/// and hands it an image through either the Present extension (DRI3 dma-buf)
/// or MIT-SHM, redrawing on Expose until the window manager closes it.

pub mod protocol;
pub mod resources;
pub mod connection;
pub mod capabilities;
#[cfg(unix)]
pub mod buffer;
#[cfg(unix)]
pub mod client;

pub use protocol::{Atom, ByteOrder, ClientError, ClientResult, GContext, Pixmap, Window};
#[cfg(unix)]
pub use client::{CapabilitySource, LoopExit, PresentMode, Session, SessionConfig};

/// Client version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
