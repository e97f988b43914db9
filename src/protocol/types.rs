//! Core X11 protocol types
//!
//! These types represent the fundamental data types used in the X11 protocol.
//! They are kept minimal and close to the wire protocol for efficiency.

use std::fmt;

/// X11 resource ID - used for windows, pixmaps, graphics contexts, etc.
/// Clients build these from the base/mask pair handed out at setup.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XID(pub u32);

impl XID {
    pub fn new(id: u32) -> Self {
        XID(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for XID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Window ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window(pub XID);

impl Window {
    pub fn new(id: u32) -> Self {
        Window(XID::new(id))
    }

    pub fn id(&self) -> XID {
        self.0
    }
}

/// Pixmap ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pixmap(pub XID);

impl Pixmap {
    pub fn new(id: u32) -> Self {
        Pixmap(XID::new(id))
    }

    pub fn id(&self) -> XID {
        self.0
    }
}

/// Graphics Context ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GContext(pub XID);

impl GContext {
    pub fn new(id: u32) -> Self {
        GContext(XID::new(id))
    }

    pub fn id(&self) -> XID {
        self.0
    }
}

/// MIT-SHM segment ID (client-allocated, names a server-side attachment)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShmSeg(pub XID);

impl ShmSeg {
    pub fn new(id: u32) -> Self {
        ShmSeg(XID::new(id))
    }

    pub fn id(&self) -> XID {
        self.0
    }
}

/// Atom - interned string identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Atom(pub u32);

impl Atom {
    pub const ATOM: Atom = Atom(4);
    pub const STRING: Atom = Atom(31);
    pub const WM_NAME: Atom = Atom(39);

    pub fn new(id: u32) -> Self {
        Atom(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

/// Visual ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisualID(pub u32);

impl VisualID {
    /// CopyFromParent
    pub const COPY_FROM_PARENT: VisualID = VisualID(0);

    pub fn new(id: u32) -> Self {
        VisualID(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

/// Window class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowClass {
    CopyFromParent = 0,
    InputOutput = 1,
    InputOnly = 2,
}

/// Image format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Bitmap = 0,
    XYPixmap = 1,
    ZPixmap = 2,
}

/// Property change mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyMode {
    Replace = 0,
    Prepend = 1,
    Append = 2,
}

/// Event masks
pub mod event_mask {
    pub const EXPOSURE: u32 = 1 << 15;
    pub const STRUCTURE_NOTIFY: u32 = 1 << 17;
}

/// CreateWindow / ChangeWindowAttributes value-mask bits
pub mod window_attr {
    pub const BACKGROUND_PIXEL: u32 = 1 << 1;
    pub const BORDER_PIXEL: u32 = 1 << 3;
    pub const EVENT_MASK: u32 = 1 << 11;
}

/// CreateGC value-mask bits
pub mod gc_attr {
    pub const FOREGROUND: u32 = 1 << 2;
    pub const BACKGROUND: u32 = 1 << 3;
    pub const GRAPHICS_EXPOSURES: u32 = 1 << 16;
}

/// Byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    LSBFirst = 0,
    #[default]
    MSBFirst = 1,
}

impl ByteOrder {
    /// Byte announced as the first byte of the connection setup
    pub fn marker(&self) -> u8 {
        match self {
            ByteOrder::MSBFirst => b'B',
            ByteOrder::LSBFirst => b'l',
        }
    }
}
