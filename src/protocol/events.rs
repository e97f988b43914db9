//! X11 protocol events
//!
//! Everything the server sends after setup arrives as 32-byte records whose
//! first byte says what they are: 0 for an error, 1 for a reply, anything
//! else for an event. Only the events this client acts on are decoded in
//! full; the rest are identified by code for diagnostics.

use super::*;

/// Set on the event code of events delivered through SendEvent
pub const SEND_EVENT_FLAG: u8 = 0x80;

/// Event type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventType {
    KeyPress = 2,
    KeyRelease = 3,
    ButtonPress = 4,
    ButtonRelease = 5,
    MotionNotify = 6,
    EnterNotify = 7,
    LeaveNotify = 8,
    FocusIn = 9,
    FocusOut = 10,
    KeymapNotify = 11,
    Expose = 12,
    GraphicsExposure = 13,
    NoExposure = 14,
    VisibilityNotify = 15,
    CreateNotify = 16,
    DestroyNotify = 17,
    UnmapNotify = 18,
    MapNotify = 19,
    MapRequest = 20,
    ReparentNotify = 21,
    ConfigureNotify = 22,
    ConfigureRequest = 23,
    GravityNotify = 24,
    ResizeRequest = 25,
    CirculateNotify = 26,
    CirculateRequest = 27,
    PropertyNotify = 28,
    SelectionClear = 29,
    SelectionRequest = 30,
    SelectionNotify = 31,
    ColormapNotify = 32,
    ClientMessage = 33,
    MappingNotify = 34,
    GenericEvent = 35,
}

impl EventType {
    /// Decode an event code, ignoring the SendEvent flag
    pub fn from_u8(code: u8) -> Option<Self> {
        use EventType::*;
        let ty = match code & !SEND_EVENT_FLAG {
            2 => KeyPress,
            3 => KeyRelease,
            4 => ButtonPress,
            5 => ButtonRelease,
            6 => MotionNotify,
            7 => EnterNotify,
            8 => LeaveNotify,
            9 => FocusIn,
            10 => FocusOut,
            11 => KeymapNotify,
            12 => Expose,
            13 => GraphicsExposure,
            14 => NoExposure,
            15 => VisibilityNotify,
            16 => CreateNotify,
            17 => DestroyNotify,
            18 => UnmapNotify,
            19 => MapNotify,
            20 => MapRequest,
            21 => ReparentNotify,
            22 => ConfigureNotify,
            23 => ConfigureRequest,
            24 => GravityNotify,
            25 => ResizeRequest,
            26 => CirculateNotify,
            27 => CirculateRequest,
            28 => PropertyNotify,
            29 => SelectionClear,
            30 => SelectionRequest,
            31 => SelectionNotify,
            32 => ColormapNotify,
            33 => ClientMessage,
            34 => MappingNotify,
            35 => GenericEvent,
            _ => return None,
        };
        Some(ty)
    }
}

/// Expose: part of the window needs to be redrawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposeEvent {
    pub sequence: u16,
    pub window: Window,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub count: u16,
}

impl ExposeEvent {
    pub fn parse(cursor: &mut Cursor<'_>) -> ClientResult<Self> {
        cursor.skip(1)?; // event code
        cursor.skip(1)?; // unused
        let sequence = cursor.read_u16()?;
        let window = Window::new(cursor.read_u32()?);
        let x = cursor.read_u16()?;
        let y = cursor.read_u16()?;
        let width = cursor.read_u16()?;
        let height = cursor.read_u16()?;
        let count = cursor.read_u16()?;
        cursor.skip(14)?;

        Ok(ExposeEvent {
            sequence,
            window,
            x,
            y,
            width,
            height,
            count,
        })
    }
}

/// ClientMessage: used by window managers for WM_PROTOCOLS messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMessageEvent {
    pub format: u8,
    pub sequence: u16,
    pub window: Window,
    pub type_: Atom,
    /// Payload read as format-32 words
    pub data: [u32; 5],
}

impl ClientMessageEvent {
    pub fn parse(cursor: &mut Cursor<'_>) -> ClientResult<Self> {
        cursor.skip(1)?; // event code
        let format = cursor.read_u8()?;
        let sequence = cursor.read_u16()?;
        let window = Window::new(cursor.read_u32()?);
        let type_ = Atom::new(cursor.read_u32()?);
        let mut data = [0u32; 5];
        for word in data.iter_mut() {
            *word = cursor.read_u32()?;
        }

        Ok(ClientMessageEvent {
            format,
            sequence,
            window,
            type_,
            data,
        })
    }

    /// True if this is a `protocol` message carrying `atom` in its first word
    pub fn is_protocol_message(&self, protocol: Atom, atom: Atom) -> bool {
        self.type_ == protocol && self.data[0] == atom.get()
    }
}

/// DestroyNotify: a window selecting StructureNotify was destroyed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyNotifyEvent {
    pub sequence: u16,
    pub event: Window,
    pub window: Window,
}

impl DestroyNotifyEvent {
    pub fn parse(cursor: &mut Cursor<'_>) -> ClientResult<Self> {
        cursor.skip(2)?;
        let sequence = cursor.read_u16()?;
        let event = Window::new(cursor.read_u32()?);
        let window = Window::new(cursor.read_u32()?);
        cursor.skip(20)?;
        Ok(DestroyNotifyEvent {
            sequence,
            event,
            window,
        })
    }
}

/// Decoded event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Expose(ExposeEvent),
    ClientMessage(ClientMessageEvent),
    DestroyNotify(DestroyNotifyEvent),
    /// Any event this client does not act on
    Other { code: u8 },
}

/// One record read from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Error(ServerError),
    Reply(ReplyHeader),
    Event(Event),
}

impl Inbound {
    /// Classify and decode a record by its leading byte
    pub fn parse(record: &[u8], byte_order: ByteOrder) -> ClientResult<Self> {
        let mut cursor = Cursor::new(record, byte_order);
        let code = cursor.clone().read_u8()?;

        let inbound = match code {
            0 => Inbound::Error(ServerError::parse(&mut cursor)?),
            1 => Inbound::Reply(ReplyHeader::parse(&mut cursor)?),
            _ => Inbound::Event(match EventType::from_u8(code) {
                Some(EventType::Expose) => Event::Expose(ExposeEvent::parse(&mut cursor)?),
                Some(EventType::ClientMessage) => {
                    Event::ClientMessage(ClientMessageEvent::parse(&mut cursor)?)
                }
                Some(EventType::DestroyNotify) => {
                    Event::DestroyNotify(DestroyNotifyEvent::parse(&mut cursor)?)
                }
                _ => Event::Other { code },
            }),
        };
        Ok(inbound)
    }
}

/// Bytes that follow a 32-byte record: replies and generic events carry
/// their extra length (in 4-byte units) at offset 4.
pub fn trailing_len(record: &[u8], byte_order: ByteOrder) -> ClientResult<usize> {
    let mut cursor = Cursor::new(record, byte_order);
    let code = cursor.read_u8()?;
    if code == 1 || code & !SEND_EVENT_FLAG == EventType::GenericEvent as u8 {
        cursor.skip(3)?;
        Ok(cursor.read_u32()? as usize * 4)
    } else {
        Ok(0)
    }
}
