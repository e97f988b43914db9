//! X11 protocol requests
//!
//! Each request knows how to append itself to a [`Builder`]. Request lengths
//! are backfilled by [`Builder::add_request`], so an encoder only lists its
//! fields. Replies to the few requests that have one are decoded here too.

use super::*;

/// Core X11 request opcodes used by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestOpcode {
    CreateWindow = 1,
    DestroyWindow = 4,
    MapWindow = 8,
    InternAtom = 16,
    ChangeProperty = 18,
    CreatePixmap = 53,
    FreePixmap = 54,
    CreateGC = 55,
    FreeGC = 60,
    QueryExtension = 98,
}

/// Present extension minor opcodes
pub mod present_minor {
    pub const PIXMAP: u8 = 1;
}

/// Present option bits
pub mod present_option {
    pub const SUBOPTIMAL: u32 = 8;
}

/// DRI3 extension minor opcodes
pub mod dri3_minor {
    pub const BUFFER_FROM_PIXMAP: u8 = 3;
}

/// MIT-SHM extension minor opcodes
pub mod shm_minor {
    pub const ATTACH: u8 = 1;
    pub const DETACH: u8 = 2;
    pub const PUT_IMAGE: u8 = 3;
}

/// Create window request
#[derive(Debug, Clone)]
pub struct CreateWindowRequest {
    pub depth: u8,
    pub wid: Window,
    pub parent: Window,
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    pub border_width: u16,
    pub class: WindowClass,
    pub visual: VisualID,
    pub background_pixel: Option<u32>,
    pub border_pixel: Option<u32>,
    pub event_mask: Option<u32>,
}

impl CreateWindowRequest {
    pub fn encode(&self, b: &mut Builder) {
        // Values follow in value-mask bit order
        let values = [
            (window_attr::BACKGROUND_PIXEL, self.background_pixel),
            (window_attr::BORDER_PIXEL, self.border_pixel),
            (window_attr::EVENT_MASK, self.event_mask),
        ];
        let value_mask = values
            .iter()
            .filter(|(_, v)| v.is_some())
            .fold(0, |mask, (bit, _)| mask | bit);

        b.add_request(RequestOpcode::CreateWindow as u8, self.depth, |r| {
            r.add_u32(self.wid.id().get())
                .add_u32(self.parent.id().get())
                .add_i16(self.x)
                .add_i16(self.y)
                .add_u16(self.width)
                .add_u16(self.height)
                .add_u16(self.border_width)
                .add_u16(self.class as u16)
                .add_u32(self.visual.get())
                .add_u32(value_mask);
            for value in values.iter().filter_map(|(_, v)| *v) {
                r.add_u32(value);
            }
        });
    }
}

#[derive(Debug, Clone)]
pub struct DestroyWindowRequest {
    pub window: Window,
}

impl DestroyWindowRequest {
    pub fn encode(&self, b: &mut Builder) {
        b.add_request(RequestOpcode::DestroyWindow as u8, 0, |r| {
            r.add_u32(self.window.id().get());
        });
    }
}

#[derive(Debug, Clone)]
pub struct MapWindowRequest {
    pub window: Window,
}

impl MapWindowRequest {
    pub fn encode(&self, b: &mut Builder) {
        b.add_request(RequestOpcode::MapWindow as u8, 0, |r| {
            r.add_u32(self.window.id().get());
        });
    }
}

#[derive(Debug, Clone)]
pub struct InternAtomRequest {
    pub only_if_exists: bool,
    pub name: String,
}

impl InternAtomRequest {
    pub fn encode(&self, b: &mut Builder) {
        b.add_request(RequestOpcode::InternAtom as u8, self.only_if_exists as u8, |r| {
            r.add_u16_count(self.name.len())
                .add_padding(2)
                .add_bytes(self.name.as_bytes());
        });
    }
}

/// Property payload, tagged with its format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyData {
    /// format 8
    Bytes(Vec<u8>),
    /// format 32
    Longs(Vec<u32>),
}

impl PropertyData {
    pub fn format(&self) -> u8 {
        match self {
            PropertyData::Bytes(_) => 8,
            PropertyData::Longs(_) => 32,
        }
    }

    /// Length in format units
    pub fn len(&self) -> usize {
        match self {
            PropertyData::Bytes(v) => v.len(),
            PropertyData::Longs(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct ChangePropertyRequest {
    pub mode: PropertyMode,
    pub window: Window,
    pub property: Atom,
    pub type_: Atom,
    pub data: PropertyData,
}

impl ChangePropertyRequest {
    pub fn encode(&self, b: &mut Builder) {
        b.add_request(RequestOpcode::ChangeProperty as u8, self.mode as u8, |r| {
            r.add_u32(self.window.id().get())
                .add_u32(self.property.get())
                .add_u32(self.type_.get())
                .add_u8(self.data.format())
                .add_u24(0)
                .add_u32(self.data.len() as u32);
            match &self.data {
                PropertyData::Bytes(bytes) => {
                    r.add_bytes(bytes);
                }
                PropertyData::Longs(longs) => {
                    for value in longs {
                        r.add_u32(*value);
                    }
                }
            }
        });
    }
}

#[derive(Debug, Clone)]
pub struct CreatePixmapRequest {
    pub depth: u8,
    pub pid: Pixmap,
    pub drawable: XID,
    pub width: u16,
    pub height: u16,
}

impl CreatePixmapRequest {
    pub fn encode(&self, b: &mut Builder) {
        b.add_request(RequestOpcode::CreatePixmap as u8, self.depth, |r| {
            r.add_u32(self.pid.id().get())
                .add_u32(self.drawable.get())
                .add_u16(self.width)
                .add_u16(self.height);
        });
    }
}

#[derive(Debug, Clone)]
pub struct FreePixmapRequest {
    pub pixmap: Pixmap,
}

impl FreePixmapRequest {
    pub fn encode(&self, b: &mut Builder) {
        b.add_request(RequestOpcode::FreePixmap as u8, 0, |r| {
            r.add_u32(self.pixmap.id().get());
        });
    }
}

#[derive(Debug, Clone)]
pub struct CreateGCRequest {
    pub cid: GContext,
    pub drawable: XID,
    pub foreground: Option<u32>,
    pub background: Option<u32>,
    pub graphics_exposures: Option<bool>,
}

impl CreateGCRequest {
    pub fn encode(&self, b: &mut Builder) {
        let values = [
            (gc_attr::FOREGROUND, self.foreground),
            (gc_attr::BACKGROUND, self.background),
            (
                gc_attr::GRAPHICS_EXPOSURES,
                self.graphics_exposures.map(u32::from),
            ),
        ];
        let value_mask = values
            .iter()
            .filter(|(_, v)| v.is_some())
            .fold(0, |mask, (bit, _)| mask | bit);

        b.add_request(RequestOpcode::CreateGC as u8, 0, |r| {
            r.add_u32(self.cid.id().get())
                .add_u32(self.drawable.get())
                .add_u32(value_mask);
            for value in values.iter().filter_map(|(_, v)| *v) {
                r.add_u32(value);
            }
        });
    }
}

#[derive(Debug, Clone)]
pub struct FreeGCRequest {
    pub gc: GContext,
}

impl FreeGCRequest {
    pub fn encode(&self, b: &mut Builder) {
        b.add_request(RequestOpcode::FreeGC as u8, 0, |r| {
            r.add_u32(self.gc.id().get());
        });
    }
}

#[derive(Debug, Clone)]
pub struct QueryExtensionRequest {
    pub name: String,
}

impl QueryExtensionRequest {
    pub fn encode(&self, b: &mut Builder) {
        b.add_request(RequestOpcode::QueryExtension as u8, 0, |r| {
            r.add_u16_count(self.name.len())
                .add_padding(2)
                .add_bytes(self.name.as_bytes());
        });
    }
}

/// Present: PresentPixmap
#[derive(Debug, Clone)]
pub struct PresentPixmapRequest {
    pub major_opcode: u8,
    pub window: Window,
    pub pixmap: Pixmap,
    pub serial: u32,
    pub valid: u32,
    pub update: u32,
    pub x_off: i16,
    pub y_off: i16,
    pub target_crtc: u32,
    pub wait_fence: u32,
    pub idle_fence: u32,
    pub options: u32,
    pub target_msc: u64,
    pub divisor: u64,
    pub remainder: u64,
}

impl PresentPixmapRequest {
    /// Present `pixmap` as soon as possible: no regions, fences, crtc or
    /// target frame.
    pub fn immediate(major_opcode: u8, window: Window, pixmap: Pixmap, serial: u32) -> Self {
        PresentPixmapRequest {
            major_opcode,
            window,
            pixmap,
            serial,
            valid: 0,
            update: 0,
            x_off: 0,
            y_off: 0,
            target_crtc: 0,
            wait_fence: 0,
            idle_fence: 0,
            options: present_option::SUBOPTIMAL,
            target_msc: 0,
            divisor: 0,
            remainder: 0,
        }
    }

    pub fn encode(&self, b: &mut Builder) {
        b.add_request(self.major_opcode, present_minor::PIXMAP, |r| {
            r.add_u32(self.window.id().get())
                .add_u32(self.pixmap.id().get())
                .add_u32(self.serial)
                .add_u32(self.valid)
                .add_u32(self.update)
                .add_i16(self.x_off)
                .add_i16(self.y_off)
                .add_u32(self.target_crtc)
                .add_u32(self.wait_fence)
                .add_u32(self.idle_fence)
                .add_u32(self.options)
                .add_padding(4)
                .add_u64(self.target_msc)
                .add_u64(self.divisor)
                .add_u64(self.remainder);
        });
    }
}

/// DRI3: BufferFromPixmap. The reply carries one dma-buf fd.
#[derive(Debug, Clone)]
pub struct Dri3BufferFromPixmapRequest {
    pub major_opcode: u8,
    pub pixmap: Pixmap,
}

impl Dri3BufferFromPixmapRequest {
    pub fn encode(&self, b: &mut Builder) {
        b.add_request(self.major_opcode, dri3_minor::BUFFER_FROM_PIXMAP, |r| {
            r.add_u32(self.pixmap.id().get());
        });
    }
}

/// MIT-SHM: Attach
#[derive(Debug, Clone)]
pub struct ShmAttachRequest {
    pub major_opcode: u8,
    pub shmseg: ShmSeg,
    pub shmid: u32,
    pub read_only: bool,
}

impl ShmAttachRequest {
    pub fn encode(&self, b: &mut Builder) {
        b.add_request(self.major_opcode, shm_minor::ATTACH, |r| {
            r.add_u32(self.shmseg.id().get())
                .add_u32(self.shmid)
                .add_u8(self.read_only as u8)
                .add_padding(3);
        });
    }
}

/// MIT-SHM: Detach
#[derive(Debug, Clone)]
pub struct ShmDetachRequest {
    pub major_opcode: u8,
    pub shmseg: ShmSeg,
}

impl ShmDetachRequest {
    pub fn encode(&self, b: &mut Builder) {
        b.add_request(self.major_opcode, shm_minor::DETACH, |r| {
            r.add_u32(self.shmseg.id().get());
        });
    }
}

/// MIT-SHM: PutImage
#[derive(Debug, Clone)]
pub struct ShmPutImageRequest {
    pub major_opcode: u8,
    pub drawable: XID,
    pub gc: GContext,
    pub total_width: u16,
    pub total_height: u16,
    pub src_x: u16,
    pub src_y: u16,
    pub src_width: u16,
    pub src_height: u16,
    pub dst_x: i16,
    pub dst_y: i16,
    pub depth: u8,
    pub format: ImageFormat,
    pub send_event: bool,
    pub shmseg: ShmSeg,
    pub offset: u32,
}

impl ShmPutImageRequest {
    pub fn encode(&self, b: &mut Builder) {
        b.add_request(self.major_opcode, shm_minor::PUT_IMAGE, |r| {
            r.add_u32(self.drawable.get())
                .add_u32(self.gc.id().get())
                .add_u16(self.total_width)
                .add_u16(self.total_height)
                .add_u16(self.src_x)
                .add_u16(self.src_y)
                .add_u16(self.src_width)
                .add_u16(self.src_height)
                .add_i16(self.dst_x)
                .add_i16(self.dst_y)
                .add_u8(self.depth)
                .add_u8(self.format as u8)
                .add_u8(self.send_event as u8)
                .add_padding(1)
                .add_u32(self.shmseg.id().get())
                .add_u32(self.offset);
        });
    }
}

/// Common reply header: 1, detail byte, sequence, extra length in 4-byte units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    pub detail: u8,
    pub sequence: u16,
    pub length: u32,
}

impl ReplyHeader {
    /// Decode a reply header. An error record becomes [`ClientError::Server`].
    pub fn parse(cursor: &mut Cursor<'_>) -> ClientResult<Self> {
        let mut peek = cursor.clone();
        match peek.read_u8()? {
            0 => Err(ClientError::Server(ServerError::parse(cursor)?)),
            1 => {
                cursor.skip(1)?;
                let detail = cursor.read_u8()?;
                let sequence = cursor.read_u16()?;
                let length = cursor.read_u32()?;
                Ok(ReplyHeader {
                    detail,
                    sequence,
                    length,
                })
            }
            other => Err(ClientError::UnexpectedRecord(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternAtomReply {
    pub atom: Atom,
}

impl InternAtomReply {
    pub fn parse(cursor: &mut Cursor<'_>) -> ClientResult<Self> {
        ReplyHeader::parse(cursor)?;
        let atom = Atom::new(cursor.read_u32()?);
        cursor.skip(20)?;
        Ok(InternAtomReply { atom })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryExtensionReply {
    pub present: bool,
    pub major_opcode: u8,
    pub first_event: u8,
    pub first_error: u8,
}

impl QueryExtensionReply {
    pub fn parse(cursor: &mut Cursor<'_>) -> ClientResult<Self> {
        ReplyHeader::parse(cursor)?;
        let present = cursor.read_u8()? != 0;
        let major_opcode = cursor.read_u8()?;
        let first_event = cursor.read_u8()?;
        let first_error = cursor.read_u8()?;
        cursor.skip(20)?;
        Ok(QueryExtensionReply {
            present,
            major_opcode,
            first_event,
            first_error,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dri3BufferFromPixmapReply {
    pub nfd: u8,
    pub size: u32,
    pub width: u16,
    pub height: u16,
    pub stride: u16,
    pub depth: u8,
    pub bpp: u8,
}

impl Dri3BufferFromPixmapReply {
    pub fn parse(cursor: &mut Cursor<'_>) -> ClientResult<Self> {
        let header = ReplyHeader::parse(cursor)?;
        let size = cursor.read_u32()?;
        let width = cursor.read_u16()?;
        let height = cursor.read_u16()?;
        let stride = cursor.read_u16()?;
        let depth = cursor.read_u8()?;
        let bpp = cursor.read_u8()?;
        cursor.skip(12)?;
        Ok(Dri3BufferFromPixmapReply {
            nfd: header.detail,
            size,
            width,
            height,
            stride,
            depth,
            bpp,
        })
    }
}
