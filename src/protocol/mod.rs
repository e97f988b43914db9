/// X11 protocol implementation
///
/// This module implements the client side of the X11 wire protocol: the
/// byte builder and cursor, connection setup, request encoders, and the
/// decoding of replies, events and errors.

pub mod types;
pub mod errors;
pub mod builder;
pub mod cursor;
pub mod setup;
pub mod requests;
pub mod events;

pub use types::*;
pub use errors::*;
pub use builder::*;
pub use cursor::*;
pub use setup::*;
pub use requests::*;
pub use events::*;

use std::fmt::Write as _;

/// X11 protocol version
pub const PROTOCOL_MAJOR_VERSION: u16 = 11;
pub const PROTOCOL_MINOR_VERSION: u16 = 0;

/// Size of every error, reply header and core event record
pub const RECORD_SIZE: usize = 32;

/// Padding helper - X11 requires data to be padded to 4-byte boundaries
pub fn pad(n: usize) -> usize {
    (4 - (n % 4)) % 4
}

/// Calculate padded length
pub fn padded_len(n: usize) -> usize {
    n + pad(n)
}

/// Render `data` as an offset / hex / ascii dump for diagnostics
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();
    for (i, chunk) in data.chunks(16).enumerate() {
        let _ = write!(out, "{:08x}  ", i * 16);
        for (j, byte) in chunk.iter().enumerate() {
            let _ = write!(out, "{:02x} ", byte);
            if j == 7 {
                out.push(' ');
            }
        }
        for j in chunk.len()..16 {
            out.push_str("   ");
            if j == 7 {
                out.push(' ');
            }
        }
        out.push_str(" |");
        for byte in chunk {
            if byte.is_ascii_graphic() || *byte == b' ' {
                out.push(*byte as char);
            } else {
                out.push('.');
            }
        }
        out.push_str("|\n");
    }
    out
}
