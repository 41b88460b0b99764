//! Link-level framing for the NFC reader chip.
//!
//! The reader chip speaks a checksummed binary frame protocol over a
//! byte bus. Outbound commands are wrapped by [`Frame`]; inbound
//! traffic arrives as fixed-size chunks that [`decode_chunk`] scans and
//! validates. This crate is pure byte manipulation: no bus access, no
//! timing, no retries. The driver layer owns those.

pub mod chunk;
pub mod frame;

pub use chunk::{ChunkError, decode_chunk, parse_wire};
pub use frame::{Frame, checksum};
