//! Driver for the PN532 NFC reader chip.
//!
//! This crate layers the command/response discipline of the chip on top
//! of a pluggable byte bus: readiness polling, bounded chunk scanning,
//! response-code pairing and retry-wrapped card polling. Wire framing
//! itself lives in `tapgate-protocol`; bus implementations live with
//! the platform (or in [`mock`] for tests).

pub mod driver;
pub mod error;
pub mod mock;
pub mod traits;

pub use driver::Pn532;
pub use error::{ReaderError, Result};
pub use traits::ReaderBus;
