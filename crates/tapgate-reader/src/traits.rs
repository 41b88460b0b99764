//! Bus trait for reader transports.
//!
//! The driver talks to the chip through a plain byte bus. Real hardware
//! sits behind an I2C (or SPI) peripheral that binds the device address
//! at construction; tests and the simulator substitute in-memory
//! implementations. Transport quirks such as the I2C leading register
//! byte belong to the bus implementation, not to the driver.
//!
//! Uses native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT),
//! eliminating the need for the `async_trait` macro.

#![allow(async_fn_in_trait)]

use crate::error::Result;

/// Byte transport between the driver and the reader chip.
///
/// # Object Safety and Dynamic Dispatch
///
/// **NOTE**: This trait is NOT object-safe because `async fn` methods
/// return `impl Future`, which cannot be used in trait objects. Use it
/// as a generic bound (see [`Pn532`](crate::driver::Pn532)).
pub trait ReaderBus: Send + Sync {
    /// Write `bytes` to the chip in a single bus transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails at the transport level.
    async fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read exactly `len` bytes from the chip.
    ///
    /// The first byte of every read reflects the chip's status line;
    /// the driver polls single bytes for readiness and pulls fixed-size
    /// chunks for frame data.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails at the transport level.
    async fn read(&mut self, len: usize) -> Result<Vec<u8>>;
}
