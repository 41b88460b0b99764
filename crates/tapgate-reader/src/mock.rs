//! Mock bus implementation for driver tests and development.
//!
//! This module provides a scriptable [`ReaderBus`] so the driver can be
//! exercised without physical hardware: tests queue the byte sequences
//! the chip would return and inspect the frames the driver wrote.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tapgate_core::constants::{CHUNK_SIZE, STATUS_READY};
use tapgate_protocol::Frame;

use crate::error::{ReaderError, Result};
use crate::traits::ReaderBus;

/// One scripted answer to a bus read.
#[derive(Debug)]
enum ScriptedRead {
    Data(Vec<u8>),
    Error(String),
}

#[derive(Debug, Default)]
struct BusState {
    reads: VecDeque<ScriptedRead>,
    writes: Vec<Vec<u8>>,
}

fn lock(state: &Mutex<BusState>) -> MutexGuard<'_, BusState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scriptable bus for testing the driver without hardware.
///
/// Reads are served from a FIFO script; once the script runs dry the
/// bus behaves like an idle chip and answers every read with zeroes
/// (status "not ready"). Writes are recorded for inspection.
///
/// # Examples
///
/// ```
/// use tapgate_reader::driver::Pn532;
/// use tapgate_reader::mock::MockBus;
///
/// #[tokio::main]
/// async fn main() {
///     let (bus, handle) = MockBus::new();
///     handle
///         .push_chip_response(&[0x03, 0x32, 0x01, 0x06, 0x07])
///         .unwrap();
///
///     let mut driver = Pn532::new(bus);
///     let version = driver.firmware_version().await.unwrap();
///     assert_eq!(version.to_string(), "1.6");
/// }
/// ```
#[derive(Debug)]
pub struct MockBus {
    state: Arc<Mutex<BusState>>,
}

impl MockBus {
    /// Create a new mock bus.
    ///
    /// Returns a tuple of (MockBus, MockBusHandle) where the handle
    /// scripts reads and inspects writes while the driver owns the bus.
    pub fn new() -> (Self, MockBusHandle) {
        let state = Arc::new(Mutex::new(BusState::default()));
        let bus = Self {
            state: Arc::clone(&state),
        };
        (bus, MockBusHandle { state })
    }
}

impl ReaderBus for MockBus {
    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        lock(&self.state).writes.push(bytes.to_vec());
        Ok(())
    }

    async fn read(&mut self, len: usize) -> Result<Vec<u8>> {
        match lock(&self.state).reads.pop_front() {
            Some(ScriptedRead::Data(data)) => Ok(data),
            Some(ScriptedRead::Error(message)) => Err(ReaderError::bus(message)),
            None => Ok(vec![0x00; len]),
        }
    }
}

/// Control handle for a [`MockBus`].
#[derive(Debug, Clone)]
pub struct MockBusHandle {
    state: Arc<Mutex<BusState>>,
}

impl MockBusHandle {
    /// Queue raw bytes for the next read, returned as-is regardless of
    /// the requested length.
    pub fn push_read(&self, data: impl Into<Vec<u8>>) {
        lock(&self.state)
            .reads
            .push_back(ScriptedRead::Data(data.into()));
    }

    /// Queue a bus fault for the next read.
    pub fn push_read_error(&self, message: impl Into<String>) {
        lock(&self.state)
            .reads
            .push_back(ScriptedRead::Error(message.into()));
    }

    /// Queue one chunk carrying a chip frame with `body`, padded with
    /// zeroes to the chunk size. The ready status byte leads the chunk,
    /// the way the bus delivers it.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` does not fit a frame.
    pub fn push_ready_chunk(&self, body: &[u8]) -> Result<()> {
        let wire = Frame::chip(body)?.to_wire();
        let mut chunk = vec![STATUS_READY];
        chunk.extend_from_slice(&wire);
        if chunk.len() < CHUNK_SIZE {
            chunk.resize(CHUNK_SIZE, 0x00);
        }
        self.push_read(chunk);
        Ok(())
    }

    /// Queue a full command answer: one ready status read followed by a
    /// response chunk carrying `body`.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` does not fit a frame.
    pub fn push_chip_response(&self, body: &[u8]) -> Result<()> {
        self.push_read([STATUS_READY]);
        self.push_ready_chunk(body)
    }

    /// Frames written to the bus so far, oldest first.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.state).writes.clone()
    }

    /// Number of scripted reads not yet consumed.
    pub fn remaining_reads(&self) -> usize {
        lock(&self.state).reads.len()
    }
}
