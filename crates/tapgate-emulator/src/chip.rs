//! Link-level emulation of the reader chip.
//!
//! [`VirtualChip`] sits behind the driver as a [`ReaderBus`] and
//! behaves like real silicon: it parses the host frames the driver
//! writes, answers the commands the firmware uses, reports readiness
//! through the one-byte status read, and stays silent when polled for a
//! tag that is not in the field. The driver cannot tell it apart from
//! hardware short of measuring wall-clock latency.
//!
//! [`VirtualChipHandle`] is the test's side of the antenna: it places
//! and removes tags, injects bus noise, and inspects the command
//! traffic the chip has seen.
//!
//! # Examples
//!
//! ```
//! use tapgate_emulator::VirtualChip;
//! use tapgate_reader::Pn532;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (chip, handle) = VirtualChip::new();
//!     let mut driver = Pn532::new(chip);
//!
//!     assert_eq!(driver.firmware_version().await.unwrap().to_string(), "1.6");
//!
//!     handle.present_tag([0x04, 0xAB, 0xCD, 0xEF]);
//!     let uid = driver.read_uid(std::time::Duration::from_millis(80)).await;
//!     assert_eq!(uid.unwrap().to_hex(), "04 AB CD EF");
//! }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tapgate_core::constants::*;
use tapgate_protocol::{Frame, parse_wire};
use tracing::{debug, trace};

use tapgate_reader::{ReaderBus, Result};

/// Identification word the virtual chip reports: PN532 firmware 1.6.
const FIRMWARE: [u8; 4] = [0x32, 0x01, 0x06, 0x07];

#[derive(Debug, Default)]
struct ChipState {
    /// UID of the tag currently in the field, if any.
    tag: Option<Vec<u8>>,
    /// Response chunks waiting to be read, already wire-framed.
    outbox: VecDeque<Vec<u8>>,
    /// Injected noise chunks, served before any real output.
    noise: VecDeque<Vec<u8>>,
    /// Command codes parsed off the write path, oldest first.
    commands: Vec<u8>,
    sam_configured: bool,
}

impl ChipState {
    /// Queue a chip frame carrying `body` as one ready-prefixed chunk,
    /// padded with zeroes the way the bus pads a short frame.
    fn answer(&mut self, body: &[u8]) -> tapgate_core::Result<()> {
        let wire = Frame::chip(body)?.to_wire();
        let mut chunk = Vec::with_capacity(CHUNK_SIZE);
        chunk.push(STATUS_READY);
        chunk.extend_from_slice(&wire);
        if chunk.len() < CHUNK_SIZE {
            chunk.resize(CHUNK_SIZE, 0x00);
        }
        self.outbox.push_back(chunk);
        Ok(())
    }

    fn has_output(&self) -> bool {
        !self.noise.is_empty() || !self.outbox.is_empty()
    }
}

fn lock(state: &Mutex<ChipState>) -> MutexGuard<'_, ChipState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process stand-in for the reader chip.
///
/// Unlike the scripted mock bus, the virtual chip computes its answers
/// from the commands it receives, so the full driver stack runs
/// unmodified against it: readiness comes from actual pending output,
/// an empty field produces a real poll timeout, and injected noise
/// exercises the chunk scanner.
#[derive(Debug)]
pub struct VirtualChip {
    state: Arc<Mutex<ChipState>>,
}

impl VirtualChip {
    /// Create a virtual chip with an empty field.
    ///
    /// Returns the chip (to hand to the driver) and the handle that
    /// controls the field from the outside.
    pub fn new() -> (Self, VirtualChipHandle) {
        let state = Arc::new(Mutex::new(ChipState::default()));
        let chip = Self {
            state: Arc::clone(&state),
        };
        (chip, VirtualChipHandle { state })
    }

    fn execute(&self, command: u8) -> Result<()> {
        let mut state = lock(&self.state);
        state.commands.push(command);
        match command {
            CMD_GET_FIRMWARE_VERSION => {
                let mut body = vec![command.wrapping_add(RESPONSE_CODE_OFFSET)];
                body.extend_from_slice(&FIRMWARE);
                state.answer(&body)?;
            }
            CMD_SAM_CONFIGURATION => {
                state.sam_configured = true;
                state.answer(&[command.wrapping_add(RESPONSE_CODE_OFFSET)])?;
            }
            CMD_IN_LIST_PASSIVE_TARGET => {
                // An empty field never answers; the driver's poll
                // timeout is what reports the absence.
                if let Some(uid) = state.tag.clone() {
                    let mut body = vec![
                        command.wrapping_add(RESPONSE_CODE_OFFSET),
                        0x01, // targets found
                        0x01, // target number
                        0x00, // SENS_RES
                        0x04,
                        0x08, // SEL_RES
                        uid.len() as u8,
                    ];
                    body.extend_from_slice(&uid);
                    state.answer(&body)?;
                }
            }
            other => {
                trace!(command = other, "unsupported command ignored");
            }
        }
        Ok(())
    }
}

impl ReaderBus for VirtualChip {
    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let payload = match parse_wire(bytes, TFI_HOST_TO_CHIP) {
            Ok(payload) => payload,
            Err(reason) => {
                debug!(%reason, "discarding unparseable host frame");
                return Ok(());
            }
        };
        match payload.first() {
            Some(&command) => self.execute(command),
            None => Ok(()),
        }
    }

    async fn read(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut state = lock(&self.state);
        // Single-byte reads poll the status line and consume nothing.
        if len == 1 {
            let status = if state.has_output() { STATUS_READY } else { 0x00 };
            return Ok(vec![status]);
        }
        let chunk = state.noise.pop_front().or_else(|| state.outbox.pop_front());
        match chunk {
            Some(mut chunk) => {
                chunk.resize(len, 0x00);
                Ok(chunk)
            }
            None => Ok(vec![0x00; len]),
        }
    }
}

/// Control handle for a [`VirtualChip`].
#[derive(Debug, Clone)]
pub struct VirtualChipHandle {
    state: Arc<Mutex<ChipState>>,
}

impl VirtualChipHandle {
    /// Place a tag with `uid` in the field. It stays there, answering
    /// every poll, until removed.
    pub fn present_tag(&self, uid: impl Into<Vec<u8>>) {
        lock(&self.state).tag = Some(uid.into());
    }

    /// Take the tag out of the field.
    pub fn remove_tag(&self) {
        lock(&self.state).tag = None;
    }

    /// Queue one noise chunk to be served before any real output.
    ///
    /// Short chunks are zero-padded to the read length, so a noise
    /// chunk looks exactly like a corrupted bus read to the driver.
    pub fn inject_noise(&self, chunk: impl Into<Vec<u8>>) {
        lock(&self.state).noise.push_back(chunk.into());
    }

    /// Whether the chip has accepted a SAMConfiguration command.
    pub fn was_configured(&self) -> bool {
        lock(&self.state).sam_configured
    }

    /// Command codes the chip has parsed so far, oldest first.
    pub fn commands(&self) -> Vec<u8> {
        lock(&self.state).commands.clone()
    }

    /// Number of chunks (noise and responses) not yet read.
    pub fn pending_chunks(&self) -> usize {
        let state = lock(&self.state);
        state.noise.len() + state.outbox.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tapgate_reader::Pn532;
    use tokio::time::Duration;

    const POLL: Duration = Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS);

    #[tokio::test(start_paused = true)]
    async fn test_firmware_command_answers_identification_word() {
        let (chip, handle) = VirtualChip::new();
        let mut driver = Pn532::new(chip);

        let version = driver.firmware_version().await.unwrap();

        assert_eq!(version.to_string(), "1.6");
        assert_eq!(version.ic(), 0x32);
        assert_eq!(handle.commands(), vec![CMD_GET_FIRMWARE_VERSION]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_sets_sam_flag() {
        let (chip, handle) = VirtualChip::new();
        let mut driver = Pn532::new(chip);
        assert!(!handle.was_configured());

        driver.configure().await.unwrap();

        assert!(handle.was_configured());
    }

    #[rstest]
    #[case(&[0x04, 0xAB, 0xCD, 0xEF], "04 AB CD EF")]
    #[case(&[0x04, 0x61, 0x3D, 0x2A, 0x4F, 0x80, 0x81], "04 61 3D 2A 4F 80 81")]
    #[tokio::test(start_paused = true)]
    async fn test_poll_reports_tag_in_field(#[case] uid: &[u8], #[case] expected: &str) {
        let (chip, handle) = VirtualChip::new();
        let mut driver = Pn532::new(chip);
        handle.present_tag(uid);

        let found = driver.read_uid(POLL).await;

        assert_eq!(found.unwrap().to_hex(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_field_times_out_into_none() {
        let (chip, handle) = VirtualChip::new();
        let mut driver = Pn532::new(chip);

        let found = driver.read_uid(POLL).await;

        assert!(found.is_none());
        // Every retry wrote a fresh poll command; none were answered.
        assert_eq!(
            handle.commands(),
            vec![CMD_IN_LIST_PASSIVE_TARGET; READ_RETRY_ATTEMPTS]
        );
        assert_eq!(handle.pending_chunks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_tag_stops_answering() {
        let (chip, handle) = VirtualChip::new();
        let mut driver = Pn532::new(chip);
        handle.present_tag([0x15, 0xD6, 0x14, 0x06]);

        assert!(driver.read_uid(POLL).await.is_some());

        handle.remove_tag();

        assert!(driver.read_uid(POLL).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_noise_chunks_are_scanned_past() {
        let (chip, handle) = VirtualChip::new();
        let mut driver = Pn532::new(chip);
        handle.present_tag([0x04, 0xAB]);
        // The poll flushes two chunks up front; the third lands in the
        // frame scan and must be rejected chunk by chunk.
        for _ in 0..3 {
            handle.inject_noise(vec![0x55; CHUNK_SIZE]);
        }

        let found = driver.read_uid(POLL).await;

        assert_eq!(found.unwrap().to_hex(), "04 AB");
        assert_eq!(handle.pending_chunks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_read_reflects_pending_output() {
        let (mut chip, handle) = VirtualChip::new();

        assert_eq!(chip.read(1).await.unwrap(), vec![0x00]);

        handle.inject_noise([0xAA, 0xBB]);

        assert_eq!(chip.read(1).await.unwrap(), vec![STATUS_READY]);
        // Status reads consume nothing.
        assert_eq!(handle.pending_chunks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unparseable_write_is_dropped() {
        let (mut chip, handle) = VirtualChip::new();

        chip.write(&[0x01, 0x02, 0x03]).await.unwrap();

        assert_eq!(handle.commands(), Vec::<u8>::new());
        assert_eq!(handle.pending_chunks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_command_stays_silent() {
        let (mut chip, handle) = VirtualChip::new();
        // RFConfiguration, which this firmware never issues.
        let wire = Frame::host(&[0x32, 0x05, 0xFF, 0x01]).unwrap().to_wire();

        chip.write(&wire).await.unwrap();

        assert_eq!(handle.commands(), vec![0x32]);
        assert_eq!(handle.pending_chunks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_noise_is_padded_to_read_length() {
        let (mut chip, handle) = VirtualChip::new();
        handle.inject_noise([0xAA]);

        let chunk = chip.read(CHUNK_SIZE).await.unwrap();

        assert_eq!(chunk.len(), CHUNK_SIZE);
        assert_eq!(chunk[0], 0xAA);
        assert!(chunk[1..].iter().all(|&b| b == 0x00));
    }
}
