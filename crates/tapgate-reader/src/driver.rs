//! Command/response driver for the PN532 reader chip.
//!
//! The chip is a polled device: the host writes a command frame, waits
//! for the status line to report data ready, then pulls fixed-size
//! chunks off the bus until a valid response frame surfaces. This
//! module owns that discipline end to end:
//!
//! 1. [`Pn532::wait_ready`] polls the one-byte status read.
//! 2. [`Pn532::read_frame`] scans a bounded number of chunk rounds,
//!    pausing between rounds, and rejects noise chunk by chunk.
//! 3. [`Pn532::command`] pairs a request with its acknowledging
//!    response code (`command + 1`).
//! 4. [`Pn532::read_uid`] wraps the passive-target poll in bounded
//!    retries and reports plain absence instead of failing.
//!
//! All timing knobs live in [`tapgate_core::constants`].

use bytes::Bytes;
use tapgate_core::constants::*;
use tapgate_core::{FirmwareVersion, Uid};
use tapgate_protocol::{Frame, decode_chunk};
use tokio::time::{Duration, Instant, sleep};
use tracing::{debug, trace};

use crate::error::{ReaderError, Result};
use crate::traits::ReaderBus;

/// Driver for a PN532 chip behind a [`ReaderBus`].
///
/// The driver is deliberately stateless between calls: every command
/// re-runs the full ready/scan cycle, which is what keeps it robust
/// against the half-frames and stale chunks a shared bus produces.
#[derive(Debug)]
pub struct Pn532<B> {
    bus: B,
}

impl<B: ReaderBus> Pn532<B> {
    /// Create a driver over `bus`.
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Consume the driver and return the underlying bus.
    pub fn into_inner(self) -> B {
        self.bus
    }

    /// Poll the status byte until the chip reports data ready.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::Timeout`] if the chip stays busy past
    /// `timeout`, or a bus error if a status read fails.
    pub async fn wait_ready(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.bus.read(1).await?;
            if status.first() == Some(&STATUS_READY) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ReaderError::timeout(timeout.as_millis() as u64));
            }
            sleep(Duration::from_millis(READY_POLL_INTERVAL_MS)).await;
        }
    }

    /// Wait for readiness, then scan bus chunks until a chip frame
    /// parses, returning its payload (response code first).
    ///
    /// Each scan round pulls two chunks back to back; rounds are spaced
    /// out so a slow chip can finish flushing a frame into its FIFO.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::Framing`] when the scan budget is spent
    /// without a valid frame, or the readiness/bus error that cut the
    /// scan short.
    pub async fn read_frame(&mut self, timeout: Duration) -> Result<Bytes> {
        self.wait_ready(timeout).await?;
        for round in 0..FRAME_SCAN_ROUNDS {
            for _ in 0..2 {
                let chunk = self.bus.read(CHUNK_SIZE).await?;
                match decode_chunk(&chunk) {
                    Ok(payload) => return Ok(payload),
                    Err(reason) => trace!(round, %reason, "chunk rejected"),
                }
            }
            sleep(Duration::from_millis(FRAME_SCAN_PAUSE_MS)).await;
        }
        Err(ReaderError::framing("no valid frame within scan budget"))
    }

    /// Send `command` with `params` and return the response payload
    /// with the acknowledging response code already stripped.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::UnexpectedResponse`] if the chip answers
    /// with anything other than `command + 1`, plus all the failure
    /// modes of [`Pn532::read_frame`].
    pub async fn command(&mut self, command: u8, params: &[u8], timeout: Duration) -> Result<Bytes> {
        let mut body = Vec::with_capacity(1 + params.len());
        body.push(command);
        body.extend_from_slice(params);
        let frame = Frame::host(&body)?;
        self.bus.write(&frame.to_wire()).await?;

        let response = self.read_frame(timeout).await?;
        match response.first() {
            Some(&code) if code == command.wrapping_add(RESPONSE_CODE_OFFSET) => {
                Ok(response.slice(1..))
            }
            Some(&code) => Err(ReaderError::unexpected_response(command, code)),
            None => Err(ReaderError::short_response(1, 0)),
        }
    }

    /// Query the chip's firmware identification word.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::ShortResponse`] if the chip answers with
    /// fewer than the four identification bytes.
    pub async fn firmware_version(&mut self) -> Result<FirmwareVersion> {
        let response = self
            .command(
                CMD_GET_FIRMWARE_VERSION,
                &[],
                Duration::from_millis(COMMAND_TIMEOUT_MS),
            )
            .await?;
        if response.len() < 4 {
            return Err(ReaderError::short_response(4, response.len()));
        }
        let version =
            FirmwareVersion::from_bytes([response[0], response[1], response[2], response[3]]);
        debug!(%version, "firmware identified");
        Ok(version)
    }

    /// Configure the SAM for normal card reading and let it settle.
    ///
    /// # Errors
    ///
    /// Propagates the failure modes of [`Pn532::command`].
    pub async fn configure(&mut self) -> Result<()> {
        // Normal mode, standard timeout field, IRQ pin enabled.
        self.command(
            CMD_SAM_CONFIGURATION,
            &[0x01, 0x14, 0x01],
            Duration::from_millis(COMMAND_TIMEOUT_MS),
        )
        .await?;
        sleep(Duration::from_millis(SAM_SETTLE_MS)).await;
        debug!("SAM configured");
        Ok(())
    }

    /// Poll for a passive target and return its UID, or `None` when the
    /// field is empty.
    ///
    /// Absence is the normal case, so this never fails: stale chunks
    /// are flushed first, then the poll is retried a bounded number of
    /// times with a pause in between, and any failure inside the retry
    /// budget is logged at debug level and reported as an empty field.
    pub async fn read_uid(&mut self, poll_timeout: Duration) -> Option<Uid> {
        // Drain leftovers so the scan cannot parse a stale frame.
        for _ in 0..2 {
            let _ = self.bus.read(CHUNK_SIZE).await;
        }
        for attempt in 0..READ_RETRY_ATTEMPTS {
            match self.poll_target(poll_timeout).await {
                Ok(found) => return found,
                Err(error) => {
                    debug!(attempt, %error, "passive target poll failed");
                    sleep(Duration::from_millis(READ_RETRY_PAUSE_MS)).await;
                }
            }
        }
        None
    }

    /// One passive-target poll: at most one ISO14443A target at 106
    /// kbps. A well-formed "no target" answer is `Ok(None)`; malformed
    /// answers are errors so the caller can retry them.
    async fn poll_target(&mut self, poll_timeout: Duration) -> Result<Option<Uid>> {
        let response = self
            .command(CMD_IN_LIST_PASSIVE_TARGET, &[0x01, 0x00], poll_timeout)
            .await?;
        if response.len() < 7 {
            return Err(ReaderError::short_response(7, response.len()));
        }
        if response[0] != 0x01 {
            return Ok(None);
        }
        let uid_len = response[5] as usize;
        if response.len() < 6 + uid_len {
            return Err(ReaderError::short_response(6 + uid_len, response.len()));
        }
        let uid = Uid::new(response.slice(6..6 + uid_len).to_vec())?;
        trace!(uid = %uid.to_hex(), "passive target detected");
        Ok(Some(uid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBus, MockBusHandle};
    use rstest::rstest;

    /// Passive-target response body carrying one card UID.
    fn target_body(uid: &[u8]) -> Vec<u8> {
        let mut body = vec![0x4B, 0x01, 0x01, 0x00, 0x04, 0x08, uid.len() as u8];
        body.extend_from_slice(uid);
        body
    }

    /// Occupy the two pre-poll flush reads `read_uid` issues.
    fn prime_flush(handle: &MockBusHandle) {
        for _ in 0..2 {
            handle.push_read([0x00]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_returns_on_ready_status() {
        let (bus, handle) = MockBus::new();
        let mut driver = Pn532::new(bus);
        handle.push_read([0x00]);
        handle.push_read([STATUS_READY]);

        driver
            .wait_ready(Duration::from_millis(COMMAND_TIMEOUT_MS))
            .await
            .unwrap();

        assert_eq!(handle.remaining_reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_times_out_on_idle_bus() {
        let (bus, _handle) = MockBus::new();
        let mut driver = Pn532::new(bus);

        let result = driver.wait_ready(Duration::from_millis(100)).await;

        assert!(matches!(
            result,
            Err(ReaderError::Timeout { timeout_ms: 100 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_writes_canonical_frame() {
        let (bus, handle) = MockBus::new();
        let mut driver = Pn532::new(bus);
        handle
            .push_chip_response(&[0x03, 0x32, 0x01, 0x06, 0x07])
            .unwrap();

        driver.firmware_version().await.unwrap();

        // GetFirmwareVersion is the textbook frame, byte for byte.
        assert_eq!(
            handle.writes(),
            vec![vec![0x00, 0x00, 0xFF, 0x02, 0xFE, 0xD4, 0x02, 0x2A, 0x00]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_firmware_version_parses_identification_word() {
        let (bus, handle) = MockBus::new();
        let mut driver = Pn532::new(bus);
        handle
            .push_chip_response(&[0x03, 0x32, 0x01, 0x06, 0x07])
            .unwrap();

        let version = driver.firmware_version().await.unwrap();

        assert_eq!(version.ic(), 0x32);
        assert_eq!(version.version(), 1);
        assert_eq!(version.revision(), 6);
        assert_eq!(version.to_string(), "1.6");
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_rejects_wrong_response_code() {
        let (bus, handle) = MockBus::new();
        let mut driver = Pn532::new(bus);
        // SAM configuration answered with a firmware response code.
        handle.push_chip_response(&[0x03, 0x32]).unwrap();

        let result = driver.configure().await;

        assert!(matches!(
            result,
            Err(ReaderError::UnexpectedResponse {
                command: CMD_SAM_CONFIGURATION,
                response: 0x03,
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_frame_skips_noise_chunks() {
        let (bus, handle) = MockBus::new();
        let mut driver = Pn532::new(bus);
        handle.push_read([STATUS_READY]);
        let mut busy = vec![STATUS_READY];
        busy.extend_from_slice(&[BUSY_FILLER; 31]);
        handle.push_read(busy);
        handle.push_read(vec![0x55; CHUNK_SIZE]);
        handle.push_ready_chunk(&[0x15]).unwrap();

        let payload = driver
            .read_frame(Duration::from_millis(COMMAND_TIMEOUT_MS))
            .await
            .unwrap();

        assert_eq!(&payload[..], &[0x15]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_frame_gives_up_after_scan_budget() {
        let (bus, handle) = MockBus::new();
        let mut driver = Pn532::new(bus);
        handle.push_read([STATUS_READY]);
        // Every subsequent chunk read returns idle zeroes.

        let result = driver
            .read_frame(Duration::from_millis(COMMAND_TIMEOUT_MS))
            .await;

        assert!(matches!(result, Err(ReaderError::Framing { .. })));
    }

    #[rstest]
    #[case(&[0x04, 0xAB, 0xCD, 0xEF], "04 AB CD EF")]
    #[case(&[0x04, 0x61, 0x3D, 0x2A, 0x4F, 0x80, 0x81], "04 61 3D 2A 4F 80 81")]
    #[case(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10], "01 02 03 04 05 06 07 08 09 0A")]
    #[tokio::test(start_paused = true)]
    async fn test_read_uid_returns_uid_on_valid_response(
        #[case] uid_bytes: &[u8],
        #[case] expected_hex: &str,
    ) {
        let (bus, handle) = MockBus::new();
        let mut driver = Pn532::new(bus);
        prime_flush(&handle);
        handle.push_chip_response(&target_body(uid_bytes)).unwrap();

        let uid = driver
            .read_uid(Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS))
            .await;

        assert_eq!(uid.unwrap().to_hex(), expected_hex);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_uid_returns_none_on_idle_bus() {
        let (bus, handle) = MockBus::new();
        let mut driver = Pn532::new(bus);

        let uid = driver
            .read_uid(Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS))
            .await;

        assert!(uid.is_none());
        // Three polls were attempted, each writing one command frame.
        assert_eq!(handle.writes().len(), READ_RETRY_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_uid_returns_none_when_chip_reports_no_target() {
        let (bus, handle) = MockBus::new();
        let mut driver = Pn532::new(bus);
        prime_flush(&handle);
        handle
            .push_chip_response(&[0x4B, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
            .unwrap();

        let uid = driver
            .read_uid(Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS))
            .await;

        // A well-formed empty-field answer is not retried.
        assert!(uid.is_none());
        assert_eq!(handle.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_uid_retries_through_framing_noise() {
        let (bus, handle) = MockBus::new();
        let mut driver = Pn532::new(bus);
        prime_flush(&handle);
        // First attempt: ready, then nothing but junk chunks.
        handle.push_read([STATUS_READY]);
        for _ in 0..(FRAME_SCAN_ROUNDS * 2) {
            handle.push_read(vec![0x55; CHUNK_SIZE]);
        }
        // Second attempt: a clean target response.
        handle
            .push_chip_response(&target_body(&[0x15, 0xD6, 0x14]))
            .unwrap();

        let uid = driver
            .read_uid(Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS))
            .await;

        assert_eq!(uid.unwrap().to_hex(), "15 D6 14");
        assert_eq!(handle.writes().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_uid_swallows_bus_errors() {
        let (bus, handle) = MockBus::new();
        let mut driver = Pn532::new(bus);
        prime_flush(&handle);
        // Every poll attempt hits a bus fault on its first status read.
        for _ in 0..READ_RETRY_ATTEMPTS {
            handle.push_read_error("i2c nack");
        }

        let uid = driver
            .read_uid(Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS))
            .await;

        assert!(uid.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_uid_rejects_truncated_uid_field() {
        let (bus, handle) = MockBus::new();
        let mut driver = Pn532::new(bus);
        prime_flush(&handle);
        // UID length byte promises 7 bytes but only 2 follow.
        handle
            .push_chip_response(&[0x4B, 0x01, 0x01, 0x00, 0x04, 0x08, 0x07, 0x04, 0xAB])
            .unwrap();

        let uid = driver
            .read_uid(Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS))
            .await;

        assert!(uid.is_none());
    }
}
