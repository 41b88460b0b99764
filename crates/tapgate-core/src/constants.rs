//! Core constants for the PN532 link protocol and device timing.
//!
//! This module defines the protocol-level constants used throughout the
//! tapgate access control firmware. These constants ensure consistent
//! framing against real PN532 silicon and provide centralized defaults
//! for device timing behavior.
//!
//! # Frame Structure
//!
//! The PN532 link layer wraps every command and response in the same
//! frame format:
//!
//! ```text
//! 00 00 FF | LEN | LCS | TFI DATA... | DCS | 00
//! ```
//!
//! Where:
//! - `00 00 FF` - Start-of-frame marker (preamble + start code)
//! - `LEN` - Number of data bytes, counting the TFI
//! - `LCS` - Length checksum, `(LEN + LCS) % 256 == 0`
//! - `TFI` - Frame direction indicator (`0xD4` host, `0xD5` chip)
//! - `DATA` - Command or response bytes
//! - `DCS` - Data checksum over TFI+DATA, `(sum + DCS) % 256 == 0`
//! - `00` - Postamble
//!
//! # Bus Chunking
//!
//! The chip is read in fixed 32-byte chunks. Each chunk is prefixed by a
//! status byte (`0x01` = frame ready); content may carry leading garbage
//! before the start marker, and a leading `0x80` marks a busy chunk that
//! can be rejected without scanning.
//!
//! # Usage
//!
//! ```
//! use tapgate_core::constants::*;
//!
//! // Direction indicators
//! assert_eq!(TFI_HOST_TO_CHIP, 0xD4);
//! assert_eq!(TFI_CHIP_TO_HOST, TFI_HOST_TO_CHIP + 1);
//!
//! // Timeout configuration
//! use std::time::Duration;
//! let budget = Duration::from_millis(COMMAND_TIMEOUT_MS);
//! ```

// ============================================================================
// Frame Markers
// ============================================================================

/// Start-of-frame marker: preamble byte plus the two-byte start code.
///
/// Every valid frame begins with this sequence. Response chunks may carry
/// stray bytes before it, so decoders scan forward for the marker rather
/// than requiring it at offset zero.
///
/// # Examples
///
/// ```
/// use tapgate_core::constants::FRAME_START;
///
/// let chunk = [0xAA, 0x00, 0x00, 0xFF, 0x02];
/// let pos = chunk.windows(3).position(|w| w == FRAME_START);
/// assert_eq!(pos, Some(1));
/// ```
pub const FRAME_START: [u8; 3] = [0x00, 0x00, 0xFF];

/// Postamble byte closing every frame.
pub const FRAME_POSTAMBLE: u8 = 0x00;

/// Frame direction indicator for host-to-chip traffic.
pub const TFI_HOST_TO_CHIP: u8 = 0xD4;

/// Frame direction indicator for chip-to-host traffic.
///
/// Responses carry this TFI; a decoded frame with any other direction
/// byte is rejected as malformed.
pub const TFI_CHIP_TO_HOST: u8 = 0xD5;

/// Maximum frame data length in bytes (TFI + payload).
///
/// `LEN` is a single byte, so the TFI plus payload can never exceed 255
/// bytes in a normal frame. Extended frames are not used by this device.
///
/// # Value: 255 bytes
pub const MAX_FRAME_DATA: usize = 255;

// ============================================================================
// Bus Chunking
// ============================================================================

/// Status byte indicating the chip has a frame ready to read.
pub const STATUS_READY: u8 = 0x01;

/// First content byte of a busy or garbage chunk.
///
/// The chip emits `0x80` filler while it has nothing to say. A chunk
/// whose first content byte matches can be rejected immediately without
/// scanning for a start marker.
pub const BUSY_FILLER: u8 = 0x80;

/// Fixed size of a single bus read, in bytes.
///
/// All reads from the chip pull exactly this many bytes (one status byte
/// plus 31 content bytes on a well-behaved bus). Short reads are handled
/// by the chunk decoder.
///
/// # Value: 32 bytes
pub const CHUNK_SIZE: usize = 32;

/// Minimum chunk length worth scanning for a frame.
///
/// Anything shorter cannot hold the marker, length bytes, a one-byte
/// payload, and both checksums.
///
/// # Value: 12 bytes
pub const MIN_PARSEABLE_CHUNK: usize = 12;

// ============================================================================
// Command Codes
// ============================================================================

/// GetFirmwareVersion command code.
///
/// Returns four bytes: IC identifier, firmware version, revision, and a
/// feature-support bitmask.
pub const CMD_GET_FIRMWARE_VERSION: u8 = 0x02;

/// SAMConfiguration command code.
///
/// Configures the secure access module mux. This device always selects
/// normal mode with a 1-second virtual-card timeout and IRQ delivery
/// (`[0x01, 0x14, 0x01]`).
pub const CMD_SAM_CONFIGURATION: u8 = 0x14;

/// InListPassiveTarget command code.
///
/// Polls for one ISO 14443 Type A target at 106 kbps
/// (`[0x01, 0x00]`).
pub const CMD_IN_LIST_PASSIVE_TARGET: u8 = 0x4A;

/// Offset between a command code and its response code.
///
/// The chip acknowledges command `N` with response code `N + 1`; any
/// other first byte is an unexpected response.
pub const RESPONSE_CODE_OFFSET: u8 = 1;

// ============================================================================
// Driver Timing
// ============================================================================

/// Interval between readiness polls while waiting for a response (milliseconds).
///
/// # Value: 10ms
pub const READY_POLL_INTERVAL_MS: u64 = 10;

/// Number of chunk-scan rounds before a response window is abandoned.
///
/// Each round performs two chunk reads; with [`FRAME_SCAN_PAUSE_MS`]
/// between rounds this bounds the post-readiness wait to roughly a
/// quarter second.
///
/// # Value: 12 rounds
pub const FRAME_SCAN_ROUNDS: usize = 12;

/// Pause between chunk-scan rounds (milliseconds).
///
/// # Value: 20ms
pub const FRAME_SCAN_PAUSE_MS: u64 = 20;

/// Response budget for configuration-class commands (milliseconds).
///
/// GetFirmwareVersion and SAMConfiguration answer well within this on
/// healthy hardware; exceeding it means the bus or chip is wedged.
///
/// # Value: 1500ms
pub const COMMAND_TIMEOUT_MS: u64 = 1500;

/// Settle delay after SAMConfiguration (milliseconds).
///
/// The chip drops off the bus briefly while the SAM mux reconfigures.
///
/// # Value: 50ms
pub const SAM_SETTLE_MS: u64 = 50;

/// Default response budget for a single tag poll (milliseconds).
///
/// Polling runs on every loop tick, so the budget is kept short: a tag
/// in the field answers in a few milliseconds, and an empty field should
/// not stall the tick.
///
/// # Value: 80ms
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 80;

/// Attempts per UID read before reporting an empty field.
///
/// # Value: 3 attempts
pub const READ_RETRY_ATTEMPTS: usize = 3;

/// Pause between UID read attempts (milliseconds).
///
/// # Value: 120ms
pub const READ_RETRY_PAUSE_MS: u64 = 120;

// ============================================================================
// Tick Loop Defaults
// ============================================================================

/// Default sleep between controller ticks (milliseconds).
///
/// # Value: 25ms
pub const DEFAULT_LOOP_SLEEP_MS: u64 = 25;

/// Default window for coalescing repeated reads of the same tag (milliseconds).
///
/// A tag resting on the antenna is reported by every poll; reads of the
/// same UID inside this window collapse into the original tap. Each
/// coalesced read refreshes the window.
///
/// # Value: 1200ms
pub const DEFAULT_COALESCE_WINDOW_MS: u64 = 1200;

/// Extra sleep after a coalesced read (milliseconds).
///
/// # Value: 40ms
pub const COALESCE_REST_MS: u64 = 40;

/// Default backoff after a failed tick (milliseconds).
///
/// # Value: 120ms
pub const DEFAULT_ERROR_BACKOFF_MS: u64 = 120;

/// Default retry interval for the one-shot online announcement (milliseconds).
///
/// # Value: 10000ms (10 seconds)
pub const DEFAULT_ANNOUNCE_RETRY_MS: u64 = 10_000;

// ============================================================================
// Gesture Defaults
// ============================================================================

/// Default multi-tap window (milliseconds).
///
/// All taps of a tap sequence must land within this window of the first
/// tap; a later edge restarts the count at 1.
///
/// # Value: 30000ms (30 seconds)
pub const DEFAULT_PRESS_WINDOW_MS: u64 = 30_000;

/// Number of taps that triggers the provisioning mode switch.
///
/// # Value: 7 taps
pub const PRESS_TARGET: u32 = 7;

/// Default debounce interval between accepted edges (milliseconds).
///
/// Edges closer together than this are contact chatter, not taps.
///
/// # Value: 180ms
pub const DEFAULT_DEBOUNCE_MS: u64 = 180;

/// Default hold duration that triggers a credential hard-reset (milliseconds).
///
/// # Value: 10000ms (10 seconds)
pub const DEFAULT_HOLD_CLEAR_MS: u64 = 10_000;

// ============================================================================
// UID Constraints
// ============================================================================

/// Minimum UID length in bytes.
///
/// ISO 14443 defines 4/7/10-byte UIDs, but operators paste truncated
/// UIDs from labels and legacy exports, so anything non-empty that the
/// chip or a human can produce is accepted.
pub const MIN_UID_LENGTH: usize = 1;

/// Maximum UID length in bytes (triple-size UID per ISO 14443).
pub const MAX_UID_LENGTH: usize = 10;
