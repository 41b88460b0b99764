//! Inbound chunk decoding for the reader link protocol.
//!
//! The reader chip never hands over a clean frame: the host pulls fixed
//! 32-byte chunks off the bus and has to locate a frame inside them. The
//! first byte of every chunk is a status byte (`0x01` = data ready), the
//! rest is bus noise, busy filler or a frame at an arbitrary offset.
//!
//! ```text
//! 01 | .. .. | 00 00 FF | LEN LCS | D5 BODY... | DCS | 00 | padding
//! ^^   noise   start      length    direction +  data  post
//! ready        marker     pair      body         cksum
//! ```
//!
//! [`decode_chunk`] applies the status gate and the busy-filler
//! fast-reject, then delegates to [`parse_wire`] which scans for the
//! start marker and validates length pair, checksums, postamble and
//! direction byte. Every validation failure is reported as a
//! [`ChunkError`]; the decoder never panics on hostile input.
//!
//! # Examples
//!
//! ```
//! use tapgate_core::constants::STATUS_READY;
//! use tapgate_protocol::{Frame, decode_chunk};
//!
//! let wire = Frame::chip(&[0x03, 0x32, 0x01, 0x06, 0x07]).unwrap().to_wire();
//! let mut chunk = vec![STATUS_READY];
//! chunk.extend_from_slice(&wire);
//! chunk.resize(32, 0x00);
//!
//! let payload = decode_chunk(&chunk).unwrap();
//! assert_eq!(&payload[..], &[0x03, 0x32, 0x01, 0x06, 0x07]);
//! ```

use bytes::Bytes;
use tapgate_core::constants::*;
use thiserror::Error;

use crate::frame::checksum;

/// Reasons a raw chunk failed to yield a frame payload.
///
/// These are expected during normal polling (the chip pads idle reads
/// with busy filler and zeroes), so callers usually log them at debug
/// level and keep scanning.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChunkError {
    /// Chunk is shorter than the smallest parseable frame.
    #[error("chunk too short to parse ({len} bytes)")]
    Short { len: usize },

    /// Status byte does not report data ready.
    #[error("status byte {status:#04X} is not ready")]
    NotReady { status: u8 },

    /// Chunk starts with the busy filler the chip emits mid-operation.
    #[error("chip busy filler")]
    Busy,

    /// No start marker anywhere in the chunk.
    #[error("no frame start marker")]
    NoStartMarker,

    /// Length byte and its checksum do not cancel out.
    #[error("length checksum mismatch (len {len:#04X}, lcs {lcs:#04X})")]
    LengthChecksum { len: u8, lcs: u8 },

    /// The advertised frame extends past the end of the chunk.
    #[error("frame truncated inside chunk")]
    Truncated,

    /// Byte after the data section is not the postamble.
    #[error("bad postamble {actual:#04X}")]
    Postamble { actual: u8 },

    /// Data checksum does not match the data section.
    #[error("data checksum mismatch (expected {expected:#04X}, got {actual:#04X})")]
    DataChecksum { expected: u8, actual: u8 },

    /// Frame carries the wrong direction byte.
    #[error("unexpected direction byte {actual:#04X}")]
    Direction { actual: u8 },
}

/// Decode one raw bus chunk into a chip-to-host frame payload.
///
/// The returned payload starts at the response code, with the direction
/// byte already stripped. Chunks may be longer than the usual 32 bytes;
/// anything after the postamble is ignored.
///
/// # Errors
///
/// Returns a [`ChunkError`] describing the first validation failure.
/// Rejection is the common case while polling an idle chip.
pub fn decode_chunk(raw: &[u8]) -> Result<Bytes, ChunkError> {
    if raw.len() < MIN_PARSEABLE_CHUNK {
        return Err(ChunkError::Short { len: raw.len() });
    }
    let status = raw[0];
    if status != STATUS_READY {
        return Err(ChunkError::NotReady { status });
    }
    let content = &raw[1..];
    if content[0] == BUSY_FILLER {
        return Err(ChunkError::Busy);
    }
    parse_wire(content, TFI_CHIP_TO_HOST)
}

/// Locate and validate a frame inside `buf`, returning its payload.
///
/// `expected_direction` selects which side of the link the frame must
/// come from. The host decodes chip frames through [`decode_chunk`];
/// emulated chips reuse this to parse host frames straight off their
/// write path.
pub fn parse_wire(buf: &[u8], expected_direction: u8) -> Result<Bytes, ChunkError> {
    let start = buf
        .windows(FRAME_START.len())
        .position(|window| window == FRAME_START.as_slice())
        .ok_or(ChunkError::NoStartMarker)?;
    let frame = &buf[start..];

    // Start marker, length pair, direction byte, checksum, postamble.
    if frame.len() < 8 {
        return Err(ChunkError::Truncated);
    }
    let len = frame[3];
    let lcs = frame[4];
    if len.wrapping_add(lcs) != 0 {
        return Err(ChunkError::LengthChecksum { len, lcs });
    }

    let data_end = 5 + len as usize;
    if frame.len() < data_end + 2 {
        return Err(ChunkError::Truncated);
    }
    let data = &frame[5..data_end];
    let dcs = frame[data_end];
    let postamble = frame[data_end + 1];
    if postamble != FRAME_POSTAMBLE {
        return Err(ChunkError::Postamble { actual: postamble });
    }
    let expected = checksum(data);
    if dcs != expected {
        return Err(ChunkError::DataChecksum {
            expected,
            actual: dcs,
        });
    }

    let Some((&direction, payload)) = data.split_first() else {
        return Err(ChunkError::Truncated);
    };
    if direction != expected_direction {
        return Err(ChunkError::Direction { actual: direction });
    }
    Ok(Bytes::copy_from_slice(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    /// Wrap a chip frame the way the bus delivers it: ready status in
    /// front, zero padding up to the chunk size.
    fn ready_chunk(body: &[u8]) -> Vec<u8> {
        let wire = Frame::chip(body).unwrap().to_wire();
        let mut chunk = vec![STATUS_READY];
        chunk.extend_from_slice(&wire);
        if chunk.len() < CHUNK_SIZE {
            chunk.resize(CHUNK_SIZE, 0x00);
        }
        chunk
    }

    #[test]
    fn test_decode_recovers_payload() {
        let chunk = ready_chunk(&[0x4B, 0x01, 0x01]);

        let payload = decode_chunk(&chunk).unwrap();

        assert_eq!(&payload[..], &[0x4B, 0x01, 0x01]);
    }

    #[test]
    fn test_decode_recovers_payload_after_leading_noise() {
        let wire = Frame::chip(&[0x15]).unwrap().to_wire();
        let mut chunk = vec![STATUS_READY, 0x7F, 0x7F, 0x7F];
        chunk.extend_from_slice(&wire);
        chunk.resize(CHUNK_SIZE, 0x00);

        let payload = decode_chunk(&chunk).unwrap();

        assert_eq!(&payload[..], &[0x15]);
    }

    #[test]
    fn test_decode_rejects_short_chunk() {
        let chunk = vec![STATUS_READY; MIN_PARSEABLE_CHUNK - 1];

        assert_eq!(
            decode_chunk(&chunk),
            Err(ChunkError::Short {
                len: MIN_PARSEABLE_CHUNK - 1
            })
        );
    }

    #[test]
    fn test_decode_rejects_not_ready_status() {
        let mut chunk = ready_chunk(&[0x03, 0x32]);
        chunk[0] = 0x00;

        assert_eq!(
            decode_chunk(&chunk),
            Err(ChunkError::NotReady { status: 0x00 })
        );
    }

    #[test]
    fn test_decode_rejects_busy_filler() {
        let mut chunk = vec![STATUS_READY];
        chunk.extend_from_slice(&[BUSY_FILLER; 31]);

        assert_eq!(decode_chunk(&chunk), Err(ChunkError::Busy));
    }

    #[test]
    fn test_decode_requires_start_marker() {
        let mut chunk = vec![STATUS_READY];
        chunk.extend_from_slice(&[0x55; 31]);

        assert_eq!(decode_chunk(&chunk), Err(ChunkError::NoStartMarker));
    }

    #[test]
    fn test_decode_rejects_length_checksum_mismatch() {
        let mut chunk = ready_chunk(&[0x03, 0x32]);
        // Corrupt LCS: chunk = status + marker(3) + LEN + LCS + ...
        chunk[5] ^= 0x01;

        assert!(matches!(
            decode_chunk(&chunk),
            Err(ChunkError::LengthChecksum { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_data_checksum_mismatch() {
        let mut chunk = ready_chunk(&[0x03, 0x32]);
        // First body byte sits after status + marker + length pair + direction.
        chunk[7] ^= 0x01;

        assert!(matches!(
            decode_chunk(&chunk),
            Err(ChunkError::DataChecksum { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_postamble() {
        let body = [0x03, 0x32];
        let mut chunk = ready_chunk(&body);
        // Postamble index: status + marker + length pair + data + dcs.
        let postamble_at = 1 + 3 + 2 + (body.len() + 1) + 1;
        chunk[postamble_at] = 0xAA;

        assert_eq!(
            decode_chunk(&chunk),
            Err(ChunkError::Postamble { actual: 0xAA })
        );
    }

    #[test]
    fn test_decode_rejects_host_direction() {
        let wire = Frame::host(&[0x02]).unwrap().to_wire();
        let mut chunk = vec![STATUS_READY];
        chunk.extend_from_slice(&wire);
        chunk.resize(CHUNK_SIZE, 0x00);

        assert_eq!(
            decode_chunk(&chunk),
            Err(ChunkError::Direction {
                actual: TFI_HOST_TO_CHIP
            })
        );
    }

    #[test]
    fn test_decode_rejects_truncated_frame() {
        let chunk = ready_chunk(&[0x4B, 0x01, 0x01]);
        // Cut the chunk off inside the data section.
        let truncated = &chunk[..MIN_PARSEABLE_CHUNK];

        // LEN promises more data than the slice holds.
        assert_eq!(
            parse_wire(&truncated[1..], TFI_CHIP_TO_HOST),
            Err(ChunkError::Truncated)
        );
    }

    #[test]
    fn test_parse_wire_accepts_host_frames() {
        let wire = Frame::host(&[0x14, 0x01, 0x14, 0x01]).unwrap().to_wire();

        let payload = parse_wire(&wire, TFI_HOST_TO_CHIP).unwrap();

        assert_eq!(&payload[..], &[0x14, 0x01, 0x14, 0x01]);
    }

    #[test]
    fn test_decode_rejects_every_in_frame_corruption() {
        let body = [0x4B, 0x01, 0x01, 0x04, 0x60, 0x04, 0x95];
        let wire = Frame::chip(&body).unwrap().to_wire();
        let mut chunk = vec![STATUS_READY];
        chunk.extend_from_slice(&wire);
        chunk.resize(CHUNK_SIZE, 0x00);

        for corrupt_at in 0..=wire.len() {
            let mut bad = chunk.clone();
            bad[corrupt_at] ^= 0xFF;

            assert!(
                decode_chunk(&bad).is_err(),
                "corruption at byte {corrupt_at} was accepted"
            );
        }
    }
}
