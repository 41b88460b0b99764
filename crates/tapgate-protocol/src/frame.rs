use bytes::{BufMut, Bytes, BytesMut};
use tapgate_core::constants::*;
use tapgate_core::{Error, Result};

/// Two's-complement checksum over `bytes`.
///
/// The returned value is chosen so that `sum(bytes) + checksum == 0`
/// modulo 256, which is how the chip validates both the length byte
/// and the data section of a frame.
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum: u8 = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    sum.wrapping_neg()
}

/// Frame represents one link-level packet exchanged with the reader chip.
///
/// A frame carries a direction byte followed by the command or response
/// body. [`Frame::to_wire`] adds the start marker, length bytes and
/// checksums that the chip expects on the bus.
///
/// # Wire Format
///
/// ```text
/// 00 00 FF | LEN | LCS | DIR BODY... | DCS | 00
/// ^^^^^^^^   ^^^   ^^^   ^^^^^^^^^^    ^^^   ^^
/// start      len   len   direction +   data  postamble
/// marker           cksum body          cksum
/// ```
///
/// `LEN` counts the direction byte plus the body. `LCS` satisfies
/// `LEN + LCS == 0 (mod 256)` and `DCS` does the same for the direction
/// byte and body together.
///
/// # Basic Usage
///
/// ```
/// use tapgate_core::constants::CMD_GET_FIRMWARE_VERSION;
/// use tapgate_protocol::Frame;
///
/// let frame = Frame::host(&[CMD_GET_FIRMWARE_VERSION]).unwrap();
/// let wire = frame.to_wire();
///
/// assert_eq!(&wire[..3], &[0x00, 0x00, 0xFF]);
/// assert_eq!(wire[3], 2); // direction byte + command byte
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Direction byte followed by the frame body.
    data: Bytes,
}

impl Frame {
    /// Build a host-to-chip frame carrying `body` (command byte plus
    /// parameters).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedFrame`] for an empty body and
    /// [`Error::FrameTooLarge`] when the direction byte plus body would
    /// not fit the single length byte.
    pub fn host(body: &[u8]) -> Result<Self> {
        Self::with_direction(TFI_HOST_TO_CHIP, body)
    }

    /// Build a chip-to-host frame carrying `body` (response code plus
    /// payload). Used by emulated chips to answer like real hardware.
    pub fn chip(body: &[u8]) -> Result<Self> {
        Self::with_direction(TFI_CHIP_TO_HOST, body)
    }

    fn with_direction(direction: u8, body: &[u8]) -> Result<Self> {
        if body.is_empty() {
            return Err(Error::MalformedFrame(
                "frame body must carry at least a command byte".to_string(),
            ));
        }
        let len = body.len() + 1;
        if len > MAX_FRAME_DATA {
            return Err(Error::FrameTooLarge {
                len,
                limit: MAX_FRAME_DATA,
            });
        }

        let mut data = BytesMut::with_capacity(len);
        data.put_u8(direction);
        data.put_slice(body);
        Ok(Frame {
            data: data.freeze(),
        })
    }

    /// Direction byte of this frame (`0xD4` host-to-chip, `0xD5`
    /// chip-to-host).
    pub fn direction(&self) -> u8 {
        self.data[0]
    }

    /// Frame body without the direction byte.
    pub fn body(&self) -> &[u8] {
        &self.data[1..]
    }

    /// Serialize the frame into the byte layout the chip reads off the
    /// bus: start marker, length pair, data section, data checksum and
    /// postamble.
    pub fn to_wire(&self) -> Bytes {
        let len = self.data.len() as u8;
        let mut wire = BytesMut::with_capacity(self.data.len() + 7);
        wire.put_slice(&FRAME_START);
        wire.put_u8(len);
        wire.put_u8(len.wrapping_neg());
        wire.put_slice(&self.data);
        wire.put_u8(checksum(&self.data));
        wire.put_u8(FRAME_POSTAMBLE);
        wire.freeze()
    }
}
