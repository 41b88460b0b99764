use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Frame errors
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Checksum mismatch: expected {expected:#04X}, got {actual:#04X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Frame data too large: {len} bytes (limit {limit})")]
    FrameTooLarge { len: usize, limit: usize },

    // UID errors
    #[error("Bad UID format: {0}")]
    BadUidFormat(String),

    #[error("Bad UID length: {len} bytes")]
    BadUidLength { len: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
