use crate::{
    Result,
    constants::{MAX_UID_LENGTH, MIN_UID_LENGTH},
    error::Error,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use subtle::ConstantTimeEq;

/// NFC tag unique identifier (1-10 bytes).
///
/// The canonical text form is uppercase hex octets separated by single
/// spaces (`"15 D6 14 06"`). Parsing is tolerant: continuous hex runs,
/// colon or dash separators, and lowercase digits are all accepted, and
/// re-parsing a canonical string yields the same UID.
///
/// # Security
/// This type implements constant-time comparison to prevent timing attacks
/// when UIDs are checked against the allow-list.
#[derive(Debug, Clone, Eq)]
pub struct Uid(Vec<u8>);

impl Uid {
    /// Create a UID from raw bytes with length validation.
    ///
    /// # Errors
    /// Returns `Error::BadUidLength` if the byte count is outside 1-10.
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        let len = bytes.len();
        if !(MIN_UID_LENGTH..=MAX_UID_LENGTH).contains(&len) {
            return Err(Error::BadUidLength { len });
        }
        Ok(Uid(bytes))
    }

    /// Parse a UID from operator-supplied hex text.
    ///
    /// Accepted forms for the same UID:
    /// - `"15D614"` (continuous run, split into octet pairs)
    /// - `"15 D6 14"` (canonical)
    /// - `"15:D6:14"` / `"15-d6-14"` (colon/dash separated, any case)
    ///
    /// # Errors
    /// Returns `Error::BadUidFormat` for empty input, non-hex characters,
    /// an odd-length continuous run, or tokens longer than one octet, and
    /// `Error::BadUidLength` if the decoded byte count is out of range.
    pub fn parse_hex(input: &str) -> Result<Self> {
        let normalized = input.trim().replace([':', '-'], " ");
        let tokens: Vec<&str> = normalized.split_whitespace().collect();

        let bytes = match tokens.as_slice() {
            [] => return Err(Error::BadUidFormat("empty UID".to_string())),
            [run] if run.len() > 2 => Self::split_hex_run(run)?,
            _ => tokens
                .iter()
                .map(|token| Self::parse_octet(token))
                .collect::<Result<Vec<u8>>>()?,
        };

        Uid::new(bytes)
    }

    /// Split an unseparated hex run ("15D61406") into octets.
    fn split_hex_run(run: &str) -> Result<Vec<u8>> {
        if !run.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::BadUidFormat(format!("invalid hex run: '{run}'")));
        }
        if run.len() % 2 != 0 {
            return Err(Error::BadUidFormat(format!(
                "hex run '{run}' has an odd number of digits"
            )));
        }

        (0..run.len())
            .step_by(2)
            .map(|i| Self::parse_octet(&run[i..i + 2]))
            .collect()
    }

    /// Parse a single octet token (one or two hex digits).
    fn parse_octet(token: &str) -> Result<u8> {
        let well_formed =
            matches!(token.len(), 1 | 2) && token.chars().all(|c| c.is_ascii_hexdigit());
        if !well_formed {
            return Err(Error::BadUidFormat(format!("invalid hex octet: '{token}'")));
        }

        u8::from_str_radix(token, 16)
            .map_err(|_| Error::BadUidFormat(format!("invalid hex octet: '{token}'")))
    }

    /// Format as canonical hex: uppercase octets, space separated.
    ///
    /// # Examples
    ///
    /// ```
    /// use tapgate_core::Uid;
    ///
    /// let uid = Uid::new(vec![0x15, 0xD6, 0x14, 0x06]).unwrap();
    /// assert_eq!(uid.to_hex(), "15 D6 14 06");
    /// ```
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Get the raw UID bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the UID, returning the raw bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// UID length in bytes (always 1-10).
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; a validated UID is never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for Uid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uid::parse_hex(s)
    }
}

/// Constant-time comparison implementation for Uid
///
/// This prevents timing attacks by ensuring comparison takes the same time
/// regardless of where the byte sequences differ.
impl PartialEq for Uid {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

/// Hash implementation for Uid
///
/// Implements standard hashing for use in hash-based collections.
impl std::hash::Hash for Uid {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Serialized as the canonical hex string.
impl Serialize for Uid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Uid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Uid::parse_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// A provisioned tag: UID plus the holder's display name.
///
/// The name may be empty; tags imported from legacy card files have no
/// name until an operator assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub uid: Uid,
    pub name: String,
}

impl Card {
    /// Create a card record.
    #[must_use]
    pub fn new(uid: Uid, name: impl Into<String>) -> Self {
        Card {
            uid,
            name: name.into(),
        }
    }
}

/// Outcome of checking a tag against the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessDecision {
    Granted,
    Denied,
}

impl AccessDecision {
    /// Build a decision from an allow-list hit.
    #[inline]
    #[must_use]
    pub fn from_allowed(allowed: bool) -> Self {
        if allowed {
            AccessDecision::Granted
        } else {
            AccessDecision::Denied
        }
    }

    /// Returns `true` if access was granted.
    #[inline]
    #[must_use]
    pub fn is_granted(self) -> bool {
        matches!(self, AccessDecision::Granted)
    }

    /// Wire form used in event payloads and notifications.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AccessDecision::Granted => "GRANTED",
            AccessDecision::Denied => "DENIED",
        }
    }
}

impl fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Origin of a broadcast event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    /// A physical tag read.
    Nfc,
    /// An admin command (web frontend or chat bot).
    #[serde(rename = "cmd")]
    Command,
    /// The snapshot replayed to a freshly attached subscriber.
    Init,
}

impl EventSource {
    /// Wire form used in event payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventSource::Nfc => "nfc",
            EventSource::Command => "cmd",
            EventSource::Init => "init",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Firmware identification returned by GetFirmwareVersion.
///
/// Wraps the four response bytes in big-endian order: IC identifier,
/// version, revision, and feature-support bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion(u32);

impl FirmwareVersion {
    /// Wrap a raw big-endian firmware word.
    #[must_use]
    pub fn new(raw: u32) -> Self {
        FirmwareVersion(raw)
    }

    /// Build from the four response bytes as they arrive on the wire.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        FirmwareVersion(u32::from_be_bytes(bytes))
    }

    /// Raw firmware word.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// IC identifier (0x32 for the PN532).
    #[must_use]
    pub fn ic(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Major firmware version.
    #[must_use]
    pub fn version(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Firmware revision.
    #[must_use]
    pub fn revision(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Feature-support bitmask.
    #[must_use]
    pub fn support(self) -> u8 {
        self.0 as u8
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.version(), self.revision())
    }
}
