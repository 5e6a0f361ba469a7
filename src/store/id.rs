//! Native document identifiers and their wire encoding.
//!
//! A [`DocumentId`] is 12 bytes: a 4-byte creation timestamp, a 5-byte
//! per-process tag, and a 3-byte counter. On the wire it travels as an
//! opaque 24-character lowercase hex string. Encoding is total;
//! decoding is partial and rejects malformed input with a structured
//! error instead of panicking.

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Raw identifier size in bytes.
pub const RAW_ID_LEN: usize = 12;

/// Wire encoding length in characters (two hex digits per byte).
pub const ENCODED_ID_LEN: usize = 2 * RAW_ID_LEN;

/// Decode failure for a wire identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidDocumentId {
    /// Wrong input length.
    #[error("expected {ENCODED_ID_LEN} hex characters, got {0}")]
    Length(usize),

    /// A character outside `[0-9a-f]`.
    #[error("invalid hex character {0:?}")]
    Character(char),
}

/// Native identifier of a stored document.
///
/// Immutable once assigned; uniquely identifies a document within the
/// process generating it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId([u8; RAW_ID_LEN]);

impl DocumentId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        let count = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tag = process_tag();

        let mut raw = [0u8; RAW_ID_LEN];
        raw[0..4].copy_from_slice(&secs.to_be_bytes());
        raw[4..9].copy_from_slice(tag);
        raw[9..12].copy_from_slice(&count.to_be_bytes()[1..4]);
        Self(raw)
    }

    /// Construct from raw bytes.
    pub fn from_bytes(raw: [u8; RAW_ID_LEN]) -> Self {
        Self(raw)
    }

    /// Raw byte view.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; RAW_ID_LEN] {
        &self.0
    }

    /// Encode as a 24-character lowercase hex string. Total: every
    /// identifier has exactly one encoding.
    pub fn to_hex(&self) -> String {
        const DIGITS: &[u8; 16] = b"0123456789abcdef";
        let mut out = String::with_capacity(ENCODED_ID_LEN);
        for byte in self.0 {
            out.push(DIGITS[(byte >> 4) as usize] as char);
            out.push(DIGITS[(byte & 0x0f) as usize] as char);
        }
        out
    }

    /// Decode a wire identifier.
    ///
    /// # Errors
    ///
    /// Rejects anything that is not exactly 24 lowercase (or uppercase)
    /// hex characters.
    pub fn parse_hex(input: &str) -> Result<Self, InvalidDocumentId> {
        let chars: Vec<char> = input.chars().collect();
        if chars.len() != ENCODED_ID_LEN {
            return Err(InvalidDocumentId::Length(chars.len()));
        }

        let mut raw = [0u8; RAW_ID_LEN];
        for (i, pair) in chars.chunks(2).enumerate() {
            let hi = hex_value(pair[0])?;
            let lo = hex_value(pair[1])?;
            raw[i] = (hi << 4) | lo;
        }
        Ok(Self(raw))
    }
}

fn hex_value(c: char) -> Result<u8, InvalidDocumentId> {
    c.to_digit(16)
        .map(|v| v as u8)
        .ok_or(InvalidDocumentId::Character(c))
}

/// Five bytes unique to this process, derived once from the pid and a
/// randomly seeded hasher.
fn process_tag() -> &'static [u8; 5] {
    static TAG: OnceLock<[u8; 5]> = OnceLock::new();
    TAG.get_or_init(|| {
        let seed = RandomState::new().build_hasher().finish();
        let mixed = seed ^ u64::from(std::process::id()).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        let bytes = mixed.to_be_bytes();
        [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4]]
    })
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.to_hex())
    }
}

impl FromStr for DocumentId {
    type Err = InvalidDocumentId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(s)
    }
}
