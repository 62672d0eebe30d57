//! Tune fingerprints used as duration database keys.

use md5::digest::Output;
use md5::{Digest, Md5};
use std::fmt;
use std::str::FromStr;

/// MD5 digest of a tune, written as 32 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    /// Digest raw tune bytes.
    pub fn of(data: &[u8]) -> Self {
        let digest = Md5::digest(data);
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Wrap an already computed digest.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", Output::<Md5>::from(self.0))
    }
}

/// Error returned when a string is not a 32-digit hex digest.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid fingerprint '{0}'")]
pub struct ParseFingerprintError(String);

impl FromStr for Fingerprint {
    type Err = ParseFingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseFingerprintError(s.to_string()));
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| ParseFingerprintError(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}
