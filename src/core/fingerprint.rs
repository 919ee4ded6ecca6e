//! Content fingerprints.
//!
//! A fingerprint is the SHA-256 digest of the exact artifact bytes. It is
//! what gets anchored to the ledger and what a verifier recomputes, so the
//! hex rendering matches `shasum -a 256` output byte for byte.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Digest length in bytes
pub const FINGERPRINT_LEN: usize = 32;

/// Read buffer used when hashing files
const CHUNK_SIZE: usize = 64 * 1024;

/// SHA-256 digest of an artifact
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Wrap raw digest bytes
    pub fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Lowercase hex rendering (64 chars)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 16 hex chars, for log lines and tables
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

/// Errors parsing a hex fingerprint
#[derive(Debug, Error, PartialEq)]
pub enum FingerprintParseError {
    #[error("Fingerprint is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("Fingerprint must be {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

impl FromStr for Fingerprint {
    type Err = FingerprintParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())?;
        let actual = bytes.len();
        let digest: [u8; FINGERPRINT_LEN] =
            bytes
                .try_into()
                .map_err(|_| FingerprintParseError::WrongLength {
                    expected: FINGERPRINT_LEN,
                    actual,
                })?;
        Ok(Self(digest))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors computing a fingerprint
#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("Cannot fingerprint an empty artifact")]
    EmptyInput,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fingerprint an in-memory artifact
pub fn fingerprint(bytes: &[u8]) -> Result<Fingerprint, FingerprintError> {
    if bytes.is_empty() {
        return Err(FingerprintError::EmptyInput);
    }

    let digest = Sha256::digest(bytes);
    Ok(Fingerprint(digest.into()))
}

/// Fingerprint a file on disk without loading it whole
pub async fn fingerprint_file(path: &Path) -> Result<Fingerprint, FingerprintError> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    if total == 0 {
        return Err(FingerprintError::EmptyInput);
    }

    Ok(Fingerprint(hasher.finalize().into()))
}
