//! Content fingerprints used for change detection.
//!
//! A fingerprint is the lowercase hex SHA-256 of the raw payload bytes. Two
//! payloads are treated as unchanged exactly when their fingerprints match.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// A payload could not be fingerprinted. Per-item and never fatal to a cycle.
#[derive(Debug, Error)]
#[error("cannot fingerprint payload: {0}")]
pub struct FingerprintError(pub String);

/// Seam over the digest so reconciliation can be exercised with failures.
pub trait Fingerprinter {
    fn fingerprint(&self, payload: &[u8]) -> Result<String, FingerprintError>;
}

/// SHA-256 over the raw bytes. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Fingerprinter;

impl Fingerprinter for Sha256Fingerprinter {
    fn fingerprint(&self, payload: &[u8]) -> Result<String, FingerprintError> {
        Ok(fingerprint(payload))
    }
}

/// Lowercase hex SHA-256 of `payload`.
pub fn fingerprint(payload: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(payload);
    hex::encode(h.finalize())
}
