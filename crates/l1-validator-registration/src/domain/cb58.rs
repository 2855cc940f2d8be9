//! # CB58
//!
//! Avalanche's textual id encoding: base58 over the payload followed by the
//! last four bytes of its SHA-256 digest.

use super::errors::RegistrationError;
use sha2::{Digest, Sha256};

const CHECKSUM_LEN: usize = 4;

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(payload);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[digest.len() - CHECKSUM_LEN..]);
    out
}

/// Encode bytes as CB58.
pub fn encode(payload: &[u8]) -> String {
    let mut buf = Vec::with_capacity(payload.len() + CHECKSUM_LEN);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&checksum(payload));
    bs58::encode(buf).into_string()
}

/// Decode CB58 text, verifying the checksum.
pub fn decode(text: &str) -> Result<Vec<u8>, RegistrationError> {
    let raw = bs58::decode(text)
        .into_vec()
        .map_err(|e| RegistrationError::Codec(format!("invalid base58: {}", e)))?;

    if raw.len() < CHECKSUM_LEN {
        return Err(RegistrationError::Codec(format!(
            "cb58 payload too short: {} bytes",
            raw.len()
        )));
    }

    let (payload, check) = raw.split_at(raw.len() - CHECKSUM_LEN);
    if checksum(payload) != check {
        return Err(RegistrationError::Codec("cb58 checksum mismatch".to_string()));
    }
    Ok(payload.to_vec())
}

/// Decode CB58 text into a fixed-size array.
pub fn decode_fixed<const N: usize>(text: &str) -> Result<[u8; N], RegistrationError> {
    let bytes = decode(text)?;
    bytes.as_slice().try_into().map_err(|_| {
        RegistrationError::Codec(format!("expected {} bytes, got {}", N, bytes.len()))
    })
}
