//! # Receipt Log Decoding
//!
//! Extracts the registration artifacts from Validator Manager receipts.
//!
//! - The unsigned message travels as ABI `bytes` in the warp precompile's
//!   `SendWarpMessage` log.
//! - The validation id is the first indexed topic of the manager's
//!   `InitiatedValidatorRegistration` log.

use super::warp::WARP_PRECOMPILE_ADDRESS;
use crate::domain::{
    Bytes32, EvmAddress, Log, NodeId, RegistrationError, TransactionReceipt, UnsignedWarpMessage,
    ValidationId,
};
use sha2::Sha256;
use sha3::{Digest, Keccak256};

/// `SendWarpMessage(address,bytes32,bytes)`.
pub const SEND_WARP_MESSAGE_EVENT: &str = "SendWarpMessage(address,bytes32,bytes)";

/// `InitiatedValidatorRegistration(bytes32,bytes20,bytes32,uint64,uint64)`.
pub const INITIATED_VALIDATOR_REGISTRATION_EVENT: &str =
    "InitiatedValidatorRegistration(bytes32,bytes20,bytes32,uint64,uint64)";

const WORD: usize = 32;

/// Keccak-256 of an event signature.
pub fn event_topic(signature: &str) -> Bytes32 {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(signature.as_bytes()));
    out
}

fn word_from_u64(v: u64) -> Bytes32 {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&v.to_be_bytes());
    word
}

fn word_to_usize(word: &[u8]) -> Result<usize, RegistrationError> {
    if word[..24].iter().any(|b| *b != 0) {
        return Err(RegistrationError::Codec("ABI word out of range".to_string()));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[24..]);
    usize::try_from(u64::from_be_bytes(tail))
        .map_err(|_| RegistrationError::Codec("ABI word out of range".to_string()))
}

/// Left-pad a value to a 32-byte topic.
pub fn left_pad(bytes: &[u8]) -> Bytes32 {
    let mut word = [0u8; 32];
    let start = WORD.saturating_sub(bytes.len());
    word[start..].copy_from_slice(&bytes[bytes.len().saturating_sub(WORD)..]);
    word
}

/// Encode a single dynamic `bytes` value as ABI data.
pub fn encode_abi_bytes(data: &[u8]) -> Vec<u8> {
    let padded = data.len().div_ceil(WORD) * WORD;
    let mut out = Vec::with_capacity(2 * WORD + padded);
    out.extend_from_slice(&word_from_u64(WORD as u64));
    out.extend_from_slice(&word_from_u64(data.len() as u64));
    out.extend_from_slice(data);
    out.resize(2 * WORD + padded, 0);
    out
}

/// Decode ABI data holding a single dynamic `bytes` value.
pub fn decode_abi_bytes(data: &[u8]) -> Result<Vec<u8>, RegistrationError> {
    if data.len() < WORD {
        return Err(RegistrationError::Codec("ABI data too short".to_string()));
    }
    let offset = word_to_usize(&data[..WORD])?;
    let len_end = offset
        .checked_add(WORD)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| RegistrationError::Codec("ABI offset out of bounds".to_string()))?;
    let len = word_to_usize(&data[offset..len_end])?;
    let end = len_end
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| RegistrationError::Codec("ABI length out of bounds".to_string()))?;
    Ok(data[len_end..end].to_vec())
}

/// Extract the unsigned warp message from a receipt.
pub fn extract_warp_message(
    receipt: &TransactionReceipt,
) -> Result<UnsignedWarpMessage, RegistrationError> {
    let topic = event_topic(SEND_WARP_MESSAGE_EVENT);
    let log = receipt
        .logs
        .iter()
        .find(|log| log.address == WARP_PRECOMPILE_ADDRESS && log.topics.first() == Some(&topic))
        .ok_or(RegistrationError::MissingLog("SendWarpMessage"))?;
    UnsignedWarpMessage::new(decode_abi_bytes(&log.data)?)
}

/// Extract the validation id from a manager receipt.
pub fn extract_validation_id(
    receipt: &TransactionReceipt,
    manager: &EvmAddress,
) -> Result<ValidationId, RegistrationError> {
    let topic = event_topic(INITIATED_VALIDATOR_REGISTRATION_EVENT);
    let log = receipt
        .logs
        .iter()
        .find(|log| &log.address == manager && log.topics.first() == Some(&topic))
        .ok_or(RegistrationError::MissingLog("InitiatedValidatorRegistration"))?;
    let id = log
        .topics
        .get(1)
        .ok_or(RegistrationError::MissingLog("InitiatedValidatorRegistration"))?;
    Ok(ValidationId::new(*id))
}

/// Build the precompile's `SendWarpMessage` log.
pub fn send_warp_message_log(sender: &EvmAddress, message: &UnsignedWarpMessage) -> Log {
    let mut message_id = [0u8; 32];
    message_id.copy_from_slice(&Sha256::digest(message.as_bytes()));
    Log {
        address: WARP_PRECOMPILE_ADDRESS,
        topics: vec![
            event_topic(SEND_WARP_MESSAGE_EVENT),
            left_pad(sender),
            message_id,
        ],
        data: encode_abi_bytes(message.as_bytes()),
    }
}

/// Build the manager's `InitiatedValidatorRegistration` log.
pub fn initiated_registration_log(
    manager: &EvmAddress,
    validation_id: &ValidationId,
    node_id: &NodeId,
    message_id: &Bytes32,
    expiry: u64,
    weight: u64,
) -> Log {
    let mut data = Vec::with_capacity(3 * WORD);
    data.extend_from_slice(message_id);
    data.extend_from_slice(&word_from_u64(expiry));
    data.extend_from_slice(&word_from_u64(weight));

    // bytes20 topics are right-padded
    let mut node_topic = [0u8; 32];
    node_topic[..20].copy_from_slice(node_id.as_bytes());

    Log {
        address: *manager,
        topics: vec![
            event_topic(INITIATED_VALIDATOR_REGISTRATION_EVENT),
            *validation_id.as_bytes(),
            node_topic,
        ],
        data,
    }
}
