//! # Domain Entities
//!
//! Candidate validator, saga artifacts and the request/receipt shapes
//! exchanged with the collaborators.

use super::errors::{Bytes32, EvmAddress, RegistrationError};
use super::invariants::invariant_message_not_blank;
use super::value_objects::{
    BlockchainId, Network, NodeId, PChainOwner, SubnetId, TxId, ValidationId,
};
use serde::{Deserialize, Serialize};

/// BLS public key length (compressed G1).
pub const BLS_PUBLIC_KEY_LEN: usize = 48;

/// BLS proof-of-possession length (compressed G2).
pub const BLS_PROOF_OF_POSSESSION_LEN: usize = 96;

/// Candidate validator. Immutable once submitted to the first step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Node identifier.
    pub node_id: NodeId,
    /// BLS public key.
    pub bls_public_key: Vec<u8>,
    /// BLS proof of possession.
    pub bls_proof_of_possession: Vec<u8>,
    /// Relative stake units.
    pub weight: u64,
    /// nAVAX funding the continuous-fee account.
    pub balance: u64,
    /// Receives the remaining balance when the validator is removed.
    pub remaining_balance_owner: PChainOwner,
    /// May disable the validator.
    pub disable_owner: PChainOwner,
}

/// Where the Validator Manager for an L1 lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct L1Descriptor {
    /// The L1's blockchain id (source chain of its warp messages).
    pub blockchain_id: BlockchainId,
    /// Validator Manager contract address.
    pub manager_address: EvmAddress,
    /// EVM chain id the contract is deployed on.
    pub evm_chain_id: u64,
}

/// Unsigned warp message. Never empty or all zero.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct UnsignedWarpMessage(Vec<u8>);

impl UnsignedWarpMessage {
    /// Wrap bytes, rejecting blank input.
    pub fn new(bytes: Vec<u8>) -> Result<Self, RegistrationError> {
        invariant_message_not_blank(&bytes, "unsigned warp message")?;
        Ok(Self(bytes))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

/// Quorum-signed warp message. Opaque; never empty or all zero.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct SignedWarpMessage(Vec<u8>);

impl SignedWarpMessage {
    /// Wrap bytes, rejecting blank input.
    pub fn new(bytes: Vec<u8>) -> Result<Self, RegistrationError> {
        invariant_message_not_blank(&bytes, "signed warp message")?;
        Ok(Self(bytes))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

macro_rules! message_conversions {
    ($name:ident) => {
        impl TryFrom<Vec<u8>> for $name {
            type Error = RegistrationError;

            fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
                Self::new(bytes)
            }
        }

        impl From<$name> for Vec<u8> {
            fn from(message: $name) -> Vec<u8> {
                message.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({} bytes)", stringify!($name), self.0.len())
            }
        }
    };
}

message_conversions!(UnsignedWarpMessage);
message_conversions!(SignedWarpMessage);

/// Artifacts accumulated by successful steps.
///
/// Every artifact is stored as soon as its step produces it so that a
/// retry can resume from any later step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaState {
    /// Step 1: unsigned registration message.
    pub unsigned_registration_msg: Option<UnsignedWarpMessage>,
    /// Step 1: validation id.
    pub validation_id: Option<ValidationId>,
    /// Step 2: signed registration message.
    pub signed_registration_msg: Option<SignedWarpMessage>,
    /// Step 3: P-Chain transaction (informational).
    pub p_chain_tx_id: Option<TxId>,
    /// Step 4: signed validation-status message.
    pub signed_p_chain_msg: Option<SignedWarpMessage>,
    /// Step 5: completion transaction hash.
    pub completion_tx_hash: Option<Bytes32>,
}

/// Receipt status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    /// Status 1.
    Success,
    /// Status 0.
    Reverted,
}

/// EVM log entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Emitting contract.
    pub address: EvmAddress,
    /// Indexed topics (topic 0 is the event signature hash).
    pub topics: Vec<Bytes32>,
    /// ABI-encoded non-indexed data.
    pub data: Vec<u8>,
}

/// EVM transaction receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// Transaction hash.
    pub tx_hash: Bytes32,
    /// Execution status.
    pub status: ReceiptStatus,
    /// Emitted logs.
    pub logs: Vec<Log>,
}

impl TransactionReceipt {
    /// True when the transaction executed successfully.
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

/// EIP-2930 access list entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessListItem {
    /// Accessed address.
    pub address: EvmAddress,
    /// Storage keys.
    pub storage_keys: Vec<Bytes32>,
}

/// EIP-2930 access list.
pub type AccessList = Vec<AccessListItem>;

/// Arguments to `initiateValidatorRegistration`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitiateRegistrationRequest {
    /// Node identifier.
    pub node_id: NodeId,
    /// BLS public key.
    pub bls_public_key: Vec<u8>,
    /// Unix seconds after which the registration expires.
    pub expiry: u64,
    /// Remaining-balance owner.
    pub remaining_balance_owner: PChainOwner,
    /// Disable owner.
    pub disable_owner: PChainOwner,
    /// Relative weight.
    pub weight: u64,
}

/// Signature aggregator request body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationRequest {
    /// Network wire name.
    pub network: Network,
    /// Hex-encoded unsigned message.
    pub message: String,
    /// Hex-encoded justification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    /// Subnet whose validators must sign.
    pub signing_subnet_id: SubnetId,
    /// Required stake percentage.
    pub quorum_percentage: u8,
}

/// Signature aggregator response body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResponse {
    /// Hex-encoded signed message.
    pub signed_message: String,
}

/// P-Chain registration transaction contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterL1ValidatorRequest {
    /// Funding address on the P-Chain.
    pub p_chain_address: String,
    /// nAVAX for the continuous-fee account.
    pub balance: u64,
    /// BLS proof of possession.
    pub bls_proof_of_possession: Vec<u8>,
    /// Step 2 output.
    pub signed_message: SignedWarpMessage,
}

/// Entry of the P-Chain's current validator set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PChainValidator {
    /// Validator node.
    pub node_id: NodeId,
    /// Weight in the L1's units.
    pub weight: u64,
}

/// Result of a completed saga.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationOutcome {
    /// Registered validation id.
    pub validation_id: ValidationId,
    /// P-Chain registration transaction, when step 3 ran in this attempt.
    pub p_chain_tx_id: Option<TxId>,
    /// `completeValidatorRegistration` transaction hash.
    pub completion_tx_hash: Bytes32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_message_rejects_blank() {
        assert!(UnsignedWarpMessage::new(vec![]).is_err());
        assert!(UnsignedWarpMessage::new(vec![0u8; 64]).is_err());
        assert!(UnsignedWarpMessage::new(vec![0, 0, 1]).is_ok());
    }

    #[test]
    fn test_signed_message_rejects_blank() {
        assert!(matches!(
            SignedWarpMessage::new(vec![0u8; 8]),
            Err(RegistrationError::BlankMessage(_))
        ));
    }

    #[test]
    fn test_signed_message_deserialize_checks_blank() {
        let blank: Result<SignedWarpMessage, _> = serde_json::from_str("[0,0,0]");
        assert!(blank.is_err());
    }

    #[test]
    fn test_aggregation_request_wire_shape() {
        let request = AggregationRequest {
            network: Network::Fuji,
            message: "abcd".to_string(),
            justification: None,
            signing_subnet_id: SubnetId::new([1u8; 32]),
            quorum_percentage: 67,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["network"], "fuji");
        assert_eq!(json["quorumPercentage"], 67);
        assert!(json.get("justification").is_none());
        assert!(json["signingSubnetId"].is_string());
    }

    #[test]
    fn test_saga_state_starts_empty() {
        let state = SagaState::default();
        assert!(state.validation_id.is_none());
        assert!(state.signed_p_chain_msg.is_none());
    }
}
