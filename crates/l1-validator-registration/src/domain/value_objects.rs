//! # Domain Value Objects
//!
//! Immutable value types for validator registration: network selection,
//! CB58-encoded ids, step enumeration and P-Chain statuses.

use super::cb58;
use super::errors::{Bytes32, EvmAddress, RegistrationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// P-Chain blockchain id on mainnet.
pub const P_CHAIN_BLOCKCHAIN_ID_MAINNET: Bytes32 = [0u8; 32];

/// P-Chain blockchain id on Fuji.
pub const P_CHAIN_BLOCKCHAIN_ID_FUJI: Bytes32 = [0u8; 32];

/// Avalanche network the L1 is anchored to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Avalanche mainnet.
    Mainnet,
    /// Fuji test network.
    #[default]
    Fuji,
}

impl Network {
    /// Numeric network id carried in every warp message.
    pub fn network_id(&self) -> u32 {
        match self {
            Network::Mainnet => 1,
            Network::Fuji => 5,
        }
    }

    /// Name used on the signature aggregator wire.
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Fuji => "fuji",
        }
    }

    /// Fixed P-Chain blockchain id for this network.
    pub fn p_chain_blockchain_id(&self) -> BlockchainId {
        match self {
            Network::Mainnet => BlockchainId(P_CHAIN_BLOCKCHAIN_ID_MAINNET),
            Network::Fuji => BlockchainId(P_CHAIN_BLOCKCHAIN_ID_FUJI),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "fuji" | "testnet" => Ok(Network::Fuji),
            other => Err(RegistrationError::Config(format!("unknown network: {}", other))),
        }
    }
}

macro_rules! cb58_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(pub Bytes32);

        impl $name {
            /// Wrap raw bytes.
            pub const fn new(bytes: Bytes32) -> Self {
                Self(bytes)
            }

            /// Raw bytes.
            pub fn as_bytes(&self) -> &Bytes32 {
                &self.0
            }

            /// True for the all-zero id.
            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }

            /// `0x`-prefixed hex, as EVM `bytes32`.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            /// Parse `0x`-prefixed or bare hex.
            pub fn from_hex(text: &str) -> Result<Self, RegistrationError> {
                let raw = hex::decode(text.trim_start_matches("0x"))
                    .map_err(|e| RegistrationError::Codec(e.to_string()))?;
                let bytes: Bytes32 = raw.as_slice().try_into().map_err(|_| {
                    RegistrationError::Codec(format!("expected 32 bytes, got {}", raw.len()))
                })?;
                Ok(Self(bytes))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&cb58::encode(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = RegistrationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                cb58::decode_fixed::<32>(s).map(Self)
            }
        }

        impl TryFrom<String> for $name {
            type Error = RegistrationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.to_string()
            }
        }
    };
}

cb58_id!(
    /// Correlates one validator's registration across the L1 and the P-Chain.
    ValidationId
);
cb58_id!(
    /// Subnet whose validators sign warp messages for the L1.
    SubnetId
);
cb58_id!(
    /// Blockchain id (the L1 chain, or the P-Chain).
    BlockchainId
);
cb58_id!(
    /// P-Chain transaction id.
    TxId
);

/// 20-byte node identifier, printed as `NodeID-<cb58>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId(pub [u8; 20]);

impl NodeId {
    /// Textual prefix.
    pub const PREFIX: &'static str = "NodeID-";

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// True for the all-zero id.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, cb58::encode(&self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for NodeId {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix(Self::PREFIX).unwrap_or(s);
        cb58::decode_fixed::<20>(body).map(NodeId)
    }
}

impl TryFrom<String> for NodeId {
    type Error = RegistrationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> String {
        id.to_string()
    }
}

/// Owner set on the P-Chain (threshold multisig over short addresses).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PChainOwner {
    /// Signatures required.
    pub threshold: u32,
    /// Owner addresses.
    pub addresses: Vec<EvmAddress>,
}

impl PChainOwner {
    /// Single-address owner with threshold 1.
    pub fn single(address: EvmAddress) -> Self {
        Self {
            threshold: 1,
            addresses: vec![address],
        }
    }
}

/// Ordered steps of the registration saga.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegistrationStep {
    /// Call `initiateValidatorRegistration` on the Validator Manager.
    InitializeRegistration,
    /// Aggregate signatures over the registration warp message.
    SignMessage,
    /// Register the validator on the P-Chain and wait for commitment.
    RegisterOnPChain,
    /// Aggregate signatures over the P-Chain validation-status message.
    WaitForPChainSignature,
    /// Call `completeValidatorRegistration` with the signed message.
    FinalizeRegistration,
}

impl RegistrationStep {
    /// All steps in execution order.
    pub const ALL: [RegistrationStep; 5] = [
        RegistrationStep::InitializeRegistration,
        RegistrationStep::SignMessage,
        RegistrationStep::RegisterOnPChain,
        RegistrationStep::WaitForPChainSignature,
        RegistrationStep::FinalizeRegistration,
    ];

    /// Zero-based position.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Following step, `None` after the last.
    pub fn next(&self) -> Option<RegistrationStep> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// First step.
    pub fn first() -> RegistrationStep {
        RegistrationStep::InitializeRegistration
    }

    /// Last step.
    pub fn is_last(&self) -> bool {
        *self == RegistrationStep::FinalizeRegistration
    }
}

impl fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for RegistrationStep {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|step| step.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| RegistrationError::Config(format!("unknown step: {}", s)))
    }
}

/// Status of one tracked step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not started in this attempt.
    #[default]
    Idle,
    /// In flight.
    Loading,
    /// Completed.
    Success,
    /// Failed; recoverable by retry.
    Error,
}

/// P-Chain transaction status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Accepted into a block.
    Committed,
    /// Known but not yet decided.
    Processing,
    /// Rejected by the node.
    Dropped,
    /// Not known to the node.
    #[serde(other)]
    Unknown,
}

impl TxStatus {
    /// No further change expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Committed | TxStatus::Dropped)
    }
}
