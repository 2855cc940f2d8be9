//! # L1 Validator Registration
//!
//! Adds a validator to a permissioned Avalanche L1 through a five-step saga
//! spanning the Validator Manager contract, the signature aggregator and the
//! P-Chain.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Steps
//!
//! | # | Step | Produces |
//! |---|------|----------|
//! | 1 | InitializeRegistration | unsigned registration message, validation id |
//! | 2 | SignMessage | signed registration message |
//! | 3 | RegisterOnPChain | committed P-Chain transaction |
//! | 4 | WaitForPChainSignature | signed L1ValidatorRegistration message |
//! | 5 | FinalizeRegistration | completion transaction hash |
//!
//! Each step persists its artifact; a failed saga resumes from any step whose
//! inputs exist. Nothing is rolled back on-chain.
//!
//! ## Preconditions
//!
//! - Candidate weight stays below 20% of the post-addition L1 weight
//! - P-Chain funding account covers the declared balance
//! - Wallet is connected to the chain hosting the Validator Manager
//!
//! ## Module Structure
//!
//! ```text
//! l1-validator-registration/
//! ├── domain/          # Validator, ids, warp messages, errors, invariants
//! ├── algorithms/      # Warp codec, ABI logs, stake share, saga transitions
//! ├── ports/           # ValidatorRegistrationApi, contract/aggregator/P-Chain ports
//! ├── adapters/        # HTTP + JSON-RPC clients, in-memory collaborators
//! ├── progress.rs      # Step tracker
//! └── service.rs       # Saga driver
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod ports;
pub mod progress;
pub mod service;

// Re-exports
pub use algorithms::{
    advance, compute_share_percentage, compute_share_with_limit, pack_l1_validator_registration,
    pack_warp_into_access_list, sum_validator_weights, Effect, PollPolicy, SagaEvent, SagaMachine,
    SagaPhase, TotalWeightPolicy, WeightShare,
};
pub use config::RegistrationConfig;
pub use domain::{
    invariant_balance_covered, invariant_chain_matches, invariant_validator_complete,
    invariant_weight_share, BlockchainId, L1Descriptor, Network, NodeId, PChainOwner,
    RegistrationError, RegistrationOutcome, RegistrationStep, SagaState, SignedWarpMessage,
    StepStatus, SubnetId, TxId, UnsignedWarpMessage, ValidationId, Validator,
    DEFAULT_QUORUM_PERCENTAGE, MAX_WEIGHT_SHARE_PERCENT,
};
pub use ports::{
    PChainClient, PChainWallet, SignatureAggregator, TxStatusResponse, ValidatorManagerContract,
    ValidatorRegistrationApi,
};
pub use progress::{ProgressError, StepEntry, StepProgress};
pub use service::{ChainMetadataCache, RegistrationSaga, RegistrationService, SharedProgress};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    #[allow(clippy::const_is_empty)]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
