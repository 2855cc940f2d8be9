//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements the outbound ports: HTTP clients for the aggregator and the
//! P-Chain, and in-memory collaborators for tests and simulation.

mod pchain;
mod signature_aggregator;
mod validator_manager;

pub use pchain::{InMemoryPChain, JsonRpcPChainClient};
pub use signature_aggregator::{
    AggregatorBehavior, HttpSignatureAggregator, InMemorySignatureAggregator,
};
pub use validator_manager::{InMemoryValidatorManager, COMPLETED_VALIDATOR_REGISTRATION_EVENT};
