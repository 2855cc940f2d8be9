//! # Domain Errors
//!
//! Error types for validator registration.
//!
//! Errors fall into three families: preconditions (fatal, raised before the
//! saga starts), step failures (recorded against a step, retryable) and
//! codec/transport errors that a step failure wraps.

use super::value_objects::{NodeId, RegistrationStep, TxId};
use thiserror::Error;

/// 32-byte word (hashes, ids, storage keys, log topics).
pub type Bytes32 = [u8; 32];

/// 20-byte EVM address.
pub type EvmAddress = [u8; 20];

/// Validator registration error types.
#[derive(Debug, Error)]
pub enum RegistrationError {
    // =========================================================================
    // Preconditions
    // =========================================================================
    /// Required validator field missing or empty.
    #[error("Missing validator field: {0}")]
    MissingField(&'static str),

    /// Key material has the wrong length.
    #[error("Invalid {field} length: expected {expected}, got {got}")]
    InvalidKeyLength {
        /// Field name
        field: &'static str,
        /// Expected byte length
        expected: usize,
        /// Actual byte length
        got: usize,
    },

    /// P-Chain funding account cannot cover the declared balance.
    #[error("Insufficient P-Chain balance: available={available}, required={required}")]
    InsufficientPChainBalance {
        /// nAVAX available
        available: u64,
        /// nAVAX declared for the validator
        required: u64,
    },

    /// Candidate weight would exceed the concentration limit.
    #[error("Weight share {percentage:.2}% reaches the {limit}% limit")]
    WeightShareExceeded {
        /// Post-addition share
        percentage: f64,
        /// Configured limit
        limit: f64,
    },

    /// Wallet is connected to a different chain than the Validator Manager.
    #[error("Wallet connected to chain {connected}, Validator Manager lives on {expected}")]
    ChainMismatch {
        /// Chain the wallet is on
        connected: u64,
        /// Chain hosting the contract
        expected: u64,
    },

    /// A saga for this node is already running.
    #[error("Registration already in progress for {0}")]
    RegistrationInProgress(NodeId),

    /// Contract and P-Chain disagree on the L1 total weight.
    #[error("Total weight diverges: contract={contract}, p-chain={p_chain}")]
    WeightSourceDivergence {
        /// Weight reported by the Validator Manager
        contract: u64,
        /// Weight summed from the P-Chain validator set
        p_chain: u64,
    },

    // =========================================================================
    // Artifacts
    // =========================================================================
    /// Message bytes are empty or all zero.
    #[error("Blank {0}: empty or all-zero bytes")]
    BlankMessage(&'static str),

    /// A resumed step needs an artifact no earlier step produced.
    #[error("Missing artifact: {0}")]
    MissingArtifact(&'static str),

    // =========================================================================
    // Collaborators
    // =========================================================================
    /// EVM call reverted.
    #[error("Contract call reverted: {0}")]
    ContractReverted(String),

    /// Receipt status was not success.
    #[error("transaction failed")]
    TransactionFailed,

    /// Receipt did not carry the expected log.
    #[error("Receipt missing {0} log")]
    MissingLog(&'static str),

    /// Signature aggregator failure.
    #[error("Signature aggregation failed: {0}")]
    Aggregation(String),

    /// P-Chain dropped the transaction.
    #[error("P-Chain transaction {tx_id} dropped: {reason}")]
    PChainTxDropped {
        /// Dropped transaction
        tx_id: TxId,
        /// Reason reported by the node
        reason: String,
    },

    /// Commitment poll ran out of attempts.
    #[error("P-Chain transaction {tx_id} not committed after {attempts} polls")]
    PollAttemptsExhausted {
        /// Polled transaction
        tx_id: TxId,
        /// Polls performed
        attempts: u32,
    },

    /// Network / RPC error.
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed bytes or text encoding.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    // =========================================================================
    // Saga
    // =========================================================================
    /// Event does not fit the current saga phase.
    #[error("Invalid saga transition: {from} -> {to}")]
    InvalidTransition {
        /// Current phase
        from: String,
        /// Attempted event
        to: String,
    },

    /// Resume target lies past a step that has not succeeded.
    #[error("Cannot resume from {from}: {pending} has not succeeded")]
    PriorStepIncomplete {
        /// Requested resume step
        from: RegistrationStep,
        /// Earliest earlier step without success
        pending: RegistrationStep,
    },

    /// Step tracker rejected an update.
    #[error("Progress tracking: {0}")]
    Progress(#[from] crate::progress::ProgressError),

    /// A saga step failed.
    #[error("Step {step} failed: {source}")]
    StepFailed {
        /// Failing step
        step: RegistrationStep,
        /// Underlying error
        #[source]
        source: Box<RegistrationError>,
    },
}

impl RegistrationError {
    /// Wrap an error as the failure of `step`.
    pub fn at_step(self, step: RegistrationStep) -> Self {
        match self {
            already @ Self::StepFailed { .. } => already,
            other => Self::StepFailed {
                step,
                source: Box::new(other),
            },
        }
    }

    /// Fatal errors raised before the saga starts.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MissingField(_)
                | Self::InvalidKeyLength { .. }
                | Self::InsufficientPChainBalance { .. }
                | Self::WeightShareExceeded { .. }
                | Self::ChainMismatch { .. }
                | Self::RegistrationInProgress(_)
                | Self::WeightSourceDivergence { .. }
        )
    }

    /// Step that failed, if this is a step failure.
    pub fn failed_step(&self) -> Option<RegistrationStep> {
        match self {
            Self::StepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_share_error_formats_percentage() {
        let err = RegistrationError::WeightShareExceeded {
            percentage: 20.0,
            limit: 20.0,
        };
        assert!(err.to_string().contains("20.00%"));
    }

    #[test]
    fn test_transaction_failed_is_generic() {
        assert_eq!(RegistrationError::TransactionFailed.to_string(), "transaction failed");
    }

    #[test]
    fn test_at_step_wraps_once() {
        let err = RegistrationError::TransactionFailed
            .at_step(RegistrationStep::FinalizeRegistration)
            .at_step(RegistrationStep::SignMessage);
        assert_eq!(err.failed_step(), Some(RegistrationStep::FinalizeRegistration));
    }

    #[test]
    fn test_precondition_classification() {
        assert!(RegistrationError::ChainMismatch {
            connected: 1,
            expected: 2
        }
        .is_precondition());
        assert!(!RegistrationError::TransactionFailed.is_precondition());
        assert!(!RegistrationError::BlankMessage("signed message").is_precondition());
        assert!(!RegistrationError::PriorStepIncomplete {
            from: RegistrationStep::WaitForPChainSignature,
            pending: RegistrationStep::RegisterOnPChain,
        }
        .is_precondition());
    }
}
