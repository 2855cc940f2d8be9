//! # Outbound Ports
//!
//! Traits for the collaborators the saga drives: the Validator Manager
//! contract, the signature aggregator, the P-Chain and the P-Chain wallet.

use crate::domain::{
    AccessList, AggregationRequest, BlockchainId, EvmAddress, InitiateRegistrationRequest, NodeId,
    PChainValidator, RegisterL1ValidatorRequest, RegistrationError, SubnetId, TransactionReceipt,
    TxId, TxStatus, ValidationId,
};
use async_trait::async_trait;

/// Validator Manager contract client - outbound port.
///
/// Write calls return the mined receipt. A reverted call may surface either
/// as `Err(ContractReverted)` or as a receipt with a reverted status.
#[async_trait]
pub trait ValidatorManagerContract: Send + Sync {
    /// EVM chain id the signing wallet is connected to.
    async fn connected_chain_id(&self) -> Result<u64, RegistrationError>;

    /// `l1TotalWeight()`.
    async fn l1_total_weight(&self, manager: &EvmAddress) -> Result<u64, RegistrationError>;

    /// `initiateValidatorRegistration(...)`.
    async fn initiate_validator_registration(
        &self,
        manager: &EvmAddress,
        request: &InitiateRegistrationRequest,
    ) -> Result<TransactionReceipt, RegistrationError>;

    /// `registeredValidators(nodeID)`; `None` for the zero id.
    async fn registered_validation_id(
        &self,
        manager: &EvmAddress,
        node_id: &NodeId,
    ) -> Result<Option<ValidationId>, RegistrationError>;

    /// `resendRegisterValidatorMessage(validationID)`.
    async fn resend_register_validator_message(
        &self,
        manager: &EvmAddress,
        validation_id: &ValidationId,
    ) -> Result<TransactionReceipt, RegistrationError>;

    /// `completeValidatorRegistration(messageIndex)` with the predicate
    /// carried in `access_list`.
    async fn complete_validator_registration(
        &self,
        manager: &EvmAddress,
        message_index: u32,
        access_list: &AccessList,
    ) -> Result<TransactionReceipt, RegistrationError>;
}

/// BLS signature aggregation service - outbound port.
#[async_trait]
pub trait SignatureAggregator: Send + Sync {
    /// Aggregate signatures; returns the raw signed message bytes.
    ///
    /// The caller validates the response.
    async fn aggregate(&self, request: &AggregationRequest) -> Result<Vec<u8>, RegistrationError>;
}

/// Status reported by `platform.getTxStatus`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxStatusResponse {
    /// Status.
    pub status: TxStatus,
    /// Reason attached to a dropped transaction.
    pub reason: Option<String>,
}

/// P-Chain read client - outbound port.
#[async_trait]
pub trait PChainClient: Send + Sync {
    /// `platform.getTxStatus`.
    async fn get_tx_status(&self, tx_id: &TxId) -> Result<TxStatusResponse, RegistrationError>;

    /// `platform.getCurrentValidators` for a subnet.
    async fn current_validators(
        &self,
        subnet_id: &SubnetId,
    ) -> Result<Vec<PChainValidator>, RegistrationError>;

    /// `platform.validatedBy`: subnet whose validators sign for `blockchain_id`.
    async fn validated_by(&self, blockchain_id: &BlockchainId)
        -> Result<SubnetId, RegistrationError>;
}

/// P-Chain signing wallet - outbound port.
#[async_trait]
pub trait PChainWallet: Send + Sync {
    /// Funding address.
    fn p_chain_address(&self) -> String;

    /// Spendable nAVAX on the funding address.
    async fn balance(&self) -> Result<u64, RegistrationError>;

    /// Issue the RegisterL1ValidatorTx.
    async fn register_l1_validator(
        &self,
        request: &RegisterL1ValidatorRequest,
    ) -> Result<TxId, RegistrationError>;
}
