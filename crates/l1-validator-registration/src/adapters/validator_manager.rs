//! In-Memory Validator Manager Adapter
//!
//! Implements `ValidatorManagerContract` with the contract's observable
//! behaviour: registration messages built with the warp codec, receipts
//! carrying the real event logs, and predicate verification on completion.

use crate::algorithms::abi::{event_topic, initiated_registration_log, send_warp_message_log};
use crate::algorithms::warp::{
    pack_addressed_call, pack_register_l1_validator_payload, pack_unsigned_message,
    unpack_access_list_predicate, unpack_addressed_call, unpack_l1_validator_registration_payload,
    unpack_signed_message,
};
use crate::domain::{
    AccessList, BlockchainId, Bytes32, EvmAddress, InitiateRegistrationRequest, Log, Network,
    NodeId, ReceiptStatus, RegistrationError, SignedWarpMessage, SubnetId, TransactionReceipt,
    UnsignedWarpMessage, ValidationId,
};
use crate::ports::outbound::ValidatorManagerContract;
use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// `CompletedValidatorRegistration(bytes32,uint64)`.
pub const COMPLETED_VALIDATOR_REGISTRATION_EVENT: &str =
    "CompletedValidatorRegistration(bytes32,uint64)";

struct PendingRegistration {
    message: UnsignedWarpMessage,
    weight: u64,
}

#[derive(Default)]
struct ManagerState {
    connected_chain_id: u64,
    total_weight: u64,
    total_weight_unavailable: bool,
    registered: HashMap<NodeId, ValidationId>,
    pending: HashMap<ValidationId, PendingRegistration>,
    active: HashSet<ValidationId>,
    revert_next_complete: bool,
    tx_count: u64,
    initiate_calls: u32,
    resend_calls: u32,
    complete_calls: u32,
}

/// In-memory Validator Manager deployed at one address.
pub struct InMemoryValidatorManager {
    address: EvmAddress,
    network: Network,
    l1_blockchain_id: BlockchainId,
    subnet_id: SubnetId,
    state: RwLock<ManagerState>,
}

impl InMemoryValidatorManager {
    /// Create a manager for the L1 `l1_blockchain_id` validated by `subnet_id`.
    pub fn new(
        address: EvmAddress,
        network: Network,
        l1_blockchain_id: BlockchainId,
        subnet_id: SubnetId,
        evm_chain_id: u64,
    ) -> Self {
        Self {
            address,
            network,
            l1_blockchain_id,
            subnet_id,
            state: RwLock::new(ManagerState {
                connected_chain_id: evm_chain_id,
                ..ManagerState::default()
            }),
        }
    }

    /// Seed the L1 total weight.
    pub fn with_total_weight(self, weight: u64) -> Self {
        self.state.write().total_weight = weight;
        self
    }

    /// Switch the signing wallet to another chain.
    pub fn set_connected_chain_id(&self, chain_id: u64) {
        self.state.write().connected_chain_id = chain_id;
    }

    /// Make `l1TotalWeight` fail.
    pub fn set_total_weight_unavailable(&self, unavailable: bool) {
        self.state.write().total_weight_unavailable = unavailable;
    }

    /// Next `completeValidatorRegistration` mines with a reverted status.
    pub fn revert_next_complete(&self) {
        self.state.write().revert_next_complete = true;
    }

    /// `initiateValidatorRegistration` calls received.
    pub fn initiate_calls(&self) -> u32 {
        self.state.read().initiate_calls
    }

    /// `resendRegisterValidatorMessage` calls received.
    pub fn resend_calls(&self) -> u32 {
        self.state.read().resend_calls
    }

    /// `completeValidatorRegistration` calls received.
    pub fn complete_calls(&self) -> u32 {
        self.state.read().complete_calls
    }

    /// Validator completed registration.
    pub fn is_active(&self, validation_id: &ValidationId) -> bool {
        self.state.read().active.contains(validation_id)
    }

    /// Current L1 total weight.
    pub fn total_weight(&self) -> u64 {
        self.state.read().total_weight
    }

    fn check_address(&self, manager: &EvmAddress) -> Result<(), RegistrationError> {
        if manager != &self.address {
            return Err(RegistrationError::ContractReverted(format!(
                "no contract at 0x{}",
                hex::encode(manager)
            )));
        }
        Ok(())
    }

    fn receipt(state: &mut ManagerState, status: ReceiptStatus, logs: Vec<Log>) -> TransactionReceipt {
        state.tx_count += 1;
        let mut tx_hash: Bytes32 = [0u8; 32];
        tx_hash.copy_from_slice(&Sha256::digest(state.tx_count.to_be_bytes()));
        TransactionReceipt {
            tx_hash,
            status,
            logs,
        }
    }

    fn verify_predicate(
        &self,
        access_list: &AccessList,
    ) -> Result<ValidationId, RegistrationError> {
        let signed = SignedWarpMessage::new(unpack_access_list_predicate(access_list)?)?;
        let (envelope, _signature) = unpack_signed_message(&signed)?;

        if envelope.network_id != self.network.network_id() {
            return Err(RegistrationError::ContractReverted(format!(
                "InvalidNetworkID({})",
                envelope.network_id
            )));
        }
        if envelope.source_chain_id != self.network.p_chain_blockchain_id() {
            return Err(RegistrationError::ContractReverted(
                "InvalidWarpSourceChainID".to_string(),
            ));
        }

        let (source_address, body) = unpack_addressed_call(&envelope.payload)?;
        if !source_address.is_empty() {
            return Err(RegistrationError::ContractReverted(
                "InvalidWarpOriginSenderAddress".to_string(),
            ));
        }
        let (validation_id, registered) = unpack_l1_validator_registration_payload(&body)?;
        if !registered {
            return Err(RegistrationError::ContractReverted(
                "UnexpectedRegistrationStatus".to_string(),
            ));
        }
        Ok(validation_id)
    }
}

#[async_trait]
impl ValidatorManagerContract for InMemoryValidatorManager {
    async fn connected_chain_id(&self) -> Result<u64, RegistrationError> {
        Ok(self.state.read().connected_chain_id)
    }

    async fn l1_total_weight(&self, manager: &EvmAddress) -> Result<u64, RegistrationError> {
        self.check_address(manager)?;
        let state = self.state.read();
        if state.total_weight_unavailable {
            return Err(RegistrationError::ContractReverted(
                "l1TotalWeight unavailable".to_string(),
            ));
        }
        Ok(state.total_weight)
    }

    async fn initiate_validator_registration(
        &self,
        manager: &EvmAddress,
        request: &InitiateRegistrationRequest,
    ) -> Result<TransactionReceipt, RegistrationError> {
        self.check_address(manager)?;
        let mut state = self.state.write();
        state.initiate_calls += 1;

        if state.registered.contains_key(&request.node_id) {
            return Err(RegistrationError::ContractReverted(format!(
                "NodeAlreadyRegistered({})",
                request.node_id
            )));
        }

        let payload = pack_register_l1_validator_payload(&self.subnet_id, request);
        let mut id = [0u8; 32];
        id.copy_from_slice(&Sha256::digest(&payload));
        let validation_id = ValidationId::new(id);

        let call = pack_addressed_call(&self.address, &payload);
        let message = UnsignedWarpMessage::new(pack_unsigned_message(
            self.network.network_id(),
            &self.l1_blockchain_id,
            &call,
        ))?;
        let mut message_id = [0u8; 32];
        message_id.copy_from_slice(&Sha256::digest(message.as_bytes()));

        let logs = vec![
            send_warp_message_log(&self.address, &message),
            initiated_registration_log(
                &self.address,
                &validation_id,
                &request.node_id,
                &message_id,
                request.expiry,
                request.weight,
            ),
        ];

        state.registered.insert(request.node_id, validation_id);
        state.pending.insert(
            validation_id,
            PendingRegistration {
                message,
                weight: request.weight,
            },
        );
        debug!(
            "[registrar] In-memory manager initiated {} for {}",
            validation_id, request.node_id
        );
        Ok(Self::receipt(&mut state, ReceiptStatus::Success, logs))
    }

    async fn registered_validation_id(
        &self,
        manager: &EvmAddress,
        node_id: &NodeId,
    ) -> Result<Option<ValidationId>, RegistrationError> {
        self.check_address(manager)?;
        Ok(self.state.read().registered.get(node_id).copied())
    }

    async fn resend_register_validator_message(
        &self,
        manager: &EvmAddress,
        validation_id: &ValidationId,
    ) -> Result<TransactionReceipt, RegistrationError> {
        self.check_address(manager)?;
        let mut state = self.state.write();
        state.resend_calls += 1;

        let message = state
            .pending
            .get(validation_id)
            .map(|pending| pending.message.clone())
            .ok_or_else(|| {
                RegistrationError::ContractReverted(format!(
                    "InvalidValidationID({})",
                    validation_id
                ))
            })?;

        let logs = vec![send_warp_message_log(&self.address, &message)];
        Ok(Self::receipt(&mut state, ReceiptStatus::Success, logs))
    }

    async fn complete_validator_registration(
        &self,
        manager: &EvmAddress,
        message_index: u32,
        access_list: &AccessList,
    ) -> Result<TransactionReceipt, RegistrationError> {
        self.check_address(manager)?;
        let verified = if message_index == 0 {
            self.verify_predicate(access_list)
        } else {
            Err(RegistrationError::ContractReverted(format!(
                "InvalidWarpMessage(index {})",
                message_index
            )))
        };

        let mut state = self.state.write();
        state.complete_calls += 1;

        if std::mem::take(&mut state.revert_next_complete) {
            return Ok(Self::receipt(&mut state, ReceiptStatus::Reverted, Vec::new()));
        }

        let validation_id = verified?;
        let pending = state.pending.remove(&validation_id).ok_or_else(|| {
            RegistrationError::ContractReverted(format!(
                "InvalidValidationID({})",
                validation_id
            ))
        })?;
        state.total_weight = state.total_weight.saturating_add(pending.weight);
        state.active.insert(validation_id);

        let mut data = [0u8; 32];
        data[24..].copy_from_slice(&pending.weight.to_be_bytes());
        let logs = vec![Log {
            address: self.address,
            topics: vec![
                event_topic(COMPLETED_VALIDATOR_REGISTRATION_EVENT),
                *validation_id.as_bytes(),
            ],
            data: data.to_vec(),
        }];
        Ok(Self::receipt(&mut state, ReceiptStatus::Success, logs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::abi::{extract_validation_id, extract_warp_message};
    use crate::algorithms::warp::{
        pack_l1_validator_registration, pack_signed_message, pack_warp_into_access_list,
    };
    use crate::domain::PChainOwner;

    const MANAGER: EvmAddress = [0x0C; 20];

    fn manager() -> InMemoryValidatorManager {
        InMemoryValidatorManager::new(
            MANAGER,
            Network::Fuji,
            BlockchainId::new([0x0B; 32]),
            SubnetId::new([0x05; 32]),
            43113,
        )
        .with_total_weight(500)
    }

    fn request() -> InitiateRegistrationRequest {
        InitiateRegistrationRequest {
            node_id: NodeId([1u8; 20]),
            bls_public_key: vec![2u8; 48],
            expiry: 1_700_043_200,
            remaining_balance_owner: PChainOwner::single([3u8; 20]),
            disable_owner: PChainOwner::single([4u8; 20]),
            weight: 100,
        }
    }

    fn p_chain_signed(vid: &ValidationId) -> SignedWarpMessage {
        let unsigned = pack_l1_validator_registration(
            vid,
            true,
            Network::Fuji.network_id(),
            &Network::Fuji.p_chain_blockchain_id(),
        )
        .unwrap();
        pack_signed_message(&unsigned, &[1], &[9u8; 96]).unwrap()
    }

    #[tokio::test]
    async fn test_initiate_emits_message_and_id() {
        let m = manager();
        let receipt = m.initiate_validator_registration(&MANAGER, &request()).await.unwrap();
        let vid = extract_validation_id(&receipt, &MANAGER).unwrap();
        assert!(extract_warp_message(&receipt).is_ok());
        assert_eq!(
            m.registered_validation_id(&MANAGER, &request().node_id).await.unwrap(),
            Some(vid)
        );
    }

    #[tokio::test]
    async fn test_second_initiate_reverts_and_resend_works() {
        let m = manager();
        let first = m.initiate_validator_registration(&MANAGER, &request()).await.unwrap();
        assert!(m.initiate_validator_registration(&MANAGER, &request()).await.is_err());

        let vid = extract_validation_id(&first, &MANAGER).unwrap();
        let resent = m.resend_register_validator_message(&MANAGER, &vid).await.unwrap();
        assert_eq!(
            extract_warp_message(&resent).unwrap(),
            extract_warp_message(&first).unwrap()
        );
    }

    #[tokio::test]
    async fn test_complete_verifies_predicate() {
        let m = manager();
        let receipt = m.initiate_validator_registration(&MANAGER, &request()).await.unwrap();
        let vid = extract_validation_id(&receipt, &MANAGER).unwrap();

        let list = pack_warp_into_access_list(&p_chain_signed(&vid));
        let done = m.complete_validator_registration(&MANAGER, 0, &list).await.unwrap();
        assert!(done.is_success());
        assert!(m.is_active(&vid));
        assert_eq!(m.total_weight(), 600);
    }

    #[tokio::test]
    async fn test_complete_rejects_unknown_validation() {
        let m = manager();
        let list = pack_warp_into_access_list(&p_chain_signed(&ValidationId::new([7u8; 32])));
        assert!(m.complete_validator_registration(&MANAGER, 0, &list).await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_revert_returns_failed_receipt() {
        let m = manager();
        m.revert_next_complete();
        let list = pack_warp_into_access_list(&p_chain_signed(&ValidationId::new([7u8; 32])));
        let receipt = m.complete_validator_registration(&MANAGER, 0, &list).await.unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Reverted);
    }

    #[tokio::test]
    async fn test_wrong_address_reverts() {
        let m = manager();
        assert!(m.l1_total_weight(&[0xFF; 20]).await.is_err());
    }
}
