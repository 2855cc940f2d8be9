//! # Registration Service
//!
//! Drives the registration saga against the injected collaborators.
//!
//! The pure transition function in [`crate::algorithms::transition`] decides
//! what happens next; this module executes the resulting effects, feeds the
//! outcomes back as events and mirrors every step into the progress tracker.
//!
//! ## Flow
//!
//! ```text
//! check_preconditions ─► 1 InitializeRegistration ─► 2 SignMessage ─► 3 RegisterOnPChain
//!                                                   ─► 4 WaitForPChainSignature ─► 5 FinalizeRegistration
//! ```
//!
//! A failed step halts the saga with its artifacts intact; `resume` restarts
//! from any step whose prerequisites are stored.

use crate::algorithms::abi::{extract_validation_id, extract_warp_message};
use crate::algorithms::{
    advance, command_for, compute_share_with_limit, pack_l1_validator_registration,
    pack_warp_into_access_list, sum_validator_weights, Effect, SagaEvent, SagaMachine, SagaPhase,
    TotalWeightPolicy, WeightShare,
};
use crate::config::RegistrationConfig;
use crate::domain::{
    invariant_balance_covered, invariant_chain_matches, invariant_validator_complete,
    invariant_weight_share, AggregationRequest, BlockchainId, InitiateRegistrationRequest,
    L1Descriptor, NodeId, RegisterL1ValidatorRequest, RegistrationError, RegistrationOutcome,
    RegistrationStep, SagaState, SignedWarpMessage, StepStatus, SubnetId, TxId, TxStatus,
    UnsignedWarpMessage, ValidationId, Validator,
};
use crate::metrics;
use crate::ports::inbound::ValidatorRegistrationApi;
use crate::ports::outbound::{PChainClient, PChainWallet, SignatureAggregator, ValidatorManagerContract};
use crate::progress::{StepEntry, StepProgress};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Step tracker shared with observers.
pub type SharedProgress = Arc<Mutex<StepProgress<RegistrationStep>>>;

/// Blockchain id → signing subnet id, shared read-only across sagas.
#[derive(Default)]
pub struct ChainMetadataCache {
    subnets: RwLock<HashMap<BlockchainId, SubnetId>>,
}

impl ChainMetadataCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached subnet for `blockchain_id`.
    pub fn signing_subnet(&self, blockchain_id: &BlockchainId) -> Option<SubnetId> {
        self.subnets.read().get(blockchain_id).copied()
    }

    /// Record the subnet validating `blockchain_id`.
    pub fn insert(&self, blockchain_id: BlockchainId, subnet_id: SubnetId) {
        self.subnets.write().insert(blockchain_id, subnet_id);
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.subnets.read().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.subnets.read().is_empty()
    }
}

/// Exclusive claim on a node id; released on drop.
#[derive(Debug)]
struct NodeClaim {
    node_id: NodeId,
    active: Arc<Mutex<HashSet<NodeId>>>,
}

impl Drop for NodeClaim {
    fn drop(&mut self) {
        self.active.lock().remove(&self.node_id);
    }
}

/// One registration attempt for one validator.
#[derive(Debug)]
pub struct RegistrationSaga {
    validator: Validator,
    l1: L1Descriptor,
    machine: SagaMachine,
    progress: SharedProgress,
    _claim: NodeClaim,
}

impl RegistrationSaga {
    /// Candidate validator.
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Target L1.
    pub fn l1(&self) -> &L1Descriptor {
        &self.l1
    }

    /// Artifacts produced so far.
    pub fn state(&self) -> &SagaState {
        &self.machine.state
    }

    /// Current phase.
    pub fn phase(&self) -> &SagaPhase {
        &self.machine.phase
    }

    /// Shared step tracker.
    pub fn progress(&self) -> SharedProgress {
        Arc::clone(&self.progress)
    }
}

/// Registration service.
pub struct RegistrationService<C, A, P, W> {
    contract: Arc<C>,
    aggregator: Arc<A>,
    p_chain: Arc<P>,
    wallet: Arc<W>,
    config: RegistrationConfig,
    metadata: Arc<ChainMetadataCache>,
    active: Arc<Mutex<HashSet<NodeId>>>,
}

impl<C, A, P, W> RegistrationService<C, A, P, W>
where
    C: ValidatorManagerContract,
    A: SignatureAggregator,
    P: PChainClient,
    W: PChainWallet,
{
    /// Create a new service.
    pub fn new(
        contract: Arc<C>,
        aggregator: Arc<A>,
        p_chain: Arc<P>,
        wallet: Arc<W>,
        config: RegistrationConfig,
    ) -> Self {
        Self {
            contract,
            aggregator,
            p_chain,
            wallet,
            config,
            metadata: Arc::new(ChainMetadataCache::new()),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Share a metadata cache with other services.
    pub fn with_metadata_cache(mut self, cache: Arc<ChainMetadataCache>) -> Self {
        self.metadata = cache;
        self
    }

    /// Service configuration.
    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Metadata cache.
    pub fn metadata(&self) -> &Arc<ChainMetadataCache> {
        &self.metadata
    }

    fn claim(&self, node_id: NodeId) -> Result<NodeClaim, RegistrationError> {
        if !self.active.lock().insert(node_id) {
            return Err(RegistrationError::RegistrationInProgress(node_id));
        }
        Ok(NodeClaim {
            node_id,
            active: Arc::clone(&self.active),
        })
    }

    /// Subnet whose validators sign for `blockchain_id`, cached per id.
    pub async fn resolve_signing_subnet(
        &self,
        blockchain_id: &BlockchainId,
    ) -> Result<SubnetId, RegistrationError> {
        if let Some(subnet_id) = self.metadata.signing_subnet(blockchain_id) {
            return Ok(subnet_id);
        }
        let subnet_id = self.p_chain.validated_by(blockchain_id).await?;
        debug!("[registrar] {} is validated by {}", blockchain_id, subnet_id);
        self.metadata.insert(*blockchain_id, subnet_id);
        Ok(subnet_id)
    }

    async fn p_chain_total_weight(&self, l1: &L1Descriptor) -> Result<u64, RegistrationError> {
        let subnet_id = self.resolve_signing_subnet(&l1.blockchain_id).await?;
        let validators = self.p_chain.current_validators(&subnet_id).await?;
        Ok(sum_validator_weights(&validators))
    }

    /// L1 total weight according to the configured policy.
    pub async fn total_weight(&self, l1: &L1Descriptor) -> Result<u64, RegistrationError> {
        match self.config.weight_policy {
            TotalWeightPolicy::ContractOnly => self.contract.l1_total_weight(&l1.manager_address).await,
            TotalWeightPolicy::PChainOnly => self.p_chain_total_weight(l1).await,
            TotalWeightPolicy::PreferContract => {
                match self.contract.l1_total_weight(&l1.manager_address).await {
                    Ok(weight) => Ok(weight),
                    Err(e) => {
                        warn!(
                            "[registrar] l1TotalWeight read failed ({}), summing P-Chain validator set",
                            e
                        );
                        self.p_chain_total_weight(l1).await
                    }
                }
            }
            TotalWeightPolicy::Reconcile => {
                let contract = self.contract.l1_total_weight(&l1.manager_address).await?;
                let p_chain = self.p_chain_total_weight(l1).await?;
                if contract != p_chain {
                    warn!(
                        "[registrar] Total weight diverges: contract={}, p-chain={}",
                        contract, p_chain
                    );
                    return Err(RegistrationError::WeightSourceDivergence { contract, p_chain });
                }
                Ok(contract)
            }
        }
    }

    /// Candidate's post-addition share of the L1 weight.
    pub async fn weight_share(
        &self,
        validator: &Validator,
        l1: &L1Descriptor,
    ) -> Result<WeightShare, RegistrationError> {
        let total = self.total_weight(l1).await?;
        let share =
            compute_share_with_limit(total, validator.weight, self.config.max_weight_share_percent);
        metrics::set_weight_share(share.percentage);
        Ok(share)
    }

    async fn preconditions(
        &self,
        validator: &Validator,
        l1: &L1Descriptor,
    ) -> Result<WeightShare, RegistrationError> {
        invariant_validator_complete(validator)?;

        let available = self.wallet.balance().await?;
        invariant_balance_covered(available, validator.balance)?;

        let share = self.weight_share(validator, l1).await?;
        invariant_weight_share(share.percentage, share.exceeds, self.config.max_weight_share_percent)?;

        let connected = self.contract.connected_chain_id().await?;
        invariant_chain_matches(connected, l1.evm_chain_id)?;

        info!(
            "[registrar] Preconditions passed for {}: share {:.2}% of {}",
            validator.node_id,
            share.percentage,
            share.total_weight + validator.weight
        );
        Ok(share)
    }

    /// Poll `tx_id` until it commits, following the configured schedule.
    pub async fn wait_for_commit(&self, tx_id: &TxId) -> Result<(), RegistrationError> {
        let policy = &self.config.poll;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            metrics::record_pchain_poll();

            match self.p_chain.get_tx_status(tx_id).await {
                Ok(response) => {
                    debug!("[registrar] {} status {:?} (poll {})", tx_id, response.status, attempts);
                    match response.status {
                        TxStatus::Committed => return Ok(()),
                        TxStatus::Dropped => {
                            return Err(RegistrationError::PChainTxDropped {
                                tx_id: *tx_id,
                                reason: response.reason.unwrap_or_else(|| "unknown".to_string()),
                            })
                        }
                        TxStatus::Processing | TxStatus::Unknown => {}
                    }
                }
                Err(e) => warn!("[registrar] getTxStatus({}) failed: {}", tx_id, e),
            }

            if !policy.allows(attempts) {
                return Err(RegistrationError::PollAttemptsExhausted {
                    tx_id: *tx_id,
                    attempts,
                });
            }
            tokio::time::sleep(policy.delay_for(attempts - 1)).await;
        }
    }

    // =========================================================================
    // Steps
    // =========================================================================

    async fn initiate_once(
        &self,
        l1: &L1Descriptor,
        request: &InitiateRegistrationRequest,
    ) -> Result<(UnsignedWarpMessage, ValidationId), RegistrationError> {
        let receipt = self
            .contract
            .initiate_validator_registration(&l1.manager_address, request)
            .await?;
        if !receipt.is_success() {
            return Err(RegistrationError::TransactionFailed);
        }
        let message = extract_warp_message(&receipt)?;
        let validation_id = extract_validation_id(&receipt, &l1.manager_address)?;
        Ok((message, validation_id))
    }

    async fn resend_existing(
        &self,
        node_id: &NodeId,
        l1: &L1Descriptor,
    ) -> Result<Option<(UnsignedWarpMessage, ValidationId)>, RegistrationError> {
        let Some(validation_id) = self
            .contract
            .registered_validation_id(&l1.manager_address, node_id)
            .await?
        else {
            return Ok(None);
        };

        let receipt = self
            .contract
            .resend_register_validator_message(&l1.manager_address, &validation_id)
            .await?;
        if !receipt.is_success() {
            return Err(RegistrationError::TransactionFailed);
        }
        Ok(Some((extract_warp_message(&receipt)?, validation_id)))
    }

    async fn initialize_registration(
        &self,
        validator: &Validator,
        l1: &L1Descriptor,
    ) -> Result<SagaEvent, RegistrationError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let request = InitiateRegistrationRequest {
            node_id: validator.node_id,
            bls_public_key: validator.bls_public_key.clone(),
            expiry: now + self.config.registration_expiry_secs,
            remaining_balance_owner: validator.remaining_balance_owner.clone(),
            disable_owner: validator.disable_owner.clone(),
            weight: validator.weight,
        };

        let (message, validation_id) = match self.initiate_once(l1, &request).await {
            Ok(artifacts) => artifacts,
            Err(original) => {
                warn!(
                    "[registrar] initiateValidatorRegistration failed for {}: {}; looking for an existing registration",
                    validator.node_id, original
                );
                match self.resend_existing(&validator.node_id, l1).await {
                    Ok(Some(artifacts)) => {
                        metrics::record_step1_fallback();
                        info!(
                            "[registrar] Recovered registration message for {} via resend",
                            validator.node_id
                        );
                        artifacts
                    }
                    Ok(None) => return Err(original),
                    Err(fallback) => {
                        warn!("[registrar] Resend fallback failed: {}", fallback);
                        return Err(original);
                    }
                }
            }
        };

        Ok(SagaEvent::RegistrationInitiated {
            message,
            validation_id,
        })
    }

    async fn aggregate(
        &self,
        l1: &L1Descriptor,
        message: &UnsignedWarpMessage,
        justification: Option<&UnsignedWarpMessage>,
    ) -> Result<SignedWarpMessage, RegistrationError> {
        let signing_subnet_id = self.resolve_signing_subnet(&l1.blockchain_id).await?;
        let request = AggregationRequest {
            network: self.config.network,
            message: message.to_hex(),
            justification: justification.map(UnsignedWarpMessage::to_hex),
            signing_subnet_id,
            quorum_percentage: self.config.quorum_percentage,
        };
        let raw = self.aggregator.aggregate(&request).await?;
        SignedWarpMessage::new(raw)
    }

    async fn register_on_p_chain(
        &self,
        validator: &Validator,
        signed: SignedWarpMessage,
    ) -> Result<SagaEvent, RegistrationError> {
        let request = RegisterL1ValidatorRequest {
            p_chain_address: self.wallet.p_chain_address(),
            balance: validator.balance,
            bls_proof_of_possession: validator.bls_proof_of_possession.clone(),
            signed_message: signed,
        };
        let tx_id = self.wallet.register_l1_validator(&request).await?;
        info!("[registrar] Submitted P-Chain registration {}", tx_id);
        self.wait_for_commit(&tx_id).await?;
        Ok(SagaEvent::PChainRegistered { tx_id })
    }

    async fn sign_p_chain_message(
        &self,
        l1: &L1Descriptor,
        validation_id: ValidationId,
        justification: UnsignedWarpMessage,
    ) -> Result<SagaEvent, RegistrationError> {
        let network = self.config.network;
        let unsigned = pack_l1_validator_registration(
            &validation_id,
            true,
            network.network_id(),
            &network.p_chain_blockchain_id(),
        )?;
        let message = self.aggregate(l1, &unsigned, Some(&justification)).await?;
        Ok(SagaEvent::PChainMessageSigned { message })
    }

    async fn finalize_registration(
        &self,
        l1: &L1Descriptor,
        signed: SignedWarpMessage,
    ) -> Result<SagaEvent, RegistrationError> {
        let access_list = pack_warp_into_access_list(&signed);
        let receipt = self
            .contract
            .complete_validator_registration(&l1.manager_address, 0, &access_list)
            .await?;
        if !receipt.is_success() {
            return Err(RegistrationError::TransactionFailed);
        }
        Ok(SagaEvent::RegistrationCompleted {
            tx_hash: receipt.tx_hash,
        })
    }

    async fn execute(
        &self,
        validator: &Validator,
        l1: &L1Descriptor,
        command: Effect,
    ) -> Result<SagaEvent, RegistrationError> {
        match command {
            Effect::InitiateRegistration => self.initialize_registration(validator, l1).await,
            Effect::AggregateRegistrationSignature { message } => {
                let message = self.aggregate(l1, &message, None).await?;
                Ok(SagaEvent::RegistrationMessageSigned { message })
            }
            Effect::RegisterOnPChain { signed } => self.register_on_p_chain(validator, signed).await,
            Effect::AggregatePChainSignature {
                validation_id,
                justification,
            } => {
                self.sign_p_chain_message(l1, validation_id, justification)
                    .await
            }
            Effect::CompleteRegistration { signed } => self.finalize_registration(l1, signed).await,
            other => Err(RegistrationError::InvalidTransition {
                from: "command".to_string(),
                to: format!("{:?}", other),
            }),
        }
    }

    // =========================================================================
    // Driver
    // =========================================================================

    fn apply_tracker_effect(
        &self,
        saga: &RegistrationSaga,
        effect: &Effect,
    ) -> Result<(), RegistrationError> {
        let mut progress = saga.progress.lock();
        match effect {
            Effect::StepStarted(step) => {
                info!("[registrar] {} started for {}", step, saga.validator.node_id);
                metrics::record_step_started(&step.to_string());
                progress.update_step_status(*step, StepStatus::Loading, None)?;
            }
            Effect::StepSucceeded(step) => {
                info!("[registrar] {} succeeded", step);
                progress.update_step_status(*step, StepStatus::Success, None)?;
            }
            Effect::StepFailed { step, reason } => {
                error!("[registrar] {} failed: {}", step, reason);
                metrics::record_step_failed(&step.to_string());
                progress.update_step_status(*step, StepStatus::Error, Some(reason.clone()))?;
                progress.stop_processing();
            }
            Effect::Finished => {
                metrics::record_registration_completed();
                progress.complete_processing("Validator registered");
            }
            _ => {}
        }
        Ok(())
    }

    async fn run(
        &self,
        saga: &mut RegistrationSaga,
        from: RegistrationStep,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let (machine, effects) = match advance(saga.machine.clone(), SagaEvent::Start { from }) {
            Ok(next) => next,
            Err(e) => {
                saga.progress.lock().stop_processing();
                return Err(e);
            }
        };
        saga.machine = machine;

        let mut queue: VecDeque<Effect> = effects.into();
        let mut failure = None;

        while let Some(effect) = queue.pop_front() {
            if !effect.is_command() {
                self.apply_tracker_effect(saga, &effect)?;
                continue;
            }

            let step = match &saga.machine.phase {
                SagaPhase::Running(step) => *step,
                other => {
                    return Err(RegistrationError::InvalidTransition {
                        from: other.to_string(),
                        to: format!("{:?}", effect),
                    })
                }
            };

            let event = match self.execute(&saga.validator, &saga.l1, effect).await {
                Ok(event) => event,
                Err(e) => {
                    let event = SagaEvent::StepFailed {
                        step,
                        reason: e.to_string(),
                    };
                    failure = Some(e.at_step(step));
                    event
                }
            };

            let (machine, effects) = advance(saga.machine.clone(), event)?;
            saga.machine = machine;
            queue.extend(effects);
        }

        if let Some(err) = failure {
            return Err(err);
        }

        let state = &saga.machine.state;
        Ok(RegistrationOutcome {
            validation_id: state
                .validation_id
                .ok_or(RegistrationError::MissingArtifact("validation id"))?,
            p_chain_tx_id: state.p_chain_tx_id,
            completion_tx_hash: state
                .completion_tx_hash
                .ok_or(RegistrationError::MissingArtifact("completion transaction"))?,
        })
    }
}

#[async_trait]
impl<C, A, P, W> ValidatorRegistrationApi for RegistrationService<C, A, P, W>
where
    C: ValidatorManagerContract + 'static,
    A: SignatureAggregator + 'static,
    P: PChainClient + 'static,
    W: PChainWallet + 'static,
{
    async fn check_preconditions(
        &self,
        validator: &Validator,
        l1: &L1Descriptor,
    ) -> Result<WeightShare, RegistrationError> {
        self.preconditions(validator, l1).await
    }

    async fn begin(
        &self,
        validator: Validator,
        l1: L1Descriptor,
    ) -> Result<RegistrationSaga, RegistrationError> {
        let claim = self.claim(validator.node_id)?;
        self.preconditions(&validator, &l1).await?;

        Ok(RegistrationSaga {
            validator,
            l1,
            machine: SagaMachine::new(),
            progress: Arc::new(Mutex::new(StepProgress::new(RegistrationStep::ALL))),
            _claim: claim,
        })
    }

    async fn add_validator(
        &self,
        saga: &mut RegistrationSaga,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        saga.progress.lock().start_processing();
        self.run(saga, RegistrationStep::first()).await
    }

    async fn resume(
        &self,
        saga: &mut RegistrationSaga,
        from: RegistrationStep,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        if !matches!(saga.machine.phase, SagaPhase::Ready | SagaPhase::Failed { .. }) {
            return Err(RegistrationError::InvalidTransition {
                from: saga.machine.phase.to_string(),
                to: "Start".to_string(),
            });
        }

        command_for(from, &saga.machine.state)?;
        let pending = saga
            .progress
            .lock()
            .steps()
            .iter()
            .take_while(|entry| entry.key != from)
            .find(|entry| entry.status != StepStatus::Success)
            .map(|entry| entry.key);
        if let Some(pending) = pending {
            warn!(
                "[registrar] Refusing to resume {} from {}: {} has not succeeded",
                saga.validator.node_id, from, pending
            );
            return Err(RegistrationError::PriorStepIncomplete { from, pending });
        }

        info!("[registrar] Resuming {} from {}", saga.validator.node_id, from);
        let progress = Arc::clone(&saga.progress);
        let resumed = progress
            .lock()
            .handle_retry(from, move |step| self.run(saga, step))?;
        resumed.await
    }

    fn cancel(&self, saga: RegistrationSaga) -> Result<(), RegistrationError> {
        advance(saga.machine.clone(), SagaEvent::Cancel)?;
        saga.progress.lock().reset_steps();
        info!("[registrar] Cancelled registration for {}", saga.validator.node_id);
        Ok(())
    }

    fn progress(&self, saga: &RegistrationSaga) -> Vec<StepEntry<RegistrationStep>> {
        saga.progress.lock().steps().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryPChain, InMemorySignatureAggregator, InMemoryValidatorManager};
    use crate::domain::{Network, PChainOwner, PChainValidator};

    const MANAGER: [u8; 20] = [0x0C; 20];
    const EVM_CHAIN_ID: u64 = 43113;

    type Service = RegistrationService<
        InMemoryValidatorManager,
        InMemorySignatureAggregator,
        InMemoryPChain,
        InMemoryPChain,
    >;

    fn l1() -> L1Descriptor {
        L1Descriptor {
            blockchain_id: BlockchainId::new([0x0B; 32]),
            manager_address: MANAGER,
            evm_chain_id: EVM_CHAIN_ID,
        }
    }

    fn validator(weight: u64) -> Validator {
        Validator {
            node_id: NodeId([0x42; 20]),
            bls_public_key: vec![1u8; 48],
            bls_proof_of_possession: vec![2u8; 96],
            weight,
            balance: 1_000,
            remaining_balance_owner: PChainOwner::single([3u8; 20]),
            disable_owner: PChainOwner::single([4u8; 20]),
        }
    }

    fn service(total_weight: u64, config: RegistrationConfig) -> (Service, Arc<InMemoryValidatorManager>, Arc<InMemoryPChain>) {
        let subnet = SubnetId::new([0x05; 32]);
        let contract = Arc::new(
            InMemoryValidatorManager::new(MANAGER, Network::Fuji, l1().blockchain_id, subnet, EVM_CHAIN_ID)
                .with_total_weight(total_weight),
        );
        let p_chain = Arc::new(
            InMemoryPChain::new("P-fuji1funding", 10_000)
                .with_subnet(l1().blockchain_id, subnet)
                .with_validators(
                    subnet,
                    vec![PChainValidator {
                        node_id: NodeId([9u8; 20]),
                        weight: 300,
                    }],
                ),
        );
        let svc = RegistrationService::new(
            Arc::clone(&contract),
            Arc::new(InMemorySignatureAggregator::new().with_p_chain(Arc::clone(&p_chain))),
            Arc::clone(&p_chain),
            Arc::clone(&p_chain),
            config,
        );
        (svc, contract, p_chain)
    }

    #[tokio::test]
    async fn test_preconditions_reject_concentrated_weight() {
        let (svc, _, _) = service(80, RegistrationConfig::for_testing());
        let err = svc.check_preconditions(&validator(20), &l1()).await.unwrap_err();
        assert!(matches!(err, RegistrationError::WeightShareExceeded { .. }));
        assert!(err.is_precondition());
    }

    #[tokio::test]
    async fn test_preconditions_reject_wrong_chain() {
        let (svc, contract, _) = service(500, RegistrationConfig::for_testing());
        contract.set_connected_chain_id(1);
        let err = svc.check_preconditions(&validator(100), &l1()).await.unwrap_err();
        assert!(matches!(err, RegistrationError::ChainMismatch { connected: 1, .. }));
    }

    #[tokio::test]
    async fn test_preconditions_reject_insufficient_balance() {
        let (svc, _, _) = service(500, RegistrationConfig::for_testing());
        let mut v = validator(100);
        v.balance = 1_000_000;
        let err = svc.check_preconditions(&v, &l1()).await.unwrap_err();
        assert!(matches!(err, RegistrationError::InsufficientPChainBalance { .. }));
    }

    #[tokio::test]
    async fn test_total_weight_falls_back_to_p_chain() {
        let (svc, contract, _) = service(500, RegistrationConfig::for_testing());
        contract.set_total_weight_unavailable(true);
        assert_eq!(svc.total_weight(&l1()).await.unwrap(), 300);
    }

    #[tokio::test]
    async fn test_p_chain_only_ignores_contract() {
        let mut config = RegistrationConfig::for_testing();
        config.weight_policy = TotalWeightPolicy::PChainOnly;
        let (svc, contract, _) = service(500, config);
        contract.set_total_weight_unavailable(true);
        assert_eq!(svc.total_weight(&l1()).await.unwrap(), 300);
    }

    #[tokio::test]
    async fn test_begin_fails_when_no_weight_source_answers() {
        let (svc, contract, p_chain) = service(500, RegistrationConfig::for_testing());
        contract.set_total_weight_unavailable(true);
        p_chain.set_validators_unavailable(true);

        let err = svc.begin(validator(10), l1()).await.unwrap_err();
        assert!(matches!(err, RegistrationError::Network(_)));
        assert_eq!(contract.initiate_calls(), 0);

        p_chain.set_validators_unavailable(false);
        assert!(svc.begin(validator(10), l1()).await.is_ok());
    }

    #[tokio::test]
    async fn test_reconcile_detects_divergence() {
        let mut config = RegistrationConfig::for_testing();
        config.weight_policy = TotalWeightPolicy::Reconcile;
        let (svc, _, _) = service(500, config);
        assert!(matches!(
            svc.total_weight(&l1()).await,
            Err(RegistrationError::WeightSourceDivergence {
                contract: 500,
                p_chain: 300
            })
        ));
    }

    #[tokio::test]
    async fn test_contract_only_does_not_fall_back() {
        let mut config = RegistrationConfig::for_testing();
        config.weight_policy = TotalWeightPolicy::ContractOnly;
        let (svc, contract, _) = service(500, config);
        contract.set_total_weight_unavailable(true);
        assert!(svc.total_weight(&l1()).await.is_err());
    }

    #[tokio::test]
    async fn test_subnet_resolution_is_cached() {
        let (svc, _, p_chain) = service(500, RegistrationConfig::for_testing());
        for _ in 0..3 {
            svc.resolve_signing_subnet(&l1().blockchain_id).await.unwrap();
        }
        assert_eq!(p_chain.validated_by_calls(), 1);
        assert_eq!(svc.metadata().len(), 1);
    }

    #[tokio::test]
    async fn test_shared_metadata_cache_across_services() {
        let (first, contract, p_chain) = service(500, RegistrationConfig::for_testing());
        let cache = Arc::clone(first.metadata());
        let second: Service = RegistrationService::new(
            contract,
            Arc::new(InMemorySignatureAggregator::new()),
            Arc::clone(&p_chain),
            Arc::clone(&p_chain),
            RegistrationConfig::for_testing(),
        )
        .with_metadata_cache(Arc::clone(&cache));

        let a = first.resolve_signing_subnet(&l1().blockchain_id).await.unwrap();
        let b = second.resolve_signing_subnet(&l1().blockchain_id).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(p_chain.validated_by_calls(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_claim_released_on_drop() {
        let (svc, _, _) = service(500, RegistrationConfig::for_testing());
        let saga = svc.begin(validator(100), l1()).await.unwrap();
        assert!(matches!(
            svc.begin(validator(100), l1()).await,
            Err(RegistrationError::RegistrationInProgress(_))
        ));
        drop(saga);
        assert!(svc.begin(validator(100), l1()).await.is_ok());
    }

    #[tokio::test]
    async fn test_poll_bound_enforced() {
        let (svc, _, p_chain) = service(500, RegistrationConfig::for_testing());
        p_chain.set_processing_polls(u32::MAX);
        let err = svc.wait_for_commit(&TxId::new([1u8; 32])).await.unwrap_err();
        assert!(matches!(err, RegistrationError::PollAttemptsExhausted { attempts: 20, .. }));
    }
}
