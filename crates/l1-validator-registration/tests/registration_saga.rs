//! End-to-end saga runs against the in-memory collaborators.

use l1_validator_registration::adapters::{
    AggregatorBehavior, InMemoryPChain, InMemorySignatureAggregator, InMemoryValidatorManager,
};
use l1_validator_registration::domain::{InitiateRegistrationRequest, PChainValidator};
use l1_validator_registration::{
    BlockchainId, L1Descriptor, Network, NodeId, PChainOwner, RegistrationConfig,
    RegistrationError, RegistrationService, RegistrationStep, SagaPhase, StepStatus, SubnetId,
    ValidatorManagerContract, ValidatorRegistrationApi, Validator,
};
use std::sync::Arc;

const MANAGER: [u8; 20] = [0xAB; 20];
const EVM_CHAIN_ID: u64 = 99_001;

struct Harness {
    contract: Arc<InMemoryValidatorManager>,
    aggregator: Arc<InMemorySignatureAggregator>,
    p_chain: Arc<InMemoryPChain>,
    service: RegistrationService<
        InMemoryValidatorManager,
        InMemorySignatureAggregator,
        InMemoryPChain,
        InMemoryPChain,
    >,
}

fn l1() -> L1Descriptor {
    L1Descriptor {
        blockchain_id: BlockchainId::new([0x1B; 32]),
        manager_address: MANAGER,
        evm_chain_id: EVM_CHAIN_ID,
    }
}

fn subnet() -> SubnetId {
    SubnetId::new([0x5B; 32])
}

fn candidate(node: u8, weight: u64) -> Validator {
    Validator {
        node_id: NodeId([node; 20]),
        bls_public_key: vec![0x11; 48],
        bls_proof_of_possession: vec![0x22; 96],
        weight,
        balance: 100_000_000,
        remaining_balance_owner: PChainOwner::single([0x33; 20]),
        disable_owner: PChainOwner::single([0x44; 20]),
    }
}

fn harness(total_weight: u64) -> Harness {
    let contract = Arc::new(
        InMemoryValidatorManager::new(MANAGER, Network::Fuji, l1().blockchain_id, subnet(), EVM_CHAIN_ID)
            .with_total_weight(total_weight),
    );
    let p_chain = Arc::new(
        InMemoryPChain::new("P-fuji1registrar", 1_000_000_000)
            .with_subnet(l1().blockchain_id, subnet())
            .with_validators(
                subnet(),
                vec![PChainValidator {
                    node_id: NodeId([0x01; 20]),
                    weight: total_weight,
                }],
            ),
    );
    let aggregator = Arc::new(InMemorySignatureAggregator::new().with_p_chain(Arc::clone(&p_chain)));
    let service = RegistrationService::new(
        Arc::clone(&contract),
        Arc::clone(&aggregator),
        Arc::clone(&p_chain),
        Arc::clone(&p_chain),
        RegistrationConfig::for_testing(),
    );
    Harness {
        contract,
        aggregator,
        p_chain,
        service,
    }
}

fn statuses(h: &Harness, saga: &l1_validator_registration::RegistrationSaga) -> Vec<StepStatus> {
    h.service.progress(saga).iter().map(|entry| entry.status).collect()
}

#[tokio::test]
async fn test_full_registration_adds_weight() {
    let h = harness(500);
    h.p_chain.set_processing_polls(2);

    let mut saga = h.service.begin(candidate(0x42, 100), l1()).await.unwrap();
    let outcome = h.service.add_validator(&mut saga).await.unwrap();

    assert!(h.contract.is_active(&outcome.validation_id));
    assert_eq!(h.contract.total_weight(), 600);
    assert!(outcome.p_chain_tx_id.is_some());
    assert_eq!(saga.phase(), &SagaPhase::Completed);
    assert_eq!(statuses(&h, &saga), vec![StepStatus::Success; 5]);

    let progress = saga.progress();
    let tracker = progress.lock();
    assert!(tracker.is_complete());
    assert!(!tracker.is_processing());
}

#[tokio::test]
async fn test_p_chain_message_carries_justification() {
    let h = harness(500);
    let mut saga = h.service.begin(candidate(0x42, 100), l1()).await.unwrap();
    h.service.add_validator(&mut saga).await.unwrap();

    let requests = h.aggregator.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].justification.is_none());
    assert_eq!(
        requests[1].justification.as_deref(),
        saga.state().unsigned_registration_msg.as_ref().map(|m| m.to_hex()).as_deref()
    );
    assert!(requests.iter().all(|r| r.signing_subnet_id == subnet() && r.quorum_percentage == 67));
    // subnet lookup served from cache after the first resolution
    assert_eq!(h.p_chain.validated_by_calls(), 1);
}

#[tokio::test]
async fn test_step1_falls_back_to_resend() {
    let h = harness(500);
    let validator = candidate(0x42, 100);
    let request = InitiateRegistrationRequest {
        node_id: validator.node_id,
        bls_public_key: validator.bls_public_key.clone(),
        expiry: 1,
        remaining_balance_owner: validator.remaining_balance_owner.clone(),
        disable_owner: validator.disable_owner.clone(),
        weight: validator.weight,
    };
    h.contract
        .initiate_validator_registration(&MANAGER, &request)
        .await
        .unwrap();
    let existing = h
        .contract
        .registered_validation_id(&MANAGER, &validator.node_id)
        .await
        .unwrap()
        .unwrap();

    let mut saga = h.service.begin(validator, l1()).await.unwrap();
    let outcome = h.service.add_validator(&mut saga).await.unwrap();

    assert_eq!(h.contract.resend_calls(), 1);
    assert_eq!(outcome.validation_id, existing);
    assert!(h.contract.is_active(&existing));
}

#[tokio::test]
async fn test_resume_from_step4_skips_earlier_steps() {
    let h = harness(500);
    h.aggregator.push_behavior(AggregatorBehavior::Sign);
    h.aggregator
        .push_behavior(AggregatorBehavior::Fail("quorum not reached".to_string()));

    let mut saga = h.service.begin(candidate(0x42, 100), l1()).await.unwrap();
    let err = h.service.add_validator(&mut saga).await.unwrap_err();
    assert_eq!(err.failed_step(), Some(RegistrationStep::WaitForPChainSignature));
    assert_eq!(
        statuses(&h, &saga),
        vec![
            StepStatus::Success,
            StepStatus::Success,
            StepStatus::Success,
            StepStatus::Error,
            StepStatus::Idle,
        ]
    );
    assert!(matches!(
        saga.phase(),
        SagaPhase::Failed {
            step: RegistrationStep::WaitForPChainSignature,
            ..
        }
    ));

    let initiated = h.contract.initiate_calls();
    let registrations = h.p_chain.registrations().len();
    h.service
        .resume(&mut saga, RegistrationStep::WaitForPChainSignature)
        .await
        .unwrap();

    assert_eq!(h.contract.initiate_calls(), initiated);
    assert_eq!(h.p_chain.registrations().len(), registrations);
    assert_eq!(statuses(&h, &saga), vec![StepStatus::Success; 5]);
}

#[tokio::test]
async fn test_reverted_completion_then_resume() {
    let h = harness(500);
    h.contract.revert_next_complete();

    let mut saga = h.service.begin(candidate(0x42, 100), l1()).await.unwrap();
    let err = h.service.add_validator(&mut saga).await.unwrap_err();
    assert_eq!(err.failed_step(), Some(RegistrationStep::FinalizeRegistration));

    let progress = saga.progress();
    assert_eq!(
        progress.lock().error(RegistrationStep::FinalizeRegistration),
        Some("transaction failed")
    );

    let outcome = h
        .service
        .resume(&mut saga, RegistrationStep::FinalizeRegistration)
        .await
        .unwrap();
    assert_eq!(h.contract.complete_calls(), 2);
    assert!(h.contract.is_active(&outcome.validation_id));
}

#[tokio::test]
async fn test_blank_signature_fails_step2() {
    let h = harness(500);
    h.aggregator.push_behavior(AggregatorBehavior::Blank);

    let mut saga = h.service.begin(candidate(0x42, 100), l1()).await.unwrap();
    let err = h.service.add_validator(&mut saga).await.unwrap_err();

    assert_eq!(err.failed_step(), Some(RegistrationStep::SignMessage));
    assert!(saga.state().signed_registration_msg.is_none());
    assert!(h.p_chain.registrations().is_empty());
}

#[tokio::test]
async fn test_blank_signature_fails_step4() {
    let h = harness(500);
    h.aggregator.push_behavior(AggregatorBehavior::Sign);
    h.aggregator.push_behavior(AggregatorBehavior::Blank);

    let mut saga = h.service.begin(candidate(0x42, 100), l1()).await.unwrap();
    let err = h.service.add_validator(&mut saga).await.unwrap_err();

    assert_eq!(err.failed_step(), Some(RegistrationStep::WaitForPChainSignature));
    assert!(saga.state().signed_p_chain_msg.is_none());
    assert_eq!(h.contract.complete_calls(), 0);
}

#[tokio::test]
async fn test_dropped_p_chain_tx_fails_step3() {
    let h = harness(500);
    h.p_chain.drop_next_registration("insufficient funds");

    let mut saga = h.service.begin(candidate(0x42, 100), l1()).await.unwrap();
    let err = h.service.add_validator(&mut saga).await.unwrap_err();

    assert_eq!(err.failed_step(), Some(RegistrationStep::RegisterOnPChain));
    assert!(err.to_string().contains("insufficient funds"));
    assert!(saga.state().p_chain_tx_id.is_none());

    // resubmission commits
    h.service
        .resume(&mut saga, RegistrationStep::RegisterOnPChain)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_resume_past_failed_step_is_rejected() {
    let h = harness(500);
    h.p_chain.drop_next_registration("insufficient funds");

    let mut saga = h.service.begin(candidate(0x42, 100), l1()).await.unwrap();
    h.service.add_validator(&mut saga).await.unwrap_err();
    let requests = h.aggregator.requests().len();

    let err = h
        .service
        .resume(&mut saga, RegistrationStep::WaitForPChainSignature)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::PriorStepIncomplete {
            from: RegistrationStep::WaitForPChainSignature,
            pending: RegistrationStep::RegisterOnPChain,
        }
    ));
    assert_eq!(h.aggregator.requests().len(), requests);
    assert_eq!(
        statuses(&h, &saga),
        vec![
            StepStatus::Success,
            StepStatus::Success,
            StepStatus::Error,
            StepStatus::Idle,
            StepStatus::Idle,
        ]
    );
    assert!(!saga.progress().lock().is_processing());

    // a dropped transaction registers nothing
    let validation_id = saga.state().validation_id.unwrap();
    assert!(!h.p_chain.is_registered(&validation_id));

    h.service
        .resume(&mut saga, RegistrationStep::RegisterOnPChain)
        .await
        .unwrap();
    assert!(h.p_chain.is_registered(&validation_id));
    assert_eq!(statuses(&h, &saga), vec![StepStatus::Success; 5]);
}

#[tokio::test]
async fn test_poll_exhaustion_fails_step3() {
    let h = harness(500);
    h.p_chain.set_processing_polls(u32::MAX);

    let mut saga = h.service.begin(candidate(0x42, 100), l1()).await.unwrap();
    let err = h.service.add_validator(&mut saga).await.unwrap_err();

    match err {
        RegistrationError::StepFailed { step, source } => {
            assert_eq!(step, RegistrationStep::RegisterOnPChain);
            assert!(matches!(
                *source,
                RegistrationError::PollAttemptsExhausted { attempts: 20, .. }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.p_chain.status_polls(), 20);
}

#[tokio::test]
async fn test_resume_without_artifacts_is_rejected() {
    let h = harness(500);
    let mut saga = h.service.begin(candidate(0x42, 100), l1()).await.unwrap();

    let err = h
        .service
        .resume(&mut saga, RegistrationStep::WaitForPChainSignature)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::MissingArtifact(_)));
    assert_eq!(h.contract.initiate_calls(), 0);
    assert!(!saga.progress().lock().is_processing());
}

#[tokio::test]
async fn test_completed_saga_cannot_resume() {
    let h = harness(500);
    let mut saga = h.service.begin(candidate(0x42, 100), l1()).await.unwrap();
    h.service.add_validator(&mut saga).await.unwrap();

    assert!(matches!(
        h.service.resume(&mut saga, RegistrationStep::SignMessage).await,
        Err(RegistrationError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_same_node_rejected_while_saga_alive() {
    let h = harness(500);
    let saga = h.service.begin(candidate(0x42, 100), l1()).await.unwrap();

    let err = h.service.begin(candidate(0x42, 100), l1()).await.unwrap_err();
    assert!(matches!(err, RegistrationError::RegistrationInProgress(_)));

    // a different node proceeds independently
    assert!(h.service.begin(candidate(0x43, 50), l1()).await.is_ok());

    h.service.cancel(saga).unwrap();
    assert!(h.service.begin(candidate(0x42, 100), l1()).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_begin_claims_node_once() {
    let h = Arc::new(harness(500));
    let a = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.service.begin(candidate(0x42, 100), l1()).await })
    };
    let b = {
        let h = Arc::clone(&h);
        tokio::spawn(async move { h.service.begin(candidate(0x42, 100), l1()).await })
    };
    // the winning saga is returned, so its claim outlives both tasks
    let results = [a.await.unwrap(), b.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(RegistrationError::RegistrationInProgress(_))))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_precondition_failure_releases_claim() {
    let h = harness(80);
    let err = h.service.begin(candidate(0x42, 20), l1()).await.unwrap_err();
    assert!(err.is_precondition());
    assert_eq!(h.contract.initiate_calls(), 0);

    let err = h.service.begin(candidate(0x42, 20), l1()).await.unwrap_err();
    assert!(matches!(err, RegistrationError::WeightShareExceeded { .. }));
}

#[test]
fn test_preconditions_on_blocking_runtime() {
    let h = harness(500);
    let share = tokio_test::block_on(h.service.check_preconditions(&candidate(0x42, 100), &l1()))
        .unwrap();
    assert!(!share.exceeds);
    assert!((share.percentage - 100.0 * 100.0 / 600.0).abs() < 1e-9);
}
