//! # Saga State Machine
//!
//! Pure transition function for the registration saga:
//! `advance(machine, event) -> (machine, effects)`.
//!
//! ```text
//! Ready ──Start{from}──► Running(from) ──success──► Running(next) … ──► Completed
//!                           │
//!                           └──StepFailed──► Failed{step} ──Start{from}──► Running(from)
//!
//! Ready | Running | Failed ──Cancel──► Cancelled
//! ```
//!
//! The machine never performs I/O. Each transition returns the effects the
//! driver must execute; command effects resolve into the next event.

use crate::domain::{
    Bytes32, RegistrationError, RegistrationStep, SagaState, SignedWarpMessage, TxId,
    UnsignedWarpMessage, ValidationId,
};
use std::fmt;

/// Lifecycle phase of one saga.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SagaPhase {
    /// Created, no step run yet.
    #[default]
    Ready,
    /// A step is in flight.
    Running(RegistrationStep),
    /// A step failed; waiting for an explicit retry.
    Failed {
        /// Failed step.
        step: RegistrationStep,
        /// Failure description.
        reason: String,
    },
    /// All five steps succeeded.
    Completed,
    /// Discarded by the caller.
    Cancelled,
}

impl SagaPhase {
    /// No further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaPhase::Completed | SagaPhase::Cancelled)
    }
}

impl fmt::Display for SagaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SagaPhase::Ready => f.write_str("Ready"),
            SagaPhase::Running(step) => write!(f, "Running({})", step),
            SagaPhase::Failed { step, .. } => write!(f, "Failed({})", step),
            SagaPhase::Completed => f.write_str("Completed"),
            SagaPhase::Cancelled => f.write_str("Cancelled"),
        }
    }
}

/// Inputs to the state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SagaEvent {
    /// Run from `from` through the last step.
    Start {
        /// First step to run.
        from: RegistrationStep,
    },
    /// Step 1 produced its artifacts.
    RegistrationInitiated {
        /// Unsigned registration message.
        message: UnsignedWarpMessage,
        /// Validation id.
        validation_id: ValidationId,
    },
    /// Step 2 produced the signed registration message.
    RegistrationMessageSigned {
        /// Signed registration message.
        message: SignedWarpMessage,
    },
    /// Step 3 committed on the P-Chain.
    PChainRegistered {
        /// P-Chain transaction.
        tx_id: TxId,
    },
    /// Step 4 produced the signed validation-status message.
    PChainMessageSigned {
        /// Signed P-Chain message.
        message: SignedWarpMessage,
    },
    /// Step 5 succeeded.
    RegistrationCompleted {
        /// Completion transaction hash.
        tx_hash: Bytes32,
    },
    /// The running step failed.
    StepFailed {
        /// Failed step.
        step: RegistrationStep,
        /// Failure description.
        reason: String,
    },
    /// Discard the saga.
    Cancel,
}

impl SagaEvent {
    fn name(&self) -> &'static str {
        match self {
            SagaEvent::Start { .. } => "Start",
            SagaEvent::RegistrationInitiated { .. } => "RegistrationInitiated",
            SagaEvent::RegistrationMessageSigned { .. } => "RegistrationMessageSigned",
            SagaEvent::PChainRegistered { .. } => "PChainRegistered",
            SagaEvent::PChainMessageSigned { .. } => "PChainMessageSigned",
            SagaEvent::RegistrationCompleted { .. } => "RegistrationCompleted",
            SagaEvent::StepFailed { .. } => "StepFailed",
            SagaEvent::Cancel => "Cancel",
        }
    }

    /// Step whose success this event reports.
    fn completes(&self) -> Option<RegistrationStep> {
        match self {
            SagaEvent::RegistrationInitiated { .. } => Some(RegistrationStep::InitializeRegistration),
            SagaEvent::RegistrationMessageSigned { .. } => Some(RegistrationStep::SignMessage),
            SagaEvent::PChainRegistered { .. } => Some(RegistrationStep::RegisterOnPChain),
            SagaEvent::PChainMessageSigned { .. } => Some(RegistrationStep::WaitForPChainSignature),
            SagaEvent::RegistrationCompleted { .. } => Some(RegistrationStep::FinalizeRegistration),
            _ => None,
        }
    }
}

/// Work the driver must perform after a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Mark the step as loading.
    StepStarted(RegistrationStep),
    /// Call `initiateValidatorRegistration`, with fallback.
    InitiateRegistration,
    /// Aggregate signatures over the registration message.
    AggregateRegistrationSignature {
        /// Message to sign.
        message: UnsignedWarpMessage,
    },
    /// Submit the P-Chain transaction and wait for commitment.
    RegisterOnPChain {
        /// Step 2 output.
        signed: SignedWarpMessage,
    },
    /// Build and aggregate the validation-status message.
    AggregatePChainSignature {
        /// Validation id.
        validation_id: ValidationId,
        /// Step 1 message, sent as justification.
        justification: UnsignedWarpMessage,
    },
    /// Call `completeValidatorRegistration` with the predicate attached.
    CompleteRegistration {
        /// Step 4 output.
        signed: SignedWarpMessage,
    },
    /// Mark the step as successful.
    StepSucceeded(RegistrationStep),
    /// Mark the step as failed.
    StepFailed {
        /// Failed step.
        step: RegistrationStep,
        /// Failure description.
        reason: String,
    },
    /// Saga reached its terminal success.
    Finished,
}

impl Effect {
    /// True for effects that call a collaborator and yield an event.
    pub fn is_command(&self) -> bool {
        !matches!(
            self,
            Effect::StepStarted(_)
                | Effect::StepSucceeded(_)
                | Effect::StepFailed { .. }
                | Effect::Finished
        )
    }
}

/// Saga phase plus accumulated artifacts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SagaMachine {
    /// Current phase.
    pub phase: SagaPhase,
    /// Artifacts produced so far.
    pub state: SagaState,
}

impl SagaMachine {
    /// Fresh machine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Machine seeded with artifacts from an earlier session.
    pub fn with_state(state: SagaState) -> Self {
        Self {
            phase: SagaPhase::Ready,
            state,
        }
    }
}

fn invalid(phase: &SagaPhase, event: &SagaEvent) -> RegistrationError {
    RegistrationError::InvalidTransition {
        from: phase.to_string(),
        to: event.name().to_string(),
    }
}

/// Command effect for `step`, built from stored artifacts.
///
/// Fails with `MissingArtifact` when an earlier step's output is absent.
pub fn command_for(step: RegistrationStep, state: &SagaState) -> Result<Effect, RegistrationError> {
    let unsigned = || {
        state
            .unsigned_registration_msg
            .clone()
            .ok_or(RegistrationError::MissingArtifact("unsigned registration message"))
    };

    match step {
        RegistrationStep::InitializeRegistration => Ok(Effect::InitiateRegistration),
        RegistrationStep::SignMessage => Ok(Effect::AggregateRegistrationSignature {
            message: unsigned()?,
        }),
        RegistrationStep::RegisterOnPChain => Ok(Effect::RegisterOnPChain {
            signed: state
                .signed_registration_msg
                .clone()
                .ok_or(RegistrationError::MissingArtifact("signed registration message"))?,
        }),
        RegistrationStep::WaitForPChainSignature => Ok(Effect::AggregatePChainSignature {
            validation_id: state
                .validation_id
                .ok_or(RegistrationError::MissingArtifact("validation id"))?,
            justification: unsigned()?,
        }),
        RegistrationStep::FinalizeRegistration => Ok(Effect::CompleteRegistration {
            signed: state
                .signed_p_chain_msg
                .clone()
                .ok_or(RegistrationError::MissingArtifact("signed P-Chain message"))?,
        }),
    }
}

fn store(state: &mut SagaState, event: SagaEvent) {
    match event {
        SagaEvent::RegistrationInitiated {
            message,
            validation_id,
        } => {
            state.unsigned_registration_msg = Some(message);
            state.validation_id = Some(validation_id);
        }
        SagaEvent::RegistrationMessageSigned { message } => {
            state.signed_registration_msg = Some(message);
        }
        SagaEvent::PChainRegistered { tx_id } => state.p_chain_tx_id = Some(tx_id),
        SagaEvent::PChainMessageSigned { message } => state.signed_p_chain_msg = Some(message),
        SagaEvent::RegistrationCompleted { tx_hash } => state.completion_tx_hash = Some(tx_hash),
        _ => {}
    }
}

/// Apply `event` to `machine`.
pub fn advance(
    machine: SagaMachine,
    event: SagaEvent,
) -> Result<(SagaMachine, Vec<Effect>), RegistrationError> {
    let SagaMachine { phase, mut state } = machine;

    match (&phase, &event) {
        (SagaPhase::Ready | SagaPhase::Failed { .. }, SagaEvent::Start { from }) => {
            let from = *from;
            let command = command_for(from, &state)?;
            Ok((
                SagaMachine {
                    phase: SagaPhase::Running(from),
                    state,
                },
                vec![Effect::StepStarted(from), command],
            ))
        }

        (SagaPhase::Running(running), SagaEvent::StepFailed { step, reason }) if running == step => {
            let step = *step;
            let reason = reason.clone();
            Ok((
                SagaMachine {
                    phase: SagaPhase::Failed {
                        step,
                        reason: reason.clone(),
                    },
                    state,
                },
                vec![Effect::StepFailed { step, reason }],
            ))
        }

        (SagaPhase::Running(running), _) if event.completes() == Some(*running) => {
            let step = *running;
            store(&mut state, event);

            match step.next() {
                Some(next) => {
                    let command = command_for(next, &state)?;
                    Ok((
                        SagaMachine {
                            phase: SagaPhase::Running(next),
                            state,
                        },
                        vec![
                            Effect::StepSucceeded(step),
                            Effect::StepStarted(next),
                            command,
                        ],
                    ))
                }
                None => Ok((
                    SagaMachine {
                        phase: SagaPhase::Completed,
                        state,
                    },
                    vec![Effect::StepSucceeded(step), Effect::Finished],
                )),
            }
        }

        (
            SagaPhase::Ready | SagaPhase::Running(_) | SagaPhase::Failed { .. },
            SagaEvent::Cancel,
        ) => Ok((
            SagaMachine {
                phase: SagaPhase::Cancelled,
                state: SagaState::default(),
            },
            Vec::new(),
        )),

        _ => Err(invalid(&phase, &event)),
    }
}
