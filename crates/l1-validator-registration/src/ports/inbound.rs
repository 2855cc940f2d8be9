//! # Inbound Ports
//!
//! API trait defining what the registration service can do.

use crate::algorithms::WeightShare;
use crate::domain::{
    L1Descriptor, RegistrationError, RegistrationOutcome, RegistrationStep, Validator,
};
use crate::progress::StepEntry;
use crate::service::RegistrationSaga;
use async_trait::async_trait;

/// Validator registration API - inbound port.
#[async_trait]
pub trait ValidatorRegistrationApi: Send + Sync {
    /// Run the hard preconditions without starting a saga.
    async fn check_preconditions(
        &self,
        validator: &Validator,
        l1: &L1Descriptor,
    ) -> Result<WeightShare, RegistrationError>;

    /// Check preconditions and create a saga holding the node's claim.
    async fn begin(
        &self,
        validator: Validator,
        l1: L1Descriptor,
    ) -> Result<RegistrationSaga, RegistrationError>;

    /// Run steps 1 through 5.
    async fn add_validator(
        &self,
        saga: &mut RegistrationSaga,
    ) -> Result<RegistrationOutcome, RegistrationError>;

    /// Run from `from` through step 5, reusing stored artifacts.
    ///
    /// Every step before `from` must already have succeeded.
    async fn resume(
        &self,
        saga: &mut RegistrationSaga,
        from: RegistrationStep,
    ) -> Result<RegistrationOutcome, RegistrationError>;

    /// Discard the saga and release its claim. No on-chain rollback.
    fn cancel(&self, saga: RegistrationSaga) -> Result<(), RegistrationError>;

    /// Snapshot of the saga's step statuses.
    fn progress(&self, saga: &RegistrationSaga) -> Vec<StepEntry<RegistrationStep>>;
}
