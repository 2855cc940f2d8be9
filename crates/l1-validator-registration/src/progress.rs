//! # Step Progress Tracker
//!
//! Finite-state tracker over an ordered list of named steps.
//!
//! ## Rules
//!
//! | From | To | Allowed |
//! |------|----|---------|
//! | idle | loading | when no other step is loading |
//! | loading | success / error | always |
//! | error | loading | only through [`StepProgress::handle_retry`] |
//!
//! The tracker is independent of the saga; any ordered key type works.

use crate::domain::StepStatus;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Tracker rule violations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProgressError {
    /// Step not part of this tracker.
    #[error("Unknown step: {0}")]
    UnknownStep(String),

    /// Status change not permitted.
    #[error("Illegal transition for {step}: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Step
        step: String,
        /// Current status
        from: StepStatus,
        /// Requested status
        to: StepStatus,
    },

    /// Another step is already loading.
    #[error("Cannot start {step}: {loading} is still loading")]
    AlreadyLoading {
        /// Step that asked to load
        step: String,
        /// Step currently loading
        loading: String,
    },
}

/// Status and last error of one step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StepEntry<K> {
    /// Step key.
    pub key: K,
    /// Current status.
    pub status: StepStatus,
    /// Error recorded by the last failure.
    pub error: Option<String>,
}

/// Progress of one attempt over an ordered list of steps.
#[derive(Clone, Debug, Serialize)]
pub struct StepProgress<K> {
    steps: Vec<StepEntry<K>>,
    processing: bool,
    completion_message: Option<String>,
}

impl<K> StepProgress<K>
where
    K: Copy + Eq + fmt::Display,
{
    /// Tracker with every step idle.
    pub fn new(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            steps: keys
                .into_iter()
                .map(|key| StepEntry {
                    key,
                    status: StepStatus::Idle,
                    error: None,
                })
                .collect(),
            processing: false,
            completion_message: None,
        }
    }

    fn position(&self, step: K) -> Result<usize, ProgressError> {
        self.steps
            .iter()
            .position(|entry| entry.key == step)
            .ok_or_else(|| ProgressError::UnknownStep(step.to_string()))
    }

    /// Change a step's status.
    pub fn update_step_status(
        &mut self,
        step: K,
        status: StepStatus,
        error: Option<String>,
    ) -> Result<(), ProgressError> {
        let idx = self.position(step)?;
        let current = self.steps[idx].status;

        let allowed = matches!(
            (current, status),
            (StepStatus::Idle, StepStatus::Loading)
                | (StepStatus::Loading, StepStatus::Success)
                | (StepStatus::Loading, StepStatus::Error)
        );
        if !allowed {
            return Err(ProgressError::IllegalTransition {
                step: step.to_string(),
                from: current,
                to: status,
            });
        }

        if status == StepStatus::Loading {
            if let Some(loading) = self.loading_step() {
                return Err(ProgressError::AlreadyLoading {
                    step: step.to_string(),
                    loading: loading.to_string(),
                });
            }
        }

        let entry = &mut self.steps[idx];
        entry.status = status;
        entry.error = if status == StepStatus::Error { error } else { None };
        Ok(())
    }

    /// Begin a full attempt from the first step.
    pub fn start_processing(&mut self) {
        self.reset_steps();
        self.processing = true;
    }

    /// End the attempt with a completion message.
    pub fn complete_processing(&mut self, message: impl Into<String>) {
        self.processing = false;
        self.completion_message = Some(message.into());
    }

    /// End the attempt without completing; statuses are kept.
    pub fn stop_processing(&mut self) {
        self.processing = false;
    }

    /// Every step back to idle.
    pub fn reset_steps(&mut self) {
        for entry in &mut self.steps {
            entry.status = StepStatus::Idle;
            entry.error = None;
        }
        self.processing = false;
        self.completion_message = None;
    }

    /// Reset `step` and every later step to idle, then hand `step` to
    /// `resume` so the caller can restart the saga from there.
    pub fn handle_retry<R>(
        &mut self,
        step: K,
        resume: impl FnOnce(K) -> R,
    ) -> Result<R, ProgressError> {
        let idx = self.position(step)?;
        if let Some(loading) = self.loading_step() {
            return Err(ProgressError::AlreadyLoading {
                step: step.to_string(),
                loading: loading.to_string(),
            });
        }

        for entry in &mut self.steps[idx..] {
            entry.status = StepStatus::Idle;
            entry.error = None;
        }
        self.processing = true;
        self.completion_message = None;
        Ok(resume(step))
    }

    /// Status of `step`.
    pub fn status(&self, step: K) -> Option<StepStatus> {
        self.steps
            .iter()
            .find(|entry| entry.key == step)
            .map(|entry| entry.status)
    }

    /// Last error recorded for `step`.
    pub fn error(&self, step: K) -> Option<&str> {
        self.steps
            .iter()
            .find(|entry| entry.key == step)
            .and_then(|entry| entry.error.as_deref())
    }

    /// Step currently loading.
    pub fn loading_step(&self) -> Option<K> {
        self.steps
            .iter()
            .find(|entry| entry.status == StepStatus::Loading)
            .map(|entry| entry.key)
    }

    /// First step in error, if any.
    pub fn failed_step(&self) -> Option<K> {
        self.steps
            .iter()
            .find(|entry| entry.status == StepStatus::Error)
            .map(|entry| entry.key)
    }

    /// All steps, in order.
    pub fn steps(&self) -> &[StepEntry<K>] {
        &self.steps
    }

    /// An attempt is running.
    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// Message from the last completed attempt.
    pub fn completion_message(&self) -> Option<&str> {
        self.completion_message.as_deref()
    }

    /// Every step succeeded.
    pub fn is_complete(&self) -> bool {
        self.steps
            .iter()
            .all(|entry| entry.status == StepStatus::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RegistrationStep;

    fn tracker() -> StepProgress<RegistrationStep> {
        StepProgress::new(RegistrationStep::ALL)
    }

    #[test]
    fn test_happy_path() {
        let mut p = tracker();
        p.start_processing();
        for step in RegistrationStep::ALL {
            p.update_step_status(step, StepStatus::Loading, None).unwrap();
            p.update_step_status(step, StepStatus::Success, None).unwrap();
        }
        p.complete_processing("Validator registered");
        assert!(p.is_complete());
        assert!(!p.is_processing());
        assert_eq!(p.completion_message(), Some("Validator registered"));
    }

    #[test]
    fn test_two_loading_steps_rejected() {
        let mut p = tracker();
        p.update_step_status(RegistrationStep::InitializeRegistration, StepStatus::Loading, None)
            .unwrap();
        let err = p
            .update_step_status(RegistrationStep::SignMessage, StepStatus::Loading, None)
            .unwrap_err();
        assert!(matches!(err, ProgressError::AlreadyLoading { .. }));
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut p = tracker();
        // idle -> success skips loading
        assert!(p
            .update_step_status(RegistrationStep::SignMessage, StepStatus::Success, None)
            .is_err());

        p.update_step_status(RegistrationStep::SignMessage, StepStatus::Loading, None)
            .unwrap();
        p.update_step_status(
            RegistrationStep::SignMessage,
            StepStatus::Error,
            Some("quorum not reached".to_string()),
        )
        .unwrap();
        assert_eq!(p.error(RegistrationStep::SignMessage), Some("quorum not reached"));

        // error -> loading only through retry
        assert!(matches!(
            p.update_step_status(RegistrationStep::SignMessage, StepStatus::Loading, None),
            Err(ProgressError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn test_retry_resets_tail_only() {
        let mut p = tracker();
        for step in &RegistrationStep::ALL[..2] {
            p.update_step_status(*step, StepStatus::Loading, None).unwrap();
            p.update_step_status(*step, StepStatus::Success, None).unwrap();
        }
        p.update_step_status(RegistrationStep::RegisterOnPChain, StepStatus::Loading, None)
            .unwrap();
        p.update_step_status(
            RegistrationStep::RegisterOnPChain,
            StepStatus::Error,
            Some("dropped".to_string()),
        )
        .unwrap();

        let resumed = p
            .handle_retry(RegistrationStep::RegisterOnPChain, |step| step)
            .unwrap();
        assert_eq!(resumed, RegistrationStep::RegisterOnPChain);
        assert_eq!(p.status(RegistrationStep::SignMessage), Some(StepStatus::Success));
        assert_eq!(p.status(RegistrationStep::RegisterOnPChain), Some(StepStatus::Idle));
        assert!(p.error(RegistrationStep::RegisterOnPChain).is_none());
        assert!(p.is_processing());
    }

    #[test]
    fn test_retry_while_loading_rejected() {
        let mut p = tracker();
        p.update_step_status(RegistrationStep::SignMessage, StepStatus::Loading, None)
            .unwrap();
        assert!(p.handle_retry(RegistrationStep::SignMessage, |_| ()).is_err());
    }

    #[test]
    fn test_unknown_step() {
        let mut p: StepProgress<&str> = StepProgress::new(["a", "b"]);
        assert!(matches!(
            p.update_step_status("c", StepStatus::Loading, None),
            Err(ProgressError::UnknownStep(_))
        ));
        assert_eq!(p.status("b"), Some(StepStatus::Idle));
    }
}
