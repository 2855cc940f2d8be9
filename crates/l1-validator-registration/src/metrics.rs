//! # Registration Metrics
//!
//! Prometheus metrics for the registration saga.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! l1-validator-registration = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `registration_steps_started_total` - Counter of steps started (by step)
//! - `registration_step_failures_total` - Counter of step failures (by step)
//! - `registration_step1_fallbacks_total` - Counter of resend fallbacks in step 1
//! - `registration_pchain_status_polls_total` - Counter of P-Chain status polls
//! - `registration_completed_total` - Counter of sagas reaching FinalizeRegistration
//! - `registration_weight_share_percent` - Gauge of the last computed weight share

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_gauge, register_int_counter, register_int_counter_vec, Gauge, IntCounter,
    IntCounterVec,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Steps started, labeled by step
    pub static ref STEPS_STARTED: IntCounterVec = register_int_counter_vec!(
        "registration_steps_started_total",
        "Total number of saga steps started",
        &["step"]
    )
    .expect("Failed to create STEPS_STARTED metric");

    /// Step failures, labeled by step
    pub static ref STEP_FAILURES: IntCounterVec = register_int_counter_vec!(
        "registration_step_failures_total",
        "Total number of saga step failures",
        &["step"]
    )
    .expect("Failed to create STEP_FAILURES metric");

    /// Step 1 resend fallbacks
    pub static ref STEP1_FALLBACKS: IntCounter = register_int_counter!(
        "registration_step1_fallbacks_total",
        "Total number of resendRegisterValidatorMessage fallbacks"
    )
    .expect("Failed to create STEP1_FALLBACKS metric");

    /// P-Chain status polls
    pub static ref PCHAIN_STATUS_POLLS: IntCounter = register_int_counter!(
        "registration_pchain_status_polls_total",
        "Total number of P-Chain getTxStatus polls"
    )
    .expect("Failed to create PCHAIN_STATUS_POLLS metric");

    /// Completed registrations
    pub static ref REGISTRATIONS_COMPLETED: IntCounter = register_int_counter!(
        "registration_completed_total",
        "Total number of validator registrations completed"
    )
    .expect("Failed to create REGISTRATIONS_COMPLETED metric");

    /// Last computed weight share
    pub static ref WEIGHT_SHARE_PERCENT: Gauge = register_gauge!(
        "registration_weight_share_percent",
        "Post-addition weight share of the last checked candidate"
    )
    .expect("Failed to create WEIGHT_SHARE_PERCENT metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

/// Record a step started
#[cfg(feature = "metrics")]
pub fn record_step_started(step: &str) {
    STEPS_STARTED.with_label_values(&[step]).inc();
}

/// Record a step failure
#[cfg(feature = "metrics")]
pub fn record_step_failed(step: &str) {
    STEP_FAILURES.with_label_values(&[step]).inc();
}

/// Record a step 1 fallback
#[cfg(feature = "metrics")]
pub fn record_step1_fallback() {
    STEP1_FALLBACKS.inc();
}

/// Record a P-Chain status poll
#[cfg(feature = "metrics")]
pub fn record_pchain_poll() {
    PCHAIN_STATUS_POLLS.inc();
}

/// Record a completed registration
#[cfg(feature = "metrics")]
pub fn record_registration_completed() {
    REGISTRATIONS_COMPLETED.inc();
}

/// Update weight share gauge
#[cfg(feature = "metrics")]
pub fn set_weight_share(percent: f64) {
    WEIGHT_SHARE_PERCENT.set(percent);
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

/// Record a step started
#[cfg(not(feature = "metrics"))]
pub fn record_step_started(_step: &str) {}

/// Record a step failure
#[cfg(not(feature = "metrics"))]
pub fn record_step_failed(_step: &str) {}

/// Record a step 1 fallback
#[cfg(not(feature = "metrics"))]
pub fn record_step1_fallback() {}

/// Record a P-Chain status poll
#[cfg(not(feature = "metrics"))]
pub fn record_pchain_poll() {}

/// Record a completed registration
#[cfg(not(feature = "metrics"))]
pub fn record_registration_completed() {}

/// Update weight share gauge
#[cfg(not(feature = "metrics"))]
pub fn set_weight_share(_percent: f64) {}
