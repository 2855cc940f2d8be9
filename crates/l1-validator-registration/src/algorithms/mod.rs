//! # Algorithms Module
//!
//! Pure logic for validator registration: stake limits, warp codec,
//! receipt decoding, poll scheduling and the saga transition function.

pub mod abi;
pub mod polling;
pub mod stake;
pub mod transition;
pub mod warp;

pub use abi::{
    decode_abi_bytes, encode_abi_bytes, event_topic, extract_validation_id, extract_warp_message,
};
pub use polling::PollPolicy;
pub use stake::{
    compute_share_percentage, compute_share_with_limit, sum_validator_weights, TotalWeightPolicy,
    WeightShare,
};
pub use transition::{advance, command_for, Effect, SagaEvent, SagaMachine, SagaPhase};
pub use warp::{
    pack_l1_validator_registration, pack_warp_into_access_list, unpack_access_list_predicate,
    WARP_PRECOMPILE_ADDRESS,
};
