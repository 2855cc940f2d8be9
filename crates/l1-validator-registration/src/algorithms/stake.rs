//! # Stake Accounting
//!
//! Weight concentration check for a candidate validator.
//!
//! The share is `w / (T + w)`. An L1 with no weight yet is bootstrapping and
//! always admits its first validator.

use crate::domain::{PChainValidator, MAX_WEIGHT_SHARE_PERCENT};
use serde::{Deserialize, Serialize};

/// Result of a share computation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightShare {
    /// Current L1 total weight.
    pub total_weight: u64,
    /// Candidate weight.
    pub candidate_weight: u64,
    /// Post-addition share in percent.
    pub percentage: f64,
    /// True when the share reaches the limit.
    pub exceeds: bool,
}

/// Compute the candidate's post-addition share against the default 20% limit.
pub fn compute_share_percentage(total_weight: u64, candidate_weight: u64) -> WeightShare {
    compute_share_with_limit(total_weight, candidate_weight, MAX_WEIGHT_SHARE_PERCENT)
}

/// Compute the candidate's post-addition share against `limit_percent`.
///
/// The limit comparison runs in integer arithmetic so the boundary is exact;
/// `percentage` is reported for display only.
pub fn compute_share_with_limit(
    total_weight: u64,
    candidate_weight: u64,
    limit_percent: f64,
) -> WeightShare {
    if total_weight == 0 {
        return WeightShare {
            total_weight,
            candidate_weight,
            percentage: 100.0,
            exceeds: false,
        };
    }

    let combined = total_weight as u128 + candidate_weight as u128;
    let percentage = candidate_weight as f64 * 100.0 / combined as f64;

    // candidate * 100 >= limit * combined, with the limit in hundredths
    let limit_hundredths = (limit_percent * 100.0).round() as u128;
    let exceeds = candidate_weight as u128 * 100 * 100 >= limit_hundredths * combined;

    WeightShare {
        total_weight,
        candidate_weight,
        percentage,
        exceeds,
    }
}

/// Sum the weights of a P-Chain validator set.
pub fn sum_validator_weights(validators: &[PChainValidator]) -> u64 {
    validators
        .iter()
        .fold(0u64, |acc, v| acc.saturating_add(v.weight))
}

/// Where the L1 total weight is read from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalWeightPolicy {
    /// Contract first; P-Chain validator set when the contract read fails.
    #[default]
    PreferContract,
    /// Contract only.
    ContractOnly,
    /// P-Chain validator set only.
    PChainOnly,
    /// Read both and refuse to proceed if they differ.
    Reconcile,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeId;
    use proptest::prelude::*;


    #[test]
    fn test_exact_boundary_exceeds() {
        let share = compute_share_percentage(80, 20);
        assert_eq!(share.percentage, 20.0);
        assert!(share.exceeds);
    }

    #[test]
    fn test_just_below_boundary() {
        let share = compute_share_percentage(81, 20);
        assert!((share.percentage - 19.80).abs() < 0.01);
        assert!(!share.exceeds);
    }

    #[test]
    fn test_typical_share() {
        let share = compute_share_percentage(500, 100);
        assert!((share.percentage - 16.666).abs() < 0.01);
        assert!(!share.exceeds);
    }

    #[test]
    fn test_large_weights_do_not_overflow() {
        let share = compute_share_percentage(u64::MAX, u64::MAX);
        assert!(share.exceeds);
        assert!((share.percentage - 50.0).abs() < 0.001);
    }

    #[test]
    fn test_custom_limit() {
        assert!(!compute_share_with_limit(80, 20, 25.0).exceeds);
        assert!(compute_share_with_limit(75, 25, 25.0).exceeds);
    }

    #[test]
    fn test_sum_validator_weights() {
        let set = vec![
            PChainValidator {
                node_id: NodeId([1u8; 20]),
                weight: 300,
            },
            PChainValidator {
                node_id: NodeId([2u8; 20]),
                weight: 200,
            },
        ];
        assert_eq!(sum_validator_weights(&set), 500);
        assert_eq!(sum_validator_weights(&[]), 0);
    }

    proptest! {
        #[test]
        fn prop_first_validator_never_exceeds(candidate in any::<u64>()) {
            let share = compute_share_percentage(0, candidate);
            prop_assert_eq!(share.percentage, 100.0);
            prop_assert!(!share.exceeds);
        }

        #[test]
        fn prop_exceeds_matches_integer_rule(total in 1u64..=u64::MAX, candidate in any::<u64>()) {
            let share = compute_share_percentage(total, candidate);
            let combined = total as u128 + candidate as u128;
            prop_assert_eq!(share.exceeds, 100 * candidate as u128 >= 20 * combined);
        }
    }
}
