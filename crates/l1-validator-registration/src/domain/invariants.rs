//! # Domain Invariants
//!
//! Preconditions checked before a saga starts, and the blank-message rule
//! every warp message consumer enforces.

use super::entities::{Validator, BLS_PROOF_OF_POSSESSION_LEN, BLS_PUBLIC_KEY_LEN};
use super::errors::RegistrationError;

/// Post-addition weight share a single validator must stay below.
pub const MAX_WEIGHT_SHARE_PERCENT: f64 = 20.0;

/// Stake percentage the aggregator must collect.
pub const DEFAULT_QUORUM_PERCENTAGE: u8 = 67;

/// Registration expiry window.
pub const REGISTRATION_EXPIRY_SECS: u64 = 12 * 60 * 60;

/// Invariant: a warp message is neither empty nor all zero.
pub fn invariant_message_not_blank(
    bytes: &[u8],
    what: &'static str,
) -> Result<(), RegistrationError> {
    if bytes.iter().all(|b| *b == 0) {
        return Err(RegistrationError::BlankMessage(what));
    }
    Ok(())
}

/// Invariant: the candidate's post-addition share stays under the limit.
pub fn invariant_weight_share(
    percentage: f64,
    exceeds: bool,
    limit: f64,
) -> Result<(), RegistrationError> {
    if exceeds {
        return Err(RegistrationError::WeightShareExceeded { percentage, limit });
    }
    Ok(())
}

/// Invariant: the funding account covers the declared balance.
pub fn invariant_balance_covered(available: u64, required: u64) -> Result<(), RegistrationError> {
    if available < required {
        return Err(RegistrationError::InsufficientPChainBalance {
            available,
            required,
        });
    }
    Ok(())
}

/// Invariant: the wallet is connected to the chain hosting the contract.
pub fn invariant_chain_matches(connected: u64, expected: u64) -> Result<(), RegistrationError> {
    if connected != expected {
        return Err(RegistrationError::ChainMismatch {
            connected,
            expected,
        });
    }
    Ok(())
}

/// Invariant: every validator field needed by steps 1 and 3 is present.
pub fn invariant_validator_complete(validator: &Validator) -> Result<(), RegistrationError> {
    if validator.node_id.is_zero() {
        return Err(RegistrationError::MissingField("node_id"));
    }
    check_key(
        &validator.bls_public_key,
        "bls_public_key",
        BLS_PUBLIC_KEY_LEN,
    )?;
    check_key(
        &validator.bls_proof_of_possession,
        "bls_proof_of_possession",
        BLS_PROOF_OF_POSSESSION_LEN,
    )?;
    if validator.weight == 0 {
        return Err(RegistrationError::MissingField("weight"));
    }
    if validator.balance == 0 {
        return Err(RegistrationError::MissingField("balance"));
    }
    for (owner, field) in [
        (&validator.remaining_balance_owner, "remaining_balance_owner"),
        (&validator.disable_owner, "disable_owner"),
    ] {
        if owner.addresses.is_empty() || owner.threshold == 0 {
            return Err(RegistrationError::MissingField(field));
        }
    }
    Ok(())
}

fn check_key(key: &[u8], field: &'static str, expected: usize) -> Result<(), RegistrationError> {
    if key.is_empty() {
        return Err(RegistrationError::MissingField(field));
    }
    if key.len() != expected {
        return Err(RegistrationError::InvalidKeyLength {
            field,
            expected,
            got: key.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{NodeId, PChainOwner};

    fn validator() -> Validator {
        Validator {
            node_id: NodeId([1u8; 20]),
            bls_public_key: vec![2u8; 48],
            bls_proof_of_possession: vec![3u8; 96],
            weight: 100,
            balance: 1_000_000_000,
            remaining_balance_owner: PChainOwner::single([4u8; 20]),
            disable_owner: PChainOwner::single([5u8; 20]),
        }
    }

    #[test]
    fn test_blank_message_rejected() {
        assert!(invariant_message_not_blank(&[], "m").is_err());
        assert!(invariant_message_not_blank(&[0, 0, 0], "m").is_err());
        assert!(invariant_message_not_blank(&[0, 1], "m").is_ok());
    }

    #[test]
    fn test_complete_validator_passes() {
        assert!(invariant_validator_complete(&validator()).is_ok());
    }

    #[test]
    fn test_missing_and_short_keys() {
        let mut v = validator();
        v.bls_public_key.clear();
        assert!(matches!(
            invariant_validator_complete(&v),
            Err(RegistrationError::MissingField("bls_public_key"))
        ));

        let mut v = validator();
        v.bls_proof_of_possession.truncate(95);
        assert!(matches!(
            invariant_validator_complete(&v),
            Err(RegistrationError::InvalidKeyLength { got: 95, .. })
        ));
    }

    #[test]
    fn test_owner_required() {
        let mut v = validator();
        v.disable_owner = PChainOwner::default();
        assert!(matches!(
            invariant_validator_complete(&v),
            Err(RegistrationError::MissingField("disable_owner"))
        ));
    }

    #[test]
    fn test_balance_and_chain() {
        assert!(invariant_balance_covered(10, 10).is_ok());
        assert!(invariant_balance_covered(9, 10).is_err());
        assert!(invariant_chain_matches(43113, 43113).is_ok());
        assert!(invariant_chain_matches(1, 43113).is_err());
    }
}
