//! # Registration Configuration
//!
//! Tunables for the registration service. Loaded from JSON by the operator
//! binary or from `REGISTRAR_*` environment variables.

use crate::algorithms::{PollPolicy, TotalWeightPolicy};
use crate::domain::{
    Network, RegistrationError, DEFAULT_QUORUM_PERCENTAGE, MAX_WEIGHT_SHARE_PERCENT,
    REGISTRATION_EXPIRY_SECS,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Registration service configuration.
///
/// Deserialized fields left out of a JSON document take the defaults of the
/// document's `network`, endpoints included.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "PartialRegistrationConfig")]
pub struct RegistrationConfig {
    /// Avalanche network.
    pub network: Network,

    /// Stake percentage the aggregator must collect.
    pub quorum_percentage: u8,

    /// Seconds from now until a pending registration expires.
    pub registration_expiry_secs: u64,

    /// Post-addition weight share a candidate must stay below.
    pub max_weight_share_percent: f64,

    /// Source of the L1 total weight.
    pub weight_policy: TotalWeightPolicy,

    /// Commitment poll schedule.
    pub poll: PollPolicy,

    /// Signature aggregation endpoint.
    pub aggregator_url: String,

    /// Avalanche node base URL (P-Chain served at `/ext/bc/P`).
    pub p_chain_rpc_url: String,

    /// HTTP request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct PartialRegistrationConfig {
    network: Option<Network>,
    quorum_percentage: Option<u8>,
    registration_expiry_secs: Option<u64>,
    max_weight_share_percent: Option<f64>,
    weight_policy: Option<TotalWeightPolicy>,
    poll: Option<PollPolicy>,
    aggregator_url: Option<String>,
    p_chain_rpc_url: Option<String>,
    request_timeout_ms: Option<u64>,
}

impl From<PartialRegistrationConfig> for RegistrationConfig {
    fn from(partial: PartialRegistrationConfig) -> Self {
        let base = Self::for_network(partial.network.unwrap_or_default());
        Self {
            quorum_percentage: partial.quorum_percentage.unwrap_or(base.quorum_percentage),
            registration_expiry_secs: partial
                .registration_expiry_secs
                .unwrap_or(base.registration_expiry_secs),
            max_weight_share_percent: partial
                .max_weight_share_percent
                .unwrap_or(base.max_weight_share_percent),
            weight_policy: partial.weight_policy.unwrap_or(base.weight_policy),
            poll: partial.poll.unwrap_or(base.poll),
            aggregator_url: partial.aggregator_url.unwrap_or(base.aggregator_url),
            p_chain_rpc_url: partial.p_chain_rpc_url.unwrap_or(base.p_chain_rpc_url),
            request_timeout_ms: partial.request_timeout_ms.unwrap_or(base.request_timeout_ms),
            network: base.network,
        }
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self::for_network(Network::default())
    }
}

impl RegistrationConfig {
    /// Defaults with public endpoints for `network`.
    pub fn for_network(network: Network) -> Self {
        let p_chain_rpc_url = match network {
            Network::Mainnet => "https://api.avax.network",
            Network::Fuji => "https://api.avax-test.network",
        };
        Self {
            network,
            quorum_percentage: DEFAULT_QUORUM_PERCENTAGE,
            registration_expiry_secs: REGISTRATION_EXPIRY_SECS,
            max_weight_share_percent: MAX_WEIGHT_SHARE_PERCENT,
            weight_policy: TotalWeightPolicy::default(),
            poll: PollPolicy::default(),
            aggregator_url: format!(
                "https://glacier-api.avax.network/v1/signatureAggregator/{}/aggregateSignatures",
                network.name()
            ),
            p_chain_rpc_url: p_chain_rpc_url.to_string(),
            request_timeout_ms: 30_000,
        }
    }

    /// Create a config for testing (millisecond polls).
    pub fn for_testing() -> Self {
        Self {
            poll: PollPolicy::for_testing(),
            aggregator_url: "http://127.0.0.1:8080/aggregateSignatures".to_string(),
            p_chain_rpc_url: "http://127.0.0.1:9650".to_string(),
            request_timeout_ms: 1_000,
            ..Self::for_network(Network::Fuji)
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `REGISTRAR_NETWORK`: mainnet or fuji (default: fuji)
    /// - `REGISTRAR_AGGREGATOR_URL`: signature aggregation endpoint
    /// - `REGISTRAR_PCHAIN_RPC_URL`: Avalanche node base URL
    /// - `REGISTRAR_QUORUM_PERCENTAGE`: quorum (default: 67)
    /// - `REGISTRAR_WEIGHT_POLICY`: prefer_contract, contract_only, p_chain_only, reconcile
    /// - `REGISTRAR_POLL_MAX_ATTEMPTS`: poll bound, 0 for unbounded (default: 120)
    pub fn from_env() -> Result<Self, RegistrationError> {
        let network = match env::var("REGISTRAR_NETWORK") {
            Ok(value) => value.parse()?,
            Err(_) => Network::default(),
        };
        let mut config = Self::for_network(network);

        if let Ok(url) = env::var("REGISTRAR_AGGREGATOR_URL") {
            config.aggregator_url = url;
        }
        if let Ok(url) = env::var("REGISTRAR_PCHAIN_RPC_URL") {
            config.p_chain_rpc_url = url;
        }
        if let Ok(value) = env::var("REGISTRAR_QUORUM_PERCENTAGE") {
            config.quorum_percentage = value.parse().map_err(|_| {
                RegistrationError::Config(format!("invalid quorum percentage: {}", value))
            })?;
        }
        if let Ok(value) = env::var("REGISTRAR_WEIGHT_POLICY") {
            config.weight_policy = serde_json::from_value(serde_json::Value::String(value.clone()))
                .map_err(|_| RegistrationError::Config(format!("invalid weight policy: {}", value)))?;
        }
        if let Ok(value) = env::var("REGISTRAR_POLL_MAX_ATTEMPTS") {
            let attempts: u32 = value.parse().map_err(|_| {
                RegistrationError::Config(format!("invalid poll attempts: {}", value))
            })?;
            config.poll.max_attempts = (attempts > 0).then_some(attempts);
        }

        config.validate()?;
        Ok(config)
    }

    /// HTTP request timeout for the aggregator and P-Chain clients.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Reject values that would make the saga unsound.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.quorum_percentage == 0 || self.quorum_percentage > 100 {
            return Err(RegistrationError::Config(format!(
                "quorum percentage must be in 1..=100, got {}",
                self.quorum_percentage
            )));
        }
        if !(self.max_weight_share_percent > 0.0 && self.max_weight_share_percent <= 100.0) {
            return Err(RegistrationError::Config(format!(
                "max weight share must be in (0, 100], got {}",
                self.max_weight_share_percent
            )));
        }
        if self.registration_expiry_secs == 0 {
            return Err(RegistrationError::Config(
                "registration expiry must be positive".to_string(),
            ));
        }
        if self.poll.initial_interval_ms == 0 || self.poll.max_interval_ms < self.poll.initial_interval_ms {
            return Err(RegistrationError::Config(
                "poll intervals must be positive and max >= initial".to_string(),
            ));
        }
        if self.poll.max_attempts == Some(0) {
            return Err(RegistrationError::Config(
                "poll max_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistrationConfig::default();
        assert_eq!(config.network, Network::Fuji);
        assert_eq!(config.quorum_percentage, 67);
        assert_eq!(config.registration_expiry_secs, 43_200);
        assert_eq!(config.weight_policy, TotalWeightPolicy::PreferContract);
        assert!(config.aggregator_url.contains("/fuji/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_testing_config() {
        let config = RegistrationConfig::for_testing();
        assert_eq!(config.poll.initial_interval_ms, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RegistrationConfig =
            serde_json::from_str(r#"{"network":"mainnet","weight_policy":"reconcile"}"#).unwrap();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.weight_policy, TotalWeightPolicy::Reconcile);
        assert_eq!(config.quorum_percentage, 67);
        assert!(config.aggregator_url.contains("/mainnet/"));
        assert_eq!(config.p_chain_rpc_url, "https://api.avax.network");
    }

    #[test]
    fn test_explicit_urls_override_network_defaults() {
        let config: RegistrationConfig = serde_json::from_str(
            r#"{"network":"mainnet","p_chain_rpc_url":"http://10.0.0.5:9650"}"#,
        )
        .unwrap();
        assert_eq!(config.p_chain_rpc_url, "http://10.0.0.5:9650");
        assert!(config.aggregator_url.contains("/mainnet/"));

        let fuji: RegistrationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(fuji, RegistrationConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RegistrationConfig::default();
        config.quorum_percentage = 0;
        assert!(config.validate().is_err());

        let mut config = RegistrationConfig::default();
        config.poll.max_attempts = Some(0);
        assert!(config.validate().is_err());

        let mut config = RegistrationConfig::default();
        config.max_weight_share_percent = 120.0;
        assert!(config.validate().is_err());
    }
}
