//! Signature Aggregator Adapters
//!
//! Implements `SignatureAggregator` over the aggregation REST endpoint, and
//! an in-memory signer for tests and simulation.

use super::pchain::InMemoryPChain;
use crate::algorithms::warp::{
    pack_signed_message, unpack_addressed_call, unpack_l1_validator_registration_payload,
    unpack_unsigned_message, BLS_SIGNATURE_LEN,
};
use crate::domain::{
    AggregationRequest, AggregationResponse, RegistrationError, UnsignedWarpMessage, ValidationId,
};
use crate::ports::outbound::SignatureAggregator;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP signature aggregator.
///
/// POSTs the request body as JSON and expects `{ "signedMessage": hex }`.
pub struct HttpSignatureAggregator {
    client: Client,
    url: String,
}

impl HttpSignatureAggregator {
    /// Create a new client.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RegistrationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistrationError::Network(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SignatureAggregator for HttpSignatureAggregator {
    async fn aggregate(&self, request: &AggregationRequest) -> Result<Vec<u8>, RegistrationError> {
        debug!(
            "[registrar] Aggregating {} bytes for subnet {}",
            request.message.len() / 2,
            request.signing_subnet_id
        );

        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    RegistrationError::Network(format!("Cannot connect to {}", self.url))
                } else {
                    RegistrationError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("[registrar] Aggregator returned {}: {}", status, body);
            return Err(RegistrationError::Aggregation(format!("HTTP {}: {}", status, body)));
        }

        let body: AggregationResponse = response
            .json()
            .await
            .map_err(|e| RegistrationError::Aggregation(format!("invalid response: {}", e)))?;

        hex::decode(body.signed_message.trim_start_matches("0x"))
            .map_err(|e| RegistrationError::Aggregation(format!("invalid signedMessage hex: {}", e)))
    }
}

/// Scripted response of the in-memory aggregator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AggregatorBehavior {
    /// Sign the message.
    Sign,
    /// Return an all-zero blob.
    Blank,
    /// Fail with this message.
    Fail(String),
}

/// In-memory aggregator.
///
/// Appends a deterministic BitSetSignature to the requested message.
/// Behaviours queued with [`InMemorySignatureAggregator::push_behavior`] are
/// consumed one per request; an empty queue signs.
///
/// When attached to an [`InMemoryPChain`], P-Chain validation-status
/// messages are only signed for validation ids the chain has registered.
#[derive(Default)]
pub struct InMemorySignatureAggregator {
    requests: Mutex<Vec<AggregationRequest>>,
    script: Mutex<VecDeque<AggregatorBehavior>>,
    p_chain: Option<Arc<InMemoryPChain>>,
}

impl InMemorySignatureAggregator {
    /// Create a new aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sign validation-status messages only for ids registered on `p_chain`.
    pub fn with_p_chain(mut self, p_chain: Arc<InMemoryPChain>) -> Self {
        self.p_chain = Some(p_chain);
        self
    }

    /// Queue a one-shot behaviour.
    pub fn push_behavior(&self, behavior: AggregatorBehavior) {
        self.script.lock().push_back(behavior);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<AggregationRequest> {
        self.requests.lock().clone()
    }
}

fn fake_signature(message: &[u8]) -> [u8; BLS_SIGNATURE_LEN] {
    use sha2::{Digest, Sha256};

    let digest = Sha256::digest(message);
    let mut signature = [0u8; BLS_SIGNATURE_LEN];
    for chunk in signature.chunks_mut(digest.len()) {
        chunk.copy_from_slice(&digest[..chunk.len()]);
    }
    signature
}

/// Validation id of an L1ValidatorRegistration message sourced from the
/// P-Chain (AddressedCall with an empty source address).
fn registration_status_subject(message: &[u8]) -> Option<ValidationId> {
    let (envelope, _) = unpack_unsigned_message(message).ok()?;
    let (source, body) = unpack_addressed_call(&envelope.payload).ok()?;
    if !source.is_empty() {
        return None;
    }
    unpack_l1_validator_registration_payload(&body)
        .ok()
        .map(|(validation_id, _)| validation_id)
}

#[async_trait]
impl SignatureAggregator for InMemorySignatureAggregator {
    async fn aggregate(&self, request: &AggregationRequest) -> Result<Vec<u8>, RegistrationError> {
        self.requests.lock().push(request.clone());
        let behavior = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(AggregatorBehavior::Sign);

        match behavior {
            AggregatorBehavior::Fail(reason) => Err(RegistrationError::Aggregation(reason)),
            AggregatorBehavior::Blank => Ok(vec![0u8; 128]),
            AggregatorBehavior::Sign => {
                let bytes = hex::decode(&request.message)
                    .map_err(|e| RegistrationError::Aggregation(e.to_string()))?;
                let unsigned = UnsignedWarpMessage::new(bytes)?;
                if let (Some(p_chain), Some(validation_id)) =
                    (&self.p_chain, registration_status_subject(unsigned.as_bytes()))
                {
                    if !p_chain.is_registered(&validation_id) {
                        warn!("[registrar] Validators decline to sign for {}", validation_id);
                        return Err(RegistrationError::Aggregation(format!(
                            "validation id {} not registered on the P-Chain",
                            validation_id
                        )));
                    }
                }
                let signed =
                    pack_signed_message(&unsigned, &[0b0000_0111], &fake_signature(unsigned.as_bytes()))?;
                Ok(signed.into())
            }
        }
    }
}
