//! P-Chain Adapters
//!
//! `JsonRpcPChainClient` talks JSON-RPC 2.0 to `<node>/ext/bc/P`.
//! `InMemoryPChain` implements both the read client and the wallet for
//! tests and simulation.

use crate::algorithms::warp::{unpack_addressed_call, unpack_signed_message};
use crate::domain::{
    BlockchainId, NodeId, PChainValidator, RegisterL1ValidatorRequest, RegistrationError,
    SignedWarpMessage, SubnetId, TxId, TxStatus, ValidationId,
};
use crate::ports::outbound::{PChainClient, PChainWallet, TxStatusResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

// =============================================================================
// JSON-RPC client
// =============================================================================

#[derive(Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct GetTxStatusResult {
    status: TxStatus,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct CurrentValidator {
    #[serde(rename = "nodeID")]
    node_id: NodeId,
    weight: String,
}

#[derive(Deserialize)]
struct GetCurrentValidatorsResult {
    validators: Vec<CurrentValidator>,
}

#[derive(Deserialize)]
struct ValidatedByResult {
    #[serde(rename = "subnetID")]
    subnet_id: SubnetId,
}

/// P-Chain JSON-RPC client.
pub struct JsonRpcPChainClient {
    client: Client,
    endpoint: String,
    request_id: AtomicU64,
}

impl JsonRpcPChainClient {
    /// Create a client for the node at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RegistrationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistrationError::Network(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/ext/bc/P", base_url.trim_end_matches('/')),
            request_id: AtomicU64::new(1),
        })
    }

    /// JSON-RPC endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn call<P: Serialize + Send + Sync, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, RegistrationError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id(),
            method,
            params,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    RegistrationError::Network(format!("Cannot connect to {}", self.endpoint))
                } else {
                    RegistrationError::Network(e.to_string())
                }
            })?;

        let rpc: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| RegistrationError::Network(format!("invalid {} response: {}", method, e)))?;

        if let Some(error) = rpc.error {
            return Err(RegistrationError::Network(format!(
                "{} failed ({}): {}",
                method, error.code, error.message
            )));
        }

        rpc.result
            .ok_or_else(|| RegistrationError::Network(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl PChainClient for JsonRpcPChainClient {
    async fn get_tx_status(&self, tx_id: &TxId) -> Result<TxStatusResponse, RegistrationError> {
        let result: GetTxStatusResult = self
            .call(
                "platform.getTxStatus",
                serde_json::json!({ "txID": tx_id.to_string() }),
            )
            .await?;
        Ok(TxStatusResponse {
            status: result.status,
            reason: result.reason,
        })
    }

    async fn current_validators(
        &self,
        subnet_id: &SubnetId,
    ) -> Result<Vec<PChainValidator>, RegistrationError> {
        let result: GetCurrentValidatorsResult = self
            .call(
                "platform.getCurrentValidators",
                serde_json::json!({ "subnetID": subnet_id.to_string() }),
            )
            .await?;

        result
            .validators
            .into_iter()
            .map(|v| {
                let weight = v.weight.parse().map_err(|_| {
                    RegistrationError::Codec(format!("invalid validator weight: {}", v.weight))
                })?;
                Ok(PChainValidator {
                    node_id: v.node_id,
                    weight,
                })
            })
            .collect()
    }

    async fn validated_by(
        &self,
        blockchain_id: &BlockchainId,
    ) -> Result<SubnetId, RegistrationError> {
        let result: ValidatedByResult = self
            .call(
                "platform.validatedBy",
                serde_json::json!({ "blockchainID": blockchain_id.to_string() }),
            )
            .await?;
        Ok(result.subnet_id)
    }
}

// =============================================================================
// In-memory P-Chain
// =============================================================================

struct PendingTx {
    polls_until_commit: u32,
    dropped: Option<String>,
}

#[derive(Default)]
struct PChainState {
    balance: u64,
    subnets: HashMap<BlockchainId, SubnetId>,
    validators: HashMap<SubnetId, Vec<PChainValidator>>,
    txs: HashMap<TxId, PendingTx>,
    processing_polls: u32,
    drop_next: Option<String>,
    registrations: Vec<RegisterL1ValidatorRequest>,
    registered: HashSet<ValidationId>,
    status_polls: u32,
    validated_by_calls: u32,
    validators_unavailable: bool,
}

/// In-memory P-Chain node plus funding wallet.
pub struct InMemoryPChain {
    address: String,
    state: Mutex<PChainState>,
}

impl InMemoryPChain {
    /// Create a chain whose wallet holds `balance` nAVAX.
    pub fn new(address: impl Into<String>, balance: u64) -> Self {
        Self {
            address: address.into(),
            state: Mutex::new(PChainState {
                balance,
                ..PChainState::default()
            }),
        }
    }

    /// Register the subnet validating `blockchain_id`.
    pub fn with_subnet(self, blockchain_id: BlockchainId, subnet_id: SubnetId) -> Self {
        self.state.lock().subnets.insert(blockchain_id, subnet_id);
        self
    }

    /// Seed the current validator set of `subnet_id`.
    pub fn with_validators(self, subnet_id: SubnetId, validators: Vec<PChainValidator>) -> Self {
        self.state.lock().validators.insert(subnet_id, validators);
        self
    }

    /// Report `Processing` this many times before `Committed`.
    pub fn set_processing_polls(&self, polls: u32) {
        self.state.lock().processing_polls = polls;
    }

    /// Drop the next registration with `reason`.
    pub fn drop_next_registration(&self, reason: impl Into<String>) {
        self.state.lock().drop_next = Some(reason.into());
    }

    /// Make `getCurrentValidators` fail.
    pub fn set_validators_unavailable(&self, unavailable: bool) {
        self.state.lock().validators_unavailable = unavailable;
    }

    /// Registration transactions received.
    pub fn registrations(&self) -> Vec<RegisterL1ValidatorRequest> {
        self.state.lock().registrations.clone()
    }

    /// A non-dropped registration for `validation_id` was accepted.
    pub fn is_registered(&self, validation_id: &ValidationId) -> bool {
        self.state.lock().registered.contains(validation_id)
    }

    /// `getTxStatus` calls served.
    pub fn status_polls(&self) -> u32 {
        self.state.lock().status_polls
    }

    /// `validatedBy` calls served.
    pub fn validated_by_calls(&self) -> u32 {
        self.state.lock().validated_by_calls
    }
}

/// Validation id carried by a signed RegisterL1Validator message: the
/// sha256 of the AddressedCall payload.
fn carried_validation_id(signed: &SignedWarpMessage) -> Option<ValidationId> {
    use sha2::{Digest, Sha256};

    let (message, _) = unpack_signed_message(signed).ok()?;
    let (_, payload) = unpack_addressed_call(&message.payload).ok()?;
    let mut id = [0u8; 32];
    id.copy_from_slice(&Sha256::digest(&payload));
    Some(ValidationId::new(id))
}

#[async_trait]
impl PChainClient for InMemoryPChain {
    async fn get_tx_status(&self, tx_id: &TxId) -> Result<TxStatusResponse, RegistrationError> {
        let mut state = self.state.lock();
        state.status_polls += 1;

        let Some(tx) = state.txs.get_mut(tx_id) else {
            return Ok(TxStatusResponse {
                status: TxStatus::Unknown,
                reason: None,
            });
        };

        if let Some(reason) = &tx.dropped {
            return Ok(TxStatusResponse {
                status: TxStatus::Dropped,
                reason: Some(reason.clone()),
            });
        }
        if tx.polls_until_commit > 0 {
            tx.polls_until_commit -= 1;
            return Ok(TxStatusResponse {
                status: TxStatus::Processing,
                reason: None,
            });
        }
        Ok(TxStatusResponse {
            status: TxStatus::Committed,
            reason: None,
        })
    }

    async fn current_validators(
        &self,
        subnet_id: &SubnetId,
    ) -> Result<Vec<PChainValidator>, RegistrationError> {
        let state = self.state.lock();
        if state.validators_unavailable {
            return Err(RegistrationError::Network(
                "platform.getCurrentValidators unavailable".to_string(),
            ));
        }
        Ok(state.validators.get(subnet_id).cloned().unwrap_or_default())
    }

    async fn validated_by(
        &self,
        blockchain_id: &BlockchainId,
    ) -> Result<SubnetId, RegistrationError> {
        let mut state = self.state.lock();
        state.validated_by_calls += 1;
        state.subnets.get(blockchain_id).copied().ok_or_else(|| {
            RegistrationError::Network(format!("blockchain {} not found", blockchain_id))
        })
    }
}

#[async_trait]
impl PChainWallet for InMemoryPChain {
    fn p_chain_address(&self) -> String {
        self.address.clone()
    }

    async fn balance(&self) -> Result<u64, RegistrationError> {
        Ok(self.state.lock().balance)
    }

    async fn register_l1_validator(
        &self,
        request: &RegisterL1ValidatorRequest,
    ) -> Result<TxId, RegistrationError> {
        use sha2::{Digest, Sha256};

        let mut state = self.state.lock();
        if state.balance < request.balance {
            return Err(RegistrationError::InsufficientPChainBalance {
                available: state.balance,
                required: request.balance,
            });
        }

        let mut hasher = Sha256::new();
        hasher.update(request.signed_message.as_bytes());
        hasher.update((state.registrations.len() as u64).to_be_bytes());
        let mut id = [0u8; 32];
        id.copy_from_slice(&hasher.finalize());
        let tx_id = TxId::new(id);

        let dropped = state.drop_next.take();
        if dropped.is_none() {
            state.balance -= request.balance;
            if let Some(validation_id) = carried_validation_id(&request.signed_message) {
                state.registered.insert(validation_id);
            }
        }
        let polls_until_commit = state.processing_polls;
        state.txs.insert(
            tx_id,
            PendingTx {
                polls_until_commit,
                dropped,
            },
        );
        state.registrations.push(request.clone());

        debug!("[registrar] In-memory P-Chain accepted {}", tx_id);
        Ok(tx_id)
    }
}
