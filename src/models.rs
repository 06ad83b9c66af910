//! Shared data structures used throughout the application.

use ethers::types::{Address, Bytes, H256, TransactionRequest, U256};
use serde::Serialize;
use url::Url;

use crate::errors::DispatchError;

/// A network target that accepts signed transactions for propagation.
///
/// `id` is the 1-based position in the configured pool and only exists for
/// logging and telemetry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub id: usize,
    pub address: Url,
}

impl Endpoint {
    pub fn new(id: usize, address: Url) -> Self {
        Self { id, address }
    }
}

/// Decoded `TokenCreate` log as delivered by the ledger feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub creator: Address,
    pub subject_id: Address,
    pub request_id: U256,
    pub name: String,
    pub symbol: String,
    pub total_supply: U256,
    pub launch_time: U256,
    pub launch_fee: U256,
    pub block_number: u64,
}

/// Legacy (gas price) transaction ready for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub target: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: U256,
    pub gas_price: U256,
    pub nonce: u64,
    pub chain_id: u64,
}

impl UnsignedTransaction {
    /// Convert into the `ethers` request shape used by signers and `eth_call`.
    pub fn to_request(&self, from: Option<Address>) -> TransactionRequest {
        let mut req = TransactionRequest::new()
            .to(self.target)
            .data(self.data.clone())
            .value(self.value)
            .gas(self.gas_limit)
            .gas_price(self.gas_price)
            .nonce(self.nonce)
            .chain_id(self.chain_id);
        if let Some(from) = from {
            req = req.from(from);
        }
        req
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Accepted,
    Rejected,
    Transport,
    TimedOut,
}

/// Result of submitting one signed payload to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastOutcome {
    pub endpoint_id: usize,
    pub kind: OutcomeKind,
    pub hash: Option<H256>,
    pub error: Option<String>,
    pub latency_ms: u64,
}

/// Full per-endpoint record of one broadcast attempt, emitted once every lane
/// has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RaceTelemetry {
    pub accepted: usize,
    pub rejected: usize,
    pub transport: usize,
    pub timed_out: usize,
    pub outcomes: Vec<BroadcastOutcome>,
}

impl RaceTelemetry {
    pub fn record(&mut self, outcome: BroadcastOutcome) {
        match outcome.kind {
            OutcomeKind::Accepted => self.accepted += 1,
            OutcomeKind::Rejected => self.rejected += 1,
            OutcomeKind::Transport => self.transport += 1,
            OutcomeKind::TimedOut => self.timed_out += 1,
        }
        self.outcomes.push(outcome);
    }
}

/// Externally observable outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub succeeded: bool,
    pub hash: Option<H256>,
    pub error: Option<DispatchError>,
}

impl DispatchResult {
    pub fn success(hash: H256) -> Self {
        Self {
            succeeded: true,
            hash: Some(hash),
            error: None,
        }
    }

    pub fn failure(error: DispatchError) -> Self {
        Self {
            succeeded: false,
            hash: None,
            error: Some(error),
        }
    }
}
