//! Dispatch pipeline: event filtering, nonce sequencing, transaction building,
//! simulation and the multi-endpoint broadcast race.
//!
//! The ledger itself sits behind the traits below so the pipeline can run
//! against `ethers` providers in production and in-memory mocks in tests.

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};

use crate::errors::{Result, SignError, SubmitError};
use crate::models::{Endpoint, UnsignedTransaction};

pub mod broadcast;
pub mod builder;
pub mod filter;
pub mod nonce;
pub mod orchestrator;
pub mod simulate;

#[cfg(test)]
pub(crate) mod testing;

pub use broadcast::{BroadcastSuccess, Broadcaster};
pub use builder::{CalldataEncoder, SwapExactEthEncoder, SwapParams, TransactionBuilder};
pub use filter::{EventFilter, FilterStats};
pub use nonce::{NonceSequencer, spawn_nonce_refresher};
pub use orchestrator::Dispatcher;
pub use simulate::{SimulationReport, Simulator};

/// Read-only access to the reference endpoint.
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Live gas price estimate in wei.
    async fn gas_price(&self) -> Result<U256>;

    /// Non-committing execution of `tx`, returning the raw return data.
    async fn call(&self, tx: &UnsignedTransaction, from: Address) -> Result<Bytes>;

    /// Pending transaction count for `account`, i.e. the next nonce the ledger expects.
    async fn transaction_count(&self, account: Address) -> Result<u64>;
}

/// One lane of the broadcast race.
#[async_trait]
pub trait Submitter: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    async fn submit(&self, raw: Bytes) -> std::result::Result<H256, SubmitError>;
}

/// Produces serialized signed transactions.
#[async_trait]
pub trait TxSigner: Send + Sync {
    fn address(&self) -> Address;

    async fn sign(&self, tx: &UnsignedTransaction) -> std::result::Result<Bytes, SignError>;
}
