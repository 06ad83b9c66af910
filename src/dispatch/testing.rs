//! In-memory collaborators for pipeline tests.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::{Token, encode};
use ethers::types::{Address, Bytes, H256, U256};
use url::Url;

use super::{LedgerQuery, Submitter, TransactionBuilder, TxSigner};
use crate::errors::{AppError, Result, SignError, SubmitError};
use crate::models::{Endpoint, EventRecord, UnsignedTransaction};

pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn test_builder() -> TransactionBuilder {
    TransactionBuilder::new(
        addr(0x10),
        addr(0xbb),
        addr(0xee),
        U256::exp10(16),
        U256::from(500_000u64),
        U256::from(3_000_000_000u64),
        56,
        Duration::from_secs(1_200),
    )
}

pub fn endpoint(id: usize) -> Endpoint {
    Endpoint::new(
        id,
        Url::parse(&format!("https://node-{id}.example")).expect("static url"),
    )
}

pub fn record(subject: Address) -> EventRecord {
    EventRecord {
        creator: addr(0xcc),
        subject_id: subject,
        request_id: U256::from(1u64),
        name: "Test".into(),
        symbol: "TST".into(),
        total_supply: U256::exp10(27),
        launch_time: U256::from(1_700_000_000u64),
        launch_fee: U256::zero(),
        block_number: 1,
    }
}

/// `amounts` return value of a router swap.
pub fn amounts_return(amounts: &[u64]) -> Bytes {
    encode(&[Token::Array(
        amounts.iter().map(|a| Token::Uint(U256::from(*a))).collect(),
    )])
    .into()
}

#[derive(Debug, Clone)]
pub enum CallBehaviour {
    Return(Bytes),
    Revert(String),
    Hang,
}

#[derive(Debug)]
pub struct MockLedger {
    nonce: Option<u64>,
    gas_price: Option<U256>,
    call: CallBehaviour,
    pub calls: AtomicUsize,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self {
            nonce: Some(0),
            gas_price: Some(U256::from(5_000_000_000u64)),
            call: CallBehaviour::Return(amounts_return(&[10_000, 123_456])),
            calls: AtomicUsize::new(0),
        }
    }
}

impl MockLedger {
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn failing_nonce(mut self) -> Self {
        self.nonce = None;
        self
    }

    pub fn failing_gas_price(mut self) -> Self {
        self.gas_price = None;
        self
    }

    pub fn with_call(mut self, call: CallBehaviour) -> Self {
        self.call = call;
        self
    }
}

#[async_trait]
impl LedgerQuery for MockLedger {
    async fn gas_price(&self) -> Result<U256> {
        self.gas_price
            .ok_or_else(|| AppError::Other("gas oracle down".into()))
    }

    async fn call(&self, _tx: &UnsignedTransaction, _from: Address) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.call {
            CallBehaviour::Return(bytes) => Ok(bytes.clone()),
            CallBehaviour::Revert(reason) => Err(AppError::Other(reason.clone())),
            CallBehaviour::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn transaction_count(&self, _account: Address) -> Result<u64> {
        self.nonce
            .ok_or_else(|| AppError::Other("node unreachable".into()))
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Accept(H256),
    Reject(String),
    Transport(String),
    Never,
}

/// Submitter that answers after a fixed delay.
#[derive(Debug)]
pub struct MockSubmitter {
    endpoint: Endpoint,
    delay: Duration,
    reply: Reply,
    pub submissions: Arc<AtomicUsize>,
}

impl MockSubmitter {
    pub fn new(id: usize, delay_ms: u64, reply: Reply) -> Self {
        Self {
            endpoint: endpoint(id),
            delay: Duration::from_millis(delay_ms),
            reply,
            submissions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn counted(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.submissions = counter;
        self
    }
}

#[async_trait]
impl Submitter for MockSubmitter {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn submit(&self, _raw: Bytes) -> std::result::Result<H256, SubmitError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match &self.reply {
            Reply::Accept(hash) => Ok(*hash),
            Reply::Reject(msg) => Err(SubmitError::Rejected(msg.clone())),
            Reply::Transport(msg) => Err(SubmitError::Transport(msg.clone())),
            Reply::Never => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// Signer that encodes the nonce into the payload so tests can see which
/// value each dispatch used.
#[derive(Debug, Default)]
pub struct MockSigner {
    pub fail: bool,
    pub signed: Mutex<Vec<UnsignedTransaction>>,
}

impl MockSigner {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn nonces(&self) -> Vec<u64> {
        let mut nonces: Vec<u64> = self
            .signed
            .lock()
            .expect("signer lock")
            .iter()
            .map(|tx| tx.nonce)
            .collect();
        nonces.sort_unstable();
        nonces
    }
}

#[async_trait]
impl TxSigner for MockSigner {
    fn address(&self) -> Address {
        addr(0xee)
    }

    async fn sign(&self, tx: &UnsignedTransaction) -> std::result::Result<Bytes, SignError> {
        if self.fail {
            return Err(SignError("key unavailable".into()));
        }
        self.signed.lock().expect("signer lock").push(tx.clone());
        Ok(Bytes::from(tx.nonce.to_be_bytes().to_vec()))
    }
}
