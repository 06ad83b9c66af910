//! Advisory dry-run of a built transaction against the reference endpoint.

use std::sync::Arc;
use std::time::Duration;

use ethers::abi::{ParamType, Token, decode};
use ethers::types::{Address, U256};
use tracing::{info, warn};

use super::LedgerQuery;
use crate::models::UnsignedTransaction;

/// What a successful simulation told us about the swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    /// Last element of the router's `amounts` return, if decodable.
    pub estimated_out: Option<U256>,
}

/// Best-effort `eth_call` with a short timeout. Never fails a dispatch.
#[derive(Clone)]
pub struct Simulator {
    ledger: Arc<dyn LedgerQuery>,
    timeout: Duration,
}

impl Simulator {
    pub fn new(ledger: Arc<dyn LedgerQuery>, timeout: Duration) -> Self {
        Self { ledger, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `None` means "no simulation data": revert, transport error or timeout.
    pub async fn simulate(
        &self,
        tx: &UnsignedTransaction,
        from: Address,
    ) -> Option<SimulationReport> {
        match tokio::time::timeout(self.timeout, self.ledger.call(tx, from)).await {
            Ok(Ok(ret)) => {
                let report = SimulationReport {
                    estimated_out: decode_amounts_out(&ret),
                };
                info!(
                    nonce = tx.nonce,
                    estimated_out = ?report.estimated_out,
                    "[SIM] simulation ok"
                );
                Some(report)
            }
            Ok(Err(e)) => {
                warn!(nonce = tx.nonce, error = %e, "[SIM] simulation failed, sending anyway");
                None
            }
            Err(_) => {
                warn!(
                    nonce = tx.nonce,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "[SIM] simulation timed out, sending anyway"
                );
                None
            }
        }
    }
}

fn decode_amounts_out(ret: &[u8]) -> Option<U256> {
    let tokens = decode(&[ParamType::Array(Box::new(ParamType::Uint(256)))], ret).ok()?;
    match tokens.into_iter().next()? {
        Token::Array(amounts) => amounts.into_iter().last()?.into_uint(),
        _ => None,
    }
}
