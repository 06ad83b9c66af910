//! One pipeline run per qualifying event:
//! `Triggered -> Built -> Simulated -> Signed -> Broadcasting -> Succeeded | Failed`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{Broadcaster, LedgerQuery, NonceSequencer, Simulator, TransactionBuilder, TxSigner};
use crate::errors::DispatchError;
use crate::models::{DispatchResult, EventRecord};

/// Upper bound on the live fee lookup before falling back to the floor.
const FEE_QUERY_TIMEOUT: Duration = Duration::from_millis(750);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Triggered,
    Built,
    Simulated,
    Signed,
    Broadcasting,
    Succeeded,
    Failed,
}

/// Owns the collaborators of the buy pipeline. Cheap to share behind an `Arc`;
/// every dispatch instance borrows it immutably and only the sequencer is
/// mutated, atomically.
pub struct Dispatcher {
    sequencer: Arc<NonceSequencer>,
    builder: TransactionBuilder,
    ledger: Arc<dyn LedgerQuery>,
    simulator: Option<Simulator>,
    signer: Arc<dyn TxSigner>,
    broadcaster: Broadcaster,
}

impl Dispatcher {
    pub fn new(
        sequencer: Arc<NonceSequencer>,
        builder: TransactionBuilder,
        ledger: Arc<dyn LedgerQuery>,
        signer: Arc<dyn TxSigner>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            sequencer,
            builder,
            ledger,
            simulator: None,
            signer,
            broadcaster,
        }
    }

    pub fn with_simulator(mut self, simulator: Simulator) -> Self {
        self.simulator = Some(simulator);
        self
    }

    pub fn sequencer(&self) -> &Arc<NonceSequencer> {
        &self.sequencer
    }

    /// Longest a dispatch can stay in flight: fee lookup, simulation and one
    /// broadcast race, each under its own timeout.
    pub fn drain_budget(&self) -> Duration {
        let simulation = self.simulator.as_ref().map_or(Duration::ZERO, Simulator::timeout);
        FEE_QUERY_TIMEOUT + simulation + self.broadcaster.timeout()
    }

    /// Run the pipeline in its own task so the caller never waits on it.
    pub fn spawn(self: &Arc<Self>, record: EventRecord) -> tokio::task::JoinHandle<DispatchResult> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.dispatch(record).await })
    }

    /// Run the pipeline to completion. Never panics or propagates: the outcome
    /// is reported in the returned `DispatchResult`.
    pub async fn dispatch(&self, record: EventRecord) -> DispatchResult {
        let token = record.subject_id;
        info!(
            ?token,
            name = %record.name,
            symbol = %record.symbol,
            block = record.block_number,
            "[DISPATCH] triggered"
        );
        stage(DispatchStage::Triggered, &record);

        let fee_query = tokio::time::timeout(FEE_QUERY_TIMEOUT, self.ledger.gas_price());
        let gas_estimate = match fee_query.await {
            Ok(Ok(gp)) => Some(gp),
            Ok(Err(e)) => {
                warn!(error = %e, "[DISPATCH] gas price estimate failed, using floor");
                None
            }
            Err(_) => {
                warn!("[DISPATCH] gas price estimate timed out, using floor");
                None
            }
        };

        let prepared = match self.builder.prepare(token, gas_estimate) {
            Ok(p) => p,
            Err(e) => return self.failed(&record, DispatchError::Build(e)),
        };

        // reservation happens exactly once, right before the nonce is bound
        let nonce = self.sequencer.current();
        let tx = self.builder.finish(prepared, nonce);
        debug!(nonce, gas_price = %tx.gas_price, "[DISPATCH] built");
        stage(DispatchStage::Built, &record);

        if let Some(simulator) = &self.simulator {
            simulator.simulate(&tx, self.signer.address()).await;
            stage(DispatchStage::Simulated, &record);
        }

        let raw = match self.signer.sign(&tx).await {
            Ok(raw) => raw,
            Err(e) => {
                let released = self.sequencer.release(nonce);
                warn!(nonce, released, "[DISPATCH] signing failed before submission");
                return self.failed(&record, DispatchError::Sign(e));
            }
        };
        stage(DispatchStage::Signed, &record);

        stage(DispatchStage::Broadcasting, &record);
        match self.broadcaster.broadcast(raw).await {
            Ok(won) => {
                info!(
                    ?token,
                    nonce,
                    hash = ?won.hash,
                    endpoint = won.endpoint_id,
                    latency_ms = won.latency_ms,
                    "[DISPATCH] succeeded"
                );
                stage(DispatchStage::Succeeded, &record);
                DispatchResult::success(won.hash)
            }
            Err(source) => self.failed(&record, DispatchError::Broadcast { nonce, source }),
        }
    }

    fn failed(&self, record: &EventRecord, err: DispatchError) -> DispatchResult {
        error!(token = ?record.subject_id, error = %err, "[DISPATCH] failed");
        stage(DispatchStage::Failed, record);
        DispatchResult::failure(err)
    }
}

fn stage(stage: DispatchStage, record: &EventRecord) {
    debug!(?stage, token = ?record.subject_id, "[DISPATCH] stage");
}
