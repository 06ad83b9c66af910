//! Multi-endpoint broadcast race.
//!
//! Every endpoint receives the same signed payload concurrently. The first
//! acceptance wins; the remaining lanes keep running in detached tasks and
//! only feed telemetry. One acceptance is enough because nodes gossip accepted
//! transactions, and duplicate acceptance is harmless since every lane carries
//! the same hash.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Bytes, H256};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::Submitter;
use crate::errors::{AggregateBroadcastFailure, EndpointFailure, FailureCause};
use crate::models::{BroadcastOutcome, OutcomeKind, RaceTelemetry};

/// The winning lane of a race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastSuccess {
    pub endpoint_id: usize,
    pub hash: H256,
    pub latency_ms: u64,
}

struct Lane {
    outcome: BroadcastOutcome,
    result: Result<H256, FailureCause>,
}

#[derive(Clone)]
pub struct Broadcaster {
    pool: Arc<Vec<Arc<dyn Submitter>>>,
    timeout: Duration,
    telemetry: Option<mpsc::UnboundedSender<RaceTelemetry>>,
}

impl Broadcaster {
    pub fn new(pool: Vec<Arc<dyn Submitter>>, timeout: Duration) -> Self {
        Self {
            pool: Arc::new(pool),
            timeout,
            telemetry: None,
        }
    }

    /// Forward the full per-endpoint record of every race to `sink` once all
    /// lanes have finished.
    pub fn with_telemetry(mut self, sink: mpsc::UnboundedSender<RaceTelemetry>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    /// Per-endpoint submission bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Race `raw` across the pool. Resolves on the first acceptance, or with
    /// one cause per endpoint once every lane has failed.
    pub async fn broadcast(
        &self,
        raw: Bytes,
    ) -> Result<BroadcastSuccess, AggregateBroadcastFailure> {
        let started = Instant::now();
        let (lane_tx, mut lane_rx) = mpsc::unbounded_channel::<Lane>();

        for submitter in self.pool.iter() {
            let submitter = submitter.clone();
            let raw = raw.clone();
            let lane_tx = lane_tx.clone();
            let timeout = self.timeout;
            tokio::spawn(async move {
                let lane = run_lane(submitter.as_ref(), raw, timeout, started).await;
                // receiver may already be gone if the process is shutting down
                let _ = lane_tx.send(lane);
            });
        }
        drop(lane_tx);

        let mut telemetry = RaceTelemetry::default();
        let mut causes = Vec::with_capacity(self.pool.len());

        while let Some(lane) = lane_rx.recv().await {
            let endpoint_id = lane.outcome.endpoint_id;
            let latency_ms = lane.outcome.latency_ms;
            telemetry.record(lane.outcome);
            match lane.result {
                Ok(hash) => {
                    info!(
                        endpoint = endpoint_id,
                        ?hash,
                        latency_ms,
                        failed_before = causes.len(),
                        "[BROADCAST] accepted, race won"
                    );
                    self.drain_in_background(lane_rx, telemetry);
                    return Ok(BroadcastSuccess {
                        endpoint_id,
                        hash,
                        latency_ms,
                    });
                }
                Err(cause) => {
                    debug!(endpoint = endpoint_id, %cause, latency_ms, "[BROADCAST] lane failed");
                    causes.push(EndpointFailure { endpoint_id, cause });
                }
            }
        }

        let failure = AggregateBroadcastFailure { causes };
        warn!(error = %failure, "[BROADCAST] every endpoint failed");
        self.emit(telemetry);
        Err(failure)
    }

    /// Let stragglers finish without holding up the caller.
    fn drain_in_background(
        &self,
        mut lane_rx: mpsc::UnboundedReceiver<Lane>,
        mut telemetry: RaceTelemetry,
    ) {
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(lane) = lane_rx.recv().await {
                telemetry.record(lane.outcome);
            }
            this.emit(telemetry);
        });
    }

    fn emit(&self, telemetry: RaceTelemetry) {
        match serde_json::to_string(&telemetry.outcomes) {
            Ok(outcomes) => info!(
                accepted = telemetry.accepted,
                rejected = telemetry.rejected,
                transport = telemetry.transport,
                timed_out = telemetry.timed_out,
                %outcomes,
                "[BROADCAST] race settled"
            ),
            Err(e) => warn!(error = %e, "[BROADCAST] telemetry serialization failed"),
        }
        if let Some(sink) = &self.telemetry {
            let _ = sink.send(telemetry);
        }
    }
}

async fn run_lane(
    submitter: &dyn Submitter,
    raw: Bytes,
    timeout: Duration,
    started: Instant,
) -> Lane {
    let endpoint_id = submitter.endpoint().id;
    let result = match tokio::time::timeout(timeout, submitter.submit(raw)).await {
        Ok(Ok(hash)) => Ok(hash),
        Ok(Err(e)) => Err(FailureCause::from(e)),
        Err(_) => Err(FailureCause::Timeout {
            after_ms: timeout.as_millis() as u64,
        }),
    };
    let latency_ms = started.elapsed().as_millis() as u64;
    let outcome = match &result {
        Ok(hash) => BroadcastOutcome {
            endpoint_id,
            kind: OutcomeKind::Accepted,
            hash: Some(*hash),
            error: None,
            latency_ms,
        },
        Err(cause) => BroadcastOutcome {
            endpoint_id,
            kind: match cause {
                FailureCause::Transport(_) => OutcomeKind::Transport,
                FailureCause::Rejected(_) => OutcomeKind::Rejected,
                FailureCause::Timeout { .. } => OutcomeKind::TimedOut,
            },
            hash: None,
            error: Some(cause.to_string()),
            latency_ms,
        },
    };
    Lane { outcome, result }
}
