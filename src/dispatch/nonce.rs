//! Process-wide account sequence counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ethers::types::Address;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::LedgerQuery;
use crate::utils::unix_now_millis;

/// Next unused nonce for one account, shared by every dispatch instance.
#[derive(Debug)]
pub struct NonceSequencer {
    value: AtomicU64,
    /// Highest count ever reported by the ledger.
    observed: AtomicU64,
    /// Unix millis of the last successful refresh, 0 if never refreshed.
    last_refreshed_at: AtomicU64,
}

impl NonceSequencer {
    pub fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
            observed: AtomicU64::new(0),
            last_refreshed_at: AtomicU64::new(0),
        }
    }

    /// Reserve and return the next nonce in a single atomic step.
    pub fn current(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst)
    }

    /// Next value `current()` would hand out, without reserving it.
    pub fn peek(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn last_refreshed_at(&self) -> Option<u64> {
        match self.last_refreshed_at.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    /// Adopt `external` if it is ahead of the local value. Never moves backwards,
    /// so values already reserved by in-flight dispatches are never reissued.
    ///
    /// Returns the previous local value when the external count was ahead.
    pub fn refresh(&self, external: u64) -> Option<u64> {
        self.last_refreshed_at.store(unix_now_millis(), Ordering::Relaxed);
        self.observed.fetch_max(external, Ordering::SeqCst);
        let previous = self.value.fetch_max(external, Ordering::SeqCst);
        (external > previous).then_some(previous)
    }

    /// Hand back `nonce` if it is still the most recent reservation.
    ///
    /// Used when a dispatch fails after reserving but before anything was
    /// submitted. Returns false if another reservation already followed it, or
    /// if the ledger has reported the nonce as consumed.
    pub fn release(&self, nonce: u64) -> bool {
        let Some(next) = nonce.checked_add(1) else {
            return false;
        };
        if nonce < self.observed.load(Ordering::SeqCst) {
            return false;
        }
        if self
            .value
            .compare_exchange(next, nonce, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        // a refresh may have landed between the check and the exchange
        let observed = self.observed.load(Ordering::SeqCst);
        if observed > nonce {
            self.value.fetch_max(observed, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Pull the authoritative count from the ledger and reconcile. Failures are
    /// logged and the local value kept.
    pub async fn sync_from(&self, ledger: &dyn LedgerQuery, account: Address) {
        match ledger.transaction_count(account).await {
            Ok(external) => match self.refresh(external) {
                Some(previous) => warn!(
                    previous,
                    adopted = external,
                    "[NONCE] ledger ahead of local sequence, realigned"
                ),
                None => debug!(local = self.peek(), external, "[NONCE] refreshed, in sync"),
            },
            Err(e) => warn!(
                error = %e,
                local = self.peek(),
                "[NONCE] refresh failed, keeping local value"
            ),
        }
    }
}

/// Spawn the periodic refresher. It stops when `shutdown` flips to true or its
/// sender is dropped.
pub fn spawn_nonce_refresher(
    sequencer: Arc<NonceSequencer>,
    ledger: Arc<dyn LedgerQuery>,
    account: Address,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // first tick completes immediately; startup sync already happened
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    sequencer.sync_from(ledger.as_ref(), account).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("[NONCE] refresher stopped");
                        break;
                    }
                }
            }
        }
    })
}
