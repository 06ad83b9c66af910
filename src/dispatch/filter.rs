//! Event predicate and observation loop.

use std::sync::Arc;

use ethers::utils::hex;
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info};

use super::Dispatcher;
use crate::models::EventRecord;

/// Counters returned when the observation loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub seen: u64,
    pub matched: u64,
}

/// Matches records whose subject address starts with a fixed hex prefix.
/// The prefix may be written with or without `0x`.
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Lowercase hex digits, no `0x`.
    digits: String,
}

impl EventFilter {
    pub fn new(prefix: impl AsRef<str>) -> Self {
        let prefix = prefix.as_ref().trim().to_lowercase();
        let digits = prefix.strip_prefix("0x").unwrap_or(&prefix).to_string();
        Self { digits }
    }

    pub fn matches(&self, record: &EventRecord) -> bool {
        hex::encode(record.subject_id.as_bytes()).starts_with(&self.digits)
    }

    /// Observe `feed` until it ends or `shutdown` flips, spawning one detached
    /// dispatch per matching record. Never waits on a dispatch.
    pub async fn run<S>(
        &self,
        feed: S,
        dispatcher: Arc<Dispatcher>,
        mut shutdown: watch::Receiver<bool>,
    ) -> FilterStats
    where
        S: Stream<Item = EventRecord>,
    {
        futures::pin_mut!(feed);
        let mut stats = FilterStats::default();
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(
                            seen = stats.seen,
                            matched = stats.matched,
                            "[FILTER] shutdown, no longer accepting events"
                        );
                        break;
                    }
                }
                next = feed.next() => {
                    let Some(record) = next else {
                        info!(seen = stats.seen, matched = stats.matched, "[FILTER] feed ended");
                        break;
                    };
                    stats.seen += 1;
                    if self.matches(&record) {
                        stats.matched += 1;
                        dispatcher.spawn(record);
                    } else {
                        debug!(token = ?record.subject_id, "[FILTER] prefix mismatch, dropped");
                    }
                }
            }
        }
        stats
    }
}
