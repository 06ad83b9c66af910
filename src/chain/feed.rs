//! `TokenCreate` log subscription over WebSocket.

use std::sync::Arc;
use std::time::Duration;

use ethers::{
    contract::{LogMeta, abigen},
    providers::{Provider, Ws},
    types::Address,
};
use futures::StreamExt;
use futures::channel::mpsc;
use tokio::sync::watch;
use tracing::{info, warn};
use url::Url;

use crate::errors::{AppError, Result};
use crate::models::EventRecord;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

abigen!(
    TokenManager,
    r"[
        event TokenCreate(address creator, address token, uint256 requestId, string name, string symbol, uint256 totalSupply, uint256 launchTime, uint256 launchFee)
    ]",
);

impl From<(TokenCreateFilter, LogMeta)> for EventRecord {
    fn from((ev, meta): (TokenCreateFilter, LogMeta)) -> Self {
        EventRecord {
            creator: ev.creator,
            subject_id: ev.token,
            request_id: ev.request_id,
            name: ev.name,
            symbol: ev.symbol,
            total_supply: ev.total_supply,
            launch_time: ev.launch_time,
            launch_fee: ev.launch_fee,
            block_number: meta.block_number.as_u64(),
        }
    }
}

/// Capped exponential reconnect delay.
#[derive(Debug)]
struct Backoff {
    current: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            current: INITIAL_BACKOFF,
        }
    }

    fn delay(&self) -> Duration {
        self.current
    }

    fn advance(&mut self) {
        self.current = (self.current * 2).min(MAX_BACKOFF);
    }

    fn reset(&mut self) {
        self.current = INITIAL_BACKOFF;
    }
}

enum SessionEnd {
    Shutdown,
    Disconnected,
}

/// Spawn a task that keeps a `TokenCreate` subscription alive, reconnecting
/// with capped exponential backoff, and forwards decoded records. The
/// returned stream ends once `shutdown` flips or the task gives up because
/// the receiver was dropped.
pub fn spawn_event_feed(
    ws_url: Url,
    contract: Address,
    mut shutdown: watch::Receiver<bool>,
) -> mpsc::UnboundedReceiver<EventRecord> {
    let (tx, rx) = mpsc::unbounded();
    tokio::spawn(async move {
        let mut backoff = Backoff::new();
        loop {
            if *shutdown.borrow() || tx.is_closed() {
                break;
            }
            match run_session(&ws_url, contract, &tx, &mut shutdown, &mut backoff).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Disconnected) => warn!("[FEED] subscription closed by remote"),
                Err(e) => warn!(error = %e, "[FEED] subscription error"),
            }
            let delay = backoff.delay();
            info!(backoff_ms = delay.as_millis() as u64, "[FEED] reconnecting");
            let stop = tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
            };
            if stop {
                break;
            }
            backoff.advance();
        }
        info!("[FEED] stopped");
    });
    rx
}

async fn run_session(
    ws_url: &Url,
    contract: Address,
    tx: &mpsc::UnboundedSender<EventRecord>,
    shutdown: &mut watch::Receiver<bool>,
    backoff: &mut Backoff,
) -> Result<SessionEnd> {
    let provider = Arc::new(Provider::<Ws>::connect(ws_url.as_str()).await?);
    let manager = TokenManager::new(contract, provider);
    let event = manager.token_create_filter();
    // dropping the stream unsubscribes on the node
    let stream = event
        .subscribe_with_meta()
        .await
        .map_err(|e| AppError::Contract(e.to_string()))?;
    futures::pin_mut!(stream);
    info!(?contract, "[FEED] subscribed to TokenCreate");
    backoff.reset();

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(SessionEnd::Shutdown);
                }
            }
            item = stream.next() => match item {
                Some(Ok(decoded)) => {
                    if tx.unbounded_send(EventRecord::from(decoded)).is_err() {
                        return Ok(SessionEnd::Shutdown);
                    }
                }
                Some(Err(e)) => warn!(error = %e, "[FEED] undecodable log skipped"),
                None => return Ok(SessionEnd::Disconnected),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{H256, U64, U256};

    #[test]
    fn decoded_log_maps_onto_event_record() {
        let ev = TokenCreateFilter {
            creator: Address::repeat_byte(0xcc),
            token: Address::repeat_byte(0x44),
            request_id: U256::from(9u64),
            name: "Launch".into(),
            symbol: "LCH".into(),
            total_supply: U256::exp10(27),
            launch_time: U256::from(1_700_000_000u64),
            launch_fee: U256::from(1u64),
        };
        let meta = LogMeta {
            address: Address::zero(),
            block_number: U64::from(42u64),
            block_hash: H256::zero(),
            transaction_hash: H256::zero(),
            transaction_index: U64::zero(),
            log_index: U256::zero(),
        };
        let record = EventRecord::from((ev, meta));
        assert_eq!(record.subject_id, Address::repeat_byte(0x44));
        assert_eq!(record.creator, Address::repeat_byte(0xcc));
        assert_eq!(record.request_id, U256::from(9u64));
        assert_eq!(record.symbol, "LCH");
        assert_eq!(record.block_number, 42);
    }

    #[test]
    fn backoff_doubles_up_to_the_cap_and_resets() {
        let mut backoff = Backoff::new();
        let mut delays = Vec::new();
        for _ in 0..7 {
            delays.push(backoff.delay().as_secs());
            backoff.advance();
        }
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
        backoff.reset();
        assert_eq!(backoff.delay(), INITIAL_BACKOFF);
    }

    #[tokio::test]
    async fn failing_connection_keeps_retrying_until_shutdown() {
        let (stop_tx, stop_rx) = watch::channel(false);
        // nothing listens on port 1, so every session fails to connect
        let mut feed = spawn_event_feed(
            Url::parse("ws://127.0.0.1:1").unwrap(),
            Address::zero(),
            stop_rx,
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!stop_tx.is_closed());
        stop_tx.send(true).unwrap();
        let ended = tokio::time::timeout(Duration::from_secs(5), feed.next()).await;
        assert_eq!(ended, Ok(None));
    }

    #[tokio::test]
    async fn feed_ends_when_shutdown_is_already_set() {
        let (_stop_tx, stop_rx) = watch::channel(true);
        let mut feed = spawn_event_feed(
            Url::parse("ws://127.0.0.1:1").unwrap(),
            Address::zero(),
            stop_rx,
        );
        assert_eq!(feed.next().await, None);
    }
}
