use std::sync::Arc;

use anyhow::Result;
use launch_sniper::{
    chain::{RpcLedger, RpcSubmitter, WalletSigner, spawn_event_feed},
    config::SniperConfig,
    dispatch::{
        Broadcaster, Dispatcher, EventFilter, LedgerQuery, NonceSequencer, Simulator, Submitter,
        TransactionBuilder, TxSigner, spawn_nonce_refresher,
    },
    utils,
};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::init_logging();

    let cfg = SniperConfig::load()?;
    tracing::info!(
        endpoints = cfg.endpoints.len(),
        prefix = %cfg.token_prefix,
        buy_amount_wei = %cfg.buy_amount_wei,
        chain_id = cfg.chain_id,
        simulate = cfg.simulate,
        "[INIT] launch-sniper starting"
    );

    let ledger: Arc<dyn LedgerQuery> = Arc::new(RpcLedger::new(&cfg.rpc_url)?);
    let signer: Arc<dyn TxSigner> = Arc::new(WalletSigner::new(&cfg.private_key, cfg.chain_id)?);
    let account = signer.address();

    // Seed the sequencer from the ledger before any event can trigger
    let initial_nonce = ledger.transaction_count(account).await?;
    let sequencer = Arc::new(NonceSequencer::new(initial_nonce));
    tracing::info!(?account, initial_nonce, "[INIT] nonce sequencer seeded");

    let pool: Vec<Arc<dyn Submitter>> = RpcSubmitter::pool(&cfg.endpoints)?
        .into_iter()
        .map(|s| Arc::new(s) as Arc<dyn Submitter>)
        .collect();
    let broadcaster = Broadcaster::new(pool, cfg.submit_timeout);

    let builder = TransactionBuilder::new(
        cfg.router,
        cfg.wrapped_native,
        account,
        cfg.buy_amount_wei,
        cfg.gas_limit,
        cfg.gas_price_floor,
        cfg.chain_id,
        cfg.deadline,
    );

    let mut dispatcher = Dispatcher::new(
        sequencer.clone(),
        builder,
        ledger.clone(),
        signer,
        broadcaster,
    );
    if cfg.simulate {
        let simulator = Simulator::new(ledger.clone(), cfg.simulation_timeout);
        dispatcher = dispatcher.with_simulator(simulator);
    }
    let dispatcher = Arc::new(dispatcher);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let refresher = spawn_nonce_refresher(
        sequencer,
        ledger,
        account,
        cfg.nonce_refresh_interval,
        shutdown_rx.clone(),
    );
    tracing::info!(
        interval_secs = cfg.nonce_refresh_interval.as_secs(),
        "[INIT] nonce refresher started"
    );

    let feed = spawn_event_feed(cfg.ws_url.clone(), cfg.token_manager, shutdown_rx.clone());

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "[INIT] failed to listen for ctrl-c");
            return;
        }
        tracing::info!("[SHUTDOWN] signal received, stopping intake");
        let _ = shutdown_tx.send(true);
    });

    let drain = dispatcher.drain_budget();
    let filter = EventFilter::new(&cfg.token_prefix);
    let stats = filter.run(feed, dispatcher, shutdown_rx).await;
    tracing::info!(
        seen = stats.seen,
        matched = stats.matched,
        drain_ms = drain.as_millis() as u64,
        "[SHUTDOWN] observation stopped, draining in-flight dispatches"
    );

    refresher.abort();
    tokio::time::sleep(drain).await;
    Ok(())
}
