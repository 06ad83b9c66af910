//! Ledger collaborators backed by `ethers` providers.

pub mod client;
pub mod feed;

pub use client::{RpcLedger, RpcSubmitter, WalletSigner};
pub use feed::spawn_event_feed;
