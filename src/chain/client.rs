use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider, ProviderError, RpcError},
    signers::{LocalWallet, Signer},
    types::{Address, BlockNumber, Bytes, H256, U256, transaction::eip2718::TypedTransaction},
};
use url::Url;

use crate::dispatch::{LedgerQuery, Submitter, TxSigner};
use crate::errors::{AppError, Result, SignError, SubmitError};
use crate::models::{Endpoint, UnsignedTransaction};

/// Read-only handle on the reference node.
#[derive(Clone, Debug)]
pub struct RpcLedger {
    provider: Provider<Http>,
}

impl RpcLedger {
    pub fn new(rpc_url: &Url) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url.as_str())?;
        Ok(Self { provider })
    }
}

#[async_trait]
impl LedgerQuery for RpcLedger {
    async fn gas_price(&self) -> Result<U256> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn call(&self, tx: &UnsignedTransaction, from: Address) -> Result<Bytes> {
        let typed: TypedTransaction = tx.to_request(Some(from)).into();
        Ok(self.provider.call(&typed, None).await?)
    }

    async fn transaction_count(&self, account: Address) -> Result<u64> {
        let count = self
            .provider
            .get_transaction_count(account, Some(BlockNumber::Pending.into()))
            .await?;
        if count > U256::from(u64::MAX) {
            return Err(AppError::Other(format!("transaction count {count} exceeds u64")));
        }
        Ok(count.as_u64())
    }
}

/// Submission lane bound to one endpoint of the pool.
#[derive(Clone, Debug)]
pub struct RpcSubmitter {
    endpoint: Endpoint,
    provider: Provider<Http>,
}

impl RpcSubmitter {
    pub fn new(endpoint: Endpoint) -> Result<Self> {
        let provider = Provider::<Http>::try_from(endpoint.address.as_str())?;
        Ok(Self { endpoint, provider })
    }

    pub fn pool(endpoints: &[Endpoint]) -> Result<Vec<Self>> {
        endpoints.iter().cloned().map(Self::new).collect()
    }
}

#[async_trait]
impl Submitter for RpcSubmitter {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn submit(&self, raw: Bytes) -> std::result::Result<H256, SubmitError> {
        match self.provider.send_raw_transaction(raw).await {
            Ok(pending) => Ok(pending.tx_hash()),
            Err(e) => Err(classify(e)),
        }
    }
}

/// A JSON-RPC error object means the node answered and refused the
/// transaction; anything else never got a verdict.
fn classify(err: ProviderError) -> SubmitError {
    match err.as_error_response() {
        Some(rpc) => SubmitError::Rejected(rpc.message.clone()),
        None => SubmitError::Transport(err.to_string()),
    }
}

/// Local private-key signer producing legacy RLP-encoded transactions.
#[derive(Clone, Debug)]
pub struct WalletSigner {
    wallet: LocalWallet,
}

impl WalletSigner {
    pub fn new(private_key: &str, chain_id: u64) -> Result<Self> {
        let wallet: LocalWallet = private_key.trim().trim_start_matches("0x").parse()?;
        Ok(Self {
            wallet: wallet.with_chain_id(chain_id),
        })
    }
}

#[async_trait]
impl TxSigner for WalletSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign(&self, tx: &UnsignedTransaction) -> std::result::Result<Bytes, SignError> {
        let typed: TypedTransaction = tx.to_request(Some(self.wallet.address())).into();
        let signature = self
            .wallet
            .sign_transaction(&typed)
            .await
            .map_err(|e| SignError(e.to_string()))?;
        Ok(typed.rlp_signed(&signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::{addr, test_builder};
    use ethers::utils::rlp::Rlp;

    // well-known test key, never funded
    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[tokio::test]
    async fn signed_payload_recovers_to_wallet_address() {
        let signer = WalletSigner::new(KEY, 56).unwrap();
        let builder = test_builder();
        let tx = builder.finish(builder.prepare_at(addr(0x44), None, 0).unwrap(), 3);

        let raw = signer.sign(&tx).await.unwrap();
        let (decoded, signature) = TypedTransaction::decode_signed(&Rlp::new(&raw)).unwrap();
        assert_eq!(decoded.nonce(), Some(&U256::from(3u64)));
        assert_eq!(decoded.to_addr(), Some(&builder.router));
        assert_eq!(signature.recover(decoded.sighash()).unwrap(), signer.address());
    }

    #[test]
    fn private_key_with_or_without_prefix_parses() {
        let a = WalletSigner::new(KEY, 56).unwrap();
        let b = WalletSigner::new(KEY.trim_start_matches("0x"), 56).unwrap();
        assert_eq!(a.address(), b.address());
        assert!(WalletSigner::new("0xdeadbeef", 56).is_err());
    }

    #[test]
    fn submitter_keeps_endpoint_identity() {
        let endpoints = vec![
            Endpoint::new(1, Url::parse("https://a.example").unwrap()),
            Endpoint::new(2, Url::parse("https://b.example").unwrap()),
        ];
        let pool = RpcSubmitter::pool(&endpoints).unwrap();
        assert_eq!(pool[1].endpoint().id, 2);
    }
}
