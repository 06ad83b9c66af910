//! Swap transaction construction.

use std::sync::Arc;
use std::time::Duration;

use ethers::abi::{Token, encode};
use ethers::types::{Address, Bytes, U256};

use crate::errors::BuildError;
use crate::models::UnsignedTransaction;
use crate::utils::unix_now;

/// `swapExactETHForTokens(uint256,address[],address,uint256)`
pub const SWAP_EXACT_ETH_FOR_TOKENS: [u8; 4] = [0x7f, 0xf3, 0x6a, 0xb5];

/// Parameters of a native-in swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapParams {
    pub amount_out_min: U256,
    pub path: Vec<Address>,
    pub recipient: Address,
    pub deadline: u64,
}

/// Encodes swap calldata for the router.
pub trait CalldataEncoder: Send + Sync {
    fn encode(&self, params: &SwapParams) -> Result<Bytes, BuildError>;
}

/// Uniswap-V2-style `swapExactETHForTokens` encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapExactEthEncoder;

impl CalldataEncoder for SwapExactEthEncoder {
    fn encode(&self, params: &SwapParams) -> Result<Bytes, BuildError> {
        if params.path.len() < 2 {
            return Err(BuildError::Encoding(format!(
                "swap path needs at least 2 hops, got {}",
                params.path.len()
            )));
        }
        let args = encode(&[
            Token::Uint(params.amount_out_min),
            Token::Array(params.path.iter().copied().map(Token::Address).collect()),
            Token::Address(params.recipient),
            Token::Uint(U256::from(params.deadline)),
        ]);
        let mut data = Vec::with_capacity(4 + args.len());
        data.extend_from_slice(&SWAP_EXACT_ETH_FOR_TOKENS);
        data.extend_from_slice(&args);
        Ok(data.into())
    }
}

/// Calldata and fee terms resolved before a nonce is reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCall {
    pub data: Bytes,
    pub gas_price: U256,
}

/// Builds buy transactions against a fixed router.
///
/// `amount_out_min` is always zero: execution speed is preferred over
/// slippage protection.
#[derive(Clone)]
pub struct TransactionBuilder {
    pub router: Address,
    pub wrapped_native: Address,
    pub recipient: Address,
    pub value: U256,
    pub gas_limit: U256,
    pub gas_price_floor: U256,
    pub chain_id: u64,
    pub deadline: Duration,
    encoder: Arc<dyn CalldataEncoder>,
}

impl TransactionBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: Address,
        wrapped_native: Address,
        recipient: Address,
        value: U256,
        gas_limit: U256,
        gas_price_floor: U256,
        chain_id: u64,
        deadline: Duration,
    ) -> Self {
        Self {
            router,
            wrapped_native,
            recipient,
            value,
            gas_limit,
            gas_price_floor,
            chain_id,
            deadline,
            encoder: Arc::new(SwapExactEthEncoder),
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn CalldataEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Live estimate raised to the floor; the floor alone when no estimate exists.
    pub fn effective_gas_price(&self, estimate: Option<U256>) -> U256 {
        estimate.map_or(self.gas_price_floor, |gp| gp.max(self.gas_price_floor))
    }

    /// Resolve everything fallible about the transaction.
    pub fn prepare(
        &self,
        token: Address,
        gas_estimate: Option<U256>,
    ) -> Result<PreparedCall, BuildError> {
        let now = unix_now().ok_or(BuildError::Clock)?;
        self.prepare_at(token, gas_estimate, now)
    }

    pub fn prepare_at(
        &self,
        token: Address,
        gas_estimate: Option<U256>,
        now: u64,
    ) -> Result<PreparedCall, BuildError> {
        if token.is_zero() {
            return Err(BuildError::ZeroTarget);
        }
        let params = SwapParams {
            amount_out_min: U256::zero(),
            path: vec![self.wrapped_native, token],
            recipient: self.recipient,
            deadline: now + self.deadline.as_secs(),
        };
        Ok(PreparedCall {
            data: self.encoder.encode(&params)?,
            gas_price: self.effective_gas_price(gas_estimate),
        })
    }

    /// Attach the reserved nonce. Infallible by construction.
    pub fn finish(&self, prepared: PreparedCall, nonce: u64) -> UnsignedTransaction {
        UnsignedTransaction {
            target: self.router,
            data: prepared.data,
            value: self.value,
            gas_limit: self.gas_limit,
            gas_price: prepared.gas_price,
            nonce,
            chain_id: self.chain_id,
        }
    }
}
