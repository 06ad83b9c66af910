//! Configuration loader and application settings.

use std::str::FromStr;
use std::time::Duration;

use ethers::types::{Address, U256};
use url::Url;

use crate::errors::{AppError, Result};
use crate::models::Endpoint;
use crate::utils::{native_to_wei, parse_gwei};

const DEFAULT_TOKEN_MANAGER: &str = "0x5c952063c7fc8610FFDB798152D69F0B9550762b";
const DEFAULT_ROUTER: &str = "0x10ED43C718714eb63d5aA57B4B54e6ABdCA3E5b5";
const DEFAULT_WRAPPED_NATIVE: &str = "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c";

/// Consolidated application configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct SniperConfig {
    /// WebSocket endpoint carrying the `TokenCreate` feed.
    pub ws_url: Url,
    /// Reference endpoint for simulation, fee and nonce queries.
    pub rpc_url: Url,
    /// Submission pool; ordinals are 1-based positions.
    pub endpoints: Vec<Endpoint>,
    pub private_key: String,
    pub token_manager: Address,
    pub router: Address,
    pub wrapped_native: Address,
    /// Subject prefix, compared case-insensitively.
    pub token_prefix: String,
    /// Purchase amount in wei.
    pub buy_amount_wei: U256,
    pub chain_id: u64,
    pub gas_limit: U256,
    pub gas_price_floor: U256,
    pub submit_timeout: Duration,
    pub simulation_timeout: Duration,
    pub simulate: bool,
    pub nonce_refresh_interval: Duration,
    pub deadline: Duration,
}

impl SniperConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required =
            |key: &str| get(key).ok_or_else(|| AppError::Config(format!("{key} is not set")));

        let ws_url = parse_url("WS_URL", &required("WS_URL")?)?;
        let rpc_raw = required("RPC_URL")?;
        let rpc_url = parse_url("RPC_URL", &rpc_raw)?;

        let endpoints = get("BROADCAST_ENDPOINTS")
            .unwrap_or(rpc_raw)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .enumerate()
            .map(|(i, raw)| Ok(Endpoint::new(i + 1, parse_url("BROADCAST_ENDPOINTS", raw)?)))
            .collect::<Result<Vec<_>>>()?;
        if endpoints.is_empty() {
            return Err(AppError::Config("BROADCAST_ENDPOINTS is empty".into()));
        }

        let private_key = required("PRIVATE_KEY")?;

        let address = |key: &str, default: &str| -> Result<Address> {
            let raw = get(key).unwrap_or_else(|| default.to_string());
            Address::from_str(raw.trim())
                .map_err(|e| AppError::Config(format!("{key} is not an address: {e}")))
        };

        let token_prefix =
            parse_prefix(&get("TOKEN_PREFIX").unwrap_or_else(|| "0x4444".into()))?;
        let buy_amount_wei = native_to_wei(&get("BUY_AMOUNT").unwrap_or_else(|| "0.01".into()))?;
        let gas_price_floor =
            parse_gwei(&get("GAS_PRICE_FLOOR_GWEI").unwrap_or_else(|| "3".into()))?;

        Ok(Self {
            ws_url,
            rpc_url,
            endpoints,
            private_key,
            token_manager: address("TOKEN_MANAGER_ADDRESS", DEFAULT_TOKEN_MANAGER)?,
            router: address("ROUTER_ADDRESS", DEFAULT_ROUTER)?,
            wrapped_native: address("WRAPPED_NATIVE_ADDRESS", DEFAULT_WRAPPED_NATIVE)?,
            token_prefix,
            buy_amount_wei,
            chain_id: parse_or(&get, "CHAIN_ID", 56)?,
            gas_limit: U256::from(parse_or::<u64>(&get, "GAS_LIMIT", 500_000)?),
            gas_price_floor,
            submit_timeout: Duration::from_millis(parse_or(&get, "SUBMIT_TIMEOUT_MS", 5_000)?),
            simulation_timeout: Duration::from_millis(parse_or(
                &get,
                "SIMULATION_TIMEOUT_MS",
                2_000,
            )?),
            simulate: parse_or(&get, "SIMULATE", true)?,
            nonce_refresh_interval: Duration::from_secs(parse_or(&get, "NONCE_REFRESH_SECS", 30)?),
            deadline: Duration::from_secs(parse_or(&get, "DEADLINE_SECS", 1_200)?),
        })
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url> {
    Url::parse(raw.trim())
        .map_err(|e| AppError::Config(format!("{key}: {raw:?} is not a URL: {e}")))
}

/// Normalise to lowercase `0x`-prefixed form; `0x` is optional on input.
fn parse_prefix(raw: &str) -> Result<String> {
    let lower = raw.trim().to_lowercase();
    let digits = lower.strip_prefix("0x").unwrap_or(&lower);
    if digits.is_empty() || digits.len() > 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::Config(format!(
            "TOKEN_PREFIX={raw:?} is not an address prefix"
        )));
    }
    Ok(format!("0x{digits}"))
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key}={raw:?}: {e}"))),
        None => Ok(default),
    }
}
