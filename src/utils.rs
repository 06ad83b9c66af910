//! Miscellaneous helper utilities.

use std::time::{SystemTime, UNIX_EPOCH};

use ethers::types::U256;
use ethers::utils::{parse_ether, parse_units};
use tracing_subscriber::{EnvFilter, fmt};

use crate::errors::{AppError, Result};

/// Initialize `tracing` subscriber with env-based filter.
///
/// If `RUST_LOG` is not set, defaults to `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Convert a decimal amount of the native currency (e.g. "0.01") into wei.
pub fn native_to_wei(amount: &str) -> Result<U256> {
    let wei = parse_ether(amount.trim())
        .map_err(|e| AppError::Config(format!("invalid native amount {amount:?}: {e}")))?;
    if wei.is_zero() {
        return Err(AppError::Config(format!("native amount {amount:?} is zero")));
    }
    Ok(wei)
}

pub fn parse_gwei(value: &str) -> Result<U256> {
    let wei = parse_units(value.trim(), "gwei")
        .map_err(|e| AppError::Config(format!("invalid gwei amount {value:?}: {e}")))?;
    Ok(wei.into())
}

/// Seconds since the unix epoch, or `None` if the clock is behind it.
pub fn unix_now() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

pub fn unix_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_amount_converts_to_wei() {
        assert_eq!(
            native_to_wei("0.01").unwrap(),
            U256::from(10_000_000_000_000_000u64)
        );
        assert!(native_to_wei("0").is_err());
        assert!(native_to_wei("abc").is_err());
    }

    #[test]
    fn gwei_amounts_parse_to_wei() {
        assert_eq!(parse_gwei("3").unwrap(), U256::from(3_000_000_000u64));
        assert_eq!(parse_gwei("0.1").unwrap(), U256::from(100_000_000u64));
    }
}
