//! Amount normalizer
//!
//! Converts raw on-chain integer amounts into decimal token quantities
//! using a per-token decimals cache. Decimals are immutable on chain, so
//! an entry is fetched once per token and kept for the process lifetime;
//! a failed `decimals()` call falls back to 18 and the fallback is cached
//! too, so a broken token does not get re-queried on every event.

use crate::rpc::ChainSource;
use alloy_primitives::{Address, U256};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Function selector for `decimals()`.
const DECIMALS_SELECTOR: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];

/// Default when a token does not answer `decimals()`.
const DEFAULT_DECIMALS: u32 = 18;

/// Decimal supports at most 28 fractional digits.
const MAX_SCALE: u32 = 28;

/// Normalizes raw token amounts using cached per-token decimals.
pub struct Normalizer {
    chain: Arc<dyn ChainSource>,
    decimals: Mutex<HashMap<Address, u32>>,
}

impl Normalizer {
    pub fn new(chain: Arc<dyn ChainSource>) -> Self {
        Self {
            chain,
            decimals: Mutex::new(HashMap::new()),
        }
    }

    /// Normalize a raw integer amount into token units.
    pub async fn amount(&self, token: Address, raw: U256) -> Decimal {
        let decimals = self.decimals_of(token).await;
        to_decimal(raw, decimals)
    }

    /// Token decimals, fetched via `eth_call` at most once per token.
    pub async fn decimals_of(&self, token: Address) -> u32 {
        let mut cache = self.decimals.lock().await;
        if let Some(&decimals) = cache.get(&token) {
            return decimals;
        }

        let decimals = match self.chain.call(token, &DECIMALS_SELECTOR).await {
            Ok(data) => match parse_decimals(&data) {
                Some(d) => {
                    debug!("Token {} has {} decimals", token, d);
                    d
                }
                None => {
                    warn!(
                        "Token {} returned malformed decimals(), assuming {}",
                        token, DEFAULT_DECIMALS
                    );
                    DEFAULT_DECIMALS
                }
            },
            Err(e) => {
                warn!(
                    "decimals() call failed for token {}, assuming {}: {:#}",
                    token, DEFAULT_DECIMALS, e
                );
                DEFAULT_DECIMALS
            }
        };

        cache.insert(token, decimals);
        decimals
    }
}

/// Interpret the ABI-encoded return of `decimals()` (a uint8 in a 32-byte word).
fn parse_decimals(data: &[u8]) -> Option<u32> {
    if data.len() < 32 {
        return None;
    }
    // Leading 31 bytes must be zero for a sane uint8.
    if data[..31].iter().any(|&b| b != 0) {
        return None;
    }
    Some(data[31] as u32)
}

/// Convert a raw integer amount to a decimal quantity.
///
/// Values wider than 96 bits saturate to `Decimal::MAX` and decimals
/// beyond Decimal's 28-digit scale are clamped; both are warned since
/// they indicate a pathological token rather than normal traffic.
pub fn to_decimal(raw: U256, decimals: u32) -> Decimal {
    let scale = decimals.min(MAX_SCALE);
    let mantissa = match u128::try_from(raw) {
        Ok(v) if v <= i128::MAX as u128 => v as i128,
        _ => {
            warn!("Raw amount {} exceeds decimal range, saturating", raw);
            return Decimal::MAX;
        }
    };
    match Decimal::try_from_i128_with_scale(mantissa, scale) {
        Ok(value) => value,
        Err(_) => {
            warn!("Amount {} with scale {} exceeds decimal range, saturating", mantissa, scale);
            Decimal::MAX
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Log;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Chain stub that answers decimals() with a fixed value and counts calls.
    struct FixedDecimalsChain {
        decimals: Option<u8>,
        calls: AtomicUsize,
    }

    impl FixedDecimalsChain {
        fn new(decimals: Option<u8>) -> Self {
            Self {
                decimals,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChainSource for FixedDecimalsChain {
        async fn block_number(&self) -> Result<u64> {
            Ok(0)
        }

        async fn get_logs(&self, _address: Address, _from: u64, _to: u64) -> Result<Vec<Log>> {
            Ok(Vec::new())
        }

        async fn call(&self, _to: Address, _data: &[u8]) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.decimals {
                Some(d) => {
                    let mut word = [0u8; 32];
                    word[31] = d;
                    Ok(word.to_vec())
                }
                None => anyhow::bail!("node unavailable"),
            }
        }
    }

    #[test]
    fn test_to_decimal() {
        assert_eq!(
            to_decimal(U256::from(5_000_000u64), 6),
            Decimal::from_str("5.0").unwrap()
        );
        assert_eq!(to_decimal(U256::ZERO, 18), Decimal::ZERO);
        assert_eq!(to_decimal(U256::from(1u64), 0), Decimal::ONE);
    }

    #[test]
    fn test_to_decimal_saturates_huge_values() {
        assert_eq!(to_decimal(U256::MAX, 18), Decimal::MAX);
    }

    #[test]
    fn test_parse_decimals() {
        let mut word = [0u8; 32];
        word[31] = 6;
        assert_eq!(parse_decimals(&word), Some(6));
        assert_eq!(parse_decimals(&[]), None);
        word[0] = 1; // garbage high bytes
        assert_eq!(parse_decimals(&word), None);
    }

    #[tokio::test]
    async fn test_decimals_fetched_once() {
        let chain = Arc::new(FixedDecimalsChain::new(Some(6)));
        let normalizer = Normalizer::new(chain.clone());
        let token = Address::repeat_byte(0x11);

        for _ in 0..1000 {
            assert_eq!(normalizer.decimals_of(token).await, 6);
        }
        assert_eq!(chain.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_decimals_defaults_and_caches() {
        let chain = Arc::new(FixedDecimalsChain::new(None));
        let normalizer = Normalizer::new(chain.clone());
        let token = Address::repeat_byte(0x22);

        assert_eq!(normalizer.decimals_of(token).await, DEFAULT_DECIMALS);
        assert_eq!(normalizer.decimals_of(token).await, DEFAULT_DECIMALS);
        // The fallback is cached, the failing call is not repeated.
        assert_eq!(chain.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_amount_normalization() {
        let chain = Arc::new(FixedDecimalsChain::new(Some(6)));
        let normalizer = Normalizer::new(chain);
        let token = Address::repeat_byte(0x33);

        let amount = normalizer.amount(token, U256::from(5_000_000u64)).await;
        assert_eq!(amount, Decimal::from_str("5.0").unwrap());
    }
}
