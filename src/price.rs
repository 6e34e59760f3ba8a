//! Price oracle cache
//!
//! Read-through USD price cache keyed by upper-cased token symbol with a
//! wall-clock TTL. Tokens without a symbol mapping are unpriced: callers
//! fall back to raw token amounts instead of failing the event. Quote
//! service failures return `None` as well; a stale cache entry is never
//! served past its TTL.

use alloy_primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// USD price lookup used by the projection writer.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// USD price for the token, or `None` when it cannot be priced.
    async fn price_usd(&self, token: Address) -> Option<Decimal>;
}

struct CacheEntry {
    price: Decimal,
    fetched_at: Instant,
}

/// Symbol-mapped, TTL-cached quote service client.
pub struct TokenPricer {
    symbols: HashMap<Address, String>,
    api_url: Option<String>,
    api_key: Option<String>,
    ttl: Duration,
    client: reqwest::Client,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl TokenPricer {
    pub fn new(
        symbols: HashMap<Address, String>,
        api_url: Option<String>,
        api_key: Option<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            symbols,
            api_url,
            api_key,
            ttl,
            client: reqwest::Client::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a fresh quote for the symbol.
    async fn fetch_quote(&self, symbol: &str) -> Result<Decimal> {
        let api_url = self
            .api_url
            .as_deref()
            .context("Quote service not configured")?;
        let url = format!("{}/price?symbol={}", api_url.trim_end_matches('/'), symbol);

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-KEY", key);
        }
        let response = request
            .send()
            .await
            .context("Quote request failed")?
            .error_for_status()
            .context("Quote service returned an error status")?;
        let body: Value = response.json().await.context("Quote response is not JSON")?;

        let price = body
            .get("price")
            .context("Quote response missing 'price' field")?;
        parse_price(price).context("Quote price is not a valid decimal")
    }
}

/// Accept both string-typed and numeric price payloads.
fn parse_price(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                n.as_f64().and_then(|f| Decimal::try_from(f).ok())
            }
        }
        _ => None,
    }
}

#[async_trait]
impl PriceSource for TokenPricer {
    async fn price_usd(&self, token: Address) -> Option<Decimal> {
        let symbol = self.symbols.get(&token)?.clone();

        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.get(&symbol) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Some(entry.price);
            }
        }

        match self.fetch_quote(&symbol).await {
            Ok(price) => {
                debug!("Refreshed {} price: {} USD", symbol, price);
                cache.insert(
                    symbol,
                    CacheEntry {
                        price,
                        fetched_at: Instant::now(),
                    },
                );
                Some(price)
            }
            Err(e) => {
                warn!("Failed to fetch {} price, treating as unpriced: {:#}", symbol, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn pricer_with(symbols: &[(Address, &str)]) -> TokenPricer {
        TokenPricer::new(
            symbols
                .iter()
                .map(|(a, s)| (*a, s.to_string()))
                .collect(),
            None,
            None,
            Duration::from_secs(300),
        )
    }

    async fn seed(pricer: &TokenPricer, symbol: &str, price: &str, age: Duration) {
        pricer.cache.lock().await.insert(
            symbol.to_string(),
            CacheEntry {
                price: Decimal::from_str(price).unwrap(),
                fetched_at: Instant::now() - age,
            },
        );
    }

    #[tokio::test]
    async fn test_unmapped_token_is_unpriced() {
        let pricer = pricer_with(&[(addr(0x01), "USDC")]);
        assert_eq!(pricer.price_usd(addr(0x99)).await, None);
    }

    #[tokio::test]
    async fn test_fresh_cache_entry_is_served() {
        let pricer = pricer_with(&[(addr(0x01), "USDC")]);
        seed(&pricer, "USDC", "1.00", Duration::ZERO).await;
        assert_eq!(
            pricer.price_usd(addr(0x01)).await,
            Some(Decimal::from_str("1.00").unwrap())
        );
    }

    #[tokio::test]
    async fn test_stale_entry_is_not_reused_when_refresh_fails() {
        // No quote service configured, so the refresh attempt fails; the
        // stale entry must not be served past its TTL.
        let pricer = pricer_with(&[(addr(0x01), "USDC")]);
        seed(&pricer, "USDC", "1.00", Duration::from_secs(3600)).await;
        assert_eq!(pricer.price_usd(addr(0x01)).await, None);
    }

    #[test]
    fn test_parse_price_variants() {
        assert_eq!(
            parse_price(&serde_json::json!("2.50")),
            Some(Decimal::from_str("2.50").unwrap())
        );
        assert_eq!(parse_price(&serde_json::json!(3)), Some(Decimal::from(3)));
        assert!(parse_price(&serde_json::json!(2.5)).is_some());
        assert_eq!(parse_price(&serde_json::json!(null)), None);
        assert_eq!(parse_price(&serde_json::json!("garbage")), None);
    }
}
