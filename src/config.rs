//! Environment-driven configuration
//!
//! All tuning knobs come from `TIDEMARK_*` environment variables.
//! Malformed entries in list-valued variables (watched contracts, token
//! symbol map) are logged and skipped; only a missing RPC endpoint is fatal.

use crate::registry::ContractCategory;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use tracing::warn;

/// Runtime configuration for the indexer.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON-RPC endpoint, `http(s)://` or `ws(s)://`
    pub rpc_url: String,
    /// Optional bearer token attached to RPC requests
    pub rpc_bearer: Option<String>,
    /// Blocks that must follow an event before it is applied
    pub confirmations: u64,
    /// Seconds between poll ticks
    pub poll_interval_secs: u64,
    /// Maximum block span per `eth_getLogs` request
    pub chunk_width: u64,
    /// Blocks scanned backwards from the tip on a cold start
    pub backfill_blocks: u64,
    /// Blocks held back from the tip when requesting logs
    pub reorg_buffer: u64,
    /// Quote service base URL; pricing is disabled when absent
    pub price_api_url: Option<String>,
    /// Quote service API key
    pub price_api_key: Option<String>,
    /// Seconds a cached USD price stays fresh
    pub price_ttl_secs: u64,
    /// Raw watched-address lists per category, validated by the registry
    pub watched: Vec<(ContractCategory, Vec<String>)>,
    /// Token address -> quote symbol map
    pub token_symbols: HashMap<Address, String>,
}

impl Config {
    /// Read configuration from the environment.
    ///
    /// Fails only when the RPC endpoint is missing; everything else has a
    /// default or degrades with a warning.
    pub fn from_env() -> Result<Self> {
        let rpc_url = env::var("TIDEMARK_RPC_URL")
            .context("TIDEMARK_RPC_URL is not set (chain RPC endpoint is required)")?;

        let watched = vec![
            (ContractCategory::Swap, env_list("TIDEMARK_SWAP_CONTRACTS")),
            (ContractCategory::Staking, env_list("TIDEMARK_STAKING_CONTRACTS")),
            (ContractCategory::Lending, env_list("TIDEMARK_LENDING_CONTRACTS")),
            (ContractCategory::AmmPool, env_list("TIDEMARK_AMM_CONTRACTS")),
            (ContractCategory::Badge, env_list("TIDEMARK_BADGE_CONTRACTS")),
        ];

        let price_api_url = env::var("TIDEMARK_PRICE_API_URL").ok();
        if price_api_url.is_none() {
            warn!("TIDEMARK_PRICE_API_URL not set; USD pricing disabled, handlers fall back to raw token amounts");
        }

        Ok(Self {
            rpc_url,
            rpc_bearer: env::var("TIDEMARK_RPC_BEARER").ok(),
            confirmations: env_u64("TIDEMARK_CONFIRMATIONS", 12),
            poll_interval_secs: env_u64("TIDEMARK_POLL_INTERVAL_SECS", 15),
            chunk_width: env_u64("TIDEMARK_CHUNK_WIDTH", 2000).max(1),
            backfill_blocks: env_u64("TIDEMARK_BACKFILL_BLOCKS", 5000),
            reorg_buffer: env_u64("TIDEMARK_REORG_BUFFER", 3),
            price_api_url,
            price_api_key: env::var("TIDEMARK_PRICE_API_KEY").ok(),
            price_ttl_secs: env_u64("TIDEMARK_PRICE_TTL_SECS", 300),
            watched,
            token_symbols: parse_symbol_map(&env::var("TIDEMARK_TOKEN_SYMBOLS").unwrap_or_default()),
        })
    }
}

/// Read a u64 env var, falling back to a default on absence or parse failure.
fn env_u64(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has non-numeric value {:?}, using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

/// Read a comma-separated env var into trimmed, non-empty entries.
fn env_list(name: &str) -> Vec<String> {
    env::var(name)
        .map(|raw| split_list(&raw))
        .unwrap_or_default()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse an address from a hex string, with or without 0x prefix.
pub fn parse_address(s: &str) -> Result<Address> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).with_context(|| format!("Invalid hex address: {}", s))?;
    if bytes.len() != 20 {
        anyhow::bail!("Address must be 20 bytes (40 hex chars), got {} bytes", bytes.len());
    }
    Ok(Address::from_slice(&bytes))
}

/// Parse a `0xtoken=SYMBOL,0xtoken=SYMBOL` map.
///
/// Malformed entries are warned about and skipped; symbols are upper-cased
/// to match the quote service's keying.
pub fn parse_symbol_map(raw: &str) -> HashMap<Address, String> {
    let mut map = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((addr_str, symbol)) = entry.split_once('=') else {
            warn!("Skipping malformed token symbol entry (expected 0xaddr=SYMBOL): {}", entry);
            continue;
        };
        let symbol = symbol.trim();
        if symbol.is_empty() {
            warn!("Skipping token symbol entry with empty symbol: {}", entry);
            continue;
        }
        match parse_address(addr_str.trim()) {
            Ok(addr) => {
                map.insert(addr, symbol.to_uppercase());
            }
            Err(e) => {
                warn!("Skipping token symbol entry with bad address {:?}: {:#}", addr_str, e);
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        let a = parse_address("0x0742d35Cc6634C0532925a3b844Bc9e7595f0bEb").unwrap();
        let b = parse_address("0742d35Cc6634C0532925a3b844Bc9e7595f0bEb").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_address_rejects_short() {
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("not hex at all").is_err());
    }

    #[test]
    fn test_split_list() {
        let items = split_list(" 0xaa , ,0xbb,");
        assert_eq!(items, vec!["0xaa".to_string(), "0xbb".to_string()]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_parse_symbol_map() {
        let map = parse_symbol_map(
            "0x0742d35cc6634c0532925a3b844bc9e7595f0beb=usdc, bogus, 0xdac17f958d2ee523a2206206994597c13d831ec7=USDT",
        );
        assert_eq!(map.len(), 2);
        let usdc = parse_address("0x0742d35cc6634c0532925a3b844bc9e7595f0beb").unwrap();
        assert_eq!(map.get(&usdc).map(String::as_str), Some("USDC"));
    }

    #[test]
    fn test_parse_symbol_map_skips_bad_entries() {
        let map = parse_symbol_map("0x1234=SHORT,=NOADDR,0xdac17f958d2ee523a2206206994597c13d831ec7=");
        assert!(map.is_empty());
    }
}
