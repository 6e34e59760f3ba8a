//! Record types for projected aggregate state
//!
//! These structs represent the rows stored in the projection store.
//! They use postcard for binary serialization, which is compact and deterministic.

use alloy_primitives::{Address, B256, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-user DeFi activity profile.
///
/// One row per wallet, created lazily the first time the wallet is seen
/// in any event. All volume fields are signed running totals: unstake,
/// withdraw and repay apply negative deltas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefiProfile {
    /// Cumulative USD swap volume (falls back to token units when unpriced)
    pub swap_volume: Decimal,
    /// Number of swaps observed
    pub swap_count: u64,
    /// Net staked volume
    pub staking_volume: Decimal,
    /// Net AMM liquidity volume (USD value of both legs)
    pub liquidity_volume: Decimal,
    /// Net lending supply volume
    pub lend_supplied: Decimal,
    /// Net lending borrow volume
    pub lend_borrowed: Decimal,
    /// Number of reward harvests
    pub harvest_count: u64,
    /// Soulbound badge, set on mint and never cleared
    pub badge: Option<Badge>,
    /// Block of the last event applied to this profile
    pub last_updated_block: u64,
}

/// Soulbound badge ownership recorded on a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    /// Contract the badge was minted from
    pub contract: Address,
    /// Token id of the minted badge
    pub token_id: U256,
}

/// Platform-wide analytics categories with a running signed total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalyticsCategory {
    Staking,
    LendingSupply,
    AmmLiquidity,
}

impl AnalyticsCategory {
    /// Stable single-byte tag used in store keys.
    pub fn as_byte(self) -> u8 {
        match self {
            AnalyticsCategory::Staking => 0x01,
            AnalyticsCategory::LendingSupply => 0x02,
            AnalyticsCategory::AmmLiquidity => 0x03,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnalyticsCategory::Staking => "STAKING",
            AnalyticsCategory::LendingSupply => "LENDING_SUPPLY",
            AnalyticsCategory::AmmLiquidity => "AMM_LIQUIDITY",
        }
    }
}

/// Ranked metrics with a per-user leaderboard entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaderboardId {
    SwapVolume,
}

impl LeaderboardId {
    /// Stable single-byte tag used in store keys.
    pub fn as_byte(self) -> u8 {
        match self {
            LeaderboardId::SwapVolume => 0x01,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LeaderboardId::SwapVolume => "SWAP_VOLUME",
        }
    }
}

/// Record of an already-applied event.
///
/// Keyed by (tx_hash, log_index); the key itself is the at-most-once
/// primitive, this payload exists for observability. Insert-only.
/// There is no confirmed flag: events pass the confirmation gate
/// before they are committed, so every record here is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    /// Contract that emitted the event
    pub contract: Address,
    /// Decoded event name
    pub event_name: String,
    /// Block the event was included in
    pub block_number: u64,
}

/// Reference identifying a single log occurrence on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRef {
    pub tx_hash: B256,
    pub log_index: u64,
}
