//! Projection writer
//!
//! Translates decoded events into durable aggregate updates: the user's
//! DeFi profile, platform-wide analytics totals, and leaderboard scores.
//! The profile + analytics + dedup mark are one atomic primary effect;
//! leaderboard writes are a best-effort secondary effect that never
//! blocks the primary from being committed.

use crate::decode::{DecodedEvent, EventKind};
use crate::normalize::Normalizer;
use crate::price::PriceSource;
use crate::records::{
    AnalyticsCategory, Badge, DefiProfile, EventRef, LeaderboardId, ProcessedEvent,
};
use crate::store::ProjectionStore;
use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of applying a decoded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Event was applied and recorded in the dedup ledger.
    Done,
    /// Event was already in the dedup ledger; nothing changed.
    Duplicate,
}

/// Applies decoded events to the projection store.
pub struct Projector {
    store: Arc<dyn ProjectionStore>,
    normalizer: Normalizer,
    pricer: Arc<dyn PriceSource>,
}

impl Projector {
    pub fn new(
        store: Arc<dyn ProjectionStore>,
        normalizer: Normalizer,
        pricer: Arc<dyn PriceSource>,
    ) -> Self {
        Self {
            store,
            normalizer,
            pricer,
        }
    }

    /// Apply one event: dedup gate, profile/analytics update, ledger mark,
    /// then secondary leaderboard write.
    ///
    /// An `Err` means the primary effect was NOT committed; the caller must
    /// not advance its cursor past this event so it stays retryable.
    pub async fn apply(&self, event: &DecodedEvent) -> Result<Applied> {
        let event_ref = EventRef {
            tx_hash: event.tx_hash,
            log_index: event.log_index,
        };
        if self
            .store
            .is_processed(&event_ref)
            .context("Dedup ledger check failed")?
        {
            debug!(
                "Skipping already-applied event {} (tx {}, log {})",
                event.kind.name(),
                event.tx_hash,
                event.log_index
            );
            return Ok(Applied::Duplicate);
        }

        let user = event.kind.user();
        let mut profile = self
            .store
            .get_profile(user)
            .context("Profile lookup failed")?
            .unwrap_or_default();

        let analytics = self.apply_kind(&event.kind, event.contract, &mut profile).await;
        profile.last_updated_block = profile.last_updated_block.max(event.block_number);

        let record = ProcessedEvent {
            contract: event.contract,
            event_name: event.kind.name().to_string(),
            block_number: event.block_number,
        };
        self.store
            .commit_event(user, &profile, analytics, &event_ref, &record)
            .with_context(|| {
                format!(
                    "Failed to commit {} event (tx {}, log {})",
                    event.kind.name(),
                    event.tx_hash,
                    event.log_index
                )
            })?;

        // Secondary effect: ranked metrics mirror the committed profile
        // value. A failure here is logged and swallowed; the event is
        // already durable and must not be re-applied for a score write.
        if matches!(event.kind, EventKind::Swap { .. }) {
            if let Err(e) =
                self.store
                    .put_leaderboard_score(LeaderboardId::SwapVolume, user, profile.swap_volume)
            {
                warn!(
                    "Leaderboard update failed for {} (score {}): {:#}",
                    user, profile.swap_volume, e
                );
            }
        }

        Ok(Applied::Done)
    }

    /// Mutate the profile for this event kind and return the platform
    /// analytics delta, if the category tracks one.
    ///
    /// Totals saturate at the Decimal range bounds instead of
    /// overflowing; a pathological token amount must never panic the
    /// event path.
    async fn apply_kind(
        &self,
        kind: &EventKind,
        contract: Address,
        profile: &mut DefiProfile,
    ) -> Option<(AnalyticsCategory, Decimal)> {
        match *kind {
            EventKind::Swap { token_in, amount_in, .. } => {
                let value = self.value_of(token_in, amount_in).await;
                profile.swap_volume = profile.swap_volume.saturating_add(value);
                profile.swap_count += 1;
                None
            }
            EventKind::Stake { token, amount, .. } => {
                let value = self.value_of(token, amount).await;
                profile.staking_volume = profile.staking_volume.saturating_add(value);
                Some((AnalyticsCategory::Staking, value))
            }
            EventKind::Unstake { token, amount, .. } => {
                let value = self.value_of(token, amount).await;
                profile.staking_volume = profile.staking_volume.saturating_sub(value);
                Some((AnalyticsCategory::Staking, -value))
            }
            EventKind::Supply { token, amount, .. } => {
                let value = self.value_of(token, amount).await;
                profile.lend_supplied = profile.lend_supplied.saturating_add(value);
                Some((AnalyticsCategory::LendingSupply, value))
            }
            EventKind::WithdrawSupply { token, amount, .. } => {
                let value = self.value_of(token, amount).await;
                profile.lend_supplied = profile.lend_supplied.saturating_sub(value);
                Some((AnalyticsCategory::LendingSupply, -value))
            }
            EventKind::Borrow { token, amount, .. } => {
                let value = self.value_of(token, amount).await;
                profile.lend_borrowed = profile.lend_borrowed.saturating_add(value);
                None
            }
            EventKind::Repay { token, amount, .. } => {
                let value = self.value_of(token, amount).await;
                profile.lend_borrowed = profile.lend_borrowed.saturating_sub(value);
                None
            }
            EventKind::LiquidityAdded { token_a, token_b, amount_a, amount_b, .. } => {
                let value = self
                    .value_of(token_a, amount_a)
                    .await
                    .saturating_add(self.value_of(token_b, amount_b).await);
                profile.liquidity_volume = profile.liquidity_volume.saturating_add(value);
                Some((AnalyticsCategory::AmmLiquidity, value))
            }
            EventKind::LiquidityRemoved { token_a, token_b, amount_a, amount_b, .. } => {
                let value = self
                    .value_of(token_a, amount_a)
                    .await
                    .saturating_add(self.value_of(token_b, amount_b).await);
                profile.liquidity_volume = profile.liquidity_volume.saturating_sub(value);
                Some((AnalyticsCategory::AmmLiquidity, -value))
            }
            EventKind::Harvest { .. } => {
                profile.harvest_count += 1;
                None
            }
            EventKind::BadgeMint { token_id, .. } => {
                // A soulbound badge is minted once; keep the first one.
                if profile.badge.is_none() {
                    profile.badge = Some(Badge { contract, token_id });
                }
                None
            }
        }
    }

    /// USD value of a raw amount, falling back to the normalized token
    /// amount when the token cannot be priced. Saturates on overflow.
    async fn value_of(&self, token: Address, raw: U256) -> Decimal {
        let amount = self.normalizer.amount(token, raw).await;
        match self.pricer.price_usd(token).await {
            Some(price) => amount.saturating_mul(price),
            None => amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::ChainSource;
    use crate::store::RocksProjectionStore;
    use crate::types::Log;
    use alloy_primitives::B256;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::str::FromStr;
    use tempfile::TempDir;

    struct StubChain {
        decimals: u8,
    }

    #[async_trait]
    impl ChainSource for StubChain {
        async fn block_number(&self) -> Result<u64> {
            Ok(0)
        }

        async fn get_logs(&self, _address: Address, _from: u64, _to: u64) -> Result<Vec<Log>> {
            Ok(Vec::new())
        }

        async fn call(&self, _to: Address, _data: &[u8]) -> Result<Vec<u8>> {
            let mut word = [0u8; 32];
            word[31] = self.decimals;
            Ok(word.to_vec())
        }
    }

    struct FixedPricer {
        prices: HashMap<Address, Decimal>,
    }

    #[async_trait]
    impl PriceSource for FixedPricer {
        async fn price_usd(&self, token: Address) -> Option<Decimal> {
            self.prices.get(&token).copied()
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn setup(
        decimals: u8,
        prices: &[(Address, &str)],
    ) -> (TempDir, Arc<RocksProjectionStore>, Projector) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksProjectionStore::open(dir.path()).unwrap());
        let normalizer = Normalizer::new(Arc::new(StubChain { decimals }));
        let pricer = Arc::new(FixedPricer {
            prices: prices.iter().map(|(a, p)| (*a, dec(p))).collect(),
        });
        let projector = Projector::new(store.clone(), normalizer, pricer);
        (dir, store, projector)
    }

    fn make_event(kind: EventKind, tx: u8, log_index: u64) -> DecodedEvent {
        DecodedEvent {
            kind,
            contract: addr(0xCC),
            block_number: 100,
            tx_hash: B256::repeat_byte(tx),
            log_index,
        }
    }

    #[tokio::test]
    async fn test_swap_end_to_end() {
        let user = addr(0x01);
        let token = addr(0x02);
        let (_dir, store, projector) = setup(6, &[(token, "2.00")]);

        let event = make_event(
            EventKind::Swap {
                user,
                token_in: token,
                token_out: addr(0x03),
                amount_in: U256::from(5_000_000u64),
                amount_out: U256::from(1u64),
            },
            0xA1,
            0,
        );

        assert_eq!(projector.apply(&event).await.unwrap(), Applied::Done);

        let profile = store.get_profile(user).unwrap().unwrap();
        assert_eq!(profile.swap_volume, dec("10.00"));
        assert_eq!(profile.swap_count, 1);
        assert_eq!(profile.last_updated_block, 100);
        assert_eq!(
            store.leaderboard_score(LeaderboardId::SwapVolume, user).unwrap(),
            Some(dec("10.00"))
        );
        assert!(store
            .is_processed(&EventRef { tx_hash: B256::repeat_byte(0xA1), log_index: 0 })
            .unwrap());
    }

    #[tokio::test]
    async fn test_replay_is_applied_at_most_once() {
        let user = addr(0x01);
        let token = addr(0x02);
        let (_dir, store, projector) = setup(6, &[(token, "2.00")]);

        let event = make_event(
            EventKind::Swap {
                user,
                token_in: token,
                token_out: addr(0x03),
                amount_in: U256::from(5_000_000u64),
                amount_out: U256::from(1u64),
            },
            0xA1,
            0,
        );

        assert_eq!(projector.apply(&event).await.unwrap(), Applied::Done);
        assert_eq!(projector.apply(&event).await.unwrap(), Applied::Duplicate);

        let profile = store.get_profile(user).unwrap().unwrap();
        assert_eq!(profile.swap_volume, dec("10.00"));
        assert_eq!(profile.swap_count, 1);
    }

    #[tokio::test]
    async fn test_stake_unstake_signed_deltas() {
        let user = addr(0x01);
        let token = addr(0x02);
        // No price mapping: values fall back to normalized token amounts.
        let (_dir, store, projector) = setup(0, &[]);

        let stake = make_event(
            EventKind::Stake { user, token, amount: U256::from(100u64) },
            0xB1,
            0,
        );
        let unstake = make_event(
            EventKind::Unstake { user, token, amount: U256::from(40u64) },
            0xB2,
            0,
        );

        projector.apply(&stake).await.unwrap();
        projector.apply(&unstake).await.unwrap();

        let profile = store.get_profile(user).unwrap().unwrap();
        assert_eq!(profile.staking_volume, dec("60"));
        assert_eq!(
            store.analytics_total(AnalyticsCategory::Staking).unwrap(),
            dec("60")
        );
    }

    #[tokio::test]
    async fn test_unpriced_liquidity_falls_back_to_raw_amounts() {
        let user = addr(0x01);
        let (_dir, store, projector) = setup(0, &[]);

        let event = make_event(
            EventKind::LiquidityAdded {
                user,
                token_a: addr(0x02),
                token_b: addr(0x03),
                amount_a: U256::from(7u64),
                amount_b: U256::from(5u64),
            },
            0xC1,
            0,
        );
        projector.apply(&event).await.unwrap();

        let profile = store.get_profile(user).unwrap().unwrap();
        assert_eq!(profile.liquidity_volume, dec("12"));
        assert_eq!(
            store.analytics_total(AnalyticsCategory::AmmLiquidity).unwrap(),
            dec("12")
        );
    }

    #[tokio::test]
    async fn test_borrow_repay_has_no_global_total() {
        let user = addr(0x01);
        let token = addr(0x02);
        let (_dir, store, projector) = setup(0, &[]);

        projector
            .apply(&make_event(
                EventKind::Borrow { user, token, amount: U256::from(30u64) },
                0xD1,
                0,
            ))
            .await
            .unwrap();
        projector
            .apply(&make_event(
                EventKind::Repay { user, token, amount: U256::from(10u64) },
                0xD2,
                0,
            ))
            .await
            .unwrap();

        let profile = store.get_profile(user).unwrap().unwrap();
        assert_eq!(profile.lend_borrowed, dec("20"));
        assert_eq!(
            store.analytics_total(AnalyticsCategory::LendingSupply).unwrap(),
            Decimal::ZERO
        );
    }

    #[tokio::test]
    async fn test_harvest_increments_counter_only() {
        let user = addr(0x01);
        let (_dir, store, projector) = setup(0, &[]);

        projector
            .apply(&make_event(EventKind::Harvest { user }, 0xE1, 0))
            .await
            .unwrap();

        let profile = store.get_profile(user).unwrap().unwrap();
        assert_eq!(profile.harvest_count, 1);
        assert_eq!(profile.staking_volume, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_badge_mint_keeps_first_badge() {
        let user = addr(0x01);
        let (_dir, store, projector) = setup(0, &[]);

        projector
            .apply(&make_event(
                EventKind::BadgeMint { user, token_id: U256::from(1u64) },
                0xF1,
                0,
            ))
            .await
            .unwrap();
        projector
            .apply(&make_event(
                EventKind::BadgeMint { user, token_id: U256::from(2u64) },
                0xF2,
                0,
            ))
            .await
            .unwrap();

        let profile = store.get_profile(user).unwrap().unwrap();
        let badge = profile.badge.unwrap();
        assert_eq!(badge.token_id, U256::from(1u64));
        assert_eq!(badge.contract, addr(0xCC));
    }

    #[tokio::test]
    async fn test_oversized_swap_saturates_instead_of_panicking() {
        let user = addr(0x01);
        let token = addr(0x02);
        let (_dir, store, projector) = setup(18, &[(token, "2.00")]);

        // A raw amount wider than Decimal's 96-bit mantissa normalizes to
        // Decimal::MAX; pricing and accumulation must clamp, not panic.
        let event = make_event(
            EventKind::Swap {
                user,
                token_in: token,
                token_out: addr(0x03),
                amount_in: U256::MAX,
                amount_out: U256::from(1u64),
            },
            0xA8,
            0,
        );
        assert_eq!(projector.apply(&event).await.unwrap(), Applied::Done);
        let profile = store.get_profile(user).unwrap().unwrap();
        assert_eq!(profile.swap_volume, Decimal::MAX);

        // A later ordinary swap still applies against the clamped total.
        let event = make_event(
            EventKind::Swap {
                user,
                token_in: token,
                token_out: addr(0x03),
                amount_in: U256::from(1_000_000u64),
                amount_out: U256::from(1u64),
            },
            0xA9,
            0,
        );
        assert_eq!(projector.apply(&event).await.unwrap(), Applied::Done);
        let profile = store.get_profile(user).unwrap().unwrap();
        assert_eq!(profile.swap_volume, Decimal::MAX);
        assert_eq!(profile.swap_count, 2);
    }

    #[tokio::test]
    async fn test_oversized_stake_saturates_analytics_total() {
        let user = addr(0x01);
        let token = addr(0x02);
        let (_dir, store, projector) = setup(18, &[]);

        projector
            .apply(&make_event(
                EventKind::Stake { user, token, amount: U256::MAX },
                0xB8,
                0,
            ))
            .await
            .unwrap();
        projector
            .apply(&make_event(
                EventKind::Stake { user, token, amount: U256::from(100u64) },
                0xB9,
                0,
            ))
            .await
            .unwrap();

        let profile = store.get_profile(user).unwrap().unwrap();
        assert_eq!(profile.staking_volume, Decimal::MAX);
        assert_eq!(
            store.analytics_total(AnalyticsCategory::Staking).unwrap(),
            Decimal::MAX
        );
    }

    #[tokio::test]
    async fn test_profile_created_once_across_events() {
        let user = addr(0x01);
        let (_dir, store, projector) = setup(0, &[]);

        for (i, tx) in (0u8..5).enumerate() {
            projector
                .apply(&make_event(EventKind::Harvest { user }, 0x10 + tx, i as u64))
                .await
                .unwrap();
        }

        let profile = store.get_profile(user).unwrap().unwrap();
        assert_eq!(profile.harvest_count, 5);
    }
}
