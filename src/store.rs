//! ProjectionStore trait and RocksDB implementation
//!
//! Durable storage for the projected aggregates: per-user profiles,
//! platform analytics totals, leaderboard scores, the processed-event
//! dedup ledger, and per-contract scan cursors. The primary effect of an
//! event (profile + analytics + dedup mark) is committed in a single
//! WriteBatch so a crash can never leave an event half-applied.

use crate::keys::{
    encode_analytics_key, encode_cursor_key, encode_leaderboard_key, encode_processed_key,
    encode_profile_key,
};
use crate::records::{
    AnalyticsCategory, DefiProfile, EventRef, LeaderboardId, ProcessedEvent,
};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};
use rust_decimal::Decimal;
use std::path::Path;

/// Interface to the projected-aggregate store.
///
/// Only the primitives the projection writer needs: upsert-by-key,
/// signed-delta accumulation, unique insert for the dedup ledger, and
/// cursor persistence.
pub trait ProjectionStore: Send + Sync {
    /// Get a user's profile by wallet address.
    fn get_profile(&self, wallet: Address) -> Result<Option<DefiProfile>>;

    /// Store a user's profile.
    fn put_profile(&self, wallet: Address, profile: &DefiProfile) -> Result<()>;

    /// Running signed total for an analytics category (zero if untouched).
    fn analytics_total(&self, category: AnalyticsCategory) -> Result<Decimal>;

    /// Get a user's leaderboard score.
    fn leaderboard_score(&self, board: LeaderboardId, wallet: Address)
        -> Result<Option<Decimal>>;

    /// Overwrite a user's leaderboard score.
    fn put_leaderboard_score(
        &self,
        board: LeaderboardId,
        wallet: Address,
        score: Decimal,
    ) -> Result<()>;

    /// Whether an event has already been applied.
    fn is_processed(&self, event: &EventRef) -> Result<bool>;

    /// Get the last fully-scanned block for a contract.
    fn cursor(&self, contract: Address) -> Result<Option<u64>>;

    /// Advance a contract's scan cursor. Cursors never move backwards.
    fn set_cursor(&self, contract: Address, block: u64) -> Result<()>;

    /// Atomically commit an event's primary effect: the updated profile,
    /// an optional analytics delta, and the dedup-ledger mark.
    fn commit_event(
        &self,
        wallet: Address,
        profile: &DefiProfile,
        analytics: Option<(AnalyticsCategory, Decimal)>,
        event: &EventRef,
        record: &ProcessedEvent,
    ) -> Result<()>;
}

/// RocksDB-backed implementation.
///
/// Column families:
/// - profiles: per-user DeFi profiles
/// - analytics: per-category signed totals
/// - leaderboards: per-(board, user) scores
/// - processed: dedup ledger keyed by (tx hash, log index)
/// - cursors: per-contract scan cursors
pub struct RocksProjectionStore {
    db: DB,
}

impl RocksProjectionStore {
    /// Open or create a RocksDB database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let column_families = vec![
            ColumnFamilyDescriptor::new("profiles", Options::default()),
            ColumnFamilyDescriptor::new("analytics", Options::default()),
            ColumnFamilyDescriptor::new("leaderboards", Options::default()),
            ColumnFamilyDescriptor::new("processed", Options::default()),
            ColumnFamilyDescriptor::new("cursors", Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, column_families)
            .context("Failed to open RocksDB database")?;

        Ok(Self { db })
    }

    /// Get a column family handle by name.
    fn get_cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .with_context(|| format!("Column family '{}' not found", name))
    }

    fn decode_decimal(bytes: &[u8]) -> Result<Decimal> {
        postcard::from_bytes(bytes).context("Failed to deserialize decimal value")
    }

    fn encode_decimal(value: Decimal) -> Result<Vec<u8>> {
        postcard::to_allocvec(&value).context("Failed to serialize decimal value")
    }
}

impl ProjectionStore for RocksProjectionStore {
    fn get_profile(&self, wallet: Address) -> Result<Option<DefiProfile>> {
        let cf = self.get_cf("profiles")?;
        let key = encode_profile_key(wallet);
        match self.db.get_cf(cf, &key).context("Failed to get profile")? {
            Some(bytes) => {
                let profile =
                    postcard::from_bytes(&bytes).context("Failed to deserialize profile")?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    fn put_profile(&self, wallet: Address, profile: &DefiProfile) -> Result<()> {
        let cf = self.get_cf("profiles")?;
        let key = encode_profile_key(wallet);
        let value = postcard::to_allocvec(profile).context("Failed to serialize profile")?;
        self.db
            .put_cf(cf, &key, &value)
            .context("Failed to put profile")?;
        Ok(())
    }

    fn analytics_total(&self, category: AnalyticsCategory) -> Result<Decimal> {
        let cf = self.get_cf("analytics")?;
        let key = encode_analytics_key(category);
        match self
            .db
            .get_cf(cf, &key)
            .context("Failed to get analytics total")?
        {
            Some(bytes) => Self::decode_decimal(&bytes),
            None => Ok(Decimal::ZERO),
        }
    }

    fn leaderboard_score(
        &self,
        board: LeaderboardId,
        wallet: Address,
    ) -> Result<Option<Decimal>> {
        let cf = self.get_cf("leaderboards")?;
        let key = encode_leaderboard_key(board, wallet);
        match self
            .db
            .get_cf(cf, &key)
            .context("Failed to get leaderboard score")?
        {
            Some(bytes) => Ok(Some(Self::decode_decimal(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_leaderboard_score(
        &self,
        board: LeaderboardId,
        wallet: Address,
        score: Decimal,
    ) -> Result<()> {
        let cf = self.get_cf("leaderboards")?;
        let key = encode_leaderboard_key(board, wallet);
        self.db
            .put_cf(cf, &key, Self::encode_decimal(score)?)
            .context("Failed to put leaderboard score")?;
        Ok(())
    }

    fn is_processed(&self, event: &EventRef) -> Result<bool> {
        let cf = self.get_cf("processed")?;
        let key = encode_processed_key(event.tx_hash, event.log_index);
        Ok(self
            .db
            .get_cf(cf, &key)
            .context("Failed to check processed ledger")?
            .is_some())
    }

    fn cursor(&self, contract: Address) -> Result<Option<u64>> {
        let cf = self.get_cf("cursors")?;
        let key = encode_cursor_key(contract);
        match self.db.get_cf(cf, &key).context("Failed to get cursor")? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .context("Cursor value must be 8 bytes")?;
                Ok(Some(u64::from_be_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    fn set_cursor(&self, contract: Address, block: u64) -> Result<()> {
        // Cursors are monotonically non-decreasing.
        if let Some(current) = self.cursor(contract)? {
            if block <= current {
                return Ok(());
            }
        }
        let cf = self.get_cf("cursors")?;
        let key = encode_cursor_key(contract);
        self.db
            .put_cf(cf, &key, block.to_be_bytes())
            .context("Failed to put cursor")?;
        Ok(())
    }

    fn commit_event(
        &self,
        wallet: Address,
        profile: &DefiProfile,
        analytics: Option<(AnalyticsCategory, Decimal)>,
        event: &EventRef,
        record: &ProcessedEvent,
    ) -> Result<()> {
        let profiles_cf = self.get_cf("profiles")?;
        let analytics_cf = self.get_cf("analytics")?;
        let processed_cf = self.get_cf("processed")?;

        let mut batch = WriteBatch::default();

        let profile_value =
            postcard::to_allocvec(profile).context("Failed to serialize profile")?;
        batch.put_cf(profiles_cf, encode_profile_key(wallet), &profile_value);

        if let Some((category, delta)) = analytics {
            // Saturate rather than panic when a total hits the Decimal range.
            let total = self.analytics_total(category)?.saturating_add(delta);
            batch.put_cf(
                analytics_cf,
                encode_analytics_key(category),
                Self::encode_decimal(total)?,
            );
        }

        let record_value =
            postcard::to_allocvec(record).context("Failed to serialize processed event")?;
        batch.put_cf(
            processed_cf,
            encode_processed_key(event.tx_hash, event.log_index),
            &record_value,
        );

        self.db.write(batch).context("Failed to commit event batch")?;
        Ok(())
    }
}
