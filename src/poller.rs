//! Log poller and scheduler
//!
//! The orchestrating loop of the indexer. A single periodic timer drives
//! one tick at a time; within a tick, contracts are scanned sequentially
//! and each contract's block range is fetched in bounded chunks. Per
//! contract the store holds a scan cursor (last fully-scanned block) that
//! only ever advances to `min(chunk_end, head - confirmations)`, so an
//! event that is not yet confirmation-eligible is always re-scanned on a
//! later tick instead of being silently skipped.

use crate::config::Config;
use crate::decode::Decoder;
use crate::projector::Projector;
use crate::registry::{Registry, WatchedContract};
use crate::rpc::ChainSource;
use crate::store::ProjectionStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Scan tuning knobs, lifted out of the full `Config`.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Blocks that must follow an event before it is applied
    pub confirmations: u64,
    /// Seconds between ticks
    pub poll_interval: Duration,
    /// Maximum block span per log request
    pub chunk_width: u64,
    /// Blocks scanned backwards from the tip on a cold start
    pub backfill_blocks: u64,
    /// Blocks held back from the tip when requesting logs
    pub reorg_buffer: u64,
}

impl From<&Config> for PollerSettings {
    fn from(config: &Config) -> Self {
        Self {
            confirmations: config.confirmations,
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            chunk_width: config.chunk_width.max(1),
            backfill_blocks: config.backfill_blocks,
            reorg_buffer: config.reorg_buffer,
        }
    }
}

/// The scheduling loop driving scan -> decode -> gate -> apply.
pub struct Poller {
    chain: Arc<dyn ChainSource>,
    registry: Registry,
    decoder: Decoder,
    projector: Projector,
    store: Arc<dyn ProjectionStore>,
    settings: PollerSettings,
}

impl Poller {
    pub fn new(
        chain: Arc<dyn ChainSource>,
        registry: Registry,
        projector: Projector,
        store: Arc<dyn ProjectionStore>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            chain,
            registry,
            decoder: Decoder::new(),
            projector,
            store,
            settings,
        }
    }

    /// Run the poll loop until the shutdown signal flips.
    ///
    /// Ticks never overlap: the interval is awaited on this task and a
    /// missed tick is delayed, not stacked. On shutdown an in-flight tick
    /// finishes its current chunk before the loop exits.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            "Starting poller: {} contract(s), interval {:?}, {} confirmations, chunk width {}",
            self.registry.len(),
            self.settings.poll_interval,
            self.settings.confirmations,
            self.settings.chunk_width
        );

        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut shutdown_rx = shutdown.clone();
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // A tick failure must never take down the loop.
                    if let Err(e) = self.tick(&shutdown).await {
                        warn!("Poll tick failed, retrying next interval: {:#}", e);
                    }
                }
                _ = shutdown_rx.changed() => {}
            }
            if *shutdown.borrow() {
                info!("Poller shutting down");
                return Ok(());
            }
        }
    }

    /// One poll pass over all registered contracts.
    pub async fn tick(&self, shutdown: &watch::Receiver<bool>) -> Result<()> {
        let head = self
            .chain
            .block_number()
            .await
            .context("Failed to read chain head")?;
        let safe_head = head.saturating_sub(self.settings.reorg_buffer);
        let confirmed_head = head.saturating_sub(self.settings.confirmations);
        debug!("Tick: head {}, safe head {}, confirmed head {}", head, safe_head, confirmed_head);

        for contract in self.registry.iter() {
            if *shutdown.borrow() {
                break;
            }
            // One contract failing must not block the others.
            if let Err(e) = self
                .scan_contract(contract, safe_head, confirmed_head, shutdown)
                .await
            {
                warn!(
                    "Scan failed for {} contract {}, will retry next tick: {:#}",
                    contract.category.as_str(),
                    contract.address,
                    e
                );
            }
        }
        Ok(())
    }

    /// Scan one contract's outstanding range in chunks.
    ///
    /// On a chunk failure (RPC error or a primary-effect persistence
    /// error) the error propagates with the cursor untouched for that
    /// chunk; chunks are never partially committed.
    async fn scan_contract(
        &self,
        contract: &WatchedContract,
        safe_head: u64,
        confirmed_head: u64,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<()> {
        let cursor = self
            .store
            .cursor(contract.address)
            .context("Failed to load scan cursor")?;
        let from = first_unscanned_block(cursor, safe_head, self.settings.backfill_blocks);
        if from > safe_head {
            return Ok(());
        }

        debug!(
            "Scanning {} contract {} blocks {}..={}",
            contract.category.as_str(),
            contract.address,
            from,
            safe_head
        );

        let mut chunk_start = from;
        while chunk_start <= safe_head {
            let chunk_end = chunk_end(chunk_start, safe_head, self.settings.chunk_width);
            let logs = self
                .chain
                .get_logs(contract.address, chunk_start, chunk_end)
                .await
                .with_context(|| format!("Log fetch failed for blocks {}..={}", chunk_start, chunk_end))?;

            for log in &logs {
                if log.removed {
                    continue;
                }
                let Some(event) = self.decoder.decode(contract.category, log) else {
                    continue;
                };
                // Confirmation gate: not an error, a deferral. The cursor
                // cap below guarantees the log is re-scanned once eligible.
                if event.block_number > confirmed_head {
                    debug!(
                        "Deferring {} at block {} until {} confirmations",
                        event.kind.name(),
                        event.block_number,
                        self.settings.confirmations
                    );
                    continue;
                }
                self.projector.apply(&event).await?;
            }

            // Advance at most to the confirmed head so deferred events
            // stay ahead of the cursor. set_cursor ignores non-advances.
            self.store
                .set_cursor(contract.address, chunk_end.min(confirmed_head))
                .context("Failed to advance scan cursor")?;

            chunk_start = chunk_end + 1;
            if *shutdown.borrow() {
                break;
            }
        }
        Ok(())
    }
}

/// First block to scan given the persisted cursor, or the backfill window
/// below the safe head on a cold start.
fn first_unscanned_block(cursor: Option<u64>, safe_head: u64, backfill: u64) -> u64 {
    match cursor {
        Some(last) => last + 1,
        None => safe_head.saturating_sub(backfill),
    }
}

/// Inclusive end of the chunk starting at `chunk_start`. A zero width
/// behaves as a single-block chunk.
fn chunk_end(chunk_start: u64, safe_head: u64, width: u64) -> u64 {
    chunk_start.saturating_add(width.max(1) - 1).min(safe_head)
}
