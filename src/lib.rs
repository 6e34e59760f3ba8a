//! Tidemark - on-chain DeFi event indexer
//!
//! Continuously scans an EVM chain for application events (swaps, stakes,
//! loans, liquidity changes, soulbound-badge mints) and projects them into
//! durable per-user profiles, platform analytics totals, and leaderboard
//! scores. Applies each event at most once and stays correct across chain
//! reorganizations, RPC failures, and restarts.

pub mod config;
pub mod decode;
pub mod keys;
pub mod normalize;
pub mod poller;
pub mod price;
pub mod projector;
pub mod records;
pub mod registry;
pub mod rpc;
pub mod store;
pub mod types;

// Re-export the main types for convenience
pub use decode::{DecodedEvent, Decoder, EventKind};
pub use poller::{Poller, PollerSettings};
pub use projector::{Applied, Projector};
pub use records::{AnalyticsCategory, DefiProfile, LeaderboardId, ProcessedEvent};
pub use registry::{ContractCategory, Registry};
pub use store::{ProjectionStore, RocksProjectionStore};
