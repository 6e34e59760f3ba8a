//! Key encoding utilities for the projection store
//!
//! All keys use a single-byte prefix followed by binary data.
//! This ensures deterministic, lexicographically ordered keys in RocksDB.

use alloy_primitives::{Address, B256};
use crate::records::{AnalyticsCategory, LeaderboardId};

/// Encode a profile key.
///
/// Format: byte 'P' (0x50) + wallet address (20 bytes)
/// Total length: 21 bytes
pub fn encode_profile_key(wallet: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(b'P');
    key.extend_from_slice(wallet.as_slice());
    key
}

/// Encode a platform analytics key.
///
/// Format: byte 'G' (0x47) + category tag (1 byte)
/// Total length: 2 bytes
pub fn encode_analytics_key(category: AnalyticsCategory) -> Vec<u8> {
    vec![b'G', category.as_byte()]
}

/// Encode a leaderboard entry key.
///
/// Format: byte 'L' (0x4C) + leaderboard tag (1 byte) + wallet address (20 bytes)
/// Total length: 22 bytes
pub fn encode_leaderboard_key(board: LeaderboardId, wallet: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(22);
    key.push(b'L');
    key.push(board.as_byte());
    key.extend_from_slice(wallet.as_slice());
    key
}

/// Encode a processed-event key.
///
/// Format: byte 'E' (0x45) + tx hash (32 bytes) + log index (8 bytes, big-endian)
/// Total length: 41 bytes
pub fn encode_processed_key(tx_hash: B256, log_index: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(41);
    key.push(b'E');
    key.extend_from_slice(tx_hash.as_slice());
    key.extend_from_slice(&log_index.to_be_bytes());
    key
}

/// Encode a per-contract scan cursor key.
///
/// Format: byte 'S' (0x53) + contract address (20 bytes)
/// Total length: 21 bytes
pub fn encode_cursor_key(contract: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(b'S');
    key.extend_from_slice(contract.as_slice());
    key
}
