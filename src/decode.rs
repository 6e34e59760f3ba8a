//! Event decoder
//!
//! Matches raw logs against the event signatures of the watched contract's
//! category and recovers typed arguments. Unknown or malformed logs decode
//! to `None` -- contracts may emit events outside the watched set, so an
//! unmatched log is never an error.

use crate::registry::ContractCategory;
use crate::types::Log;
use alloy_primitives::{keccak256, Address, B256, U256};

/// A successfully decoded application event with its chain coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub kind: EventKind,
    /// Contract that emitted the event
    pub contract: Address,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
}

/// Typed event arguments, one variant per handled event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Swap {
        user: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        amount_out: U256,
    },
    Stake { user: Address, token: Address, amount: U256 },
    Unstake { user: Address, token: Address, amount: U256 },
    Supply { user: Address, token: Address, amount: U256 },
    WithdrawSupply { user: Address, token: Address, amount: U256 },
    Borrow { user: Address, token: Address, amount: U256 },
    Repay { user: Address, token: Address, amount: U256 },
    LiquidityAdded {
        user: Address,
        token_a: Address,
        token_b: Address,
        amount_a: U256,
        amount_b: U256,
    },
    LiquidityRemoved {
        user: Address,
        token_a: Address,
        token_b: Address,
        amount_a: U256,
        amount_b: U256,
    },
    Harvest { user: Address },
    BadgeMint { user: Address, token_id: U256 },
}

impl EventKind {
    /// Name of the event this variant was decoded from.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Swap { .. } => "Swapped",
            EventKind::Stake { .. } => "Staked",
            EventKind::Unstake { .. } => "Unstaked",
            EventKind::Supply { .. } => "Supplied",
            EventKind::WithdrawSupply { .. } => "Withdrawn",
            EventKind::Borrow { .. } => "Borrowed",
            EventKind::Repay { .. } => "Repaid",
            EventKind::LiquidityAdded { .. } => "LiquidityAdded",
            EventKind::LiquidityRemoved { .. } => "LiquidityRemoved",
            EventKind::Harvest { .. } => "Harvested",
            EventKind::BadgeMint { .. } => "Transfer",
        }
    }

    /// The wallet whose profile this event updates.
    pub fn user(&self) -> Address {
        match *self {
            EventKind::Swap { user, .. }
            | EventKind::Stake { user, .. }
            | EventKind::Unstake { user, .. }
            | EventKind::Supply { user, .. }
            | EventKind::WithdrawSupply { user, .. }
            | EventKind::Borrow { user, .. }
            | EventKind::Repay { user, .. }
            | EventKind::LiquidityAdded { user, .. }
            | EventKind::LiquidityRemoved { user, .. }
            | EventKind::Harvest { user }
            | EventKind::BadgeMint { user, .. } => user,
        }
    }
}

/// Compute the topic0 for an event signature.
pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// Decoder holding the topic table, built once at startup.
#[derive(Debug)]
pub struct Decoder {
    swapped: B256,
    staked: B256,
    unstaked: B256,
    harvested: B256,
    supplied: B256,
    withdrawn: B256,
    borrowed: B256,
    repaid: B256,
    liquidity_added: B256,
    liquidity_removed: B256,
    erc721_transfer: B256,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            swapped: event_topic("Swapped(address,address,address,uint256,uint256)"),
            staked: event_topic("Staked(address,address,uint256)"),
            unstaked: event_topic("Unstaked(address,address,uint256)"),
            harvested: event_topic("Harvested(address,uint256)"),
            supplied: event_topic("Supplied(address,address,uint256)"),
            withdrawn: event_topic("Withdrawn(address,address,uint256)"),
            borrowed: event_topic("Borrowed(address,address,uint256)"),
            repaid: event_topic("Repaid(address,address,uint256)"),
            liquidity_added: event_topic("LiquidityAdded(address,address,address,uint256,uint256)"),
            liquidity_removed: event_topic(
                "LiquidityRemoved(address,address,address,uint256,uint256)",
            ),
            erc721_transfer: event_topic("Transfer(address,address,uint256)"),
        }
    }

    /// Decode a raw log against the schema of its contract's category.
    ///
    /// Returns `None` for unknown topics or logs whose topic/data shape
    /// does not match the signature.
    pub fn decode(&self, category: ContractCategory, log: &Log) -> Option<DecodedEvent> {
        let topic0 = *log.topics.first()?;
        let kind = match category {
            ContractCategory::Swap if topic0 == self.swapped => EventKind::Swap {
                user: topic_address(log, 1)?,
                token_in: topic_address(log, 2)?,
                token_out: topic_address(log, 3)?,
                amount_in: data_word(log, 0)?,
                amount_out: data_word(log, 1)?,
            },
            ContractCategory::Staking if topic0 == self.staked => EventKind::Stake {
                user: topic_address(log, 1)?,
                token: topic_address(log, 2)?,
                amount: data_word(log, 0)?,
            },
            ContractCategory::Staking if topic0 == self.unstaked => EventKind::Unstake {
                user: topic_address(log, 1)?,
                token: topic_address(log, 2)?,
                amount: data_word(log, 0)?,
            },
            ContractCategory::Staking if topic0 == self.harvested => EventKind::Harvest {
                user: topic_address(log, 1)?,
            },
            ContractCategory::Lending if topic0 == self.supplied => EventKind::Supply {
                user: topic_address(log, 1)?,
                token: topic_address(log, 2)?,
                amount: data_word(log, 0)?,
            },
            ContractCategory::Lending if topic0 == self.withdrawn => EventKind::WithdrawSupply {
                user: topic_address(log, 1)?,
                token: topic_address(log, 2)?,
                amount: data_word(log, 0)?,
            },
            ContractCategory::Lending if topic0 == self.borrowed => EventKind::Borrow {
                user: topic_address(log, 1)?,
                token: topic_address(log, 2)?,
                amount: data_word(log, 0)?,
            },
            ContractCategory::Lending if topic0 == self.repaid => EventKind::Repay {
                user: topic_address(log, 1)?,
                token: topic_address(log, 2)?,
                amount: data_word(log, 0)?,
            },
            ContractCategory::AmmPool if topic0 == self.liquidity_added => {
                EventKind::LiquidityAdded {
                    user: topic_address(log, 1)?,
                    token_a: topic_address(log, 2)?,
                    token_b: topic_address(log, 3)?,
                    amount_a: data_word(log, 0)?,
                    amount_b: data_word(log, 1)?,
                }
            }
            ContractCategory::AmmPool if topic0 == self.liquidity_removed => {
                EventKind::LiquidityRemoved {
                    user: topic_address(log, 1)?,
                    token_a: topic_address(log, 2)?,
                    token_b: topic_address(log, 3)?,
                    amount_a: data_word(log, 0)?,
                    amount_b: data_word(log, 1)?,
                }
            }
            ContractCategory::Badge if topic0 == self.erc721_transfer => {
                let from = topic_address(log, 1)?;
                let to = topic_address(log, 2)?;
                // Only mints (transfer from the zero address) are of interest;
                // a soulbound token never moves afterwards anyway.
                if from != Address::ZERO {
                    return None;
                }
                EventKind::BadgeMint {
                    user: to,
                    token_id: U256::from_be_slice(log.topics.get(3)?.as_slice()),
                }
            }
            _ => return None,
        };

        Some(DecodedEvent {
            kind,
            contract: log.address,
            block_number: log.block_number,
            tx_hash: log.tx_hash,
            log_index: log.log_index,
        })
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the address packed into topic `i` (last 20 of 32 bytes).
fn topic_address(log: &Log, i: usize) -> Option<Address> {
    let topic = log.topics.get(i)?;
    Some(Address::from_slice(&topic.as_slice()[12..]))
}

/// Extract the `i`-th 32-byte word of the data section as a U256.
fn data_word(log: &Log, i: usize) -> Option<U256> {
    let start = i * 32;
    let end = start + 32;
    if log.data.len() < end {
        return None;
    }
    Some(U256::from_be_slice(&log.data[start..end]))
}
