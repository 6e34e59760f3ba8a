//! Contract registry
//!
//! Maps each watched contract address to the category that fixes its
//! event schema and handler set. Populated once at startup from
//! configuration and read-only afterwards.

use crate::config::{parse_address, Config};
use alloy_primitives::Address;
use std::collections::HashMap;
use tracing::{info, warn};

/// Categories of watched contracts. The category selects which event
/// signatures the decoder matches against the contract's logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContractCategory {
    /// DEX router emitting Swapped events
    Swap,
    /// Staking vault emitting Staked/Unstaked/Harvested events
    Staking,
    /// Lending pool emitting Supplied/Withdrawn/Borrowed/Repaid events
    Lending,
    /// AMM pool emitting LiquidityAdded/LiquidityRemoved events
    AmmPool,
    /// Soulbound badge contract emitting ERC-721 Transfer mints
    Badge,
}

impl ContractCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ContractCategory::Swap => "swap",
            ContractCategory::Staking => "staking",
            ContractCategory::Lending => "lending",
            ContractCategory::AmmPool => "amm_pool",
            ContractCategory::Badge => "badge",
        }
    }
}

/// A single monitored contract instance.
#[derive(Debug, Clone, Copy)]
pub struct WatchedContract {
    pub address: Address,
    pub category: ContractCategory,
}

/// Registry of watched contracts.
///
/// Each address is registered exactly once for the process lifetime;
/// later registrations of the same address are ignored with a warning.
#[derive(Debug, Default)]
pub struct Registry {
    contracts: Vec<WatchedContract>,
    index: HashMap<Address, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the configured per-category address lists.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for (category, addresses) in &config.watched {
            registry.register(*category, addresses);
        }
        registry
    }

    /// Register a list of addresses under a category.
    ///
    /// Malformed addresses are logged and skipped so one bad entry never
    /// blocks the rest of the category. Returns the number of contracts
    /// actually added.
    pub fn register(&mut self, category: ContractCategory, addresses: &[String]) -> usize {
        let mut added = 0;
        for raw in addresses {
            let address = match parse_address(raw) {
                Ok(a) => a,
                Err(e) => {
                    warn!(
                        "Skipping malformed {} contract address {:?}: {:#}",
                        category.as_str(),
                        raw,
                        e
                    );
                    continue;
                }
            };
            if let Some(&existing) = self.index.get(&address) {
                warn!(
                    "Contract {} already registered as {}, ignoring {} registration",
                    address,
                    self.contracts[existing].category.as_str(),
                    category.as_str()
                );
                continue;
            }
            self.index.insert(address, self.contracts.len());
            self.contracts.push(WatchedContract { address, category });
            added += 1;
        }
        if added > 0 {
            info!("Registered {} {} contract(s)", added, category.as_str());
        }
        added
    }

    /// Iterate contracts in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &WatchedContract> {
        self.contracts.iter()
    }

    /// Look up the category a contract was registered under.
    pub fn category_of(&self, address: Address) -> Option<ContractCategory> {
        self.index.get(&address).map(|&i| self.contracts[i].category)
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
