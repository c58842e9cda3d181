//! Stake lookups used to admit joiners.

use std::collections::HashMap;

use meridian_types::AccountAddress;

/// Read-only view of staked balances.
pub trait StakeLedger: Send + Sync {
    fn stake_of(&self, address: &AccountAddress) -> u64;
}

/// A fixed stake table.
#[derive(Clone, Debug, Default)]
pub struct StaticStakeLedger {
    stakes: HashMap<AccountAddress, u64>,
}

impl StaticStakeLedger {
    pub fn new(stakes: impl IntoIterator<Item = (AccountAddress, u64)>) -> Self {
        Self {
            stakes: stakes.into_iter().collect(),
        }
    }

    pub fn set(&mut self, address: AccountAddress, stake: u64) {
        self.stakes.insert(address, stake);
    }
}

impl StakeLedger for StaticStakeLedger {
    fn stake_of(&self, address: &AccountAddress) -> u64 {
        self.stakes.get(address).copied().unwrap_or(0)
    }
}
