//! Stake ledger keyed by participant

use alloy_primitives::U256;
use std::collections::HashMap;
use tracing::debug;

use crate::{Bucket, MaturationWindows, ParticipantKind, StakeRecord, StakingError};

/// Stake state for every participant
#[derive(Debug, Clone, Default)]
pub struct StakeLedger {
    windows: MaturationWindows,
    records: HashMap<ParticipantKind, StakeRecord>,
}

impl StakeLedger {
    /// Create an empty ledger
    pub fn new(windows: MaturationWindows) -> Self {
        Self { windows, records: HashMap::new() }
    }

    /// Maturation windows in use
    pub const fn windows(&self) -> MaturationWindows {
        self.windows
    }

    /// Settle matured buckets of `who`, returning whether anything changed
    pub fn settle(&mut self, who: ParticipantKind, height: u64) -> bool {
        let windows = self.windows;
        self.records.get_mut(&who).is_some_and(|record| record.settle(height, &windows))
    }

    fn settled_mut(&mut self, who: ParticipantKind, height: u64) -> &mut StakeRecord {
        let windows = self.windows;
        let record = self.records.entry(who).or_default();
        record.settle(height, &windows);
        record
    }

    /// Deposit `amount` into the pending bucket
    ///
    /// Restarts the stake window for everything still pending.
    pub fn stake(
        &mut self,
        who: ParticipantKind,
        amount: U256,
        height: u64,
    ) -> Result<(), StakingError> {
        if amount.is_zero() {
            return Err(StakingError::ZeroAmount);
        }

        let record = self.settled_mut(who, height);
        let pending = record.pending.checked_add(amount).ok_or(StakingError::Overflow(who))?;
        record.pending = pending;
        record.last_update_height = height;

        debug!(target: "diode::staking", %who, %amount, height, "Staked");
        Ok(())
    }

    /// Move `amount` from confirmed into the locked bucket
    ///
    /// Returns the height at which the locked amount becomes claimable. Fails
    /// without touching any bucket when `amount` exceeds the confirmed balance.
    pub fn unstake(
        &mut self,
        who: ParticipantKind,
        amount: U256,
        height: u64,
    ) -> Result<u64, StakingError> {
        if amount.is_zero() {
            return Err(StakingError::ZeroAmount);
        }

        let available = self.value(Bucket::Confirmed, who, height);
        if amount > available {
            return Err(StakingError::InsufficientStake { requested: amount, available });
        }

        let unlock_height = height.saturating_add(self.windows.unstake);
        let record = self.settled_mut(who, height);
        let locked = record.locked.checked_add(amount).ok_or(StakingError::Overflow(who))?;
        record.confirmed -= amount;
        record.locked = locked;
        record.unlock_height = unlock_height;

        debug!(target: "diode::staking", %who, %amount, height, unlock_height, "Unstaked");
        Ok(unlock_height)
    }

    /// Pay out the claimable bucket, returning the amount paid
    ///
    /// Before the unstake window has passed this pays zero.
    pub fn withdraw(&mut self, who: ParticipantKind, height: u64) -> U256 {
        if !self.records.contains_key(&who) {
            return U256::ZERO;
        }

        let record = self.settled_mut(who, height);
        let amount = std::mem::take(&mut record.claimable);

        debug!(target: "diode::staking", %who, %amount, height, "Withdrawn");
        amount
    }

    /// Add `amount` straight to the confirmed bucket
    pub fn credit(
        &mut self,
        who: ParticipantKind,
        amount: U256,
        height: u64,
    ) -> Result<(), StakingError> {
        let record = self.settled_mut(who, height);
        record.confirmed = record.confirmed.checked_add(amount).ok_or(StakingError::Overflow(who))?;

        debug!(target: "diode::staking", %who, %amount, height, "Credited");
        Ok(())
    }

    /// Settled value of one bucket at `height`, without mutating state
    pub fn value(&self, bucket: Bucket, who: ParticipantKind, height: u64) -> U256 {
        self.records
            .get(&who)
            .map(|record| record.settled(height, &self.windows).value(bucket))
            .unwrap_or_default()
    }

    /// Settled record of `who` at `height`
    pub fn record(&self, who: ParticipantKind, height: u64) -> Option<StakeRecord> {
        self.records.get(&who).map(|record| record.settled(height, &self.windows))
    }

    /// Number of participants
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger has no participants
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of every bucket of every participant
    pub fn total_value(&self) -> U256 {
        self.records.values().fold(U256::ZERO, |acc, record| acc.saturating_add(record.total()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;
    use proptest::prelude::*;

    const ETHER: u64 = 1_000_000_000_000_000_000;

    fn ether(n: u64) -> U256 {
        U256::from(n) * U256::from(ETHER)
    }

    fn raw(ledger: &StakeLedger, who: ParticipantKind) -> Option<&StakeRecord> {
        ledger.records.get(&who)
    }

    fn miner() -> ParticipantKind {
        ParticipantKind::Miner(Address::repeat_byte(2))
    }

    #[test]
    fn test_stake_three_times() {
        let mut ledger = StakeLedger::new(MaturationWindows::new(3, 3));
        let mut height = 1;

        ledger.stake(miner(), ether(1), height).unwrap();
        height += 3;
        assert_eq!(ledger.value(Bucket::Confirmed, miner(), height), ether(1));

        ledger.stake(miner(), ether(1), height).unwrap();
        height += 3;
        assert_eq!(ledger.value(Bucket::Confirmed, miner(), height), ether(2));
        assert_eq!(ledger.value(Bucket::Pending, miner(), height), U256::ZERO);

        ledger.stake(miner(), ether(1), height).unwrap();
        assert_eq!(ledger.value(Bucket::Confirmed, miner(), height), ether(2));
        assert_eq!(ledger.value(Bucket::Pending, miner(), height), ether(1));
    }

    #[test]
    fn test_unstake_and_withdraw() {
        let mut ledger = StakeLedger::new(MaturationWindows::new(3, 3));
        ledger.stake(miner(), ether(3), 0).unwrap();

        let tenth = U256::from(ETHER / 10);
        let unlock = ledger.unstake(miner(), tenth, 3).unwrap();
        assert_eq!(unlock, 6);
        assert_eq!(ledger.value(Bucket::Locked, miner(), 3), tenth);

        // Too early: nothing to pay
        assert_eq!(ledger.withdraw(miner(), 5), U256::ZERO);

        assert_eq!(ledger.value(Bucket::Claimable, miner(), 6), tenth);
        assert_eq!(ledger.withdraw(miner(), 6), tenth);
        assert_eq!(ledger.value(Bucket::Confirmed, miner(), 6), ether(3) - tenth);
        assert_eq!(ledger.value(Bucket::Locked, miner(), 6), U256::ZERO);
        assert_eq!(ledger.value(Bucket::Claimable, miner(), 6), U256::ZERO);
    }

    #[test]
    fn test_unstake_beyond_confirmed_is_rejected() {
        let mut ledger = StakeLedger::new(MaturationWindows::new(3, 3));
        ledger.stake(miner(), ether(1), 0).unwrap();

        // Still pending, so nothing is confirmed yet
        let err = ledger.unstake(miner(), ether(1), 1).unwrap_err();
        assert_eq!(err, StakingError::InsufficientStake { requested: ether(1), available: U256::ZERO });
        assert_eq!(raw(&ledger, miner()).unwrap().pending, ether(1));
        assert_eq!(raw(&ledger, miner()).unwrap().locked, U256::ZERO);
    }

    #[test]
    fn test_zero_amounts_rejected() {
        let mut ledger = StakeLedger::default();
        assert_eq!(ledger.stake(miner(), U256::ZERO, 0), Err(StakingError::ZeroAmount));
        assert_eq!(ledger.unstake(miner(), U256::ZERO, 0), Err(StakingError::ZeroAmount));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_fleet_and_miner_are_separate() {
        let address = Address::repeat_byte(9);
        let mut ledger = StakeLedger::default();
        ledger.stake(ParticipantKind::Fleet(address), ether(1), 0).unwrap();

        assert_eq!(ledger.value(Bucket::Pending, ParticipantKind::Fleet(address), 0), ether(1));
        assert_eq!(ledger.value(Bucket::Pending, ParticipantKind::Miner(address), 0), U256::ZERO);
    }

    #[test]
    fn test_reads_do_not_mutate() {
        let mut ledger = StakeLedger::new(MaturationWindows::new(3, 3));
        ledger.stake(miner(), ether(1), 0).unwrap();

        assert_eq!(ledger.value(Bucket::Confirmed, miner(), 10), ether(1));
        assert_eq!(raw(&ledger, miner()).unwrap().pending, ether(1));

        assert!(ledger.settle(miner(), 10));
        assert!(!ledger.settle(miner(), 10));
        assert_eq!(raw(&ledger, miner()).unwrap().confirmed, ether(1));
    }

    proptest! {
        #[test]
        fn prop_unstake_never_overdraws(
            stakes in proptest::collection::vec(1u64..1_000, 1..8),
            unstakes in proptest::collection::vec(1u64..2_000, 1..8),
        ) {
            let mut ledger = StakeLedger::new(MaturationWindows::new(1, 1));
            let mut height = 0;
            for amount in &stakes {
                ledger.stake(miner(), U256::from(*amount), height).unwrap();
                height += 1;
            }
            height += 1;

            let deposited: u64 = stakes.iter().sum();
            for amount in &unstakes {
                let before = ledger.value(Bucket::Confirmed, miner(), height);
                match ledger.unstake(miner(), U256::from(*amount), height) {
                    Ok(_) => prop_assert!(U256::from(*amount) <= before),
                    Err(_) => prop_assert_eq!(ledger.value(Bucket::Confirmed, miner(), height), before),
                }
                height += 1;
            }

            prop_assert_eq!(ledger.total_value(), U256::from(deposited));
        }
    }
}
