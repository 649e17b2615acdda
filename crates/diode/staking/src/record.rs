//! Per-participant stake buckets

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::{Bucket, MaturationWindows};

/// Raw stake state of one participant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRecord {
    /// Matured stake
    pub confirmed: U256,
    /// Stake waiting for the stake window
    pub pending: U256,
    /// Height of the last deposit into `pending`
    pub last_update_height: u64,
    /// Unstaked amount waiting for the unstake window
    pub locked: U256,
    /// Height at which `locked` becomes claimable
    pub unlock_height: u64,
    /// Unstaked amount ready to withdraw
    pub claimable: U256,
}

impl StakeRecord {
    /// Move matured buckets forward, returning whether anything changed
    ///
    /// Calling this twice at the same height is a no-op the second time.
    pub fn settle(&mut self, height: u64, windows: &MaturationWindows) -> bool {
        let mut changed = false;

        if !self.pending.is_zero() && height.saturating_sub(self.last_update_height) >= windows.stake {
            self.confirmed = self.confirmed.saturating_add(self.pending);
            self.pending = U256::ZERO;
            changed = true;
        }

        if !self.locked.is_zero() && height >= self.unlock_height {
            self.claimable = self.claimable.saturating_add(self.locked);
            self.locked = U256::ZERO;
            changed = true;
        }

        changed
    }

    /// Settled copy of this record, leaving `self` untouched
    pub fn settled(&self, height: u64, windows: &MaturationWindows) -> Self {
        let mut record = self.clone();
        record.settle(height, windows);
        record
    }

    /// Value of one bucket
    pub const fn value(&self, bucket: Bucket) -> U256 {
        match bucket {
            Bucket::Confirmed => self.confirmed,
            Bucket::Pending => self.pending,
            Bucket::Locked => self.locked,
            Bucket::Claimable => self.claimable,
        }
    }

    /// Sum of all buckets
    pub fn total(&self) -> U256 {
        self.confirmed
            .saturating_add(self.pending)
            .saturating_add(self.locked)
            .saturating_add(self.claimable)
    }

    /// Whether every bucket is empty
    pub fn is_empty(&self) -> bool {
        self.total().is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOWS: MaturationWindows = MaturationWindows::new(3, 5);

    #[test]
    fn test_pending_matures_after_window() {
        let record = StakeRecord {
            pending: U256::from(10),
            last_update_height: 100,
            ..Default::default()
        };

        assert_eq!(record.settled(102, &WINDOWS).confirmed, U256::ZERO);
        let settled = record.settled(103, &WINDOWS);
        assert_eq!(settled.confirmed, U256::from(10));
        assert_eq!(settled.pending, U256::ZERO);
    }

    #[test]
    fn test_locked_becomes_claimable() {
        let mut record = StakeRecord {
            locked: U256::from(4),
            unlock_height: 50,
            ..Default::default()
        };

        assert!(!record.settle(49, &WINDOWS));
        assert!(record.settle(50, &WINDOWS));
        assert_eq!(record.value(Bucket::Claimable), U256::from(4));
        assert_eq!(record.value(Bucket::Locked), U256::ZERO);
    }

    #[test]
    fn test_settle_is_idempotent() {
        let mut record = StakeRecord {
            confirmed: U256::from(1),
            pending: U256::from(2),
            last_update_height: 0,
            locked: U256::from(3),
            unlock_height: 4,
            claimable: U256::ZERO,
        };

        assert!(record.settle(10, &WINDOWS));
        let once = record.clone();
        assert!(!record.settle(10, &WINDOWS));
        assert_eq!(record, once);
        assert_eq!(record.total(), U256::from(6));
    }
}
