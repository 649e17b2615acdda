//! Diode Stake Ledger
//!
//! Every staking identity, a miner or a fleet contract, holds four buckets:
//!
//! ```text
//! Stake(amount) ──► pending ──(stake window)──► confirmed
//!                                                  │
//!                                   Unstake(amount)│
//!                                                  ▼
//!        Withdraw() ◄── claimable ◄──(unstake window)── locked
//! ```
//!
//! Maturation is driven purely by block height. Mutating calls settle matured
//! buckets before applying themselves; reads compute the settled view without
//! touching state, so a query after enough blocks already shows matured values.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod ledger;
pub mod record;

pub use ledger::StakeLedger;
pub use record::StakeRecord;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Staking errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StakingError {
    /// Zero amounts are not accepted
    #[error("Amount must be greater than zero")]
    ZeroAmount,

    /// Unstake exceeds the confirmed balance
    #[error("Insufficient confirmed stake: requested {requested}, available {available}")]
    InsufficientStake {
        /// Amount requested
        requested: U256,
        /// Confirmed balance at the time of the call
        available: U256,
    },

    /// Bucket arithmetic overflowed
    #[error("Stake overflow for {0}")]
    Overflow(ParticipantKind),

    /// Bucket index outside 0..=3
    #[error("Unknown stake bucket: {0}")]
    UnknownBucket(u8),
}

/// A staking identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "address", rename_all = "lowercase")]
pub enum ParticipantKind {
    /// A miner staking with its own address
    Miner(Address),
    /// A fleet contract staked through its accountant
    Fleet(Address),
}

impl ParticipantKind {
    /// Underlying address
    pub const fn address(&self) -> Address {
        match self {
            Self::Miner(address) | Self::Fleet(address) => *address,
        }
    }

    /// Whether this is a fleet contract participant
    pub const fn is_contract(&self) -> bool {
        matches!(self, Self::Fleet(_))
    }
}

impl std::fmt::Display for ParticipantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Miner(address) => write!(f, "miner {address}"),
            Self::Fleet(address) => write!(f, "fleet {address}"),
        }
    }
}

/// Stake buckets, indexed as the registry queries expose them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Bucket {
    /// Matured stake
    Confirmed = 0,
    /// Deposited, waiting for the stake window
    Pending = 1,
    /// Unstaked, waiting for the unstake window
    Locked = 2,
    /// Unstaked and ready to withdraw
    Claimable = 3,
}

impl TryFrom<u8> for Bucket {
    type Error = StakingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Confirmed),
            1 => Ok(Self::Pending),
            2 => Ok(Self::Locked),
            3 => Ok(Self::Claimable),
            _ => Err(StakingError::UnknownBucket(value)),
        }
    }
}

impl From<Bucket> for u8 {
    fn from(bucket: Bucket) -> u8 {
        bucket as u8
    }
}

/// Block counts before stake transitions mature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaturationWindows {
    /// Blocks before pending stake becomes confirmed
    pub stake: u64,
    /// Blocks before locked stake becomes claimable
    pub unstake: u64,
}

impl MaturationWindows {
    /// Create new windows
    pub const fn new(stake: u64, unstake: u64) -> Self {
        Self { stake, unstake }
    }
}

impl Default for MaturationWindows {
    fn default() -> Self {
        Self::new(3, 3)
    }
}
