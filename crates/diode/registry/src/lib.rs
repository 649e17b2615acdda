//! Diode Registry
//!
//! The on-chain accounting core of the Diode network. Relay nodes submit
//! device-signed usage tickets; the registry verifies them against recent
//! block hashes and fleet whitelists, credits only counter increases within
//! an epoch, and converts the accumulated usage into stake rewards once per
//! block.
//!
//! ```text
//!   tickets ──► TicketValidator ──► NodeUsage ──► RewardDistributor
//!                    │                                  │
//!               FleetManager                        StakeLedger
//! ```
//!
//! Everything executes at the chain's head height; see [`ChainView`].
//! [`RegistryService`] wraps a registry in a tokio actor.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod chain;
mod events;
pub mod ops;
mod registry;
pub mod rewards;
pub mod service;
pub mod validator;

pub use chain::{BlockInfo, BlockProducer, ChainView, SimulatedChain, DEFAULT_HASH_HISTORY};
pub use events::{RegistryEvent, RejectReason};
pub use ops::{InventoryOp, Operation, ReplayStep, Scenario};
pub use registry::{DiodeRegistry, Receipt, REGISTRY_ADDRESS};
pub use rewards::{FlatCurve, HalvingCurve, RewardCredit, RewardCurve, RewardDistributor};
pub use service::{
    spawn_registry_service, RegistryHandle, RegistryService, RegistrySnapshot, ServiceError,
};
pub use validator::{EpochKey, EpochLedger, EpochRecord, NodeUsage, TicketValidator};

use diode_config::ConfigError;
use diode_fleet::FleetError;
use diode_staking::StakingError;
use thiserror::Error;

/// Registry operation errors
///
/// Ticket problems never surface here: a bad ticket is dropped from its batch
/// and reported as a [`RejectReason`].
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Stake ledger rejected the operation
    #[error(transparent)]
    Staking(#[from] StakingError),

    /// Fleet lookup or authorization failed
    #[error(transparent)]
    Fleet(#[from] FleetError),

    /// Configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Block reward already distributed at this height
    #[error("Rewards already distributed at height {0}")]
    RewardAlreadyDistributed(u64),
}
