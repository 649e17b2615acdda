//! Diode Fleets
//!
//! A fleet groups devices under one operator. The registry consults two
//! whitelists before trusting a ticket signer:
//!
//! ```text
//! FleetContract
//! ├── deviceWhitelist[device] -> bool           (device may sign tickets)
//! ├── accessWhitelist[device][client] -> bool   (client may countersign)
//! ├── operator                                   (edits the whitelists)
//! ├── accountant                                 (pays and receives fleet stake)
//! └── inventory: users, groups, devices, tags
//! ```
//!
//! [`FleetManager`] deploys fleets at CREATE2 addresses and tracks which users
//! own or share them.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod contract;
pub mod inventory;
pub mod manager;

pub use contract::FleetContract;
pub use inventory::{
    item_id, DeviceDetails, DeviceRecord, Inventory, ItemKind, TagRecord, UserGroup, UserRecord,
};
pub use manager::{fleet_address, FleetInfo, FleetManager, FLEET_INIT_CODE_HASH};

use alloy_primitives::{Address, B256};
use thiserror::Error;

/// Fleet errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FleetError {
    /// Fleet address not deployed
    #[error("Unknown fleet: {0}")]
    UnknownFleet(Address),

    /// CREATE2 address already taken
    #[error("Fleet already exists: {0}")]
    FleetExists(Address),

    /// Caller is not the fleet operator
    #[error("{caller} is not the operator of fleet {fleet}")]
    NotOperator {
        /// Fleet address
        fleet: Address,
        /// Rejected caller
        caller: Address,
    },

    /// Caller is not the fleet accountant
    #[error("{caller} is not the accountant of fleet {fleet}")]
    NotAccountant {
        /// Fleet address
        fleet: Address,
        /// Rejected caller
        caller: Address,
    },

    /// Caller did not create the fleet
    #[error("{caller} does not own fleet {fleet}")]
    NotFleetOwner {
        /// Fleet address
        fleet: Address,
        /// Rejected caller
        caller: Address,
    },

    /// Caller is neither operator, admin nor device owner
    #[error("{caller} may not manage fleet {fleet}")]
    Unauthorized {
        /// Fleet address
        fleet: Address,
        /// Rejected caller
        caller: Address,
    },

    /// The zero address was passed where an account is required
    #[error("Zero address not allowed")]
    ZeroAddress,

    /// User already registered
    #[error("User already exists: {0}")]
    UserExists(Address),

    /// User not registered
    #[error("Unknown user: {0}")]
    UnknownUser(Address),

    /// Group id not found
    #[error("Unknown group: {0}")]
    UnknownGroup(B256),

    /// Device id not found
    #[error("Unknown device: {0}")]
    UnknownDevice(B256),

    /// Tag id not found
    #[error("Unknown tag: {0}")]
    UnknownTag(B256),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FleetError::NotOperator {
            fleet: Address::repeat_byte(1),
            caller: Address::repeat_byte(2),
        };
        assert!(err.to_string().contains("is not the operator"));
    }
}
