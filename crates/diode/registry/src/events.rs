//! Registry events and ticket rejection reasons

use alloy_primitives::{Address, B256, U256};
use diode_tickets::{TicketError, TicketKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a ticket in a batch was not credited
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// Words could not be decoded into a ticket
    #[error("Malformed ticket: {error}")]
    Malformed {
        /// Decoder error
        error: String,
    },

    /// Referenced block is the head, in the future, too old or unknown
    #[error("Stale ticket for block {block_height}")]
    Stale {
        /// Referenced height
        block_height: u64,
    },

    /// Signature recovery failed
    #[error("Invalid ticket signature")]
    InvalidSignature,

    /// Fleet is not deployed
    #[error("Unknown fleet {fleet}")]
    UnknownFleet {
        /// Referenced fleet
        fleet: Address,
    },

    /// Recovered device is not in the fleet's device whitelist
    #[error("Device {device} not whitelisted")]
    DeviceNotWhitelisted {
        /// Recovered device
        device: Address,
    },

    /// Recovered client is not whitelisted for the device
    #[error("Client {client} not whitelisted for device {device}")]
    ClientNotWhitelisted {
        /// Recovered device
        device: Address,
        /// Recovered client
        client: Address,
    },

    /// No counter rose above the epoch's prior maximum
    #[error("Duplicate ticket from device {device}")]
    Duplicate {
        /// Recovered device
        device: Address,
    },
}

impl From<TicketError> for RejectReason {
    fn from(err: TicketError) -> Self {
        Self::Malformed { error: err.to_string() }
    }
}

/// Externally observable registry events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum RegistryEvent {
    /// Stake deposited into the pending bucket
    Staked {
        /// Whether `target` is a fleet contract
        is_contract: bool,
        /// Miner or fleet address
        target: Address,
        /// Amount deposited
        amount: U256,
    },
    /// Confirmed stake moved into the locked bucket
    Unstaked {
        /// Whether `target` is a fleet contract
        is_contract: bool,
        /// Miner or fleet address
        target: Address,
        /// Amount locked
        amount: U256,
    },
    /// Claimable stake paid out
    Withdrawn {
        /// Whether `target` is a fleet contract
        is_contract: bool,
        /// Miner or fleet address
        target: Address,
        /// Amount paid, zero before the unstake window passed
        amount: U256,
    },
    /// Device ticket credited
    Ticket {
        /// Signing device
        device: Address,
        /// Fleet of the device
        fleet: Address,
        /// Relaying node
        node: Address,
        /// Connections credited
        connections: U256,
        /// Bytes credited
        bytes: U256,
    },
    /// Connection ticket credited
    Connection {
        /// Signing device
        device: Address,
        /// Fleet of the device
        fleet: Address,
        /// Relaying node
        node: Address,
        /// Connections credited
        connections: U256,
    },
    /// Traffic ticket credited
    Traffic {
        /// Signing device
        device: Address,
        /// Countersigning client
        client: Address,
        /// Fleet of the device
        fleet: Address,
        /// Relaying node
        node: Address,
        /// Bytes credited
        bytes: U256,
    },
    /// Reward credited to a node's confirmed stake
    Rewards {
        /// Rewarded node or coinbase
        node: Address,
        /// Amount credited
        amount: U256,
    },
    /// Ticket rejected, only when rejection events are enabled
    TicketRejected {
        /// Position in the submitted batch
        index: usize,
        /// Layout of the batch
        kind: TicketKind,
        /// Rejection cause
        reason: RejectReason,
    },
    /// Fleet deployed
    FleetCreated {
        /// Fleet address
        fleet: Address,
        /// Whitelist operator
        operator: Address,
        /// Stake accountant
        accountant: Address,
    },
    /// Fleet inventory changed
    InventoryUpdated {
        /// Fleet
        fleet: Address,
        /// Caller that made the change
        caller: Address,
        /// Inventory action name
        action: String,
        /// Created or changed group, device or tag
        item: Option<B256>,
    },
    /// Reward pool topped up
    RewardPoolFunded {
        /// Amount added
        amount: U256,
        /// Pool after the top-up
        pool: U256,
    },
}

impl RegistryEvent {
    /// Short event name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Staked { .. } => "Staked",
            Self::Unstaked { .. } => "Unstaked",
            Self::Withdrawn { .. } => "Withdrawn",
            Self::Ticket { .. } => "Ticket",
            Self::Connection { .. } => "Connection",
            Self::Traffic { .. } => "Traffic",
            Self::Rewards { .. } => "Rewards",
            Self::TicketRejected { .. } => "TicketRejected",
            Self::FleetCreated { .. } => "FleetCreated",
            Self::InventoryUpdated { .. } => "InventoryUpdated",
            Self::RewardPoolFunded { .. } => "RewardPoolFunded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = RegistryEvent::Rewards { node: Address::repeat_byte(1), amount: U256::from(5) };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "Rewards");
        assert_eq!(json["amount"], "0x5");
        assert_eq!(event.name(), "Rewards");
    }

    #[test]
    fn test_reject_reason_from_ticket_error() {
        let reason = RejectReason::from(TicketError::Truncated { expected: 8, actual: 3 });
        assert!(matches!(reason, RejectReason::Malformed { .. }));
        assert!(reason.to_string().contains("expected 8"));

        let json = serde_json::to_value(RejectReason::Stale { block_height: 3 }).unwrap();
        assert_eq!(json["reason"], "stale");
    }
}
