//! Diode Usage Tickets
//!
//! Devices and clients sign usage tickets off-chain; relaying nodes submit them
//! to the registry as flat arrays of 32-byte words. This crate owns that
//! serialization contract:
//! - **Hashing**: keccak256 over the exact concatenation of fixed-width words
//! - **Signatures**: secp256k1 `(r, s, v)` recovery to an Ethereum address
//! - **Wire format v1**: word layouts for device, connection and traffic tickets
//!
//! # Wire format v1
//!
//! ```text
//! Device ticket (9 words):
//!   blockHeight | fleet | node | totalConnections | totalBytes | localAddress | r | s | v
//!
//! Connection ticket (8 words):
//!   blockHeight | fleet | node | totalConnections | localAddress | r | s | v
//!
//! Traffic ticket (11 words):
//!   blockHeight | fleet | node | totalBytes | destinationId | r | s | v | cr | cs | cv
//!
//! Signed digest = keccak256(blockHash ‖ fleet ‖ node ‖ counters… ‖ address)
//! Client digest = keccak256(deviceDigest ‖ r ‖ s ‖ v)
//! ```
//!
//! The height word is replaced by the referenced block's hash before hashing, so
//! a ticket can only verify against a block that was actually mined.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod hash;
pub mod signature;
pub mod ticket;
pub mod wire;

pub use hash::hash_words;
pub use signature::{public_key_address, TicketSignature, TicketSigner};
pub use ticket::{ConnectionTicket, DeviceTicket, Ticket, TicketAnchor, TrafficTicket};
pub use wire::{decode_batch, decode_ticket, encode_batch, parse_word, parse_words, WIRE_VERSION};

use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ticket decoding and verification errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TicketError {
    /// Ticket does not carry the number of words its layout requires
    #[error("Truncated ticket: expected {expected} words, got {actual}")]
    Truncated {
        /// Words required by the layout
        expected: usize,
        /// Words actually present
        actual: usize,
    },

    /// Address word has non-zero bytes above the low 20
    #[error("Invalid address word: {0}")]
    InvalidAddressWord(B256),

    /// Block height does not fit in 64 bits
    #[error("Block height out of range: {0}")]
    HeightOutOfRange(U256),

    /// Recovery byte is not one of 0, 1, 27, 28
    #[error("Invalid recovery id: {0}")]
    InvalidRecoveryId(U256),

    /// Signature scalars are malformed or recovery failed
    #[error("Invalid signature")]
    InvalidSignature,

    /// Secret key bytes are not a valid secp256k1 scalar
    #[error("Invalid signing key")]
    InvalidKey,

    /// Hex word could not be parsed
    #[error("Invalid hex word: {0}")]
    InvalidHex(String),
}

/// Ticket layouts accepted by the registry entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketKind {
    /// Combined connection and traffic counters signed by the device
    Device,
    /// Connection counter signed by the device
    Connection,
    /// Byte counter signed by the device and countersigned by the client
    Traffic,
}

impl TicketKind {
    /// Number of 32-byte words one ticket of this kind occupies on the wire
    pub const fn word_count(self) -> usize {
        match self {
            Self::Device => 9,
            Self::Connection => 8,
            Self::Traffic => 11,
        }
    }
}

impl std::fmt::Display for TicketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device => f.write_str("device"),
            Self::Connection => f.write_str("connection"),
            Self::Traffic => f.write_str("traffic"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_counts() {
        assert_eq!(TicketKind::Device.word_count(), 9);
        assert_eq!(TicketKind::Connection.word_count(), 8);
        assert_eq!(TicketKind::Traffic.word_count(), 11);
    }

    #[test]
    fn test_error_display() {
        let err = TicketError::Truncated { expected: 9, actual: 4 };
        assert!(err.to_string().contains("expected 9"));
    }
}
