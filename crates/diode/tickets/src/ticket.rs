//! Ticket types

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{
    hash::{hash_words, word_from_address, word_from_u256, word_from_u64},
    TicketError, TicketKind, TicketSignature, TicketSigner,
};

/// Fields shared by every ticket kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketAnchor {
    /// Height of the block the ticket is anchored to
    pub block_height: u64,
    /// Fleet contract the device belongs to
    pub fleet: Address,
    /// Node that relayed the traffic and earns the credit
    pub node: Address,
}

impl TicketAnchor {
    /// Create a new anchor
    pub const fn new(block_height: u64, fleet: Address, node: Address) -> Self {
        Self { block_height, fleet, node }
    }

    /// Hashed prefix: the block hash stands in for the height
    fn hashed_prefix(&self, block_hash: B256) -> [B256; 3] {
        [block_hash, word_from_address(self.fleet), word_from_address(self.node)]
    }

    /// Wire prefix: the raw height
    fn wire_prefix(&self) -> [B256; 3] {
        [
            word_from_u64(self.block_height),
            word_from_address(self.fleet),
            word_from_address(self.node),
        ]
    }
}

/// Device signed ticket carrying both counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTicket {
    /// Block, fleet and node
    pub anchor: TicketAnchor,
    /// Cumulative connections in the epoch
    pub total_connections: U256,
    /// Cumulative bytes in the epoch
    pub total_bytes: U256,
    /// Opaque local address word
    pub local_address: B256,
    /// Device signature
    pub signature: TicketSignature,
}

impl DeviceTicket {
    /// Digest the device signs
    pub fn digest(&self, block_hash: B256) -> B256 {
        Self::digest_of(&self.anchor, block_hash, self.total_connections, self.total_bytes, self.local_address)
    }

    fn digest_of(
        anchor: &TicketAnchor,
        block_hash: B256,
        total_connections: U256,
        total_bytes: U256,
        local_address: B256,
    ) -> B256 {
        let [height, fleet, node] = anchor.hashed_prefix(block_hash);
        hash_words(&[
            height,
            fleet,
            node,
            word_from_u256(total_connections),
            word_from_u256(total_bytes),
            local_address,
        ])
    }

    /// Build and sign a device ticket
    pub fn sign(
        anchor: TicketAnchor,
        block_hash: B256,
        total_connections: U256,
        total_bytes: U256,
        local_address: B256,
        device: &TicketSigner,
    ) -> Result<Self, TicketError> {
        let digest = Self::digest_of(&anchor, block_hash, total_connections, total_bytes, local_address);
        Ok(Self {
            anchor,
            total_connections,
            total_bytes,
            local_address,
            signature: device.sign_digest(&digest)?,
        })
    }
}

/// Device signed connection ticket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTicket {
    /// Block, fleet and node
    pub anchor: TicketAnchor,
    /// Cumulative connections in the epoch
    pub total_connections: U256,
    /// Opaque local address word
    pub local_address: B256,
    /// Device signature
    pub signature: TicketSignature,
}

impl ConnectionTicket {
    /// Digest the device signs
    pub fn digest(&self, block_hash: B256) -> B256 {
        Self::digest_of(&self.anchor, block_hash, self.total_connections, self.local_address)
    }

    fn digest_of(
        anchor: &TicketAnchor,
        block_hash: B256,
        total_connections: U256,
        local_address: B256,
    ) -> B256 {
        let [height, fleet, node] = anchor.hashed_prefix(block_hash);
        hash_words(&[height, fleet, node, word_from_u256(total_connections), local_address])
    }

    /// Build and sign a connection ticket
    pub fn sign(
        anchor: TicketAnchor,
        block_hash: B256,
        total_connections: U256,
        local_address: B256,
        device: &TicketSigner,
    ) -> Result<Self, TicketError> {
        let digest = Self::digest_of(&anchor, block_hash, total_connections, local_address);
        Ok(Self { anchor, total_connections, local_address, signature: device.sign_digest(&digest)? })
    }
}

/// Traffic ticket signed by the device and countersigned by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficTicket {
    /// Block, fleet and node
    pub anchor: TicketAnchor,
    /// Cumulative bytes in the epoch
    pub total_bytes: U256,
    /// Identifier of the traffic destination
    pub destination_id: B256,
    /// Device signature over the ticket digest
    pub device_signature: TicketSignature,
    /// Client signature over the device signed payload
    pub client_signature: TicketSignature,
}

impl TrafficTicket {
    /// Digest the device signs
    pub fn digest(&self, block_hash: B256) -> B256 {
        Self::digest_of(&self.anchor, block_hash, self.total_bytes, self.destination_id)
    }

    fn digest_of(anchor: &TicketAnchor, block_hash: B256, total_bytes: U256, destination_id: B256) -> B256 {
        let [height, fleet, node] = anchor.hashed_prefix(block_hash);
        hash_words(&[height, fleet, node, word_from_u256(total_bytes), destination_id])
    }

    /// Digest the client signs: the device digest followed by the device signature
    pub fn client_digest(device_digest: B256, device_signature: &TicketSignature) -> B256 {
        let [r, s, v] = device_signature.to_words();
        hash_words(&[device_digest, r, s, v])
    }

    /// Build a traffic ticket signed by `device` and countersigned by `client`
    pub fn sign(
        anchor: TicketAnchor,
        block_hash: B256,
        total_bytes: U256,
        destination_id: B256,
        device: &TicketSigner,
        client: &TicketSigner,
    ) -> Result<Self, TicketError> {
        let digest = Self::digest_of(&anchor, block_hash, total_bytes, destination_id);
        let device_signature = device.sign_digest(&digest)?;
        let client_signature = client.sign_digest(&Self::client_digest(digest, &device_signature))?;
        Ok(Self { anchor, total_bytes, destination_id, device_signature, client_signature })
    }
}

/// A decoded ticket of any kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Ticket {
    /// Combined counters
    Device(DeviceTicket),
    /// Connections only
    Connection(ConnectionTicket),
    /// Bytes with a client countersignature
    Traffic(TrafficTicket),
}

impl Ticket {
    /// Layout of this ticket
    pub const fn kind(&self) -> TicketKind {
        match self {
            Self::Device(_) => TicketKind::Device,
            Self::Connection(_) => TicketKind::Connection,
            Self::Traffic(_) => TicketKind::Traffic,
        }
    }

    /// Block, fleet and node of this ticket
    pub const fn anchor(&self) -> &TicketAnchor {
        match self {
            Self::Device(t) => &t.anchor,
            Self::Connection(t) => &t.anchor,
            Self::Traffic(t) => &t.anchor,
        }
    }

    /// Digest signed by the device
    pub fn device_digest(&self, block_hash: B256) -> B256 {
        match self {
            Self::Device(t) => t.digest(block_hash),
            Self::Connection(t) => t.digest(block_hash),
            Self::Traffic(t) => t.digest(block_hash),
        }
    }

    /// Signature made by the device
    pub const fn device_signature(&self) -> &TicketSignature {
        match self {
            Self::Device(t) => &t.signature,
            Self::Connection(t) => &t.signature,
            Self::Traffic(t) => &t.device_signature,
        }
    }

    /// Cumulative connection counter, if the ticket carries one
    pub const fn total_connections(&self) -> Option<U256> {
        match self {
            Self::Device(t) => Some(t.total_connections),
            Self::Connection(t) => Some(t.total_connections),
            Self::Traffic(_) => None,
        }
    }

    /// Cumulative byte counter, if the ticket carries one
    pub const fn total_bytes(&self) -> Option<U256> {
        match self {
            Self::Device(t) => Some(t.total_bytes),
            Self::Connection(_) => None,
            Self::Traffic(t) => Some(t.total_bytes),
        }
    }

    /// Recover the device address against the referenced block hash
    pub fn recover_device(&self, block_hash: B256) -> Result<Address, TicketError> {
        self.device_signature().recover(&self.device_digest(block_hash))
    }

    /// Recover the client address of a traffic ticket
    ///
    /// Returns `Ok(None)` for kinds without a client signature.
    pub fn recover_client(&self, block_hash: B256) -> Result<Option<Address>, TicketError> {
        match self {
            Self::Traffic(t) => {
                let digest = TrafficTicket::client_digest(t.digest(block_hash), &t.device_signature);
                t.client_signature.recover(&digest).map(Some)
            }
            Self::Device(_) | Self::Connection(_) => Ok(None),
        }
    }

    /// Encode to wire words
    pub fn to_words(&self) -> Vec<B256> {
        let mut words = Vec::with_capacity(self.kind().word_count());
        words.extend(self.anchor().wire_prefix());
        match self {
            Self::Device(t) => {
                words.push(word_from_u256(t.total_connections));
                words.push(word_from_u256(t.total_bytes));
                words.push(t.local_address);
                words.extend(t.signature.to_words());
            }
            Self::Connection(t) => {
                words.push(word_from_u256(t.total_connections));
                words.push(t.local_address);
                words.extend(t.signature.to_words());
            }
            Self::Traffic(t) => {
                words.push(word_from_u256(t.total_bytes));
                words.push(t.destination_id);
                words.extend(t.device_signature.to_words());
                words.extend(t.client_signature.to_words());
            }
        }
        words
    }
}

impl From<DeviceTicket> for Ticket {
    fn from(ticket: DeviceTicket) -> Self {
        Self::Device(ticket)
    }
}

impl From<ConnectionTicket> for Ticket {
    fn from(ticket: ConnectionTicket) -> Self {
        Self::Connection(ticket)
    }
}

impl From<TrafficTicket> for Ticket {
    fn from(ticket: TrafficTicket) -> Self {
        Self::Traffic(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;

    fn anchor() -> TicketAnchor {
        TicketAnchor::new(10, Address::repeat_byte(0xf1), Address::repeat_byte(0x0d))
    }

    #[test]
    fn test_connection_ticket_recovers_device() {
        let device = TicketSigner::from_seed("device").unwrap();
        let block_hash = keccak256(b"block-10");
        let ticket: Ticket =
            ConnectionTicket::sign(anchor(), block_hash, U256::from(1), B256::ZERO, &device)
                .unwrap()
                .into();

        assert_eq!(ticket.recover_device(block_hash).unwrap(), device.address());
        assert_eq!(ticket.recover_client(block_hash).unwrap(), None);
        assert_eq!(ticket.total_connections(), Some(U256::from(1)));
        assert_eq!(ticket.total_bytes(), None);
    }

    #[test]
    fn test_wrong_block_hash_breaks_recovery() {
        let device = TicketSigner::from_seed("device").unwrap();
        let block_hash = keccak256(b"block-10");
        let ticket: Ticket =
            ConnectionTicket::sign(anchor(), block_hash, U256::from(1), B256::ZERO, &device)
                .unwrap()
                .into();

        let other = keccak256(b"block-11");
        assert_ne!(ticket.recover_device(other).ok(), Some(device.address()));
    }

    #[test]
    fn test_traffic_ticket_recovers_both() {
        let device = TicketSigner::from_seed("device").unwrap();
        let client = TicketSigner::from_seed("client").unwrap();
        let block_hash = keccak256(b"block-10");
        let ticket: Ticket = TrafficTicket::sign(
            anchor(),
            block_hash,
            U256::from(0xff),
            B256::repeat_byte(7),
            &device,
            &client,
        )
        .unwrap()
        .into();

        assert_eq!(ticket.recover_device(block_hash).unwrap(), device.address());
        assert_eq!(ticket.recover_client(block_hash).unwrap(), Some(client.address()));
        assert_eq!(ticket.to_words().len(), TicketKind::Traffic.word_count());
    }

    #[test]
    fn test_device_digest_field_order() {
        // blockHash | fleet | node | connections | bytes | local
        let block_hash = B256::repeat_byte(0xbb);
        let ticket = DeviceTicket {
            anchor: anchor(),
            total_connections: U256::from(1),
            total_bytes: U256::from(2),
            local_address: B256::repeat_byte(3),
            signature: TicketSignature { r: B256::ZERO, s: B256::ZERO, v: 27 },
        };

        let mut flat = Vec::new();
        flat.extend_from_slice(block_hash.as_slice());
        flat.extend_from_slice(anchor().fleet.into_word().as_slice());
        flat.extend_from_slice(anchor().node.into_word().as_slice());
        flat.extend_from_slice(&U256::from(1).to_be_bytes::<32>());
        flat.extend_from_slice(&U256::from(2).to_be_bytes::<32>());
        flat.extend_from_slice(B256::repeat_byte(3).as_slice());

        assert_eq!(ticket.digest(block_hash), keccak256(&flat));
    }
}
