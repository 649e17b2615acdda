//! Ticket validation and per-epoch fraud detection

use alloy_primitives::{Address, U256};
use diode_fleet::FleetManager;
use diode_tickets::Ticket;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

use crate::{ChainView, RegistryEvent, RejectReason};

/// Identity of one epoch counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EpochKey {
    /// Fleet of the device
    pub fleet: Address,
    /// Relaying node
    pub node: Address,
    /// Signing device
    pub device: Address,
    /// `blockHeight / blocks_per_epoch`
    pub epoch: u64,
}

/// Highest counters seen for one [`EpochKey`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// Highest connection counter
    pub connections: U256,
    /// Highest byte counter
    pub bytes: U256,
}

/// Prior maximum counters per device and epoch
#[derive(Debug, Clone, Default)]
pub struct EpochLedger {
    records: HashMap<EpochKey, EpochRecord>,
}

/// Raise `prior` to `total`, returning the increase
fn raise(prior: &mut U256, total: U256) -> U256 {
    if total > *prior {
        let delta = total - *prior;
        *prior = total;
        delta
    } else {
        U256::ZERO
    }
}

impl EpochLedger {
    /// Counters recorded for `key`
    pub fn get(&self, key: &EpochKey) -> Option<&EpochRecord> {
        self.records.get(key)
    }

    /// Deltas the counters would credit, without recording them
    pub fn preview(&self, key: &EpochKey, connections: Option<U256>, bytes: Option<U256>) -> (U256, U256) {
        let mut record = self.records.get(key).copied().unwrap_or_default();
        (
            connections.map_or(U256::ZERO, |total| raise(&mut record.connections, total)),
            bytes.map_or(U256::ZERO, |total| raise(&mut record.bytes, total)),
        )
    }

    /// Record the counters, returning the credited deltas
    pub fn observe(&mut self, key: EpochKey, connections: Option<U256>, bytes: Option<U256>) -> (U256, U256) {
        let record = self.records.entry(key).or_default();
        (
            connections.map_or(U256::ZERO, |total| raise(&mut record.connections, total)),
            bytes.map_or(U256::ZERO, |total| raise(&mut record.bytes, total)),
        )
    }

    /// Drop records of epochs before `epoch`
    pub fn prune_before(&mut self, epoch: u64) -> usize {
        let before = self.records.len();
        self.records.retain(|key, _| key.epoch >= epoch);
        before - self.records.len()
    }

    /// Number of tracked counters
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no counter is tracked
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Usage credited to a node since the last reward distribution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUsage {
    /// Credited connections
    pub connections: U256,
    /// Credited bytes
    pub bytes: U256,
}

impl NodeUsage {
    /// Reward score: `bytes + connections × connection_weight`
    pub fn score(&self, connection_weight: U256) -> U256 {
        self.bytes.saturating_add(self.connections.saturating_mul(connection_weight))
    }

    /// Whether nothing was credited
    pub fn is_empty(&self) -> bool {
        self.connections.is_zero() && self.bytes.is_zero()
    }
}

/// Verifies tickets and accumulates node usage
#[derive(Debug, Clone)]
pub struct TicketValidator {
    blocks_per_epoch: u64,
    max_ticket_age: u64,
    epochs: EpochLedger,
    pruned_before: u64,
    usage: BTreeMap<Address, NodeUsage>,
}

impl TicketValidator {
    /// Create a validator
    pub fn new(blocks_per_epoch: u64, max_ticket_age: u64) -> Self {
        Self {
            blocks_per_epoch: blocks_per_epoch.max(1),
            max_ticket_age,
            epochs: EpochLedger::default(),
            pruned_before: 0,
            usage: BTreeMap::new(),
        }
    }

    /// Epoch a block height belongs to
    pub const fn epoch_of(&self, block_height: u64) -> u64 {
        block_height / self.blocks_per_epoch
    }

    /// Epoch counters
    pub const fn epochs(&self) -> &EpochLedger {
        &self.epochs
    }

    /// Usage accumulated since the last distribution
    pub const fn usage(&self) -> &BTreeMap<Address, NodeUsage> {
        &self.usage
    }

    /// Reset the accumulated usage
    pub fn clear_usage(&mut self) {
        self.usage.clear();
    }

    /// First epoch still tracked; older tickets are stale
    pub const fn pruned_before(&self) -> u64 {
        self.pruned_before
    }

    /// Drop epoch records older than `retention` epochs before `current_epoch`
    ///
    /// Tickets for dropped epochs are rejected from then on.
    pub fn prune(&mut self, current_epoch: u64, retention: u64) -> usize {
        self.pruned_before = self.pruned_before.max(current_epoch.saturating_sub(retention));
        let pruned = self.epochs.prune_before(self.pruned_before);
        if pruned > 0 {
            debug!(target: "diode::tickets", pruned, current_epoch, "Pruned epoch records");
        }
        pruned
    }

    /// Validate one ticket and credit its deltas
    ///
    /// Either the ticket is fully applied and its event returned, or nothing
    /// changes and the rejection reason is returned.
    pub fn validate<C: ChainView>(
        &mut self,
        ticket: &Ticket,
        chain: &C,
        fleets: &FleetManager,
    ) -> Result<RegistryEvent, RejectReason> {
        let anchor = *ticket.anchor();
        let head = chain.head();
        let stale = RejectReason::Stale { block_height: anchor.block_height };

        if anchor.block_height >= head
            || head - anchor.block_height > self.max_ticket_age
            || self.epoch_of(anchor.block_height) < self.pruned_before
        {
            return Err(stale);
        }
        let block_hash = chain.block_hash(anchor.block_height).ok_or(stale)?;

        let device = ticket.recover_device(block_hash).map_err(|_| RejectReason::InvalidSignature)?;
        let fleet = fleets
            .fleet(&anchor.fleet)
            .ok_or(RejectReason::UnknownFleet { fleet: anchor.fleet })?;
        if !fleet.device_whitelisted(&device) {
            return Err(RejectReason::DeviceNotWhitelisted { device });
        }

        let client = ticket.recover_client(block_hash).map_err(|_| RejectReason::InvalidSignature)?;
        if let Some(client) = client {
            if !fleet.access_whitelisted(&device, &client) {
                return Err(RejectReason::ClientNotWhitelisted { device, client });
            }
        }

        let key = EpochKey {
            fleet: anchor.fleet,
            node: anchor.node,
            device,
            epoch: self.epoch_of(anchor.block_height),
        };
        let (connections, bytes) =
            self.epochs.preview(&key, ticket.total_connections(), ticket.total_bytes());
        if connections.is_zero() && bytes.is_zero() {
            return Err(RejectReason::Duplicate { device });
        }
        self.epochs.observe(key, ticket.total_connections(), ticket.total_bytes());

        let usage = self.usage.entry(anchor.node).or_default();
        usage.connections = usage.connections.saturating_add(connections);
        usage.bytes = usage.bytes.saturating_add(bytes);

        trace!(
            target: "diode::tickets",
            kind = %ticket.kind(),
            %device,
            node = %anchor.node,
            epoch = key.epoch,
            %connections,
            %bytes,
            "Ticket credited"
        );

        let event = match (ticket, client) {
            (Ticket::Device(_), _) => RegistryEvent::Ticket {
                device,
                fleet: anchor.fleet,
                node: anchor.node,
                connections,
                bytes,
            },
            (Ticket::Connection(_), _) => {
                RegistryEvent::Connection { device, fleet: anchor.fleet, node: anchor.node, connections }
            }
            (Ticket::Traffic(_), client) => RegistryEvent::Traffic {
                device,
                client: client.unwrap_or_default(),
                fleet: anchor.fleet,
                node: anchor.node,
                bytes,
            },
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatedChain;
    use diode_tickets::{ConnectionTicket, DeviceTicket, TicketAnchor, TicketSigner, TrafficTicket};
    use alloy_primitives::B256;
    use proptest::prelude::*;

    const NODE: Address = Address::repeat_byte(0x0d);

    struct Fixture {
        chain: SimulatedChain,
        fleets: FleetManager,
        fleet: Address,
        device: TicketSigner,
        client: TicketSigner,
    }

    fn fixture() -> Fixture {
        let owner = Address::repeat_byte(0x01);
        let device = TicketSigner::from_seed("validator-device").unwrap();
        let client = TicketSigner::from_seed("validator-client").unwrap();

        let mut fleets = FleetManager::new(Address::repeat_byte(0x50));
        let fleet = fleets.create_fleet(owner, "test", 0).unwrap();
        let contract = fleets.contract_mut(&fleet).unwrap();
        contract.set_device_whitelist(owner, device.address(), true).unwrap();
        contract.set_access_whitelist(owner, device.address(), client.address(), true).unwrap();

        let mut chain = SimulatedChain::default();
        chain.mine_blocks(4);
        Fixture { chain, fleets, fleet, device, client }
    }

    impl Fixture {
        fn connection(&self, height: u64, total: u64) -> Ticket {
            let anchor = TicketAnchor::new(height, self.fleet, NODE);
            let hash = self.chain.block_hash(height).unwrap_or_default();
            ConnectionTicket::sign(anchor, hash, U256::from(total), B256::ZERO, &self.device)
                .unwrap()
                .into()
        }

        fn traffic(&self, height: u64, total: u64, client: &TicketSigner) -> Ticket {
            let anchor = TicketAnchor::new(height, self.fleet, NODE);
            let hash = self.chain.block_hash(height).unwrap();
            TrafficTicket::sign(anchor, hash, U256::from(total), B256::ZERO, &self.device, client)
                .unwrap()
                .into()
        }
    }

    #[test]
    fn test_counter_monotonicity() {
        let f = fixture();
        let mut validator = TicketValidator::new(4, 256);

        let first = validator.validate(&f.connection(1, 1), &f.chain, &f.fleets).unwrap();
        assert!(matches!(first, RegistryEvent::Connection { connections, .. } if connections == U256::from(1)));

        let again = validator.validate(&f.connection(1, 1), &f.chain, &f.fleets);
        assert_eq!(again, Err(RejectReason::Duplicate { device: f.device.address() }));

        let third = validator.validate(&f.connection(2, 2), &f.chain, &f.fleets).unwrap();
        assert!(matches!(third, RegistryEvent::Connection { connections, .. } if connections == U256::from(1)));

        assert_eq!(validator.usage()[&NODE].connections, U256::from(2));
    }

    #[test]
    fn test_epochs_are_independent() {
        let mut f = fixture();
        f.chain.mine_blocks(4);
        let mut validator = TicketValidator::new(4, 256);

        validator.validate(&f.connection(1, 5), &f.chain, &f.fleets).unwrap();
        // Epoch 1 starts from zero again
        let event = validator.validate(&f.connection(5, 5), &f.chain, &f.fleets).unwrap();
        assert!(matches!(event, RegistryEvent::Connection { connections, .. } if connections == U256::from(5)));
    }

    #[test]
    fn test_stale_tickets() {
        let f = fixture();
        let mut validator = TicketValidator::new(4, 2);

        // Head block has no hash yet
        let head = f.chain.head();
        assert_eq!(
            validator.validate(&f.connection(head, 1), &f.chain, &f.fleets),
            Err(RejectReason::Stale { block_height: head })
        );
        // Older than the configured age
        assert_eq!(
            validator.validate(&f.connection(1, 1), &f.chain, &f.fleets),
            Err(RejectReason::Stale { block_height: 1 })
        );
        assert!(validator.validate(&f.connection(2, 1), &f.chain, &f.fleets).is_ok());
    }

    #[test]
    fn test_traffic_requires_whitelisted_client() {
        let f = fixture();
        let mut validator = TicketValidator::new(4, 256);
        let stranger = TicketSigner::from_seed("stranger").unwrap();

        let rejected = validator.validate(&f.traffic(1, 100, &stranger), &f.chain, &f.fleets);
        assert_eq!(
            rejected,
            Err(RejectReason::ClientNotWhitelisted { device: f.device.address(), client: stranger.address() })
        );
        assert!(validator.usage().is_empty());

        let event = validator.validate(&f.traffic(1, 100, &f.client), &f.chain, &f.fleets).unwrap();
        assert_eq!(
            event,
            RegistryEvent::Traffic {
                device: f.device.address(),
                client: f.client.address(),
                fleet: f.fleet,
                node: NODE,
                bytes: U256::from(100),
            }
        );
    }

    #[test]
    fn test_device_ticket_counters_rise_independently() {
        let f = fixture();
        let mut validator = TicketValidator::new(4, 256);
        let device_ticket = |connections: u64, bytes: u64| -> Ticket {
            let anchor = TicketAnchor::new(1, f.fleet, NODE);
            DeviceTicket::sign(
                anchor,
                f.chain.block_hash(1).unwrap(),
                U256::from(connections),
                U256::from(bytes),
                B256::ZERO,
                &f.device,
            )
            .unwrap()
            .into()
        };

        validator.validate(&device_ticket(2, 100), &f.chain, &f.fleets).unwrap();
        let event = validator.validate(&device_ticket(2, 150), &f.chain, &f.fleets).unwrap();
        assert!(matches!(
            event,
            RegistryEvent::Ticket { connections, bytes, .. }
                if connections.is_zero() && bytes == U256::from(50)
        ));
        assert!(validator.validate(&device_ticket(1, 150), &f.chain, &f.fleets).is_err());
    }

    #[test]
    fn test_unknown_fleet_and_device() {
        let f = fixture();
        let mut validator = TicketValidator::new(4, 256);
        let intruder = TicketSigner::from_seed("intruder").unwrap();

        let anchor = TicketAnchor::new(1, f.fleet, NODE);
        let hash = f.chain.block_hash(1).unwrap();
        let ticket: Ticket = ConnectionTicket::sign(anchor, hash, U256::from(1), B256::ZERO, &intruder)
            .unwrap()
            .into();
        assert_eq!(
            validator.validate(&ticket, &f.chain, &f.fleets),
            Err(RejectReason::DeviceNotWhitelisted { device: intruder.address() })
        );

        let fleet = Address::repeat_byte(0x77);
        let anchor = TicketAnchor::new(1, fleet, NODE);
        let ticket: Ticket = ConnectionTicket::sign(anchor, hash, U256::from(1), B256::ZERO, &f.device)
            .unwrap()
            .into();
        assert_eq!(
            validator.validate(&ticket, &f.chain, &f.fleets),
            Err(RejectReason::UnknownFleet { fleet })
        );
    }

    #[test]
    fn test_pruned_epochs_stay_closed() {
        let mut f = fixture();
        f.chain.mine_blocks(16);
        let mut validator = TicketValidator::new(4, 256);

        validator.validate(&f.connection(1, 5), &f.chain, &f.fleets).unwrap();
        assert_eq!(validator.prune(validator.epoch_of(f.chain.head()), 2), 1);
        assert_eq!(validator.pruned_before(), 3);

        // Record is gone but the ticket is still young enough
        assert_eq!(
            validator.validate(&f.connection(1, 5), &f.chain, &f.fleets),
            Err(RejectReason::Stale { block_height: 1 })
        );
        assert!(validator.validate(&f.connection(12, 1), &f.chain, &f.fleets).is_ok());

        // A shorter retention later never reopens older epochs
        validator.prune(3, 5);
        assert_eq!(validator.pruned_before(), 3);
    }

    #[test]
    fn test_prune_keeps_retention_window() {
        let mut ledger = EpochLedger::default();
        for epoch in 0..5 {
            let key = EpochKey { fleet: Address::ZERO, node: NODE, device: Address::ZERO, epoch };
            ledger.observe(key, Some(U256::from(1)), None);
        }
        assert_eq!(ledger.prune_before(3), 3);
        assert_eq!(ledger.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_credited_total_equals_max_counter(counters in proptest::collection::vec(0u64..1_000, 1..20)) {
            let mut ledger = EpochLedger::default();
            let key = EpochKey { fleet: Address::ZERO, node: NODE, device: Address::ZERO, epoch: 0 };

            let mut credited = U256::ZERO;
            for total in &counters {
                let (delta, _) = ledger.observe(key, Some(U256::from(*total)), None);
                credited += delta;
            }

            let max = counters.iter().copied().max().unwrap_or_default();
            prop_assert_eq!(credited, U256::from(max));
        }
    }
}
