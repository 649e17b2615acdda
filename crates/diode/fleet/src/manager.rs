//! Fleet manager: deploys fleets and tracks ownership and sharing

use alloy_primitives::{b256, keccak256, Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use crate::{FleetContract, FleetError};

/// Init code hash of the fleet contract deployed by the registry
pub const FLEET_INIT_CODE_HASH: B256 =
    b256!("0x5f1f5d0e1b2a98a3d3c7f3f0a53e9a4b1e2d6c8f4a7b9c0d1e2f3a4b5c6d7e8f");

/// Ownership summary of one fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetInfo {
    /// Creator of the fleet
    pub owner: Address,
    /// Fleet address
    pub fleet: Address,
    /// Block height of creation
    pub created_at: u64,
    /// Block height of the last label change
    pub updated_at: u64,
}

/// Deterministic fleet address for `creator`'s `nonce`-th deployment
///
/// CREATE2 from `registry` with salt `keccak256(creator ‖ nonce)`.
pub fn fleet_address(registry: Address, creator: Address, nonce: u64) -> Address {
    let mut preimage = [0u8; 52];
    preimage[..20].copy_from_slice(creator.as_slice());
    preimage[20..].copy_from_slice(B256::left_padding_from(&nonce.to_be_bytes()).as_slice());
    let salt = keccak256(preimage);
    registry.create2(salt.0, FLEET_INIT_CODE_HASH.0)
}

/// All fleets known to a registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetManager {
    registry: Address,
    fleets: BTreeMap<Address, FleetContract>,
    owners: HashMap<Address, Address>,
    own: HashMap<Address, Vec<Address>>,
    users: HashMap<Address, Vec<Address>>,
    shared: HashMap<Address, Vec<Address>>,
    nonces: HashMap<Address, u64>,
}

impl FleetManager {
    /// Manager deploying from `registry`
    pub fn new(registry: Address) -> Self {
        Self { registry, ..Default::default() }
    }

    /// Registry address fleets are derived from
    pub const fn registry(&self) -> Address {
        self.registry
    }

    fn deploy(
        &mut self,
        creator: Address,
        operator: Address,
        accountant: Address,
        label: String,
        height: u64,
    ) -> Result<Address, FleetError> {
        if operator.is_zero() || accountant.is_zero() {
            return Err(FleetError::ZeroAddress);
        }

        let nonce = self.nonces.entry(creator).or_default();
        let address = fleet_address(self.registry, creator, *nonce);
        if self.fleets.contains_key(&address) {
            return Err(FleetError::FleetExists(address));
        }
        *nonce += 1;

        self.fleets.insert(address, FleetContract::new(address, operator, accountant, label, height));
        self.owners.insert(address, creator);
        self.own.entry(creator).or_default().push(address);

        info!(target: "diode::fleet", fleet = %address, %creator, %operator, %accountant, "Fleet deployed");
        Ok(address)
    }

    /// Deploy a fleet operated and paid for by `owner`
    pub fn create_fleet(
        &mut self,
        owner: Address,
        label: impl Into<String>,
        height: u64,
    ) -> Result<Address, FleetError> {
        self.deploy(owner, owner, owner, label.into(), height)
    }

    /// Deploy a fleet operated by `operator` with `caller` as accountant
    pub fn delegate_contract_create(
        &mut self,
        caller: Address,
        operator: Address,
        height: u64,
    ) -> Result<Address, FleetError> {
        self.deploy(caller, operator, caller, String::new(), height)
    }

    /// Look up a fleet
    pub fn fleet(&self, fleet: &Address) -> Option<&FleetContract> {
        self.fleets.get(fleet)
    }

    /// Look up a fleet, failing when unknown
    pub fn contract(&self, fleet: &Address) -> Result<&FleetContract, FleetError> {
        self.fleets.get(fleet).ok_or(FleetError::UnknownFleet(*fleet))
    }

    /// Mutable fleet, failing when unknown
    pub fn contract_mut(&mut self, fleet: &Address) -> Result<&mut FleetContract, FleetError> {
        self.fleets.get_mut(fleet).ok_or(FleetError::UnknownFleet(*fleet))
    }

    /// All fleets ordered by address
    pub fn fleets(&self) -> impl Iterator<Item = &FleetContract> {
        self.fleets.values()
    }

    /// Number of fleets
    pub fn len(&self) -> usize {
        self.fleets.len()
    }

    /// Whether no fleet was deployed yet
    pub fn is_empty(&self) -> bool {
        self.fleets.is_empty()
    }

    fn ensure_owner(&self, caller: Address, fleet: Address) -> Result<(), FleetError> {
        match self.owners.get(&fleet) {
            Some(owner) if *owner == caller => Ok(()),
            Some(_) => Err(FleetError::NotFleetOwner { fleet, caller }),
            None => Err(FleetError::UnknownFleet(fleet)),
        }
    }

    /// Change a fleet label; owner only
    pub fn update_fleet_label(
        &mut self,
        caller: Address,
        fleet: Address,
        label: impl Into<String>,
        height: u64,
    ) -> Result<(), FleetError> {
        self.ensure_owner(caller, fleet)?;
        self.contract_mut(&fleet)?.set_label(label.into(), height);
        Ok(())
    }

    /// Share a fleet with `user`; owner only
    pub fn add_fleet_user(&mut self, caller: Address, fleet: Address, user: Address) -> Result<(), FleetError> {
        self.ensure_owner(caller, fleet)?;
        if user.is_zero() {
            return Err(FleetError::ZeroAddress);
        }

        let users = self.users.entry(fleet).or_default();
        if users.contains(&user) {
            return Err(FleetError::UserExists(user));
        }
        users.push(user);
        self.shared.entry(user).or_default().push(fleet);

        info!(target: "diode::fleet", %fleet, %user, "Fleet shared");
        Ok(())
    }

    /// Stop sharing a fleet with `user`; owner only
    pub fn remove_fleet_user(&mut self, caller: Address, fleet: Address, user: Address) -> Result<(), FleetError> {
        self.ensure_owner(caller, fleet)?;

        let users = self.users.entry(fleet).or_default();
        let before = users.len();
        users.retain(|u| *u != user);
        if users.len() == before {
            return Err(FleetError::UnknownUser(user));
        }
        if let Some(fleets) = self.shared.get_mut(&user) {
            fleets.retain(|f| *f != fleet);
        }
        Ok(())
    }

    /// Users a fleet is shared with
    pub fn fleet_users(&self, fleet: &Address) -> &[Address] {
        self.users.get(fleet).map(Vec::as_slice).unwrap_or_default()
    }

    fn info(&self, fleet: &Address) -> Option<FleetInfo> {
        let contract = self.fleets.get(fleet)?;
        Some(FleetInfo {
            owner: *self.owners.get(fleet)?,
            fleet: *fleet,
            created_at: contract.created_at(),
            updated_at: contract.updated_at(),
        })
    }

    /// Fleets created by `owner`
    pub fn own_fleets(&self, owner: &Address) -> Vec<FleetInfo> {
        self.own.get(owner).into_iter().flatten().filter_map(|f| self.info(f)).collect()
    }

    /// Fleets shared with `user`
    pub fn shared_fleets(&self, user: &Address) -> Vec<FleetInfo> {
        self.shared.get(user).into_iter().flatten().filter_map(|f| self.info(f)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: Address = Address::repeat_byte(0x50);
    const OWNER: Address = Address::repeat_byte(0x01);
    const FRIEND: Address = Address::repeat_byte(0x02);

    #[test]
    fn test_fleet_address_is_deterministic() {
        let a = fleet_address(REGISTRY, OWNER, 0);
        assert_eq!(a, fleet_address(REGISTRY, OWNER, 0));
        assert_ne!(a, fleet_address(REGISTRY, OWNER, 1));
        assert_ne!(a, fleet_address(REGISTRY, FRIEND, 0));
        assert_ne!(a, fleet_address(Address::repeat_byte(0x51), OWNER, 0));
    }

    #[test]
    fn test_create_fleet() {
        let mut manager = FleetManager::new(REGISTRY);
        let first = manager.create_fleet(OWNER, "home", 3).unwrap();
        let second = manager.create_fleet(OWNER, "office", 4).unwrap();

        assert_eq!(first, fleet_address(REGISTRY, OWNER, 0));
        assert_eq!(second, fleet_address(REGISTRY, OWNER, 1));

        let fleet = manager.contract(&first).unwrap();
        assert_eq!(fleet.operator(), OWNER);
        assert_eq!(fleet.accountant(), OWNER);
        assert_eq!(fleet.label(), "home");

        let own = manager.own_fleets(&OWNER);
        assert_eq!(own.len(), 2);
        assert_eq!(own[0], FleetInfo { owner: OWNER, fleet: first, created_at: 3, updated_at: 3 });
    }

    #[test]
    fn test_delegate_contract_create() {
        let mut manager = FleetManager::new(REGISTRY);
        let operator = Address::repeat_byte(0x0f);
        let fleet = manager.delegate_contract_create(OWNER, operator, 1).unwrap();

        let contract = manager.contract(&fleet).unwrap();
        assert_eq!(contract.operator(), operator);
        assert_eq!(contract.accountant(), OWNER);
        assert_eq!(manager.own_fleets(&OWNER).len(), 1);

        assert_eq!(manager.delegate_contract_create(OWNER, Address::ZERO, 1), Err(FleetError::ZeroAddress));
    }

    #[test]
    fn test_sharing() {
        let mut manager = FleetManager::new(REGISTRY);
        let fleet = manager.create_fleet(OWNER, "home", 1).unwrap();

        assert_eq!(
            manager.add_fleet_user(FRIEND, fleet, FRIEND),
            Err(FleetError::NotFleetOwner { fleet, caller: FRIEND })
        );

        manager.add_fleet_user(OWNER, fleet, FRIEND).unwrap();
        assert_eq!(manager.add_fleet_user(OWNER, fleet, FRIEND), Err(FleetError::UserExists(FRIEND)));
        assert_eq!(manager.fleet_users(&fleet), &[FRIEND]);
        assert_eq!(manager.shared_fleets(&FRIEND)[0].fleet, fleet);

        manager.update_fleet_label(OWNER, fleet, "cabin", 9).unwrap();
        assert_eq!(manager.shared_fleets(&FRIEND)[0].updated_at, 9);

        manager.remove_fleet_user(OWNER, fleet, FRIEND).unwrap();
        assert!(manager.fleet_users(&fleet).is_empty());
        assert!(manager.shared_fleets(&FRIEND).is_empty());
        assert!(manager.remove_fleet_user(OWNER, fleet, FRIEND).is_err());
    }

    #[test]
    fn test_unknown_fleet() {
        let manager = FleetManager::new(REGISTRY);
        let fleet = Address::repeat_byte(0x99);
        assert_eq!(manager.contract(&fleet).unwrap_err(), FleetError::UnknownFleet(fleet));
        assert!(manager.fleet(&fleet).is_none());
    }
}
