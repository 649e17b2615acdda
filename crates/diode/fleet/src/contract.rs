//! Fleet contract: whitelists gating ticket signers plus the guarded inventory

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::{
    inventory::{DeviceDetails, Inventory},
    FleetError,
};

/// One deployed fleet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetContract {
    address: Address,
    operator: Address,
    accountant: Address,
    label: String,
    created_at: u64,
    updated_at: u64,
    device_whitelist: BTreeSet<Address>,
    access_whitelist: BTreeMap<Address, BTreeSet<Address>>,
    inventory: Inventory,
}

impl FleetContract {
    /// Deploy a fleet at `address`
    pub fn new(
        address: Address,
        operator: Address,
        accountant: Address,
        label: impl Into<String>,
        height: u64,
    ) -> Self {
        Self {
            address,
            operator,
            accountant,
            label: label.into(),
            created_at: height,
            updated_at: height,
            device_whitelist: BTreeSet::new(),
            access_whitelist: BTreeMap::new(),
            inventory: Inventory::new(address),
        }
    }

    /// Fleet address
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Operator managing the whitelists
    pub const fn operator(&self) -> Address {
        self.operator
    }

    /// Accountant paying for and receiving the fleet stake
    pub const fn accountant(&self) -> Address {
        self.accountant
    }

    /// Human readable label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Block height of deployment
    pub const fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Block height of the last label change
    pub const fn updated_at(&self) -> u64 {
        self.updated_at
    }

    /// Read-only inventory
    pub const fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    fn ensure_operator(&self, caller: Address) -> Result<(), FleetError> {
        if caller != self.operator {
            return Err(FleetError::NotOperator { fleet: self.address, caller });
        }
        Ok(())
    }

    /// Whether `caller` may manage the inventory: the operator or an admin user
    pub fn is_manager(&self, caller: &Address) -> bool {
        *caller == self.operator || self.inventory.is_user_admin(caller)
    }

    fn ensure_manager(&self, caller: Address) -> Result<(), FleetError> {
        if !self.is_manager(&caller) {
            return Err(FleetError::Unauthorized { fleet: self.address, caller });
        }
        Ok(())
    }

    fn ensure_device_access(&self, caller: Address, device: B256) -> Result<(), FleetError> {
        if self.is_manager(&caller) || self.inventory.is_device_owner(&caller, &device) {
            return Ok(());
        }
        Err(FleetError::Unauthorized { fleet: self.address, caller })
    }

    // Whitelists

    /// Allow or revoke a device as ticket signer
    pub fn set_device_whitelist(
        &mut self,
        caller: Address,
        device: Address,
        allowed: bool,
    ) -> Result<(), FleetError> {
        self.ensure_operator(caller)?;
        if allowed {
            self.device_whitelist.insert(device);
        } else {
            self.device_whitelist.remove(&device);
        }

        debug!(target: "diode::fleet", fleet = %self.address, %device, allowed, "Device whitelist updated");
        Ok(())
    }

    /// Allow or revoke `client` as countersigner for `device`
    pub fn set_access_whitelist(
        &mut self,
        caller: Address,
        device: Address,
        client: Address,
        allowed: bool,
    ) -> Result<(), FleetError> {
        self.ensure_operator(caller)?;
        if allowed {
            self.access_whitelist.entry(device).or_default().insert(client);
        } else if let Some(clients) = self.access_whitelist.get_mut(&device) {
            clients.remove(&client);
            if clients.is_empty() {
                self.access_whitelist.remove(&device);
            }
        }

        debug!(target: "diode::fleet", fleet = %self.address, %device, %client, allowed, "Access whitelist updated");
        Ok(())
    }

    /// Whether `device` may sign tickets for this fleet
    pub fn device_whitelisted(&self, device: &Address) -> bool {
        self.device_whitelist.contains(device)
    }

    /// Whether `client` may countersign tickets of `device`
    pub fn access_whitelisted(&self, device: &Address, client: &Address) -> bool {
        self.access_whitelist.get(device).is_some_and(|clients| clients.contains(client))
    }

    /// Change the label
    pub fn update_label(
        &mut self,
        caller: Address,
        label: impl Into<String>,
        height: u64,
    ) -> Result<(), FleetError> {
        self.ensure_operator(caller)?;
        self.label = label.into();
        self.updated_at = height;
        Ok(())
    }

    pub(crate) fn set_label(&mut self, label: String, height: u64) {
        self.label = label;
        self.updated_at = height;
    }

    // Users

    /// Register a user
    pub fn create_user(
        &mut self,
        caller: Address,
        user: Address,
        nickname: impl Into<String>,
        email: impl Into<String>,
        avatar_uri: impl Into<String>,
        height: u64,
    ) -> Result<(), FleetError> {
        self.ensure_manager(caller)?;
        if user.is_zero() {
            return Err(FleetError::ZeroAddress);
        }
        self.inventory.create_user(user, nickname.into(), email.into(), avatar_uri.into(), height)
    }

    /// Update a user's profile; users may update their own
    pub fn update_user(
        &mut self,
        caller: Address,
        user: Address,
        nickname: impl Into<String>,
        email: impl Into<String>,
        avatar_uri: impl Into<String>,
    ) -> Result<(), FleetError> {
        if caller != user {
            self.ensure_manager(caller)?;
        }
        self.inventory.update_user(user, nickname.into(), email.into(), avatar_uri.into())
    }

    /// Grant or revoke admin rights; operator only
    pub fn set_user_admin(&mut self, caller: Address, user: Address, is_admin: bool) -> Result<(), FleetError> {
        self.ensure_operator(caller)?;
        self.inventory.set_user_admin(user, is_admin)
    }

    /// Remove a user
    pub fn remove_user(&mut self, caller: Address, user: Address) -> Result<(), FleetError> {
        self.ensure_manager(caller)?;
        self.inventory.remove_user(user).map(drop)
    }

    /// Whether `user` is an admin
    pub fn is_user_admin(&self, user: &Address) -> bool {
        self.inventory.is_user_admin(user)
    }

    // Groups

    /// Create a user group
    pub fn create_user_group(
        &mut self,
        caller: Address,
        name: impl Into<String>,
        description: impl Into<String>,
        height: u64,
    ) -> Result<B256, FleetError> {
        self.ensure_manager(caller)?;
        Ok(self.inventory.create_group(name.into(), description.into(), caller, height))
    }

    /// Rename a user group
    pub fn update_user_group(
        &mut self,
        caller: Address,
        group: B256,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<(), FleetError> {
        self.ensure_manager(caller)?;
        self.inventory.update_group(group, name.into(), description.into())
    }

    /// Delete a user group
    pub fn remove_user_group(&mut self, caller: Address, group: B256) -> Result<(), FleetError> {
        self.ensure_manager(caller)?;
        self.inventory.remove_group(group).map(drop)
    }

    /// Add a user to a group
    pub fn add_user_to_group(&mut self, caller: Address, user: Address, group: B256) -> Result<(), FleetError> {
        self.ensure_manager(caller)?;
        self.inventory.add_user_to_group(user, group)
    }

    /// Drop a user from a group
    pub fn remove_user_from_group(
        &mut self,
        caller: Address,
        user: Address,
        group: B256,
    ) -> Result<(), FleetError> {
        self.ensure_manager(caller)?;
        self.inventory.remove_user_from_group(user, group)
    }

    // Devices

    /// Register a device owned by the caller
    pub fn create_device(
        &mut self,
        caller: Address,
        details: DeviceDetails,
        height: u64,
    ) -> Result<B256, FleetError> {
        self.ensure_manager(caller)?;
        let id = self.inventory.create_device(caller, details, height);
        debug!(target: "diode::fleet", fleet = %self.address, %id, "Device created");
        Ok(id)
    }

    /// Update the descriptive fields of a device
    pub fn update_device(&mut self, caller: Address, device: B256, details: DeviceDetails) -> Result<(), FleetError> {
        self.ensure_device_access(caller, device)?;
        self.inventory.update_device(device, details)
    }

    /// Record a heartbeat for a device
    pub fn update_device_last_seen(&mut self, caller: Address, device: B256, height: u64) -> Result<(), FleetError> {
        self.ensure_device_access(caller, device)?;
        self.inventory.touch_device(device, height)
    }

    /// Hand a device to another owner
    pub fn transfer_device_ownership(
        &mut self,
        caller: Address,
        device: B256,
        new_owner: Address,
    ) -> Result<(), FleetError> {
        self.ensure_device_access(caller, device)?;
        self.inventory.transfer_device(device, new_owner)
    }

    /// Delete a device
    pub fn remove_device(&mut self, caller: Address, device: B256) -> Result<(), FleetError> {
        self.ensure_manager(caller)?;
        self.inventory.remove_device(device).map(drop)
    }

    /// Set a device property
    pub fn set_device_property(
        &mut self,
        caller: Address,
        device: B256,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), FleetError> {
        self.ensure_device_access(caller, device)?;
        self.inventory.set_device_property(device, key.into(), value.into())
    }

    // Tags

    /// Create a tag
    pub fn create_tag(
        &mut self,
        caller: Address,
        name: impl Into<String>,
        description: impl Into<String>,
        color: impl Into<String>,
        height: u64,
    ) -> Result<B256, FleetError> {
        self.ensure_manager(caller)?;
        Ok(self.inventory.create_tag(name.into(), description.into(), color.into(), caller, height))
    }

    /// Update a tag
    pub fn update_tag(
        &mut self,
        caller: Address,
        tag: B256,
        name: impl Into<String>,
        description: impl Into<String>,
        color: impl Into<String>,
    ) -> Result<(), FleetError> {
        self.ensure_manager(caller)?;
        self.inventory.update_tag(tag, name.into(), description.into(), color.into())
    }

    /// Delete a tag
    pub fn remove_tag(&mut self, caller: Address, tag: B256) -> Result<(), FleetError> {
        self.ensure_manager(caller)?;
        self.inventory.remove_tag(tag).map(drop)
    }

    /// Attach a tag to a device
    pub fn add_device_to_tag(&mut self, caller: Address, device: B256, tag: B256) -> Result<(), FleetError> {
        self.ensure_manager(caller)?;
        self.inventory.add_device_to_tag(device, tag)
    }

    /// Detach a tag from a device
    pub fn remove_device_from_tag(&mut self, caller: Address, device: B256, tag: B256) -> Result<(), FleetError> {
        self.ensure_manager(caller)?;
        self.inventory.remove_device_from_tag(device, tag)
    }

    /// Set a tag property
    pub fn set_tag_property(
        &mut self,
        caller: Address,
        tag: B256,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), FleetError> {
        self.ensure_manager(caller)?;
        self.inventory.set_tag_property(tag, key.into(), value.into())
    }
}
