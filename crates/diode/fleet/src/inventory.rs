//! Fleet inventory storage: users, groups, devices and tags
//!
//! No access control happens here; [`FleetContract`](crate::FleetContract)
//! checks the caller before touching the inventory.

use alloy_primitives::{Address, Keccak256, B256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::FleetError;

/// Kind of inventory object an id was derived for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// User group
    Group,
    /// Device
    Device,
    /// Tag
    Tag,
}

impl ItemKind {
    const fn tag(self) -> &'static [u8] {
        match self {
            Self::Group => b"group",
            Self::Device => b"device",
            Self::Tag => b"tag",
        }
    }
}

/// Derive an inventory id: `keccak256(fleet ‖ kind ‖ sequence)`
pub fn item_id(fleet: Address, kind: ItemKind, sequence: u64) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(fleet);
    hasher.update(kind.tag());
    hasher.update(B256::left_padding_from(&sequence.to_be_bytes()));
    hasher.finalize()
}

/// A fleet user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// User address
    pub address: Address,
    /// Display name
    pub nickname: String,
    /// Contact email
    pub email: String,
    /// Avatar location
    pub avatar_uri: String,
    /// Admins may manage the inventory
    pub is_admin: bool,
    /// Block height of creation
    pub created_at: u64,
}

/// A named group of users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    /// Group id
    pub id: B256,
    /// Group name
    pub name: String,
    /// Free text
    pub description: String,
    /// Block height of creation
    pub created_at: u64,
    /// Creator
    pub created_by: Address,
    /// Members
    pub members: BTreeSet<Address>,
}

/// A device registered in the fleet inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Device id
    pub id: B256,
    /// Owning user
    pub owner: Address,
    /// Device name
    pub name: String,
    /// Free text
    pub description: String,
    /// Device type
    pub device_type: String,
    /// Location
    pub location: String,
    /// Block height of creation
    pub created_at: u64,
    /// Block height of the last heartbeat
    pub last_seen: u64,
    /// Key/value properties
    pub properties: BTreeMap<String, String>,
    /// Tags attached to the device
    pub tags: BTreeSet<B256>,
}

/// A tag grouping devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    /// Tag id
    pub id: B256,
    /// Tag name
    pub name: String,
    /// Free text
    pub description: String,
    /// Display color
    pub color: String,
    /// Block height of creation
    pub created_at: u64,
    /// Creator
    pub created_by: Address,
    /// Key/value properties
    pub properties: BTreeMap<String, String>,
    /// Devices carrying this tag
    pub devices: BTreeSet<B256>,
}

/// Descriptive device fields set on create and update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDetails {
    /// Device name
    pub name: String,
    /// Free text
    pub description: String,
    /// Device type
    pub device_type: String,
    /// Location
    pub location: String,
}

/// Inventory of one fleet
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    fleet: Address,
    sequence: u64,
    users: HashMap<Address, UserRecord>,
    user_order: Vec<Address>,
    groups: HashMap<B256, UserGroup>,
    group_order: Vec<B256>,
    devices: HashMap<B256, DeviceRecord>,
    device_order: Vec<B256>,
    tags: HashMap<B256, TagRecord>,
    tag_order: Vec<B256>,
}

impl Inventory {
    /// Empty inventory of `fleet`
    pub fn new(fleet: Address) -> Self {
        Self { fleet, ..Default::default() }
    }

    fn next_id(&mut self, kind: ItemKind) -> B256 {
        let id = item_id(self.fleet, kind, self.sequence);
        self.sequence += 1;
        id
    }

    // Users

    /// Add a user
    pub fn create_user(
        &mut self,
        address: Address,
        nickname: String,
        email: String,
        avatar_uri: String,
        height: u64,
    ) -> Result<(), FleetError> {
        if self.users.contains_key(&address) {
            return Err(FleetError::UserExists(address));
        }

        self.users.insert(
            address,
            UserRecord { address, nickname, email, avatar_uri, is_admin: false, created_at: height },
        );
        self.user_order.push(address);
        Ok(())
    }

    /// Replace a user's profile fields
    pub fn update_user(
        &mut self,
        address: Address,
        nickname: String,
        email: String,
        avatar_uri: String,
    ) -> Result<(), FleetError> {
        let user = self.users.get_mut(&address).ok_or(FleetError::UnknownUser(address))?;
        user.nickname = nickname;
        user.email = email;
        user.avatar_uri = avatar_uri;
        Ok(())
    }

    /// Grant or revoke admin rights
    pub fn set_user_admin(&mut self, address: Address, is_admin: bool) -> Result<(), FleetError> {
        let user = self.users.get_mut(&address).ok_or(FleetError::UnknownUser(address))?;
        user.is_admin = is_admin;
        Ok(())
    }

    /// Remove a user and its group memberships
    pub fn remove_user(&mut self, address: Address) -> Result<UserRecord, FleetError> {
        let user = self.users.remove(&address).ok_or(FleetError::UnknownUser(address))?;
        self.user_order.retain(|a| *a != address);
        for group in self.groups.values_mut() {
            group.members.remove(&address);
        }
        Ok(user)
    }

    /// Look up a user
    pub fn user(&self, address: &Address) -> Option<&UserRecord> {
        self.users.get(address)
    }

    /// Users in creation order
    pub fn users(&self) -> impl Iterator<Item = &UserRecord> {
        self.user_order.iter().filter_map(|a| self.users.get(a))
    }

    /// Whether `address` is an admin user
    pub fn is_user_admin(&self, address: &Address) -> bool {
        self.users.get(address).is_some_and(|u| u.is_admin)
    }

    /// Groups `address` belongs to
    pub fn user_groups(&self, address: &Address) -> Vec<B256> {
        self.group_order
            .iter()
            .filter(|id| self.groups.get(*id).is_some_and(|g| g.members.contains(address)))
            .copied()
            .collect()
    }

    // Groups

    /// Create a user group, returning its id
    pub fn create_group(
        &mut self,
        name: String,
        description: String,
        created_by: Address,
        height: u64,
    ) -> B256 {
        let id = self.next_id(ItemKind::Group);
        self.groups.insert(
            id,
            UserGroup {
                id,
                name,
                description,
                created_at: height,
                created_by,
                members: BTreeSet::new(),
            },
        );
        self.group_order.push(id);
        id
    }

    /// Rename a group
    pub fn update_group(&mut self, id: B256, name: String, description: String) -> Result<(), FleetError> {
        let group = self.groups.get_mut(&id).ok_or(FleetError::UnknownGroup(id))?;
        group.name = name;
        group.description = description;
        Ok(())
    }

    /// Delete a group
    pub fn remove_group(&mut self, id: B256) -> Result<UserGroup, FleetError> {
        let group = self.groups.remove(&id).ok_or(FleetError::UnknownGroup(id))?;
        self.group_order.retain(|g| *g != id);
        Ok(group)
    }

    /// Add a registered user to a group
    pub fn add_user_to_group(&mut self, address: Address, id: B256) -> Result<(), FleetError> {
        if !self.users.contains_key(&address) {
            return Err(FleetError::UnknownUser(address));
        }
        let group = self.groups.get_mut(&id).ok_or(FleetError::UnknownGroup(id))?;
        group.members.insert(address);
        Ok(())
    }

    /// Drop a user from a group
    pub fn remove_user_from_group(&mut self, address: Address, id: B256) -> Result<(), FleetError> {
        let group = self.groups.get_mut(&id).ok_or(FleetError::UnknownGroup(id))?;
        if !group.members.remove(&address) {
            return Err(FleetError::UnknownUser(address));
        }
        Ok(())
    }

    /// Look up a group
    pub fn group(&self, id: &B256) -> Option<&UserGroup> {
        self.groups.get(id)
    }

    /// Group ids in creation order
    pub fn group_ids(&self) -> &[B256] {
        &self.group_order
    }

    // Devices

    /// Register a device owned by `owner`, returning its id
    pub fn create_device(&mut self, owner: Address, details: DeviceDetails, height: u64) -> B256 {
        let id = self.next_id(ItemKind::Device);
        let DeviceDetails { name, description, device_type, location } = details;
        self.devices.insert(
            id,
            DeviceRecord {
                id,
                owner,
                name,
                description,
                device_type,
                location,
                created_at: height,
                last_seen: height,
                properties: BTreeMap::new(),
                tags: BTreeSet::new(),
            },
        );
        self.device_order.push(id);
        id
    }

    fn device_mut(&mut self, id: B256) -> Result<&mut DeviceRecord, FleetError> {
        self.devices.get_mut(&id).ok_or(FleetError::UnknownDevice(id))
    }

    /// Replace the descriptive fields of a device
    pub fn update_device(&mut self, id: B256, details: DeviceDetails) -> Result<(), FleetError> {
        let device = self.device_mut(id)?;
        device.name = details.name;
        device.description = details.description;
        device.device_type = details.device_type;
        device.location = details.location;
        Ok(())
    }

    /// Record a heartbeat
    pub fn touch_device(&mut self, id: B256, height: u64) -> Result<(), FleetError> {
        self.device_mut(id)?.last_seen = height;
        Ok(())
    }

    /// Hand a device to another owner
    pub fn transfer_device(&mut self, id: B256, new_owner: Address) -> Result<(), FleetError> {
        if new_owner.is_zero() {
            return Err(FleetError::ZeroAddress);
        }
        self.device_mut(id)?.owner = new_owner;
        Ok(())
    }

    /// Delete a device and detach it from its tags
    pub fn remove_device(&mut self, id: B256) -> Result<DeviceRecord, FleetError> {
        let device = self.devices.remove(&id).ok_or(FleetError::UnknownDevice(id))?;
        self.device_order.retain(|d| *d != id);
        for tag in &device.tags {
            if let Some(tag) = self.tags.get_mut(tag) {
                tag.devices.remove(&id);
            }
        }
        Ok(device)
    }

    /// Set a device property
    pub fn set_device_property(&mut self, id: B256, key: String, value: String) -> Result<(), FleetError> {
        self.device_mut(id)?.properties.insert(key, value);
        Ok(())
    }

    /// Look up a device
    pub fn device(&self, id: &B256) -> Option<&DeviceRecord> {
        self.devices.get(id)
    }

    /// Device property, if set
    pub fn device_property(&self, id: &B256, key: &str) -> Option<&str> {
        self.devices.get(id)?.properties.get(key).map(String::as_str)
    }

    /// Device ids in creation order
    pub fn device_ids(&self) -> &[B256] {
        &self.device_order
    }

    /// Devices owned by `owner`
    pub fn user_devices(&self, owner: &Address) -> Vec<B256> {
        self.device_order
            .iter()
            .filter(|id| self.devices.get(*id).is_some_and(|d| d.owner == *owner))
            .copied()
            .collect()
    }

    /// Whether `owner` owns device `id`
    pub fn is_device_owner(&self, owner: &Address, id: &B256) -> bool {
        self.devices.get(id).is_some_and(|d| d.owner == *owner)
    }

    // Tags

    /// Create a tag, returning its id
    pub fn create_tag(
        &mut self,
        name: String,
        description: String,
        color: String,
        created_by: Address,
        height: u64,
    ) -> B256 {
        let id = self.next_id(ItemKind::Tag);
        self.tags.insert(
            id,
            TagRecord {
                id,
                name,
                description,
                color,
                created_at: height,
                created_by,
                properties: BTreeMap::new(),
                devices: BTreeSet::new(),
            },
        );
        self.tag_order.push(id);
        id
    }

    /// Replace the descriptive fields of a tag
    pub fn update_tag(
        &mut self,
        id: B256,
        name: String,
        description: String,
        color: String,
    ) -> Result<(), FleetError> {
        let tag = self.tags.get_mut(&id).ok_or(FleetError::UnknownTag(id))?;
        tag.name = name;
        tag.description = description;
        tag.color = color;
        Ok(())
    }

    /// Delete a tag and detach it from its devices
    pub fn remove_tag(&mut self, id: B256) -> Result<TagRecord, FleetError> {
        let tag = self.tags.remove(&id).ok_or(FleetError::UnknownTag(id))?;
        self.tag_order.retain(|t| *t != id);
        for device in &tag.devices {
            if let Some(device) = self.devices.get_mut(device) {
                device.tags.remove(&id);
            }
        }
        Ok(tag)
    }

    /// Attach a tag to a device
    pub fn add_device_to_tag(&mut self, device: B256, tag: B256) -> Result<(), FleetError> {
        if !self.tags.contains_key(&tag) {
            return Err(FleetError::UnknownTag(tag));
        }
        self.device_mut(device)?.tags.insert(tag);
        if let Some(tag) = self.tags.get_mut(&tag) {
            tag.devices.insert(device);
        }
        Ok(())
    }

    /// Detach a tag from a device
    pub fn remove_device_from_tag(&mut self, device: B256, tag: B256) -> Result<(), FleetError> {
        let record = self.tags.get_mut(&tag).ok_or(FleetError::UnknownTag(tag))?;
        if !record.devices.remove(&device) {
            return Err(FleetError::UnknownDevice(device));
        }
        if let Some(device) = self.devices.get_mut(&device) {
            device.tags.remove(&tag);
        }
        Ok(())
    }

    /// Set a tag property
    pub fn set_tag_property(&mut self, id: B256, key: String, value: String) -> Result<(), FleetError> {
        let tag = self.tags.get_mut(&id).ok_or(FleetError::UnknownTag(id))?;
        tag.properties.insert(key, value);
        Ok(())
    }

    /// Look up a tag
    pub fn tag(&self, id: &B256) -> Option<&TagRecord> {
        self.tags.get(id)
    }

    /// Tag property, if set
    pub fn tag_property(&self, id: &B256, key: &str) -> Option<&str> {
        self.tags.get(id)?.properties.get(key).map(String::as_str)
    }

    /// Tag ids in creation order
    pub fn tag_ids(&self) -> &[B256] {
        &self.tag_order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory() -> Inventory {
        Inventory::new(Address::repeat_byte(0xf1))
    }

    fn details(name: &str) -> DeviceDetails {
        DeviceDetails { name: name.into(), device_type: "sensor".into(), ..Default::default() }
    }

    #[test]
    fn test_item_ids_are_distinct() {
        let fleet = Address::repeat_byte(1);
        assert_ne!(item_id(fleet, ItemKind::Device, 0), item_id(fleet, ItemKind::Tag, 0));
        assert_ne!(item_id(fleet, ItemKind::Device, 0), item_id(fleet, ItemKind::Device, 1));
        assert_ne!(
            item_id(fleet, ItemKind::Device, 0),
            item_id(Address::repeat_byte(2), ItemKind::Device, 0)
        );
        assert_eq!(item_id(fleet, ItemKind::Group, 3), item_id(fleet, ItemKind::Group, 3));
    }

    #[test]
    fn test_user_lifecycle() {
        let mut inv = inventory();
        let alice = Address::repeat_byte(0xa1);

        inv.create_user(alice, "alice".into(), String::new(), String::new(), 5).unwrap();
        assert_eq!(
            inv.create_user(alice, "again".into(), String::new(), String::new(), 6),
            Err(FleetError::UserExists(alice))
        );

        inv.set_user_admin(alice, true).unwrap();
        assert!(inv.is_user_admin(&alice));

        let group = inv.create_group("ops".into(), String::new(), alice, 7);
        inv.add_user_to_group(alice, group).unwrap();
        assert_eq!(inv.user_groups(&alice), vec![group]);

        inv.remove_user(alice).unwrap();
        assert!(inv.user(&alice).is_none());
        assert!(inv.group(&group).unwrap().members.is_empty());
    }

    #[test]
    fn test_device_tags_stay_consistent() {
        let mut inv = inventory();
        let owner = Address::repeat_byte(0xa1);
        let device = inv.create_device(owner, details("cam"), 1);
        let tag = inv.create_tag("outdoor".into(), String::new(), "green".into(), owner, 1);

        inv.add_device_to_tag(device, tag).unwrap();
        assert!(inv.device(&device).unwrap().tags.contains(&tag));
        assert!(inv.tag(&tag).unwrap().devices.contains(&device));

        inv.remove_tag(tag).unwrap();
        assert!(inv.device(&device).unwrap().tags.is_empty());
        assert_eq!(inv.remove_device_from_tag(device, tag), Err(FleetError::UnknownTag(tag)));
    }

    #[test]
    fn test_device_updates() {
        let mut inv = inventory();
        let owner = Address::repeat_byte(0xa1);
        let other = Address::repeat_byte(0xb2);
        let device = inv.create_device(owner, details("cam"), 1);

        inv.update_device(device, details("camera")).unwrap();
        inv.touch_device(device, 9).unwrap();
        inv.set_device_property(device, "fw".into(), "1.2".into()).unwrap();
        assert_eq!(inv.device(&device).unwrap().name, "camera");
        assert_eq!(inv.device(&device).unwrap().last_seen, 9);
        assert_eq!(inv.device_property(&device, "fw"), Some("1.2"));
        assert_eq!(inv.device_property(&device, "missing"), None);

        inv.transfer_device(device, other).unwrap();
        assert!(inv.is_device_owner(&other, &device));
        assert_eq!(inv.user_devices(&owner), Vec::<B256>::new());
        assert_eq!(inv.transfer_device(device, Address::ZERO), Err(FleetError::ZeroAddress));

        inv.remove_device(device).unwrap();
        assert!(inv.device_ids().is_empty());
    }
}
