//! Serializable registry operations and scenario replay

use alloy_primitives::{Address, B256, U256};
use diode_config::RegistryConfig;
use diode_fleet::{DeviceDetails, FleetContract, FleetError};
use diode_tickets::TicketKind;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{BlockProducer, DiodeRegistry, Receipt, RegistryError, SimulatedChain};

/// One externally invoked registry operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Seal blocks, optionally switching the producer of the new head
    MineBlocks {
        /// Blocks to seal
        count: u64,
        /// Producer from the new head on
        #[serde(default)]
        coinbase: Option<Address>,
    },
    /// Deposit miner stake
    MinerStake {
        /// Staking miner
        caller: Address,
        /// Amount deposited
        amount: U256,
    },
    /// Lock confirmed miner stake
    MinerUnstake {
        /// Unstaking miner
        caller: Address,
        /// Amount locked
        amount: U256,
    },
    /// Pay out claimable miner stake
    MinerWithdraw {
        /// Withdrawing miner
        caller: Address,
    },
    /// Deposit fleet stake
    ContractStake {
        /// Fleet accountant
        caller: Address,
        /// Staked fleet
        fleet: Address,
        /// Amount deposited
        amount: U256,
    },
    /// Lock confirmed fleet stake
    ContractUnstake {
        /// Fleet accountant
        caller: Address,
        /// Unstaked fleet
        fleet: Address,
        /// Amount locked
        amount: U256,
    },
    /// Pay out claimable fleet stake
    ContractWithdraw {
        /// Fleet accountant
        caller: Address,
        /// Withdrawn fleet
        fleet: Address,
    },
    /// Deploy a fleet owned by the caller
    CreateFleet {
        /// Owner, operator and accountant
        caller: Address,
        /// Display label
        #[serde(default)]
        label: String,
    },
    /// Deploy a fleet with a separate operator
    DelegateContractCreate {
        /// Accountant
        caller: Address,
        /// Whitelist operator
        operator: Address,
    },
    /// Rename a fleet
    UpdateFleetLabel {
        /// Fleet owner
        caller: Address,
        /// Renamed fleet
        fleet: Address,
        /// New label
        label: String,
    },
    /// Share a fleet
    AddFleetUser {
        /// Fleet owner
        caller: Address,
        /// Shared fleet
        fleet: Address,
        /// User gaining access
        user: Address,
    },
    /// Stop sharing a fleet
    RemoveFleetUser {
        /// Fleet owner
        caller: Address,
        /// Shared fleet
        fleet: Address,
        /// User losing access
        user: Address,
    },
    /// Allow or revoke a device
    SetDeviceWhitelist {
        /// Fleet operator
        caller: Address,
        /// Fleet
        fleet: Address,
        /// Device
        device: Address,
        /// Whether the device may submit tickets
        allowed: bool,
    },
    /// Allow or revoke a client of a device
    SetAccessWhitelist {
        /// Fleet operator
        caller: Address,
        /// Fleet
        fleet: Address,
        /// Device
        device: Address,
        /// Client
        client: Address,
        /// Whether the client may countersign
        allowed: bool,
    },
    /// Change the user, group, device or tag inventory of a fleet
    Inventory {
        /// Fleet manager, or the device owner for device updates
        caller: Address,
        /// Fleet
        fleet: Address,
        /// Inventory change
        action: InventoryOp,
    },
    /// Submit a ticket batch
    SubmitTickets {
        /// Word layout of every ticket in the batch
        kind: TicketKind,
        /// Concatenated ticket words
        words: Vec<B256>,
    },
    /// Top up the reward pool
    FundRewardPool {
        /// Amount added
        amount: U256,
    },
    /// Distribute the block reward at the current height
    BlockReward,
}

impl Operation {
    /// Short operation name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MineBlocks { .. } => "mine_blocks",
            Self::MinerStake { .. } => "miner_stake",
            Self::MinerUnstake { .. } => "miner_unstake",
            Self::MinerWithdraw { .. } => "miner_withdraw",
            Self::ContractStake { .. } => "contract_stake",
            Self::ContractUnstake { .. } => "contract_unstake",
            Self::ContractWithdraw { .. } => "contract_withdraw",
            Self::CreateFleet { .. } => "create_fleet",
            Self::DelegateContractCreate { .. } => "delegate_contract_create",
            Self::UpdateFleetLabel { .. } => "update_fleet_label",
            Self::AddFleetUser { .. } => "add_fleet_user",
            Self::RemoveFleetUser { .. } => "remove_fleet_user",
            Self::SetDeviceWhitelist { .. } => "set_device_whitelist",
            Self::SetAccessWhitelist { .. } => "set_access_whitelist",
            Self::Inventory { .. } => "inventory",
            Self::SubmitTickets { .. } => "submit_tickets",
            Self::FundRewardPool { .. } => "fund_reward_pool",
            Self::BlockReward => "block_reward",
        }
    }
}

/// Fleet inventory change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InventoryOp {
    /// Add a user
    CreateUser {
        /// User address
        user: Address,
        /// Display name
        #[serde(default)]
        nickname: String,
        /// Contact address
        #[serde(default)]
        email: String,
        /// Avatar location
        #[serde(default)]
        avatar_uri: String,
    },
    /// Change a user's profile
    UpdateUser {
        /// User address
        user: Address,
        /// Display name
        #[serde(default)]
        nickname: String,
        /// Contact address
        #[serde(default)]
        email: String,
        /// Avatar location
        #[serde(default)]
        avatar_uri: String,
    },
    /// Grant or revoke inventory admin rights
    SetUserAdmin {
        /// User address
        user: Address,
        /// Whether the user manages the inventory
        is_admin: bool,
    },
    /// Remove a user
    RemoveUser {
        /// User address
        user: Address,
    },
    /// Add a user group
    CreateUserGroup {
        /// Group name
        name: String,
        /// Free text
        #[serde(default)]
        description: String,
    },
    /// Change a user group
    UpdateUserGroup {
        /// Group id
        group: B256,
        /// Group name
        name: String,
        /// Free text
        #[serde(default)]
        description: String,
    },
    /// Remove a user group
    RemoveUserGroup {
        /// Group id
        group: B256,
    },
    /// Add a user to a group
    AddUserToGroup {
        /// User address
        user: Address,
        /// Group id
        group: B256,
    },
    /// Remove a user from a group
    RemoveUserFromGroup {
        /// User address
        user: Address,
        /// Group id
        group: B256,
    },
    /// Register a device owned by the caller
    CreateDevice {
        /// Device description
        #[serde(default)]
        details: DeviceDetails,
    },
    /// Change a device description
    UpdateDevice {
        /// Device id
        device: B256,
        /// New description
        details: DeviceDetails,
    },
    /// Mark a device as seen at the current height
    UpdateDeviceLastSeen {
        /// Device id
        device: B256,
    },
    /// Hand a device to another user
    TransferDeviceOwnership {
        /// Device id
        device: B256,
        /// New owner
        new_owner: Address,
    },
    /// Remove a device
    RemoveDevice {
        /// Device id
        device: B256,
    },
    /// Set a device property
    SetDeviceProperty {
        /// Device id
        device: B256,
        /// Property key
        key: String,
        /// Property value
        value: String,
    },
    /// Add a tag
    CreateTag {
        /// Tag name
        name: String,
        /// Free text
        #[serde(default)]
        description: String,
        /// Display color
        #[serde(default)]
        color: String,
    },
    /// Change a tag
    UpdateTag {
        /// Tag id
        tag: B256,
        /// Tag name
        name: String,
        /// Free text
        #[serde(default)]
        description: String,
        /// Display color
        #[serde(default)]
        color: String,
    },
    /// Remove a tag
    RemoveTag {
        /// Tag id
        tag: B256,
    },
    /// Attach a tag to a device
    AddDeviceToTag {
        /// Device id
        device: B256,
        /// Tag id
        tag: B256,
    },
    /// Detach a tag from a device
    RemoveDeviceFromTag {
        /// Device id
        device: B256,
        /// Tag id
        tag: B256,
    },
    /// Set a tag property
    SetTagProperty {
        /// Tag id
        tag: B256,
        /// Property key
        key: String,
        /// Property value
        value: String,
    },
}

impl InventoryOp {
    /// Short action name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateUser { .. } => "create_user",
            Self::UpdateUser { .. } => "update_user",
            Self::SetUserAdmin { .. } => "set_user_admin",
            Self::RemoveUser { .. } => "remove_user",
            Self::CreateUserGroup { .. } => "create_user_group",
            Self::UpdateUserGroup { .. } => "update_user_group",
            Self::RemoveUserGroup { .. } => "remove_user_group",
            Self::AddUserToGroup { .. } => "add_user_to_group",
            Self::RemoveUserFromGroup { .. } => "remove_user_from_group",
            Self::CreateDevice { .. } => "create_device",
            Self::UpdateDevice { .. } => "update_device",
            Self::UpdateDeviceLastSeen { .. } => "update_device_last_seen",
            Self::TransferDeviceOwnership { .. } => "transfer_device_ownership",
            Self::RemoveDevice { .. } => "remove_device",
            Self::SetDeviceProperty { .. } => "set_device_property",
            Self::CreateTag { .. } => "create_tag",
            Self::UpdateTag { .. } => "update_tag",
            Self::RemoveTag { .. } => "remove_tag",
            Self::AddDeviceToTag { .. } => "add_device_to_tag",
            Self::RemoveDeviceFromTag { .. } => "remove_device_from_tag",
            Self::SetTagProperty { .. } => "set_tag_property",
        }
    }

    /// Apply to `contract` on behalf of `caller`, returning the created or changed item id
    pub fn apply_to(
        self,
        contract: &mut FleetContract,
        caller: Address,
        height: u64,
    ) -> Result<Option<B256>, FleetError> {
        match self {
            Self::CreateUser { user, nickname, email, avatar_uri } => {
                contract.create_user(caller, user, nickname, email, avatar_uri, height)?;
                Ok(None)
            }
            Self::UpdateUser { user, nickname, email, avatar_uri } => {
                contract.update_user(caller, user, nickname, email, avatar_uri)?;
                Ok(None)
            }
            Self::SetUserAdmin { user, is_admin } => {
                contract.set_user_admin(caller, user, is_admin)?;
                Ok(None)
            }
            Self::RemoveUser { user } => {
                contract.remove_user(caller, user)?;
                Ok(None)
            }
            Self::CreateUserGroup { name, description } => {
                contract.create_user_group(caller, name, description, height).map(Some)
            }
            Self::UpdateUserGroup { group, name, description } => {
                contract.update_user_group(caller, group, name, description)?;
                Ok(Some(group))
            }
            Self::RemoveUserGroup { group } => {
                contract.remove_user_group(caller, group)?;
                Ok(Some(group))
            }
            Self::AddUserToGroup { user, group } => {
                contract.add_user_to_group(caller, user, group)?;
                Ok(Some(group))
            }
            Self::RemoveUserFromGroup { user, group } => {
                contract.remove_user_from_group(caller, user, group)?;
                Ok(Some(group))
            }
            Self::CreateDevice { details } => contract.create_device(caller, details, height).map(Some),
            Self::UpdateDevice { device, details } => {
                contract.update_device(caller, device, details)?;
                Ok(Some(device))
            }
            Self::UpdateDeviceLastSeen { device } => {
                contract.update_device_last_seen(caller, device, height)?;
                Ok(Some(device))
            }
            Self::TransferDeviceOwnership { device, new_owner } => {
                contract.transfer_device_ownership(caller, device, new_owner)?;
                Ok(Some(device))
            }
            Self::RemoveDevice { device } => {
                contract.remove_device(caller, device)?;
                Ok(Some(device))
            }
            Self::SetDeviceProperty { device, key, value } => {
                contract.set_device_property(caller, device, key, value)?;
                Ok(Some(device))
            }
            Self::CreateTag { name, description, color } => {
                contract.create_tag(caller, name, description, color, height).map(Some)
            }
            Self::UpdateTag { tag, name, description, color } => {
                contract.update_tag(caller, tag, name, description, color)?;
                Ok(Some(tag))
            }
            Self::RemoveTag { tag } => {
                contract.remove_tag(caller, tag)?;
                Ok(Some(tag))
            }
            Self::AddDeviceToTag { device, tag } => {
                contract.add_device_to_tag(caller, device, tag)?;
                Ok(Some(tag))
            }
            Self::RemoveDeviceFromTag { device, tag } => {
                contract.remove_device_from_tag(caller, device, tag)?;
                Ok(Some(tag))
            }
            Self::SetTagProperty { tag, key, value } => {
                contract.set_tag_property(caller, tag, key, value)?;
                Ok(Some(tag))
            }
        }
    }
}

impl<C: BlockProducer> DiodeRegistry<C> {
    /// Seal `count` blocks on the underlying chain
    pub fn mine(&mut self, count: u64, coinbase: Option<Address>) -> Receipt {
        self.chain_mut().mine(count, coinbase);
        self.finish(Vec::new())
    }

    /// Apply one operation
    pub fn apply(&mut self, op: Operation) -> Result<Receipt, RegistryError> {
        debug!(target: "diode::registry", op = op.name(), height = self.height(), "Applying operation");
        match op {
            Operation::MineBlocks { count, coinbase } => Ok(self.mine(count, coinbase)),
            Operation::MinerStake { caller, amount } => self.miner_stake(caller, amount),
            Operation::MinerUnstake { caller, amount } => self.miner_unstake(caller, amount),
            Operation::MinerWithdraw { caller } => self.miner_withdraw(caller),
            Operation::ContractStake { caller, fleet, amount } => {
                self.contract_stake(caller, fleet, amount)
            }
            Operation::ContractUnstake { caller, fleet, amount } => {
                self.contract_unstake(caller, fleet, amount)
            }
            Operation::ContractWithdraw { caller, fleet } => self.contract_withdraw(caller, fleet),
            Operation::CreateFleet { caller, label } => self.create_fleet(caller, label),
            Operation::DelegateContractCreate { caller, operator } => {
                self.delegate_contract_create(caller, operator)
            }
            Operation::UpdateFleetLabel { caller, fleet, label } => {
                self.update_fleet_label(caller, fleet, label)
            }
            Operation::AddFleetUser { caller, fleet, user } => self.add_fleet_user(caller, fleet, user),
            Operation::RemoveFleetUser { caller, fleet, user } => {
                self.remove_fleet_user(caller, fleet, user)
            }
            Operation::SetDeviceWhitelist { caller, fleet, device, allowed } => {
                self.set_device_whitelist(caller, fleet, device, allowed)
            }
            Operation::SetAccessWhitelist { caller, fleet, device, client, allowed } => {
                self.set_access_whitelist(caller, fleet, device, client, allowed)
            }
            Operation::Inventory { caller, fleet, action } => self.update_inventory(caller, fleet, action),
            Operation::SubmitTickets { kind, words } => Ok(self.submit_batch(kind, &words)),
            Operation::FundRewardPool { amount } => Ok(self.fund_reward_pool(amount)),
            Operation::BlockReward => self.block_reward(),
        }
    }
}

/// A replayable sequence of operations on a fresh simulated chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Registry configuration, devnet when absent
    #[serde(default)]
    pub config: Option<RegistryConfig>,
    /// Producer of the first block
    #[serde(default)]
    pub coinbase: Address,
    /// Operations in execution order
    pub operations: Vec<Operation>,
}

/// Outcome of one replayed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayStep {
    /// Position in the scenario
    pub index: usize,
    /// Operation name
    pub op: String,
    /// Receipt, when the operation succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
    /// Error message, when it failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Scenario {
    /// Parse a scenario from JSON
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    /// Registry the scenario starts from
    pub fn registry(&self) -> Result<DiodeRegistry<SimulatedChain>, RegistryError> {
        let config = self.config.clone().unwrap_or_default();
        DiodeRegistry::new(config, SimulatedChain::new(self.coinbase))
    }

    /// Run every operation; failed operations are recorded and skipped
    pub fn replay(&self) -> Result<(DiodeRegistry<SimulatedChain>, Vec<ReplayStep>), RegistryError> {
        let mut registry = self.registry()?;
        let steps = self
            .operations
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, op)| {
                let name = op.name().to_string();
                match registry.apply(op) {
                    Ok(receipt) => ReplayStep { index, op: name, receipt: Some(receipt), error: None },
                    Err(err) => ReplayStep { index, op: name, receipt: None, error: Some(err.to_string()) },
                }
            })
            .collect();
        Ok((registry, steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RegistryEvent;

    const MINER: Address = Address::repeat_byte(0x0d);

    #[test]
    fn test_operation_json_shape() {
        let op: Operation = serde_json::from_str(
            r#"{"op":"miner_stake","caller":"0x0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d","amount":"0x10"}"#,
        )
        .unwrap();
        assert_eq!(op, Operation::MinerStake { caller: MINER, amount: U256::from(16) });

        let op: Operation = serde_json::from_str(r#"{"op":"mine_blocks","count":3}"#).unwrap();
        assert_eq!(op, Operation::MineBlocks { count: 3, coinbase: None });

        let json = serde_json::to_value(Operation::BlockReward).unwrap();
        assert_eq!(json["op"], "block_reward");
    }

    #[test]
    fn test_inventory_json_shape() {
        let op: Operation = serde_json::from_str(
            r#"{
                "op": "inventory",
                "caller": "0x0101010101010101010101010101010101010101",
                "fleet": "0x0202020202020202020202020202020202020202",
                "action": {"action": "create_tag", "name": "lab", "color": "red"}
            }"#,
        )
        .unwrap();
        let Operation::Inventory { action, .. } = &op else { panic!("not an inventory op") };
        assert_eq!(
            action,
            &InventoryOp::CreateTag { name: "lab".into(), description: String::new(), color: "red".into() }
        );
        assert_eq!(op.name(), "inventory");
        assert_eq!(action.name(), "create_tag");
    }

    #[test]
    fn test_inventory_admin_acts_as_manager() {
        let owner = Address::repeat_byte(0x01);
        let admin = Address::repeat_byte(0x02);
        let stranger = Address::repeat_byte(0x03);
        let mut registry = Scenario { coinbase: MINER, ..Default::default() }.registry().unwrap();

        let receipt = registry.apply(Operation::CreateFleet { caller: owner, label: "lab".into() }).unwrap();
        let Some(RegistryEvent::FleetCreated { fleet, .. }) = receipt.events.first().cloned() else {
            panic!("fleet not created");
        };
        let inventory = |caller, action| Operation::Inventory { caller, fleet, action };
        let tag = || InventoryOp::CreateTag { name: "lab".into(), description: String::new(), color: String::new() };

        assert!(registry.apply(inventory(admin, tag())).is_err());
        registry
            .apply(inventory(
                owner,
                InventoryOp::CreateUser {
                    user: admin,
                    nickname: "ada".into(),
                    email: String::new(),
                    avatar_uri: String::new(),
                },
            ))
            .unwrap();
        registry.apply(inventory(owner, InventoryOp::SetUserAdmin { user: admin, is_admin: true })).unwrap();

        let receipt = registry.apply(inventory(admin, tag())).unwrap();
        assert!(matches!(
            receipt.events.as_slice(),
            [RegistryEvent::InventoryUpdated { caller, item: Some(_), .. }] if *caller == admin
        ));
        assert!(registry.apply(inventory(stranger, tag())).is_err());

        let contract = registry.fleets().contract(&fleet).unwrap();
        assert!(contract.is_user_admin(&admin));
        assert_eq!(contract.inventory().tag_ids().len(), 1);
    }

    #[test]
    fn test_replay_staking_scenario() {
        let one = U256::from(1_000_000_000_000_000_000u128);
        let scenario = Scenario {
            config: None,
            coinbase: MINER,
            operations: vec![
                Operation::MineBlocks { count: 1, coinbase: None },
                Operation::MinerStake { caller: MINER, amount: one },
                Operation::MineBlocks { count: 3, coinbase: None },
                Operation::MinerUnstake { caller: MINER, amount: one + U256::from(1) },
                Operation::MinerUnstake { caller: MINER, amount: one },
                Operation::MineBlocks { count: 3, coinbase: None },
                Operation::MinerWithdraw { caller: MINER },
            ],
        };

        let (registry, steps) = scenario.replay().unwrap();
        assert_eq!(steps.len(), 7);
        assert!(steps[3].error.is_some());
        assert!(steps[4].error.is_none());

        let withdrawn = steps[6].receipt.as_ref().unwrap();
        assert_eq!(withdrawn.height, 7);
        assert_eq!(
            withdrawn.events,
            vec![RegistryEvent::Withdrawn { is_contract: false, target: MINER, amount: one }]
        );
        assert_eq!(registry.payout(&MINER), one);
    }

    #[test]
    fn test_scenario_from_json() {
        let scenario = Scenario::from_json(
            r#"{
                "coinbase": "0x0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d",
                "operations": [
                    {"op": "create_fleet", "caller": "0x0101010101010101010101010101010101010101"},
                    {"op": "fund_reward_pool", "amount": "0x64"},
                    {"op": "block_reward"},
                    {"op": "block_reward"}
                ]
            }"#,
        )
        .unwrap();

        let (registry, steps) = scenario.replay().unwrap();
        assert_eq!(registry.fleets().len(), 1);
        assert!(steps[2].error.is_none());
        assert!(steps[3].error.as_deref().unwrap_or_default().contains("already distributed"));
    }
}
