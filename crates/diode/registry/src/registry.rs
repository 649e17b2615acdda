//! The registry state machine

use alloy_primitives::{address, Address, B256, U256};
use diode_config::RegistryConfig;
use diode_fleet::{FleetError, FleetManager};
use diode_staking::{Bucket, MaturationWindows, ParticipantKind, StakeLedger};
use diode_tickets::{decode_batch, TicketKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::{
    rewards::{RewardCurve, RewardDistributor},
    validator::TicketValidator,
    ChainView, InventoryOp, RegistryError, RegistryEvent, RejectReason,
};

/// Address the registry deploys fleets from
pub const REGISTRY_ADDRESS: Address = address!("0x5000000000000000000000000000000000000000");

/// Outcome of one applied operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Height the operation executed at
    pub height: u64,
    /// Events emitted, in order
    pub events: Vec<RegistryEvent>,
}

/// Ticket accounting and staking registry over a chain view
#[derive(Debug)]
pub struct DiodeRegistry<C> {
    config: RegistryConfig,
    chain: C,
    ledger: StakeLedger,
    fleets: FleetManager,
    validator: TicketValidator,
    rewards: RewardDistributor,
    events: Vec<RegistryEvent>,
    payouts: BTreeMap<Address, U256>,
}

impl<C: ChainView> DiodeRegistry<C> {
    /// Create a registry with the halving curve of `config`
    pub fn new(config: RegistryConfig, chain: C) -> Result<Self, RegistryError> {
        config.validate()?;
        let rewards = RewardDistributor::from_config(&config);
        Ok(Self::assemble(config, chain, rewards))
    }

    /// Create a registry with a custom reward curve
    pub fn with_curve(
        config: RegistryConfig,
        chain: C,
        curve: Box<dyn RewardCurve>,
    ) -> Result<Self, RegistryError> {
        config.validate()?;
        let rewards = RewardDistributor::new(curve, config.initial_reward_pool, config.connection_weight);
        Ok(Self::assemble(config, chain, rewards))
    }

    fn assemble(config: RegistryConfig, chain: C, rewards: RewardDistributor) -> Self {
        let windows =
            MaturationWindows::new(config.stake_maturation_blocks, config.unstake_maturation_blocks);
        Self {
            ledger: StakeLedger::new(windows),
            fleets: FleetManager::new(REGISTRY_ADDRESS),
            validator: TicketValidator::new(config.blocks_per_epoch, config.max_ticket_age),
            rewards,
            events: Vec::new(),
            payouts: BTreeMap::new(),
            config,
            chain,
        }
    }

    /// Registry configuration
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Underlying chain
    pub const fn chain(&self) -> &C {
        &self.chain
    }

    /// Mutable chain, for advancing blocks
    pub fn chain_mut(&mut self) -> &mut C {
        &mut self.chain
    }

    /// Current execution height
    pub fn height(&self) -> u64 {
        self.chain.head()
    }

    /// Stake ledger
    pub const fn ledger(&self) -> &StakeLedger {
        &self.ledger
    }

    /// Fleets
    pub const fn fleets(&self) -> &FleetManager {
        &self.fleets
    }

    /// Ticket validator state
    pub const fn validator(&self) -> &TicketValidator {
        &self.validator
    }

    /// Remaining reward pool
    pub const fn reward_pool(&self) -> U256 {
        self.rewards.pool()
    }

    /// Every event emitted so far
    pub fn events(&self) -> &[RegistryEvent] {
        &self.events
    }

    /// Total value paid out to `address` by withdrawals
    pub fn payout(&self, address: &Address) -> U256 {
        self.payouts.get(address).copied().unwrap_or_default()
    }

    /// Every payout so far
    pub const fn payouts(&self) -> &BTreeMap<Address, U256> {
        &self.payouts
    }

    pub(crate) fn finish(&mut self, events: Vec<RegistryEvent>) -> Receipt {
        self.events.extend(events.iter().cloned());
        Receipt { height: self.chain.head(), events }
    }

    // Queries

    /// Bucket value of a miner, settled at the current height
    pub fn miner_value(&self, bucket: u8, miner: Address) -> Result<U256, RegistryError> {
        let bucket = Bucket::try_from(bucket)?;
        Ok(self.ledger.value(bucket, ParticipantKind::Miner(miner), self.height()))
    }

    /// Bucket value of a fleet contract, settled at the current height
    pub fn contract_value(&self, bucket: u8, fleet: Address) -> Result<U256, RegistryError> {
        let bucket = Bucket::try_from(bucket)?;
        Ok(self.ledger.value(bucket, ParticipantKind::Fleet(fleet), self.height()))
    }

    // Miner staking

    /// Deposit `amount` as miner stake of `caller`
    pub fn miner_stake(&mut self, caller: Address, amount: U256) -> Result<Receipt, RegistryError> {
        self.stake(ParticipantKind::Miner(caller), amount)
    }

    /// Start unstaking `amount` of `caller`'s confirmed miner stake
    pub fn miner_unstake(&mut self, caller: Address, amount: U256) -> Result<Receipt, RegistryError> {
        self.unstake(ParticipantKind::Miner(caller), amount)
    }

    /// Pay out `caller`'s claimable miner stake
    pub fn miner_withdraw(&mut self, caller: Address) -> Result<Receipt, RegistryError> {
        Ok(self.withdraw(ParticipantKind::Miner(caller), caller))
    }

    // Fleet staking

    fn accountant_of(&self, caller: Address, fleet: Address) -> Result<(), RegistryError> {
        let contract = self.fleets.contract(&fleet)?;
        if contract.accountant() != caller {
            return Err(FleetError::NotAccountant { fleet, caller }.into());
        }
        Ok(())
    }

    /// Deposit `amount` as stake of `fleet`; accountant only
    pub fn contract_stake(
        &mut self,
        caller: Address,
        fleet: Address,
        amount: U256,
    ) -> Result<Receipt, RegistryError> {
        self.accountant_of(caller, fleet)?;
        self.stake(ParticipantKind::Fleet(fleet), amount)
    }

    /// Start unstaking `amount` of `fleet`'s confirmed stake; accountant only
    pub fn contract_unstake(
        &mut self,
        caller: Address,
        fleet: Address,
        amount: U256,
    ) -> Result<Receipt, RegistryError> {
        self.accountant_of(caller, fleet)?;
        self.unstake(ParticipantKind::Fleet(fleet), amount)
    }

    /// Pay out `fleet`'s claimable stake to its accountant
    pub fn contract_withdraw(&mut self, caller: Address, fleet: Address) -> Result<Receipt, RegistryError> {
        self.accountant_of(caller, fleet)?;
        Ok(self.withdraw(ParticipantKind::Fleet(fleet), caller))
    }

    fn stake(&mut self, who: ParticipantKind, amount: U256) -> Result<Receipt, RegistryError> {
        self.ledger.stake(who, amount, self.chain.head())?;
        Ok(self.finish(vec![RegistryEvent::Staked {
            is_contract: who.is_contract(),
            target: who.address(),
            amount,
        }]))
    }

    fn unstake(&mut self, who: ParticipantKind, amount: U256) -> Result<Receipt, RegistryError> {
        self.ledger.unstake(who, amount, self.chain.head())?;
        Ok(self.finish(vec![RegistryEvent::Unstaked {
            is_contract: who.is_contract(),
            target: who.address(),
            amount,
        }]))
    }

    fn withdraw(&mut self, who: ParticipantKind, recipient: Address) -> Receipt {
        let amount = self.ledger.withdraw(who, self.chain.head());
        if !amount.is_zero() {
            let paid = self.payouts.entry(recipient).or_default();
            *paid = paid.saturating_add(amount);
        }
        self.finish(vec![RegistryEvent::Withdrawn {
            is_contract: who.is_contract(),
            target: who.address(),
            amount,
        }])
    }

    // Fleets

    /// Deploy a fleet owned, operated and paid for by `caller`
    pub fn create_fleet(&mut self, caller: Address, label: impl Into<String>) -> Result<Receipt, RegistryError> {
        let fleet = self.fleets.create_fleet(caller, label, self.chain.head())?;
        Ok(self.fleet_created(fleet))
    }

    /// Deploy a fleet operated by `operator` with `caller` as accountant
    pub fn delegate_contract_create(
        &mut self,
        caller: Address,
        operator: Address,
    ) -> Result<Receipt, RegistryError> {
        let fleet = self.fleets.delegate_contract_create(caller, operator, self.chain.head())?;
        Ok(self.fleet_created(fleet))
    }

    fn fleet_created(&mut self, fleet: Address) -> Receipt {
        let (operator, accountant) = self
            .fleets
            .fleet(&fleet)
            .map(|f| (f.operator(), f.accountant()))
            .unwrap_or_default();
        self.finish(vec![RegistryEvent::FleetCreated { fleet, operator, accountant }])
    }

    /// Change a fleet's inventory
    pub fn update_inventory(
        &mut self,
        caller: Address,
        fleet: Address,
        action: InventoryOp,
    ) -> Result<Receipt, RegistryError> {
        let height = self.chain.head();
        let name = action.name();
        let item = action.apply_to(self.fleets.contract_mut(&fleet)?, caller, height)?;
        debug!(target: "diode::registry", %fleet, %caller, action = name, "Inventory updated");
        Ok(self.finish(vec![RegistryEvent::InventoryUpdated {
            fleet,
            caller,
            action: name.to_string(),
            item,
        }]))
    }

    /// Change a fleet label; owner only
    pub fn update_fleet_label(
        &mut self,
        caller: Address,
        fleet: Address,
        label: impl Into<String>,
    ) -> Result<Receipt, RegistryError> {
        self.fleets.update_fleet_label(caller, fleet, label, self.chain.head())?;
        Ok(self.finish(Vec::new()))
    }

    /// Share a fleet with `user`
    pub fn add_fleet_user(&mut self, caller: Address, fleet: Address, user: Address) -> Result<Receipt, RegistryError> {
        self.fleets.add_fleet_user(caller, fleet, user)?;
        Ok(self.finish(Vec::new()))
    }

    /// Stop sharing a fleet with `user`
    pub fn remove_fleet_user(
        &mut self,
        caller: Address,
        fleet: Address,
        user: Address,
    ) -> Result<Receipt, RegistryError> {
        self.fleets.remove_fleet_user(caller, fleet, user)?;
        Ok(self.finish(Vec::new()))
    }

    /// Allow or revoke a device of `fleet`; operator only
    pub fn set_device_whitelist(
        &mut self,
        caller: Address,
        fleet: Address,
        device: Address,
        allowed: bool,
    ) -> Result<Receipt, RegistryError> {
        self.fleets.contract_mut(&fleet)?.set_device_whitelist(caller, device, allowed)?;
        Ok(self.finish(Vec::new()))
    }

    /// Allow or revoke a client of a device of `fleet`; operator only
    pub fn set_access_whitelist(
        &mut self,
        caller: Address,
        fleet: Address,
        device: Address,
        client: Address,
        allowed: bool,
    ) -> Result<Receipt, RegistryError> {
        self.fleets.contract_mut(&fleet)?.set_access_whitelist(caller, device, client, allowed)?;
        Ok(self.finish(Vec::new()))
    }

    // Tickets

    /// Submit a batch of 9-word device tickets
    pub fn submit_ticket_raw(&mut self, words: &[B256]) -> Receipt {
        self.submit_batch(TicketKind::Device, words)
    }

    /// Submit a batch of 8-word connection tickets
    pub fn submit_connection_ticket_raw(&mut self, words: &[B256]) -> Receipt {
        self.submit_batch(TicketKind::Connection, words)
    }

    /// Submit a batch of 11-word traffic tickets
    pub fn submit_traffic_ticket_raw(&mut self, words: &[B256]) -> Receipt {
        self.submit_batch(TicketKind::Traffic, words)
    }

    /// Validate a batch in order; rejected tickets never affect their siblings
    pub fn submit_batch(&mut self, kind: TicketKind, words: &[B256]) -> Receipt {
        let mut events = Vec::new();
        let mut accepted = 0usize;

        for (index, decoded) in decode_batch(kind, words).into_iter().enumerate() {
            let outcome = decoded
                .map_err(RejectReason::from)
                .and_then(|ticket| self.validator.validate(&ticket, &self.chain, &self.fleets));

            match outcome {
                Ok(event) => {
                    accepted += 1;
                    events.push(event);
                }
                Err(reason) => {
                    debug!(target: "diode::registry", %kind, index, %reason, "Ticket rejected");
                    if self.config.emit_rejections {
                        events.push(RegistryEvent::TicketRejected { index, kind, reason });
                    }
                }
            }
        }

        debug!(target: "diode::registry", %kind, words = words.len(), accepted, "Ticket batch processed");
        self.finish(events)
    }

    // Rewards

    /// Top up the reward pool
    pub fn fund_reward_pool(&mut self, amount: U256) -> Receipt {
        let pool = self.rewards.fund(amount);
        self.finish(vec![RegistryEvent::RewardPoolFunded { amount, pool }])
    }

    /// Distribute rewards for the current block
    ///
    /// Fails when rewards were already distributed at this height.
    pub fn block_reward(&mut self) -> Result<Receipt, RegistryError> {
        let height = self.chain.head();
        self.rewards.ensure_open(height)?;

        let coinbase = self.chain.coinbase(height).filter(|c| !c.is_zero());
        let nodes = self.validator.usage().len();
        let credits = match self.rewards.distribute(height, self.validator.usage(), coinbase, &mut self.ledger) {
            Ok(credits) => credits,
            Err(err) => {
                warn!(target: "diode::registry", height, %err, "Reward distribution failed");
                return Err(err);
            }
        };

        // Usage survives a failed distribution
        self.validator.clear_usage();
        let epoch = self.validator.epoch_of(height);
        self.validator.prune(epoch, self.config.epoch_retention);

        info!(target: "diode::registry", height, nodes, credits = credits.len(), "Block reward");
        let events = credits
            .into_iter()
            .map(|credit| RegistryEvent::Rewards { node: credit.node, amount: credit.amount })
            .collect();
        Ok(self.finish(events))
    }
}
