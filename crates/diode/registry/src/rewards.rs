//! Reward curves and distribution into the stake ledger

use alloy_primitives::{Address, U256};
use diode_config::RegistryConfig;
use diode_staking::{Bucket, ParticipantKind, StakeLedger, StakingError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::{validator::NodeUsage, RegistryError};

/// Nominal reward per distribution as a function of block height
pub trait RewardCurve: std::fmt::Debug + Send + Sync {
    /// Nominal reward at `height`
    fn reward_at(&self, height: u64) -> U256;
}

/// Halves every `interval` blocks, never below `floor`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalvingCurve {
    /// Reward at height zero
    pub initial: U256,
    /// Lower bound
    pub floor: U256,
    /// Blocks between halvings
    pub interval: u64,
}

impl HalvingCurve {
    /// Curve described by `config`
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            initial: config.block_reward,
            floor: config.min_block_reward,
            interval: config.reward_halving_interval,
        }
    }
}

impl RewardCurve for HalvingCurve {
    fn reward_at(&self, height: u64) -> U256 {
        let halvings = height / self.interval.max(1);
        let reward = if halvings >= 256 { U256::ZERO } else { self.initial >> halvings as usize };
        reward.max(self.floor)
    }
}

/// Constant reward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatCurve(pub U256);

impl RewardCurve for FlatCurve {
    fn reward_at(&self, _height: u64) -> U256 {
        self.0
    }
}

fn remaining_cap(
    caps: &mut HashMap<Address, U256>,
    ledger: &StakeLedger,
    node: Address,
    height: u64,
) -> U256 {
    *caps
        .entry(node)
        .or_insert_with(|| ledger.value(Bucket::Confirmed, ParticipantKind::Miner(node), height))
}

/// One credit made by a distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCredit {
    /// Rewarded miner
    pub node: Address,
    /// Amount added to its confirmed stake
    pub amount: U256,
}

/// Converts node usage into stake credits
#[derive(Debug)]
pub struct RewardDistributor {
    curve: Box<dyn RewardCurve>,
    pool: U256,
    connection_weight: U256,
    last_distributed: Option<u64>,
}

impl RewardDistributor {
    /// Create a distributor
    pub fn new(curve: Box<dyn RewardCurve>, pool: U256, connection_weight: U256) -> Self {
        Self { curve, pool, connection_weight, last_distributed: None }
    }

    /// Distributor with the halving curve of `config`
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(
            Box::new(HalvingCurve::from_config(config)),
            config.initial_reward_pool,
            config.connection_weight,
        )
    }

    /// Remaining reward pool
    pub const fn pool(&self) -> U256 {
        self.pool
    }

    /// Height of the last distribution
    pub const fn last_distributed(&self) -> Option<u64> {
        self.last_distributed
    }

    /// Nominal reward at `height`
    pub fn nominal(&self, height: u64) -> U256 {
        self.curve.reward_at(height)
    }

    /// Top up the pool, returning the new pool size
    pub fn fund(&mut self, amount: U256) -> U256 {
        self.pool = self.pool.saturating_add(amount);
        self.pool
    }

    /// Fail when a distribution already ran at `height`
    pub fn ensure_open(&self, height: u64) -> Result<(), RegistryError> {
        if self.last_distributed == Some(height) {
            return Err(RegistryError::RewardAlreadyDistributed(height));
        }
        Ok(())
    }

    /// Distribute the nominal reward at `height`
    ///
    /// Nodes share the nominal reward by usage score, the coinbase receives
    /// what is left. Every credit is capped by the remaining pool and by the
    /// receiver's confirmed miner stake before this call. Nothing is credited
    /// unless every credit fits.
    pub fn distribute(
        &mut self,
        height: u64,
        usage: &BTreeMap<Address, NodeUsage>,
        coinbase: Option<Address>,
        ledger: &mut StakeLedger,
    ) -> Result<Vec<RewardCredit>, RegistryError> {
        self.ensure_open(height)?;

        let nominal = self.curve.reward_at(height);
        let total_score = usage
            .values()
            .fold(U256::ZERO, |acc, u| acc.saturating_add(u.score(self.connection_weight)));

        // Remaining cap per receiver, seeded from its stake before any credit
        let mut caps: HashMap<Address, U256> = HashMap::new();

        let mut plan: Vec<RewardCredit> = Vec::new();
        let mut pool = self.pool;
        let mut credited = U256::ZERO;

        if !total_score.is_zero() {
            for (node, node_usage) in usage {
                let score = node_usage.score(self.connection_weight);
                if score.is_zero() {
                    continue;
                }
                let share = nominal.saturating_mul(score) / total_score;
                let cap = remaining_cap(&mut caps, ledger, *node, height);
                let amount = share.min(pool).min(cap);
                if amount.is_zero() {
                    debug!(target: "diode::rewards", %node, %share, "Reward capped to zero");
                    continue;
                }
                caps.insert(*node, cap - amount);
                pool -= amount;
                credited += amount;
                plan.push(RewardCredit { node: *node, amount });
            }
        }

        if let Some(coinbase) = coinbase {
            let remaining = nominal.saturating_sub(credited);
            let cap = remaining_cap(&mut caps, ledger, coinbase, height);
            let amount = remaining.min(pool).min(cap);
            if !amount.is_zero() {
                pool -= amount;
                plan.push(RewardCredit { node: coinbase, amount });
            }
        }

        let mut totals: BTreeMap<Address, U256> = BTreeMap::new();
        for credit in &plan {
            let total = totals.entry(credit.node).or_default();
            *total = total.saturating_add(credit.amount);
        }
        for (node, total) in &totals {
            let who = ParticipantKind::Miner(*node);
            if ledger.value(Bucket::Confirmed, who, height).checked_add(*total).is_none() {
                return Err(StakingError::Overflow(who).into());
            }
        }

        for credit in &plan {
            ledger.credit(ParticipantKind::Miner(credit.node), credit.amount, height)?;
        }
        self.pool = pool;
        self.last_distributed = Some(height);

        info!(
            target: "diode::rewards",
            height,
            %nominal,
            credits = plan.len(),
            pool = %self.pool,
            "Rewards distributed"
        );
        Ok(plan)
    }
}
