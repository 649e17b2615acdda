//! Chain view: block heights, hashes and coinbases the registry reads

use alloy_primitives::{Address, B256};
use diode_tickets::{hash::word_from_address, hash::word_from_u64, hash_words};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of past block hashes kept queryable
pub const DEFAULT_HASH_HISTORY: usize = 256;

/// A sealed block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block height
    pub height: u64,
    /// Block hash
    pub hash: B256,
    /// Block producer
    pub coinbase: Address,
}

/// Read access to the chain the registry executes on
///
/// `head` is the height of the block currently being built; every operation
/// executes at that height. Only blocks strictly below the head have hashes.
pub trait ChainView {
    /// Height of the block operations execute in
    fn head(&self) -> u64;

    /// Hash of a sealed block still inside the hash history
    fn block_hash(&self, height: u64) -> Option<B256>;

    /// Producer of the block at `height`, including the head
    fn coinbase(&self, height: u64) -> Option<Address>;
}

/// A chain that can be advanced explicitly
pub trait BlockProducer: ChainView {
    /// Seal `count` blocks; `coinbase` replaces the producer of the new head
    fn mine(&mut self, count: u64, coinbase: Option<Address>) -> Option<BlockInfo>;
}

/// In-memory chain with explicit block advancement
#[derive(Debug, Clone)]
pub struct SimulatedChain {
    head: u64,
    coinbase: Address,
    parent_hash: B256,
    sealed: VecDeque<BlockInfo>,
    history: usize,
}

impl Default for SimulatedChain {
    fn default() -> Self {
        Self::new(Address::ZERO)
    }
}

impl SimulatedChain {
    /// Chain at height 0 produced by `coinbase`
    pub fn new(coinbase: Address) -> Self {
        Self {
            head: 0,
            coinbase,
            parent_hash: B256::ZERO,
            sealed: VecDeque::with_capacity(DEFAULT_HASH_HISTORY),
            history: DEFAULT_HASH_HISTORY,
        }
    }

    /// Keep `history` past hashes instead of the default
    pub fn with_history(mut self, history: usize) -> Self {
        self.history = history.max(1);
        self
    }

    /// Seal the head block and open the next one
    pub fn mine_block(&mut self) -> BlockInfo {
        let hash = hash_words(&[
            self.parent_hash,
            word_from_u64(self.head),
            word_from_address(self.coinbase),
        ]);
        let block = BlockInfo { height: self.head, hash, coinbase: self.coinbase };

        self.sealed.push_back(block);
        while self.sealed.len() > self.history {
            self.sealed.pop_front();
        }
        self.parent_hash = hash;
        self.head += 1;
        block
    }

    /// Seal `count` blocks
    pub fn mine_blocks(&mut self, count: u64) -> Option<BlockInfo> {
        (0..count).map(|_| self.mine_block()).last()
    }

    /// Seal the head block and let `coinbase` produce the next ones
    pub fn mine_with_coinbase(&mut self, coinbase: Address) -> BlockInfo {
        let block = self.mine_block();
        self.coinbase = coinbase;
        block
    }

    /// Producer of the head block
    pub const fn current_coinbase(&self) -> Address {
        self.coinbase
    }

    /// Most recently sealed block
    pub fn latest(&self) -> Option<&BlockInfo> {
        self.sealed.back()
    }

    fn sealed_block(&self, height: u64) -> Option<&BlockInfo> {
        let oldest = self.sealed.front()?.height;
        let index = usize::try_from(height.checked_sub(oldest)?).ok()?;
        self.sealed.get(index)
    }
}

impl ChainView for SimulatedChain {
    fn head(&self) -> u64 {
        self.head
    }

    fn block_hash(&self, height: u64) -> Option<B256> {
        if height >= self.head || self.head - height > self.history as u64 {
            return None;
        }
        self.sealed_block(height).map(|block| block.hash)
    }

    fn coinbase(&self, height: u64) -> Option<Address> {
        if height == self.head {
            return Some(self.coinbase);
        }
        self.sealed_block(height).map(|block| block.coinbase)
    }
}

impl BlockProducer for SimulatedChain {
    fn mine(&mut self, count: u64, coinbase: Option<Address>) -> Option<BlockInfo> {
        let last = self.mine_blocks(count);
        if let Some(coinbase) = coinbase {
            self.coinbase = coinbase;
        }
        last
    }
}
