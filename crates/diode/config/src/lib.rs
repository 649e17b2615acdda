//! Diode Registry Configuration
//!
//! Every tunable of the registry lives in [`RegistryConfig`]. Presets exist per
//! network:
//!
//! ```text
//! Network   Epoch     Stake/Unstake window   Block reward   Halving
//! ├── mainnet 40,320   40,320 / 40,320        1 DIODE        4 years
//! ├── testnet  4,032    4,032 /  4,032        1 DIODE        1 year
//! └── devnet       4        3 /      3        1 DIODE        1 day
//! ```
//!
//! Files load from TOML when the extension is `.toml` and from JSON otherwise.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod config;

pub use config::{NetworkType, RegistryConfig};

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlDeError(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),
}

/// Registry constants
pub mod constants {
    /// One token in its smallest unit (10^18)
    pub const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

    /// Target block time in seconds
    pub const TARGET_BLOCK_TIME_SECS: u64 = 15;

    /// Blocks per day at 15s
    pub const BLOCKS_PER_DAY: u64 = 5_760; // 86400 / 15

    /// Blocks per year
    pub const BLOCKS_PER_YEAR: u64 = 2_102_400; // 365 * BLOCKS_PER_DAY

    /// Mainnet epoch length, one week of blocks
    pub const MAINNET_BLOCKS_PER_EPOCH: u64 = 40_320;

    /// Testnet epoch length
    pub const TESTNET_BLOCKS_PER_EPOCH: u64 = 4_032;

    /// Block hashes a chain keeps queryable
    pub const BLOCK_HASH_HISTORY: u64 = 256;

    /// Nominal reward per distribution (1 token)
    pub const BASE_BLOCK_REWARD: u128 = ONE_TOKEN;

    /// Reward floor (0.001 token)
    pub const MIN_BLOCK_REWARD: u128 = ONE_TOKEN / 1_000;

    /// Bytes one connection is worth when scoring usage
    pub const CONNECTION_WEIGHT: u64 = 1_024;

    /// Epochs of ticket records kept after the current one
    pub const EPOCH_RETENTION: u64 = 2;
}

#[cfg(test)]
mod tests {
    use super::constants::*;

    #[test]
    fn test_block_constants() {
        assert_eq!(BLOCKS_PER_DAY * TARGET_BLOCK_TIME_SECS, 86_400);
        assert_eq!(BLOCKS_PER_YEAR, BLOCKS_PER_DAY * 365);
        assert_eq!(MAINNET_BLOCKS_PER_EPOCH, BLOCKS_PER_DAY * 7);
    }

    #[test]
    fn test_reward_envelope() {
        assert!(MIN_BLOCK_REWARD < BASE_BLOCK_REWARD);
        assert_eq!(BASE_BLOCK_REWARD / MIN_BLOCK_REWARD, 1_000);
    }
}
