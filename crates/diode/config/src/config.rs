//! Registry configuration types

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{constants, ConfigError};

/// Network preset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Production mainnet
    Mainnet,
    /// Public testnet
    Testnet,
    /// Local development
    #[default]
    Devnet,
}

impl NetworkType {
    /// Blocks per ticket epoch
    pub const fn blocks_per_epoch(&self) -> u64 {
        match self {
            Self::Mainnet => constants::MAINNET_BLOCKS_PER_EPOCH,
            Self::Testnet => constants::TESTNET_BLOCKS_PER_EPOCH,
            Self::Devnet => 4,
        }
    }

    /// Stake and unstake maturation window in blocks
    pub const fn maturation_blocks(&self) -> u64 {
        match self {
            Self::Mainnet | Self::Testnet => self.blocks_per_epoch(),
            Self::Devnet => 3,
        }
    }

    /// Blocks between reward halvings
    pub const fn reward_halving_interval(&self) -> u64 {
        match self {
            Self::Mainnet => constants::BLOCKS_PER_YEAR * 4,
            Self::Testnet => constants::BLOCKS_PER_YEAR,
            Self::Devnet => constants::BLOCKS_PER_DAY,
        }
    }
}

impl std::fmt::Display for NetworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mainnet => f.write_str("mainnet"),
            Self::Testnet => f.write_str("testnet"),
            Self::Devnet => f.write_str("devnet"),
        }
    }
}

impl std::str::FromStr for NetworkType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "devnet" | "dev" => Ok(Self::Devnet),
            other => Err(ConfigError::InvalidConfig(format!("Unknown network: {other}"))),
        }
    }
}

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Network preset this config was derived from
    pub network: NetworkType,
    /// Blocks before pending stake becomes confirmed
    pub stake_maturation_blocks: u64,
    /// Blocks before locked stake becomes claimable
    pub unstake_maturation_blocks: u64,
    /// Blocks per ticket epoch
    pub blocks_per_epoch: u64,
    /// Oldest ticket accepted, in blocks behind the head
    pub max_ticket_age: u64,
    /// Nominal reward per distribution
    pub block_reward: U256,
    /// Reward floor the halving curve never drops below
    pub min_block_reward: U256,
    /// Blocks between reward halvings
    pub reward_halving_interval: u64,
    /// Bytes one connection is worth when scoring usage
    pub connection_weight: U256,
    /// Reward pool at registry creation
    pub initial_reward_pool: U256,
    /// Emit `TicketRejected` events for rejected tickets
    pub emit_rejections: bool,
    /// Epochs of ticket records kept after the current one
    pub epoch_retention: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new(NetworkType::Devnet)
    }
}

impl RegistryConfig {
    /// Create the preset for `network`
    pub fn new(network: NetworkType) -> Self {
        let initial_reward_pool = match network {
            NetworkType::Devnet => U256::from(constants::ONE_TOKEN) * U256::from(1_000),
            NetworkType::Mainnet | NetworkType::Testnet => U256::ZERO,
        };

        Self {
            network,
            stake_maturation_blocks: network.maturation_blocks(),
            unstake_maturation_blocks: network.maturation_blocks(),
            blocks_per_epoch: network.blocks_per_epoch(),
            max_ticket_age: constants::BLOCK_HASH_HISTORY,
            block_reward: U256::from(constants::BASE_BLOCK_REWARD),
            min_block_reward: U256::from(constants::MIN_BLOCK_REWARD),
            reward_halving_interval: network.reward_halving_interval(),
            connection_weight: U256::from(constants::CONNECTION_WEIGHT),
            initial_reward_pool,
            emit_rejections: false,
            epoch_retention: constants::EPOCH_RETENTION,
        }
    }

    /// Create a devnet config
    pub fn devnet() -> Self {
        Self::new(NetworkType::Devnet)
    }

    /// Create a testnet config
    pub fn testnet() -> Self {
        Self::new(NetworkType::Testnet)
    }

    /// Create a mainnet config
    pub fn mainnet() -> Self {
        Self::new(NetworkType::Mainnet)
    }

    /// Toggle rejection events
    pub fn with_emit_rejections(mut self, emit: bool) -> Self {
        self.emit_rejections = emit;
        self
    }

    /// Replace the starting reward pool
    pub fn with_initial_reward_pool(mut self, pool: U256) -> Self {
        self.initial_reward_pool = pool;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blocks_per_epoch == 0 {
            return Err(ConfigError::InvalidConfig("blocks_per_epoch must be non-zero".into()));
        }

        if self.min_block_reward > self.block_reward {
            return Err(ConfigError::InvalidConfig(format!(
                "min_block_reward {} exceeds block_reward {}",
                self.min_block_reward, self.block_reward
            )));
        }

        if self.reward_halving_interval == 0 {
            return Err(ConfigError::InvalidConfig(
                "reward_halving_interval must be non-zero".into(),
            ));
        }

        if self.max_ticket_age == 0 {
            return Err(ConfigError::InvalidConfig("max_ticket_age must be at least 1".into()));
        }

        Ok(())
    }

    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = if is_toml(path) {
            toml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Write the config, choosing the format from the extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = if is_toml(path) { self.to_toml()? } else { self.to_json()? };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_devnet_preset() {
        let config = RegistryConfig::devnet();
        assert_eq!(config.stake_maturation_blocks, 3);
        assert_eq!(config.unstake_maturation_blocks, 3);
        assert_eq!(config.blocks_per_epoch, 4);
        assert_eq!(config.block_reward, U256::from(1_000_000_000_000_000_000u128));
        assert_eq!(config.min_block_reward, U256::from(1_000_000_000_000_000u128));
        assert!(!config.emit_rejections);
        config.validate().unwrap();
    }

    #[test]
    fn test_presets_validate() {
        for network in [NetworkType::Mainnet, NetworkType::Testnet, NetworkType::Devnet] {
            let config = RegistryConfig::new(network);
            assert_eq!(config.network, network);
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_validation() {
        let mut config = RegistryConfig::devnet();
        config.blocks_per_epoch = 0;
        assert!(config.validate().is_err());

        let mut config = RegistryConfig::devnet();
        config.min_block_reward = config.block_reward + U256::from(1);
        assert!(config.validate().is_err());

        let mut config = RegistryConfig::devnet();
        config.reward_halving_interval = 0;
        assert!(config.validate().is_err());

        let mut config = RegistryConfig::devnet();
        config.max_ticket_age = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_network_from_str() {
        assert_eq!("Mainnet".parse::<NetworkType>().unwrap(), NetworkType::Mainnet);
        assert_eq!("dev".parse::<NetworkType>().unwrap(), NetworkType::Devnet);
        assert!("moon".parse::<NetworkType>().is_err());
    }

    #[test]
    fn test_toml_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");

        let config = RegistryConfig::testnet().with_emit_rejections(true);
        config.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("network = \"testnet\""));
        assert_eq!(RegistryConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_json_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, r#"{ "emit_rejections": true, "blocks_per_epoch": 8 }"#).unwrap();

        let config = RegistryConfig::load(&path).unwrap();
        assert!(config.emit_rejections);
        assert_eq!(config.blocks_per_epoch, 8);
        assert_eq!(config.stake_maturation_blocks, 3);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, r#"{ "blocks_per_epoch": 0 }"#).unwrap();

        assert!(matches!(RegistryConfig::load(&path), Err(ConfigError::InvalidConfig(_))));
    }
}
