// src/config.rs

//! --- Ledger Configuration ---
//! Reward schedule, balance policy, acceptance policies and their tuning,
//! deserialized from a TOML file and validated before use.

use crate::authority::{AuthorityRegistry, AuthoritySet};
use crate::balances::BalanceMode;
use crate::value::Dimension;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::instrument;

// --- Constants for Validation ---
const MAX_LEADING_ZEROS: u32 = 64;
const MAX_MINING_THREADS: usize = 256;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from '{path}': {source}")]
    Load {
        path: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to save configuration to '{path}': {source}")]
    Save {
        path: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Validation failed: {0}")]
    Validation(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Authority,
    Difficulty,
    ValueThreshold,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LedgerConfig {
    pub network_id: String,
    /// Enabled acceptance policies; a block must pass all of them.
    pub policies: Vec<PolicyKind>,
    #[serde(default)]
    pub authorities: Vec<AuthorityConfig>,
    pub rewards: RewardConfig,
    pub balances: BalanceConfig,
    pub difficulty: DifficultyConfig,
    pub proof_of_value: ProofOfValueConfig,
    pub mining: MiningConfig,
    pub logging: LoggingConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthorityConfig {
    pub id: String,
    pub public_key_hex: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RewardConfig {
    /// Issued to the block author on every appended block.
    pub block_reward: f64,
    pub block_reward_dimension: Dimension,
    /// Per-dimension multipliers applied to an embedded solution's value
    /// vector. Dimensions not listed use 1.0.
    pub multipliers: BTreeMap<String, f64>,
}

impl RewardConfig {
    pub fn multiplier(&self, dimension: Dimension) -> f64 {
        self.multipliers
            .get(dimension.as_str())
            .copied()
            .unwrap_or(1.0)
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        let mut multipliers = BTreeMap::new();
        multipliers.insert(Dimension::Originality.as_str().to_string(), 1.5);
        multipliers.insert(Dimension::Consciousness.as_str().to_string(), 2.0);
        Self {
            block_reward: 10.0,
            block_reward_dimension: Dimension::Knowledge,
            multipliers,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct BalanceConfig {
    pub mode: BalanceMode,
    /// Optional cap on value created without a matching debit, per dimension.
    #[serde(default)]
    pub supply_ceiling: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DifficultyConfig {
    pub base: f64,
    pub step: f64,
    pub max_leading_zeros: u32,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            base: 1.0,
            step: 0.01,
            max_leading_zeros: 6,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProofOfValueConfig {
    pub min_score: f64,
    pub max_task_difficulty: f64,
    pub novelty_scale: f64,
    pub complexity_scale: f64,
    pub value_scale: f64,
    pub novelty_weight: f64,
    pub complexity_weight: f64,
    pub value_weight: f64,
    /// Reject blocks that carry no solution at all.
    pub require_solution: bool,
}

impl Default for ProofOfValueConfig {
    fn default() -> Self {
        Self {
            min_score: 1.0,
            max_task_difficulty: 10.0,
            novelty_scale: 10.0,
            complexity_scale: 20.0,
            value_scale: 50.0,
            novelty_weight: 0.5,
            complexity_weight: 0.3,
            value_weight: 0.2,
            require_solution: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MiningConfig {
    pub max_iterations: u64,
    pub timeout_ms: u64,
    pub threads: usize,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5_000_000,
            timeout_ms: 10_000,
            threads: 2,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            network_id: "forge-devnet".to_string(),
            policies: vec![],
            authorities: vec![],
            rewards: RewardConfig::default(),
            balances: BalanceConfig::default(),
            difficulty: DifficultyConfig::default(),
            proof_of_value: ProofOfValueConfig::default(),
            mining: MiningConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl LedgerConfig {
    #[instrument]
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        if !Path::new(path).exists() {
            let default_config = LedgerConfig::default();
            default_config.save(path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path)
            .context("Failed to read configuration file.")
            .map_err(|source| ConfigError::Load {
                path: path.to_string(),
                source,
            })?;
        let config: LedgerConfig = toml::from_str(&content)
            .context("Failed to parse TOML from configuration file.")
            .map_err(|source| ConfigError::Load {
                path: path.to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    #[instrument(skip(self))]
    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)
            .context("Failed to serialize configuration to TOML.")
            .map_err(|source| ConfigError::Save {
                path: path.to_string(),
                source,
            })?;
        fs::write(path, toml_string)
            .context("Failed to write configuration to file.")
            .map_err(|source| ConfigError::Save {
                path: path.to_string(),
                source,
            })?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network_id.is_empty() {
            return Err(ConfigError::Validation(
                "network_id cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for kind in &self.policies {
            if !seen.insert(kind) {
                return Err(ConfigError::Validation(format!(
                    "policy {kind:?} is listed more than once"
                )));
            }
        }
        if self.policies.contains(&PolicyKind::Authority) && self.authorities.is_empty() {
            return Err(ConfigError::Validation(
                "the authority policy is enabled but no authorities are configured".to_string(),
            ));
        }
        // Building the set checks ids and keys.
        self.authority_set()?;

        let r = &self.rewards;
        require_non_negative("rewards.block_reward", r.block_reward)?;
        for (name, m) in &r.multipliers {
            name.parse::<Dimension>()
                .map_err(|e| ConfigError::Validation(format!("rewards.multipliers: {e}")))?;
            require_non_negative(&format!("rewards.multipliers.{name}"), *m)?;
        }

        if let Some(ceiling) = self.balances.supply_ceiling {
            if !ceiling.is_finite() || ceiling <= 0.0 {
                return Err(ConfigError::Validation(
                    "balances.supply_ceiling must be a positive number".to_string(),
                ));
            }
        }

        let d = &self.difficulty;
        require_non_negative("difficulty.base", d.base)?;
        require_non_negative("difficulty.step", d.step)?;
        if d.max_leading_zeros > MAX_LEADING_ZEROS {
            return Err(ConfigError::Validation(format!(
                "difficulty.max_leading_zeros cannot exceed {MAX_LEADING_ZEROS}"
            )));
        }

        let p = &self.proof_of_value;
        require_non_negative("proof_of_value.min_score", p.min_score)?;
        for (name, v) in [
            ("proof_of_value.max_task_difficulty", p.max_task_difficulty),
            ("proof_of_value.novelty_scale", p.novelty_scale),
            ("proof_of_value.complexity_scale", p.complexity_scale),
            ("proof_of_value.value_scale", p.value_scale),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "{name} must be a positive number"
                )));
            }
        }
        for (name, v) in [
            ("proof_of_value.novelty_weight", p.novelty_weight),
            ("proof_of_value.complexity_weight", p.complexity_weight),
            ("proof_of_value.value_weight", p.value_weight),
        ] {
            require_non_negative(name, v)?;
        }
        if p.novelty_weight + p.complexity_weight + p.value_weight <= 0.0 {
            return Err(ConfigError::Validation(
                "proof_of_value weights cannot all be zero".to_string(),
            ));
        }

        let m = &self.mining;
        if m.max_iterations == 0 || m.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "mining.max_iterations and mining.timeout_ms must be positive".to_string(),
            ));
        }
        if m.threads == 0 || m.threads > MAX_MINING_THREADS {
            return Err(ConfigError::Validation(format!(
                "mining.threads must be between 1 and {MAX_MINING_THREADS}"
            )));
        }

        Ok(())
    }

    pub fn authority_set(&self) -> Result<AuthoritySet, ConfigError> {
        let mut set = AuthoritySet::new();
        for authority in &self.authorities {
            if set.contains(&authority.id) {
                return Err(ConfigError::Validation(format!(
                    "authority '{}' is listed more than once",
                    authority.id
                )));
            }
            set.insert(&authority.id, &authority.public_key_hex)
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }
        Ok(set)
    }

    pub fn authority_registry(&self) -> Result<AuthorityRegistry, ConfigError> {
        Ok(AuthorityRegistry::new(self.authority_set()?))
    }
}

fn require_non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{name} must be a finite, non-negative number"
        )));
    }
    Ok(())
}
