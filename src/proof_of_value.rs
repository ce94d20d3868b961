//! --- Proof of Value ---
//!
//! A heuristic acceptance gate for blocks carrying a [`Solution`]. It scores
//! the solution and accepts when the score reaches a configured minimum:
//!
//! ```text
//! score = total_value × modernity_rate × (task_difficulty / max_difficulty) × validator_multiplier
//! validator_multiplier = 1 + ln(1 + validators) / ln(1 + 10)
//! ```
//!
//! The modernity rate blends three bounded terms, each squashed into [0, 1]
//! with `tanh`:
//! - novelty: Euclidean distance from the mean of previously accepted solutions
//!   (1.0 when nothing has been accepted yet),
//! - complexity: the knowledge and computation dimensions,
//! - raw value: the solution's total value.
//!
//! None of this has been analysed against an adversary. It is a tunable filter
//! against low-value submissions, not a security guarantee.
//!
//! [`Solution`]: crate::block::Solution

use crate::block::{KnowledgeBlock, META_TASK_DIFFICULTY, META_VALIDATORS};
use crate::config::ProofOfValueConfig;
use crate::consensus::{AcceptancePolicy, ChainView, PolicyRejection};
use crate::value::ValueVector;
use tracing::{debug, instrument};

/// Validator count at which the multiplier reaches 2.0.
const VALIDATOR_REFERENCE: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct ValueThresholdPolicy {
    config: ProofOfValueConfig,
}

impl ValueThresholdPolicy {
    pub fn from_config(config: &ProofOfValueConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &ProofOfValueConfig {
        &self.config
    }

    /// Blend of novelty, complexity and raw value, in [0, 1].
    pub fn modernity_rate(&self, candidate: &ValueVector, prior: &[ValueVector]) -> f64 {
        let c = &self.config;
        let novelty = match ValueVector::mean(prior) {
            Some(mean) => (candidate.euclidean_distance(&mean) / c.novelty_scale).tanh(),
            None => 1.0,
        };
        let complexity =
            ((candidate.knowledge + candidate.computation) / c.complexity_scale).tanh();
        let raw = (candidate.total_value() / c.value_scale).tanh();

        let weights = c.novelty_weight + c.complexity_weight + c.value_weight;
        if weights <= 0.0 {
            return 0.0;
        }
        let blended =
            (c.novelty_weight * novelty + c.complexity_weight * complexity + c.value_weight * raw)
                / weights;
        blended.clamp(0.0, 1.0)
    }

    /// Full score of `block`'s solution against the prior accepted solutions.
    /// `None` when the block carries no solution.
    pub fn value_score(&self, block: &KnowledgeBlock, prior: &[ValueVector]) -> Option<f64> {
        let solution = block.solution.as_ref()?;
        let max = self.config.max_task_difficulty;
        // A non-positive or non-finite ceiling has no meaningful ratio.
        let difficulty_factor = if max.is_finite() && max > 0.0 {
            block
                .metadata_f64(META_TASK_DIFFICULTY)
                .unwrap_or(max)
                .clamp(0.0, max)
                / max
        } else {
            f64::NAN
        };
        let validators = block.metadata_u64(META_VALIDATORS).unwrap_or(0);

        let vector = &solution.value_vector;
        Some(
            vector.total_value()
                * self.modernity_rate(vector, prior)
                * difficulty_factor
                * validator_multiplier(validators),
        )
    }
}

impl Default for ValueThresholdPolicy {
    fn default() -> Self {
        Self::from_config(&ProofOfValueConfig::default())
    }
}

/// `1 + ln(1 + validators) / ln(11)`: 1.0 with no validators, 2.0 at ten.
pub fn validator_multiplier(validators: u64) -> f64 {
    1.0 + (validators as f64).ln_1p() / VALIDATOR_REFERENCE.ln_1p()
}

impl AcceptancePolicy for ValueThresholdPolicy {
    fn name(&self) -> &'static str {
        "value_threshold"
    }

    #[instrument(skip(self, block, chain), fields(index = block.index))]
    fn evaluate(&self, block: &KnowledgeBlock, chain: &ChainView<'_>) -> Result<(), PolicyRejection> {
        if block.is_genesis() {
            return Ok(());
        }
        let Some(score) = self.value_score(block, chain.accepted_solutions) else {
            if self.config.require_solution {
                return Err(PolicyRejection::MissingSolution);
            }
            return Ok(());
        };
        debug!(score, minimum = self.config.min_score, "Solution scored");
        if !score.is_finite() {
            return Err(PolicyRejection::ScoreNotFinite(score));
        }
        if score < self.config.min_score {
            return Err(PolicyRejection::ValueBelowThreshold {
                score,
                minimum: self.config.min_score,
            });
        }
        Ok(())
    }
}
