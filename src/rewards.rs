//! --- Reward Derivation ---
//! Rewards are not stored in the sealed block. They are recomputed from the
//! block and the reward schedule every time the block is applied, so replaying
//! a chain reproduces the same balances.

use crate::block::KnowledgeBlock;
use crate::config::RewardConfig;
use crate::transaction::{Transaction, TransactionError};
use crate::value::Dimension;

/// System-issued transactions owed for `block`, in a fixed order: the author's
/// block reward first, then one credit per positive solution dimension.
pub fn derive_rewards(
    block: &KnowledgeBlock,
    config: &RewardConfig,
) -> Result<Vec<Transaction>, TransactionError> {
    if block.is_genesis() {
        return Ok(vec![]);
    }

    let mut rewards = Vec::new();
    if config.block_reward > 0.0 {
        rewards.push(Transaction::system(
            block.author_id.as_str(),
            config.block_reward,
            config.block_reward_dimension,
            block.timestamp,
        )?);
    }

    if let Some(solution) = &block.solution {
        for dimension in Dimension::ALL {
            let amount = solution.value_vector.get(dimension) * config.multiplier(dimension);
            if amount > 0.0 {
                rewards.push(Transaction::system(
                    solution.solver_id.as_str(),
                    amount,
                    dimension,
                    block.timestamp,
                )?);
            }
        }
    }
    Ok(rewards)
}
