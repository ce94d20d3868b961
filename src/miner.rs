//! --- Toy Miner ---
//! Searches nonces until the block hash carries the required number of leading
//! zero hex characters. The search is bounded by an iteration cap and a
//! wall-clock timeout, and gives up with [`MiningError::TimeoutOrCancelled`]
//! when either is hit. This is a deterministic difficulty ramp for tests and
//! demos, not hardened proof-of-work.

use crate::block::KnowledgeBlock;
use crate::codec::{self, CodecError};
use crate::config::MiningConfig;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, instrument, warn};

/// How often (in attempts) a worker looks at the clock.
const TIMEOUT_CHECK_INTERVAL: u64 = 4_096;

#[derive(Error, Debug)]
pub enum MiningError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Thread pool build error: {0}")]
    ThreadPool(String),
    #[error("Mining operation timed out or was cancelled without finding a solution")]
    TimeoutOrCancelled,
}

impl From<rayon::ThreadPoolBuildError> for MiningError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        MiningError::ThreadPool(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningOutcome {
    pub nonce: u64,
    pub hash: String,
    pub attempts: u64,
}

#[derive(Debug, Clone)]
pub struct Miner {
    max_iterations: u64,
    timeout: Duration,
    threads: usize,
}

impl Miner {
    pub fn new(config: &MiningConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            timeout: Duration::from_millis(config.timeout_ms),
            threads: config.threads.max(1),
        }
    }

    /// Sets `block.difficulty` to `required` and searches for a nonce. On
    /// success the nonce is written into `block`; on failure `block` keeps
    /// its original nonce.
    #[instrument(skip(self, block), fields(index = block.index))]
    pub fn solve(
        &self,
        block: &mut KnowledgeBlock,
        required: u32,
    ) -> Result<MiningOutcome, MiningError> {
        block.difficulty = required;
        let template = block.clone();
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()?;
        let start = Instant::now();
        let cancelled = AtomicBool::new(false);
        let attempts = AtomicU64::new(0);

        let found = thread_pool.install(|| {
            (0..self.max_iterations)
                .into_par_iter()
                .find_map_first(|nonce| {
                    if cancelled.load(Ordering::Relaxed) {
                        return None;
                    }
                    let count = attempts.fetch_add(1, Ordering::Relaxed);
                    if count % TIMEOUT_CHECK_INTERVAL == 0 && start.elapsed() > self.timeout {
                        cancelled.store(true, Ordering::Relaxed);
                        return None;
                    }
                    let mut candidate = template.clone();
                    candidate.nonce = nonce;
                    let hash = codec::hash_block(&candidate).ok()?;
                    (codec::leading_zero_hex(&hash) >= required).then_some((nonce, hash))
                })
        });

        let attempts = attempts.load(Ordering::Relaxed);
        match found {
            Some((nonce, hash)) => {
                block.nonce = nonce;
                info!(nonce, attempts, %hash, "Proof-of-work found");
                Ok(MiningOutcome {
                    nonce,
                    hash,
                    attempts,
                })
            }
            None => {
                warn!(
                    attempts,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Mining gave up without a solution"
                );
                Err(MiningError::TimeoutOrCancelled)
            }
        }
    }
}

impl Default for Miner {
    fn default() -> Self {
        Self::new(&MiningConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockCreationData;
    use std::collections::BTreeMap;

    fn template() -> KnowledgeBlock {
        KnowledgeBlock::new(BlockCreationData {
            index: 1,
            previous_hash: KnowledgeBlock::genesis().hash().unwrap(),
            author_id: "miner".to_string(),
            transactions: vec![],
            solution: None,
            difficulty: 0,
            timestamp: 3,
            metadata: BTreeMap::new(),
        })
    }

    #[test]
    fn finds_a_nonce_for_low_difficulty() {
        let miner = Miner::default();
        let mut block = template();
        let outcome = miner.solve(&mut block, 2).unwrap();
        assert_eq!(block.nonce, outcome.nonce);
        assert_eq!(block.difficulty, 2);
        assert_eq!(block.hash().unwrap(), outcome.hash);
        assert!(outcome.hash.starts_with("00"));
    }

    #[test]
    fn gives_up_at_the_iteration_cap() {
        let miner = Miner::new(&MiningConfig {
            max_iterations: 16,
            timeout_ms: 10_000,
            threads: 1,
        });
        let mut block = template();
        assert!(matches!(
            miner.solve(&mut block, 64),
            Err(MiningError::TimeoutOrCancelled)
        ));
        assert_eq!(block.nonce, 0);
    }

    #[test]
    fn gives_up_at_the_wall_clock_cap() {
        let miner = Miner::new(&MiningConfig {
            max_iterations: 10_000_000,
            timeout_ms: 1,
            threads: 1,
        });
        let mut block = template();
        let start = Instant::now();
        assert!(matches!(
            miner.solve(&mut block, 64),
            Err(MiningError::TimeoutOrCancelled)
        ));
        // Hashing ten million candidates takes far longer than this.
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(block.nonce, 0);
    }
}
