//! --- Block Acceptance Policies ---
//!
//! A policy is a pure decision over a candidate block and a read-only view of
//! the chain it would extend. Policies never mutate ledger state.
//!
//! ### Available policies
//!
//! 1.  **Authority**: the author must belong to the authority set and the
//!     block signature must verify against the author's registered key over
//!     the canonical block bytes. The set is snapshotted once per evaluation,
//!     so a governance change cannot land halfway through a check.
//! 2.  **Difficulty**: a toy, deterministic difficulty ramp. The block hash
//!     must start with `min(floor(base + step * chain_length), max)` zero hex
//!     characters. This is not an adjustable-target proof-of-work and offers
//!     no protection against a determined miner.
//! 3.  **Value threshold**: see [`crate::proof_of_value`].
//!
//! Deployments combine policies with [`CompositePolicy`], which accepts a
//! block only when every member accepts it.

use crate::authority::AuthorityRegistry;
use crate::block::KnowledgeBlock;
use crate::codec;
use crate::config::{DifficultyConfig, LedgerConfig, PolicyKind};
use crate::proof_of_value::ValueThresholdPolicy;
use crate::value::ValueVector;
use crate::wallet;
use std::fmt::Debug;
use thiserror::Error;
use tracing::{debug, instrument};

/// Why a policy declined a block. Carried inside `LedgerError::PolicyRejected`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyRejection {
    #[error("Author '{0}' is not in the authority set")]
    UnknownAuthor(String),
    #[error("Block from '{0}' carries no signature")]
    MissingSignature(String),
    #[error("Signature from '{author}' does not verify: {reason}")]
    InvalidSignature { author: String, reason: String },
    #[error("Difficulty mismatch: block claims {claimed}, chain requires {required}")]
    DifficultyMismatch { claimed: u32, required: u32 },
    #[error("Proof-of-work not met: hash {hash} has {found} leading zeros, needs {required}")]
    InsufficientWork {
        hash: String,
        found: u32,
        required: u32,
    },
    #[error("Block carries no solution")]
    MissingSolution,
    #[error("Value score {score:.4} is below the minimum {minimum:.4}")]
    ValueBelowThreshold { score: f64, minimum: f64 },
    #[error("Value score {0} is not a finite number")]
    ScoreNotFinite(f64),
    #[error("Block could not be encoded for evaluation: {0}")]
    Encoding(String),
}

impl PolicyRejection {
    /// Short machine-readable label, used as a metrics dimension.
    pub fn label(&self) -> &'static str {
        match self {
            PolicyRejection::UnknownAuthor(_) => "unknown_author",
            PolicyRejection::MissingSignature(_) => "missing_signature",
            PolicyRejection::InvalidSignature { .. } => "invalid_signature",
            PolicyRejection::DifficultyMismatch { .. } => "difficulty_mismatch",
            PolicyRejection::InsufficientWork { .. } => "insufficient_work",
            PolicyRejection::MissingSolution => "missing_solution",
            PolicyRejection::ValueBelowThreshold { .. } => "value_below_threshold",
            PolicyRejection::ScoreNotFinite(_) => "score_not_finite",
            PolicyRejection::Encoding(_) => "encoding",
        }
    }
}

/// Read-only chain state a policy may consult.
#[derive(Debug, Clone, Copy)]
pub struct ChainView<'a> {
    /// Blocks already in the chain, which is also the candidate's expected index.
    pub length: u64,
    pub tip_hash: &'a str,
    /// Value vectors of solutions embedded in earlier blocks, in chain order.
    pub accepted_solutions: &'a [ValueVector],
}

pub trait AcceptancePolicy: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn evaluate(&self, block: &KnowledgeBlock, chain: &ChainView<'_>) -> Result<(), PolicyRejection>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl AcceptancePolicy for AcceptAll {
    fn name(&self) -> &'static str {
        "accept_all"
    }

    fn evaluate(&self, _block: &KnowledgeBlock, _chain: &ChainView<'_>) -> Result<(), PolicyRejection> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AuthorityPolicy {
    registry: AuthorityRegistry,
}

impl AuthorityPolicy {
    pub fn new(registry: AuthorityRegistry) -> Self {
        Self { registry }
    }
}

impl AcceptancePolicy for AuthorityPolicy {
    fn name(&self) -> &'static str {
        "authority"
    }

    #[instrument(skip(self, block, _chain), fields(index = block.index, author = %block.author_id))]
    fn evaluate(&self, block: &KnowledgeBlock, _chain: &ChainView<'_>) -> Result<(), PolicyRejection> {
        if block.is_genesis() {
            return Ok(());
        }
        let authorities = self.registry.snapshot();
        let public_key = authorities
            .public_key(&block.author_id)
            .ok_or_else(|| PolicyRejection::UnknownAuthor(block.author_id.clone()))?;
        if block.signature.is_empty() {
            return Err(PolicyRejection::MissingSignature(block.author_id.clone()));
        }
        let message = block
            .signing_bytes()
            .map_err(|e| PolicyRejection::Encoding(e.to_string()))?;
        wallet::verify(public_key, &block.signature, &message).map_err(|e| {
            PolicyRejection::InvalidSignature {
                author: block.author_id.clone(),
                reason: e.to_string(),
            }
        })?;
        debug!(epoch = authorities.epoch(), "Authority check passed");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DifficultyPolicy {
    base: f64,
    step: f64,
    max_leading_zeros: u32,
}

impl DifficultyPolicy {
    pub fn new(base: f64, step: f64, max_leading_zeros: u32) -> Self {
        Self {
            base,
            step,
            max_leading_zeros,
        }
    }

    pub fn from_config(config: &DifficultyConfig) -> Self {
        Self::new(config.base, config.step, config.max_leading_zeros)
    }

    /// Leading zero hex characters required of a block extending a chain of
    /// `chain_length` blocks.
    pub fn required_difficulty(&self, chain_length: u64) -> u32 {
        let ramp = (self.base + self.step * chain_length as f64).floor();
        if !ramp.is_finite() || ramp <= 0.0 {
            return 0;
        }
        (ramp as u64).min(self.max_leading_zeros as u64) as u32
    }
}

impl Default for DifficultyPolicy {
    fn default() -> Self {
        Self::from_config(&DifficultyConfig::default())
    }
}

impl AcceptancePolicy for DifficultyPolicy {
    fn name(&self) -> &'static str {
        "difficulty"
    }

    #[instrument(skip(self, block, chain), fields(index = block.index))]
    fn evaluate(&self, block: &KnowledgeBlock, chain: &ChainView<'_>) -> Result<(), PolicyRejection> {
        if block.is_genesis() {
            return Ok(());
        }
        let required = self.required_difficulty(chain.length);
        if block.difficulty != required {
            return Err(PolicyRejection::DifficultyMismatch {
                claimed: block.difficulty,
                required,
            });
        }
        let hash = block
            .hash()
            .map_err(|e| PolicyRejection::Encoding(e.to_string()))?;
        let found = codec::leading_zero_hex(&hash);
        if found < required {
            return Err(PolicyRejection::InsufficientWork {
                hash,
                found,
                required,
            });
        }
        Ok(())
    }
}

/// Logical AND over its members, evaluated in order. The first rejection wins.
#[derive(Debug, Default)]
pub struct CompositePolicy {
    policies: Vec<Box<dyn AcceptancePolicy>>,
}

impl CompositePolicy {
    pub fn new(policies: Vec<Box<dyn AcceptancePolicy>>) -> Self {
        Self { policies }
    }

    pub fn with(mut self, policy: impl AcceptancePolicy + 'static) -> Self {
        self.policies.push(Box::new(policy));
        self
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.policies.iter().map(|p| p.name()).collect()
    }
}

impl AcceptancePolicy for CompositePolicy {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn evaluate(&self, block: &KnowledgeBlock, chain: &ChainView<'_>) -> Result<(), PolicyRejection> {
        for policy in &self.policies {
            policy.evaluate(block, chain).inspect_err(|reason| {
                debug!(policy = policy.name(), %reason, "Policy declined block");
            })?;
        }
        Ok(())
    }
}

/// Builds the configured policy stack. An empty `policies` list yields a
/// composite that accepts every structurally valid block.
pub fn build_policy(config: &LedgerConfig, registry: AuthorityRegistry) -> CompositePolicy {
    let mut composite = CompositePolicy::default();
    for kind in &config.policies {
        composite = match kind {
            PolicyKind::Authority => composite.with(AuthorityPolicy::new(registry.clone())),
            PolicyKind::Difficulty => {
                composite.with(DifficultyPolicy::from_config(&config.difficulty))
            }
            PolicyKind::ValueThreshold => {
                composite.with(ValueThresholdPolicy::from_config(&config.proof_of_value))
            }
        };
    }
    composite
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockCreationData;
    use crate::wallet::Wallet;
    use std::collections::BTreeMap;

    fn candidate(author: &str, difficulty: u32) -> KnowledgeBlock {
        let genesis_hash = KnowledgeBlock::genesis().hash().unwrap();
        KnowledgeBlock::new(BlockCreationData {
            index: 1,
            previous_hash: genesis_hash,
            author_id: author.to_string(),
            transactions: vec![],
            solution: None,
            difficulty,
            timestamp: 100,
            metadata: BTreeMap::new(),
        })
    }

    fn view(length: u64) -> ChainView<'static> {
        ChainView {
            length,
            tip_hash: codec::ZERO_HASH,
            accepted_solutions: &[],
        }
    }

    #[test]
    fn authority_policy_checks_membership_and_signature() {
        let wallet = Wallet::new();
        let registry = AuthorityRegistry::default();
        registry.add_authority("node-a", &wallet.address()).unwrap();
        let policy = AuthorityPolicy::new(registry);

        let mut block = candidate("node-a", 0);
        assert!(matches!(
            policy.evaluate(&block, &view(1)),
            Err(PolicyRejection::MissingSignature(_))
        ));

        block.sign(&wallet).unwrap();
        assert!(policy.evaluate(&block, &view(1)).is_ok());

        let mut forged = candidate("node-a", 0);
        forged.sign(&Wallet::new()).unwrap();
        assert!(matches!(
            policy.evaluate(&forged, &view(1)),
            Err(PolicyRejection::InvalidSignature { .. })
        ));

        let stranger = candidate("node-b", 0);
        assert_eq!(
            policy.evaluate(&stranger, &view(1)),
            Err(PolicyRejection::UnknownAuthor("node-b".to_string()))
        );
    }

    #[test]
    fn authority_policy_exempts_genesis() {
        let policy = AuthorityPolicy::new(AuthorityRegistry::default());
        assert!(policy
            .evaluate(&KnowledgeBlock::genesis(), &view(0))
            .is_ok());
    }

    #[test]
    fn difficulty_ramps_with_chain_length_and_is_capped() {
        let policy = DifficultyPolicy::new(1.0, 0.01, 3);
        assert_eq!(policy.required_difficulty(0), 1);
        assert_eq!(policy.required_difficulty(99), 1);
        assert_eq!(policy.required_difficulty(100), 2);
        assert_eq!(policy.required_difficulty(10_000), 3);
        assert_eq!(DifficultyPolicy::new(0.0, 0.0, 6).required_difficulty(5), 0);
    }

    #[test]
    fn difficulty_policy_requires_matching_claim_and_work() {
        let policy = DifficultyPolicy::new(0.0, 0.0, 6);
        assert!(policy.evaluate(&candidate("a", 0), &view(1)).is_ok());
        assert!(matches!(
            policy.evaluate(&candidate("a", 2), &view(1)),
            Err(PolicyRejection::DifficultyMismatch { claimed: 2, required: 0 })
        ));

        let strict = DifficultyPolicy::new(64.0, 0.0, 64);
        assert!(matches!(
            strict.evaluate(&candidate("a", 64), &view(1)),
            Err(PolicyRejection::InsufficientWork { required: 64, .. })
        ));
    }

    #[test]
    fn composite_requires_every_member() {
        let wallet = Wallet::new();
        let registry = AuthorityRegistry::default();
        registry.add_authority("node-a", &wallet.address()).unwrap();
        let composite = CompositePolicy::default()
            .with(AuthorityPolicy::new(registry))
            .with(DifficultyPolicy::new(0.0, 0.0, 0));
        assert_eq!(composite.names(), vec!["authority", "difficulty"]);

        let mut block = candidate("node-a", 0);
        block.sign(&wallet).unwrap();
        assert!(composite.evaluate(&block, &view(1)).is_ok());

        let mut wrong_difficulty = candidate("node-a", 1);
        wrong_difficulty.sign(&wallet).unwrap();
        assert!(matches!(
            composite.evaluate(&wrong_difficulty, &view(1)),
            Err(PolicyRejection::DifficultyMismatch { .. })
        ));
    }

    #[test]
    fn build_policy_follows_config_order() {
        let mut config = LedgerConfig::default();
        assert!(build_policy(&config, AuthorityRegistry::default()).is_empty());
        config.policies = vec![PolicyKind::Difficulty, PolicyKind::ValueThreshold];
        let policy = build_policy(&config, AuthorityRegistry::default());
        assert_eq!(policy.names(), vec!["difficulty", "value_threshold"]);
    }
}
