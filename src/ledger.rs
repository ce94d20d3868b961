//! --- Knowledge Ledger ---
//!
//! The authoritative, append-only block sequence together with the state
//! derived from it: per-account balances and the running value total.
//!
//! Every mutation goes through [`Ledger::append_block`], which runs a
//! candidate through three stages in order and stops at the first failure:
//!
//! 1.  **Structure**: field checks, `index == len(chain)`, and
//!     `previous_hash == hash(tip)`.
//! 2.  **Policy**: the configured [`AcceptancePolicy`].
//! 3.  **Apply**: reward derivation, balance application, value accumulation.
//!
//! The apply stage either commits all of its effects or none of them. The
//! ledger never repairs itself: any inconsistency found by
//! [`Ledger::validate_full_chain`] is reported with the first failing index.

use crate::balances::{ApplyReport, BalanceError, BalanceLedger, BalanceTable};
use crate::block::{BlockCreationData, KnowledgeBlock, Solution, BLOCK_FORMAT_VERSION};
use crate::codec::{self, CodecError, ZERO_HASH};
use crate::config::{BalanceConfig, LedgerConfig, RewardConfig};
use crate::consensus::{AcceptancePolicy, ChainView, PolicyRejection};
use crate::metrics::{BLOCKS_APPENDED, BLOCKS_REJECTED, CHAIN_REPLACEMENTS};
use crate::rewards;
use crate::schema::{self, SchemaError, VersionedBlock};
use crate::transaction::{Transaction, TransactionError, SYSTEM_SENDER};
use crate::value::{Dimension, ValueVector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Relative tolerance when comparing replayed balances with exported ones.
const BALANCE_TOLERANCE: f64 = 1e-9;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Malformed block: {0}")]
    MalformedBlock(String),
    #[error("Bad index: expected {expected}, got {got}")]
    BadIndex { expected: u64, got: u64 },
    #[error("Bad previous hash: expected {expected}, got {got}")]
    BadPreviousHash { expected: String, got: String },
    #[error("Rejected by policy: {0}")]
    PolicyRejected(#[from] PolicyRejection),
    #[error("Genesis block already exists")]
    GenesisAlreadyExists,
    #[error("Ledger has no genesis block")]
    EmptyChain,
    #[error("Balance error: {0}")]
    Balance(#[from] BalanceError),
    #[error("Reward derivation failed: {0}")]
    Reward(#[from] TransactionError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("Snapshot balance mismatch for {account}/{dimension}: exported {exported}, replayed {replayed}")]
    SnapshotMismatch {
        account: String,
        dimension: Dimension,
        exported: f64,
        replayed: f64,
    },
    #[error("Chain validation failed: {0}")]
    Validation(#[from] ChainValidationError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl LedgerError {
    /// Short machine-readable reason, also used as a metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            LedgerError::MalformedBlock(_) => "malformed_block",
            LedgerError::BadIndex { .. } => "bad_index",
            LedgerError::BadPreviousHash { .. } => "bad_previous_hash",
            LedgerError::PolicyRejected(r) => r.label(),
            LedgerError::GenesisAlreadyExists => "genesis_already_exists",
            LedgerError::EmptyChain => "empty_chain",
            LedgerError::Balance(_) => "balance",
            LedgerError::Reward(_) => "reward",
            LedgerError::Codec(_) => "codec",
            LedgerError::Schema(_) => "schema",
            LedgerError::SnapshotMismatch { .. } => "snapshot_mismatch",
            LedgerError::Validation(_) => "validation",
            LedgerError::Task(_) => "task",
        }
    }
}

/// What went wrong at the first failing block of a chain.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainFault {
    #[error("chain does not start with the canonical genesis block")]
    BadGenesis,
    #[error("index {got} does not match position {expected}")]
    BadIndex { expected: u64, got: u64 },
    #[error("hash mismatch during validation: previous_hash {found}, predecessor hashes to {expected}")]
    HashMismatchDuringValidation { expected: String, found: String },
    #[error("malformed block: {0}")]
    Malformed(String),
    #[error("rejected by policy: {0}")]
    PolicyRejected(PolicyRejection),
    #[error("balance replay failed: {0}")]
    Balance(BalanceError),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Chain invalid at block {index}: {fault}")]
pub struct ChainValidationError {
    pub index: u64,
    pub fault: ChainFault,
}

impl ChainValidationError {
    fn at(index: u64, fault: ChainFault) -> Self {
        Self { index, fault }
    }

    fn from_append(index: u64, err: LedgerError) -> Self {
        let fault = match err {
            LedgerError::BadIndex { expected, got } => ChainFault::BadIndex { expected, got },
            LedgerError::BadPreviousHash { expected, got } => {
                ChainFault::HashMismatchDuringValidation {
                    expected,
                    found: got,
                }
            }
            LedgerError::PolicyRejected(r) => ChainFault::PolicyRejected(r),
            LedgerError::Balance(b) => ChainFault::Balance(b),
            other => ChainFault::Malformed(other.to_string()),
        };
        Self::at(index, fault)
    }
}

/// Returned by a successful [`Ledger::append_block`].
#[derive(Debug, Clone, PartialEq)]
pub struct AppendReceipt {
    pub index: u64,
    pub hash: String,
    /// Reward transactions derived and applied alongside the block.
    pub rewards: Vec<Transaction>,
    pub report: ApplyReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerStats {
    pub length: u64,
    pub total_transactions: u64,
    pub reward_transactions: u64,
    pub total_solutions: u64,
    pub total_value_created: f64,
    pub value_by_dimension: ValueVector,
    pub unique_participants: usize,
}

/// Bulk transport form of a ledger: its blocks and the balances they produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainExport {
    pub format_version: u32,
    pub blocks: Vec<VersionedBlock>,
    pub balances: BalanceTable,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    blocks: Vec<KnowledgeBlock>,
    hashes: Vec<String>,
    balances: BalanceLedger,
    total_value: ValueVector,
    value_created: f64,
    accepted_solutions: Vec<ValueVector>,
    tx_ids: HashSet<String>,
    participants: BTreeSet<String>,
    total_transactions: u64,
    reward_transactions: u64,
    reward_config: RewardConfig,
    balance_config: BalanceConfig,
}

impl Ledger {
    /// An empty ledger. Call [`Ledger::create_genesis`] before appending.
    pub fn new(reward_config: RewardConfig, balance_config: BalanceConfig) -> Self {
        Self {
            blocks: Vec::new(),
            hashes: Vec::new(),
            balances: BalanceLedger::new(balance_config.mode, balance_config.supply_ceiling),
            total_value: ValueVector::zero(),
            value_created: 0.0,
            accepted_solutions: Vec::new(),
            tx_ids: HashSet::new(),
            participants: BTreeSet::new(),
            total_transactions: 0,
            reward_transactions: 0,
            reward_config,
            balance_config,
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.rewards.clone(), config.balances.clone())
    }

    /// A ledger holding only the genesis block.
    pub fn with_genesis(
        reward_config: RewardConfig,
        balance_config: BalanceConfig,
    ) -> Result<Self, LedgerError> {
        let mut ledger = Self::new(reward_config, balance_config);
        ledger.push_genesis()?;
        Ok(ledger)
    }

    /// Seeds the chain with the fixed genesis block. A ledger that already
    /// has blocks refuses, and the caller must treat that as fatal.
    #[instrument(skip(self))]
    pub fn create_genesis(&mut self) -> Result<(), LedgerError> {
        if !self.blocks.is_empty() {
            return Err(LedgerError::GenesisAlreadyExists);
        }
        self.push_genesis()?;
        info!(hash = %self.hashes[0], "Genesis block created");
        Ok(())
    }

    fn push_genesis(&mut self) -> Result<(), CodecError> {
        let genesis = KnowledgeBlock::genesis();
        let hash = codec::hash_block(&genesis)?;
        self.blocks.push(genesis);
        self.hashes.push(hash);
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[KnowledgeBlock] {
        &self.blocks
    }

    pub fn latest_block(&self) -> Option<&KnowledgeBlock> {
        self.blocks.last()
    }

    /// Hash a successor must carry as `previous_hash`.
    pub fn tip_hash(&self) -> &str {
        self.hashes.last().map(String::as_str).unwrap_or(ZERO_HASH)
    }

    pub fn get_balance(&self, account: &str, dimension: Dimension) -> f64 {
        self.balances.get(account, dimension)
    }

    pub fn balances(&self) -> &BalanceLedger {
        &self.balances
    }

    pub fn total_value(&self) -> ValueVector {
        self.total_value
    }

    pub fn reward_config(&self) -> &RewardConfig {
        &self.reward_config
    }

    pub fn balance_config(&self) -> &BalanceConfig {
        &self.balance_config
    }

    pub fn chain_view(&self) -> ChainView<'_> {
        ChainView {
            length: self.len(),
            tip_hash: self.tip_hash(),
            accepted_solutions: &self.accepted_solutions,
        }
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            length: self.len(),
            total_transactions: self.total_transactions,
            reward_transactions: self.reward_transactions,
            total_solutions: self.accepted_solutions.len() as u64,
            total_value_created: self.value_created,
            value_by_dimension: self.total_value,
            unique_participants: self.participants.len(),
        }
    }

    /// An unsigned, unmined block extending the current tip.
    pub fn create_candidate_block(
        &self,
        author_id: &str,
        transactions: Vec<Transaction>,
        solution: Option<Solution>,
        metadata: BTreeMap<String, Value>,
    ) -> Result<KnowledgeBlock, LedgerError> {
        if self.blocks.is_empty() {
            return Err(LedgerError::EmptyChain);
        }
        Ok(KnowledgeBlock::new(BlockCreationData {
            index: self.len(),
            previous_hash: self.tip_hash().to_string(),
            author_id: author_id.to_string(),
            transactions,
            solution,
            difficulty: 0,
            timestamp: chrono::Utc::now().timestamp().max(0) as u64,
            metadata,
        }))
    }

    /// Validates `candidate` against the tip and `policy`, then applies it.
    #[instrument(skip(self, candidate, policy), fields(index = candidate.index, author = %candidate.author_id))]
    pub fn append_block(
        &mut self,
        candidate: KnowledgeBlock,
        policy: &dyn AcceptancePolicy,
    ) -> Result<AppendReceipt, LedgerError> {
        let result = self.try_append(candidate, policy);
        match &result {
            Ok(receipt) => {
                BLOCKS_APPENDED.inc();
                info!(hash = %receipt.hash, rewards = receipt.rewards.len(), "Block appended");
            }
            Err(e) => {
                BLOCKS_REJECTED.with_label_values(&[e.reason()]).inc();
                warn!(reason = e.reason(), "Block rejected: {}", e);
            }
        }
        result
    }

    fn try_append(
        &mut self,
        candidate: KnowledgeBlock,
        policy: &dyn AcceptancePolicy,
    ) -> Result<AppendReceipt, LedgerError> {
        if self.blocks.is_empty() {
            return Err(LedgerError::EmptyChain);
        }

        // --- Stage 1: structure ---
        candidate
            .validate_structure()
            .map_err(|e| LedgerError::MalformedBlock(e.to_string()))?;
        let expected = self.len();
        if candidate.index != expected {
            return Err(LedgerError::BadIndex {
                expected,
                got: candidate.index,
            });
        }
        if candidate.previous_hash != self.tip_hash() {
            return Err(LedgerError::BadPreviousHash {
                expected: self.tip_hash().to_string(),
                got: candidate.previous_hash.clone(),
            });
        }
        if let Some(tx) = candidate
            .transactions
            .iter()
            .find(|tx| self.tx_ids.contains(&tx.id))
        {
            return Err(LedgerError::MalformedBlock(format!(
                "transaction {} is already in the chain",
                tx.id
            )));
        }

        // --- Stage 2: policy ---
        policy.evaluate(&candidate, &self.chain_view())?;

        // --- Stage 3: apply ---
        let hash = candidate.hash()?;
        let rewards = rewards::derive_rewards(&candidate, &self.reward_config)?;
        let mut batch = Vec::with_capacity(candidate.transactions.len() + rewards.len());
        batch.extend(candidate.transactions.iter().cloned());
        batch.extend(rewards.iter().cloned());
        // Balances commit all-or-nothing, so nothing below can leave the
        // ledger half updated.
        let report = self.balances.apply(&batch)?;

        for tx in &batch {
            if tx.sender != SYSTEM_SENDER {
                self.participants.insert(tx.sender.clone());
            }
            self.participants.insert(tx.recipient.clone());
        }
        self.tx_ids
            .extend(candidate.transactions.iter().map(|tx| tx.id.clone()));
        self.total_transactions += candidate.transactions.len() as u64;
        self.reward_transactions += rewards.len() as u64;
        if let Some(solution) = &candidate.solution {
            self.total_value = self.total_value.add(&solution.value_vector);
            self.value_created += solution.value_vector.total_value();
            self.accepted_solutions.push(solution.value_vector);
        }
        let index = candidate.index;
        self.blocks.push(candidate);
        self.hashes.push(hash.clone());

        Ok(AppendReceipt {
            index,
            hash,
            rewards,
            report,
        })
    }

    /// Re-walks the chain from genesis, recomputing every hash and re-running
    /// `policy` against the state each block originally saw.
    pub fn validate_full_chain(
        &self,
        policy: &dyn AcceptancePolicy,
    ) -> Result<(), ChainValidationError> {
        validate_blocks(&self.blocks, policy)
    }

    pub fn is_valid_chain(&self, policy: &dyn AcceptancePolicy) -> bool {
        self.validate_full_chain(policy).is_ok()
    }

    /// Builds a fresh ledger with this ledger's settings by appending `blocks`
    /// one at a time. The first block must be the canonical genesis.
    pub fn replay(
        &self,
        blocks: Vec<KnowledgeBlock>,
        policy: &dyn AcceptancePolicy,
    ) -> Result<Ledger, ChainValidationError> {
        Self::from_blocks(
            blocks,
            policy,
            self.reward_config.clone(),
            self.balance_config.clone(),
        )
    }

    pub fn from_blocks(
        blocks: Vec<KnowledgeBlock>,
        policy: &dyn AcceptancePolicy,
        reward_config: RewardConfig,
        balance_config: BalanceConfig,
    ) -> Result<Ledger, ChainValidationError> {
        let mut iter = blocks.into_iter();
        match iter.next() {
            Some(genesis) if genesis == KnowledgeBlock::genesis() => {}
            _ => return Err(ChainValidationError::at(0, ChainFault::BadGenesis)),
        }
        let mut ledger = Self::with_genesis(reward_config, balance_config)
            .map_err(|e| ChainValidationError::from_append(0, e))?;
        for (position, block) in iter.enumerate() {
            let index = position as u64 + 1;
            ledger
                .try_append(block, policy)
                .map_err(|e| ChainValidationError::from_append(index, e))?;
        }
        debug!(length = ledger.len(), "Chain replayed");
        Ok(ledger)
    }

    /// Adopts `candidate` when it replays validly and is strictly longer than
    /// the local chain. Returns whether the chain was replaced.
    #[instrument(skip(self, candidate, policy), fields(local = self.len(), remote = candidate.len()))]
    pub fn try_replace_chain(
        &mut self,
        candidate: Vec<KnowledgeBlock>,
        policy: &dyn AcceptancePolicy,
    ) -> Result<bool, LedgerError> {
        if candidate.len() as u64 <= self.len() {
            debug!("Candidate chain is not longer; keeping local chain");
            return Ok(false);
        }
        let replayed = self.replay(candidate, policy)?;
        Ok(self.adopt_if_longer(replayed))
    }

    /// Swaps in `other` if it is strictly longer.
    pub fn adopt_if_longer(&mut self, other: Ledger) -> bool {
        if other.len() <= self.len() {
            return false;
        }
        info!(from = self.len(), to = other.len(), "Replacing local chain");
        *self = other;
        CHAIN_REPLACEMENTS.inc();
        true
    }

    pub fn to_export(&self) -> ChainExport {
        ChainExport {
            format_version: BLOCK_FORMAT_VERSION,
            blocks: self.blocks.iter().cloned().map(VersionedBlock::from).collect(),
            balances: self.balances.table().clone(),
        }
    }

    /// Rebuilds a ledger from an export by migrating and replaying every
    /// block under `policy`, then checks the replayed balances against the
    /// exported ones.
    pub fn from_export(
        export: ChainExport,
        policy: &dyn AcceptancePolicy,
        reward_config: RewardConfig,
        balance_config: BalanceConfig,
    ) -> Result<Ledger, LedgerError> {
        let blocks = schema::migrate_chain(export.blocks)?;
        let ledger = Self::from_blocks(blocks, policy, reward_config, balance_config)?;
        check_balances(&export.balances, ledger.balances.table())?;
        Ok(ledger)
    }
}

fn check_balances(exported: &BalanceTable, replayed: &BalanceTable) -> Result<(), LedgerError> {
    let accounts: BTreeSet<&String> = exported.keys().chain(replayed.keys()).collect();
    for account in accounts {
        for dimension in Dimension::ALL {
            let read = |table: &BalanceTable| {
                table
                    .get(account)
                    .and_then(|dims| dims.get(&dimension))
                    .copied()
                    .unwrap_or(0.0)
            };
            let (e, r) = (read(exported), read(replayed));
            if (e - r).abs() > BALANCE_TOLERANCE * e.abs().max(r.abs()).max(1.0) {
                return Err(LedgerError::SnapshotMismatch {
                    account: account.clone(),
                    dimension,
                    exported: e,
                    replayed: r,
                });
            }
        }
    }
    Ok(())
}

/// Checks linkage, indices and policy acceptance of a block sequence without
/// touching balances. Reports the first failing index.
pub fn validate_blocks(
    blocks: &[KnowledgeBlock],
    policy: &dyn AcceptancePolicy,
) -> Result<(), ChainValidationError> {
    match blocks.first() {
        Some(genesis) if *genesis == KnowledgeBlock::genesis() => {}
        _ => return Err(ChainValidationError::at(0, ChainFault::BadGenesis)),
    }

    let mut previous_hash = codec::hash_block(&blocks[0])
        .map_err(|e| ChainValidationError::at(0, ChainFault::Malformed(e.to_string())))?;
    let mut solutions: Vec<ValueVector> = Vec::new();
    let mut seen_tx: HashSet<&str> = HashSet::new();

    for (position, block) in blocks.iter().enumerate().skip(1) {
        let index = position as u64;
        let fail = |fault| ChainValidationError::at(index, fault);

        block
            .validate_structure()
            .map_err(|e| fail(ChainFault::Malformed(e.to_string())))?;
        if block.index != index {
            return Err(fail(ChainFault::BadIndex {
                expected: index,
                got: block.index,
            }));
        }
        if block.previous_hash != previous_hash {
            return Err(fail(ChainFault::HashMismatchDuringValidation {
                expected: previous_hash,
                found: block.previous_hash.clone(),
            }));
        }
        for tx in &block.transactions {
            if !seen_tx.insert(tx.id.as_str()) {
                return Err(fail(ChainFault::Malformed(format!(
                    "transaction {} appears more than once in the chain",
                    tx.id
                ))));
            }
        }
        let view = ChainView {
            length: index,
            tip_hash: &previous_hash,
            accepted_solutions: &solutions,
        };
        policy
            .evaluate(block, &view)
            .map_err(|r| fail(ChainFault::PolicyRejected(r)))?;

        if let Some(solution) = &block.solution {
            solutions.push(solution.value_vector);
        }
        previous_hash = block
            .hash()
            .map_err(|e| fail(ChainFault::Malformed(e.to_string())))?;
    }
    Ok(())
}
