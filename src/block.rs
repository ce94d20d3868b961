// src/block.rs

use crate::codec::{self, CodecError, ZERO_HASH};
use crate::transaction::{Transaction, TransactionError};
use crate::value::{ValueError, ValueVector};
use crate::wallet::Wallet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Author id carried by the genesis block.
pub const GENESIS_AUTHOR: &str = "genesis";
/// Current block schema version, see [`crate::schema`].
pub const BLOCK_FORMAT_VERSION: u32 = 2;

/// Metadata key read by the value-threshold policy.
pub const META_TASK_DIFFICULTY: &str = "task_difficulty";
/// Metadata key read by the value-threshold policy.
pub const META_VALIDATORS: &str = "validators";

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Invalid block structure: {0}")]
    InvalidStructure(String),
    #[error("Invalid transaction {id}: {source}")]
    InvalidTransaction {
        id: String,
        #[source]
        source: TransactionError,
    },
    #[error("Invalid solution value vector: {0}")]
    InvalidValue(#[from] ValueError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// A claimed answer to a task together with its assessed value.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Solution {
    pub id: String,
    pub task_id: String,
    pub solver_id: String,
    pub content: String,
    pub value_vector: ValueVector,
    pub timestamp: u64,
}

impl Solution {
    pub fn new(
        task_id: impl Into<String>,
        solver_id: impl Into<String>,
        content: impl Into<String>,
        value_vector: ValueVector,
        timestamp: u64,
    ) -> Result<Self, BlockError> {
        let mut solution = Self {
            id: String::new(),
            task_id: task_id.into(),
            solver_id: solver_id.into(),
            content: content.into(),
            value_vector,
            timestamp,
        };
        solution.id = solution.compute_id()?;
        solution.validate()?;
        Ok(solution)
    }

    pub fn compute_id(&self) -> Result<String, BlockError> {
        let bytes = codec::canonical_json_excluding(self, "solution", &["id"])?;
        Ok(codec::sha256_hex(&bytes))
    }

    pub fn validate(&self) -> Result<(), BlockError> {
        if self.task_id.is_empty() || self.solver_id.is_empty() {
            return Err(BlockError::InvalidStructure(
                "solution task_id and solver_id cannot be empty".to_string(),
            ));
        }
        self.value_vector.validate()?;
        let computed = self.compute_id()?;
        if computed != self.id {
            return Err(BlockError::InvalidStructure(format!(
                "solution id mismatch: recorded {}, computed {computed}",
                self.id
            )));
        }
        Ok(())
    }
}

/// Inputs for [`KnowledgeBlock::new`].
#[derive(Debug, Clone)]
pub struct BlockCreationData {
    pub index: u64,
    pub previous_hash: String,
    pub author_id: String,
    pub transactions: Vec<Transaction>,
    pub solution: Option<Solution>,
    pub difficulty: u32,
    pub timestamp: u64,
    pub metadata: BTreeMap<String, Value>,
}

/// A sealed, hash-linked unit of the ledger.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct KnowledgeBlock {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub solution: Option<Solution>,
    pub author_id: String,
    pub previous_hash: String,
    #[serde(default)]
    pub signature: String,
    pub nonce: u64,
    pub difficulty: u32,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl KnowledgeBlock {
    pub fn new(data: BlockCreationData) -> Self {
        Self {
            index: data.index,
            timestamp: data.timestamp,
            transactions: data.transactions,
            solution: data.solution,
            author_id: data.author_id,
            previous_hash: data.previous_hash,
            signature: String::new(),
            nonce: 0,
            difficulty: data.difficulty,
            metadata: data.metadata,
        }
    }

    /// The fixed genesis block. Its timestamp is pinned so every node derives
    /// the same genesis hash.
    pub fn genesis() -> Self {
        Self {
            index: 0,
            timestamp: 0,
            transactions: vec![],
            solution: None,
            author_id: GENESIS_AUTHOR.to_string(),
            previous_hash: ZERO_HASH.to_string(),
            signature: String::new(),
            nonce: 0,
            difficulty: 0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash == ZERO_HASH
    }

    pub fn hash(&self) -> Result<String, CodecError> {
        codec::hash_block(self)
    }

    pub fn signing_bytes(&self) -> Result<Vec<u8>, CodecError> {
        codec::canonicalize(self)
    }

    /// Signs the canonical bytes. Must happen after mining, since the nonce is
    /// part of the signed content.
    pub fn sign(&mut self, wallet: &Wallet) -> Result<(), BlockError> {
        self.signature = wallet.sign(&self.signing_bytes()?);
        Ok(())
    }

    pub fn metadata_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(Value::as_f64)
    }

    pub fn metadata_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(Value::as_u64)
    }

    /// Field-level checks that need no chain context.
    pub fn validate_structure(&self) -> Result<(), BlockError> {
        if !codec::is_hash_hex(&self.previous_hash) {
            return Err(BlockError::InvalidStructure(format!(
                "previous_hash must be 64 lowercase hex characters, got '{}'",
                self.previous_hash
            )));
        }
        if self.author_id.is_empty() {
            return Err(BlockError::InvalidStructure(
                "author_id cannot be empty".to_string(),
            ));
        }
        if self.index == 0 && self.previous_hash != ZERO_HASH {
            return Err(BlockError::InvalidStructure(
                "index 0 is reserved for genesis".to_string(),
            ));
        }
        let mut ids = HashSet::with_capacity(self.transactions.len());
        for tx in &self.transactions {
            tx.validate().map_err(|source| BlockError::InvalidTransaction {
                id: tx.id.clone(),
                source,
            })?;
            if !ids.insert(tx.id.as_str()) {
                return Err(BlockError::InvalidStructure(format!(
                    "duplicate transaction {} in block",
                    tx.id
                )));
            }
        }
        if let Some(solution) = &self.solution {
            solution.validate()?;
        }
        if let Some(v) = self.metadata.get(META_TASK_DIFFICULTY) {
            if !v.as_f64().is_some_and(|d| d.is_finite() && d >= 0.0) {
                return Err(BlockError::InvalidStructure(format!(
                    "metadata '{META_TASK_DIFFICULTY}' must be a non-negative number"
                )));
            }
        }
        if let Some(v) = self.metadata.get(META_VALIDATORS) {
            if v.as_u64().is_none() {
                return Err(BlockError::InvalidStructure(format!(
                    "metadata '{META_VALIDATORS}' must be a non-negative integer"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for KnowledgeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hash = self.hash().unwrap_or_else(|_| "<unhashable>".to_string());
        writeln!(f, "Block #{} ({})", self.index, hash)?;
        writeln!(f, "  author:        {}", self.author_id)?;
        writeln!(f, "  previous_hash: {}", self.previous_hash)?;
        writeln!(f, "  transactions:  {}", self.transactions.len())?;
        if let Some(solution) = &self.solution {
            writeln!(
                f,
                "  solution:      {} by {} (value {:.4})",
                solution.task_id,
                solution.solver_id,
                solution.value_vector.total_value()
            )?;
        }
        write!(
            f,
            "  difficulty:    {} (nonce {})",
            self.difficulty, self.nonce
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Dimension;

    fn sample_block() -> KnowledgeBlock {
        let genesis_hash = KnowledgeBlock::genesis().hash().unwrap();
        let tx = Transaction::new("alice", "bob", 3.0, Dimension::Computation, 5).unwrap();
        KnowledgeBlock::new(BlockCreationData {
            index: 1,
            previous_hash: genesis_hash,
            author_id: "author".to_string(),
            transactions: vec![tx],
            solution: None,
            difficulty: 1,
            timestamp: 5,
            metadata: BTreeMap::new(),
        })
    }

    #[test]
    fn genesis_is_fixed() {
        let g = KnowledgeBlock::genesis();
        assert!(g.is_genesis());
        assert_eq!(g.previous_hash, ZERO_HASH);
        assert_eq!(g.hash().unwrap(), KnowledgeBlock::genesis().hash().unwrap());
        assert!(g.validate_structure().is_ok());
    }

    #[test]
    fn signing_keeps_the_hash() {
        let wallet = Wallet::new();
        let mut block = sample_block();
        let before = block.hash().unwrap();
        block.sign(&wallet).unwrap();
        assert!(!block.signature.is_empty());
        assert_eq!(block.hash().unwrap(), before);
    }

    #[test]
    fn changing_a_transaction_amount_changes_the_hash() {
        let block = sample_block();
        let mut altered = block.clone();
        altered.transactions[0].amount = 4.0;
        assert_ne!(block.hash().unwrap(), altered.hash().unwrap());
    }

    #[test]
    fn structure_checks() {
        let mut block = sample_block();
        assert!(block.validate_structure().is_ok());

        block.previous_hash = "abc".to_string();
        assert!(block.validate_structure().is_err());

        let mut block = sample_block();
        block.transactions.push(block.transactions[0].clone());
        assert!(block.validate_structure().is_err());

        let mut block = sample_block();
        block
            .metadata
            .insert(META_TASK_DIFFICULTY.to_string(), Value::from(-1.0));
        assert!(block.validate_structure().is_err());
    }

    #[test]
    fn solution_ids_are_checked() {
        let mut solution = Solution::new(
            "task-1",
            "solver",
            "answer",
            ValueVector::zero().with(Dimension::Knowledge, 2.0),
            9,
        )
        .unwrap();
        assert!(solution.validate().is_ok());
        solution.value_vector.knowledge = 20.0;
        assert!(solution.validate().is_err());
    }
}
