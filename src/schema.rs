//! --- Versioned Block Schema ---
//! Blocks travel tagged with a `format_version`. `v1` is the legacy draft
//! layout (`author`, `prev_hash`, single-dimension transactions, a scalar
//! solution score); `v2` is [`KnowledgeBlock`]. Legacy blocks are upgraded by
//! [`migrate_chain`], never validated in their old shape.
//!
//! Migration changes block contents, and with them block hashes. Migrated
//! blocks are therefore re-linked to their migrated predecessor and lose any
//! signature they carried, so a migrated chain only validates under policies
//! that do not check signatures.

use crate::block::{BlockCreationData, BlockError, KnowledgeBlock, Solution};
use crate::codec::{self, CodecError};
use crate::transaction::{Transaction, TransactionError};
use crate::value::{Dimension, ValueVector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Legacy transaction {id} in block {index} cannot be migrated: {source}")]
    Transaction {
        index: u64,
        id: String,
        #[source]
        source: TransactionError,
    },
    #[error("Legacy block {index} cannot be migrated: {source}")]
    Block {
        index: u64,
        #[source]
        source: BlockError,
    },
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct LegacyTransactionV1 {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    pub timestamp: u64,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct LegacySolutionV1 {
    pub id: String,
    pub task_id: String,
    pub solver_id: String,
    pub content: String,
    pub value_score: f64,
    pub timestamp: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct LegacyBlockV1 {
    pub index: u64,
    pub timestamp: u64,
    #[serde(default)]
    pub transactions: Vec<LegacyTransactionV1>,
    #[serde(default)]
    pub solution: Option<LegacySolutionV1>,
    pub author: String,
    pub prev_hash: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub difficulty: u32,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "format_version")]
pub enum VersionedBlock {
    #[serde(rename = "v1")]
    V1(LegacyBlockV1),
    #[serde(rename = "v2")]
    V2(KnowledgeBlock),
}

impl From<KnowledgeBlock> for VersionedBlock {
    fn from(block: KnowledgeBlock) -> Self {
        VersionedBlock::V2(block)
    }
}

impl VersionedBlock {
    pub fn index(&self) -> u64 {
        match self {
            VersionedBlock::V1(b) => b.index,
            VersionedBlock::V2(b) => b.index,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, VersionedBlock::V1(_))
    }
}

impl LegacyTransactionV1 {
    /// Legacy transfers carried no dimension and are read as knowledge.
    pub fn migrate(&self, block_index: u64) -> Result<Transaction, SchemaError> {
        if self.signature.is_some() {
            warn!(tx_id = %self.id, block_index, "Dropping legacy transaction signature during migration");
        }
        Transaction::new(
            self.sender.as_str(),
            self.recipient.as_str(),
            self.amount,
            Dimension::Knowledge,
            self.timestamp,
        )
        .map_err(|source| SchemaError::Transaction {
            index: block_index,
            id: self.id.clone(),
            source,
        })
    }
}

impl LegacySolutionV1 {
    /// The legacy scalar score becomes the knowledge dimension.
    pub fn migrate(&self, block_index: u64) -> Result<Solution, SchemaError> {
        let vector = ValueVector::zero().with(Dimension::Knowledge, self.value_score.max(0.0));
        Solution::new(
            self.task_id.as_str(),
            self.solver_id.as_str(),
            self.content.as_str(),
            vector,
            self.timestamp,
        )
        .map_err(|source| SchemaError::Block {
            index: block_index,
            source,
        })
    }
}

impl LegacyBlockV1 {
    /// Upgrades the block, linking it to `previous_hash` (the hash of the
    /// already migrated predecessor). A legacy block at index 0 becomes the
    /// canonical genesis block.
    pub fn migrate(&self, previous_hash: &str) -> Result<KnowledgeBlock, SchemaError> {
        if self.index == 0 {
            return Ok(KnowledgeBlock::genesis());
        }
        let transactions = self
            .transactions
            .iter()
            .map(|tx| tx.migrate(self.index))
            .collect::<Result<Vec<_>, _>>()?;
        let solution = self
            .solution
            .as_ref()
            .map(|s| s.migrate(self.index))
            .transpose()?;
        if !self.signature.is_empty() {
            warn!(index = self.index, "Dropping legacy block signature during migration");
        }
        Ok(KnowledgeBlock::new(BlockCreationData {
            index: self.index,
            previous_hash: previous_hash.to_string(),
            author_id: self.author.clone(),
            transactions,
            solution,
            difficulty: self.difficulty,
            timestamp: self.timestamp,
            metadata: self.metadata.clone(),
        }))
    }
}

/// Brings every block to the current format, in order. Current-format blocks
/// pass through untouched.
pub fn migrate_chain(blocks: Vec<VersionedBlock>) -> Result<Vec<KnowledgeBlock>, SchemaError> {
    let mut out: Vec<KnowledgeBlock> = Vec::with_capacity(blocks.len());
    let mut migrated = 0usize;
    for versioned in blocks {
        let block = match versioned {
            VersionedBlock::V2(block) => block,
            VersionedBlock::V1(legacy) => {
                migrated += 1;
                let link = codec::hash_link(out.last())?;
                legacy.migrate(&link)?
            }
        };
        out.push(block);
    }
    if migrated > 0 {
        debug!(migrated, total = out.len(), "Migrated legacy blocks");
    }
    Ok(out)
}
