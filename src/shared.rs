//! --- Shared Ledger Handle ---
//! Async, cloneable access to one [`Ledger`]. Appends are serialized behind a
//! single write lock held for the whole validate-then-apply step, so readers
//! never observe a partially applied block. Long scans and chain replays run
//! on a snapshot outside the lock, and accepted-block events are published
//! only after the lock is released.

use crate::balances::BalanceTable;
use crate::block::{KnowledgeBlock, Solution};
use crate::consensus::AcceptancePolicy;
use crate::ledger::{self, AppendReceipt, ChainExport, Ledger, LedgerError, LedgerStats};
use crate::transaction::Transaction;
use crate::value::Dimension;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task;
use tracing::{debug, instrument};

const EVENT_CHANNEL_CAPACITY: usize = 1_000;

/// Published once per appended block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockAccepted {
    pub index: u64,
    pub hash: String,
    pub block: KnowledgeBlock,
    pub rewards: Vec<Transaction>,
}

#[derive(Debug, Clone)]
pub struct SharedLedger {
    inner: Arc<RwLock<Ledger>>,
    policy: Arc<dyn AcceptancePolicy>,
    events: broadcast::Sender<BlockAccepted>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger, policy: Arc<dyn AcceptancePolicy>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(ledger)),
            policy,
            events,
        }
    }

    pub fn policy(&self) -> Arc<dyn AcceptancePolicy> {
        self.policy.clone()
    }

    /// Observers receive every block appended after they subscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<BlockAccepted> {
        self.events.subscribe()
    }

    #[instrument(skip(self, candidate), fields(index = candidate.index))]
    pub async fn append_block(
        &self,
        candidate: KnowledgeBlock,
    ) -> Result<AppendReceipt, LedgerError> {
        let block = candidate.clone();
        let receipt = {
            let mut guard = self.inner.write().await;
            guard.append_block(candidate, self.policy.as_ref())?
        };

        let event = BlockAccepted {
            index: receipt.index,
            hash: receipt.hash.clone(),
            block,
            rewards: receipt.rewards.clone(),
        };
        if self.events.send(event).is_err() {
            debug!("No subscribers for accepted-block event");
        }
        Ok(receipt)
    }

    pub async fn create_candidate_block(
        &self,
        author_id: &str,
        transactions: Vec<Transaction>,
        solution: Option<Solution>,
        metadata: BTreeMap<String, Value>,
    ) -> Result<KnowledgeBlock, LedgerError> {
        self.inner
            .read()
            .await
            .create_candidate_block(author_id, transactions, solution, metadata)
    }

    pub async fn len(&self) -> u64 {
        self.inner.read().await.len()
    }

    pub async fn latest_block(&self) -> Option<KnowledgeBlock> {
        self.inner.read().await.latest_block().cloned()
    }

    pub async fn tip_hash(&self) -> String {
        self.inner.read().await.tip_hash().to_string()
    }

    pub async fn get_balance(&self, account: &str, dimension: Dimension) -> f64 {
        self.inner.read().await.get_balance(account, dimension)
    }

    pub async fn balances(&self) -> BalanceTable {
        self.inner.read().await.balances().table().clone()
    }

    pub async fn stats(&self) -> LedgerStats {
        self.inner.read().await.stats()
    }

    pub async fn export(&self) -> ChainExport {
        self.inner.read().await.to_export()
    }

    /// Validates a snapshot of the chain on a blocking thread. Appends made
    /// while the scan runs are not part of the result.
    pub async fn validate_full_chain(&self) -> Result<(), LedgerError> {
        let blocks = self.inner.read().await.blocks().to_vec();
        let policy = self.policy.clone();
        task::spawn_blocking(move || ledger::validate_blocks(&blocks, policy.as_ref())).await??;
        Ok(())
    }

    /// Longest-valid-chain rule. The candidate is replayed without holding
    /// the lock; the swap re-checks length under the write lock in case the
    /// local chain grew meanwhile.
    #[instrument(skip(self, candidate), fields(remote = candidate.len()))]
    pub async fn try_replace_chain(
        &self,
        candidate: Vec<KnowledgeBlock>,
    ) -> Result<bool, LedgerError> {
        let (local_len, reward_config, balance_config) = {
            let guard = self.inner.read().await;
            (
                guard.len(),
                guard.reward_config().clone(),
                guard.balance_config().clone(),
            )
        };
        if candidate.len() as u64 <= local_len {
            return Ok(false);
        }

        let policy = self.policy.clone();
        let replayed = task::spawn_blocking(move || {
            Ledger::from_blocks(candidate, policy.as_ref(), reward_config, balance_config)
        })
        .await??;

        Ok(self.inner.write().await.adopt_if_longer(replayed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BalanceConfig, RewardConfig};
    use crate::consensus::AcceptAll;

    fn shared() -> SharedLedger {
        SharedLedger::new(
            Ledger::with_genesis(RewardConfig::default(), BalanceConfig::default()).unwrap(),
            Arc::new(AcceptAll),
        )
    }

    #[tokio::test]
    async fn events_follow_appends() {
        let ledger = shared();
        let mut events = ledger.subscribe();
        let block = ledger
            .create_candidate_block("author", vec![], None, BTreeMap::new())
            .await
            .unwrap();
        let receipt = ledger.append_block(block).await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.index, 1);
        assert_eq!(event.hash, receipt.hash);
        assert_eq!(ledger.tip_hash().await, receipt.hash);
    }

    #[tokio::test]
    async fn snapshot_validation_passes_on_a_clean_chain() {
        let ledger = shared();
        let block = ledger
            .create_candidate_block("author", vec![], None, BTreeMap::new())
            .await
            .unwrap();
        ledger.append_block(block).await.unwrap();
        assert!(ledger.validate_full_chain().await.is_ok());
        assert_eq!(ledger.stats().await.length, 2);
    }
}
