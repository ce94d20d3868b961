#![allow(dead_code)]

use forge_ledger::authority::AuthorityRegistry;
use forge_ledger::block::{KnowledgeBlock, Solution};
use forge_ledger::config::{BalanceConfig, RewardConfig};
use forge_ledger::ledger::Ledger;
use forge_ledger::transaction::Transaction;
use forge_ledger::value::ValueVector;
use forge_ledger::wallet::Wallet;
use std::collections::BTreeMap;

pub const AUTHORITY_ID: &str = "node-a";

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn genesis_ledger() -> Ledger {
    Ledger::with_genesis(RewardConfig::default(), BalanceConfig::default()).unwrap()
}

/// A registry with one authority, and that authority's signing wallet.
pub fn authority() -> (AuthorityRegistry, Wallet) {
    let wallet = Wallet::new();
    let registry = AuthorityRegistry::default();
    registry
        .add_authority(AUTHORITY_ID, &wallet.address())
        .expect("fresh key is valid");
    (registry, wallet)
}

/// The next block for `ledger`, with a deterministic timestamp so block and
/// reward ids stay distinct across heights.
pub fn candidate(
    ledger: &Ledger,
    author: &str,
    transactions: Vec<Transaction>,
    solution: Option<Solution>,
) -> KnowledgeBlock {
    let mut block = ledger
        .create_candidate_block(author, transactions, solution, BTreeMap::new())
        .expect("ledger has a genesis block");
    block.timestamp = 1_000 + ledger.len();
    block
}

pub fn signed_candidate(
    ledger: &Ledger,
    wallet: &Wallet,
    transactions: Vec<Transaction>,
    solution: Option<Solution>,
) -> KnowledgeBlock {
    let mut block = candidate(ledger, AUTHORITY_ID, transactions, solution);
    block.sign(wallet).expect("block encodes");
    block
}

/// The value vector from the reference scenario, totalling 52.
pub fn reference_vector() -> ValueVector {
    ValueVector {
        knowledge: 9.0,
        computation: 7.0,
        originality: 8.0,
        consciousness: 2.0,
        environmental: 5.0,
        health: 6.0,
        scalability: 7.0,
        ethical_alignment: 8.0,
    }
}

pub fn solution(solver: &str, vector: ValueVector, timestamp: u64) -> Solution {
    Solution::new("task-1", solver, "proposed answer", vector, timestamp).expect("valid solution")
}
