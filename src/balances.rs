//! --- Balance Ledger ---
//! Per-account, per-dimension balances. Transactions apply in list order,
//! debit before credit.
//!
//! Insufficient funds are handled according to [`BalanceMode`]:
//! - `Permissive`: the debit is skipped with a warning and the credit still
//!   happens, so the recipient is paid with value that was never debited.
//! - `Strict`: the whole batch is rejected and no balance changes.
//!
//! Value created without a debit (system issuance, and skipped debits in
//! permissive mode) counts toward an optional per-dimension supply ceiling.

use crate::metrics::{DEBITS_SKIPPED, TRANSACTIONS_APPLIED};
use crate::transaction::Transaction;
use crate::value::Dimension;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, warn};

/// account id -> dimension -> balance
pub type BalanceTable = BTreeMap<String, BTreeMap<Dimension, f64>>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BalanceMode {
    #[default]
    Permissive,
    Strict,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BalanceError {
    #[error("Insufficient funds in transaction {tx_id}: {account} holds {available} {dimension}, needs {required}")]
    InsufficientFunds {
        tx_id: String,
        account: String,
        dimension: Dimension,
        available: f64,
        required: f64,
    },
    #[error("Supply ceiling reached for {dimension}: issuing {requested} would exceed {ceiling}")]
    SupplyCeilingExceeded {
        dimension: Dimension,
        requested: f64,
        ceiling: f64,
    },
}

/// What a successful [`BalanceLedger::apply`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ApplyReport {
    pub applied: usize,
    pub skipped_debits: usize,
    pub clamped_credits: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceLedger {
    mode: BalanceMode,
    supply_ceiling: Option<f64>,
    balances: BalanceTable,
    issued: BTreeMap<Dimension, f64>,
}

impl BalanceLedger {
    pub fn new(mode: BalanceMode, supply_ceiling: Option<f64>) -> Self {
        Self {
            mode,
            supply_ceiling,
            balances: BalanceTable::new(),
            issued: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> BalanceMode {
        self.mode
    }

    /// 0.0 for accounts or dimensions never touched.
    pub fn get(&self, account: &str, dimension: Dimension) -> f64 {
        self.balances
            .get(account)
            .and_then(|dims| dims.get(&dimension))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn table(&self) -> &BalanceTable {
        &self.balances
    }

    /// Value created without a matching debit so far.
    pub fn issued(&self, dimension: Dimension) -> f64 {
        self.issued.get(&dimension).copied().unwrap_or(0.0)
    }

    /// Sum of every balance in every dimension.
    pub fn total(&self) -> f64 {
        self.balances
            .values()
            .flat_map(|dims| dims.values())
            .sum()
    }

    pub fn total_in(&self, dimension: Dimension) -> f64 {
        self.balances
            .values()
            .filter_map(|dims| dims.get(&dimension))
            .sum()
    }

    /// Applies `transactions` in order. All effects become visible together:
    /// on error nothing has changed.
    pub fn apply(&mut self, transactions: &[Transaction]) -> Result<ApplyReport, BalanceError> {
        let mut working: HashMap<(String, Dimension), f64> = HashMap::new();
        let mut issued = self.issued.clone();
        let mut report = ApplyReport::default();

        for tx in transactions {
            let mut credit = tx.amount;
            let mut unbacked = tx.is_system();

            if !tx.is_system() {
                let key = (tx.sender.clone(), tx.dimension);
                let available = *working
                    .entry(key.clone())
                    .or_insert_with(|| self.get(&tx.sender, tx.dimension));
                if available >= tx.amount {
                    working.insert(key, available - tx.amount);
                } else if self.mode == BalanceMode::Strict {
                    return Err(BalanceError::InsufficientFunds {
                        tx_id: tx.id.clone(),
                        account: tx.sender.clone(),
                        dimension: tx.dimension,
                        available,
                        required: tx.amount,
                    });
                } else {
                    warn!(
                        tx_id = %tx.id,
                        sender = %tx.sender,
                        dimension = %tx.dimension,
                        available,
                        required = tx.amount,
                        "Insufficient funds; debit skipped, credit still applied"
                    );
                    DEBITS_SKIPPED.inc();
                    report.skipped_debits += 1;
                    unbacked = true;
                }
            }

            if unbacked {
                let already = issued.get(&tx.dimension).copied().unwrap_or(0.0);
                if let Some(ceiling) = self.supply_ceiling {
                    let headroom = (ceiling - already).max(0.0);
                    if credit > headroom {
                        if self.mode == BalanceMode::Strict {
                            return Err(BalanceError::SupplyCeilingExceeded {
                                dimension: tx.dimension,
                                requested: credit,
                                ceiling,
                            });
                        }
                        warn!(
                            tx_id = %tx.id,
                            dimension = %tx.dimension,
                            requested = credit,
                            granted = headroom,
                            "Supply ceiling reached; credit clamped"
                        );
                        credit = headroom;
                        report.clamped_credits += 1;
                    }
                }
                issued.insert(tx.dimension, already + credit);
            }

            let key = (tx.recipient.clone(), tx.dimension);
            let current = *working
                .entry(key.clone())
                .or_insert_with(|| self.get(&tx.recipient, tx.dimension));
            working.insert(key, current + credit);
            report.applied += 1;
        }

        for ((account, dimension), balance) in working {
            self.balances
                .entry(account)
                .or_default()
                .insert(dimension, balance);
        }
        self.issued = issued;
        TRANSACTIONS_APPLIED.inc_by(report.applied as u64);
        debug!(
            applied = report.applied,
            skipped_debits = report.skipped_debits,
            "Transactions applied to balances"
        );
        Ok(report)
    }
}
