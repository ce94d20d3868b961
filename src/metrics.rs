//! Prometheus counters for the ledger, registered in the default registry.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    pub static ref BLOCKS_APPENDED: IntCounter = register_int_counter!(
        "forge_ledger_blocks_appended_total",
        "Total number of blocks appended to the ledger"
    )
    .unwrap();
    pub static ref BLOCKS_REJECTED: IntCounterVec = register_int_counter_vec!(
        "forge_ledger_blocks_rejected_total",
        "Total number of candidate blocks rejected, by reason",
        &["reason"]
    )
    .unwrap();
    pub static ref TRANSACTIONS_APPLIED: IntCounter = register_int_counter!(
        "forge_ledger_transactions_applied_total",
        "Total number of transactions applied to balances, derived rewards included"
    )
    .unwrap();
    pub static ref DEBITS_SKIPPED: IntCounter = register_int_counter!(
        "forge_ledger_debits_skipped_total",
        "Total number of debits skipped for insufficient funds"
    )
    .unwrap();
    pub static ref CHAIN_REPLACEMENTS: IntCounter = register_int_counter!(
        "forge_ledger_chain_replacements_total",
        "Total number of times the local chain was replaced by a longer valid chain"
    )
    .unwrap();
}

/// Text exposition of every metric in the default registry.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_output_names_ledger_counters() {
        BLOCKS_APPENDED.inc();
        BLOCKS_REJECTED.with_label_values(&["bad_index"]).inc();
        let text = render().unwrap();
        assert!(text.contains("forge_ledger_blocks_appended_total"));
        assert!(text.contains("reason=\"bad_index\""));
    }
}
