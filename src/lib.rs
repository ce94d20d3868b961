// Leaf types and encoding.
pub mod codec;
pub mod value;
pub mod wallet;

// Ledger contents.
pub mod block;
pub mod schema;
pub mod transaction;

// State and acceptance.
pub mod authority;
pub mod balances;
pub mod consensus;
pub mod ledger;
pub mod proof_of_value;
pub mod rewards;
pub mod shared;

// Operation.
pub mod config;
pub mod metrics;
pub mod miner;
pub mod persistence;
