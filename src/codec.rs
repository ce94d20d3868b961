//! --- Canonical Encoding & Hashing ---
//! Blocks, transactions and solutions are hashed over a canonical JSON form:
//! object keys sorted lexicographically at every nesting level, no
//! insignificant whitespace. The canonical form of a block omits its
//! `signature`, so signing never changes the block hash.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Link target for the genesis block, and the hash of an absent block.
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

lazy_static! {
    static ref HASH_REGEX: Regex = Regex::new(r"^[0-9a-f]{64}$").expect("static hash regex");
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Canonical form of a {0} must be a JSON object")]
    NotAnObject(&'static str),
}

/// Canonical bytes of `value` with the top-level `excluded` keys removed.
pub fn canonical_json_excluding<T: Serialize>(
    value: &T,
    kind: &'static str,
    excluded: &[&str],
) -> Result<Vec<u8>, CodecError> {
    let mut json = serde_json::to_value(value)?;
    let object = json.as_object_mut().ok_or(CodecError::NotAnObject(kind))?;
    for key in excluded {
        object.remove(*key);
    }
    Ok(serde_json::to_vec(&sort_keys(json))?)
}

/// Canonical bytes of a block: every field except `signature`.
pub fn canonicalize<T: Serialize>(block: &T) -> Result<Vec<u8>, CodecError> {
    canonical_json_excluding(block, "block", &["signature"])
}

/// SHA-256 over the canonical block bytes, as 64 lowercase hex characters.
pub fn hash_block<T: Serialize>(block: &T) -> Result<String, CodecError> {
    Ok(sha256_hex(&canonicalize(block)?))
}

/// The hash a successor must carry as `previous_hash`. An absent predecessor
/// links to [`ZERO_HASH`].
pub fn hash_link<T: Serialize>(previous: Option<&T>) -> Result<String, CodecError> {
    match previous {
        Some(block) => hash_block(block),
        None => Ok(ZERO_HASH.to_string()),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// True for exactly 64 lowercase hex characters.
pub fn is_hash_hex(s: &str) -> bool {
    HASH_REGEX.is_match(s)
}

/// Number of leading `'0'` characters in a hex digest.
pub fn leading_zero_hex(hash: &str) -> u32 {
    hash.chars().take_while(|c| *c == '0').count() as u32
}

// Rebuilds every object with sorted keys. serde_json's default map is already
// ordered, but the `preserve_order` feature may be switched on by another crate
// in the dependency graph, so the order is enforced here.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, sort_keys(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
