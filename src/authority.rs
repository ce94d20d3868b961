//! --- Authority Set ---
//! Who may author blocks. Membership is changed by governance at runtime, so
//! every change bumps an epoch counter and policy evaluation works on a
//! snapshot taken when the evaluation starts.

use crate::wallet::{self, WalletError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum AuthorityError {
    #[error("Authority id cannot be empty")]
    EmptyId,
    #[error("Invalid public key for authority '{id}': {source}")]
    InvalidKey {
        id: String,
        #[source]
        source: WalletError,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoritySet {
    epoch: u64,
    members: BTreeMap<String, String>,
}

impl AuthoritySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains_key(id)
    }

    pub fn public_key(&self, id: &str) -> Option<&str> {
        self.members.get(id).map(String::as_str)
    }

    /// Adds or re-keys an authority. Returns the new epoch.
    pub fn insert(&mut self, id: &str, public_key_hex: &str) -> Result<u64, AuthorityError> {
        if id.is_empty() {
            return Err(AuthorityError::EmptyId);
        }
        wallet::parse_public_key(public_key_hex).map_err(|source| AuthorityError::InvalidKey {
            id: id.to_string(),
            source,
        })?;
        self.members
            .insert(id.to_string(), public_key_hex.to_lowercase());
        self.epoch += 1;
        Ok(self.epoch)
    }

    /// Removes an authority; the epoch only moves if membership changed.
    pub fn remove(&mut self, id: &str) -> bool {
        let removed = self.members.remove(id).is_some();
        if removed {
            self.epoch += 1;
        }
        removed
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }
}

/// Process-wide handle to the mutable authority set.
#[derive(Clone, Debug, Default)]
pub struct AuthorityRegistry {
    inner: Arc<RwLock<AuthoritySet>>,
}

impl AuthorityRegistry {
    pub fn new(set: AuthoritySet) -> Self {
        Self {
            inner: Arc::new(RwLock::new(set)),
        }
    }

    /// A consistent copy of the current set. Later governance changes do not
    /// affect a snapshot already handed out.
    pub fn snapshot(&self) -> AuthoritySet {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn epoch(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .epoch()
    }

    pub fn add_authority(&self, id: &str, public_key_hex: &str) -> Result<u64, AuthorityError> {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let epoch = guard.insert(id, public_key_hex)?;
        info!(authority = id, epoch, "Authority added");
        Ok(epoch)
    }

    pub fn remove_authority(&self, id: &str) -> bool {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let removed = guard.remove(id);
        if removed {
            info!(authority = id, epoch = guard.epoch(), "Authority removed");
        }
        removed
    }
}
