// src/transaction.rs

use crate::codec::{self, CodecError};
use crate::value::Dimension;
use crate::wallet::{self, Wallet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sender id of system-issued transactions. Such transfers have no debit side.
pub const SYSTEM_SENDER: &str = "0";

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Invalid transaction structure: {0}")]
    InvalidStructure(String),
    #[error("Invalid amount {0}: must be finite and non-negative")]
    InvalidAmount(f64),
    #[error("Transaction id mismatch: recorded {recorded}, computed {computed}")]
    IdMismatch { recorded: String, computed: String },
    #[error("Signer {signer} is not the sender {sender}")]
    SignerMismatch { signer: String, sender: String },
    #[error("System-issued transactions cannot be signed")]
    SignedSystemTransaction,
    #[error("Signature verification failed: {0}")]
    Signature(#[from] wallet::WalletError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// A transfer of `amount` units of exactly one value dimension.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    pub dimension: Dimension,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Transaction {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
        dimension: Dimension,
        timestamp: u64,
    ) -> Result<Self, TransactionError> {
        let mut tx = Self {
            id: String::new(),
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            dimension,
            timestamp,
            signature: None,
        };
        tx.validate_fields()?;
        tx.id = tx.compute_id()?;
        Ok(tx)
    }

    /// A system-issued credit (block reward, solution reward).
    pub fn system(
        recipient: impl Into<String>,
        amount: f64,
        dimension: Dimension,
        timestamp: u64,
    ) -> Result<Self, TransactionError> {
        Self::new(SYSTEM_SENDER, recipient, amount, dimension, timestamp)
    }

    pub fn is_system(&self) -> bool {
        self.sender == SYSTEM_SENDER
    }

    /// Canonical bytes covering every field except `id` and `signature`.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        Ok(codec::canonical_json_excluding(
            self,
            "transaction",
            &["id", "signature"],
        )?)
    }

    pub fn compute_id(&self) -> Result<String, TransactionError> {
        Ok(codec::sha256_hex(&self.signing_bytes()?))
    }

    /// Signs with the sender's key. The sender id must be the wallet address.
    pub fn sign(&mut self, wallet: &Wallet) -> Result<(), TransactionError> {
        if self.is_system() {
            return Err(TransactionError::SignedSystemTransaction);
        }
        let signer = wallet.address();
        if signer != self.sender {
            return Err(TransactionError::SignerMismatch {
                signer,
                sender: self.sender.clone(),
            });
        }
        self.signature = Some(wallet.sign(&self.signing_bytes()?));
        Ok(())
    }

    /// Unsigned transactions pass; a present signature must verify against the
    /// sender id read as a hex public key.
    pub fn verify_signature(&self) -> Result<(), TransactionError> {
        match &self.signature {
            None => Ok(()),
            Some(_) if self.is_system() => Err(TransactionError::SignedSystemTransaction),
            Some(sig) => Ok(wallet::verify(&self.sender, sig, &self.signing_bytes()?)?),
        }
    }

    /// Full structural check of a transaction received from outside.
    pub fn validate(&self) -> Result<(), TransactionError> {
        self.validate_fields()?;
        let computed = self.compute_id()?;
        if computed != self.id {
            return Err(TransactionError::IdMismatch {
                recorded: self.id.clone(),
                computed,
            });
        }
        self.verify_signature()
    }

    fn validate_fields(&self) -> Result<(), TransactionError> {
        if self.sender.is_empty() {
            return Err(TransactionError::InvalidStructure(
                "sender cannot be empty".to_string(),
            ));
        }
        if self.recipient.is_empty() {
            return Err(TransactionError::InvalidStructure(
                "recipient cannot be empty".to_string(),
            ));
        }
        if self.recipient == SYSTEM_SENDER {
            return Err(TransactionError::InvalidStructure(
                "the system account cannot receive transfers".to_string(),
            ));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(TransactionError::InvalidAmount(self.amount));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_content_addressed() {
        let a = Transaction::new("alice", "bob", 5.0, Dimension::Knowledge, 10).unwrap();
        let b = Transaction::new("alice", "bob", 5.0, Dimension::Knowledge, 10).unwrap();
        let c = Transaction::new("alice", "bob", 6.0, Dimension::Knowledge, 10).unwrap();
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn tampering_is_detected_by_id_check() {
        let mut tx = Transaction::new("alice", "bob", 5.0, Dimension::Health, 10).unwrap();
        tx.amount = 500.0;
        assert!(matches!(
            tx.validate(),
            Err(TransactionError::IdMismatch { .. })
        ));
    }

    #[test]
    fn negative_and_non_finite_amounts_are_rejected() {
        assert!(matches!(
            Transaction::new("a", "b", -1.0, Dimension::Knowledge, 0),
            Err(TransactionError::InvalidAmount(_))
        ));
        assert!(matches!(
            Transaction::new("a", "b", f64::INFINITY, Dimension::Knowledge, 0),
            Err(TransactionError::InvalidAmount(_))
        ));
    }

    #[test]
    fn signed_transfer_verifies_and_keeps_its_id() {
        let wallet = Wallet::new();
        let mut tx =
            Transaction::new(wallet.address(), "bob", 1.0, Dimension::Originality, 42).unwrap();
        let id_before = tx.id.clone();
        tx.sign(&wallet).unwrap();
        assert_eq!(tx.id, id_before);
        assert!(tx.validate().is_ok());

        tx.recipient = "mallory".to_string();
        tx.id = tx.compute_id().unwrap();
        assert!(matches!(
            tx.verify_signature(),
            Err(TransactionError::Signature(_))
        ));
    }

    #[test]
    fn only_the_sender_can_sign() {
        let wallet = Wallet::new();
        let mut tx = Transaction::new("alice", "bob", 1.0, Dimension::Knowledge, 1).unwrap();
        assert!(matches!(
            tx.sign(&wallet),
            Err(TransactionError::SignerMismatch { .. })
        ));
        let mut reward = Transaction::system("bob", 1.0, Dimension::Knowledge, 1).unwrap();
        assert!(reward.is_system());
        assert!(matches!(
            reward.sign(&wallet),
            Err(TransactionError::SignedSystemTransaction)
        ));
    }
}
