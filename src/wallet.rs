//! ed25519 signer used by block authors and transaction senders. The ledger
//! itself never holds keys; it only calls [`verify`] through the authority
//! policy and transaction signature checks.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

#[derive(thiserror::Error, Debug)]
pub enum WalletError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(#[from] ed25519_dalek::SignatureError),
    #[error("Invalid private key length or format")]
    InvalidKeyLength,
    #[error("Invalid public key length or format")]
    InvalidPublicKey,
    #[error("Invalid signature length or format")]
    InvalidSignature,
    #[error("Hex decoding error: {0}")]
    Hex(#[from] hex::FromHexError),
}

pub struct Wallet {
    signing_key: SigningKey,
}

impl Wallet {
    pub fn new() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_private_key(private_key_hex: &str) -> Result<Self, WalletError> {
        let key_bytes: [u8; 32] = hex::decode(private_key_hex)?
            .try_into()
            .map_err(|_| WalletError::InvalidKeyLength)?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&key_bytes),
        })
    }

    /// Hex-encoded verifying key. Doubles as the account id of the key holder.
    pub fn address(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Signs `message` and returns the 64-byte signature hex-encoded.
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

pub fn parse_public_key(public_key_hex: &str) -> Result<VerifyingKey, WalletError> {
    let bytes: [u8; 32] = hex::decode(public_key_hex)?
        .try_into()
        .map_err(|_| WalletError::InvalidPublicKey)?;
    Ok(VerifyingKey::from_bytes(&bytes)?)
}

/// Verifies a hex signature produced by [`Wallet::sign`].
pub fn verify(public_key_hex: &str, signature_hex: &str, message: &[u8]) -> Result<(), WalletError> {
    let verifying_key = parse_public_key(public_key_hex)?;
    let sig_bytes: [u8; 64] = hex::decode(signature_hex)?
        .try_into()
        .map_err(|_| WalletError::InvalidSignature)?;
    let signature = Signature::from_bytes(&sig_bytes);
    verifying_key.verify(message, &signature)?;
    Ok(())
}
