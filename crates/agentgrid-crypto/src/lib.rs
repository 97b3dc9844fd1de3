//! AgentGrid Crypto - Cryptographic primitives for agent wallets
//!
//! This crate provides:
//! - secp256k1 key generation and EVM address derivation
//! - Recoverable ECDSA transaction signing
//! - Ed25519 requester-claim proofs
//! - AES-256-GCM sealing for key material at rest
//! - Hashing (Keccak-256, SHA-256)
//!
//! # Security Invariant
//!
//! **Raw private key bytes only ever live inside a zeroizing `SecretKey`.**

pub mod keys;
pub mod signature;
pub mod hash;
pub mod sealing;

pub use keys::*;
pub use signature::*;
pub use hash::*;
pub use sealing::*;

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
