//! Key custody backends
//!
//! A custody service turns a raw private key into ciphertext that only it
//! can open, and opens it again only for a claim that satisfies the access
//! policy the key was sealed under.

use std::sync::Arc;

use agentgrid_crypto::{derive_sealing_key, open, seal, sha256_hex, SealedBox, SecretKey, NONCE_LEN};
use agentgrid_ledger::{Clock, SystemClock};
use agentgrid_types::{AccessPolicy, EncryptedKey, RequesterClaim};
use async_trait::async_trait;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::access::evaluate_policy;

/// Errors raised by custody backends
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CustodyError {
    #[error("access denied: {reason}")]
    AccessDenied { reason: String },

    #[error("custody backend error: {message}")]
    Backend { message: String },
}

impl CustodyError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// External encryption service guarding wallet keys
#[async_trait]
pub trait CustodyService: Send + Sync {
    /// Encrypt a private key so that only claims satisfying `policy` can
    /// recover it
    async fn encrypt(
        &self,
        secret: &SecretKey,
        policy: &AccessPolicy,
    ) -> Result<EncryptedKey, CustodyError>;

    /// Recover a private key for a claim satisfying `policy`
    async fn decrypt(
        &self,
        encrypted: &EncryptedKey,
        policy: &AccessPolicy,
        claim: &RequesterClaim,
    ) -> Result<SecretKey, CustodyError>;
}

const SOFTWARE_BACKEND: &str = "software";
const SOFTWARE_VERSION: u32 = 1;
const SEALING_CONTEXT: &str = "agentgrid-custody";

/// Descriptor stored next to software-keystore ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SoftwareDescriptor {
    backend: String,
    version: u32,
    /// AES-GCM nonce, hex
    nonce: String,
    /// SHA-256 of the access policy's canonical bytes, hex
    policy_fingerprint: String,
    network: String,
}

/// In-process custody backend.
///
/// Keys are sealed with AES-256-GCM under a key derived from a 32-byte
/// master secret and the access-policy fingerprint, which is also bound as
/// associated data.
pub struct SoftwareKeystore {
    master: Zeroizing<[u8; 32]>,
    network: String,
    clock: Arc<dyn Clock>,
}

impl SoftwareKeystore {
    pub fn new(master: [u8; 32], network: impl Into<String>) -> Self {
        Self {
            master: Zeroizing::new(master),
            network: network.into(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Create a keystore with a fresh random master secret
    pub fn generate(network: impl Into<String>) -> Self {
        let mut master = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut master[..]);
        Self {
            master,
            network: network.into(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` for claim expiry checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Fingerprint binding ciphertext to an exact policy
    pub fn policy_fingerprint(policy: &AccessPolicy) -> String {
        sha256_hex(&policy.canonical_bytes())
    }
}

impl std::fmt::Debug for SoftwareKeystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareKeystore")
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CustodyService for SoftwareKeystore {
    async fn encrypt(
        &self,
        secret: &SecretKey,
        policy: &AccessPolicy,
    ) -> Result<EncryptedKey, CustodyError> {
        let fingerprint = Self::policy_fingerprint(policy);
        let key = derive_sealing_key(&self.master, SEALING_CONTEXT, fingerprint.as_bytes());
        let sealed = seal(&key, secret.expose_secret(), fingerprint.as_bytes())
            .map_err(|e| CustodyError::backend(e.to_string()))?;

        let descriptor = SoftwareDescriptor {
            backend: SOFTWARE_BACKEND.to_string(),
            version: SOFTWARE_VERSION,
            nonce: hex::encode(sealed.nonce),
            policy_fingerprint: fingerprint,
            network: self.network.clone(),
        };

        Ok(EncryptedKey {
            ciphertext: hex::encode(&sealed.ciphertext),
            descriptor: serde_json::to_value(descriptor)
                .map_err(|e| CustodyError::backend(e.to_string()))?,
        })
    }

    async fn decrypt(
        &self,
        encrypted: &EncryptedKey,
        policy: &AccessPolicy,
        claim: &RequesterClaim,
    ) -> Result<SecretKey, CustodyError> {
        let descriptor: SoftwareDescriptor = serde_json::from_value(encrypted.descriptor.clone())
            .map_err(|e| CustodyError::backend(format!("unreadable descriptor: {e}")))?;

        if descriptor.backend != SOFTWARE_BACKEND || descriptor.version != SOFTWARE_VERSION {
            return Err(CustodyError::backend(format!(
                "unsupported descriptor {} v{}",
                descriptor.backend, descriptor.version
            )));
        }

        let fingerprint = Self::policy_fingerprint(policy);
        if descriptor.policy_fingerprint != fingerprint {
            return Err(CustodyError::AccessDenied {
                reason: "ciphertext was sealed under a different access policy".to_string(),
            });
        }

        evaluate_policy(policy, claim, self.clock.now())
            .map_err(|reason| CustodyError::AccessDenied { reason })?;

        let nonce: [u8; NONCE_LEN] = hex::decode(&descriptor.nonce)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| CustodyError::backend("malformed nonce"))?;
        let ciphertext = hex::decode(&encrypted.ciphertext)
            .map_err(|e| CustodyError::backend(format!("malformed ciphertext: {e}")))?;

        let key = derive_sealing_key(&self.master, SEALING_CONTEXT, fingerprint.as_bytes());
        let plaintext = open(&key, &SealedBox { nonce, ciphertext }, fingerprint.as_bytes())
            .map_err(|e| CustodyError::backend(e.to_string()))?;

        SecretKey::from_slice(&plaintext).map_err(|e| CustodyError::backend(e.to_string()))
    }
}
