//! Sealing of key material at rest
//!
//! AES-256-GCM with BLAKE3 key derivation. The derived key is bound to a
//! context string and a caller-supplied binding (for custody: the access
//! policy fingerprint), and the binding is also authenticated as associated
//! data, so a ciphertext only opens under the exact policy it was sealed for.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use blake3::Hasher;
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::{CryptoError, CryptoResult};

/// Length of an AES-GCM nonce
pub const NONCE_LEN: usize = 12;

/// Ciphertext plus the random nonce it was sealed with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

/// Derive a 256-bit sealing key from a master secret.
///
/// `context` separates uses of the same master secret; `binding` ties the key
/// to one specific object.
pub fn derive_sealing_key(
    master: &[u8; 32],
    context: &str,
    binding: &[u8],
) -> Zeroizing<[u8; 32]> {
    let mut hasher = Hasher::new_derive_key("agentgrid-sealing-v1");
    hasher.update(master);
    hasher.update(b":");
    hasher.update(context.as_bytes());
    hasher.update(b":");
    hasher.update(binding);
    Zeroizing::new(hasher.finalize().into())
}

/// Encrypt `plaintext`, authenticating `aad` alongside it
pub fn seal(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> CryptoResult<SealedBox> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(format!("AES-GCM encryption failed: {e}")))?;

    Ok(SealedBox { nonce, ciphertext })
}

/// Decrypt a sealed box. Fails on a wrong key, wrong `aad`, or any tampering.
pub fn open(key: &[u8; 32], sealed: &SealedBox, aad: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&sealed.nonce),
            Payload {
                msg: &sealed.ciphertext,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(format!("AES-GCM decryption failed: {e}")))?;

    Ok(Zeroizing::new(plaintext))
}
