//! Digital signatures for AgentGrid
//!
//! Transactions are signed with recoverable secp256k1 ECDSA over the
//! Keccak-256 digest of their canonical encoding. Requester claims carry
//! ed25519 proofs.

use agentgrid_types::{Address, ClaimProof, RequesterClaim, SignedTransaction, UnsignedTransaction};
use ed25519_dalek::{Signature as Ed25519Signature, Signer, SigningKey, Verifier, VerifyingKey};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey as EcdsaVerifyingKey};
use rand::rngs::OsRng;
use sha3::{Digest, Keccak256};

use crate::{address_from_verifying_key, keccak256, CryptoError, CryptoResult, SecretKey};

/// Length of a recoverable signature `r || s || v`
pub const RECOVERABLE_SIGNATURE_LEN: usize = 65;

/// Sign a transaction with a wallet secret
pub fn sign_transaction(
    secret: &SecretKey,
    transaction: &UnsignedTransaction,
) -> CryptoResult<SignedTransaction> {
    let signing_key = secret.signing_key()?;
    let encoded = transaction.encode();

    let digest = Keccak256::new_with_prefix(&encoded);
    let (signature, recovery_id) = signing_key
        .sign_digest_recoverable(digest)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

    let mut signature_bytes = Vec::with_capacity(RECOVERABLE_SIGNATURE_LEN);
    signature_bytes.extend_from_slice(&signature.to_bytes());
    signature_bytes.push(recovery_id.to_byte());

    let mut hashed = encoded;
    hashed.extend_from_slice(&signature_bytes);

    Ok(SignedTransaction {
        transaction: transaction.clone(),
        signature: hex::encode(&signature_bytes),
        hash: format!("0x{}", hex::encode(keccak256(&hashed))),
    })
}

/// Recover the address that produced a signed transaction
pub fn recover_signer(signed: &SignedTransaction) -> CryptoResult<Address> {
    let bytes = hex::decode(&signed.signature)
        .map_err(|e| CryptoError::VerificationFailed(e.to_string()))?;

    if bytes.len() != RECOVERABLE_SIGNATURE_LEN {
        return Err(CryptoError::VerificationFailed(format!(
            "Signature must be {} bytes",
            RECOVERABLE_SIGNATURE_LEN
        )));
    }

    let signature = EcdsaSignature::from_slice(&bytes[..64])
        .map_err(|e| CryptoError::VerificationFailed(e.to_string()))?;
    let recovery_id = RecoveryId::from_byte(bytes[64])
        .ok_or_else(|| CryptoError::VerificationFailed("invalid recovery id".to_string()))?;

    let digest = Keccak256::new_with_prefix(signed.transaction.encode());
    let key = EcdsaVerifyingKey::recover_from_digest(digest, &signature, recovery_id)
        .map_err(|e| CryptoError::VerificationFailed(e.to_string()))?;

    Ok(address_from_verifying_key(&key))
}

/// Ed25519 key used to issue requester claims
pub struct ClaimSigner {
    signing_key: SigningKey,
}

impl ClaimSigner {
    /// Generate a new random claim signing key
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Create from existing signing key bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    /// Get the public key as hex string
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Attach a proof over the claim's signable bytes
    pub fn sign_claim(&self, claim: &mut RequesterClaim) -> CryptoResult<()> {
        let signature = self
            .signing_key
            .try_sign(&claim.signable_bytes())
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        claim.proof = Some(ClaimProof {
            public_key: self.public_key_hex(),
            signature: hex::encode(signature.to_bytes()),
        });
        Ok(())
    }
}

impl std::fmt::Debug for ClaimSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimSigner")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Verify a claim's proof. Returns `Ok(false)` for a well-formed but wrong
/// signature and an error for a missing or malformed proof.
pub fn verify_claim_proof(claim: &RequesterClaim) -> CryptoResult<bool> {
    let proof = claim
        .proof
        .as_ref()
        .ok_or_else(|| CryptoError::VerificationFailed("claim carries no proof".to_string()))?;

    let key_bytes: [u8; 32] = hex::decode(&proof.public_key)
        .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyFormat("Public key must be 32 bytes".to_string()))?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;

    let signature_bytes: [u8; 64] = hex::decode(&proof.signature)
        .map_err(|e| CryptoError::VerificationFailed(e.to_string()))?
        .try_into()
        .map_err(|_| CryptoError::VerificationFailed("Signature must be 64 bytes".to_string()))?;
    let signature = Ed25519Signature::from_bytes(&signature_bytes);

    Ok(verifying_key
        .verify(&claim.signable_bytes(), &signature)
        .is_ok())
}
