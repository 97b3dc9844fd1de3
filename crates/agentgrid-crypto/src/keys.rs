//! Key management for AgentGrid wallets
//!
//! Each agent wallet is a secp256k1 keypair; its address is the last 20 bytes
//! of the Keccak-256 hash of the uncompressed public key (sans prefix byte).

use agentgrid_types::Address;
use k256::ecdsa::{SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint as _;
use rand::rngs::OsRng;
use zeroize::{Zeroize, Zeroizing};

use crate::{keccak256, CryptoError, CryptoResult};

/// Raw 32-byte secp256k1 private key, zeroed on drop.
///
/// Not `Clone`: every copy of key material is an explicit `from_slice`.
pub struct SecretKey(Zeroizing<[u8; 32]>);

impl SecretKey {
    /// Length of a secret key in bytes
    pub const LEN: usize = 32;

    /// Copy key material out of a buffer (the caller still owns and must
    /// zero its own buffer)
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != Self::LEN {
            return Err(CryptoError::InvalidKeyFormat(format!(
                "secret key must be {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }
        let mut inner = Zeroizing::new([0u8; 32]);
        inner.copy_from_slice(bytes);
        // Reject scalars outside the curve order up front
        SigningKey::from_slice(inner.as_slice())
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;
        Ok(Self(inner))
    }

    /// Borrow the raw bytes (for custody encryption only!)
    pub fn expose_secret(&self) -> &[u8; 32] {
        &self.0
    }

    /// Rebuild the ECDSA signing key
    pub fn signing_key(&self) -> CryptoResult<SigningKey> {
        SigningKey::from_slice(self.0.as_slice())
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))
    }

    /// Address controlled by this key
    pub fn address(&self) -> CryptoResult<Address> {
        Ok(address_from_verifying_key(self.signing_key()?.verifying_key()))
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// A freshly generated wallet keypair
pub struct EvmKeypair {
    signing_key: SigningKey,
}

impl EvmKeypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Ethereum-compatible address of this keypair
    pub fn address(&self) -> Address {
        address_from_verifying_key(self.verifying_key())
    }

    /// Uncompressed public key, `0x04`-prefixed hex
    pub fn public_key_hex(&self) -> String {
        let encoded = self.verifying_key().to_encoded_point(false);
        format!("0x{}", hex::encode(encoded.as_bytes()))
    }

    /// Consume the keypair, moving the private scalar into a `SecretKey`
    pub fn into_secret(self) -> SecretKey {
        let mut field_bytes = self.signing_key.to_bytes();
        let mut inner = Zeroizing::new([0u8; 32]);
        inner.copy_from_slice(&field_bytes);
        field_bytes.as_mut_slice().zeroize();
        SecretKey(inner)
    }
}

impl std::fmt::Debug for EvmKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmKeypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Derive the EVM address of a secp256k1 public key
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    // bytes[0] == 0x04 (uncompressed prefix), skip it
    let hash = keccak256(&encoded.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Address::from_bytes(address)
}
