//! Access policy evaluation and scoped key release

use std::collections::BTreeMap;
use std::sync::Arc;

use agentgrid_crypto::{sign_transaction, verify_claim_proof, ClaimSigner, SecretKey};
use agentgrid_ledger::{Clock, SystemClock};
use agentgrid_types::{
    AccessPolicy, AccessPredicate, Address, AgentWallet, RequesterClaim, Result, SignedTransaction,
    UnsignedTransaction, WalletError,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::custody::{CustodyError, CustodyService};

/// Check every predicate of `policy` against `claim` (logical AND).
///
/// An empty policy admits nobody.
pub fn evaluate_policy(
    policy: &AccessPolicy,
    claim: &RequesterClaim,
    now: DateTime<Utc>,
) -> std::result::Result<(), String> {
    if policy.is_empty() {
        return Err("access policy has no predicates".to_string());
    }

    if claim.is_expired(now) {
        return Err(format!(
            "claim for {} expired at {}",
            claim.subject,
            claim.expires_at.map(|at| at.to_rfc3339()).unwrap_or_default()
        ));
    }

    for predicate in &policy.predicates {
        evaluate_predicate(predicate, claim)?;
    }
    Ok(())
}

fn evaluate_predicate(
    predicate: &AccessPredicate,
    claim: &RequesterClaim,
) -> std::result::Result<(), String> {
    match predicate {
        AccessPredicate::AgentIdEquals { agent_id } => {
            if &claim.subject != agent_id {
                return Err(format!(
                    "claim subject {} does not match agent {}",
                    claim.subject, agent_id
                ));
            }
        }
        AccessPredicate::IssuedBy { issuer } => {
            if &claim.issuer != issuer {
                return Err(format!(
                    "claim issued by {} instead of {}",
                    claim.issuer, issuer
                ));
            }
        }
        AccessPredicate::AttributeEquals { key, value } => {
            if claim.attributes.get(key) != Some(value) {
                return Err(format!("claim attribute {key} does not equal {value}"));
            }
        }
        AccessPredicate::SignedBy { public_key } => {
            let proof = claim
                .proof
                .as_ref()
                .ok_or_else(|| "claim carries no proof".to_string())?;
            if !proof.public_key.eq_ignore_ascii_case(public_key) {
                return Err(format!("claim signed by {} instead of {}", proof.public_key, public_key));
            }
            match verify_claim_proof(claim) {
                Ok(true) => {}
                Ok(false) => return Err("claim proof does not verify".to_string()),
                Err(e) => return Err(format!("claim proof is malformed: {e}")),
            }
        }
    }
    Ok(())
}

/// A decrypted wallet key, usable for exactly one signature.
///
/// Not `Clone`; the key is zeroed when the handle is dropped or consumed.
pub struct DecryptedKeyHandle {
    secret: SecretKey,
    address: Address,
}

impl DecryptedKeyHandle {
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Sign `transaction`, consuming the handle
    pub fn sign(self, transaction: &UnsignedTransaction) -> Result<SignedTransaction> {
        sign_transaction(&self.secret, transaction)
            .map_err(|e| WalletError::internal(format!("signing failed: {e}")))
    }
}

impl std::fmt::Debug for DecryptedKeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedKeyHandle")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Gatekeeper between requester claims and the custody service
#[derive(Clone)]
pub struct AccessPolicyEvaluator {
    custody: Arc<dyn CustodyService>,
    clock: Arc<dyn Clock>,
}

impl AccessPolicyEvaluator {
    pub fn new(custody: Arc<dyn CustodyService>) -> Self {
        Self {
            custody,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Release the wallet's key for `claim`, or refuse with `Unauthorized`.
    ///
    /// Custody is never asked to decrypt unless every predicate holds.
    pub async fn authorize_decryption(
        &self,
        wallet: &AgentWallet,
        claim: &RequesterClaim,
    ) -> Result<DecryptedKeyHandle> {
        if let Err(reason) = evaluate_policy(&wallet.access_policy, claim, self.clock.now()) {
            warn!(agent_id = %wallet.agent_id, %reason, "Key release denied");
            return Err(WalletError::unauthorized(reason));
        }

        let secret = self
            .custody
            .decrypt(&wallet.encrypted_private_key, &wallet.access_policy, claim)
            .await
            .map_err(|e| {
                warn!(agent_id = %wallet.agent_id, error = %e, "Custody refused key release");
                match e {
                    CustodyError::AccessDenied { reason } => WalletError::unauthorized(reason),
                    CustodyError::Backend { message } => {
                        WalletError::unauthorized(format!("custody unavailable: {message}"))
                    }
                }
            })?;

        let address = secret
            .address()
            .map_err(|e| WalletError::unauthorized(format!("released key is invalid: {e}")))?;
        if address != wallet.address {
            warn!(agent_id = %wallet.agent_id, "Released key does not control wallet address");
            return Err(WalletError::unauthorized(
                "released key does not control the wallet address",
            ));
        }

        debug!(agent_id = %wallet.agent_id, "Key released");
        Ok(DecryptedKeyHandle { secret, address })
    }
}

/// Errors raised while obtaining a requester claim
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("claim unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Supplies the identity claim presented when releasing a wallet key
#[async_trait]
pub trait ClaimSource: Send + Sync {
    async fn claim_for(&self, wallet: &AgentWallet) -> std::result::Result<RequesterClaim, ClaimError>;
}

/// Issues short-lived ed25519-signed claims for the wallet being used
pub struct SigningClaimIssuer {
    issuer: String,
    signer: ClaimSigner,
    attributes: BTreeMap<String, String>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SigningClaimIssuer {
    pub fn new(issuer: impl Into<String>, signer: ClaimSigner) -> Self {
        Self {
            issuer: issuer.into(),
            signer,
            attributes: BTreeMap::new(),
            ttl: Duration::minutes(5),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Predicates a wallet can add to trust claims from this issuer
    pub fn trust_predicates(&self) -> Vec<AccessPredicate> {
        vec![
            AccessPredicate::IssuedBy {
                issuer: self.issuer.clone(),
            },
            AccessPredicate::SignedBy {
                public_key: self.signer.public_key_hex(),
            },
        ]
    }
}

#[async_trait]
impl ClaimSource for SigningClaimIssuer {
    async fn claim_for(&self, wallet: &AgentWallet) -> std::result::Result<RequesterClaim, ClaimError> {
        let now = self.clock.now();
        let mut claim = RequesterClaim::new(wallet.agent_id.clone(), self.issuer.clone());
        claim.issued_at = now;
        claim.expires_at = Some(now + self.ttl);
        claim.attributes = self.attributes.clone();

        self.signer
            .sign_claim(&mut claim)
            .map_err(|e| ClaimError::Unavailable {
                reason: e.to_string(),
            })?;
        Ok(claim)
    }
}
