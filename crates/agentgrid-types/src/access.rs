//! Access policies gating key decryption
//!
//! An access policy is an ordered list of predicates. A requester claim must
//! satisfy every predicate before custody will release a decrypted key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::AgentId;

/// A single condition over a requester claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccessPredicate {
    /// The claim's subject must be this agent
    AgentIdEquals { agent_id: AgentId },
    /// The claim must come from this issuer
    IssuedBy { issuer: String },
    /// The claim must carry this attribute value
    AttributeEquals { key: String, value: String },
    /// The claim must carry a valid ed25519 proof from this key (hex)
    SignedBy { public_key: String },
}

/// Ordered predicate set evaluated with logical AND
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub predicates: Vec<AccessPredicate>,
}

impl AccessPolicy {
    /// The minimal policy every provisioned wallet carries
    pub fn for_agent(agent_id: &AgentId) -> Self {
        Self {
            predicates: vec![AccessPredicate::AgentIdEquals {
                agent_id: agent_id.clone(),
            }],
        }
    }

    /// Append a predicate, keeping insertion order
    pub fn with(mut self, predicate: AccessPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Canonical bytes used to bind ciphertext to this exact policy
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Detached proof over a claim's signable bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimProof {
    /// Hex-encoded ed25519 verifying key
    pub public_key: String,
    /// Hex-encoded ed25519 signature
    pub signature: String,
}

/// An assertion of identity presented when requesting key decryption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterClaim {
    /// Agent the requester claims to act as
    pub subject: AgentId,
    /// Who issued the claim
    pub issuer: String,
    /// Additional attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub issued_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub proof: Option<ClaimProof>,
}

impl RequesterClaim {
    pub fn new(subject: AgentId, issuer: impl Into<String>) -> Self {
        Self {
            subject,
            issuer: issuer.into(),
            attributes: BTreeMap::new(),
            issued_at: Utc::now(),
            expires_at: None,
            proof: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Bytes covered by the proof (everything except the proof itself)
    pub fn signable_bytes(&self) -> Vec<u8> {
        #[derive(Serialize)]
        struct Signable<'a> {
            subject: &'a AgentId,
            issuer: &'a str,
            attributes: &'a BTreeMap<String, String>,
            issued_at: &'a DateTime<Utc>,
            expires_at: &'a Option<DateTime<Utc>>,
        }

        serde_json::to_vec(&Signable {
            subject: &self.subject,
            issuer: &self.issuer,
            attributes: &self.attributes,
            issued_at: &self.issued_at,
            expires_at: &self.expires_at,
        })
        .unwrap_or_default()
    }
}

/// Custody ciphertext plus whatever the custody backend needs to decrypt it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedKey {
    /// Opaque ciphertext (hex)
    pub ciphertext: String,
    /// Backend-specific descriptor
    pub descriptor: serde_json::Value,
}
