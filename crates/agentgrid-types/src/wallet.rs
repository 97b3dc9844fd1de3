//! Agent wallet records and spending limits

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{AccessPolicy, Address, AgentId, Amount, EncryptedKey, TokenId};

/// Spending limits enforced before any transaction is signed.
///
/// Empty `allowed_tokens` / `allowed_recipients` mean no restriction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingLimits {
    /// Maximum cumulative spend per calendar day (UTC)
    pub daily_limit: Amount,
    /// Maximum per single transaction
    pub per_transaction_limit: Amount,
    #[serde(default)]
    pub allowed_tokens: BTreeSet<TokenId>,
    #[serde(default)]
    pub allowed_recipients: BTreeSet<Address>,
}

impl SpendingLimits {
    /// Limits with open token and recipient sets
    pub fn new(daily_limit: Amount, per_transaction_limit: Amount) -> Self {
        Self {
            daily_limit,
            per_transaction_limit,
            allowed_tokens: BTreeSet::new(),
            allowed_recipients: BTreeSet::new(),
        }
    }

    pub fn allow_token(mut self, token: TokenId) -> Self {
        self.allowed_tokens.insert(token);
        self
    }

    pub fn allow_recipient(mut self, recipient: Address) -> Self {
        self.allowed_recipients.insert(recipient);
        self
    }

    pub fn permits_token(&self, token: &TokenId) -> bool {
        self.allowed_tokens.is_empty() || self.allowed_tokens.contains(token)
    }

    pub fn permits_recipient(&self, recipient: &Address) -> bool {
        self.allowed_recipients.is_empty() || self.allowed_recipients.contains(recipient)
    }
}

/// One agent's signing identity.
///
/// Immutable after provisioning except for `spending_limits`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentWallet {
    pub agent_id: AgentId,
    pub address: Address,
    /// Uncompressed secp256k1 public key, `0x04`-prefixed hex
    pub public_key: String,
    pub encrypted_private_key: EncryptedKey,
    pub access_policy: AccessPolicy,
    pub spending_limits: SpendingLimits,
    pub created_at: DateTime<Utc>,
}
