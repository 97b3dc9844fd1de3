//! Transaction types for AgentGrid
//!
//! A `TransactionRequest` lives only for one execution attempt. It is turned
//! into an `UnsignedTransaction`, signed into a `SignedTransaction`, and
//! reported back as a `TransactionReceipt` once the chain accepts it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Address, AgentId, Amount, TokenId};

/// A proposed outgoing transaction for one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub agent_id: AgentId,
    pub recipient: Address,
    pub token: TokenId,
    pub amount: Amount,
    /// Optional calldata for native transfers
    #[serde(default)]
    pub payload: Option<Vec<u8>>,
    /// Gas limit; estimated through the chain client when absent
    #[serde(default)]
    pub gas_limit: Option<u64>,
}

impl TransactionRequest {
    /// A plain native-coin transfer
    pub fn native(agent_id: AgentId, recipient: Address, amount: Amount) -> Self {
        Self {
            agent_id,
            recipient,
            token: TokenId::Native,
            amount,
            payload: None,
            gas_limit: None,
        }
    }

    /// A fungible-token transfer
    pub fn token(agent_id: AgentId, recipient: Address, token: Address, amount: Amount) -> Self {
        Self {
            agent_id,
            recipient,
            token: TokenId::Contract(token),
            amount,
            payload: None,
            gas_limit: None,
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

/// A fully built transaction awaiting a signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub from: Address,
    pub to: Address,
    /// Native value attached to the call
    pub value: Amount,
    /// `0x`-prefixed calldata hex
    pub data: String,
    pub gas_limit: u64,
}

impl UnsignedTransaction {
    /// Canonical encoding that signatures and hashes cover
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// A signed transaction ready for submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: UnsignedTransaction,
    /// 65-byte recoverable signature `r || s || v`, hex
    pub signature: String,
    /// `0x`-prefixed transaction hash
    pub hash: String,
}

/// What the chain returns on accepting a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub hash: String,
    #[serde(default)]
    pub block_number: Option<u64>,
}

/// Result of a successful execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub hash: String,
    pub agent_id: AgentId,
    pub amount: Amount,
    pub recipient: Address,
    pub token: TokenId,
    pub gas_limit: u64,
    pub block_number: Option<u64>,
    pub submitted_at: DateTime<Utc>,
}
