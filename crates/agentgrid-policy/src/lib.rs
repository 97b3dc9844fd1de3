//! AgentGrid Policy - Spending controls for agent wallets
//!
//! The policy engine decides whether a proposed transaction fits a wallet's
//! spending limits given the day's spend so far. It performs no I/O: the
//! same `(wallet, request, snapshot)` always yields the same decision.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. token allow-list
//! 2. per-transaction limit
//! 3. recipient allow-list
//! 4. daily limit
//!
//! The daily check here is advisory. The authoritative check is the atomic
//! reservation in `agentgrid-ledger`.

use agentgrid_ledger::LedgerSnapshot;
use agentgrid_types::{Address, AgentId, AgentWallet, Amount, TokenId, TransactionRequest, WalletError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Why a transaction was denied
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    #[error("token {token} is not in the allowed set")]
    TokenNotAllowed { agent_id: AgentId, token: TokenId },

    #[error("amount {requested} exceeds per-transaction limit {limit}")]
    TransactionLimitExceeded { requested: Amount, limit: Amount },

    #[error("recipient {recipient} is not in the allowed set")]
    RecipientNotAllowed { agent_id: AgentId, recipient: Address },

    #[error("spent {spent} + requested {requested} exceeds daily limit {limit}")]
    DailyLimitExceeded {
        spent: Amount,
        requested: Amount,
        limit: Amount,
    },
}

impl From<DenialReason> for WalletError {
    fn from(reason: DenialReason) -> Self {
        match reason {
            DenialReason::TokenNotAllowed { agent_id, token } => WalletError::TokenNotAllowed {
                agent_id: agent_id.to_string(),
                token: token.to_string(),
            },
            DenialReason::TransactionLimitExceeded { requested, limit } => {
                WalletError::TransactionLimitExceeded {
                    requested: requested.value(),
                    limit: limit.value(),
                }
            }
            DenialReason::RecipientNotAllowed {
                agent_id,
                recipient,
            } => WalletError::RecipientNotAllowed {
                agent_id: agent_id.to_string(),
                recipient: recipient.to_string(),
            },
            DenialReason::DailyLimitExceeded {
                spent,
                requested,
                limit,
            } => WalletError::DailyLimitExceeded {
                spent: spent.value(),
                requested: requested.value(),
                limit: limit.value(),
            },
        }
    }
}

/// Verdict of a policy check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyDecision {
    Approved,
    Denied(DenialReason),
}

impl PolicyDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Turn a denial into the matching `WalletError`
    pub fn into_result(self) -> agentgrid_types::Result<()> {
        match self {
            Self::Approved => Ok(()),
            Self::Denied(reason) => Err(reason.into()),
        }
    }
}

/// Stateless spending-limit evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn new() -> Self {
        Self
    }

    /// Validate a request against the wallet's limits and today's spend
    pub fn validate(
        &self,
        wallet: &AgentWallet,
        request: &TransactionRequest,
        snapshot: &LedgerSnapshot,
    ) -> PolicyDecision {
        let decision = match Self::first_denial(wallet, request, snapshot) {
            Some(reason) => PolicyDecision::Denied(reason),
            None => PolicyDecision::Approved,
        };

        debug!(
            agent_id = %wallet.agent_id,
            amount = %request.amount,
            spent = %snapshot.spent,
            approved = decision.is_approved(),
            "Policy evaluated"
        );

        decision
    }

    fn first_denial(
        wallet: &AgentWallet,
        request: &TransactionRequest,
        snapshot: &LedgerSnapshot,
    ) -> Option<DenialReason> {
        let limits = &wallet.spending_limits;

        if !limits.permits_token(&request.token) {
            return Some(DenialReason::TokenNotAllowed {
                agent_id: wallet.agent_id.clone(),
                token: request.token.clone(),
            });
        }

        if request.amount > limits.per_transaction_limit {
            return Some(DenialReason::TransactionLimitExceeded {
                requested: request.amount,
                limit: limits.per_transaction_limit,
            });
        }

        if !limits.permits_recipient(&request.recipient) {
            return Some(DenialReason::RecipientNotAllowed {
                agent_id: wallet.agent_id.clone(),
                recipient: request.recipient.clone(),
            });
        }

        // Overflow can only mean "over the limit"
        let within_daily = snapshot
            .spent
            .checked_add(request.amount)
            .is_some_and(|total| total <= limits.daily_limit);
        if !within_daily {
            return Some(DenialReason::DailyLimitExceeded {
                spent: snapshot.spent,
                requested: request.amount,
                limit: limits.daily_limit,
            });
        }

        None
    }
}
