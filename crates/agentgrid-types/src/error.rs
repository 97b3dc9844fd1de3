//! Error types for AgentGrid
//!
//! Every denial is explicit and carries the values that caused it.

use thiserror::Error;

/// Result type for AgentGrid wallet operations
pub type Result<T> = std::result::Result<T, WalletError>;

/// AgentGrid wallet error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    // ========================================================================
    // Custody Errors
    // ========================================================================

    /// A wallet already exists for this agent
    #[error("Agent {agent_id} already has a wallet")]
    DuplicateAgent { agent_id: String },

    /// No wallet exists for this agent
    #[error("No wallet found for agent {agent_id}")]
    NotFound { agent_id: String },

    // ========================================================================
    // Policy Errors
    // ========================================================================

    /// Token outside the wallet's allowed set
    #[error("Token {token} is not allowed for agent {agent_id}")]
    TokenNotAllowed { agent_id: String, token: String },

    /// Single transaction above the per-transaction limit
    #[error("Transaction amount {requested} exceeds per-transaction limit {limit}")]
    TransactionLimitExceeded { requested: u128, limit: u128 },

    /// Recipient outside the wallet's allowed set
    #[error("Recipient {recipient} is not allowed for agent {agent_id}")]
    RecipientNotAllowed { agent_id: String, recipient: String },

    /// Cumulative daily spend would exceed the daily limit
    #[error("Daily limit exceeded: spent {spent} + requested {requested} > limit {limit}")]
    DailyLimitExceeded { spent: u128, requested: u128, limit: u128 },

    // ========================================================================
    // Authorization and Submission Errors
    // ========================================================================

    /// Key release was refused
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// The chain did not accept the transaction; the spend was rolled back
    #[error("Submission failed: {reason}")]
    SubmissionFailed { reason: String },

    // ========================================================================
    // General Errors
    // ========================================================================

    /// Malformed request
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Collaborator or runtime failure outside the policy taxonomy
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl WalletError {
    pub fn not_found(agent_id: impl ToString) -> Self {
        Self::NotFound {
            agent_id: agent_id.to_string(),
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    pub fn submission_failed(reason: impl Into<String>) -> Self {
        Self::SubmissionFailed {
            reason: reason.into(),
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the identical call can succeed without other changes
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::SubmissionFailed { .. } | Self::Internal { .. })
    }

    /// Whether this is a spending-policy denial
    pub fn is_policy_denial(&self) -> bool {
        matches!(
            self,
            Self::TokenNotAllowed { .. }
                | Self::TransactionLimitExceeded { .. }
                | Self::RecipientNotAllowed { .. }
                | Self::DailyLimitExceeded { .. }
        )
    }

    /// Get an error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateAgent { .. } => "DUPLICATE_AGENT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::TokenNotAllowed { .. } => "TOKEN_NOT_ALLOWED",
            Self::TransactionLimitExceeded { .. } => "TRANSACTION_LIMIT_EXCEEDED",
            Self::RecipientNotAllowed { .. } => "RECIPIENT_NOT_ALLOWED",
            Self::DailyLimitExceeded { .. } => "DAILY_LIMIT_EXCEEDED",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::SubmissionFailed { .. } => "SUBMISSION_FAILED",
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}
