//! AgentGrid Types - Canonical domain types for agent wallet custody
//!
//! This crate contains the foundational types shared by every AgentGrid crate,
//! with zero dependencies on other agentgrid crates. It defines:
//!
//! - Identity types (AgentId, Address, TokenId)
//! - Base-unit amounts with unit parsing and formatting
//! - Access policies and requester claims gating key decryption
//! - Agent wallet records and their spending limits
//! - Transaction request, signing and receipt types
//! - The wallet error taxonomy
//!
//! # Architectural Invariants
//!
//! 1. A wallet's private key is only ever stored as custody ciphertext
//! 2. Every outgoing transaction passes the spending policy before signing
//! 3. Every denial carries a specific reason

pub mod identity;
pub mod amount;
pub mod access;
pub mod wallet;
pub mod transaction;
pub mod error;

pub use identity::*;
pub use amount::*;
pub use access::*;
pub use wallet::*;
pub use transaction::*;
pub use error::*;

/// Version of the AgentGrid types schema
pub const TYPES_VERSION: &str = "0.1.0";
