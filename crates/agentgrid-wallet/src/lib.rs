//! AgentGrid Wallet - Custody and spending control for autonomous agents
//!
//! This crate implements the agent wallet pipeline:
//! - Provisioning a signing identity per agent, with the key held only as
//!   custody ciphertext
//! - Policy-gated key release against requester claims
//! - Spending-limit checks and atomic daily reservations
//! - Signing and submission with rollback on any failure
//!
//! Collaborators (custody backend, claim source, chain client, wallet store)
//! are traits injected at construction; `SoftwareKeystore`, `InMemoryKeyStore`
//! and `InMemoryChain` are in-process implementations.

pub mod access;
pub mod chain;
pub mod config;
pub mod custody;
pub mod executor;
pub mod provisioner;
pub mod service;
pub mod store;

pub use access::*;
pub use chain::*;
pub use config::*;
pub use custody::*;
pub use executor::*;
pub use provisioner::*;
pub use service::*;
pub use store::*;
