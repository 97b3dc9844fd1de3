//! Identity types for AgentGrid
//!
//! Agents are identified by opaque caller-chosen strings; on-chain parties by
//! 20-byte addresses. Both are strongly typed to prevent accidental mixing.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Result, WalletError};

/// Opaque identifier of an autonomous agent, unique per wallet
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A 20-byte EVM address, stored as lowercase `0x`-prefixed hex.
///
/// Lowercase normalization makes allow-list membership case-insensitive,
/// so checksummed and plain spellings of the same address compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Length of an address in bytes
    pub const LEN: usize = 20;

    /// Parse a `0x`-prefixed 40-hex-digit address
    pub fn parse(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| WalletError::invalid_request(format!("address {s} is missing 0x prefix")))?;

        let bytes = hex::decode(digits)
            .map_err(|e| WalletError::invalid_request(format!("address {s} is not hex: {e}")))?;

        Self::from_slice(&bytes)
    }

    /// Build from a fixed-size byte array
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    /// Build from raw address bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::LEN {
            return Err(WalletError::invalid_request(format!(
                "address must be {} bytes, got {}",
                Self::LEN,
                bytes.len()
            )));
        }
        Ok(Self(format!("0x{}", hex::encode(bytes))))
    }

    /// Borrow the normalized hex form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode to raw bytes
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        // Constructors guarantee 40 valid hex digits after the prefix.
        if let Ok(bytes) = hex::decode(&self.0[2..]) {
            out.copy_from_slice(&bytes);
        }
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Address {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = WalletError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// The asset a transaction moves
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenId {
    /// The chain's native coin
    Native,
    /// A fungible token contract
    Contract(Address),
}

impl TokenId {
    /// Token contract address, if any
    pub fn contract(&self) -> Option<&Address> {
        match self {
            Self::Native => None,
            Self::Contract(address) => Some(address),
        }
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Contract(address) => write!(f, "{}", address),
        }
    }
}
