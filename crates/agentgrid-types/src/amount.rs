//! Base-unit amounts
//!
//! Amounts are unsigned integers in the token's smallest unit (wei for the
//! native coin). Decimal strings are converted at the edges only.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Result, WalletError};

/// Decimals of the native coin (wei per ether = 10^18)
pub const NATIVE_DECIMALS: u8 = 18;

/// A non-negative amount in base units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn zero() -> Self {
        Self::ZERO
    }

    pub fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Parse a decimal string such as `"1.5"` into base units.
    ///
    /// Rejects signs, exponents, empty input, more fractional digits than
    /// `decimals`, and values that overflow `u128`.
    pub fn parse_units(text: &str, decimals: u8) -> Result<Self> {
        let text = text.trim();
        let (whole, frac) = match text.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (text, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(WalletError::invalid_request(format!("amount '{text}' has no digits")));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WalletError::invalid_request(format!("amount '{text}' is not a decimal number")));
        }
        if frac.len() > decimals as usize {
            return Err(WalletError::invalid_request(format!(
                "amount '{text}' has more than {decimals} fractional digits"
            )));
        }

        let overflow = || WalletError::invalid_request(format!("amount '{text}' is too large"));
        let scale = 10u128.checked_pow(decimals as u32).ok_or_else(overflow)?;

        let whole_units = if whole.is_empty() {
            0
        } else {
            whole.parse::<u128>().map_err(|_| overflow())?
        };

        let frac_units = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = decimals as usize);
            padded.parse::<u128>().map_err(|_| overflow())?
        };

        whole_units
            .checked_mul(scale)
            .and_then(|v| v.checked_add(frac_units))
            .map(Self)
            .ok_or_else(overflow)
    }

    /// Format as a decimal string with trailing fractional zeros trimmed
    /// (keeping at least one fractional digit when `decimals > 0`).
    pub fn format_units(&self, decimals: u8) -> String {
        if decimals == 0 {
            return self.0.to_string();
        }
        let Some(scale) = 10u128.checked_pow(decimals as u32) else {
            return self.0.to_string();
        };

        let whole = self.0 / scale;
        let frac = format!("{:0>width$}", self.0 % scale, width = decimals as usize);
        let trimmed = frac.trim_end_matches('0');
        let frac = if trimmed.is_empty() { "0" } else { trimmed };
        format!("{whole}.{frac}")
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u128> for Amount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}
