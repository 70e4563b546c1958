use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utx_types::AccountName;

pub const UTX_SYMBOL: &str = "UTX";
pub const UTX_DECIMALS: u32 = 4;
pub const UTX_BASE_UNIT: u64 = 10_000; // 10^4

/// Token quantity in base units (1 UTX = 10^4 units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TokenAmount(u64);

impl TokenAmount {
    pub const ZERO: Self = Self(0);
    pub const DEFAULT_MAX_SUPPLY: Self = Self(10_000_000_000 * UTX_BASE_UNIT); // 10^10 UTX

    pub const fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    pub fn from_whole(tokens: u64) -> Self {
        Self(tokens.saturating_mul(UTX_BASE_UNIT))
    }

    pub fn to_base_units(&self) -> u64 {
        self.0
    }

    /// Lossy conversion, for logging only.
    pub fn to_utx(&self) -> f64 {
        self.0 as f64 / UTX_BASE_UNIT as f64
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:04} {}",
            self.0 / UTX_BASE_UNIT,
            self.0 % UTX_BASE_UNIT,
            UTX_SYMBOL
        )
    }
}

impl FromStr for TokenAmount {
    type Err = anyhow::Error;

    /// Parses `"12.3456 UTX"` or `"12.3456"`; at most four decimals.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let number = s.strip_suffix(UTX_SYMBOL).map(str::trim_end).unwrap_or(s);
        let (whole, frac) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if whole.is_empty() || frac.len() > UTX_DECIMALS as usize {
            bail!("Invalid token amount: {}", s);
        }
        let whole: u64 = whole.parse()?;
        let frac_units: u64 = if frac.is_empty() {
            0
        } else {
            format!("{:0<4}", frac).parse()?
        };
        whole
            .checked_mul(UTX_BASE_UNIT)
            .and_then(|w| w.checked_add(frac_units))
            .map(Self)
            .ok_or_else(|| anyhow::anyhow!("Token amount overflow: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Issue,
    Transfer,
}

/// Supply-level event kept by [`crate::TokenSupply`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEvent {
    pub kind: TransferKind,
    pub to: AccountName,
    pub amount: TokenAmount,
    pub timestamp: i64,
    pub memo: String,
}
