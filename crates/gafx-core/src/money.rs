//! # Amounts, Fees, and Price Quotes
//!
//! Token and fiat amounts are `u64` minor units. Rates are fixed-point
//! integers scaled by [`RATE_SCALE`], so a rate of `0.98` is stored as
//! `980_000`. Intermediate products are computed in `u128` and every
//! division rounds toward zero, which means fees never exceed the exact
//! percentage and the remainder always stays with the recipient.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Fixed-point scale of exchange rates (micro-units).
pub const RATE_SCALE: u64 = 1_000_000;

const BPS_SCALE: u64 = 10_000;

// ── Currency ─────────────────────────────────────────────────────────

/// Upper-case ticker of a token, fiat, or commodity unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Validate and wrap a currency ticker.
    pub fn new(code: impl Into<String>) -> Result<Self, ValidationError> {
        let code = code.into();
        let valid = (2..=6).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_uppercase());
        if valid {
            Ok(Self(code))
        } else {
            Err(ValidationError::InvalidCurrency(code))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Fee Schedule ─────────────────────────────────────────────────────

/// Platform escrow fee, in basis points of the traded amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    bps: u32,
}

impl FeeSchedule {
    /// The published platform rate: 0.5%.
    pub const DEFAULT_BPS: u32 = 50;

    pub fn new(bps: u32) -> Result<Self, ValidationError> {
        if u64::from(bps) > BPS_SCALE {
            return Err(ValidationError::InvalidFeeRate(bps));
        }
        Ok(Self { bps })
    }

    pub fn bps(&self) -> u32 {
        self.bps
    }

    /// Fee withheld on release of `amount`. Rounds down.
    pub fn fee_for(&self, amount: u64) -> u64 {
        // bps <= 10_000 so the quotient never exceeds `amount`.
        let fee = u128::from(amount) * u128::from(self.bps) / u128::from(BPS_SCALE);
        fee as u64
    }

    /// Amount the recipient receives after the fee.
    pub fn net_of(&self, amount: u64) -> u64 {
        amount - self.fee_for(amount)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            bps: Self::DEFAULT_BPS,
        }
    }
}

// ── Price Quote ──────────────────────────────────────────────────────

/// A conversion quoted by the pricing oracle.
///
/// Frozen into an order at creation and never recomputed, so later rate
/// moves cannot change what either party agreed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub base: CurrencyCode,
    pub quote: CurrencyCode,
    /// Amount in `base` minor units.
    pub base_amount: u64,
    /// Equivalent amount in `quote` minor units.
    pub quote_amount: u64,
    /// Units of `quote` per unit of `base`, scaled by [`RATE_SCALE`].
    pub rate: u64,
    pub quoted_at: DateTime<Utc>,
}

impl PriceQuote {
    /// Price `base_amount` at `rate`.
    pub fn compute(
        base: CurrencyCode,
        quote: CurrencyCode,
        base_amount: u64,
        rate: u64,
        quoted_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if base_amount == 0 {
            return Err(ValidationError::NonPositiveAmount);
        }
        let quote_amount = u128::from(base_amount) * u128::from(rate) / u128::from(RATE_SCALE);
        let quote_amount =
            u64::try_from(quote_amount).map_err(|_| ValidationError::Overflow("price quote"))?;
        Ok(Self {
            base,
            quote,
            base_amount,
            quote_amount,
            rate,
            quoted_at,
        })
    }
}
