//! # Validation Errors
//!
//! Failures raised by the constructors of core primitives. Higher crates
//! wrap these in their own error enums rather than re-inventing them.

use thiserror::Error;

/// A domain primitive failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Currency codes are 2–6 ASCII uppercase letters (`GAF`, `USDT`, `GOLD`).
    #[error("invalid currency code: {0:?}")]
    InvalidCurrency(String),

    /// Amounts must be strictly positive.
    #[error("amount must be positive")]
    NonPositiveAmount,

    /// Fee rates are expressed in basis points and cannot exceed 100%.
    #[error("fee rate {0} bps exceeds 10000")]
    InvalidFeeRate(u32),

    /// Role string did not match the closed role set.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// Arithmetic on amounts would overflow `u64`.
    #[error("amount overflow computing {0}")]
    Overflow(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert!(ValidationError::InvalidCurrency("usd".into())
            .to_string()
            .contains("\"usd\""));
        assert_eq!(
            ValidationError::NonPositiveAmount.to_string(),
            "amount must be positive"
        );
        assert!(ValidationError::InvalidFeeRate(20000)
            .to_string()
            .contains("20000"));
        assert!(ValidationError::UnknownRole("root".into())
            .to_string()
            .contains("root"));
        assert!(ValidationError::Overflow("quote")
            .to_string()
            .contains("quote"));
    }
}
