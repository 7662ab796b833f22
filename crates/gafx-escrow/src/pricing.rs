//! # Pricing Oracle Port
//!
//! Consulted once when an order is created; the resulting [`PriceQuote`]
//! is frozen into the order. The same oracle backs the public currency
//! converter.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use gafx_core::{Clock, CurrencyCode, PriceQuote, ValidationError, RATE_SCALE};

/// Pricing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(CurrencyCode),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Rate source consumed by the engine.
pub trait PricingOracle: Send + Sync {
    /// Price `amount` units of `base` in `quote`.
    fn quote(&self, base: &CurrencyCode, quote: &CurrencyCode, amount: u64) -> Result<PriceQuote, PricingError>;

    /// Every currency the oracle can price, with its USD reference rate
    /// scaled by [`RATE_SCALE`].
    fn reference_rates(&self) -> Vec<(CurrencyCode, u64)>;
}

/// An oracle over a fixed table of USD reference rates.
pub struct StaticRateOracle {
    usd_rates: BTreeMap<CurrencyCode, u64>,
    clock: Arc<dyn Clock>,
}

impl StaticRateOracle {
    /// Build from `(code, usd_rate)` pairs, rates scaled by [`RATE_SCALE`].
    /// Zero rates are dropped.
    pub fn new(rates: impl IntoIterator<Item = (CurrencyCode, u64)>, clock: Arc<dyn Clock>) -> Self {
        Self {
            usd_rates: rates.into_iter().filter(|(_, r)| *r > 0).collect(),
            clock,
        }
    }

    /// The rate board shown in the converter: GAF, USD, UGX, KES, USDT,
    /// BNB, and gold by the gram.
    pub fn with_default_rates(clock: Arc<dyn Clock>) -> Result<Self, ValidationError> {
        let table = [
            ("GAF", 980_000),
            ("USD", 1_000_000),
            ("UGX", 270),
            ("KES", 6_700),
            ("USDT", 1_000_000),
            ("BNB", 245_300_000),
            ("GOLD", 65_250_000),
        ];
        let rates = table
            .into_iter()
            .map(|(code, rate)| Ok((CurrencyCode::new(code)?, rate)))
            .collect::<Result<Vec<_>, ValidationError>>()?;
        Ok(Self::new(rates, clock))
    }

    fn usd_rate(&self, code: &CurrencyCode) -> Result<u64, PricingError> {
        self.usd_rates
            .get(code)
            .copied()
            .ok_or_else(|| PricingError::UnsupportedCurrency(code.clone()))
    }
}

impl std::fmt::Debug for StaticRateOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticRateOracle")
            .field("usd_rates", &self.usd_rates)
            .finish()
    }
}

impl PricingOracle for StaticRateOracle {
    fn quote(&self, base: &CurrencyCode, quote: &CurrencyCode, amount: u64) -> Result<PriceQuote, PricingError> {
        let base_usd = self.usd_rate(base)?;
        let quote_usd = self.usd_rate(quote)?;
        // Cross rate through USD, kept in fixed point.
        let cross = u128::from(base_usd) * u128::from(RATE_SCALE) / u128::from(quote_usd);
        let rate = u64::try_from(cross).map_err(|_| ValidationError::Overflow("cross rate"))?;
        Ok(PriceQuote::compute(
            base.clone(),
            quote.clone(),
            amount,
            rate,
            self.clock.now(),
        )?)
    }

    fn reference_rates(&self) -> Vec<(CurrencyCode, u64)> {
        self.usd_rates.iter().map(|(c, r)| (c.clone(), *r)).collect()
    }
}
