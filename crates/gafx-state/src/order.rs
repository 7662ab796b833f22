//! # Order States

use serde::{Deserialize, Serialize};

/// The lifecycle state of an escrow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    /// Funds are locked; waiting for the buyer to pay off-platform.
    AwaitingPayment,
    /// Buyer says the fiat was sent; waiting for the seller to confirm.
    PaymentClaimed,
    /// Seller confirmed and tokens went to the buyer. Terminal state.
    EscrowReleased,
    /// A participant raised a dispute; an admin must decide.
    Disputed,
    /// Admin decided for the buyer. Terminal state.
    ResolvedBuyer,
    /// Admin decided for the seller. Terminal state.
    ResolvedSeller,
    /// Cancelled before payment. Terminal state.
    Cancelled,
    /// Payment window elapsed without payment. Terminal state.
    Expired,
}

impl OrderState {
    pub const ALL: [OrderState; 8] = [
        Self::AwaitingPayment,
        Self::PaymentClaimed,
        Self::EscrowReleased,
        Self::Disputed,
        Self::ResolvedBuyer,
        Self::ResolvedSeller,
        Self::Cancelled,
        Self::Expired,
    ];

    /// Whether this is a terminal state (no further transitions).
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::EscrowReleased
            | Self::ResolvedBuyer
            | Self::ResolvedSeller
            | Self::Cancelled
            | Self::Expired => true,
            Self::AwaitingPayment | Self::PaymentClaimed | Self::Disputed => false,
        }
    }

    /// States in which a dispute record must exist.
    pub fn has_dispute(&self) -> bool {
        matches!(
            self,
            Self::Disputed | Self::ResolvedBuyer | Self::ResolvedSeller
        )
    }

    /// States that ended through an admin decision.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::ResolvedBuyer | Self::ResolvedSeller)
    }

    /// The canonical string name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingPayment => "AWAITING_PAYMENT",
            Self::PaymentClaimed => "PAYMENT_CLAIMED",
            Self::EscrowReleased => "ESCROW_RELEASED",
            Self::Disputed => "DISPUTED",
            Self::ResolvedBuyer => "RESOLVED_BUYER",
            Self::ResolvedSeller => "RESOLVED_SELLER",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown order state: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        let terminal: Vec<_> = OrderState::ALL
            .into_iter()
            .filter(OrderState::is_terminal)
            .collect();
        assert_eq!(
            terminal,
            vec![
                OrderState::EscrowReleased,
                OrderState::ResolvedBuyer,
                OrderState::ResolvedSeller,
                OrderState::Cancelled,
                OrderState::Expired,
            ]
        );
    }

    #[test]
    fn dispute_bearing_states() {
        assert!(OrderState::Disputed.has_dispute());
        assert!(OrderState::ResolvedBuyer.has_dispute());
        assert!(OrderState::ResolvedSeller.has_dispute());
        assert!(!OrderState::PaymentClaimed.has_dispute());
        assert!(!OrderState::EscrowReleased.has_dispute());
    }

    #[test]
    fn as_str_matches_serde() {
        for state in OrderState::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }

    #[test]
    fn from_str_roundtrip() {
        for state in OrderState::ALL {
            assert_eq!(state.as_str().parse::<OrderState>().unwrap(), state);
        }
        assert!("OPERATIONAL".parse::<OrderState>().is_err());
    }
}
