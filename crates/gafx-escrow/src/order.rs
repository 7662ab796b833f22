//! # Order Records
//!
//! An [`Order`] owns its [`Dispute`] and [`Settlement`] so that fund
//! disposition, dispute status, and order state are always written in
//! one commit.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use gafx_core::{Actor, ActorId, CurrencyCode, OrderId, PriceQuote, Role};
use gafx_state::{DisputeStatus, OrderState, Party, Resolution};

use crate::error::EscrowError;
use crate::ledger::{EscrowRef, LedgerOp};

const MAX_PAYMENT_METHOD_LEN: usize = 64;

// ── Draft ────────────────────────────────────────────────────────────

/// Trade limits copied from the merchant's advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLimits {
    pub min: u64,
    pub max: u64,
}

/// What a participant submits to open an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub buyer_id: ActorId,
    pub seller_id: ActorId,
    /// Token quantity in minor units.
    pub amount: u64,
    /// Fiat currency the buyer pays in.
    pub fiat_currency: CurrencyCode,
    pub payment_method: Option<String>,
    pub limits: Option<OrderLimits>,
}

impl OrderDraft {
    pub fn validate(&self) -> Result<(), EscrowError> {
        if self.buyer_id == self.seller_id {
            return Err(EscrowError::Validation(
                "buyer and seller must be different actors".into(),
            ));
        }
        if self.buyer_id == ActorId::SYSTEM || self.seller_id == ActorId::SYSTEM {
            return Err(EscrowError::Validation(
                "the system principal cannot trade".into(),
            ));
        }
        if self.amount == 0 {
            return Err(EscrowError::Validation("amount must be positive".into()));
        }
        if let Some(limits) = self.limits {
            if limits.min > limits.max {
                return Err(EscrowError::Validation(format!(
                    "invalid limits: min {} exceeds max {}",
                    limits.min, limits.max
                )));
            }
            if self.amount < limits.min || self.amount > limits.max {
                return Err(EscrowError::Validation(format!(
                    "amount {} outside advertised limits {}-{}",
                    self.amount, limits.min, limits.max
                )));
            }
        }
        if let Some(method) = &self.payment_method {
            if method.trim().is_empty() || method.chars().count() > MAX_PAYMENT_METHOD_LEN {
                return Err(EscrowError::Validation(format!(
                    "payment method must be 1-{MAX_PAYMENT_METHOD_LEN} characters"
                )));
            }
        }
        Ok(())
    }
}

// ── Dispute ──────────────────────────────────────────────────────────

/// A disagreement awaiting (or settled by) an admin decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub order_id: OrderId,
    pub initiator_id: ActorId,
    pub reason_code: String,
    pub status: DisputeStatus,
    pub resolution: Option<Resolution>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<ActorId>,
    /// How many times an admin asked for more information.
    pub info_requests: u32,
}

// ── Settlement ───────────────────────────────────────────────────────

/// The single fund disposition of a terminal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub op: LedgerOp,
    pub recipient: Party,
    pub recipient_id: ActorId,
    /// Amount credited to the recipient.
    pub amount: u64,
    /// Amount withheld for the platform.
    pub fee: u64,
    pub receipt: String,
    pub settled_at: DateTime<Utc>,
}

// ── Order ────────────────────────────────────────────────────────────

/// One escrow trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer_id: ActorId,
    pub seller_id: ActorId,
    /// Locked token quantity in minor units.
    pub amount: u64,
    pub price_quote: PriceQuote,
    pub payment_method: Option<String>,
    pub state: OrderState,
    /// Starts at 1 and grows by exactly 1 per committed transition.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub phase_deadline: Option<DateTime<Utc>>,
    pub escrow_ref: EscrowRef,
    /// Fee withheld if the escrow is released.
    pub fee_amount: u64,
    pub payment_proof: Option<String>,
    pub dispute: Option<Dispute>,
    pub settlement: Option<Settlement>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl Order {
    /// The role `actor` plays on this order, or `None` for a stranger.
    ///
    /// Participant roles come from the order record, not from the role
    /// the identity system asserted: a merchant who buys on another
    /// merchant's ad is that order's buyer.
    pub fn role_of(&self, actor: &Actor) -> Option<Role> {
        match actor.role {
            Role::Admin => Some(Role::Admin),
            Role::System => (actor.id == ActorId::SYSTEM).then_some(Role::System),
            Role::Buyer | Role::Seller => {
                if actor.id == self.buyer_id {
                    Some(Role::Buyer)
                } else if actor.id == self.seller_id {
                    Some(Role::Seller)
                } else {
                    None
                }
            }
        }
    }

    pub fn party_id(&self, party: Party) -> ActorId {
        match party {
            Party::Buyer => self.buyer_id,
            Party::Seller => self.seller_id,
        }
    }

    pub fn is_participant(&self, actor: ActorId) -> bool {
        actor == self.buyer_id || actor == self.seller_id
    }

    /// Whether `now` is at or past the phase deadline.
    pub fn deadline_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.phase_deadline.is_some_and(|d| now >= d)
    }

    /// Remaining time in the current phase, clamped at zero.
    pub fn time_left(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.phase_deadline
            .map(|d| (d - now).max(Duration::zero()))
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// Whether a terminal order paid out exactly what it locked.
    pub fn is_conserved(&self) -> bool {
        match &self.settlement {
            Some(s) => s.amount + s.fee == self.amount,
            None => !self.state.is_terminal(),
        }
    }
}
