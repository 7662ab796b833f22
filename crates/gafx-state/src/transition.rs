//! # Transition Table
//!
//! [`rules`] is the single source of truth for what may happen to an
//! order. Participant actions, admin decisions, and scheduler timeouts
//! are all looked up here; nothing bypasses it.
//!
//! Lookup order matters for error reporting: a `(state, action)` pair
//! with no row is `Illegal` regardless of who asked, and only a legal
//! pair is then checked against the row's permitted roles.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use gafx_core::Role;

use crate::dispute::Resolution;
use crate::order::OrderState;

// ── Actions ──────────────────────────────────────────────────────────

/// Something an actor (or the scheduler) asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    MarkPaid,
    Cancel,
    /// Synthetic action submitted by the deadline scheduler.
    Timeout,
    ReleaseEscrow,
    RaiseDispute,
    ResolveBuyer,
    ResolveSeller,
    RequestInfo,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Self::MarkPaid,
        Self::Cancel,
        Self::Timeout,
        Self::ReleaseEscrow,
        Self::RaiseDispute,
        Self::ResolveBuyer,
        Self::ResolveSeller,
        Self::RequestInfo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarkPaid => "mark-paid",
            Self::Cancel => "cancel",
            Self::Timeout => "timeout",
            Self::ReleaseEscrow => "release-escrow",
            Self::RaiseDispute => "raise-dispute",
            Self::ResolveBuyer => "resolve-buyer",
            Self::ResolveSeller => "resolve-seller",
            Self::RequestInfo => "request-info",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Effects ──────────────────────────────────────────────────────────

/// One side of the trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Buyer,
    Seller,
}

impl std::fmt::Display for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
        })
    }
}

/// The fund movement a transition requires from the escrow ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// No funds move.
    Hold,
    /// Return the full locked amount, no fee.
    Refund { to: Party },
    /// Pay out `amount − fee` and send the fee to the platform.
    Release { to: Party },
}

impl Disposition {
    pub fn moves_funds(&self) -> bool {
        !matches!(self, Self::Hold)
    }
}

/// What a transition does to the order's dispute record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputeEffect {
    None,
    /// Create the record with status `OPEN`.
    Open,
    /// Move to `INVESTIGATING` (idempotent).
    Investigate,
    /// Close with the given outcome.
    Resolve(Resolution),
}

/// How a transition changes the phase deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineEffect {
    /// Leave the deadline as it is.
    Keep,
    /// Start the seller's confirmation window.
    ReleaseWindow,
    /// No deadline applies in the target state.
    Clear,
}

// ── Rules ────────────────────────────────────────────────────────────

/// One row of the transition table.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub from: &'static [OrderState],
    pub action: Action,
    /// Roles, relative to the order, allowed to take this action.
    pub actors: &'static [Role],
    pub to: OrderState,
    pub disposition: Disposition,
    pub dispute: DisputeEffect,
    pub deadline: DeadlineEffect,
    /// Body of the system message appended when the row commits.
    pub note: &'static str,
}

use OrderState::*;

const RULES: &[Rule] = &[
    Rule {
        from: &[AwaitingPayment],
        action: Action::MarkPaid,
        actors: &[Role::Buyer],
        to: PaymentClaimed,
        disposition: Disposition::Hold,
        dispute: DisputeEffect::None,
        deadline: DeadlineEffect::ReleaseWindow,
        note: "Buyer marked the payment as sent. Seller, please confirm receipt and release the escrow.",
    },
    Rule {
        from: &[AwaitingPayment],
        action: Action::Cancel,
        actors: &[Role::Buyer, Role::Seller],
        to: Cancelled,
        disposition: Disposition::Refund { to: Party::Buyer },
        dispute: DisputeEffect::None,
        deadline: DeadlineEffect::Clear,
        note: "Order cancelled. The escrowed amount has been refunded.",
    },
    Rule {
        from: &[AwaitingPayment],
        action: Action::Timeout,
        actors: &[Role::System],
        to: Expired,
        disposition: Disposition::Refund { to: Party::Buyer },
        dispute: DisputeEffect::None,
        deadline: DeadlineEffect::Clear,
        note: "Payment window elapsed. The order has expired and the escrowed amount has been refunded.",
    },
    Rule {
        from: &[PaymentClaimed],
        action: Action::ReleaseEscrow,
        actors: &[Role::Seller],
        to: EscrowReleased,
        disposition: Disposition::Release { to: Party::Buyer },
        dispute: DisputeEffect::None,
        deadline: DeadlineEffect::Clear,
        note: "Escrow released to the buyer.",
    },
    Rule {
        from: &[AwaitingPayment, PaymentClaimed],
        action: Action::RaiseDispute,
        actors: &[Role::Buyer, Role::Seller],
        to: Disputed,
        disposition: Disposition::Hold,
        dispute: DisputeEffect::Open,
        deadline: DeadlineEffect::Clear,
        note: "A dispute has been opened. An admin will review this order.",
    },
    Rule {
        from: &[Disputed],
        action: Action::ResolveBuyer,
        actors: &[Role::Admin],
        to: ResolvedBuyer,
        disposition: Disposition::Release { to: Party::Buyer },
        dispute: DisputeEffect::Resolve(Resolution::BuyerFavor),
        deadline: DeadlineEffect::Clear,
        note: "Dispute resolved in favor of the buyer. Escrow released to the buyer.",
    },
    Rule {
        from: &[Disputed],
        action: Action::ResolveSeller,
        actors: &[Role::Admin],
        to: ResolvedSeller,
        disposition: Disposition::Refund { to: Party::Seller },
        dispute: DisputeEffect::Resolve(Resolution::SellerFavor),
        deadline: DeadlineEffect::Clear,
        note: "Dispute resolved in favor of the seller. Escrow refunded to the seller.",
    },
    Rule {
        from: &[Disputed],
        action: Action::RequestInfo,
        actors: &[Role::Admin],
        to: Disputed,
        disposition: Disposition::Hold,
        dispute: DisputeEffect::Investigate,
        deadline: DeadlineEffect::Keep,
        note: "An admin has requested more information. Please share any payment evidence in this chat.",
    },
];

/// Every row of the table, in declaration order.
pub fn rules() -> &'static [Rule] {
    RULES
}

// ── Transition ───────────────────────────────────────────────────────

/// A legal, authorized move resolved from the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderState,
    pub action: Action,
    pub to: OrderState,
    pub disposition: Disposition,
    pub dispute: DisputeEffect,
    pub deadline: DeadlineEffect,
    pub note: &'static str,
}

impl Transition {
    /// Whether the order's state actually changes.
    pub fn changes_state(&self) -> bool {
        self.from != self.to
    }
}

/// Rejections from the table lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// No row exists for this action in this state.
    #[error("{action} is not permitted from {from}")]
    Illegal { from: OrderState, action: Action },

    /// A row exists but the caller's role is not one of its actors.
    #[error("{action} from {from} cannot be performed by {role}")]
    RoleNotPermitted {
        from: OrderState,
        action: Action,
        role: Role,
    },
}

/// Resolve `action` against the table.
///
/// `role` is the caller's role relative to the order: the order's own
/// buyer or seller, an admin, or the system.
pub fn transition(from: OrderState, action: Action, role: Role) -> Result<Transition, TransitionError> {
    let rule = RULES
        .iter()
        .find(|r| r.action == action && r.from.contains(&from))
        .ok_or(TransitionError::Illegal { from, action })?;

    if !rule.actors.contains(&role) {
        return Err(TransitionError::RoleNotPermitted { from, action, role });
    }

    Ok(Transition {
        from,
        action,
        to: rule.to,
        disposition: rule.disposition,
        dispute: rule.dispute,
        deadline: rule.deadline,
        note: rule.note,
    })
}
