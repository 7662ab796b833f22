//! # Engine Errors
//!
//! Every engine operation is a per-request outcome; none of these is fatal
//! to the process. Variants carry enough context for the API layer to map
//! them onto status codes and for operators to act on logs.

use thiserror::Error;

use gafx_core::{ActorId, OrderId, ValidationError};
use gafx_state::{Action, OrderState, TransitionError};

use crate::ledger::{LedgerError, LedgerOp};
use crate::pricing::PricingError;

/// Errors returned by the escrow engine.
#[derive(Error, Debug)]
pub enum EscrowError {
    /// Unknown order, or an order without the requested sub-record.
    #[error("{resource} for {order_id} not found")]
    NotFound {
        resource: &'static str,
        order_id: OrderId,
    },

    /// The actor may not perform this operation on this order.
    #[error("forbidden for {actor}: {reason}")]
    Forbidden { actor: ActorId, reason: String },

    /// The action is illegal in the order's current state. No external
    /// call was made.
    #[error("invalid state transition: {action} from {from}: {reason}")]
    InvalidStateTransition {
        from: OrderState,
        action: Action,
        reason: String,
    },

    /// Lost an optimistic race. Refetch the order before retrying.
    #[error("version conflict on {order_id}: expected version {expected}, current is {actual}")]
    VersionConflict {
        order_id: OrderId,
        expected: u64,
        actual: u64,
    },

    /// The escrow ledger rejected or failed the fund operation. No state
    /// was committed.
    #[error("ledger {op} failed for {order_id}: {source}")]
    LedgerFailure {
        order_id: OrderId,
        op: LedgerOp,
        #[source]
        source: LedgerError,
    },

    /// The order is terminal and its message log is read-only.
    #[error("message channel for {order_id} is closed (order is {state})")]
    ChannelClosed { order_id: OrderId, state: OrderState },

    /// Malformed draft, message, or action payload.
    #[error("validation error: {0}")]
    Validation(String),

    /// The pricing oracle could not quote the trade.
    #[error("pricing error: {0}")]
    Pricing(#[from] PricingError),
}

impl EscrowError {
    pub(crate) fn order_not_found(order_id: OrderId) -> Self {
        Self::NotFound {
            resource: "order",
            order_id,
        }
    }

    pub(crate) fn forbidden(actor: ActorId, reason: impl Into<String>) -> Self {
        Self::Forbidden {
            actor,
            reason: reason.into(),
        }
    }

    /// Whether the same request may succeed if retried (after a refetch,
    /// for version conflicts).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::VersionConflict { .. } => true,
            Self::LedgerFailure { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Map a transition-table rejection, attributing it to `actor`.
    pub(crate) fn from_transition(err: TransitionError, actor: ActorId) -> Self {
        match err {
            TransitionError::Illegal { from, action } => Self::InvalidStateTransition {
                from,
                action,
                reason: format!("no transition for {action} from {from}"),
            },
            TransitionError::RoleNotPermitted { .. } => Self::Forbidden {
                actor,
                reason: err.to_string(),
            },
        }
    }
}

impl From<ValidationError> for EscrowError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gafx_core::Role;

    #[test]
    fn version_conflict_display() {
        let id = OrderId::new();
        let err = EscrowError::VersionConflict {
            order_id: id,
            expected: 3,
            actual: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected version 3"));
        assert!(msg.contains("current is 4"));
        assert!(msg.contains(&id.to_string()));
        assert!(err.is_retryable());
    }

    #[test]
    fn invalid_transition_display() {
        let err = EscrowError::InvalidStateTransition {
            from: OrderState::Expired,
            action: Action::MarkPaid,
            reason: "order is terminal".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid state transition: mark-paid from EXPIRED: order is terminal"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn illegal_transition_maps_to_invalid_state() {
        let err = EscrowError::from_transition(
            TransitionError::Illegal {
                from: OrderState::Cancelled,
                action: Action::RaiseDispute,
            },
            ActorId::new(),
        );
        assert!(matches!(
            err,
            EscrowError::InvalidStateTransition {
                from: OrderState::Cancelled,
                action: Action::RaiseDispute,
                ..
            }
        ));
    }

    #[test]
    fn role_rejection_maps_to_forbidden() {
        let actor = ActorId::new();
        let err = EscrowError::from_transition(
            TransitionError::RoleNotPermitted {
                from: OrderState::PaymentClaimed,
                action: Action::ReleaseEscrow,
                role: Role::Buyer,
            },
            actor,
        );
        match err {
            EscrowError::Forbidden { actor: a, reason } => {
                assert_eq!(a, actor);
                assert!(reason.contains("buyer"));
            }
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[test]
    fn ledger_failure_retryability_follows_source() {
        let transient = EscrowError::LedgerFailure {
            order_id: OrderId::new(),
            op: LedgerOp::Release,
            source: LedgerError::Unavailable("timeout".into()),
        };
        assert!(transient.is_retryable());

        let permanent = EscrowError::LedgerFailure {
            order_id: OrderId::new(),
            op: LedgerOp::Lock,
            source: LedgerError::InsufficientFunds {
                account: ActorId::new(),
                required: 10,
                available: 1,
            },
        };
        assert!(!permanent.is_retryable());
        assert!(permanent.to_string().contains("insufficient funds"));
    }

    #[test]
    fn channel_closed_display() {
        let err = EscrowError::ChannelClosed {
            order_id: OrderId::new(),
            state: OrderState::EscrowReleased,
        };
        assert!(err.to_string().contains("ESCROW_RELEASED"));
    }

    #[test]
    fn validation_error_converts() {
        let err: EscrowError = ValidationError::NonPositiveAmount.into();
        assert!(matches!(err, EscrowError::Validation(ref m) if m.contains("positive")));
    }
}
