//! # gafx-state — Order Lifecycle State Machine
//!
//! The pure half of the escrow engine. Given a current state, an action,
//! and the role the caller plays on the order, [`transition`] answers
//! whether the move is legal and what it must do: the target state, the
//! fund disposition the ledger has to perform, the dispute effect, and how
//! the phase deadline changes. No I/O, no clock, no storage.
//!
//! ## Lifecycle
//!
//! ```text
//!                  mark-paid                release-escrow
//! AWAITING_PAYMENT ─────────▶ PAYMENT_CLAIMED ─────────────▶ ESCROW_RELEASED
//!   │  │   │                        │
//!   │  │   └── raise-dispute ──┐    └── raise-dispute ──┐
//!   │  │                       ▼                        ▼
//!   │  │                    DISPUTED ◀──── request-info (self-loop)
//!   │  │                       │
//!   │  │          resolve-buyer│resolve-seller
//!   │  │                       ▼
//!   │  │          RESOLVED_BUYER | RESOLVED_SELLER
//!   │  └── cancel ──▶ CANCELLED
//!   └───── timeout ─▶ EXPIRED
//! ```
//!
//! The orchestrator in `gafx-escrow` is the only caller that turns a
//! [`Transition`] into side effects.

pub mod dispute;
pub mod order;
pub mod transition;

pub use dispute::{DisputeStatus, Resolution};
pub use order::OrderState;
pub use transition::{
    rules, transition, Action, DeadlineEffect, DisputeEffect, Disposition, Party, Rule,
    Transition, TransitionError,
};
