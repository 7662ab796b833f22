//! # gafx-escrow — Escrow Order Lifecycle Engine
//!
//! Custodies a GAF token trade from order placement to final fund
//! disposition. Every mutation of an order flows through one entry point,
//! [`EscrowEngine::submit`], which:
//!
//! 1. fetches the order at its current version,
//! 2. resolves the action against the `gafx-state` transition table and
//!    the caller's role on the order,
//! 3. performs the ledger disposition the table row requires,
//! 4. commits with an optimistic version check.
//!
//! Steps 3 and 4 run inside the order's commit section after the version
//! check, so a stale writer never reaches the ledger and a ledger failure
//! never leaves a partial commit. Ledger calls are additionally idempotent
//! per `(order, operation)`.
//!
//! ## Modules
//!
//! | Module | Concern |
//! |---|---|
//! | [`store`] | versioned per-order records and message logs |
//! | [`engine`] | transition orchestration |
//! | [`ledger`] | escrow ledger port and in-memory ledger |
//! | [`pricing`] | pricing oracle port and static-rate oracle |
//! | [`channel`] | per-order chat gated by order state |
//! | [`arbitration`] | dispute facade and admin queue |
//! | [`scheduler`] | payment-deadline sweeps |
//! | [`retention`] | archival of settled orders |
//! | [`config`] | engine configuration |
//!
//! ## Crate Policy
//!
//! - No `.unwrap()`/`.expect()` outside tests.
//! - No lock is held across an `.await`.
//! - Different orders never contend on a shared lock.

pub mod arbitration;
pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod message;
pub mod order;
pub mod pricing;
pub mod retention;
pub mod scheduler;
pub mod store;

pub use arbitration::{Arbitration, DisputeCounts, DisputeQueue, DisputeSummary};
pub use channel::{MessageChannel, MessageCursor};
pub use config::{AttachmentPolicy, ConfigError, EngineConfig};
pub use engine::{Command, EscrowEngine};
pub use error::EscrowError;
pub use ledger::{EscrowLedger, EscrowRef, InMemoryLedger, LedgerError, LedgerOp, Receipt};
pub use message::{AttachmentKind, Message, MessageBody};
pub use order::{Dispute, Order, OrderDraft, OrderLimits, Settlement};
pub use pricing::{PricingError, PricingOracle, StaticRateOracle};
pub use retention::RetentionReport;
pub use scheduler::{DeadlineScheduler, SchedulerHandle, SweepReport};
pub use store::{OrderStore, Outbox, PendingMessage};
