//! # gafx-core — Foundational Types for the GAF Escrow Engine
//!
//! Leaf crate of the workspace. Defines the primitives every other crate
//! speaks in: identifiers, the closed set of actor roles, the clock seam
//! used for deadlines, token amounts with the platform fee schedule, and
//! frozen price quotes.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `gafx-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.
//! - Monetary values are integers in minor units. Floats never appear in
//!   amounts, fees, or rates.

pub mod actor;
pub mod error;
pub mod identity;
pub mod money;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use actor::{Actor, Role};
pub use error::ValidationError;
pub use identity::{ActorId, OrderId};
pub use money::{CurrencyCode, FeeSchedule, PriceQuote, RATE_SCALE};
pub use temporal::{Clock, ManualClock, SystemClock};
