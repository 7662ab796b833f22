//! # Escrow Ledger Port
//!
//! The engine never moves tokens itself. It asks an [`EscrowLedger`] to
//! lock the seller's tokens at order creation and to release or refund
//! them when the order settles.
//!
//! ## Idempotency
//!
//! Every call is keyed by `(order_id, operation)`. Repeating a call with
//! the same key returns the original result without moving funds again,
//! which is what makes it safe for the engine to retry after a transient
//! failure. An escrow settles at most once: after a release, a refund for
//! the same order is rejected and vice versa.
//!
//! [`InMemoryLedger`] implements the contract for development and tests
//! and keeps a journal of real fund movements (replays are not journaled).

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use gafx_core::{ActorId, OrderId};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Kind of ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerOp {
    Lock,
    Release,
    Refund,
}

impl LedgerOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Release => "release",
            Self::Refund => "refund",
        }
    }
}

impl std::fmt::Display for LedgerOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle to locked funds, returned by [`EscrowLedger::lock`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EscrowRef(String);

impl EscrowRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EscrowRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof of a settled fund movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub reference: String,
    pub op: LedgerOp,
    pub order_id: OrderId,
    pub recipient: ActorId,
    /// Amount credited to the recipient.
    pub amount: u64,
    /// Amount credited to the platform.
    pub fee: u64,
}

/// The idempotency key a ledger implementation must honour.
pub fn idempotency_key(order_id: OrderId, op: LedgerOp) -> String {
    format!("{}:{}", order_id.as_uuid(), op)
}

/// Ledger failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("insufficient funds in {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: ActorId,
        required: u64,
        available: u64,
    },

    #[error("no escrow is locked for {order_id}")]
    UnknownEscrow { order_id: OrderId },

    #[error("escrow for {order_id} was already settled by {by}")]
    AlreadySettled { order_id: OrderId, by: LedgerOp },

    #[error("amount mismatch for {order_id}: locked {locked}, requested {requested}")]
    AmountMismatch {
        order_id: OrderId,
        locked: u64,
        requested: u64,
    },

    /// Transport or backend outage. Safe to retry with the same key.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Custodial ledger capability consumed by the engine.
///
/// Implementations must be `Send + Sync`: the engine shares one instance
/// across request handlers and the scheduler behind an `Arc`.
pub trait EscrowLedger: Send + Sync {
    /// Lock `amount` from `owner` into escrow for `order_id`.
    fn lock(&self, order_id: OrderId, owner: ActorId, amount: u64) -> Result<EscrowRef, LedgerError>;

    /// Pay `amount` to `recipient` and `fee` to the platform. `amount + fee`
    /// must equal the locked amount.
    fn release(
        &self,
        order_id: OrderId,
        amount: u64,
        fee: u64,
        recipient: ActorId,
    ) -> Result<Receipt, LedgerError>;

    /// Return the full locked `amount` to `recipient`.
    fn refund(&self, order_id: OrderId, amount: u64, recipient: ActorId) -> Result<Receipt, LedgerError>;

    /// Human-readable implementation name for logs.
    fn ledger_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// In-memory ledger
// ---------------------------------------------------------------------------

/// A real fund movement recorded by [`InMemoryLedger`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub op: LedgerOp,
    pub order_id: OrderId,
    /// Debited account for locks, credited account otherwise.
    pub account: ActorId,
    pub amount: u64,
    pub fee: u64,
}

/// Per-order movement totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EscrowTotals {
    pub locked: u64,
    pub released: u64,
    pub refunded: u64,
    pub fee: u64,
}

impl EscrowTotals {
    /// Whether every locked unit has been paid out exactly once.
    pub fn is_conserved(&self) -> bool {
        self.locked == self.released + self.refunded + self.fee
    }
}

#[derive(Debug)]
struct EscrowAccount {
    amount: u64,
    reference: EscrowRef,
    settled: Option<LedgerOp>,
}

#[derive(Debug, Default)]
struct Book {
    balances: HashMap<ActorId, u64>,
    escrows: HashMap<OrderId, EscrowAccount>,
    receipts: HashMap<(OrderId, LedgerOp), Receipt>,
    platform_fees: u64,
    journal: Vec<JournalEntry>,
    faults: VecDeque<LedgerError>,
    calls: u64,
}

/// In-process ledger with idempotent operations and fault injection.
///
/// In metered mode, locks debit the owner's balance and fail with
/// `InsufficientFunds` when it is short. Unmetered mode treats every
/// account as funded, which is what a development server wants.
#[derive(Debug)]
pub struct InMemoryLedger {
    book: Mutex<Book>,
    metered: bool,
}

impl InMemoryLedger {
    /// A ledger that enforces account balances.
    pub fn new() -> Self {
        Self {
            book: Mutex::new(Book::default()),
            metered: true,
        }
    }

    /// A ledger that treats every account as funded.
    pub fn unmetered() -> Self {
        Self {
            book: Mutex::new(Book::default()),
            metered: false,
        }
    }

    /// Credit `amount` to `account`.
    pub fn credit(&self, account: ActorId, amount: u64) {
        let mut book = self.book.lock();
        *book.balances.entry(account).or_default() += amount;
    }

    pub fn balance(&self, account: ActorId) -> u64 {
        self.book.lock().balances.get(&account).copied().unwrap_or(0)
    }

    pub fn platform_fees(&self) -> u64 {
        self.book.lock().platform_fees
    }

    /// Fail the next call with `err`. Queued faults are consumed in order.
    pub fn inject_failure(&self, err: LedgerError) {
        self.book.lock().faults.push_back(err);
    }

    /// Number of calls received, including replays and failures.
    pub fn call_count(&self) -> u64 {
        self.book.lock().calls
    }

    /// All real fund movements, oldest first.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.book.lock().journal.clone()
    }

    /// Movements of `op` recorded for `order_id`.
    pub fn movements(&self, order_id: OrderId, op: LedgerOp) -> Vec<JournalEntry> {
        self.book
            .lock()
            .journal
            .iter()
            .filter(|e| e.order_id == order_id && e.op == op)
            .cloned()
            .collect()
    }

    pub fn totals(&self, order_id: OrderId) -> EscrowTotals {
        let book = self.book.lock();
        let mut totals = EscrowTotals::default();
        for entry in book.journal.iter().filter(|e| e.order_id == order_id) {
            match entry.op {
                LedgerOp::Lock => totals.locked += entry.amount,
                LedgerOp::Release => {
                    totals.released += entry.amount;
                    totals.fee += entry.fee;
                }
                LedgerOp::Refund => totals.refunded += entry.amount,
            }
        }
        totals
    }

    fn begin(book: &mut Book) -> Result<(), LedgerError> {
        book.calls += 1;
        match book.faults.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn settle(
        &self,
        op: LedgerOp,
        order_id: OrderId,
        amount: u64,
        fee: u64,
        recipient: ActorId,
    ) -> Result<Receipt, LedgerError> {
        let mut book = self.book.lock();
        Self::begin(&mut book)?;

        if let Some(receipt) = book.receipts.get(&(order_id, op)) {
            return Ok(receipt.clone());
        }

        let escrow = book
            .escrows
            .get_mut(&order_id)
            .ok_or(LedgerError::UnknownEscrow { order_id })?;
        if let Some(by) = escrow.settled {
            return Err(LedgerError::AlreadySettled { order_id, by });
        }
        if amount + fee != escrow.amount {
            return Err(LedgerError::AmountMismatch {
                order_id,
                locked: escrow.amount,
                requested: amount + fee,
            });
        }
        escrow.settled = Some(op);

        *book.balances.entry(recipient).or_default() += amount;
        book.platform_fees += fee;

        let receipt = Receipt {
            reference: format!("RCPT-{}", Uuid::new_v4()),
            op,
            order_id,
            recipient,
            amount,
            fee,
        };
        book.receipts.insert((order_id, op), receipt.clone());
        book.journal.push(JournalEntry {
            op,
            order_id,
            account: recipient,
            amount,
            fee,
        });
        Ok(receipt)
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl EscrowLedger for InMemoryLedger {
    fn lock(&self, order_id: OrderId, owner: ActorId, amount: u64) -> Result<EscrowRef, LedgerError> {
        let mut book = self.book.lock();
        Self::begin(&mut book)?;

        if let Some(existing) = book.escrows.get(&order_id) {
            if existing.amount != amount {
                return Err(LedgerError::AmountMismatch {
                    order_id,
                    locked: existing.amount,
                    requested: amount,
                });
            }
            return Ok(existing.reference.clone());
        }

        if self.metered {
            let available = book.balances.get(&owner).copied().unwrap_or(0);
            if available < amount {
                return Err(LedgerError::InsufficientFunds {
                    account: owner,
                    required: amount,
                    available,
                });
            }
            book.balances.insert(owner, available - amount);
        }

        let reference = EscrowRef::new(format!("ESC-{}", order_id.as_uuid()));
        book.escrows.insert(
            order_id,
            EscrowAccount {
                amount,
                reference: reference.clone(),
                settled: None,
            },
        );
        book.journal.push(JournalEntry {
            op: LedgerOp::Lock,
            order_id,
            account: owner,
            amount,
            fee: 0,
        });
        Ok(reference)
    }

    fn release(
        &self,
        order_id: OrderId,
        amount: u64,
        fee: u64,
        recipient: ActorId,
    ) -> Result<Receipt, LedgerError> {
        self.settle(LedgerOp::Release, order_id, amount, fee, recipient)
    }

    fn refund(&self, order_id: OrderId, amount: u64, recipient: ActorId) -> Result<Receipt, LedgerError> {
        self.settle(LedgerOp::Refund, order_id, amount, 0, recipient)
    }

    fn ledger_name(&self) -> &str {
        if self.metered {
            "InMemoryLedger"
        } else {
            "InMemoryLedger(unmetered)"
        }
    }
}
