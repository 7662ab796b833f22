//! # Escrow Engine
//!
//! Orchestrates every order mutation. Participant requests, admin
//! decisions, and scheduler timeouts all enter through
//! [`EscrowEngine::submit`]; order placement enters through
//! [`EscrowEngine::create_order`].
//!
//! ## Ordering of checks
//!
//! 1. The order exists (`NotFound`).
//! 2. A caller-supplied `expected_version` is current (`VersionConflict`).
//! 3. The caller plays a role on the order (`Forbidden`).
//! 4. The table has a row for the action in the current state
//!    (`InvalidStateTransition`), and the caller's role is one of its
//!    actors (`Forbidden`).
//! 5. The command payload is well formed (`Validation`).
//! 6. Inside the commit gate: version re-check, ledger call, write.
//!
//! Nothing before step 6 talks to the ledger.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};

use gafx_core::{Actor, Clock, CurrencyCode, FeeSchedule, OrderId, Role};
use gafx_state::{
    Action, DeadlineEffect, DisputeEffect, DisputeStatus, Disposition, OrderState, Transition,
};

use crate::arbitration::Arbitration;
use crate::channel::MessageChannel;
use crate::config::{ConfigError, EngineConfig};
use crate::error::EscrowError;
use crate::ledger::{EscrowLedger, LedgerError, LedgerOp};
use crate::message::MessageBody;
use crate::order::{Dispute, Order, OrderDraft, Settlement};
use crate::pricing::PricingOracle;
use crate::store::{OrderStore, PendingMessage};

const MAX_PROOF_LEN: usize = 256;
const MAX_REASON_LEN: usize = 64;

// ── Commands ─────────────────────────────────────────────────────────

/// An action together with its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Command {
    MarkPaid { payment_proof: Option<String> },
    Cancel,
    Timeout,
    ReleaseEscrow,
    RaiseDispute { reason_code: String },
    ResolveBuyer,
    ResolveSeller,
    RequestInfo { note: Option<String> },
}

impl Command {
    pub fn action(&self) -> Action {
        match self {
            Self::MarkPaid { .. } => Action::MarkPaid,
            Self::Cancel => Action::Cancel,
            Self::Timeout => Action::Timeout,
            Self::ReleaseEscrow => Action::ReleaseEscrow,
            Self::RaiseDispute { .. } => Action::RaiseDispute,
            Self::ResolveBuyer => Action::ResolveBuyer,
            Self::ResolveSeller => Action::ResolveSeller,
            Self::RequestInfo { .. } => Action::RequestInfo,
        }
    }

    fn validate(&self, config: &EngineConfig) -> Result<(), EscrowError> {
        match self {
            Self::MarkPaid {
                payment_proof: Some(proof),
            } => {
                if proof.trim().is_empty() || proof.chars().count() > MAX_PROOF_LEN {
                    return Err(EscrowError::Validation(format!(
                        "payment proof must be 1-{MAX_PROOF_LEN} characters"
                    )));
                }
            }
            Self::RaiseDispute { reason_code } => {
                let valid = !reason_code.is_empty()
                    && reason_code.len() <= MAX_REASON_LEN
                    && reason_code
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
                if !valid {
                    return Err(EscrowError::Validation(format!(
                        "reason code must be 1-{MAX_REASON_LEN} characters of [A-Za-z0-9_-]"
                    )));
                }
            }
            Self::RequestInfo { note: Some(note) } => {
                MessageBody::text(note.clone()).validate(config)?;
            }
            _ => {}
        }
        Ok(())
    }
}

// ── Engine ───────────────────────────────────────────────────────────

/// The escrow order lifecycle engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct EscrowEngine {
    store: Arc<OrderStore>,
    ledger: Arc<dyn EscrowLedger>,
    oracle: Arc<dyn PricingOracle>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    token: CurrencyCode,
    fees: FeeSchedule,
}

impl std::fmt::Debug for EscrowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowEngine")
            .field("orders", &self.store.len())
            .field("ledger", &self.ledger.ledger_name())
            .field("token", &self.token)
            .field("fees", &self.fees)
            .finish()
    }
}

impl EscrowEngine {
    pub fn new(
        config: EngineConfig,
        ledger: Arc<dyn EscrowLedger>,
        oracle: Arc<dyn PricingOracle>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            token: config.token_currency()?,
            fees: config.fee_schedule()?,
            store: Arc::new(OrderStore::new()),
            ledger,
            oracle,
            clock,
            config: Arc::new(config),
        })
    }

    pub fn store(&self) -> &OrderStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn oracle(&self) -> &dyn PricingOracle {
        self.oracle.as_ref()
    }

    pub fn fees(&self) -> FeeSchedule {
        self.fees
    }

    pub fn token_currency(&self) -> &CurrencyCode {
        &self.token
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn channel(&self) -> MessageChannel<'_> {
        MessageChannel::new(self)
    }

    pub fn arbitration(&self) -> Arbitration<'_> {
        Arbitration::new(self)
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Fetch an order the viewer is allowed to see.
    pub fn get_order(&self, id: OrderId, viewer: &Actor) -> Result<Order, EscrowError> {
        let order = self.store.get(id)?;
        if order.role_of(viewer).is_none() {
            return Err(EscrowError::forbidden(viewer.id, "not a participant of this order"));
        }
        Ok(order)
    }

    /// Orders visible to `viewer`, newest first. Admins and the system see
    /// every order.
    pub fn orders_for(&self, viewer: &Actor) -> Vec<Order> {
        let mut orders = match viewer.role {
            Role::Admin | Role::System => self.store.scan(usize::MAX, |_| true),
            Role::Buyer | Role::Seller => self
                .store
                .scan(usize::MAX, |o| o.is_participant(viewer.id)),
        };
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    // ── Creation ─────────────────────────────────────────────────────

    /// Place an order: quote the trade, lock the seller's tokens, and
    /// insert the order in `AWAITING_PAYMENT`.
    pub fn create_order(&self, actor: &Actor, draft: OrderDraft) -> Result<Order, EscrowError> {
        if !actor.role.is_participant()
            || (actor.id != draft.buyer_id && actor.id != draft.seller_id)
        {
            return Err(EscrowError::forbidden(
                actor.id,
                "orders can only be placed by one of their counterparties",
            ));
        }
        draft.validate()?;

        let quote = self
            .oracle
            .quote(&self.token, &draft.fiat_currency, draft.amount)?;
        let fee_amount = self.fees.fee_for(draft.amount);
        let now = self.clock.now();
        let deadline = now + self.config.payment_window();

        let order = self.store.create(|id, outbox| {
            let escrow_ref = self.call_ledger(id, LedgerOp::Lock, || {
                self.ledger.lock(id, draft.seller_id, draft.amount)
            })?;
            outbox.push(PendingMessage::system(
                format!(
                    "Order created. {} {} is locked in escrow. Buyer, please pay {} {} and mark the order as paid before the deadline.",
                    draft.amount,
                    self.token,
                    quote.quote_amount,
                    quote.quote
                ),
                now,
            ));
            Ok(Order {
                id,
                buyer_id: draft.buyer_id,
                seller_id: draft.seller_id,
                amount: draft.amount,
                price_quote: quote.clone(),
                payment_method: draft.payment_method.clone(),
                state: OrderState::AwaitingPayment,
                version: 1,
                created_at: now,
                updated_at: now,
                phase_deadline: Some(deadline),
                escrow_ref,
                fee_amount,
                payment_proof: None,
                dispute: None,
                settlement: None,
                archived_at: None,
            })
        })?;

        counter!("escrow_messages_total").increment(1);
        tracing::info!(
            order_id = %order.id,
            buyer = %order.buyer_id,
            seller = %order.seller_id,
            amount = order.amount,
            "order created"
        );
        Ok(order)
    }

    // ── Transitions ──────────────────────────────────────────────────

    /// Apply `command` to the order on behalf of `actor`.
    ///
    /// With `expected_version` the caller asserts the version it acted on;
    /// without it the engine uses the version it just read. The engine
    /// never retries a lost race itself.
    pub fn submit(
        &self,
        id: OrderId,
        actor: &Actor,
        command: Command,
        expected_version: Option<u64>,
    ) -> Result<Order, EscrowError> {
        let order = self.store.get(id)?;
        let action = command.action();

        let version = expected_version.unwrap_or(order.version);
        if version != order.version {
            self.record_conflict(id, action, version, order.version);
            return Err(EscrowError::VersionConflict {
                order_id: id,
                expected: version,
                actual: order.version,
            });
        }

        let role = order
            .role_of(actor)
            .ok_or_else(|| EscrowError::forbidden(actor.id, "not a participant of this order"))?;
        let step = gafx_state::transition(order.state, action, role)
            .map_err(|e| EscrowError::from_transition(e, actor.id))?;

        let now = self.clock.now();
        if action == Action::Timeout && !order.deadline_elapsed(now) {
            return Err(EscrowError::InvalidStateTransition {
                from: order.state,
                action,
                reason: "payment deadline has not elapsed".into(),
            });
        }
        command.validate(&self.config)?;

        let mut appended = 0;
        let result = self.store.commit(id, version, |next, outbox| {
            if let Some(settlement) = self.settle(next, step.disposition, now)? {
                next.settlement = Some(settlement);
            }
            self.apply_effects(next, actor, &command, &step, now)?;

            outbox.push(PendingMessage::system(system_note(&step, &command), now));
            if let Command::RequestInfo { note: Some(note) } = &command {
                outbox.push(PendingMessage {
                    sender_id: actor.id,
                    sender_role: role,
                    body: MessageBody::text(note.clone()),
                    sent_at: now,
                });
            }
            appended = outbox.len();
            Ok(())
        });

        match result {
            Ok(next) => {
                counter!(
                    "escrow_transitions_total",
                    "action" => action.as_str(),
                    "to" => step.to.as_str()
                )
                .increment(1);
                counter!("escrow_messages_total").increment(appended as u64);
                if action == Action::Timeout {
                    counter!("escrow_timeouts_total").increment(1);
                }
                tracing::info!(
                    order_id = %id,
                    action = %action,
                    from = %step.from,
                    to = %step.to,
                    version = next.version,
                    actor = %actor,
                    "order transition committed"
                );
                Ok(next)
            }
            Err(EscrowError::VersionConflict {
                order_id,
                expected,
                actual,
            }) => {
                self.record_conflict(order_id, action, expected, actual);
                Err(EscrowError::VersionConflict {
                    order_id,
                    expected,
                    actual,
                })
            }
            Err(err) => {
                tracing::warn!(order_id = %id, action = %action, error = %err, "order transition rejected");
                Err(err)
            }
        }
    }

    fn record_conflict(&self, id: OrderId, action: Action, expected: u64, actual: u64) {
        counter!("escrow_version_conflicts_total").increment(1);
        tracing::debug!(
            order_id = %id,
            action = %action,
            expected,
            actual,
            "version conflict"
        );
    }

    /// Perform the fund movement a table row requires.
    fn settle(
        &self,
        order: &Order,
        disposition: Disposition,
        now: DateTime<Utc>,
    ) -> Result<Option<Settlement>, EscrowError> {
        let id = order.id;
        let settlement = match disposition {
            Disposition::Hold => return Ok(None),
            Disposition::Refund { to } => {
                let recipient_id = order.party_id(to);
                let receipt = self.call_ledger(id, LedgerOp::Refund, || {
                    self.ledger.refund(id, order.amount, recipient_id)
                })?;
                Settlement {
                    op: LedgerOp::Refund,
                    recipient: to,
                    recipient_id,
                    amount: receipt.amount,
                    fee: receipt.fee,
                    receipt: receipt.reference,
                    settled_at: now,
                }
            }
            Disposition::Release { to } => {
                let recipient_id = order.party_id(to);
                let fee = order.fee_amount.min(order.amount);
                let net = order.amount - fee;
                let receipt = self.call_ledger(id, LedgerOp::Release, || {
                    self.ledger.release(id, net, fee, recipient_id)
                })?;
                Settlement {
                    op: LedgerOp::Release,
                    recipient: to,
                    recipient_id,
                    amount: receipt.amount,
                    fee: receipt.fee,
                    receipt: receipt.reference,
                    settled_at: now,
                }
            }
        };
        Ok(Some(settlement))
    }

    /// Call the ledger, retrying transient failures with exponential
    /// backoff. Every attempt uses the same `(order, op)` key, so a retry
    /// after a lost response is a replay.
    ///
    /// Blocks the calling thread, including while backing off. Async
    /// callers run engine mutations on a blocking pool.
    fn call_ledger<T>(
        &self,
        order_id: OrderId,
        op: LedgerOp,
        call: impl Fn() -> Result<T, LedgerError>,
    ) -> Result<T, EscrowError> {
        let attempts = self.config.ledger_retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => {
                    counter!("escrow_ledger_calls_total", "op" => op.as_str(), "outcome" => "ok")
                        .increment(1);
                    return Ok(value);
                }
                Err(source) if source.is_retryable() && attempt < attempts => {
                    counter!("escrow_ledger_calls_total", "op" => op.as_str(), "outcome" => "retry")
                        .increment(1);
                    let delay = self.config.ledger_retry_delay(attempt);
                    tracing::warn!(
                        order_id = %order_id,
                        op = %op,
                        attempt,
                        ledger = self.ledger.ledger_name(),
                        error = %source,
                        "transient ledger failure, retrying in {delay:?}"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(source) => {
                    counter!("escrow_ledger_calls_total", "op" => op.as_str(), "outcome" => "error")
                        .increment(1);
                    tracing::error!(
                        order_id = %order_id,
                        op = %op,
                        ledger = self.ledger.ledger_name(),
                        error = %source,
                        "ledger call failed"
                    );
                    return Err(EscrowError::LedgerFailure {
                        order_id,
                        op,
                        source,
                    });
                }
            }
        }
    }

    fn apply_effects(
        &self,
        next: &mut Order,
        actor: &Actor,
        command: &Command,
        step: &Transition,
        now: DateTime<Utc>,
    ) -> Result<(), EscrowError> {
        next.state = step.to;
        next.updated_at = now;

        if let Command::MarkPaid { payment_proof } = command {
            next.payment_proof = payment_proof.clone();
        }

        next.phase_deadline = match step.deadline {
            DeadlineEffect::Keep => next.phase_deadline,
            DeadlineEffect::ReleaseWindow => Some(now + self.config.release_window()),
            DeadlineEffect::Clear => None,
        };

        match step.dispute {
            DisputeEffect::None => {}
            DisputeEffect::Open => {
                let reason_code = match command {
                    Command::RaiseDispute { reason_code } => reason_code.clone(),
                    _ => String::new(),
                };
                next.dispute = Some(Dispute {
                    order_id: next.id,
                    initiator_id: actor.id,
                    reason_code,
                    status: DisputeStatus::Open,
                    resolution: None,
                    created_at: now,
                    resolved_at: None,
                    resolved_by: None,
                    info_requests: 0,
                });
            }
            DisputeEffect::Investigate => {
                let dispute = next.dispute.as_mut().ok_or(EscrowError::NotFound {
                    resource: "dispute",
                    order_id: next.id,
                })?;
                dispute.status = DisputeStatus::Investigating;
                dispute.info_requests += 1;
            }
            DisputeEffect::Resolve(resolution) => {
                let dispute = next.dispute.as_mut().ok_or(EscrowError::NotFound {
                    resource: "dispute",
                    order_id: next.id,
                })?;
                dispute.status = DisputeStatus::Resolved;
                dispute.resolution = Some(resolution);
                dispute.resolved_at = Some(now);
                dispute.resolved_by = Some(actor.id);
            }
        }
        Ok(())
    }
}

fn system_note(step: &Transition, command: &Command) -> String {
    match command {
        Command::RaiseDispute { reason_code } => format!("{} Reason: {reason_code}.", step.note),
        _ => step.note.to_string(),
    }
}
