//! # Dispute Arbitration
//!
//! Admin-facing facade over the dispute rows of the transition table.
//! Every decision goes through [`EscrowEngine::submit`] so that the fund
//! disposition and the dispute status commit together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gafx_core::{Actor, ActorId, OrderId, Role};
use gafx_state::{DisputeStatus, OrderState, Resolution};

use crate::engine::{Command, EscrowEngine};
use crate::error::EscrowError;
use crate::order::{Dispute, Order};

/// One row of the admin dispute queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeSummary {
    pub order_id: OrderId,
    pub order_state: OrderState,
    pub buyer_id: ActorId,
    pub seller_id: ActorId,
    pub amount: u64,
    pub initiator_id: ActorId,
    pub reason_code: String,
    pub status: DisputeStatus,
    pub resolution: Option<Resolution>,
    pub created_at: DateTime<Utc>,
    pub info_requests: u32,
}

impl DisputeSummary {
    fn from_order(order: &Order, dispute: &Dispute) -> Self {
        Self {
            order_id: order.id,
            order_state: order.state,
            buyer_id: order.buyer_id,
            seller_id: order.seller_id,
            amount: order.amount,
            initiator_id: dispute.initiator_id,
            reason_code: dispute.reason_code.clone(),
            status: dispute.status,
            resolution: dispute.resolution,
            created_at: dispute.created_at,
            info_requests: dispute.info_requests,
        }
    }
}

/// Dispute totals by status, regardless of any filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeCounts {
    pub open: usize,
    pub investigating: usize,
    pub resolved: usize,
}

impl DisputeCounts {
    /// Disputes still waiting for a decision.
    pub fn pending(&self) -> usize {
        self.open + self.investigating
    }

    fn record(&mut self, status: DisputeStatus) {
        match status {
            DisputeStatus::Open => self.open += 1,
            DisputeStatus::Investigating => self.investigating += 1,
            DisputeStatus::Resolved => self.resolved += 1,
        }
    }
}

/// Result of [`Arbitration::list_disputes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeQueue {
    /// Oldest dispute first.
    pub items: Vec<DisputeSummary>,
    pub counts: DisputeCounts,
}

/// Dispute operations on top of an [`EscrowEngine`].
#[derive(Debug, Clone, Copy)]
pub struct Arbitration<'a> {
    engine: &'a EscrowEngine,
}

impl<'a> Arbitration<'a> {
    pub(crate) fn new(engine: &'a EscrowEngine) -> Self {
        Self { engine }
    }

    pub fn raise_dispute(
        &self,
        order_id: OrderId,
        actor: &Actor,
        reason_code: impl Into<String>,
        expected_version: Option<u64>,
    ) -> Result<Order, EscrowError> {
        if !actor.role.is_participant() {
            return Err(EscrowError::forbidden(
                actor.id,
                "only the buyer or seller can raise a dispute",
            ));
        }
        self.engine.submit(
            order_id,
            actor,
            Command::RaiseDispute {
                reason_code: reason_code.into(),
            },
            expected_version,
        )
    }

    /// Release the escrow to the buyer and close the dispute.
    pub fn resolve_buyer(
        &self,
        order_id: OrderId,
        admin: &Actor,
        expected_version: Option<u64>,
    ) -> Result<Order, EscrowError> {
        require_admin(admin)?;
        self.engine
            .submit(order_id, admin, Command::ResolveBuyer, expected_version)
    }

    /// Refund the escrow to the seller and close the dispute.
    pub fn resolve_seller(
        &self,
        order_id: OrderId,
        admin: &Actor,
        expected_version: Option<u64>,
    ) -> Result<Order, EscrowError> {
        require_admin(admin)?;
        self.engine
            .submit(order_id, admin, Command::ResolveSeller, expected_version)
    }

    /// Ask the parties for more evidence. Moves the dispute to
    /// `INVESTIGATING`; the order stays `DISPUTED`.
    pub fn request_info(
        &self,
        order_id: OrderId,
        admin: &Actor,
        note: Option<String>,
        expected_version: Option<u64>,
    ) -> Result<Order, EscrowError> {
        require_admin(admin)?;
        self.engine
            .submit(order_id, admin, Command::RequestInfo { note }, expected_version)
    }

    pub fn get_dispute(&self, order_id: OrderId, viewer: &Actor) -> Result<Dispute, EscrowError> {
        let order = self.engine.get_order(order_id, viewer)?;
        order.dispute.ok_or(EscrowError::NotFound {
            resource: "dispute",
            order_id,
        })
    }

    /// The admin dispute queue, optionally filtered by status.
    pub fn list_disputes(&self, admin: &Actor, status: Option<DisputeStatus>) -> Result<DisputeQueue, EscrowError> {
        require_admin(admin)?;
        let orders = self
            .engine
            .store()
            .scan(usize::MAX, |o| o.dispute.is_some());

        let mut counts = DisputeCounts::default();
        let mut items = Vec::new();
        for order in &orders {
            let Some(dispute) = &order.dispute else {
                continue;
            };
            counts.record(dispute.status);
            if status.map_or(true, |s| s == dispute.status) {
                items.push(DisputeSummary::from_order(order, dispute));
            }
        }
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(DisputeQueue { items, counts })
    }
}

fn require_admin(actor: &Actor) -> Result<(), EscrowError> {
    if actor.role == Role::Admin {
        Ok(())
    } else {
        Err(EscrowError::forbidden(actor.id, "admin role required"))
    }
}
