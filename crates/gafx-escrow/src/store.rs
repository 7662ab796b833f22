//! # Order Store
//!
//! Keyed, versioned storage of [`Order`] records and their message logs.
//!
//! Each order lives in its own slot. A slot holds the current snapshot,
//! the message log, and a commit gate. Writers to the same order take the
//! gate only around the version check, the mutation, and the write;
//! readers take the snapshot lock for an `Arc` clone and never wait on
//! the gate. Different orders share nothing but the `DashMap` shard
//! lookup, which is never held while a slot lock is taken.
//!
//! Archived orders stay in the store forever. Sweeps walk only the live
//! index, so their cost tracks the orders that can still change.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};

use gafx_core::{ActorId, OrderId, Role};

use crate::error::EscrowError;
use crate::message::{Message, MessageBody};
use crate::order::Order;

/// A message staged by a mutation. Sequence numbers are assigned when the
/// commit lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub sender_id: ActorId,
    pub sender_role: Role,
    pub body: MessageBody,
    pub sent_at: DateTime<Utc>,
}

impl PendingMessage {
    pub fn system(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            sender_id: ActorId::SYSTEM,
            sender_role: Role::System,
            body: MessageBody::text(text),
            sent_at: at,
        }
    }
}

/// Messages staged by a mutation, written only if the commit succeeds.
#[derive(Debug, Default)]
pub struct Outbox {
    staged: Vec<PendingMessage>,
}

impl Outbox {
    pub fn push(&mut self, message: PendingMessage) {
        self.staged.push(message);
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }
}

#[derive(Debug, Default)]
struct Log {
    last_seq: u64,
    entries: Vec<Message>,
}

impl Log {
    fn append(&mut self, order_id: OrderId, pending: PendingMessage) -> Message {
        self.last_seq += 1;
        let message = Message {
            seq: self.last_seq,
            order_id,
            sender_id: pending.sender_id,
            sender_role: pending.sender_role,
            body: pending.body,
            sent_at: pending.sent_at,
        };
        self.entries.push(message.clone());
        message
    }
}

#[derive(Debug)]
struct Slot {
    snapshot: RwLock<Arc<Order>>,
    log: RwLock<Log>,
    gate: Mutex<()>,
}

impl Slot {
    fn new(order: Order, log: Log) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(order)),
            log: RwLock::new(log),
            gate: Mutex::new(()),
        }
    }

    fn current(&self) -> Arc<Order> {
        Arc::clone(&self.snapshot.read())
    }
}

/// In-memory order store.
#[derive(Debug, Default)]
pub struct OrderStore {
    orders: DashMap<OrderId, Arc<Slot>>,
    /// Ids of orders not yet archived.
    live: DashSet<OrderId>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: OrderId) -> Result<Arc<Slot>, EscrowError> {
        self.orders
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EscrowError::order_not_found(id))
    }

    pub fn get(&self, id: OrderId) -> Result<Order, EscrowError> {
        Ok(self.slot(id)?.current().as_ref().clone())
    }

    pub fn contains(&self, id: OrderId) -> bool {
        self.orders.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Insert a new order. `build` receives the freshly allocated id and
    /// must perform the escrow lock; if it fails nothing is inserted.
    pub fn create<F>(&self, build: F) -> Result<Order, EscrowError>
    where
        F: FnOnce(OrderId, &mut Outbox) -> Result<Order, EscrowError>,
    {
        let id = OrderId::new();
        let mut outbox = Outbox::default();
        let order = build(id, &mut outbox)?;
        if order.id != id || order.version != 1 {
            return Err(EscrowError::Validation(format!(
                "new order must carry id {id} at version 1"
            )));
        }

        let mut log = Log::default();
        for pending in outbox.staged {
            log.append(id, pending);
        }

        match self.orders.entry(id) {
            Entry::Occupied(_) => Err(EscrowError::Validation(format!("{id} already exists"))),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(Slot::new(order.clone(), log)));
                self.live.insert(id);
                Ok(order)
            }
        }
    }

    /// Apply `mutation` to a copy of the order if its version is still
    /// `expected_version`, then publish the copy at `expected_version + 1`
    /// together with any staged messages.
    ///
    /// The mutation runs while the order's gate is held, after the version
    /// check. A failed mutation writes nothing.
    pub fn commit<F>(&self, id: OrderId, expected_version: u64, mutation: F) -> Result<Order, EscrowError>
    where
        F: FnOnce(&mut Order, &mut Outbox) -> Result<(), EscrowError>,
    {
        let slot = self.slot(id)?;
        let _gate = slot.gate.lock();

        let current = slot.current();
        if current.version != expected_version {
            return Err(EscrowError::VersionConflict {
                order_id: id,
                expected: expected_version,
                actual: current.version,
            });
        }

        let mut next = current.as_ref().clone();
        let mut outbox = Outbox::default();
        mutation(&mut next, &mut outbox)?;
        next.id = id;
        next.version = expected_version + 1;

        {
            let mut log = slot.log.write();
            for pending in outbox.staged {
                log.append(id, pending);
            }
        }
        *slot.snapshot.write() = Arc::new(next.clone());
        Ok(next)
    }

    /// Append one message without changing the order's version.
    ///
    /// `admit` runs under the order's gate against the current snapshot,
    /// so a message can never land after a commit that closed the channel.
    pub fn append_message<F>(&self, id: OrderId, admit: F) -> Result<Message, EscrowError>
    where
        F: FnOnce(&Order) -> Result<PendingMessage, EscrowError>,
    {
        let slot = self.slot(id)?;
        let _gate = slot.gate.lock();
        let current = slot.current();
        let pending = admit(&current)?;
        let message = slot.log.write().append(id, pending);
        Ok(message)
    }

    /// Up to `limit` messages with `seq > after`, in order.
    pub fn messages_after(&self, id: OrderId, after: u64, limit: usize) -> Result<Vec<Message>, EscrowError> {
        let slot = self.slot(id)?;
        let log = slot.log.read();
        let start = log.entries.partition_point(|m| m.seq <= after);
        Ok(log.entries[start..].iter().take(limit).cloned().collect())
    }

    /// Highest sequence number ever assigned for the order.
    pub fn last_seq(&self, id: OrderId) -> Result<u64, EscrowError> {
        Ok(self.slot(id)?.log.read().last_seq)
    }

    /// Snapshots of every order matching `filter`, at most `limit`.
    pub fn scan<F>(&self, limit: usize, filter: F) -> Vec<Order>
    where
        F: Fn(&Order) -> bool,
    {
        let slots: Vec<Arc<Slot>> = self
            .orders
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        select(&slots, limit, filter)
    }

    /// Like [`scan`](Self::scan), but only over orders not yet archived.
    pub fn scan_live<F>(&self, limit: usize, filter: F) -> Vec<Order>
    where
        F: Fn(&Order) -> bool,
    {
        let ids: Vec<OrderId> = self.live.iter().map(|id| *id).collect();
        let slots: Vec<Arc<Slot>> = ids.into_iter().filter_map(|id| self.slot(id).ok()).collect();
        select(&slots, limit, filter)
    }

    /// Number of orders not yet archived.
    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    /// Mark a terminal order archived and drop its message contents.
    ///
    /// Archival is bookkeeping, not a transition: the version is kept.
    /// Returns `None` if the order was already archived.
    pub fn archive(&self, id: OrderId, at: DateTime<Utc>) -> Result<Option<Order>, EscrowError> {
        let slot = self.slot(id)?;
        let _gate = slot.gate.lock();
        let current = slot.current();
        if current.is_archived() {
            return Ok(None);
        }
        if !current.state.is_terminal() {
            return Err(EscrowError::Validation(format!(
                "{id} is {} and cannot be archived",
                current.state
            )));
        }
        let mut next = current.as_ref().clone();
        next.archived_at = Some(at);
        slot.log.write().entries.clear();
        *slot.snapshot.write() = Arc::new(next.clone());
        self.live.remove(&id);
        Ok(Some(next))
    }

    /// Load a persisted order and its messages, keeping whichever copy has
    /// the higher version.
    ///
    /// The messages of an order that is not archived must be numbered
    /// 1, 2, 3, ... with no gaps; otherwise nothing is loaded. An archived
    /// order keeps no message contents.
    pub fn hydrate(&self, order: Order, mut messages: Vec<Message>) -> Result<(), EscrowError> {
        let id = order.id;
        messages.sort_by_key(|m| m.seq);
        let last_seq = messages.last().map_or(0, |m| m.seq);
        if order.is_archived() {
            messages.clear();
        } else if let Some((expected, found)) = messages
            .iter()
            .zip(1u64..)
            .find(|(m, expected)| m.seq != *expected || m.order_id != id)
            .map(|(m, expected)| (expected, m.seq))
        {
            return Err(EscrowError::Validation(format!(
                "message log of {id} is not contiguous: expected seq {expected}, found {found}"
            )));
        }
        let log = Log {
            last_seq,
            entries: messages,
        };
        let archived = order.is_archived();

        match self.orders.entry(id) {
            Entry::Occupied(occupied) => {
                let slot = Arc::clone(occupied.get());
                drop(occupied);
                let _gate = slot.gate.lock();
                if slot.current().version < order.version {
                    *slot.log.write() = log;
                    *slot.snapshot.write() = Arc::new(order);
                    if archived {
                        self.live.remove(&id);
                    } else {
                        self.live.insert(id);
                    }
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(Slot::new(order, log)));
                if !archived {
                    self.live.insert(id);
                }
            }
        }
        Ok(())
    }
}

fn select<F>(slots: &[Arc<Slot>], limit: usize, filter: F) -> Vec<Order>
where
    F: Fn(&Order) -> bool,
{
    slots
        .iter()
        .map(|slot| slot.current())
        .filter(|order| filter(order))
        .take(limit)
        .map(|order| order.as_ref().clone())
        .collect()
}
