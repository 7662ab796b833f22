//! # Message Channel
//!
//! Per-order chat between buyer and seller, joined by an admin while the
//! order is under dispute. Sends are admitted under the same per-order
//! gate as transitions, which gives gap-free sequence numbers and means a
//! send can never land after the commit that closed the channel.

use std::collections::VecDeque;

use metrics::counter;

use gafx_core::{Actor, OrderId, Role};

use crate::engine::EscrowEngine;
use crate::error::EscrowError;
use crate::message::{Message, MessageBody};
use crate::order::Order;
use crate::store::{OrderStore, PendingMessage};

/// Message operations on top of an [`EscrowEngine`].
#[derive(Debug, Clone, Copy)]
pub struct MessageChannel<'a> {
    engine: &'a EscrowEngine,
}

impl<'a> MessageChannel<'a> {
    pub(crate) fn new(engine: &'a EscrowEngine) -> Self {
        Self { engine }
    }

    /// Append a participant message.
    pub fn send(&self, order_id: OrderId, sender: &Actor, body: MessageBody) -> Result<Message, EscrowError> {
        let config = self.engine.config();
        let now = self.engine.now();
        let message = self.engine.store().append_message(order_id, |order| {
            let role = poster_role(order, sender)?;
            if order.state.is_terminal() {
                return Err(EscrowError::ChannelClosed {
                    order_id,
                    state: order.state,
                });
            }
            body.validate(config)?;
            Ok(PendingMessage {
                sender_id: sender.id,
                sender_role: role,
                body,
                sent_at: now,
            })
        })?;

        counter!("escrow_messages_total").increment(1);
        tracing::debug!(order_id = %order_id, seq = message.seq, sender = %sender, "message appended");
        Ok(message)
    }

    /// Messages after `after_seq`, oldest first.
    ///
    /// The cursor stops at the last message that existed when it was
    /// created. Resume from [`MessageCursor::position`] to pick up newer
    /// messages.
    pub fn list(&self, order_id: OrderId, viewer: &Actor, after_seq: u64) -> Result<MessageCursor<'a>, EscrowError> {
        let store = self.engine.store();
        let order = store.get(order_id)?;
        check_visible(&order, viewer)?;
        Ok(MessageCursor {
            store,
            order_id,
            position: after_seq,
            upper: store.last_seq(order_id)?,
            page_size: self.engine.config().message_page_size.max(1),
            page: VecDeque::new(),
            exhausted: false,
        })
    }
}

fn poster_role(order: &Order, sender: &Actor) -> Result<Role, EscrowError> {
    match order.role_of(sender) {
        None => Err(EscrowError::forbidden(sender.id, "not a participant of this order")),
        Some(Role::System) => Err(EscrowError::forbidden(
            sender.id,
            "system messages are only written by transitions",
        )),
        Some(Role::Admin) if !order.state.has_dispute() => Err(EscrowError::forbidden(
            sender.id,
            "admins may only post on disputed orders",
        )),
        Some(role) => Ok(role),
    }
}

fn check_visible(order: &Order, viewer: &Actor) -> Result<(), EscrowError> {
    match order.role_of(viewer) {
        None => Err(EscrowError::forbidden(viewer.id, "not a participant of this order")),
        Some(Role::Admin) if !order.state.has_dispute() => Err(EscrowError::forbidden(
            viewer.id,
            "admins may only read disputed orders",
        )),
        Some(_) => Ok(()),
    }
}

/// Lazy, finite iterator over an order's messages, fetched a page at a
/// time.
#[derive(Debug)]
pub struct MessageCursor<'a> {
    store: &'a OrderStore,
    order_id: OrderId,
    position: u64,
    upper: u64,
    page_size: usize,
    page: VecDeque<Message>,
    exhausted: bool,
}

impl MessageCursor<'_> {
    /// Sequence number of the last message yielded (or the starting
    /// point if none has been).
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Last sequence number this cursor will yield.
    pub fn upper_bound(&self) -> u64 {
        self.upper
    }

    /// Whether another message is still waiting to be yielded.
    ///
    /// Looks at what the store actually holds, so an archived log or a
    /// log with missing rows reports `false` once nothing is left, even
    /// while [`position`](Self::position) is below the upper bound.
    pub fn has_more(&mut self) -> bool {
        if self.page.is_empty() {
            self.fill();
        }
        !self.page.is_empty()
    }

    fn fill(&mut self) {
        if self.exhausted || self.position >= self.upper {
            self.exhausted = true;
            return;
        }
        match self
            .store
            .messages_after(self.order_id, self.position, self.page_size)
        {
            Ok(batch) => {
                self.page
                    .extend(batch.into_iter().take_while(|m| m.seq <= self.upper));
                if self.page.is_empty() {
                    self.exhausted = true;
                }
            }
            Err(_) => self.exhausted = true,
        }
    }
}

impl Iterator for MessageCursor<'_> {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        if self.page.is_empty() {
            self.fill();
        }
        let message = self.page.pop_front()?;
        self.position = message.seq;
        Some(message)
    }
}
