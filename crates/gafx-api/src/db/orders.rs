//! Order and message persistence operations.
//!
//! Orders are upserted as whole snapshots. The upsert is guarded by
//! version so a slow writer can never replace a newer snapshot with an
//! older one. Messages are immutable and inserted at most once, in
//! batches that land whole or not at all, so the stored log of an order
//! is always a gap-free prefix of the in-memory one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use gafx_core::{ActorId, OrderId, Role};
use gafx_escrow::{Message, Order};

fn to_i64(value: u64, field: &str) -> Result<i64, sqlx::Error> {
    i64::try_from(value).map_err(|_| sqlx::Error::Protocol(format!("{field} out of range: {value}")))
}

/// Save an order snapshot (upsert, never downgrading the version).
pub async fn save_order(pool: &PgPool, order: &Order) -> Result<(), sqlx::Error> {
    let snapshot = serde_json::to_value(order)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize order: {e}")))?;

    sqlx::query(
        "INSERT INTO orders (order_id, buyer_id, seller_id, state, version, amount, phase_deadline, created_at, updated_at, archived_at, snapshot)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         ON CONFLICT (order_id) DO UPDATE SET
            state = EXCLUDED.state,
            version = EXCLUDED.version,
            phase_deadline = EXCLUDED.phase_deadline,
            updated_at = EXCLUDED.updated_at,
            archived_at = EXCLUDED.archived_at,
            snapshot = EXCLUDED.snapshot
         WHERE orders.version <= EXCLUDED.version",
    )
    .bind(*order.id.as_uuid())
    .bind(*order.buyer_id.as_uuid())
    .bind(*order.seller_id.as_uuid())
    .bind(order.state.as_str())
    .bind(to_i64(order.version, "version")?)
    .bind(to_i64(order.amount, "amount")?)
    .bind(order.phase_deadline)
    .bind(order.created_at)
    .bind(order.updated_at)
    .bind(order.archived_at)
    .bind(&snapshot)
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert messages, skipping any already stored.
///
/// Uses a transaction so a failed batch leaves no partial tail behind.
pub async fn save_messages(pool: &PgPool, messages: &[Message]) -> Result<(), sqlx::Error> {
    if messages.is_empty() {
        return Ok(());
    }
    let mut tx = pool.begin().await?;
    for m in messages {
        let body = serde_json::to_value(&m.body)
            .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize message body: {e}")))?;
        sqlx::query(
            "INSERT INTO order_messages (order_id, seq, sender_id, sender_role, body, sent_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (order_id, seq) DO NOTHING",
        )
        .bind(*m.order_id.as_uuid())
        .bind(to_i64(m.seq, "seq")?)
        .bind(*m.sender_id.as_uuid())
        .bind(m.sender_role.as_str())
        .bind(&body)
        .bind(m.sent_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Highest message sequence number stored for an order, 0 if none.
pub async fn max_seq(pool: &PgPool, order_id: OrderId) -> Result<u64, sqlx::Error> {
    let max: Option<i64> = sqlx::query_scalar("SELECT MAX(seq) FROM order_messages WHERE order_id = $1")
        .bind(*order_id.as_uuid())
        .fetch_one(pool)
        .await?;
    let max = max.unwrap_or(0);
    u64::try_from(max).map_err(|_| sqlx::Error::Protocol(format!("corrupt seq {max} for order {order_id}")))
}

/// Drop the message contents of an archived order.
pub async fn delete_messages(pool: &PgPool, order_id: OrderId) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM order_messages WHERE order_id = $1")
        .bind(*order_id.as_uuid())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Load every order with its messages for hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<(Order, Vec<Message>)>, sqlx::Error> {
    let order_rows = sqlx::query_as::<_, OrderRow>(
        "SELECT order_id, snapshot FROM orders ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    let message_rows = sqlx::query_as::<_, MessageRow>(
        "SELECT order_id, seq, sender_id, sender_role, body, sent_at
         FROM order_messages ORDER BY order_id, seq",
    )
    .fetch_all(pool)
    .await?;

    let mut by_order: HashMap<Uuid, Vec<Message>> = HashMap::new();
    for row in message_rows {
        let order_id = row.order_id;
        by_order.entry(order_id).or_default().push(row.into_message()?);
    }

    let mut records = Vec::with_capacity(order_rows.len());
    for row in order_rows {
        let order: Order = serde_json::from_value(row.snapshot).map_err(|e| {
            sqlx::Error::Protocol(format!("corrupt snapshot for order {}: {e}", row.order_id))
        })?;
        let messages = by_order.remove(&row.order_id).unwrap_or_default();
        records.push((order, messages));
    }

    Ok(records)
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_id: Uuid,
    snapshot: serde_json::Value,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    order_id: Uuid,
    seq: i64,
    sender_id: Uuid,
    sender_role: String,
    body: serde_json::Value,
    sent_at: DateTime<Utc>,
}

impl MessageRow {
    fn into_message(self) -> Result<Message, sqlx::Error> {
        let corrupt = |what: &str| {
            sqlx::Error::Protocol(format!(
                "corrupt {what} in message {}#{}",
                self.order_id, self.seq
            ))
        };
        let seq = u64::try_from(self.seq).map_err(|_| corrupt("seq"))?;
        let sender_role: Role = self.sender_role.parse().map_err(|_| corrupt("sender_role"))?;
        let body = serde_json::from_value(self.body.clone()).map_err(|_| corrupt("body"))?;
        Ok(Message {
            seq,
            order_id: OrderId::from_uuid(self.order_id),
            sender_id: ActorId::from_uuid(self.sender_id),
            sender_role,
            body,
            sent_at: self.sent_at,
        })
    }
}
