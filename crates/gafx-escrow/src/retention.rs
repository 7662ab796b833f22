//! # Retention
//!
//! Terminal orders keep their chat for `retention_grace_secs` after their
//! last transition. Past that, the order record is archived and its
//! message contents are dropped. The record itself is never deleted.

use tracing::info;

use crate::engine::EscrowEngine;
use crate::order::Order;

/// Outcome of one retention sweep.
#[derive(Debug, Clone, Default)]
pub struct RetentionReport {
    pub archived: Vec<Order>,
}

/// Archive every terminal order past the grace window.
pub fn sweep(engine: &EscrowEngine) -> RetentionReport {
    let now = engine.now();
    let grace = engine.config().retention_grace();
    let limit = engine.config().scan_batch_limit;
    let due = engine.store().scan_live(limit, |o| {
        o.state.is_terminal() && !o.is_archived() && o.updated_at + grace <= now
    });

    let mut report = RetentionReport::default();
    for order in due {
        match engine.store().archive(order.id, now) {
            Ok(Some(archived)) => report.archived.push(archived),
            Ok(None) => {}
            Err(err) => tracing::warn!(order_id = %order.id, error = %err, "archive failed"),
        }
    }
    if !report.archived.is_empty() {
        info!(archived = report.archived.len(), "retention sweep finished");
    }
    report
}
