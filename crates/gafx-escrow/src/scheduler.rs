//! # Deadline Scheduler
//!
//! Expires orders whose payment window has elapsed. The scheduler holds no
//! authority of its own: it submits a synthetic `timeout` as the system
//! actor through [`EscrowEngine::submit`], at the version it observed.
//! When a participant's action lands first the submission loses the race
//! and is dropped, so several scheduler instances may run side by side.
//!
//! Each tick also runs the retention sweep.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use gafx_core::Actor;
use gafx_state::OrderState;

use crate::engine::{Command, EscrowEngine};
use crate::error::EscrowError;
use crate::order::Order;
use crate::retention;

/// Outcome of one deadline sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Orders found past their payment deadline.
    pub scanned: usize,
    /// Orders this sweep moved to `EXPIRED`.
    pub expired: Vec<Order>,
    /// Orders another writer changed first.
    pub lost_races: usize,
    /// Orders whose timeout failed for another reason, e.g. a ledger outage.
    /// They are picked up again on the next sweep.
    pub failed: usize,
}

/// Periodic deadline sweeper.
#[derive(Debug, Clone)]
pub struct DeadlineScheduler {
    engine: EscrowEngine,
}

impl DeadlineScheduler {
    pub fn new(engine: EscrowEngine) -> Self {
        Self { engine }
    }

    /// Run one deadline sweep.
    pub fn tick(&self) -> SweepReport {
        let now = self.engine.now();
        let limit = self.engine.config().scan_batch_limit;
        let due = self.engine.store().scan_live(limit, |o| {
            o.state == OrderState::AwaitingPayment && o.deadline_elapsed(now)
        });

        let system = Actor::system();
        let mut report = SweepReport {
            scanned: due.len(),
            ..SweepReport::default()
        };
        for order in due {
            match self
                .engine
                .submit(order.id, &system, Command::Timeout, Some(order.version))
            {
                Ok(expired) => report.expired.push(expired),
                Err(
                    EscrowError::VersionConflict { .. } | EscrowError::InvalidStateTransition { .. },
                ) => {
                    debug!(order_id = %order.id, "timeout superseded by a concurrent transition");
                    report.lost_races += 1;
                }
                Err(err) => {
                    warn!(order_id = %order.id, error = %err, "timeout failed");
                    report.failed += 1;
                }
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                expired = report.expired.len(),
                lost_races = report.lost_races,
                failed = report.failed,
                "deadline sweep finished"
            );
        }
        report
    }

    /// Run deadline and retention sweeps every `scan_interval` until the
    /// handle is shut down. Every order a sweep changes is sent to
    /// `changes`, if given.
    pub fn spawn(self, changes: Option<mpsc::UnboundedSender<Order>>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let period: Duration = self.engine.config().scan_interval();

        let task = tokio::spawn(async move {
            let mut timer = interval(period);
            info!(interval_secs = period.as_secs(), "deadline scheduler started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("deadline scheduler received shutdown signal");
                        break;
                    }
                    _ = timer.tick() => {
                        // Timeouts wait on the ledger, so sweeps run off the runtime workers.
                        let scheduler = self.clone();
                        let swept = tokio::task::spawn_blocking(move || {
                            (scheduler.tick(), retention::sweep(&scheduler.engine))
                        })
                        .await;
                        let (sweep, retention) = match swept {
                            Ok(reports) => reports,
                            Err(err) => {
                                warn!(error = %err, "sweep task failed");
                                (SweepReport::default(), retention::RetentionReport::default())
                            }
                        };
                        if let Some(tx) = &changes {
                            for order in sweep.expired.into_iter().chain(retention.archived) {
                                if tx.send(order).is_err() {
                                    debug!("change receiver dropped");
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            info!("deadline scheduler stopped");
        });

        SchedulerHandle { shutdown_tx, task }
    }
}

/// Handle to a spawned scheduler task.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for the in-flight sweep to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(err) = self.task.await {
            warn!(error = %err, "deadline scheduler task ended abnormally");
        }
    }
}
