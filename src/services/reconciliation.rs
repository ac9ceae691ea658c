use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    entities::{request, RequestStatus},
    errors::ServiceError,
    services::{
        outbox::OutboxReport,
        requests::RequestService,
        shipments::{CompletionOutcome, ShipmentService, TransitionTrigger},
        tombstones::TombstoneStore,
    },
};

/// What one reconciliation tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub outbox: OutboxReport,
    /// Sweep A: shipments approved from a `complete` request.
    pub approved: usize,
    /// Sweep A: shipments rejected from a `reject` request.
    pub rejected: usize,
    /// Sweep A: requests whose shipment already matched.
    pub converged: usize,
    /// Sweep A: requests newly tombstoned because their shipment is missing.
    pub tombstoned: usize,
    /// Sweep A: requests skipped because of a live tombstone.
    pub suppressed: usize,
    /// Sweep A: request and shipment disagree on a terminal outcome.
    pub conflicts: usize,
    /// Sweep B: shipments moved to Completed.
    pub completed: usize,
    /// Per-record failures across both sweeps, retried next tick.
    pub failed: usize,
}

impl TickReport {
    pub fn changed_anything(&self) -> bool {
        self.outbox.delivered + self.approved + self.rejected + self.completed + self.tombstoned
            > 0
    }
}

/// Background convergence of the POS request status onto the warehouse
/// shipment, and completion of approved shipments.
///
/// Every step re-reads both stores, so a tick may be repeated or
/// interrupted at any point.
#[derive(Clone)]
pub struct ReconciliationScheduler {
    shipments: ShipmentService,
    requests: RequestService,
    tombstones: Arc<dyn TombstoneStore>,
    interval: Duration,
    outbox_batch_size: u64,
}

impl ReconciliationScheduler {
    pub fn new(
        shipments: ShipmentService,
        requests: RequestService,
        tombstones: Arc<dyn TombstoneStore>,
        interval: Duration,
        outbox_batch_size: u64,
    ) -> Self {
        Self {
            shipments,
            requests,
            tombstones,
            interval,
            outbox_batch_size: outbox_batch_size.max(1),
        }
    }

    /// Runs the outbox delivery, Sweep A and Sweep B once. Never fails;
    /// problems are logged and counted.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> TickReport {
        let start = Instant::now();
        let mut report = TickReport::default();

        match self
            .shipments
            .outbox()
            .deliver_pending(self.outbox_batch_size)
            .await
        {
            Ok(outbox) => report.outbox = outbox,
            Err(e) => error!(error = %e, "outbox delivery step failed"),
        }

        if let Err(e) = self.converge_requests(&mut report).await {
            error!(error = %e, "request convergence sweep failed");
        }
        if let Err(e) = self.complete_approved(&mut report).await {
            error!(error = %e, "completion sweep failed");
        }

        counter!("stock_transfer.reconcile.ticks", 1);
        histogram!("stock_transfer.reconcile.tick_duration", start.elapsed());
        gauge!("stock_transfer.tombstones.size", self.tombstones.len() as f64);

        if report.changed_anything() || report.failed > 0 || report.conflicts > 0 {
            info!(?report, "reconciliation tick");
        } else {
            debug!(?report, "reconciliation tick");
        }
        report
    }

    /// Sweep A.
    async fn converge_requests(&self, report: &mut TickReport) -> Result<(), ServiceError> {
        for req in self.requests.decided_requests().await? {
            if self.tombstones.is_suppressed(req.id) {
                report.suppressed += 1;
                continue;
            }
            if let Err(e) = self.converge_one(&req, report).await {
                report.failed += 1;
                if e.is_retryable() {
                    warn!(request_id = %req.id, error = %e, "could not converge request; retrying next tick");
                } else {
                    error!(request_id = %req.id, error = %e, "request convergence failed");
                }
            }
        }
        Ok(())
    }

    async fn converge_one(
        &self,
        req: &request::Model,
        report: &mut TickReport,
    ) -> Result<(), ServiceError> {
        let Some(target) = req.status.target_shipment_status() else {
            return Ok(());
        };

        let Some(shipment) = self.shipments.find_shipment(req.id).await? else {
            if self.tombstones.mark(req.id) {
                report.tombstoned += 1;
                let stall = ServiceError::ReconciliationStall(req.id);
                warn!(request_id = %req.id, error = %stall, "no shipment for request; suppressing lookups");
            }
            return Ok(());
        };

        if req.status.is_converged_with(shipment.status) {
            report.converged += 1;
            self.tombstones.clear(req.id);
            return Ok(());
        }

        if !shipment.status.can_transition_to(target) {
            report.conflicts += 1;
            counter!("stock_transfer.reconcile.conflicts", 1);
            warn!(
                request_id = %req.id,
                request_status = %req.status,
                shipment_status = %shipment.status,
                "request and shipment disagree; leaving both untouched"
            );
            return Ok(());
        }

        self.shipments
            .apply_transition(shipment.id, target, TransitionTrigger::Reconciliation)
            .await?;
        self.tombstones.clear(req.id);
        match req.status {
            RequestStatus::Complete => report.approved += 1,
            RequestStatus::Reject => report.rejected += 1,
            RequestStatus::Pending => {}
        }
        Ok(())
    }

    /// Sweep B.
    async fn complete_approved(&self, report: &mut TickReport) -> Result<(), ServiceError> {
        for id in self.shipments.approved_shipment_ids().await? {
            match self.shipments.complete_shipment(id).await {
                Ok(CompletionOutcome::Completed { .. }) => report.completed += 1,
                Ok(CompletionOutcome::Skipped) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(shipment_id = %id, error = %e, "could not complete shipment; retrying next tick");
                }
            }
        }
        Ok(())
    }

    /// Runs [`Self::run_once`] on a fixed interval until `shutdown` flips to
    /// `true` or its sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval = ?self.interval, "reconciliation scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // a panicking tick must not end the loop
                        let tick = self.clone();
                        if let Err(e) = tokio::spawn(async move { tick.run_once().await }).await {
                            error!(error = %e, "reconciliation tick aborted");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("reconciliation scheduler stopped");
        })
    }
}
