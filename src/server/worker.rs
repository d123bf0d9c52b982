//! Per-Request Workers
//!
//! Every accepted request runs on its own short-lived task. The listener keeps
//! the join handles so that a Cleanup can wait for every outstanding worker
//! before the role stops.

use crate::protocol::types::SessionId;

use std::future::Future;
use tokio::task::JoinHandle;

/// Outcome of joining a role's workers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Workers that ran to completion.
    pub joined: usize,
    /// Workers that panicked before replying.
    pub panicked: usize,
}

impl DrainReport {
    pub fn merge(&mut self, other: DrainReport) {
        self.joined += other.joined;
        self.panicked += other.panicked;
    }

    pub fn total(&self) -> usize {
        self.joined + self.panicked
    }
}

struct WorkerRecord {
    session: SessionId,
    handle: JoinHandle<()>,
}

/// The outstanding workers of one server role.
pub struct WorkerSet {
    role: String,
    workers: Vec<WorkerRecord>,
    /// Counts of workers already reaped.
    report: DrainReport,
}

impl WorkerSet {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            workers: Vec::new(),
            report: DrainReport::default(),
        }
    }

    /// Starts `work` on its own task. The listener does not wait for it.
    pub fn spawn<F>(&mut self, session: SessionId, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(work);
        tracing::debug!("{}: spawned worker for session {}", self.role, session);
        self.workers.push(WorkerRecord { session, handle });
    }

    /// Number of workers not yet reaped.
    pub fn outstanding(&self) -> usize {
        self.workers.len()
    }

    /// Collects workers that have already finished, without waiting on the rest.
    pub async fn reap_finished(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = self
            .workers
            .drain(..)
            .partition(|record| record.handle.is_finished());
        self.workers = running;

        for record in finished {
            self.settle(record).await;
        }
    }

    /// Waits for every outstanding worker and returns the totals for the role.
    pub async fn join_all(&mut self) -> DrainReport {
        let pending = std::mem::take(&mut self.workers);
        tracing::info!("{}: draining {} outstanding workers", self.role, pending.len());

        for record in pending {
            self.settle(record).await;
        }

        tracing::info!(
            "{}: drained (joined: {}, panicked: {})",
            self.role,
            self.report.joined,
            self.report.panicked
        );
        self.report
    }

    async fn settle(&mut self, record: WorkerRecord) {
        match record.handle.await {
            Ok(()) => self.report.joined += 1,
            Err(e) => {
                tracing::error!(
                    "{}: worker for session {} failed: {}",
                    self.role,
                    record.session,
                    e
                );
                self.report.panicked += 1;
            }
        }
    }
}
