//! Primary Server
//!
//! The only writer of graph resources. Listens on the primary channel and runs
//! one worker per AddGraph/ModifyGraph request.
//!
//! ## Write Path
//! 1. Attach to the session's staging segment and take the staged matrix.
//! 2. Acquire the guard for the resource name.
//! 3. Write the file and flush it to stable storage.
//! 4. Release the guard, reply, then detach from the segment.

use super::worker::{DrainReport, WorkerSet};
use crate::error::{ClusterError, Result};
use crate::guard::table::ResourceGuards;
use crate::protocol::bus::MessageBus;
use crate::protocol::types::{Envelope, Operation, PRIMARY_SERVER_CHANNEL, Status};
use crate::staging::area::{StagingArea, StagingHandle};
use crate::storage::file::GraphFileStore;

use std::sync::Arc;
use std::time::Duration;

pub struct PrimaryServer {
    bus: Arc<MessageBus>,
    staging: Arc<StagingArea>,
    guards: Arc<ResourceGuards>,
    store: GraphFileStore,
    /// Receive timeout between housekeeping passes.
    poll: Duration,
}

impl PrimaryServer {
    pub fn new(
        bus: Arc<MessageBus>,
        staging: Arc<StagingArea>,
        guards: Arc<ResourceGuards>,
        store: GraphFileStore,
        poll: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            staging,
            guards,
            store,
            poll,
        })
    }

    /// Serves requests until a Cleanup arrives, then drains every worker.
    ///
    /// Malformed frames and misrouted operations are logged and skipped. A
    /// channel failure stops the loop after the outstanding workers finish.
    pub async fn run(self: Arc<Self>) -> Result<DrainReport> {
        tracing::info!(
            "Primary: listening on channel {} (data dir: {:?})",
            PRIMARY_SERVER_CHANNEL,
            self.store.data_dir()
        );
        let mut workers = WorkerSet::new("Primary");

        loop {
            let request = match self.bus.receive(PRIMARY_SERVER_CHANNEL, self.poll).await {
                Ok(Some(request)) => request,
                Ok(None) => {
                    workers.reap_finished().await;
                    continue;
                }
                Err(ClusterError::ProtocolViolation(reason)) => {
                    tracing::warn!("Primary: dropping malformed frame: {}", reason);
                    continue;
                }
                Err(e) => {
                    tracing::error!("Primary: channel failure, stopping: {}", e);
                    workers.join_all().await;
                    return Err(e);
                }
            };

            match request.operation {
                Operation::AddGraph | Operation::ModifyGraph => {
                    tracing::info!(
                        "Primary: {:?} '{}' from session {}",
                        request.operation,
                        request.resource.as_ref().map(|r| r.as_str()).unwrap_or("<none>"),
                        request.session
                    );
                    let server = self.clone();
                    workers.spawn(request.session, async move {
                        server.handle_write(request).await;
                    });
                }
                Operation::Cleanup => {
                    tracing::info!("Primary: cleanup received");
                    return Ok(workers.join_all().await);
                }
                other => {
                    tracing::warn!(
                        "Primary: ignoring {:?} from session {}",
                        other,
                        request.session
                    );
                }
            }
        }
    }

    async fn handle_write(&self, request: Envelope) {
        let session = request.session;

        let (status, handle) = match self.staging.open_for(session, request.request_id) {
            Ok(handle) => match self.write_staged(&request, &handle).await {
                Ok(()) => (Status::Ok, Some(handle)),
                Err(e) => {
                    tracing::warn!("Primary: write for session {} failed: {}", session, e);
                    (Status::from_error(&e), Some(handle))
                }
            },
            Err(e) => {
                tracing::warn!("Primary: no staging for session {}: {}", session, e);
                (Status::from_error(&e), None)
            }
        };

        if let Err(e) = self.bus.send(&request.reply(status)).await {
            tracing::error!("Primary: reply to session {} lost: {}", session, e);
        }

        if let Some(handle) = handle {
            handle.close();
        }
    }

    async fn write_staged(&self, request: &Envelope, handle: &StagingHandle) -> Result<()> {
        let name = request.resource_name()?;
        let matrix = handle.read_graph()?;

        let permit = self.guards.acquire(name).await?;
        let written = self.store.write(name, &matrix).await;
        permit.release();
        written?;

        tracing::info!(
            "Primary: stored '{}' ({} nodes) for session {}",
            name,
            matrix.node_count(),
            request.session
        );
        Ok(())
    }
}
