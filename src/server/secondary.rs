//! Secondary Server
//!
//! A read-only role. Each instance listens on its own channel and runs one
//! worker per Traverse request: take the staged start vertex, load the graph,
//! traverse it, stage the visit order, reply.

use super::traversal;
use super::worker::{DrainReport, WorkerSet};
use crate::error::{ClusterError, Result};
use crate::protocol::bus::MessageBus;
use crate::protocol::types::{Channel, Envelope, Operation, Status, secondary_channel};
use crate::staging::area::{StagingArea, StagingHandle};
use crate::storage::file::GraphFileStore;

use std::sync::Arc;
use std::time::Duration;

pub struct SecondaryServer {
    index: usize,
    channel: Channel,
    bus: Arc<MessageBus>,
    staging: Arc<StagingArea>,
    store: GraphFileStore,
    poll: Duration,
}

impl SecondaryServer {
    pub fn new(
        index: usize,
        bus: Arc<MessageBus>,
        staging: Arc<StagingArea>,
        store: GraphFileStore,
        poll: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            index,
            channel: secondary_channel(index),
            bus,
            staging,
            store,
            poll,
        })
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    fn role(&self) -> String {
        format!("Secondary {}", self.index)
    }

    /// Serves traversals until a Cleanup arrives, then drains every worker.
    pub async fn run(self: Arc<Self>) -> Result<DrainReport> {
        let role = self.role();
        tracing::info!("{}: listening on channel {}", role, self.channel);
        let mut workers = WorkerSet::new(role.clone());

        loop {
            let request = match self.bus.receive(self.channel, self.poll).await {
                Ok(Some(request)) => request,
                Ok(None) => {
                    workers.reap_finished().await;
                    continue;
                }
                Err(ClusterError::ProtocolViolation(reason)) => {
                    tracing::warn!("{}: dropping malformed frame: {}", role, reason);
                    continue;
                }
                Err(e) => {
                    tracing::error!("{}: channel failure, stopping: {}", role, e);
                    workers.join_all().await;
                    return Err(e);
                }
            };

            match request.operation {
                Operation::Traverse => {
                    tracing::info!(
                        "{}: traverse '{}' for session {}",
                        role,
                        request.resource.as_ref().map(|r| r.as_str()).unwrap_or("<none>"),
                        request.session
                    );
                    let server = self.clone();
                    workers.spawn(request.session, async move {
                        server.handle_traverse(request).await;
                    });
                }
                Operation::NoOp => {
                    tracing::debug!("{}: no-op from session {}", role, request.session);
                }
                Operation::Cleanup => {
                    tracing::info!("{}: cleanup received", role);
                    return Ok(workers.join_all().await);
                }
                other => {
                    tracing::warn!(
                        "{}: ignoring {:?} from session {}",
                        role,
                        other,
                        request.session
                    );
                }
            }
        }
    }

    async fn handle_traverse(&self, request: Envelope) {
        let session = request.session;

        let (status, handle) = match self.staging.open_for(session, request.request_id) {
            Ok(handle) => match self.traverse_staged(&request, &handle).await {
                Ok(()) => (Status::Ok, Some(handle)),
                Err(e) => {
                    tracing::warn!(
                        "{}: traversal for session {} failed: {}",
                        self.role(),
                        session,
                        e
                    );
                    (Status::from_error(&e), Some(handle))
                }
            },
            Err(e) => {
                tracing::warn!("{}: no staging for session {}: {}", self.role(), session, e);
                (Status::from_error(&e), None)
            }
        };

        if let Err(e) = self.bus.send(&request.reply(status)).await {
            tracing::error!("{}: reply to session {} lost: {}", self.role(), session, e);
        }

        if let Some(handle) = handle {
            handle.close();
        }
    }

    async fn traverse_staged(&self, request: &Envelope, handle: &StagingHandle) -> Result<()> {
        let name = request.resource_name()?;
        let start = handle.read_start_vertex()?;
        let matrix = self.store.read(name).await?;

        let order = traversal::depth_first(request.session, matrix, start).await?;
        tracing::debug!(
            "{}: '{}' from {} visited {} vertices",
            self.role(),
            name,
            start,
            order.len()
        );

        handle.write_traversal(&order)
    }
}
