//! Graph Client
//!
//! The requester side of the protocol. A client owns one session: it stages
//! the request payload under its session id, sends the envelope to the
//! load-balancer channel, and waits for the reply on its private channel.
//!
//! Calls take `&mut self` because a session has a single staging segment; two
//! requests in flight on one session would overwrite each other's payload.
//!
//! Every call gets the next request id of the session. The reply echoes it, so
//! a late reply to an earlier call (after a timeout, or to a redelivered
//! request) is never taken as the answer; such replies are purged instead.

use crate::error::{ClusterError, Result};
use crate::protocol::bus::MessageBus;
use crate::protocol::types::{
    Envelope, LOAD_BALANCER_CHANNEL, Operation, ResourceName, SessionId,
};
use crate::staging::area::StagingArea;
use crate::storage::graph::AdjacencyMatrix;

use std::sync::Arc;
use std::time::Duration;

pub struct GraphClient {
    session: SessionId,
    bus: Arc<MessageBus>,
    staging: Arc<StagingArea>,
    reply_timeout: Duration,
    /// Id of the last request issued on this session.
    last_request: u64,
}

impl GraphClient {
    pub fn new(
        session: SessionId,
        bus: Arc<MessageBus>,
        staging: Arc<StagingArea>,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            session,
            bus,
            staging,
            reply_timeout,
            last_request: 0,
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    fn next_request_id(&mut self) -> u64 {
        self.last_request += 1;
        self.last_request
    }

    pub async fn add_graph(&mut self, name: &str, matrix: &AdjacencyMatrix) -> Result<()> {
        self.write_graph(name, matrix, Operation::AddGraph).await
    }

    pub async fn modify_graph(&mut self, name: &str, matrix: &AdjacencyMatrix) -> Result<()> {
        self.write_graph(name, matrix, Operation::ModifyGraph).await
    }

    /// Stores `matrix` under `name`. Returns once the file is on disk.
    pub async fn write_graph(
        &mut self,
        name: &str,
        matrix: &AdjacencyMatrix,
        operation: Operation,
    ) -> Result<()> {
        if !operation.is_write() {
            return Err(ClusterError::protocol(format!(
                "{:?} is not a write operation",
                operation
            )));
        }
        let name = ResourceName::new(name)?;
        let request_id = self.next_request_id();

        let handle = self.staging.open_for(self.session, request_id)?;
        let result = async {
            let words = handle.write_graph(matrix)?;
            let request =
                Envelope::request(LOAD_BALANCER_CHANNEL, self.session, operation, name, words)
                    .with_request_id(request_id);
            self.exchange(&request).await
        }
        .await;

        if result.is_err() {
            handle.abandon();
        }
        handle.close();
        result
    }

    /// Depth-first visit order of the graph `name` starting at `start`.
    pub async fn traverse(&mut self, name: &str, start: u32) -> Result<Vec<u32>> {
        let name = ResourceName::new(name)?;
        let request_id = self.next_request_id();

        let handle = self.staging.open_for(self.session, request_id)?;
        let result = async {
            let words = handle.write_start_vertex(start)?;
            let request = Envelope::request(
                LOAD_BALANCER_CHANNEL,
                self.session,
                Operation::Traverse,
                name,
                words,
            )
            .with_request_id(request_id);
            self.exchange(&request).await?;
            handle.read_traversal()
        }
        .await;

        if result.is_err() {
            handle.abandon();
        }
        handle.close();
        result
    }

    /// Sends a no-op to the session's secondary. No reply is produced.
    pub async fn no_op(&mut self, name: &str) -> Result<()> {
        let name = ResourceName::new(name)?;
        let request_id = self.next_request_id();
        let request =
            Envelope::request(LOAD_BALANCER_CHANNEL, self.session, Operation::NoOp, name, 0)
                .with_request_id(request_id);
        self.bus.send(&request).await
    }

    /// Sends `request` and waits for the reply carrying its request id.
    async fn exchange(&self, request: &Envelope) -> Result<()> {
        let session = self.session;
        let request_id = request.request_id;

        let purged = self.purge_replies_before(request_id).await?;
        if purged > 0 {
            tracing::debug!("Session {}: dropped {} stale replies", session, purged);
        }

        self.bus.send(request).await?;

        let reply = self
            .bus
            .receive_where(session.reply_channel(), self.reply_timeout, |envelope| {
                envelope.is_reply_for(session) && envelope.request_id == request_id
            })
            .await?;

        match reply {
            Some(reply) => reply.status.into_result(),
            None => {
                tracing::warn!(
                    "Session {}: no reply to {:?} #{} within {:?}",
                    session,
                    request.operation,
                    request_id,
                    self.reply_timeout
                );
                Err(ClusterError::ReplyTimeout {
                    session: session.get(),
                    waited: self.reply_timeout,
                })
            }
        }
    }

    /// Removes queued replies to requests older than `request_id`.
    async fn purge_replies_before(&self, request_id: u64) -> Result<usize> {
        let session = self.session;
        let mut purged = 0;
        while self
            .bus
            .receive_where(session.reply_channel(), Duration::ZERO, |envelope| {
                envelope.is_reply_for(session) && envelope.request_id < request_id
            })
            .await?
            .is_some()
        {
            purged += 1;
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests;
