//! Load Balancer
//!
//! Consumes the well-known entry channel and readdresses each request: writes
//! go to the primary, traversals and no-ops to the session's secondary. A
//! Cleanup is fanned out to every server role, after which the router stops.

use crate::error::{ClusterError, Result};
use crate::protocol::bus::MessageBus;
use crate::protocol::types::{
    Channel, Envelope, LOAD_BALANCER_CHANNEL, Operation, PRIMARY_SERVER_CHANNEL,
    secondary_channel, secondary_for_session,
};

use std::sync::Arc;
use std::time::Duration;

pub struct Router {
    bus: Arc<MessageBus>,
    secondaries: usize,
    poll: Duration,
}

impl Router {
    pub fn new(bus: Arc<MessageBus>, secondaries: usize, poll: Duration) -> Self {
        Self {
            bus,
            secondaries,
            poll,
        }
    }

    /// Destination of a request, or `None` for envelopes that are never routed.
    pub fn destination(&self, envelope: &Envelope) -> Option<Channel> {
        match envelope.operation {
            Operation::AddGraph | Operation::ModifyGraph => Some(PRIMARY_SERVER_CHANNEL),
            Operation::Traverse | Operation::NoOp => {
                Some(secondary_for_session(envelope.session, self.secondaries))
            }
            Operation::Reply | Operation::Cleanup => None,
        }
    }

    /// Routes until Cleanup. Returns the number of requests forwarded.
    pub async fn run(self) -> Result<u64> {
        tracing::info!(
            "Router: listening on channel {} ({} secondaries)",
            LOAD_BALANCER_CHANNEL,
            self.secondaries
        );
        let mut forwarded = 0u64;

        loop {
            let envelope = match self.bus.receive(LOAD_BALANCER_CHANNEL, self.poll).await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => continue,
                Err(ClusterError::ProtocolViolation(reason)) => {
                    tracing::warn!("Router: dropping malformed frame: {}", reason);
                    continue;
                }
                Err(e) => {
                    tracing::error!("Router: channel failure, stopping: {}", e);
                    return Err(e);
                }
            };

            if envelope.operation == Operation::Cleanup {
                self.broadcast_cleanup().await?;
                tracing::info!("Router: stopped after forwarding {} requests", forwarded);
                return Ok(forwarded);
            }

            match self.destination(&envelope) {
                Some(channel) => {
                    tracing::debug!(
                        "Router: {:?} for session {} -> channel {}",
                        envelope.operation,
                        envelope.session,
                        channel
                    );
                    self.bus.send(&envelope.forwarded_to(channel)).await?;
                    forwarded += 1;
                }
                None => {
                    tracing::warn!(
                        "Router: {:?} from session {} is not routable",
                        envelope.operation,
                        envelope.session
                    );
                }
            }
        }
    }

    async fn broadcast_cleanup(&self) -> Result<()> {
        tracing::info!("Router: broadcasting cleanup");
        self.bus.send(&Envelope::cleanup(PRIMARY_SERVER_CHANNEL)).await?;
        for index in 0..self.secondaries {
            self.bus.send(&Envelope::cleanup(secondary_channel(index))).await?;
        }
        Ok(())
    }
}
