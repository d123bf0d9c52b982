//! Cluster Assembly
//!
//! Wires the shared bus, staging area and guard table together and starts
//! every role on its own task: one router, one primary and the configured
//! number of secondaries.

use super::primary::PrimaryServer;
use super::router::Router;
use super::secondary::SecondaryServer;
use super::worker::DrainReport;
use crate::client::GraphClient;
use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::guard::table::{GuardRecorder, ResourceGuards};
use crate::protocol::bus::MessageBus;
use crate::protocol::types::{Envelope, LOAD_BALANCER_CHANNEL, SessionId};
use crate::staging::area::StagingArea;
use crate::storage::file::GraphFileStore;

use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct Cluster {
    config: ClusterConfig,
    bus: Arc<MessageBus>,
    staging: Arc<StagingArea>,
    store: GraphFileStore,
    router: JoinHandle<Result<u64>>,
    primary: JoinHandle<Result<DrainReport>>,
    secondaries: Vec<JoinHandle<Result<DrainReport>>>,
}

impl Cluster {
    pub async fn start(config: ClusterConfig) -> Result<Self> {
        Self::launch(config, None).await
    }

    /// Starts a cluster whose guard table records every hold interval.
    pub async fn start_with_recorder(
        config: ClusterConfig,
        recorder: Arc<GuardRecorder>,
    ) -> Result<Self> {
        Self::launch(config, Some(recorder)).await
    }

    async fn launch(config: ClusterConfig, recorder: Option<Arc<GuardRecorder>>) -> Result<Self> {
        let config = config.normalized();

        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(|e| ClusterError::io_with_path(e, &config.data_dir))?;

        let bus = MessageBus::new();
        let staging = StagingArea::new(config.staging_capacity);
        let guards = match recorder {
            Some(recorder) => ResourceGuards::with_recorder(config.guard_timeout, recorder),
            None => ResourceGuards::new(config.guard_timeout),
        };
        let store = GraphFileStore::new(config.data_dir.clone());

        let router = Router::new(bus.clone(), config.secondaries, config.receive_poll);
        let router = tokio::spawn(router.run());

        let primary = PrimaryServer::new(
            bus.clone(),
            staging.clone(),
            guards,
            store.clone(),
            config.receive_poll,
        );
        let primary = tokio::spawn(primary.run());

        let secondaries = (0..config.secondaries)
            .map(|index| {
                let secondary = SecondaryServer::new(
                    index,
                    bus.clone(),
                    staging.clone(),
                    store.clone(),
                    config.receive_poll,
                );
                tokio::spawn(secondary.run())
            })
            .collect();

        tracing::info!(
            "Cluster started: 1 primary, {} secondaries, staging capacity {}",
            config.secondaries,
            config.staging_capacity
        );

        Ok(Self {
            config,
            bus,
            staging,
            store,
            router,
            primary,
            secondaries,
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn staging(&self) -> &Arc<StagingArea> {
        &self.staging
    }

    pub fn store(&self) -> &GraphFileStore {
        &self.store
    }

    /// A client for `session`, sharing this cluster's bus and staging area.
    pub fn client(&self, session: u64) -> Result<GraphClient> {
        Ok(GraphClient::new(
            SessionId::new(session)?,
            self.bus.clone(),
            self.staging.clone(),
            self.config.reply_timeout,
        ))
    }

    /// Sends Cleanup through the router and waits for every role to drain.
    ///
    /// Must be called after the last request has been sent. Requests sent
    /// afterwards are never served.
    pub async fn shutdown(self) -> Result<DrainReport> {
        tracing::info!("Cluster: shutting down");
        self.bus.send(&Envelope::cleanup(LOAD_BALANCER_CHANNEL)).await?;

        let mut first_error = None;
        match self.router.await {
            Ok(Ok(forwarded)) => tracing::info!("Cluster: router forwarded {} requests", forwarded),
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(e) => tracing::error!("Cluster: router task failed: {}", e),
        }

        let mut report = DrainReport::default();
        let roles = std::iter::once(self.primary).chain(self.secondaries);
        for role in roles {
            match role.await {
                Ok(Ok(drained)) => report.merge(drained),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!("Cluster: server task failed: {}", e);
                    report.panicked += 1;
                }
            }
        }

        self.bus.close();

        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::info!(
                    "Cluster: stopped (joined: {}, panicked: {})",
                    report.joined,
                    report.panicked
                );
                Ok(report)
            }
        }
    }
}
