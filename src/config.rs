//! Cluster configuration.
//!
//! Defaults describe a small deployment (two secondaries,
//! room for 200 in-flight sessions). Every value can be overridden through a
//! `GRAPH_*` environment variable; `main` layers CLI flags on top.

use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::types::MAX_SECONDARIES;

const DEFAULT_SECONDARIES: usize = 2;
const DEFAULT_STAGING_CAPACITY: usize = 200;
const DEFAULT_GUARD_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_RECEIVE_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Directory holding one file per graph resource.
    pub data_dir: PathBuf,
    /// Number of secondary (read) servers, `1..=MAX_SECONDARIES`.
    pub secondaries: usize,
    /// Maximum number of live staging segments.
    pub staging_capacity: usize,
    /// Bounded wait on a resource guard before a writer gives up.
    pub guard_timeout: Duration,
    /// How long a client waits for its reply.
    pub reply_timeout: Duration,
    /// Receive timeout used by server loops between bus checks.
    pub receive_poll: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./graph_data"),
            secondaries: DEFAULT_SECONDARIES,
            staging_capacity: DEFAULT_STAGING_CAPACITY,
            guard_timeout: DEFAULT_GUARD_TIMEOUT,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            receive_poll: DEFAULT_RECEIVE_POLL,
        }
    }
}

impl ClusterConfig {
    /// Defaults with a custom data directory (used by tests).
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `GRAPH_DATA_DIR`, `GRAPH_SECONDARIES`,
    /// `GRAPH_STAGING_CAPACITY`, `GRAPH_GUARD_TIMEOUT_MS`,
    /// `GRAPH_REPLY_TIMEOUT_MS` and `GRAPH_RECEIVE_POLL_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("GRAPH_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(n) = env_parse::<usize>("GRAPH_SECONDARIES") {
            config.secondaries = n;
        }
        if let Some(n) = env_parse::<usize>("GRAPH_STAGING_CAPACITY") {
            config.staging_capacity = n;
        }
        if let Some(ms) = env_parse::<u64>("GRAPH_GUARD_TIMEOUT_MS") {
            config.guard_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("GRAPH_REPLY_TIMEOUT_MS") {
            config.reply_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("GRAPH_RECEIVE_POLL_MS") {
            config.receive_poll = Duration::from_millis(ms);
        }

        config
    }

    /// Clamp values into the ranges the cluster supports.
    pub fn normalized(mut self) -> Self {
        if self.secondaries == 0 || self.secondaries > MAX_SECONDARIES {
            tracing::warn!(
                "Secondary count {} out of range, clamping to 1..={}",
                self.secondaries,
                MAX_SECONDARIES
            );
            self.secondaries = self.secondaries.clamp(1, MAX_SECONDARIES);
        }
        if self.staging_capacity == 0 {
            self.staging_capacity = DEFAULT_STAGING_CAPACITY;
        }
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={}", key, raw);
            None
        }
    }
}
