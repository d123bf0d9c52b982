//! Named Guard Table
//!
//! A lock table keyed by resource name. Each name gets its own mutex the first
//! time it is acquired, so writers to the same graph queue up while writers to
//! different graphs never touch each other's lock.

use crate::error::{ClusterError, Result};
use crate::protocol::types::ResourceName;

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One completed hold of a guard.
#[derive(Debug, Clone)]
pub struct GuardInterval {
    pub name: String,
    pub entered: Instant,
    pub exited: Instant,
}

impl GuardInterval {
    pub fn overlaps(&self, other: &GuardInterval) -> bool {
        self.name == other.name && self.entered < other.exited && other.entered < self.exited
    }
}

/// Records every hold interval, for checking mutual exclusion after the fact.
#[derive(Debug, Default)]
pub struct GuardRecorder {
    intervals: std::sync::Mutex<Vec<GuardInterval>>,
}

impl GuardRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, interval: GuardInterval) {
        match self.intervals.lock() {
            Ok(mut intervals) => intervals.push(interval),
            Err(poisoned) => poisoned.into_inner().push(interval),
        }
    }

    pub fn intervals(&self) -> Vec<GuardInterval> {
        match self.intervals.lock() {
            Ok(intervals) => intervals.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// First pair of holds of the same name that overlap in time, if any.
    pub fn find_overlap(&self) -> Option<(GuardInterval, GuardInterval)> {
        let intervals = self.intervals();
        for (i, a) in intervals.iter().enumerate() {
            for b in intervals.iter().skip(i + 1) {
                if a.overlaps(b) {
                    return Some((a.clone(), b.clone()));
                }
            }
        }
        None
    }
}

pub struct ResourceGuards {
    /// Structure: `resource name -> mutex`, created lazily, never removed.
    locks: DashMap<String, Arc<Mutex<()>>>,
    timeout: Duration,
    recorder: Option<Arc<GuardRecorder>>,
}

impl ResourceGuards {
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            locks: DashMap::new(),
            timeout,
            recorder: None,
        })
    }

    pub fn with_recorder(timeout: Duration, recorder: Arc<GuardRecorder>) -> Arc<Self> {
        Arc::new(Self {
            locks: DashMap::new(),
            timeout,
            recorder: Some(recorder),
        })
    }

    fn lock_for(&self, name: &ResourceName) -> Arc<Mutex<()>> {
        self.locks
            .entry(name.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Waits until no one else holds `name`, then grants exclusive ownership.
    ///
    /// Not reentrant: acquiring a name twice without releasing it waits on
    /// itself until the timeout.
    pub async fn acquire(&self, name: &ResourceName) -> Result<GuardPermit> {
        let lock = self.lock_for(name);
        tracing::debug!("Waiting for guard on '{}'", name);

        let guard = tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .map_err(|_| ClusterError::GuardTimeout {
                name: name.as_str().to_string(),
                waited: self.timeout,
            })?;

        tracing::debug!("Acquired guard on '{}'", name);
        Ok(GuardPermit {
            name: name.as_str().to_string(),
            entered: Instant::now(),
            recorder: self.recorder.clone(),
            _guard: guard,
        })
    }

    /// Number of names that have ever been guarded.
    pub fn known_names(&self) -> usize {
        self.locks.len()
    }
}

/// Exclusive ownership of one resource name. Released on `release` or drop.
pub struct GuardPermit {
    name: String,
    entered: Instant,
    recorder: Option<Arc<GuardRecorder>>,
    _guard: OwnedMutexGuard<()>,
}

impl GuardPermit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn release(self) {
        tracing::debug!("Released guard on '{}'", self.name);
    }
}

impl Drop for GuardPermit {
    fn drop(&mut self) {
        if let Some(recorder) = &self.recorder {
            recorder.record(GuardInterval {
                name: self.name.clone(),
                entered: self.entered,
                exited: Instant::now(),
            });
        }
    }
}
