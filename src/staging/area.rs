//! Session-Keyed Staging Area
//!
//! Holds payloads too large for an envelope. A segment is keyed by session id,
//! created by the first `open`, and removed once every party has closed it and
//! its payload has been consumed.
//!
//! ## Lifecycle of one request
//! 1. The client opens the segment and writes the request payload.
//! 2. The worker opens the same segment, reads (consumes) the payload and,
//!    for traversals, writes the output back.
//! 3. Both sides close; the last close of an empty segment removes it.
//!
//! Payloads are tagged with the request id that staged them. A party only
//! reads a payload of its own request, and writes from an older request than
//! the one last staged are refused, so a redelivered or timed-out request
//! never touches a newer request's data. A requester that gives up abandons
//! its request: the payload is dropped and late writes for it are refused, so
//! the segment is still removed once both sides close.

use super::payload;
use crate::error::{ClusterError, Result};
use crate::protocol::types::SessionId;
use crate::storage::graph::AdjacencyMatrix;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct Segment {
    words: Vec<i32>,
    /// Request that staged `words`, or was last abandoned.
    request: u64,
    abandoned: bool,
    attached: usize,
}

pub struct StagingArea {
    segments: DashMap<SessionId, Segment>,
    /// Live segment count, kept outside the map so `open` never has to lock
    /// every shard while holding an entry.
    live: AtomicUsize,
    capacity: usize,
}

impl StagingArea {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            segments: DashMap::new(),
            live: AtomicUsize::new(0),
            capacity,
        })
    }

    /// Attaches to the session's segment, creating it if absent.
    ///
    /// Fails with `ResourceUnavailable` when creating it would exceed the
    /// configured capacity.
    pub fn open(self: &Arc<Self>, session: SessionId) -> Result<StagingHandle> {
        self.open_for(session, 0)
    }

    /// Like `open`, for the party serving or issuing request `request`.
    pub fn open_for(self: &Arc<Self>, session: SessionId, request: u64) -> Result<StagingHandle> {
        match self.segments.entry(session) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().attached += 1;
            }
            Entry::Vacant(vacant) => {
                let previous = self.live.fetch_add(1, Ordering::AcqRel);
                if previous >= self.capacity {
                    self.live.fetch_sub(1, Ordering::AcqRel);
                    return Err(ClusterError::ResourceUnavailable {
                        session: session.get(),
                        reason: format!("all {} staging segments in use", self.capacity),
                    });
                }
                vacant.insert(Segment {
                    attached: 1,
                    ..Segment::default()
                });
                tracing::trace!("Created staging segment for session {}", session);
            }
        }

        Ok(StagingHandle {
            area: self.clone(),
            session,
            request,
            closed: false,
        })
    }

    pub fn live_segments(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn contains(&self, session: SessionId) -> bool {
        self.segments.contains_key(&session)
    }

    fn write(&self, session: SessionId, request: u64, words: Vec<i32>) -> Result<()> {
        let mut segment = self
            .segments
            .get_mut(&session)
            .ok_or_else(|| missing_segment(session))?;
        if request < segment.request {
            return Err(ClusterError::protocol(format!(
                "session {} request {} is stale, request {} is staged",
                session, request, segment.request
            )));
        }
        if request == segment.request && segment.abandoned {
            return Err(ClusterError::protocol(format!(
                "session {} request {} was abandoned by its sender",
                session, request
            )));
        }
        segment.request = request;
        segment.abandoned = false;
        segment.words = words;
        Ok(())
    }

    fn take(&self, session: SessionId, request: u64) -> Result<Vec<i32>> {
        let mut segment = self
            .segments
            .get_mut(&session)
            .ok_or_else(|| missing_segment(session))?;
        if segment.words.is_empty() || segment.request != request {
            return Err(ClusterError::protocol(format!(
                "no payload staged for session {} request {}",
                session, request
            )));
        }
        Ok(std::mem::take(&mut segment.words))
    }

    fn abandon(&self, session: SessionId, request: u64) {
        if let Some(mut segment) = self.segments.get_mut(&session) {
            if request >= segment.request {
                segment.request = request;
                segment.abandoned = true;
                segment.words.clear();
            }
        }
    }

    fn detach(&self, session: SessionId) {
        if let Entry::Occupied(mut occupied) = self.segments.entry(session) {
            let segment = occupied.get_mut();
            segment.attached = segment.attached.saturating_sub(1);
            if segment.attached == 0 && segment.words.is_empty() {
                occupied.remove();
                self.live.fetch_sub(1, Ordering::AcqRel);
                tracing::trace!("Released staging segment for session {}", session);
            }
        }
    }
}

fn missing_segment(session: SessionId) -> ClusterError {
    ClusterError::ResourceUnavailable {
        session: session.get(),
        reason: "segment is not open".to_string(),
    }
}

/// One party's attachment to a session segment. Detaches on `close` or drop.
pub struct StagingHandle {
    area: Arc<StagingArea>,
    session: SessionId,
    request: u64,
    closed: bool,
}

impl StagingHandle {
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn request(&self) -> u64 {
        self.request
    }

    /// Replaces the segment's words with this request's payload.
    pub fn write(&self, words: Vec<i32>) -> Result<()> {
        self.area.write(self.session, self.request, words)
    }

    /// Moves this request's staged words out, leaving the segment empty.
    pub fn read(&self) -> Result<Vec<i32>> {
        self.area.take(self.session, self.request)
    }

    /// Gives up on this request: staged words are dropped and later writes
    /// for it are refused.
    pub fn abandon(&self) {
        self.area.abandon(self.session, self.request);
    }

    pub fn write_graph(&self, matrix: &AdjacencyMatrix) -> Result<u32> {
        let words = payload::encode_graph(matrix);
        let len = words.len() as u32;
        self.write(words)?;
        Ok(len)
    }

    pub fn read_graph(&self) -> Result<AdjacencyMatrix> {
        payload::decode_graph(&self.read()?)
    }

    pub fn write_start_vertex(&self, vertex: u32) -> Result<u32> {
        self.write(payload::encode_start_vertex(vertex))?;
        Ok(1)
    }

    pub fn read_start_vertex(&self) -> Result<u32> {
        payload::decode_start_vertex(&self.read()?)
    }

    pub fn write_traversal(&self, order: &[u32]) -> Result<()> {
        self.write(payload::encode_traversal(order))
    }

    pub fn read_traversal(&self) -> Result<Vec<u32>> {
        payload::decode_traversal(&self.read()?)
    }

    pub fn close(mut self) {
        self.detach_once();
    }

    fn detach_once(&mut self) {
        if !self.closed {
            self.closed = true;
            self.area.detach(self.session);
        }
    }
}

impl Drop for StagingHandle {
    fn drop(&mut self) {
        self.detach_once();
    }
}
