//! Parallel Depth-First Traversal
//!
//! One traversal owns a context holding the graph and a guarded visit state.
//! Exploring a vertex scans its neighbours in ascending order; every
//! neighbour that is still unvisited is marked and recorded under the lock,
//! then explored on a child task. A vertex returns only after all of its
//! children have returned.
//!
//! Order guarantee: a vertex is recorded before anything discovered through
//! it. The interleaving of sibling branches is unspecified.

use crate::error::{ClusterError, Result};
use crate::protocol::types::SessionId;
use crate::storage::graph::AdjacencyMatrix;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

type ExploreFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

struct VisitState {
    visited: Vec<bool>,
    order: Vec<u32>,
}

pub struct TraversalContext {
    session: SessionId,
    matrix: AdjacencyMatrix,
    state: Mutex<VisitState>,
}

impl TraversalContext {
    fn new(session: SessionId, matrix: AdjacencyMatrix) -> Arc<Self> {
        let n = matrix.node_count();
        Arc::new(Self {
            session,
            matrix,
            state: Mutex::new(VisitState {
                visited: vec![false; n],
                order: Vec::with_capacity(n),
            }),
        })
    }

    /// Marks `vertex` visited and records it. False if it was already taken.
    async fn claim(&self, vertex: usize) -> bool {
        let mut state = self.state.lock().await;
        if state.visited[vertex] {
            return false;
        }
        state.visited[vertex] = true;
        state.order.push(vertex as u32);
        true
    }
}

/// Visits every vertex reachable from `start` exactly once.
pub async fn depth_first(
    session: SessionId,
    matrix: AdjacencyMatrix,
    start: u32,
) -> Result<Vec<u32>> {
    let n = matrix.node_count();
    if start as usize >= n {
        return Err(ClusterError::protocol(format!(
            "start vertex {} out of range for graph of {} nodes",
            start, n
        )));
    }

    let context = TraversalContext::new(session, matrix);
    context.claim(start as usize).await;
    explore(context.clone(), start as usize).await?;

    let state = context.state.lock().await;
    Ok(state.order.clone())
}

fn explore(context: Arc<TraversalContext>, vertex: usize) -> ExploreFuture {
    Box::pin(async move {
        let neighbors: Vec<usize> = context.matrix.neighbors(vertex).collect();
        let mut children = Vec::new();

        for neighbor in neighbors {
            if context.claim(neighbor).await {
                children.push(tokio::spawn(explore(context.clone(), neighbor)));
            }
        }

        join_branches(context.session, children).await
    })
}

/// Joins every branch, then reports the first failure among them.
pub(crate) async fn join_branches(
    session: SessionId,
    branches: Vec<JoinHandle<Result<()>>>,
) -> Result<()> {
    let mut first_error = None;
    for branch in branches {
        let outcome = match branch.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Traversal for session {} lost a branch: {}", session, e);
                Err(ClusterError::WorkerPanicked {
                    session: session.get(),
                })
            }
        };
        if let Err(e) = outcome {
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
