//! Word layouts of the staged payloads.
//!
//! - write path: `[n][n * n row-major entries]`
//! - traverse input: `[start_vertex]`
//! - traverse output: `[v0, v1, ..., TRAVERSAL_SENTINEL]`

use crate::error::{ClusterError, Result};
use crate::protocol::types::TRAVERSAL_SENTINEL;
use crate::storage::graph::AdjacencyMatrix;

pub fn encode_graph(matrix: &AdjacencyMatrix) -> Vec<i32> {
    let mut words = Vec::with_capacity(1 + matrix.entries().len());
    words.push(matrix.node_count() as i32);
    words.extend_from_slice(matrix.entries());
    words
}

pub fn decode_graph(words: &[i32]) -> Result<AdjacencyMatrix> {
    let (&count, entries) = words
        .split_first()
        .ok_or_else(|| ClusterError::protocol("graph payload is empty"))?;
    let node_count = usize::try_from(count)
        .map_err(|_| ClusterError::protocol(format!("negative node count {}", count)))?;
    AdjacencyMatrix::new(node_count, entries.to_vec())
}

pub fn encode_start_vertex(vertex: u32) -> Vec<i32> {
    vec![vertex as i32]
}

pub fn decode_start_vertex(words: &[i32]) -> Result<u32> {
    match words {
        [vertex] if *vertex >= 0 => Ok(*vertex as u32),
        [vertex] => Err(ClusterError::protocol(format!(
            "negative start vertex {}",
            vertex
        ))),
        other => Err(ClusterError::protocol(format!(
            "start vertex payload has {} words, expected 1",
            other.len()
        ))),
    }
}

pub fn encode_traversal(order: &[u32]) -> Vec<i32> {
    let mut words: Vec<i32> = order.iter().map(|&v| v as i32).collect();
    words.push(TRAVERSAL_SENTINEL);
    words
}

/// Reads vertices up to the sentinel. Words after the sentinel are ignored.
pub fn decode_traversal(words: &[i32]) -> Result<Vec<u32>> {
    let end = words
        .iter()
        .position(|&w| w == TRAVERSAL_SENTINEL)
        .ok_or_else(|| ClusterError::protocol("traversal output is missing its sentinel"))?;

    words[..end]
        .iter()
        .map(|&w| {
            u32::try_from(w)
                .map_err(|_| ClusterError::protocol(format!("invalid vertex {} in traversal", w)))
        })
        .collect()
}
