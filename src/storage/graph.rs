use crate::error::{ClusterError, Result};

/// Square adjacency matrix of a graph, stored row-major.
///
/// An entry equal to `1` is an edge; any other value is treated as absent by
/// traversals but is persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjacencyMatrix {
    node_count: usize,
    entries: Vec<i32>,
}

impl AdjacencyMatrix {
    pub fn new(node_count: usize, entries: Vec<i32>) -> Result<Self> {
        let expected = node_count
            .checked_mul(node_count)
            .ok_or_else(|| ClusterError::protocol(format!("node count {} is too large", node_count)))?;
        if entries.len() != expected {
            return Err(ClusterError::protocol(format!(
                "{} nodes need {} matrix entries, got {}",
                node_count,
                expected,
                entries.len()
            )));
        }
        Ok(Self {
            node_count,
            entries,
        })
    }

    pub fn from_rows(rows: Vec<Vec<i32>>) -> Result<Self> {
        let node_count = rows.len();
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != node_count) {
            return Err(ClusterError::protocol(format!(
                "row {} has {} entries, expected {}",
                idx,
                row.len(),
                node_count
            )));
        }
        Self::new(node_count, rows.into_iter().flatten().collect())
    }

    /// Builds an undirected graph from an edge list.
    pub fn undirected(node_count: usize, edges: &[(usize, usize)]) -> Result<Self> {
        let mut entries = vec![0; node_count * node_count];
        for &(a, b) in edges {
            if a >= node_count || b >= node_count {
                return Err(ClusterError::protocol(format!(
                    "edge {}-{} is outside a {}-node graph",
                    a, b, node_count
                )));
            }
            entries[a * node_count + b] = 1;
            entries[b * node_count + a] = 1;
        }
        Self::new(node_count, entries)
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn entries(&self) -> &[i32] {
        &self.entries
    }

    pub fn row(&self, vertex: usize) -> &[i32] {
        let start = vertex * self.node_count;
        &self.entries[start..start + self.node_count]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[i32]> {
        // chunks(0) panics, and an empty matrix has no rows anyway
        self.entries.chunks(self.node_count.max(1))
    }

    /// Neighbours of `vertex` in ascending index order.
    pub fn neighbors(&self, vertex: usize) -> impl Iterator<Item = usize> + '_ {
        self.row(vertex)
            .iter()
            .enumerate()
            .filter(|&(_, &entry)| entry == 1)
            .map(|(idx, _)| idx)
    }
}
