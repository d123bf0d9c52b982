//! Graph File Store
//!
//! Persists one graph per resource name under a data directory, in a plain
//! text format:
//!
//! ```text
//! 3
//! 0 1 0
//! 1 0 1
//! 0 1 0
//! ```
//!
//! Line one is the node count; each following line is one matrix row.
//! Writers must hold the resource guard; readers assume the file is at rest.

use super::graph::AdjacencyMatrix;
use crate::error::{ClusterError, Result};
use crate::protocol::types::ResourceName;

use std::fmt::Write as _;
use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone)]
pub struct GraphFileStore {
    data_dir: PathBuf,
}

impl GraphFileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path_for(&self, name: &ResourceName) -> PathBuf {
        self.data_dir.join(name.as_str())
    }

    /// Writes the matrix and flushes it to disk before returning.
    pub async fn write(&self, name: &ResourceName, matrix: &AdjacencyMatrix) -> Result<()> {
        let path = self.path_for(name);

        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| ClusterError::io_with_path(e, &self.data_dir))?;

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| ClusterError::io_with_path(e, &path))?;
        file.write_all(render(matrix).as_bytes())
            .await
            .map_err(|e| ClusterError::io_with_path(e, &path))?;
        file.sync_all()
            .await
            .map_err(|e| ClusterError::io_with_path(e, &path))?;

        tracing::debug!(
            "Wrote {}-node graph to {}",
            matrix.node_count(),
            path.display()
        );
        Ok(())
    }

    pub async fn read(&self, name: &ResourceName) -> Result<AdjacencyMatrix> {
        let path = self.path_for(name);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ClusterError::io_with_path(e, &path))?;
        parse(&text).map_err(|e| ClusterError::io_with_path(e, &path))
    }

    pub async fn exists(&self, name: &ResourceName) -> bool {
        tokio::fs::try_exists(self.path_for(name))
            .await
            .unwrap_or(false)
    }
}

/// Renders a matrix in the on-disk text format.
pub fn render(matrix: &AdjacencyMatrix) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", matrix.node_count());
    for row in matrix.rows() {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        let _ = writeln!(out, "{}", line.join(" "));
    }
    out
}

/// Parses the on-disk text format.
///
/// Any whitespace separates values, so files written with trailing spaces
/// parse the same.
pub fn parse(text: &str) -> std::io::Result<AdjacencyMatrix> {
    let mut tokens = text.split_whitespace();

    let node_count: usize = tokens
        .next()
        .ok_or_else(|| invalid("graph file is empty"))?
        .parse()
        .map_err(|e| invalid(format!("bad node count: {}", e)))?;

    let expected = node_count
        .checked_mul(node_count)
        .ok_or_else(|| invalid(format!("node count {} is too large", node_count)))?;
    // The header is untrusted; never reserve more than the text can hold
    let mut entries = Vec::with_capacity(expected.min(text.len() / 2 + 1));
    for token in tokens.by_ref().take(expected) {
        let value: i32 = token
            .parse()
            .map_err(|e| invalid(format!("bad matrix entry '{}': {}", token, e)))?;
        entries.push(value);
    }

    if entries.len() != expected {
        return Err(invalid(format!(
            "expected {} matrix entries, found {}",
            expected,
            entries.len()
        )));
    }
    if tokens.next().is_some() {
        return Err(invalid("trailing data after matrix"));
    }

    AdjacencyMatrix::new(node_count, entries).map_err(|e| invalid(e.to_string()))
}

fn invalid(message: impl Into<String>) -> IoError {
    IoError::new(ErrorKind::InvalidData, message.into())
}
