//! Graph Storage Module
//!
//! The durable side of the cluster: the adjacency matrix type and the file
//! store that persists one graph per resource name.
//!
//! ## Core Concepts
//! - **Matrix**: `AdjacencyMatrix` is square and row-major; an entry of `1` is an edge.
//! - **Format**: node count on line one, then one space-separated row per line.
//! - **Flushing**: a write returns only after the file is synced, so a reply
//!   sent afterwards implies the graph is visible to later readers.

pub mod file;
pub mod graph;
