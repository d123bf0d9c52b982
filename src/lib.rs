//! Graph Store Cluster Library
//!
//! A graph store made of cooperating server roles that talk only through
//! channel-addressed envelopes. Writes go to a single primary that persists
//! adjacency matrices under a per-name guard; reads go to secondaries that
//! load a stored graph and compute a parallel depth-first traversal. Bulk
//! payloads travel through a staging area keyed by session.
//!
//! ## Architecture Modules
//!
//! - **`protocol`**: Envelopes, channel numbers, the fixed-size frame codec
//!   and the in-process message bus.
//! - **`staging`**: Session-keyed bulk transfer area with consume-on-read
//!   semantics.
//! - **`guard`**: Lazily created per-name mutual exclusion for writers.
//! - **`storage`**: The adjacency matrix type and its on-disk text format.
//! - **`server`**: Router, primary and secondary roles, their per-request
//!   workers and the cluster that starts and drains them.
//! - **`client`**: The requester side of a session.
//! - **`config`** / **`error`**: Runtime settings and the error taxonomy.

pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod protocol;
pub mod server;
pub mod staging;
pub mod storage;
