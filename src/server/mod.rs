//! Server Roles Module
//!
//! The long-running roles of the cluster. Each role owns a well-known channel,
//! runs a single listener and hands every accepted request to its own worker.
//!
//! ## Architecture Overview
//! 1. **Routing**: Clients send to the load-balancer channel. The `router`
//!    forwards writes to the primary and traversals to a secondary chosen by
//!    session affinity.
//! 2. **Dispatching**: A listener decodes the envelope and spawns a worker; it
//!    never waits for workers except while draining.
//! 3. **Replying**: The worker replies on the session's private channel once
//!    its effects are durable and visible.
//! 4. **Draining**: Cleanup makes every listener join its outstanding workers
//!    and stop.
//!
//! ## Submodules
//! - **`router`**: Entry channel consumer and Cleanup fan-out.
//! - **`primary`**: Guarded writes of graph files.
//! - **`secondary`**: Read-only traversal service.
//! - **`traversal`**: The parallel depth-first search.
//! - **`worker`**: Per-request tasks and the drain report.
//! - **`cluster`**: Starts and stops a full set of roles.

pub mod cluster;
pub mod primary;
pub mod router;
pub mod secondary;
pub mod traversal;
pub mod worker;
