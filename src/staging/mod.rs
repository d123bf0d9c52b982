//! Bulk Transfer Module
//!
//! Out-of-band storage for request and response payloads, keyed by session.
//! Replaces a host-wide shared-memory segment with an in-process map whose
//! reads move the payload out, so each payload is consumed exactly once.
//!
//! ## Submodules
//! - **`area`**: The keyed segment map and per-party handles.
//! - **`payload`**: The int32 word layouts of graph, start-vertex and traversal payloads.

pub mod area;
pub mod payload;

#[cfg(test)]
mod tests;
