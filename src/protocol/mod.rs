//! Session Protocol Module
//!
//! Defines the envelope every role exchanges and the channel-addressing
//! convention that routes it.
//!
//! ## Addressing
//! - **Well-known channels**: one per server role (load balancer, primary, and
//!   one per secondary instance), all inside a reserved range.
//! - **Reply channels**: a reply is addressed to the requester's session id,
//!   so the flat address space still keeps concurrent sessions apart.
//! - **Affinity**: read requests pick a secondary with a deterministic
//!   function of the session id.
//!
//! ## Submodules
//! - **`types`**: Envelope, operation codes, session ids, the fixed-layout frame codec.
//! - **`bus`**: The in-process, channel-addressed queue the frames travel on.

pub mod bus;
pub mod types;

#[cfg(test)]
mod tests;
