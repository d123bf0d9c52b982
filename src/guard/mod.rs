//! Resource Guard Module
//!
//! Serializes writers of the same durable resource. Guards are keyed by
//! resource name, created on first use, and held through an RAII permit.
//!
//! ## Behaviour
//! - **Exclusion**: at most one permit per name exists at a time.
//! - **Independence**: permits for different names never wait on each other.
//! - **Bounded wait**: acquisition gives up with a retryable `GuardTimeout`.
//! - **Instrumentation**: an optional recorder keeps every hold interval.

pub mod table;
