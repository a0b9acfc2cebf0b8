//! Core data models of the orchestration layer.
//!
//! Every record here is a request-scoped value: the backends are the only
//! durable store. Types serialize as JSON via `serde` so the HTTP gateway and
//! the local backends can exchange them directly.

pub mod chunk;
pub mod container;
pub mod listing;
pub mod object;
