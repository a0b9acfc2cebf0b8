//! Orchestration core of a distributed object-storage client.
//!
//! [`services::ObjectStorage`] drives a metadata service, a directory, blob
//! nodes, an account service and a cold-storage provider through the traits
//! in [`clients`]. Local implementations of those services (SQLite and the
//! filesystem) make the crate runnable as a standalone HTTP gateway.

pub mod clients;
pub mod config;
pub mod context;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

pub use context::RequestContext;
pub use errors::{OioError, OioResult};
pub use services::ObjectStorage;
