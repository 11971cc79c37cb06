//! Service plumbing shared by Hooki binaries: configuration loading, tracing,
//! request-id middleware, health endpoints and serde helpers.

pub mod config;
pub mod health;
pub mod middleware;
pub mod serde;
pub mod tracing;
