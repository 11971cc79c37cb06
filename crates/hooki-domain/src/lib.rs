//! Domain types shared across Hooki services.
//!
//! Flow graphs, lifecycle statuses and the events published while a webhook
//! is processed. Pure types with no framework dependencies.

pub mod event;
pub mod graph;
pub mod pagination;
pub mod status;
