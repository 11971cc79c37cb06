//! Test utilities for Hooki services.
//!
//! Provides flow graph builders and an independent webhook signer.
//! Import from `[dev-dependencies]` only, never in production code.

pub mod graph;
pub mod signature;
