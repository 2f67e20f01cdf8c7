//! Shared state and policy layer for the Crucible execution service.
//!
//! Everything the API and the worker must agree on lives here: the job and
//! result records, the Redis key semantics, the language registry, the
//! content cache, and the rate limiter. Keeping this in one crate ensures
//! the two binaries never drift.

pub mod cache;
pub mod config;
pub mod languages;
pub mod ratelimit;
pub mod redis;
pub mod types;
