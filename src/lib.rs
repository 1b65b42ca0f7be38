//! Floodgate - Identifier-Scoped Request Rate Limiting
//!
//! This crate implements a thread-safe, in-process rate limiter that tracks
//! request budgets independently per caller-supplied identifier (a user id,
//! API key, client IP, and so on). It supports token bucket, fixed window,
//! and sliding window accounting, keeps memory bounded through idle-entry
//! eviction, and accepts an injected clock for deterministic testing.

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
