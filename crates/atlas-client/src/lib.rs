//! Typed client for the RIPE Atlas REST API (v2).
//!
//! Covers the three calls a one-off latency survey needs: listing probes,
//! creating measurements and downloading their results. Everything is behind
//! the [`AtlasApi`] trait so callers can swap in [`MockAtlasApi`] in tests.

mod client;
mod error;
pub mod types;

pub use client::{AtlasApi, AtlasClient, DEFAULT_BASE_URL, MockAtlasApi};
pub use error::{Error, Result, default_backoff, with_retry};
