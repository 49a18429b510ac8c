//! Downstream backend subsystem.
//!
//! # Data Flow
//! ```text
//! Route handler
//!     → client.rs (child span, context injection, per-route timeout)
//!     → backend service (GET /products, GET /slow)
//!     → BackendResponse | BackendError
//! ```
//!
//! # Design Decisions
//! - One attempt per call, no retries
//! - Timeouts, transport errors and non-2xx statuses are all failures
//! - The child span is always finished before the result is returned

pub mod client;

pub use client::{BackendClient, BackendError, BackendResponse, DownstreamRoute};
