//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers)
//!     → pipeline.rs (correlation, root span, "received" log)
//!     → handlers.rs (route logic, backend calls)
//!     → response.rs (error taxonomy → status + JSON body)
//!     → pipeline.rs (finalize: metrics, root span, "completed" log)
//!     → Send to client
//! ```

pub mod handlers;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::{AppError, Failure, FailureKind};
pub use server::{AppState, HttpServer};
