//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Drain requests → Flush tracer → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, flush spans
//! - The tracer flush has a deadline; pending spans are dropped after it

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
