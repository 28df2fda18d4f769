//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request id, tracing, timeout, body limit)
//!     → middleware/caller.rs (X-User-Id → Caller, x-request-id → correlation id)
//!     → handlers.rs (JSON in, engine call, JSON out)
//!     → errors.rs (DispatchError → status code)
//! ```

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use server::{ApiServer, AppState};
