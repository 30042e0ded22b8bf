//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (0.0.0.0:<server.port>)
//!     → server.rs (Axum setup, graceful drain, force close)
//!     → middleware/ (request id, panic recovery, client IP, tracing, telemetry, timeouts)
//!     → routes.rs (handlers registered before the listener starts)
//!     → Send to client
//! ```

pub mod middleware;
pub mod routes;
pub mod server;

pub use middleware::ClientIp;
pub use routes::{register_bundles, RouteBundle, RouteRegistry};
pub use server::{HttpServer, ServerSettings, ServerState, X_REQUEST_ID};
