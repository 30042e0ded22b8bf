//! Request middleware.
//!
//! # Order (outermost first)
//! ```text
//! request id (set + propagate)
//!     → panic recovery (500)
//!     → client_ip.rs (ClientIp extension)
//!     → request trace span + response log
//!     → instrument.rs (spans and request metrics, when telemetry is on)
//!     → request timeout (408) → body read/write timeouts
//!     → handler
//! ```

pub mod client_ip;
pub mod instrument;

pub use client_ip::{resolve_client_ip, ClientIp};
pub use instrument::instrument;
