//! Network address helpers.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → client_ip.rs (forwarding headers, right to left, first public address)
//!     → peer address fallback
//!     → ClientIp extension for handlers and request logs
//! ```

pub mod client_ip;

pub use client_ip::{client_ip, is_global_unicast, is_private, is_public, DEFAULT_HEADERS};
