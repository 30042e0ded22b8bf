//! Client IP middleware.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::net::client_ip;

/// The resolved client address. `None` when no public address was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub Option<IpAddr>);

impl ClientIp {
    /// Printable form for logs; empty when unknown.
    pub fn display(&self) -> String {
        self.0.map(|ip| ip.to_string()).unwrap_or_default()
    }
}

/// Resolve the client address from `check_headers` and the peer address and
/// attach it to the request as a [`ClientIp`] extension.
pub async fn resolve_client_ip(
    State(check_headers): State<Arc<[String]>>,
    mut req: Request,
    next: Next,
) -> Response {
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let ip = client_ip(req.headers(), &check_headers[..], remote);
    req.extensions_mut().insert(ClientIp(ip));
    next.run(req).await
}
