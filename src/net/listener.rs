//! TCP listener binding.
//!
//! # Responsibilities
//! - Resolve the configured host/port and bind one listener
//! - Report "port in use" and "permission denied" as distinct startup errors

use std::io::ErrorKind;
use std::net::SocketAddr;

use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Another process already holds the address.
    AddressInUse(String),
    /// The process may not bind this address (privileged port, sandbox).
    PermissionDenied(String),
    /// Any other bind or resolution failure.
    Bind(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::AddressInUse(addr) => {
                write!(f, "Port already in use: {} (is another gateway running?)", addr)
            }
            ListenerError::PermissionDenied(addr) => {
                write!(f, "Permission denied binding to {}", addr)
            }
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind(e) => Some(e),
            _ => None,
        }
    }
}

impl ListenerError {
    fn from_io(addr: &str, err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::AddrInUse => ListenerError::AddressInUse(addr.to_string()),
            ErrorKind::PermissionDenied => ListenerError::PermissionDenied(addr.to_string()),
            _ => ListenerError::Bind(err),
        }
    }
}

/// Bind a listener on `host:port`. Port 0 picks an ephemeral port.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ListenerError::from_io(&addr, e))?;

    let local_addr: SocketAddr = listener.local_addr().map_err(ListenerError::Bind)?;
    tracing::info!(address = %local_addr, "Listener bound");

    Ok(listener)
}
