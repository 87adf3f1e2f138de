//! WebSocket connection registry and state machine.
//!
//! # Responsibilities
//! - Track live connections by id (CONNECTING → OPEN → CLOSED)
//! - Deliver outbound frames to one connection or to all open ones
//! - Answer enumeration and metadata queries for the management API
//! - Close connections on explicit disconnect or shutdown
//!
//! # Design Decisions
//! - Each connection owns an unbounded mpsc sender feeding its socket writer
//!   task, so sends never await and never hold a map shard across I/O
//! - Records are purged on entry to CLOSED; CLOSED is terminal
//! - Only OPEN connections receive application frames

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::events::ids::generate_connection_id;
use crate::events::{ConnectionDetails, RequestIdentity, UpgradeRequest};
use crate::observability::metrics;

/// Close code used when the server shuts down.
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close code used for an explicit management API disconnect.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code used when the CONNECT route rejects a connection.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Close code used when the CONNECT route fails.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgraded, CONNECT route still running.
    Connecting,
    /// Accepted; receives application frames.
    Open,
    /// Terminal.
    Closed,
}

/// A frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Binary(Vec<u8>),
    Close { code: u16, reason: String },
}

impl OutboundFrame {
    /// Text when the payload is valid UTF-8, binary otherwise.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        match String::from_utf8(bytes.into()) {
            Ok(text) => OutboundFrame::Text(text),
            Err(err) => OutboundFrame::Binary(err.into_bytes()),
        }
    }
}

impl From<String> for OutboundFrame {
    fn from(text: String) -> Self {
        OutboundFrame::Text(text)
    }
}

impl From<&str> for OutboundFrame {
    fn from(text: &str) -> Self {
        OutboundFrame::Text(text.to_string())
    }
}

/// A tracked connection.
#[derive(Debug)]
pub struct ConnectionRecord {
    pub id: String,
    seq: u64,
    pub connected_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub state: ConnectionState,
    pub route_key: Option<String>,
    pub upgrade: Arc<UpgradeRequest>,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
}

impl ConnectionRecord {
    fn deliver(&self, frame: OutboundFrame) -> bool {
        self.outbound.send(frame).is_ok()
    }
}

/// Entry in the connection listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub connection_id: String,
    pub connected_at: DateTime<Utc>,
}

/// Metadata for one connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub connection_id: String,
    pub connected_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    /// Route key selected by the most recent inbound frame.
    pub last_route_key: Option<String>,
    pub identity: RequestIdentity,
}

/// In-memory table of live connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionRecord>,
    next_seq: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly upgraded connection in the CONNECTING state.
    pub fn register(
        &self,
        upgrade: Arc<UpgradeRequest>,
        outbound: mpsc::UnboundedSender<OutboundFrame>,
    ) -> ConnectionDetails {
        let now = Utc::now();
        let mut id = generate_connection_id();
        while self.connections.contains_key(&id) {
            id = generate_connection_id();
        }

        let record = ConnectionRecord {
            id: id.clone(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            connected_at: now,
            last_active_at: now,
            state: ConnectionState::Connecting,
            route_key: None,
            upgrade: Arc::clone(&upgrade),
            outbound,
        };
        self.connections.insert(id.clone(), record);
        metrics::set_websocket_connections(self.connections.len());

        tracing::debug!(connection_id = %id, "Connection registered");

        ConnectionDetails {
            connection_id: id,
            connected_at_ms: now.timestamp_millis(),
            upgrade,
        }
    }

    /// CONNECTING → OPEN. Returns false if the record is gone.
    pub fn mark_open(&self, id: &str) -> bool {
        match self.connections.get_mut(id) {
            Some(mut record) if record.state == ConnectionState::Connecting => {
                record.state = ConnectionState::Open;
                true
            }
            Some(record) => record.state == ConnectionState::Open,
            None => false,
        }
    }

    /// Record inbound activity and the route key it selected.
    pub fn touch(&self, id: &str, route_key: &str) {
        if let Some(mut record) = self.connections.get_mut(id) {
            record.last_active_at = Utc::now();
            record.route_key = Some(route_key.to_string());
        }
    }

    pub fn state(&self, id: &str) -> Option<ConnectionState> {
        self.connections.get(id).map(|record| record.state)
    }

    /// Queue a frame for one open connection.
    ///
    /// Returns false without error when the id is unknown or not open.
    pub fn send_to_one(&self, id: &str, frame: impl Into<OutboundFrame>) -> bool {
        let Some(record) = self.connections.get(id) else {
            return false;
        };
        if record.state != ConnectionState::Open {
            return false;
        }
        let delivered = record.deliver(frame.into());
        if !delivered {
            tracing::warn!(connection_id = %id, "Connection writer gone; frame dropped");
        }
        delivered
    }

    /// Queue a frame for every open connection; returns successful sends.
    pub fn broadcast(&self, frame: impl Into<OutboundFrame>) -> usize {
        let frame = frame.into();
        let mut sent = 0;
        for record in self.connections.iter() {
            if record.state != ConnectionState::Open {
                continue;
            }
            if record.deliver(frame.clone()) {
                sent += 1;
            } else {
                tracing::warn!(connection_id = %record.id, "Broadcast to connection failed");
            }
        }
        sent
    }

    /// Connections in registration order.
    pub fn list(&self) -> Vec<ConnectionSummary> {
        let mut entries: Vec<(u64, ConnectionSummary)> = self
            .connections
            .iter()
            .map(|record| {
                (
                    record.seq,
                    ConnectionSummary {
                        connection_id: record.id.clone(),
                        connected_at: record.connected_at,
                    },
                )
            })
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, summary)| summary).collect()
    }

    pub fn info(&self, id: &str) -> Option<ConnectionInfo> {
        self.connections.get(id).map(|record| ConnectionInfo {
            connection_id: record.id.clone(),
            connected_at: record.connected_at,
            last_active_at: record.last_active_at,
            last_route_key: record.route_key.clone(),
            identity: record.upgrade.identity.clone(),
        })
    }

    /// Close and purge a connection. Returns false if it was already gone.
    pub fn disconnect(&self, id: &str, code: u16, reason: &str) -> bool {
        match self.remove(id) {
            Some(mut record) => {
                record.state = ConnectionState::Closed;
                record.deliver(OutboundFrame::Close {
                    code,
                    reason: reason.to_string(),
                });
                tracing::debug!(connection_id = %id, code, reason, "Connection closed by server");
                true
            }
            None => false,
        }
    }

    /// Purge a record without sending anything.
    pub fn remove(&self, id: &str) -> Option<ConnectionRecord> {
        let removed = self.connections.remove(id).map(|(_, record)| record);
        if removed.is_some() {
            metrics::set_websocket_connections(self.connections.len());
        }
        removed
    }

    /// Close every tracked connection; returns how many were closed.
    pub fn close_all(&self, code: u16, reason: &str) -> usize {
        let ids: Vec<String> = self
            .connections
            .iter()
            .map(|record| record.id.clone())
            .collect();
        ids.iter()
            .filter(|id| self.disconnect(id, code, reason))
            .count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
