//! Packet model for the wire protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Protocol version tag attached to every outbound invocation.
pub const PROTOCOL_VERSION: &str = "5.3.0";

/// Response status codes on the wire.
pub mod status {
    /// Call succeeded.
    pub const OK: u8 = 20;
    /// Request timed out on the server side.
    pub const SERVER_TIMEOUT: u8 = 31;
    /// Malformed request.
    pub const BAD_REQUEST: u8 = 40;
    /// No such service on the peer.
    pub const SERVICE_NOT_FOUND: u8 = 60;
    /// Service implementation raised an unexpected error.
    pub const SERVICE_ERROR: u8 = 70;
    /// Internal server error.
    pub const SERVER_ERROR: u8 = 80;
}

/// A method invocation carried by a request packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Name of the remote method.
    pub method_name: String,
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Per-call metadata (service path, interface, version, timeout, ...).
    pub attachments: HashMap<String, String>,
}

/// A request packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, unique among the owning connection's in-flight ids.
    pub id: i64,
    /// Event packets carry no invocation; a bare event is a heartbeat.
    pub event: bool,
    /// The invocation payload, absent for events.
    pub invocation: Option<Invocation>,
}

impl Request {
    /// Create an invocation request.
    #[must_use]
    pub const fn new(id: i64, invocation: Invocation) -> Self {
        Self {
            id,
            event: false,
            invocation: Some(invocation),
        }
    }

    /// Create a heartbeat probe.
    #[must_use]
    pub const fn heartbeat(id: i64) -> Self {
        Self {
            id,
            event: true,
            invocation: None,
        }
    }

    /// Whether this request is a heartbeat probe.
    #[must_use]
    pub const fn is_heartbeat(&self) -> bool {
        self.event && self.invocation.is_none()
    }
}

/// Result payload of a response packet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcResult {
    /// The return value, absent for void methods.
    pub value: Option<Value>,
    /// Business exception raised by the remote implementation.
    pub exception: Option<String>,
}

/// A response packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id echoed from the request.
    pub id: i64,
    /// Protocol status, [`status::OK`] on success.
    pub status: u8,
    /// Server-supplied message for non-OK statuses.
    pub error_msg: Option<String>,
    /// Event responses acknowledge heartbeats and carry no result.
    pub event: bool,
    /// The result payload, absent for events and failures.
    pub result: Option<RpcResult>,
}

impl Response {
    /// Create a successful response carrying `result`.
    #[must_use]
    pub const fn new(id: i64, result: RpcResult) -> Self {
        Self {
            id,
            status: status::OK,
            error_msg: None,
            event: false,
            result: Some(result),
        }
    }

    /// Create a heartbeat acknowledgement echoing `id`.
    #[must_use]
    pub const fn heartbeat(id: i64) -> Self {
        Self {
            id,
            status: status::OK,
            error_msg: None,
            event: true,
            result: None,
        }
    }

    /// Whether the protocol status indicates success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status == status::OK
    }
}

/// A decoded inbound packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    /// An inbound request (heartbeat probe or peer-initiated call).
    Request(Request),
    /// A response to one of our requests.
    Response(Response),
}

impl Packet {
    /// Correlation id of the packet.
    #[must_use]
    pub const fn id(&self) -> i64 {
        match self {
            Self::Request(request) => request.id,
            Self::Response(response) => response.id,
        }
    }

    /// Whether this packet is a response.
    #[must_use]
    pub const fn is_response(&self) -> bool {
        matches!(self, Self::Response(_))
    }

    /// Whether this packet is an event (heartbeat or heartbeat ack).
    #[must_use]
    pub const fn is_event(&self) -> bool {
        match self {
            Self::Request(request) => request.event,
            Self::Response(response) => response.event,
        }
    }
}
