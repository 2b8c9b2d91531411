use std::time::Duration;

use thiserror::Error;

/// Failure to bring the gateway link up.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("gateway did not answer within {0:?}")]
    Timeout(Duration),
    #[error("websocket handshake failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    #[error("connection released while connecting")]
    Cancelled,
}

/// Why a published chat event did not get an `ok` ack.
///
/// Every publish resolves to exactly one of these or `Ok(())`; transport
/// faults are folded in here instead of leaving the caller waiting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("not connected: {0}")]
    NotConnected(String),
    #[error("connection closed before the server acknowledged the message")]
    LinkClosed,
    #[error("no acknowledgement within {0:?}")]
    AckTimeout(Duration),
    #[error("server rejected the message")]
    Rejected,
}

/// History fetch failure. The displayed history is left as it was.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend answered {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed history body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("backend reported status '{0}'")]
    Rejected(String),
}

/// Local validation failures on send. These are not surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendRejected {
    #[error("message is empty")]
    Empty,
    #[error("another message is still being sent")]
    InFlight,
    #[error("no active room")]
    NoActiveRoom,
}
