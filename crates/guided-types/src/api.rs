use serde::{Deserialize, Serialize};

use crate::models::Message;

// -- History --

/// Envelope returned by `GET /api/group/getAllChats/{roomId}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub status: String,
    #[serde(default)]
    pub chats: Vec<Message>,
}

impl HistoryResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

// -- AI hand-off --

/// What crosses the AI boundary. `message` is absent when the user opened the
/// AI view without picking a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
