use serde::{Deserialize, Serialize};

use crate::models::{ChannelId, RoomId, UserId};

/// Body of an outgoing `chat` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub message: String,
    pub group: RoomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelId>,
    pub sender: UserId,
}

/// Inbound `chat` notice. Only `group` is interpreted; everything else the
/// server attaches is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatNotice {
    #[serde(default)]
    pub group: Option<RoomId>,
}

/// Outcome the server reports for a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Error,
}

/// Frames sent FROM the server TO the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Something changed in a room
    Chat(ChatNotice),

    /// Acknowledgement for a previously sent command
    Ack { ack: u64, status: AckStatus },
}

/// Frames sent FROM the client TO the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Post a chat message. The server answers with an `Ack` carrying the
    /// same `ack` id.
    Chat { ack: u64, payload: ChatPayload },
}
