use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

opaque_id!(
    /// A chat group. The real-time channel is multiplexed by this key.
    RoomId
);
opaque_id!(
    /// A channel inside a group.
    ChannelId
);
opaque_id!(
    /// The local user's identity. Only used to tell "mine" from "theirs".
    UserId
);

/// A chat message as returned by the history endpoint.
///
/// The backend denormalizes `senderName` into each entry; the real-time
/// notice does not carry it, which is why the client re-fetches instead of
/// appending notices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender: UserId,
    #[serde(default)]
    pub sender_name: String,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelId>,
    #[serde(default, alias = "createdAt", skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

/// Which side of the conversation a message is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    /// Sent by the local user (right-aligned).
    Mine,
    /// Sent by anyone else (left-aligned).
    Other,
}

impl Message {
    pub fn is_from(&self, user: &UserId) -> bool {
        self.sender == *user
    }

    pub fn alignment_for(&self, user: &UserId) -> Alignment {
        if self.is_from(user) {
            Alignment::Mine
        } else {
            Alignment::Other
        }
    }
}
