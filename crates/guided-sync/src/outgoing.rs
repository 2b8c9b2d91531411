use tracing::debug;

use guided_types::events::ChatPayload;
use guided_types::{ChannelId, RoomId, UserId};

use crate::connection::ConnectionManager;
use crate::error::{PublishError, SendRejected};

/// How a send ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Acknowledged with `ok`.
    Delivered,
    /// Published but not acknowledged. The draft is kept for a retry.
    Failed(PublishError),
    /// Never published.
    Rejected(SendRejected),
}

/// Composer draft plus the single-flight guard for outgoing messages.
#[derive(Debug, Default)]
pub struct Outbox {
    draft: String,
    in_flight: Option<String>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Validate and claim the single send slot. The text becomes the draft
    /// until the send settles.
    pub fn prepare(
        &mut self,
        text: &str,
        room: Option<&RoomId>,
        channel: Option<&ChannelId>,
        sender: &UserId,
    ) -> Result<ChatPayload, SendRejected> {
        if self.in_flight.is_some() {
            return Err(SendRejected::InFlight);
        }
        if text.trim().is_empty() {
            return Err(SendRejected::Empty);
        }
        let room = room.ok_or(SendRejected::NoActiveRoom)?;

        self.draft = text.to_string();
        self.in_flight = Some(text.to_string());

        Ok(ChatPayload {
            message: text.to_string(),
            group: room.clone(),
            channel: channel.cloned(),
            sender: sender.clone(),
        })
    }

    /// Release the slot. The draft is cleared only on success. Returns the
    /// text that was in flight.
    pub fn settle(&mut self, result: &Result<(), PublishError>) -> Option<String> {
        let text = self.in_flight.take()?;
        if result.is_ok() {
            self.draft.clear();
        }
        Some(text)
    }
}

/// Publish a prepared payload. No retries.
pub async fn deliver(connection: &ConnectionManager, payload: ChatPayload) -> Result<(), PublishError> {
    debug!("sending to room {} ({} chars)", payload.group, payload.message.len());
    connection.publish(payload).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn me() -> UserId {
        UserId::from("me")
    }

    #[test]
    fn blank_text_is_rejected() {
        let mut outbox = Outbox::new();
        let room = RoomId::from("a");
        assert_eq!(
            outbox.prepare("   \t", Some(&room), None, &me()),
            Err(SendRejected::Empty)
        );
        assert!(!outbox.is_in_flight());
    }

    #[test]
    fn needs_active_room() {
        let mut outbox = Outbox::new();
        assert_eq!(
            outbox.prepare("hi", None, None, &me()),
            Err(SendRejected::NoActiveRoom)
        );
    }

    #[test]
    fn second_send_rejected_while_in_flight() {
        let mut outbox = Outbox::new();
        let room = RoomId::from("a");
        let channel = ChannelId::from("c");

        let payload = outbox.prepare("hello", Some(&room), Some(&channel), &me()).unwrap();
        assert_eq!(payload.message, "hello");
        assert_eq!(payload.channel, Some(channel.clone()));

        assert_eq!(
            outbox.prepare("again", Some(&room), Some(&channel), &me()),
            Err(SendRejected::InFlight)
        );
        assert_eq!(outbox.draft(), "hello");
    }

    #[test]
    fn success_clears_draft() {
        let mut outbox = Outbox::new();
        let room = RoomId::from("a");
        outbox.prepare("hello", Some(&room), None, &me()).unwrap();

        assert_eq!(outbox.settle(&Ok(())).as_deref(), Some("hello"));
        assert_eq!(outbox.draft(), "");
        assert!(!outbox.is_in_flight());
    }

    #[test]
    fn failure_keeps_draft_and_frees_slot() {
        let mut outbox = Outbox::new();
        let room = RoomId::from("a");
        outbox.prepare("hello", Some(&room), None, &me()).unwrap();

        outbox.settle(&Err(PublishError::Rejected));
        assert_eq!(outbox.draft(), "hello");
        assert!(!outbox.is_in_flight());
        assert!(outbox.prepare("hello", Some(&room), None, &me()).is_ok());
    }

    #[test]
    fn settle_without_send_is_none() {
        let mut outbox = Outbox::new();
        assert!(outbox.settle(&Ok(())).is_none());
    }
}
