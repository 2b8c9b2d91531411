use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use guided_types::api::HistoryResponse;
use guided_types::{Message, RoomId};

use crate::error::HistoryError;

/// Where authoritative room history comes from.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch(&self, room: &RoomId) -> Result<Vec<Message>, HistoryError>;
}

/// History from the backend's REST API:
/// `GET {base}/api/group/getAllChats/{roomId}` -> `{status, chats}`.
pub struct RestHistory {
    client: Client,
    base_url: String,
}

impl RestHistory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Use a preconfigured client (cookies, default headers, proxies).
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, room: &RoomId) -> String {
        format!(
            "{}/api/group/getAllChats/{}",
            self.base_url.trim_end_matches('/'),
            room
        )
    }
}

#[async_trait]
impl HistorySource for RestHistory {
    async fn fetch(&self, room: &RoomId) -> Result<Vec<Message>, HistoryError> {
        let url = self.endpoint(room);
        debug!("GET {}", url);

        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(HistoryError::Status(status));
        }

        let body = resp.text().await?;
        let parsed: HistoryResponse = serde_json::from_str(&body)?;
        if !parsed.is_ok() {
            return Err(HistoryError::Rejected(parsed.status));
        }

        debug!("room {}: {} messages", room, parsed.chats.len());
        Ok(parsed.chats)
    }
}

/// Cheap-to-clone front for a [`HistorySource`].
#[derive(Clone)]
pub struct HistoryLoader {
    source: Arc<dyn HistorySource>,
}

impl HistoryLoader {
    pub fn new(source: impl HistorySource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    pub fn from_arc(source: Arc<dyn HistorySource>) -> Self {
        Self { source }
    }

    /// Fetch the full history of `room`. No room means no request and an
    /// empty result.
    pub async fn fetch_history(&self, room: Option<&RoomId>) -> Result<Vec<Message>, HistoryError> {
        match room {
            Some(room) => self.source.fetch(room).await,
            None => Ok(Vec::new()),
        }
    }
}
