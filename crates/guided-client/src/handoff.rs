use reqwest::Client;
use tracing::debug;

use guided_types::api::Handoff;

/// Client side of the AI boundary: posts `{message}` and reads back a
/// plain-text answer.
#[derive(Clone)]
pub struct AiHandoff {
    client: Client,
    url: String,
}

impl AiHandoff {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub async fn forward(&self, handoff: &Handoff) -> Result<String, reqwest::Error> {
        debug!("POST {}", self.url);
        let reply = self
            .client
            .post(&self.url)
            .json(handoff)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(reply)
    }
}
