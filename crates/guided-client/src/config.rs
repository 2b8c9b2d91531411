use std::time::Duration;

use anyhow::{Context, bail};

use guided_sync::{EscalationConfig, SyncConfig};
use guided_types::{ChannelId, RoomId, UserId};

const DEFAULT_API_URL: &str = "https://guided-backend-1.onrender.com";

/// Everything the terminal client reads from the environment.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub gateway_url: String,
    pub user: UserId,
    pub room: Option<RoomId>,
    pub channel: Option<ChannelId>,
    pub ai_url: Option<String>,
    pub sync: SyncConfig,
}

impl ClientConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let present = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let api_url = present("GUIDED_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        let gateway_url = match present("GUIDED_GATEWAY_URL") {
            Some(url) => url,
            None => gateway_url_for(&api_url)?,
        };
        let user = present("GUIDED_USER_ID")
            .map(UserId::from)
            .context("GUIDED_USER_ID is required")?;

        let defaults = SyncConfig::default();
        let escalation = EscalationConfig {
            idle_threshold_ms: millis(&present, "GUIDED_IDLE_THRESHOLD_MS")?
                .unwrap_or(defaults.escalation.idle_threshold_ms),
            poll_interval_ms: millis(&present, "GUIDED_POLL_INTERVAL_MS")?
                .unwrap_or(defaults.escalation.poll_interval_ms),
        };
        let ack_timeout = millis(&present, "GUIDED_ACK_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.ack_timeout);

        Ok(Self {
            api_url,
            gateway_url,
            user,
            room: present("GUIDED_ROOM").map(RoomId::from),
            channel: present("GUIDED_CHANNEL").map(ChannelId::from),
            ai_url: present("GUIDED_AI_URL"),
            sync: SyncConfig {
                escalation,
                ack_timeout,
                ..defaults
            },
        })
    }
}

fn millis(present: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<u64>> {
    present(key)
        .map(|v| v.trim().parse::<u64>().with_context(|| format!("{} must be a number of milliseconds", key)))
        .transpose()
}

/// The gateway lives on the API host: `https://host` -> `wss://host/gateway`.
fn gateway_url_for(api_url: &str) -> anyhow::Result<String> {
    let base = api_url.trim_end_matches('/');
    let ws = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        bail!("GUIDED_API_URL must start with http:// or https://, got {}", api_url);
    };
    Ok(format!("{}/gateway", ws))
}
