use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_IDLE_THRESHOLD_MS: u64 = 30_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 8_000;

/// Ack wait before a publish is failed with a synthetic timeout.
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Reconnect delay after a lost link, doubled per failed attempt up to the cap.
const DEFAULT_RECONNECT_BASE: Duration = Duration::from_secs(1);
const DEFAULT_RECONNECT_MAX: Duration = Duration::from_secs(30);

/// Idle escalation knobs, in the `{idleThresholdMs, pollIntervalMs}` shape the
/// front end configures them with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationConfig {
    #[serde(default = "default_idle_threshold_ms")]
    pub idle_threshold_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_idle_threshold_ms() -> u64 {
    DEFAULT_IDLE_THRESHOLD_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl EscalationConfig {
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    /// Never zero: `tokio::time::interval` panics on a zero period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            idle_threshold_ms: DEFAULT_IDLE_THRESHOLD_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// Everything the sync core needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub escalation: EscalationConfig,
    pub ack_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

impl SyncConfig {
    /// Wait before connect attempt `attempt`. Attempt 0 is the first
    /// connect for a room and goes out right away.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (attempt - 1).min(16);
        self.reconnect_base.saturating_mul(factor).min(self.reconnect_max)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            escalation: EscalationConfig::default(),
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_base: DEFAULT_RECONNECT_BASE,
            reconnect_max: DEFAULT_RECONNECT_MAX,
        }
    }
}
