use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

use guided_types::api::Handoff;

use crate::config::EscalationConfig;

/// Raised once when the local user has been quiet for the idle threshold
/// after their last send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationSignal {
    pub triggered_at: DateTime<Utc>,
    pub last_message: String,
}

impl From<EscalationSignal> for Handoff {
    fn from(signal: EscalationSignal) -> Self {
        Handoff {
            message: Some(signal.last_message),
        }
    }
}

#[derive(Debug)]
enum Watch {
    Off,
    On { since: Instant, last_message: String },
}

/// Idle watch over the local user's own sends.
///
/// Only successful local sends arm it. Messages from other participants do
/// not count as activity.
#[derive(Debug)]
pub struct EscalationMonitor {
    config: EscalationConfig,
    watch: Watch,
}

impl EscalationMonitor {
    pub fn new(config: EscalationConfig) -> Self {
        Self {
            config,
            watch: Watch::Off,
        }
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.watch, Watch::On { .. })
    }

    /// A send was acknowledged: restart the idle window.
    pub fn record_send(&mut self, now: Instant, text: impl Into<String>) {
        self.watch = Watch::On {
            since: now,
            last_message: text.into(),
        };
    }

    /// Forget any recorded send.
    pub fn disarm(&mut self) {
        self.watch = Watch::Off;
    }

    /// Periodic check. Fires at most once per recorded send.
    pub fn check(&mut self, now: Instant) -> Option<EscalationSignal> {
        let Watch::On { since, .. } = &self.watch else {
            return None;
        };
        if now.saturating_duration_since(*since) < self.config.idle_threshold() {
            return None;
        }

        let Watch::On { last_message, .. } = std::mem::replace(&mut self.watch, Watch::Off) else {
            return None;
        };
        debug!("idle threshold reached, escalating");
        Some(EscalationSignal {
            triggered_at: Utc::now(),
            last_message,
        })
    }

    /// Ticker for [`check`](Self::check). The first tick lands one poll
    /// interval from now, not immediately.
    pub fn ticker(&self) -> Interval {
        let period = self.config.poll_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}
