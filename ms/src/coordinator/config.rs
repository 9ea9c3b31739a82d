//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default period between counter polls
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Seconds between reads of the shared counter
    #[serde(rename = "poll-interval-secs", default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    debug!("default_poll_interval_secs: called");
    DEFAULT_POLL_INTERVAL_SECS
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl CoordinatorConfig {
    /// Get the poll period as a Duration
    ///
    /// Zero is clamped to one second; `tokio::time::interval` rejects a zero period.
    pub fn poll_interval(&self) -> Duration {
        debug!(poll_interval_secs = %self.poll_interval_secs, "CoordinatorConfig::poll_interval: called");
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}
