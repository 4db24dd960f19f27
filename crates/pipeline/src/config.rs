use std::time::Duration;

/// Default number of status checks per job.
pub const DEFAULT_POLL_RETRIES: u32 = 10;

/// Default fixed wait before each status check.
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_millis(3000);

/// Default interval of the request-list backstop refresh.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Polling budget for one provider job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Maximum number of status checks.
    pub retries: u32,
    /// Wait before every check. Fixed, not exponential.
    pub delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_POLL_RETRIES,
            delay: DEFAULT_POLL_DELAY,
        }
    }
}

impl PollConfig {
    /// Load from environment variables.
    ///
    /// | Variable        | Default |
    /// |-----------------|---------|
    /// | `POLL_RETRIES`  | `10`    |
    /// | `POLL_DELAY_MS` | `3000`  |
    pub fn from_env() -> Self {
        let retries = std::env::var("POLL_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_POLL_RETRIES);
        let delay = std::env::var("POLL_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_DELAY);
        Self { retries, delay }
    }
}
