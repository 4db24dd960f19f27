//! Load/retry state machine for a remote image that may still be generating.
//!
//! The controller is clock-driven: the owner calls [`ImageLoadController::tick`]
//! periodically with the current instant and reports real load outcomes via
//! [`on_load`](ImageLoadController::on_load) /
//! [`on_error`](ImageLoadController::on_error). Any returned [`RetryReason`]
//! means "reload the image now" using [`ImageLoadController::cache_key`].
//!
//! Simulated progress only ever increases while loading, slows as it nears
//! [`PROGRESS_CEILING`], and reaches 100 only through `on_load`.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Simulated progress never passes this value without a real load.
pub const PROGRESS_CEILING: f64 = 98.0;

/// Progress at or above this value counts as "plateaued".
pub const PLATEAU_THRESHOLD: f64 = 90.0;

/// Defaults for [`ImageLoadConfig`].
pub const DEFAULT_HARD_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PLATEAU_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_AUTO_RETRY_DELAY: Duration = Duration::from_millis(1500);

/// Timeouts governing a single image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLoadConfig {
    /// Force a reload if neither load nor error fired within this window.
    pub hard_timeout: Duration,
    /// Force a reload if progress sat above [`PLATEAU_THRESHOLD`] this long.
    pub plateau_timeout: Duration,
    /// Delay before the single automatic retry after a load error.
    pub auto_retry_delay: Duration,
}

impl Default for ImageLoadConfig {
    fn default() -> Self {
        Self {
            hard_timeout: DEFAULT_HARD_TIMEOUT,
            plateau_timeout: DEFAULT_PLATEAU_TIMEOUT,
            auto_retry_delay: DEFAULT_AUTO_RETRY_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPhase {
    Idle,
    Loading,
    Loaded,
    Errored,
}

/// Why the controller asked for a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryReason {
    HardTimeout,
    Stalled,
    AutoRetry,
    Manual,
}

/// What happens after a real load error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOutcome {
    /// The first failure: a reload fires automatically at the given instant.
    AutoRetryScheduled(Instant),
    /// The retry control must be shown; only the user can retry now.
    AwaitingUser,
}

/// Per-image load state.
#[derive(Debug, Clone)]
pub struct ImageLoadController {
    config: ImageLoadConfig,
    phase: LoadPhase,
    progress: f64,
    has_error: bool,
    retry_count: u32,
    load_attempt: u32,
    auto_retry_used: bool,
    loading_since: Option<Instant>,
    plateau_since: Option<Instant>,
    last_tick: Option<Instant>,
    auto_retry_at: Option<Instant>,
}

impl Default for ImageLoadController {
    fn default() -> Self {
        Self::new(ImageLoadConfig::default())
    }
}

impl ImageLoadController {
    pub fn new(config: ImageLoadConfig) -> Self {
        Self {
            config,
            phase: LoadPhase::Idle,
            progress: 0.0,
            has_error: false,
            retry_count: 0,
            load_attempt: 0,
            auto_retry_used: false,
            loading_since: None,
            plateau_since: None,
            last_tick: None,
            auto_retry_at: None,
        }
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn has_error(&self) -> bool {
        self.has_error
    }

    /// Number of user-initiated retries so far.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Changes on every reload so the renderer treats the image as new.
    pub fn cache_key(&self) -> u32 {
        self.load_attempt
    }

    /// The retry control is shown once the automatic retry is spent.
    pub fn shows_retry_control(&self) -> bool {
        self.phase == LoadPhase::Errored && self.auto_retry_at.is_none()
    }

    /// Begin loading. No-op unless idle.
    pub fn start(&mut self, now: Instant) {
        if self.phase == LoadPhase::Idle {
            self.enter_loading(now);
        }
    }

    /// Advance timers and simulated progress.
    ///
    /// Returns `Some(reason)` when the caller must reload the image.
    pub fn tick(&mut self, now: Instant) -> Option<RetryReason> {
        match self.phase {
            LoadPhase::Errored => {
                let due = self.auto_retry_at.is_some_and(|at| now >= at);
                if due {
                    self.auto_retry_at = None;
                    self.has_error = false;
                    self.reload(now);
                    return Some(RetryReason::AutoRetry);
                }
                None
            }
            LoadPhase::Loading => {
                self.advance_progress(now);

                let since = self.loading_since.unwrap_or(now);
                if now.saturating_duration_since(since) >= self.config.hard_timeout {
                    self.reload(now);
                    return Some(RetryReason::HardTimeout);
                }

                if self.progress >= PLATEAU_THRESHOLD {
                    let plateau = *self.plateau_since.get_or_insert(now);
                    if now.saturating_duration_since(plateau) >= self.config.plateau_timeout {
                        self.reload(now);
                        return Some(RetryReason::Stalled);
                    }
                }
                None
            }
            LoadPhase::Idle | LoadPhase::Loaded => None,
        }
    }

    /// The image actually rendered.
    pub fn on_load(&mut self) {
        self.phase = LoadPhase::Loaded;
        self.progress = 100.0;
        self.has_error = false;
        self.clear_timers();
    }

    /// The image failed to render.
    pub fn on_error(&mut self, now: Instant) -> ErrorOutcome {
        self.phase = LoadPhase::Errored;
        self.has_error = true;
        self.clear_timers();

        if self.auto_retry_used {
            ErrorOutcome::AwaitingUser
        } else {
            self.auto_retry_used = true;
            let at = now + self.config.auto_retry_delay;
            self.auto_retry_at = Some(at);
            ErrorOutcome::AutoRetryScheduled(at)
        }
    }

    /// User pressed retry: bump the counter, restart from zero.
    pub fn manual_retry(&mut self, now: Instant) -> RetryReason {
        self.retry_count += 1;
        self.progress = 0.0;
        self.has_error = false;
        self.auto_retry_at = None;
        self.reload(now);
        RetryReason::Manual
    }

    // ---- private helpers ----

    fn enter_loading(&mut self, now: Instant) {
        self.phase = LoadPhase::Loading;
        self.loading_since = Some(now);
        self.last_tick = Some(now);
        self.plateau_since = None;
    }

    fn reload(&mut self, now: Instant) {
        self.load_attempt += 1;
        self.enter_loading(now);
    }

    fn clear_timers(&mut self) {
        self.loading_since = None;
        self.plateau_since = None;
        self.last_tick = None;
        self.auto_retry_at = None;
    }

    fn advance_progress(&mut self, now: Instant) {
        let last = self.last_tick.unwrap_or(now);
        let dt = now.saturating_duration_since(last).as_secs_f64();
        self.last_tick = Some(now);
        let next = self.progress + progress_rate(self.progress) * dt;
        self.progress = next.min(PROGRESS_CEILING).max(self.progress);
    }
}

/// Percentage points per second at the given progress: fast early, crawling late.
fn progress_rate(progress: f64) -> f64 {
    if progress < 50.0 {
        20.0
    } else if progress < 80.0 {
        8.0
    } else if progress < 90.0 {
        3.0
    } else {
        0.5
    }
}
