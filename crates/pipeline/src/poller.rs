//! Polling the provider for one job.
//!
//! An explicit loop with a remaining-checks counter and an awaited, fixed
//! delay. Before every check the request is re-read from the store; a
//! request that became terminal by any path (admin completion, another
//! poller, a clear) ends the loop without touching the provider.

use std::fmt;
use std::sync::Arc;

use brandgen_core::request::RequestStatus;
use brandgen_core::types::RequestId;
use brandgen_events::{NotificationEvent, Notifier};
use brandgen_provider::{GenerationProvider, JobStatus};
use tokio_util::sync::CancellationToken;

use crate::config::PollConfig;
use crate::error::PipelineError;
use crate::lifecycle::RequestLifecycle;

/// Ceiling for attempt-based progress estimates.
const ESTIMATE_CEILING: u32 = 90;

/// What to poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollJob {
    pub request_id: RequestId,
    pub provider_job_id: String,
    pub prompt: String,
    pub aspect_ratio: Option<String>,
    pub style: Option<String>,
}

/// How a polling run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The provider produced a result and the request is `completed`.
    Completed { url: String },
    /// The provider reported an error and the request is `failed`.
    Failed { message: String },
    /// The budget ran out while the provider was still working. The request
    /// stays `in-progress` and the user is told through `generation-timeout`.
    TimedOut { checks: u32 },
    /// The request became terminal, or disappeared, through another path.
    Superseded,
    Cancelled,
}

impl fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { url } => write!(f, "completed with {url}"),
            Self::Failed { message } => write!(f, "failed: {message}"),
            Self::TimedOut { .. } => f.write_str("generation is taking longer than expected"),
            Self::Superseded => f.write_str("request finished elsewhere"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

pub struct Poller {
    lifecycle: Arc<RequestLifecycle>,
    provider: Arc<dyn GenerationProvider>,
    notifier: Arc<dyn Notifier>,
    config: PollConfig,
}

impl Poller {
    pub fn new(
        lifecycle: Arc<RequestLifecycle>,
        provider: Arc<dyn GenerationProvider>,
        config: PollConfig,
    ) -> Self {
        let notifier = Arc::clone(lifecycle.notifier());
        Self {
            lifecycle,
            provider,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// Poll until the job resolves, the budget is spent, the request is
    /// finished elsewhere, or `cancel` fires.
    ///
    /// Makes at most `config.retries` status checks. Transport errors and
    /// ambiguous answers consume a check and keep going; an explicit provider
    /// error ends the run at once.
    pub async fn run(
        &self,
        job: &PollJob,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, PipelineError> {
        let id = job.request_id;
        let budget = self.config.retries;
        let mut remaining = budget;

        while remaining > 0 {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
                _ = tokio::time::sleep(self.config.delay) => {}
            }

            match self.lifecycle.get_request(id).await {
                Ok(current) if current.is_terminal() => {
                    tracing::debug!(request_id = %id, status = %current.status, "Request already terminal, polling stops");
                    return Ok(PollOutcome::Superseded);
                }
                Ok(_) => {}
                Err(e) if e.is_not_found() => return Ok(PollOutcome::Superseded),
                Err(e) => return Err(e),
            }

            remaining -= 1;
            let attempt = budget - remaining;

            let status = match self.provider.check_status(&job.provider_job_id).await {
                Ok(report) => report.classify(),
                Err(e) => {
                    tracing::warn!(
                        request_id = %id,
                        job_id = %job.provider_job_id,
                        attempt,
                        remaining,
                        error = %e,
                        "Status check failed, will retry",
                    );
                    continue;
                }
            };

            match status {
                JobStatus::Completed { url } => return self.complete(job, url).await,
                JobStatus::Failed { message } => return self.fail(job, message).await,
                JobStatus::Processing { progress } => {
                    if remaining > 0 {
                        let estimate = progress.unwrap_or_else(|| estimate(attempt, budget));
                        if self.report_progress(id, estimate).await? {
                            return Ok(PollOutcome::Superseded);
                        }
                    }
                }
                JobStatus::Ambiguous => {
                    tracing::debug!(request_id = %id, attempt, "Ambiguous status, treating as processing");
                    if remaining > 0 && self.report_progress(id, estimate(attempt, budget)).await? {
                        return Ok(PollOutcome::Superseded);
                    }
                }
            }
        }

        tracing::warn!(
            request_id = %id,
            job_id = %job.provider_job_id,
            checks = budget,
            "Generation is taking longer than expected",
        );
        let outcome = PollOutcome::TimedOut { checks: budget };
        self.notifier
            .publish(NotificationEvent::generation_timeout(id, outcome.to_string()));
        Ok(outcome)
    }

    // ---- private helpers ----

    async fn complete(&self, job: &PollJob, url: String) -> Result<PollOutcome, PipelineError> {
        match self
            .lifecycle
            .update_status(job.request_id, RequestStatus::Completed, Some(&url))
            .await
        {
            Ok(_) => {
                self.notifier.publish(NotificationEvent::image_generated(
                    Some(job.request_id),
                    url.clone(),
                    job.prompt.clone(),
                ));
                Ok(PollOutcome::Completed { url })
            }
            Err(e) if e.is_invalid_transition() || e.is_not_found() => Ok(PollOutcome::Superseded),
            Err(e) => Err(e),
        }
    }

    async fn fail(&self, job: &PollJob, message: String) -> Result<PollOutcome, PipelineError> {
        tracing::warn!(request_id = %job.request_id, error = %message, "Provider reported an error");
        match self.lifecycle.mark_failed(job.request_id, &message).await {
            Ok(_) => Ok(PollOutcome::Failed { message }),
            Err(e) if e.is_invalid_transition() || e.is_not_found() => Ok(PollOutcome::Superseded),
            Err(e) => Err(e),
        }
    }

    /// Store and publish a progress estimate. Returns `true` when the request
    /// turned out to be finished already.
    async fn report_progress(&self, id: RequestId, progress: u8) -> Result<bool, PipelineError> {
        match self.lifecycle.update_progress(id, progress).await {
            Ok(_) => Ok(false),
            Err(e) if e.is_invalid_transition() || e.is_not_found() => Ok(true),
            Err(e) => Err(e),
        }
    }
}

/// Linear estimate from the share of the budget used so far.
fn estimate(attempt: u32, budget: u32) -> u8 {
    if budget == 0 {
        return 0;
    }
    let share = u64::from(attempt.min(budget)) * u64::from(ESTIMATE_CEILING) / u64::from(budget);
    share as u8
}
