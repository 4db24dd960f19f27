//! In-process provider that replays a fixed script.
//!
//! Used by tests and by offline development runs (`PROVIDER_API_URL=scripted`).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::{StatusReport, SubmitParams, SubmitResponse};
use crate::GenerationProvider;

/// One scripted answer to `check_status`.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Report(StatusReport),
    /// The status query fails before reaching the provider.
    TransportError,
}

/// Replays queued submit and status answers in order.
///
/// Once the status script runs out every further check reports
/// `processing`. Submissions without a queued answer are accepted with job
/// ids `job-1`, `job-2`, and so on.
#[derive(Default)]
pub struct ScriptedProvider {
    submits: Mutex<VecDeque<Result<SubmitResponse, String>>>,
    statuses: Mutex<VecDeque<ScriptStep>>,
    submitted: Mutex<Vec<SubmitParams>>,
    status_checks: AtomicUsize,
    next_job: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer to the next `submit`.
    pub fn push_submit(&self, response: SubmitResponse) -> &Self {
        lock(&self.submits).push_back(Ok(response));
        self
    }

    /// Make the next `submit` fail in transport.
    pub fn push_submit_failure(&self, message: impl Into<String>) -> &Self {
        lock(&self.submits).push_back(Err(message.into()));
        self
    }

    pub fn push_status(&self, report: StatusReport) -> &Self {
        lock(&self.statuses).push_back(ScriptStep::Report(report));
        self
    }

    pub fn push_transport_error(&self) -> &Self {
        lock(&self.statuses).push_back(ScriptStep::TransportError);
        self
    }

    /// Queue `count` copies of `step`.
    pub fn push_repeated(&self, step: ScriptStep, count: usize) -> &Self {
        let mut statuses = lock(&self.statuses);
        for _ in 0..count {
            statuses.push_back(step.clone());
        }
        drop(statuses);
        self
    }

    /// How many times `check_status` has been called.
    pub fn status_checks(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }

    /// Every parameter set passed to `submit`, in order.
    pub fn submitted(&self) -> Vec<SubmitParams> {
        lock(&self.submitted).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn submit(&self, params: &SubmitParams) -> Result<SubmitResponse, ProviderError> {
        lock(&self.submitted).push(params.clone());
        match lock(&self.submits).pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(ProviderError::Unavailable(message)),
            None => {
                let n = self.next_job.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(SubmitResponse::accepted(format!("job-{n}")))
            }
        }
    }

    async fn check_status(&self, _job_id: &str) -> Result<StatusReport, ProviderError> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        match lock(&self.statuses).pop_front() {
            Some(ScriptStep::Report(report)) => Ok(report),
            Some(ScriptStep::TransportError) => {
                Err(ProviderError::Unavailable("connection reset".into()))
            }
            None => Ok(StatusReport::processing()),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::types::SubmitStatus;

    #[tokio::test]
    async fn replays_in_order_then_processing() {
        let provider = ScriptedProvider::new();
        provider
            .push_transport_error()
            .push_status(StatusReport::completed("https://cdn/x.png"));

        assert_matches!(
            provider.check_status("j").await,
            Err(ProviderError::Unavailable(_))
        );
        assert_eq!(
            provider.check_status("j").await.unwrap(),
            StatusReport::completed("https://cdn/x.png")
        );
        assert_eq!(provider.check_status("j").await.unwrap(), StatusReport::processing());
        assert_eq!(provider.status_checks(), 3);
    }

    #[tokio::test]
    async fn default_submit_accepts_with_sequential_ids() {
        let provider = ScriptedProvider::new();
        let first = provider.submit(&SubmitParams::new("a")).await.unwrap();
        let second = provider.submit(&SubmitParams::new("b")).await.unwrap();
        assert_eq!(first.status, SubmitStatus::Accepted);
        assert_eq!(first.request_id.as_deref(), Some("job-1"));
        assert_eq!(second.request_id.as_deref(), Some("job-2"));
        assert_eq!(provider.submitted().len(), 2);
    }
}
