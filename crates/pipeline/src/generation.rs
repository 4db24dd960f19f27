//! Submitting requests to the provider and keeping their pollers running.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use brandgen_core::request::{GenerationRequest, NewGenerationRequest, RequestStatus, Requester};
use brandgen_core::types::RequestId;
use brandgen_events::{EventPayload, NotificationEvent, Subscription, Topic};
use brandgen_provider::{GenerationProvider, SubmitParams, SubmitStatus};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::PipelineError;
use crate::lifecycle::RequestLifecycle;
use crate::poller::{PollJob, PollOutcome, Poller};

/// A retry signal taken off the notifier.
#[derive(Debug, Clone, PartialEq)]
struct RetrySignal {
    request_id: Option<RequestId>,
    prompt: String,
}

/// Creates requests, hands them to the provider and runs one poller per
/// accepted job.
pub struct GenerationService {
    lifecycle: Arc<RequestLifecycle>,
    provider: Arc<dyn GenerationProvider>,
    poller: Arc<Poller>,
    cancel: CancellationToken,
    tasks: TaskTracker,
    next_poll: AtomicU64,
    active_polls: Mutex<HashMap<RequestId, (u64, CancellationToken)>>,
    retry_subscription: Mutex<Option<Subscription>>,
}

impl GenerationService {
    pub fn new(
        lifecycle: Arc<RequestLifecycle>,
        provider: Arc<dyn GenerationProvider>,
        poller: Arc<Poller>,
    ) -> Arc<Self> {
        Arc::new(Self {
            lifecycle,
            provider,
            poller,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
            next_poll: AtomicU64::new(0),
            active_polls: Mutex::new(HashMap::new()),
            retry_subscription: Mutex::new(None),
        })
    }

    /// Create a request for `requester`, submit it and start polling.
    ///
    /// Returns the request as it stands after submission: `in-progress` when
    /// the provider accepted it, `failed` when it did not. Only validation and
    /// store errors are returned as `Err`.
    pub async fn submit(
        self: &Arc<Self>,
        requester: &Requester,
        input: NewGenerationRequest,
    ) -> Result<GenerationRequest, PipelineError> {
        let request = self.lifecycle.create_request(requester, input).await?;
        self.dispatch(request).await
    }

    /// Handle a manual retry for `request_id` / `prompt`.
    ///
    /// An `in-progress` request is polled again from a fresh budget. Any
    /// other known request is re-generated as a new request for the same
    /// user. Returns the request now being worked on, if any.
    pub async fn retry(
        self: &Arc<Self>,
        request_id: Option<RequestId>,
        prompt: &str,
    ) -> Result<Option<GenerationRequest>, PipelineError> {
        let Some(id) = request_id else {
            tracing::debug!(prompt, "Retry without a request id ignored");
            return Ok(None);
        };
        let current = self.lifecycle.get_request(id).await?;

        match (&current.status, current.provider_job_id.as_deref()) {
            (RequestStatus::InProgress, Some(job_id)) => {
                tracing::info!(request_id = %id, job_id, "Re-polling on retry");
                self.spawn_poll(poll_job(&current, job_id));
                Ok(Some(current))
            }
            _ => {
                let requester = Requester {
                    user_id: current.user_id,
                    name: current.user_name.clone(),
                    email: current.user_email.clone(),
                };
                let input = NewGenerationRequest {
                    kind: current.kind,
                    prompt: current.prompt.clone(),
                    aspect_ratio: current.aspect_ratio.clone(),
                    reference_image: current.reference_image.clone(),
                    style: current.style.clone(),
                    batch_size: Some(current.batch_size),
                };
                tracing::info!(request_id = %id, status = %current.status, "Re-generating on retry");
                self.submit(&requester, input).await.map(Some)
            }
        }
    }

    /// Listen for `generation-retry` notifications until shutdown.
    pub fn start_retry_listener(self: &Arc<Self>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<RetrySignal>();
        let subscription = self.lifecycle.notifier().subscribe(
            Topic::GenerationRetry,
            Arc::new(move |event: &NotificationEvent| {
                if let EventPayload::GenerationRetry { request_id, prompt } = &event.payload {
                    let _ = tx.send(RetrySignal {
                        request_id: *request_id,
                        prompt: prompt.clone(),
                    });
                }
            }),
        );
        *lock(&self.retry_subscription) = Some(subscription);

        let service = Arc::clone(self);
        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            loop {
                let signal = tokio::select! {
                    _ = cancel.cancelled() => break,
                    signal = rx.recv() => match signal {
                        Some(s) => s,
                        None => break,
                    },
                };
                if let Err(e) = service.retry(signal.request_id, &signal.prompt).await {
                    tracing::warn!(
                        request_id = ?signal.request_id,
                        error = %e,
                        "Retry signal could not be handled",
                    );
                }
            }
            tracing::debug!("Retry listener stopped");
        });
    }

    /// Number of pollers currently running.
    pub fn active_polls(&self) -> usize {
        lock(&self.active_polls).len()
    }

    /// Stop listening, cancel every poller and wait for them to finish.
    pub async fn shutdown(&self) {
        let subscription = lock(&self.retry_subscription).take();
        if let Some(mut sub) = subscription {
            sub.unsubscribe();
        }
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        tracing::info!("Generation service stopped");
    }

    // ---- private helpers ----

    async fn dispatch(
        self: &Arc<Self>,
        request: GenerationRequest,
    ) -> Result<GenerationRequest, PipelineError> {
        let params = SubmitParams {
            prompt: request.prompt.clone(),
            aspect_ratio: request.aspect_ratio.clone(),
            style: request.style.clone(),
            reference_image: request.reference_image.clone(),
            batch_size: request.batch_size,
        };

        let response = match self.provider.submit(&params).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(request_id = %request.id, error = %e, "Provider submission failed");
                return self
                    .lifecycle
                    .mark_failed(request.id, &format!("Could not reach the generation service: {e}"))
                    .await;
            }
        };

        match (response.status, response.request_id.as_deref()) {
            (SubmitStatus::Accepted, Some(job_id)) if !job_id.trim().is_empty() => {
                let submitted = self
                    .lifecycle
                    .mark_submitted(request.id, job_id, response.placeholder_url.as_deref())
                    .await?;
                self.spawn_poll(poll_job(&submitted, job_id));
                Ok(submitted)
            }
            (SubmitStatus::Accepted, _) => {
                self.lifecycle
                    .mark_failed(request.id, "The generation service returned no job id")
                    .await
            }
            (SubmitStatus::Error, _) => {
                let message = response
                    .error
                    .unwrap_or_else(|| "The generation service rejected the request".to_string());
                tracing::warn!(request_id = %request.id, error = %message, "Provider rejected request");
                self.lifecycle.mark_failed(request.id, &message).await
            }
        }
    }

    /// Start polling `job`, replacing any poller already running for it.
    fn spawn_poll(self: &Arc<Self>, job: PollJob) {
        let generation = self.next_poll.fetch_add(1, Ordering::Relaxed);
        let token = self.cancel.child_token();
        if let Some((_, previous)) =
            lock(&self.active_polls).insert(job.request_id, (generation, token.clone()))
        {
            previous.cancel();
        }

        let service = Arc::clone(self);
        self.tasks.spawn(async move {
            let outcome = service.poller.run(&job, &token).await;
            {
                let mut active = lock(&service.active_polls);
                if active.get(&job.request_id).is_some_and(|(g, _)| *g == generation) {
                    active.remove(&job.request_id);
                }
            }
            match outcome {
                Ok(PollOutcome::TimedOut { checks }) => tracing::info!(
                    request_id = %job.request_id,
                    checks,
                    "Polling gave up, user notified",
                ),
                Ok(outcome) => tracing::info!(
                    request_id = %job.request_id,
                    outcome = %outcome,
                    "Polling finished",
                ),
                Err(e) => tracing::error!(
                    request_id = %job.request_id,
                    error = %e,
                    "Polling aborted",
                ),
            }
        });
    }
}

fn poll_job(request: &GenerationRequest, job_id: &str) -> PollJob {
    PollJob {
        request_id: request.id,
        provider_job_id: job_id.to_string(),
        prompt: request.prompt.clone(),
        aspect_ratio: request.aspect_ratio.clone(),
        style: request.style.clone(),
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use brandgen_db::store::InMemoryRequestStore;
    use brandgen_events::{Alerts, Notifier, PageChannel};
    use brandgen_provider::{ScriptedProvider, StatusReport, SubmitResponse};

    use super::*;
    use crate::config::PollConfig;

    struct Fixture {
        service: Arc<GenerationService>,
        lifecycle: Arc<RequestLifecycle>,
        provider: Arc<ScriptedProvider>,
        notifier: Arc<PageChannel>,
    }

    fn fixture(retries: u32) -> Fixture {
        let notifier = Arc::new(PageChannel::new("generation-test"));
        let lifecycle = Arc::new(RequestLifecycle::new(
            Arc::new(InMemoryRequestStore::new()),
            notifier.clone(),
            Alerts::none(),
        ));
        let provider = Arc::new(ScriptedProvider::new());
        let poller = Arc::new(Poller::new(
            Arc::clone(&lifecycle),
            provider.clone(),
            PollConfig {
                retries,
                delay: Duration::from_millis(3000),
            },
        ));
        Fixture {
            service: GenerationService::new(Arc::clone(&lifecycle), provider.clone(), poller),
            lifecycle,
            provider,
            notifier,
        }
    }

    fn requester() -> Requester {
        Requester {
            user_id: uuid::Uuid::new_v4(),
            name: "Ana".into(),
            email: None,
        }
    }

    /// Let spawned pollers run until every timer up to `ms` has fired.
    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_submission_is_polled_to_completion() {
        let f = fixture(10);
        f.provider
            .push_submit(SubmitResponse::accepted("job-42").with_placeholder("https://via.placeholder.com/1"))
            .push_status(StatusReport::processing())
            .push_status(StatusReport::completed("https://cdn/final.png"));

        let req = f
            .service
            .submit(&requester(), NewGenerationRequest::image("sunset over mountains").with_aspect_ratio("1:1"))
            .await
            .unwrap();
        assert_eq!(req.status, RequestStatus::InProgress);
        assert_eq!(req.provider_job_id.as_deref(), Some("job-42"));
        assert_eq!(req.placeholder_url.as_deref(), Some("https://via.placeholder.com/1"));
        assert_eq!(f.service.active_polls(), 1);

        advance(6500).await;

        let stored = f.lifecycle.get_request(req.id).await.unwrap();
        assert_eq!(stored.status, RequestStatus::Completed);
        assert_eq!(stored.result_url.as_deref(), Some("https://cdn/final.png"));
        assert!(stored.placeholder_url.is_none());
        assert_eq!(f.service.active_polls(), 0);

        let submitted = f.provider.submitted();
        assert_eq!(submitted[0].aspect_ratio.as_deref(), Some("1:1"));
        f.service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_submission_fails_request() {
        let f = fixture(10);
        f.provider.push_submit(SubmitResponse::rejected("prompt blocked"));

        let req = f
            .service
            .submit(&requester(), NewGenerationRequest::image("bad"))
            .await
            .unwrap();
        assert_eq!(req.status, RequestStatus::Failed);
        assert_eq!(req.error_message.as_deref(), Some("prompt blocked"));
        assert_eq!(f.service.active_polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_provider_fails_request() {
        let f = fixture(10);
        f.provider.push_submit_failure("connection refused");

        let req = f
            .service
            .submit(&requester(), NewGenerationRequest::image("offline"))
            .await
            .unwrap();
        assert_eq!(req.status, RequestStatus::Failed);
        assert!(req
            .error_message
            .as_deref()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn validation_error_submits_nothing() {
        let f = fixture(10);
        let err = f
            .service
            .submit(&requester(), NewGenerationRequest::image(""))
            .await
            .unwrap_err();
        assert!(err.as_core().is_some());
        assert!(f.provider.submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_signal_regenerates_failed_request() {
        let f = fixture(10);
        f.service.start_retry_listener();
        f.provider.push_submit(SubmitResponse::rejected("busy"));

        let owner = requester();
        let failed = f
            .service
            .submit(&owner, NewGenerationRequest::image("try again"))
            .await
            .unwrap();
        assert_eq!(failed.status, RequestStatus::Failed);

        f.notifier
            .publish(NotificationEvent::generation_retry(Some(failed.id), "try again"));
        advance(10).await;

        let mine = f.lifecycle.list_requests_for_user(owner.user_id).await.unwrap();
        assert_eq!(mine.len(), 2);
        let fresh = &mine[0];
        assert_ne!(fresh.id, failed.id);
        assert_eq!(fresh.prompt, "try again");
        assert_eq!(fresh.status, RequestStatus::InProgress);
        f.service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn retry_of_in_progress_request_restarts_polling() {
        let f = fixture(2);
        let req = f
            .service
            .submit(&requester(), NewGenerationRequest::image("slow"))
            .await
            .unwrap();

        // Budget of two checks runs out.
        advance(6500).await;
        assert_eq!(f.provider.status_checks(), 2);
        assert_eq!(f.service.active_polls(), 0);

        f.provider.push_status(StatusReport::completed("https://cdn/late.png"));
        let retried = f.service.retry(Some(req.id), "slow").await.unwrap().unwrap();
        assert_eq!(retried.id, req.id);
        advance(3500).await;

        let stored = f.lifecycle.get_request(req.id).await.unwrap();
        assert_eq!(stored.status, RequestStatus::Completed);
        assert_eq!(f.provider.submitted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_image_retry_restarts_polling() {
        let f = fixture(2);
        f.service.start_retry_listener();
        let req = f
            .service
            .submit(&requester(), NewGenerationRequest::image("stuck"))
            .await
            .unwrap();
        advance(6500).await;
        assert_eq!(f.service.active_polls(), 0);

        let mut session = crate::image_load::ImageLoadSession::new(
            f.notifier.clone(),
            Some(req.id),
            "stuck",
            "https://cdn/placeholder/loading.png",
        );
        let now = tokio::time::Instant::now();
        session.start(now);
        session.on_error(now);
        session.tick(now + Duration::from_secs(2));
        session.on_error(now + Duration::from_secs(3));
        assert!(session.controller().shows_retry_control());

        f.provider.push_status(StatusReport::completed("https://cdn/final.png"));
        session.manual_retry(now + Duration::from_secs(4));
        advance(3500).await;

        let stored = f.lifecycle.get_request(req.id).await.unwrap();
        assert_eq!(stored.status, RequestStatus::Completed);
        assert_eq!(stored.result_url.as_deref(), Some("https://cdn/final.png"));
        f.service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pollers() {
        let f = fixture(10);
        f.service
            .submit(&requester(), NewGenerationRequest::image("forever"))
            .await
            .unwrap();
        assert_eq!(f.service.active_polls(), 1);

        f.service.shutdown().await;
        assert_eq!(f.service.active_polls(), 0);
        assert_eq!(f.provider.status_checks(), 0);
    }
}
