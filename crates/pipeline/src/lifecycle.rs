//! Request lifecycle: every store write, the matching notification, and
//! the creation/completion alerts.
//!
//! Each operation loads the current record, computes the next one through
//! the core state machine, writes it as one complete patch and only then
//! publishes. The write is conditional on the status that was read, so a
//! concurrent writer that got there first wins and the late one gets
//! [`CoreError::Conflict`]. A rejected operation writes nothing and publishes
//! nothing.

use std::sync::Arc;

use brandgen_core::error::CoreError;
use brandgen_core::request::{GenerationRequest, NewGenerationRequest, RequestStatus, Requester};
use brandgen_core::types::{RequestId, UserId};
use brandgen_db::store::{RequestPatch, RequestStore};
use brandgen_events::{Alerts, NotificationEvent, Notifier, RequestAlert};
use chrono::Utc;

use crate::error::PipelineError;

pub struct RequestLifecycle {
    store: Arc<dyn RequestStore>,
    notifier: Arc<dyn Notifier>,
    alerts: Alerts,
}

impl RequestLifecycle {
    pub fn new(store: Arc<dyn RequestStore>, notifier: Arc<dyn Notifier>, alerts: Alerts) -> Self {
        Self {
            store,
            notifier,
            alerts,
        }
    }

    pub fn store(&self) -> &Arc<dyn RequestStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Validate and persist a new request in status `new`.
    pub async fn create_request(
        &self,
        requester: &Requester,
        input: NewGenerationRequest,
    ) -> Result<GenerationRequest, PipelineError> {
        let request = GenerationRequest::create(requester, input, Utc::now())?;
        self.store.insert(&request).await?;

        tracing::info!(
            request_id = %request.id,
            user_id = %request.user_id,
            kind = request.kind.as_str(),
            "Generation request created",
        );

        self.notifier
            .publish(NotificationEvent::request_created(request.id));
        self.alerts.notify(RequestAlert::created(&request));
        Ok(request)
    }

    /// Move request `id` to `status`.
    ///
    /// Entering `completed` needs a non-empty `result_url`; every other target
    /// rejects one.
    pub async fn update_status(
        &self,
        id: RequestId,
        status: RequestStatus,
        result_url: Option<&str>,
    ) -> Result<GenerationRequest, PipelineError> {
        let current = self.get_request(id).await?;
        let next = current.transition(status, result_url, Utc::now())?;
        self.commit(&current, next).await
    }

    /// The provider accepted the job: `new -> in-progress`.
    pub async fn mark_submitted(
        &self,
        id: RequestId,
        provider_job_id: &str,
        placeholder_url: Option<&str>,
    ) -> Result<GenerationRequest, PipelineError> {
        let current = self.get_request(id).await?;
        let next = current.submitted(provider_job_id, placeholder_url, Utc::now())?;
        self.commit(&current, next).await
    }

    /// Move request `id` to `failed` with `message`.
    pub async fn mark_failed(
        &self,
        id: RequestId,
        message: &str,
    ) -> Result<GenerationRequest, PipelineError> {
        let current = self.get_request(id).await?;
        let next = current.failed(message, Utc::now())?;
        self.commit(&current, next).await
    }

    /// Record a progress estimate. Terminal requests are left alone and
    /// reported as a conflict.
    pub async fn update_progress(
        &self,
        id: RequestId,
        progress: u8,
    ) -> Result<GenerationRequest, PipelineError> {
        let current = self.get_request(id).await?;
        let next = current.with_progress(progress, Utc::now())?;
        let stored = self
            .store
            .update_by_id(id, current.status, &RequestPatch::from(&next))
            .await?;

        if let Some(p) = stored.progress {
            self.notifier
                .publish(NotificationEvent::generation_progress(id, p));
        }
        Ok(stored)
    }

    pub async fn get_request(&self, id: RequestId) -> Result<GenerationRequest, PipelineError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::request_not_found(id).into())
    }

    /// The user's requests, most recent first.
    pub async fn list_requests_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<GenerationRequest>, PipelineError> {
        Ok(self.store.list_by_user(user_id).await?)
    }

    /// Every request, most recent first.
    pub async fn list_all_requests(&self) -> Result<Vec<GenerationRequest>, PipelineError> {
        Ok(self.store.list_all().await?)
    }

    /// Delete every request. Confirmation is the caller's job.
    pub async fn clear_all(&self) -> Result<u64, PipelineError> {
        let removed = self.store.delete_all().await?;
        tracing::warn!(removed, "All generation requests cleared");
        self.notifier.publish(NotificationEvent::requests_cleared());
        Ok(removed)
    }

    // ---- private helpers ----

    async fn commit(
        &self,
        previous: &GenerationRequest,
        next: GenerationRequest,
    ) -> Result<GenerationRequest, PipelineError> {
        let stored = self
            .store
            .update_by_id(next.id, previous.status, &RequestPatch::from(&next))
            .await?;

        tracing::info!(
            request_id = %stored.id,
            from = %previous.status,
            to = %stored.status,
            "Generation request status changed",
        );

        self.notifier
            .publish(NotificationEvent::request_updated(stored.id, stored.status));
        if stored.status == RequestStatus::Completed {
            self.alerts.notify(RequestAlert::completed(&stored));
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use brandgen_db::store::{InMemoryRequestStore, StoreChange, StoreError};
    use brandgen_events::{PageChannel, Topic};
    use tokio::sync::{broadcast, oneshot};

    use super::*;

    struct Fixture {
        lifecycle: RequestLifecycle,
        store: Arc<InMemoryRequestStore>,
        seen: Arc<Mutex<Vec<NotificationEvent>>>,
        _subs: Vec<brandgen_events::Subscription>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryRequestStore::new());
        let page = Arc::new(PageChannel::new("test"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subs = Topic::ALL
            .into_iter()
            .map(|topic| {
                let sink = Arc::clone(&seen);
                page.subscribe(
                    topic,
                    Arc::new(move |e: &NotificationEvent| sink.lock().unwrap().push(e.clone())),
                )
            })
            .collect();
        Fixture {
            lifecycle: RequestLifecycle::new(store.clone(), page, Alerts::none()),
            store,
            seen,
            _subs: subs,
        }
    }

    fn requester() -> Requester {
        Requester {
            user_id: uuid::Uuid::new_v4(),
            name: "Ana".into(),
            email: None,
        }
    }

    fn topics(seen: &Mutex<Vec<NotificationEvent>>) -> Vec<Topic> {
        seen.lock().unwrap().iter().map(|e| e.topic()).collect()
    }

    #[tokio::test]
    async fn create_persists_new_request_and_publishes() {
        let f = fixture();
        let req = f
            .lifecycle
            .create_request(
                &requester(),
                NewGenerationRequest::image("  sunset over mountains ").with_aspect_ratio("1:1"),
            )
            .await
            .unwrap();

        assert_eq!(req.status, RequestStatus::New);
        assert_eq!(req.prompt, "sunset over mountains");
        assert_eq!(f.store.len().await, 1);
        assert_eq!(topics(&f.seen), vec![Topic::RequestCreated]);
    }

    #[tokio::test]
    async fn invalid_input_creates_nothing() {
        let f = fixture();
        let err = f
            .lifecycle
            .create_request(&requester(), NewGenerationRequest::image("   "))
            .await
            .unwrap_err();
        assert_matches!(err, PipelineError::Core(CoreError::Validation(_)));
        assert!(f.store.is_empty().await);
        assert!(f.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_user_is_unauthorized() {
        let f = fixture();
        let anonymous = Requester {
            user_id: uuid::Uuid::nil(),
            name: String::new(),
            email: None,
        };
        let err = f
            .lifecycle
            .create_request(&anonymous, NewGenerationRequest::image("logo"))
            .await
            .unwrap_err();
        assert_matches!(err, PipelineError::Core(CoreError::Unauthorized(_)));
        assert!(f.store.is_empty().await);
    }

    #[tokio::test]
    async fn full_happy_path() {
        let f = fixture();
        let req = f
            .lifecycle
            .create_request(&requester(), NewGenerationRequest::image("logo"))
            .await
            .unwrap();

        let submitted = f
            .lifecycle
            .mark_submitted(req.id, "job-1", Some("https://via.placeholder.com/512"))
            .await
            .unwrap();
        assert_eq!(submitted.status, RequestStatus::InProgress);
        assert!(submitted.result_url.is_none());

        let done = f
            .lifecycle
            .update_status(req.id, RequestStatus::Completed, Some("https://cdn/x.png"))
            .await
            .unwrap();
        assert_eq!(done.result_url.as_deref(), Some("https://cdn/x.png"));
        assert!(done.completed_at.is_some());
        assert!(done.placeholder_url.is_none());
        assert_eq!(
            topics(&f.seen),
            vec![Topic::RequestCreated, Topic::RequestUpdated, Topic::RequestUpdated]
        );
    }

    #[tokio::test]
    async fn illegal_transition_leaves_record_unchanged() {
        let f = fixture();
        let req = f
            .lifecycle
            .create_request(&requester(), NewGenerationRequest::image("logo"))
            .await
            .unwrap();
        f.seen.lock().unwrap().clear();

        let err = f
            .lifecycle
            .update_status(req.id, RequestStatus::Completed, Some("https://cdn/x.png"))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            PipelineError::Core(CoreError::InvalidTransition {
                from: RequestStatus::New,
                to: RequestStatus::Completed
            })
        );
        assert_eq!(f.lifecycle.get_request(req.id).await.unwrap(), req);
        assert!(f.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn completing_without_url_is_rejected() {
        let f = fixture();
        let req = f
            .lifecycle
            .create_request(&requester(), NewGenerationRequest::image("logo"))
            .await
            .unwrap();
        f.lifecycle
            .mark_submitted(req.id, "job-1", None)
            .await
            .unwrap();

        let err = f
            .lifecycle
            .update_status(req.id, RequestStatus::Completed, Some("  "))
            .await
            .unwrap_err();
        assert_matches!(err, PipelineError::Core(CoreError::Validation(_)));
        assert_eq!(
            f.lifecycle.get_request(req.id).await.unwrap().status,
            RequestStatus::InProgress
        );
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let f = fixture();
        let err = f
            .lifecycle
            .update_status(uuid::Uuid::now_v7(), RequestStatus::Failed, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn progress_is_clamped_and_refused_after_terminal() {
        let f = fixture();
        let req = f
            .lifecycle
            .create_request(&requester(), NewGenerationRequest::image("logo"))
            .await
            .unwrap();
        f.lifecycle.mark_submitted(req.id, "job-1", None).await.unwrap();

        let updated = f.lifecycle.update_progress(req.id, 250).await.unwrap();
        assert_eq!(updated.progress, Some(99));

        f.lifecycle.mark_failed(req.id, "boom").await.unwrap();
        let err = f.lifecycle.update_progress(req.id, 10).await.unwrap_err();
        assert!(err.is_invalid_transition());
    }

    /// Store whose next `find_by_id` can be held after reading, so another
    /// writer can commit in between.
    #[derive(Default)]
    struct HeldReads {
        inner: InMemoryRequestStore,
        gate: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
    }

    impl HeldReads {
        /// Hold the next read. Returns a signal fired once that read has
        /// happened and the sender that lets it return.
        fn hold_next_read(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
            let (read_tx, read_rx) = oneshot::channel();
            let (resume_tx, resume_rx) = oneshot::channel();
            *self.gate.lock().unwrap() = Some((read_tx, resume_rx));
            (read_rx, resume_tx)
        }
    }

    #[async_trait]
    impl RequestStore for HeldReads {
        async fn insert(&self, request: &GenerationRequest) -> Result<(), StoreError> {
            self.inner.insert(request).await
        }

        async fn update_by_id(
            &self,
            id: RequestId,
            expected: RequestStatus,
            patch: &RequestPatch,
        ) -> Result<GenerationRequest, StoreError> {
            self.inner.update_by_id(id, expected, patch).await
        }

        async fn find_by_id(&self, id: RequestId) -> Result<Option<GenerationRequest>, StoreError> {
            let found = self.inner.find_by_id(id).await?;
            let gate = self.gate.lock().unwrap().take();
            if let Some((read_done, resume)) = gate {
                let _ = read_done.send(());
                let _ = resume.await;
            }
            Ok(found)
        }

        async fn list_all(&self) -> Result<Vec<GenerationRequest>, StoreError> {
            self.inner.list_all().await
        }

        async fn list_by_user(&self, user_id: UserId) -> Result<Vec<GenerationRequest>, StoreError> {
            self.inner.list_by_user(user_id).await
        }

        async fn delete_all(&self) -> Result<u64, StoreError> {
            self.inner.delete_all().await
        }

        fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
            self.inner.subscribe_changes()
        }
    }

    /// An in-progress request on a store with holdable reads.
    async fn racing_fixture() -> (Arc<RequestLifecycle>, Arc<HeldReads>, RequestId) {
        let store = Arc::new(HeldReads::default());
        let lifecycle = Arc::new(RequestLifecycle::new(
            store.clone(),
            Arc::new(PageChannel::new("race")),
            Alerts::none(),
        ));
        let req = lifecycle
            .create_request(&requester(), NewGenerationRequest::image("logo"))
            .await
            .unwrap();
        lifecycle.mark_submitted(req.id, "job-1", None).await.unwrap();
        (lifecycle, store, req.id)
    }

    /// Runs `late` with its read held while an admin completes the request,
    /// then checks the completion survived.
    async fn admin_completion_beats<F, Fut>(late: F) -> PipelineError
    where
        F: FnOnce(Arc<RequestLifecycle>, RequestId) -> Fut,
        Fut: std::future::Future<Output = Result<GenerationRequest, PipelineError>> + Send + 'static,
    {
        let (lifecycle, store, id) = racing_fixture().await;

        let (read_done, resume) = store.hold_next_read();
        let stale = tokio::spawn(late(Arc::clone(&lifecycle), id));
        read_done.await.unwrap();

        let done = lifecycle
            .update_status(id, RequestStatus::Completed, Some("https://cdn/admin.png"))
            .await
            .unwrap();
        assert_eq!(done.status, RequestStatus::Completed);
        resume.send(()).unwrap();

        let err = stale.await.unwrap().unwrap_err();
        let stored = lifecycle.get_request(id).await.unwrap();
        assert_eq!(stored.status, RequestStatus::Completed);
        assert_eq!(stored.result_url.as_deref(), Some("https://cdn/admin.png"));
        assert!(stored.completed_at.is_some());
        assert!(stored.error_message.is_none());
        err
    }

    #[tokio::test]
    async fn stale_progress_write_cannot_reopen_completed_request() {
        let err = admin_completion_beats(|lifecycle, id| async move {
            lifecycle.update_progress(id, 50).await
        })
        .await;
        assert_matches!(err, PipelineError::Core(CoreError::Conflict(_)));
        assert!(err.is_invalid_transition());
    }

    #[tokio::test]
    async fn stale_failure_cannot_override_completion() {
        let err = admin_completion_beats(|lifecycle, id| async move {
            lifecycle.mark_failed(id, "provider error").await
        })
        .await;
        assert_matches!(err, PipelineError::Core(CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn clear_all_empties_store_and_publishes() {
        let f = fixture();
        for prompt in ["a", "b"] {
            f.lifecycle
                .create_request(&requester(), NewGenerationRequest::image(prompt))
                .await
                .unwrap();
        }
        assert_eq!(f.lifecycle.clear_all().await.unwrap(), 2);
        assert!(f.lifecycle.list_all_requests().await.unwrap().is_empty());
        assert_eq!(topics(&f.seen).last(), Some(&Topic::RequestsCleared));
    }

    #[tokio::test]
    async fn user_listing_is_scoped() {
        let f = fixture();
        let ana = requester();
        let bo = requester();
        f.lifecycle
            .create_request(&ana, NewGenerationRequest::image("a"))
            .await
            .unwrap();
        f.lifecycle
            .create_request(&bo, NewGenerationRequest::image("b"))
            .await
            .unwrap();

        let mine = f.lifecycle.list_requests_for_user(ana.user_id).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].prompt, "a");
    }
}
