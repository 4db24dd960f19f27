use std::time::Duration;

use async_trait::async_trait;
use brandgen_core::request::{GenerationRequest, RequestStatus};
use brandgen_core::types::{RequestId, UserId};
use serde::Deserialize;
use sqlx::postgres::PgListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::{RequestPatch, RequestStore, StoreChange, StoreError, CHANGE_FEED_CAPACITY};
use crate::models::generation_request::GenerationRequestRow;
use crate::repositories::GenerationRequestRepo;
use crate::DbPool;

/// Postgres channel the table triggers notify on.
pub const CHANGE_CHANNEL: &str = "generation_requests_changed";

/// Delay before re-establishing a dropped `LISTEN` connection.
const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Postgres-backed request store.
///
/// Writes go straight to the `generation_requests` table. The change feed is
/// fed by [`PgRequestStore::spawn_change_listener`], which relays the table
/// triggers' `NOTIFY` payloads, so writes from other processes are seen too.
pub struct PgRequestStore {
    pool: DbPool,
    changes: broadcast::Sender<StoreChange>,
}

/// JSON payload emitted by the table triggers.
#[derive(Debug, Deserialize)]
struct NotifyPayload {
    op: String,
    id: Option<RequestId>,
}

impl PgRequestStore {
    pub fn new(pool: DbPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { pool, changes }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Relay `NOTIFY` messages into the change feed until `cancel` fires.
    ///
    /// Reconnects with a fixed delay if the listener connection drops.
    pub fn spawn_change_listener(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let pool = self.pool.clone();
        let changes = self.changes.clone();

        tokio::spawn(async move {
            loop {
                match listen(&pool, &changes, &cancel).await {
                    Ok(()) => return,
                    Err(e) => {
                        tracing::warn!(error = %e, "Change listener failed, retrying");
                    }
                }
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(LISTENER_RETRY_DELAY) => {}
                }
            }
        })
    }
}

/// Run one listener session. Returns `Ok` only when cancelled.
async fn listen(
    pool: &DbPool,
    changes: &broadcast::Sender<StoreChange>,
    cancel: &CancellationToken,
) -> Result<(), sqlx::Error> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(CHANGE_CHANNEL).await?;
    tracing::info!(channel = CHANGE_CHANNEL, "Listening for request changes");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            notification = listener.recv() => {
                let notification = notification?;
                match parse_change(notification.payload()) {
                    Some(change) => {
                        let _ = changes.send(change);
                    }
                    None => {
                        tracing::warn!(payload = notification.payload(), "Unrecognised change notification");
                    }
                }
            }
        }
    }
}

/// Decode a trigger payload into a [`StoreChange`].
fn parse_change(payload: &str) -> Option<StoreChange> {
    let payload: NotifyPayload = serde_json::from_str(payload).ok()?;
    match (payload.op.as_str(), payload.id) {
        ("INSERT", Some(id)) => Some(StoreChange::Inserted(id)),
        ("UPDATE", Some(id)) => Some(StoreChange::Updated(id)),
        ("DELETE", Some(id)) => Some(StoreChange::Removed(id)),
        ("TRUNCATE", _) => Some(StoreChange::Cleared),
        _ => None,
    }
}

fn into_domain(row: GenerationRequestRow) -> Result<GenerationRequest, StoreError> {
    GenerationRequest::try_from(row).map_err(StoreError::Corrupt)
}

fn into_domain_list(rows: Vec<GenerationRequestRow>) -> Result<Vec<GenerationRequest>, StoreError> {
    rows.into_iter().map(into_domain).collect()
}

#[async_trait]
impl RequestStore for PgRequestStore {
    async fn insert(&self, request: &GenerationRequest) -> Result<(), StoreError> {
        GenerationRequestRepo::insert(&self.pool, request)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                    StoreError::Duplicate(request.id)
                }
                _ => StoreError::Database(e),
            })
    }

    async fn update_by_id(
        &self,
        id: RequestId,
        expected: RequestStatus,
        patch: &RequestPatch,
    ) -> Result<GenerationRequest, StoreError> {
        match GenerationRequestRepo::update_by_id(&self.pool, id, expected, patch).await? {
            Some(row) => into_domain(row),
            // No row matched: tell a missing id apart from a status that moved on.
            None => match GenerationRequestRepo::find_by_id(&self.pool, id).await? {
                Some(_) => Err(StoreError::StatusChanged { id, expected }),
                None => Err(StoreError::NotFound(id)),
            },
        }
    }

    async fn find_by_id(&self, id: RequestId) -> Result<Option<GenerationRequest>, StoreError> {
        GenerationRequestRepo::find_by_id(&self.pool, id)
            .await?
            .map(into_domain)
            .transpose()
    }

    async fn list_all(&self) -> Result<Vec<GenerationRequest>, StoreError> {
        into_domain_list(GenerationRequestRepo::list_all(&self.pool).await?)
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<GenerationRequest>, StoreError> {
        into_domain_list(GenerationRequestRepo::list_by_user(&self.pool, user_id).await?)
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        Ok(GenerationRequestRepo::delete_all(&self.pool).await?)
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
