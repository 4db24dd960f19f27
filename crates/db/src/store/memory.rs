use std::collections::HashMap;

use async_trait::async_trait;
use brandgen_core::request::{GenerationRequest, RequestStatus};
use brandgen_core::types::{RequestId, UserId};
use tokio::sync::{broadcast, RwLock};

use super::{RequestPatch, RequestStore, StoreChange, StoreError, CHANGE_FEED_CAPACITY};

/// Process-local store used for development runs and tests.
///
/// Implements the same contract as the Postgres store, including the change
/// feed, so callers cannot tell the two apart.
pub struct InMemoryRequestStore {
    requests: RwLock<HashMap<RequestId, GenerationRequest>>,
    changes: broadcast::Sender<StoreChange>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            requests: RwLock::new(HashMap::new()),
            changes,
        }
    }

    pub async fn len(&self) -> usize {
        self.requests.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.requests.read().await.is_empty()
    }

    fn notify(&self, change: StoreChange) {
        // Zero receivers is fine; the feed is best effort.
        let _ = self.changes.send(change);
    }
}

impl Default for InMemoryRequestStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Most recent first; v7 ids break ties in creation order.
fn newest_first(mut list: Vec<GenerationRequest>) -> Vec<GenerationRequest> {
    list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    list
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn insert(&self, request: &GenerationRequest) -> Result<(), StoreError> {
        {
            let mut requests = self.requests.write().await;
            if requests.contains_key(&request.id) {
                return Err(StoreError::Duplicate(request.id));
            }
            requests.insert(request.id, request.clone());
        }
        self.notify(StoreChange::Inserted(request.id));
        Ok(())
    }

    async fn update_by_id(
        &self,
        id: RequestId,
        expected: RequestStatus,
        patch: &RequestPatch,
    ) -> Result<GenerationRequest, StoreError> {
        let updated = {
            let mut requests = self.requests.write().await;
            let existing = requests.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            if existing.status != expected {
                return Err(StoreError::StatusChanged { id, expected });
            }
            patch.apply_to(existing);
            existing.clone()
        };
        self.notify(StoreChange::Updated(id));
        Ok(updated)
    }

    async fn find_by_id(&self, id: RequestId) -> Result<Option<GenerationRequest>, StoreError> {
        Ok(self.requests.read().await.get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<GenerationRequest>, StoreError> {
        let all = self.requests.read().await.values().cloned().collect();
        Ok(newest_first(all))
    }

    async fn list_by_user(&self, user_id: UserId) -> Result<Vec<GenerationRequest>, StoreError> {
        let mine = self
            .requests
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(mine))
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let removed = {
            let mut requests = self.requests.write().await;
            let n = requests.len() as u64;
            requests.clear();
            n
        };
        self.notify(StoreChange::Cleared);
        Ok(removed)
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
