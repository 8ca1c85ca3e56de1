use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use crate::{
    db::{RemoteStore, Subscription},
    error::{AppError, AppResult},
    models::{Movie, UserDocument, Watchlist},
};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// In-process document store
///
/// Behaves like the hosted store as far as the session can tell: saves are
/// partial merges and every save is echoed to open subscriptions, including
/// the subscription of the session that wrote it.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

struct MemoryStoreInner {
    documents: Mutex<HashMap<String, UserDocument>>,
    changes: broadcast::Sender<(String, UserDocument)>,
    save_count: AtomicUsize,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    load_delay: Mutex<Option<Duration>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(MemoryStoreInner {
                documents: Mutex::new(HashMap::new()),
                changes,
                save_count: AtomicUsize::new(0),
                fail_loads: AtomicBool::new(false),
                fail_saves: AtomicBool::new(false),
                load_delay: Mutex::new(None),
            }),
        }
    }

    fn documents(&self) -> MutexGuard<'_, HashMap<String, UserDocument>> {
        self.inner
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes a whole document as another device would, notifying subscribers
    pub fn put_document(&self, principal_id: &str, document: UserDocument) {
        self.documents()
            .insert(principal_id.to_string(), document.clone());
        let _ = self.inner.changes.send((principal_id.to_string(), document));
    }

    /// Current stored document, if any
    pub fn document(&self, principal_id: &str) -> Option<UserDocument> {
        self.documents().get(principal_id).cloned()
    }

    /// Number of successful saves across all principals
    pub fn save_count(&self) -> usize {
        self.inner.save_count.load(Ordering::SeqCst)
    }

    pub fn fail_loads(&self, fail: bool) {
        self.inner.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.inner.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent load wait before answering
    pub fn set_load_delay(&self, delay: Option<Duration>) {
        *self
            .inner
            .load_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    fn merge(&self, principal_id: &str, apply: impl FnOnce(&mut UserDocument)) -> AppResult<()> {
        if self.inner.fail_saves.load(Ordering::SeqCst) {
            return Err(AppError::Internal("memory store rejected the write".to_string()));
        }

        let document = {
            let mut documents = self.documents();
            let document = documents.entry(principal_id.to_string()).or_default();
            apply(document);
            document.clone()
        };

        self.inner.save_count.fetch_add(1, Ordering::SeqCst);
        let _ = self.inner.changes.send((principal_id.to_string(), document));
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemoteStore for MemoryStore {
    async fn load(&self, principal_id: &str) -> AppResult<UserDocument> {
        let delay = *self
            .inner
            .load_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.inner.fail_loads.load(Ordering::SeqCst) {
            return Err(AppError::Internal("memory store is unavailable".to_string()));
        }

        Ok(self.document(principal_id).unwrap_or_default())
    }

    async fn subscribe(&self, principal_id: &str) -> AppResult<Subscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Listen before reading so no save slips between the snapshot and the feed
        let mut changes = self.inner.changes.subscribe();

        if let Some(current) = self.document(principal_id) {
            let _ = tx.send(current);
        }

        let principal_id = principal_id.to_string();
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok((owner, document)) => {
                        if owner != principal_id {
                            continue;
                        }
                        if tx.send(document).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Memory store subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::with_cancel(rx, move || task.abort()))
    }

    async fn save_lists(&self, principal_id: &str, lists: &[Watchlist]) -> AppResult<()> {
        self.merge(principal_id, |doc| doc.lists = lists.to_vec())
    }

    async fn save_custom_movies(&self, principal_id: &str, movies: &[Movie]) -> AppResult<()> {
        self.merge(principal_id, |doc| doc.custom_movies = movies.to_vec())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewMovie;

    fn faves() -> Watchlist {
        Watchlist {
            id: "x".to_string(),
            name: "Faves".to_string(),
            movie_ids: vec![5],
            created_at: 10,
        }
    }

    #[test]
    fn test_load_missing_document_is_empty() {
        let store = MemoryStore::new();
        let doc = tokio_test::block_on(store.load("nobody")).unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn test_saves_are_partial_merges() {
        let store = MemoryStore::new();
        let movie = NewMovie::with_year("Home Video", "", 2003).into_movie(1_700_000_000_000);

        tokio_test::block_on(store.save_custom_movies("u1", &[movie.clone()])).unwrap();
        tokio_test::block_on(store.save_lists("u1", &[faves()])).unwrap();

        let doc = store.document("u1").unwrap();
        assert_eq!(doc.lists, vec![faves()]);
        assert_eq!(doc.custom_movies, vec![movie]);
        assert_eq!(store.save_count(), 2);
    }

    #[test]
    fn test_failed_save_leaves_document_untouched() {
        let store = MemoryStore::new();
        store.fail_saves(true);

        let result = tokio_test::block_on(store.save_lists("u1", &[faves()]));
        assert!(result.is_err());
        assert!(store.document("u1").is_none());
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_pushes_current_then_changes() {
        let store = MemoryStore::new();
        store.put_document(
            "u1",
            UserDocument {
                lists: vec![faves()],
                custom_movies: Vec::new(),
            },
        );

        let mut subscription = store.subscribe("u1").await.unwrap();
        let first = subscription.next().await.unwrap();
        assert_eq!(first.lists, vec![faves()]);

        store.save_lists("u2", &[]).await.unwrap();
        store.save_lists("u1", &[]).await.unwrap();

        let second = subscription.next().await.unwrap();
        assert!(second.lists.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_without_document_waits_for_first_save() {
        let store = MemoryStore::new();
        let mut subscription = store.subscribe("u1").await.unwrap();

        store.save_lists("u1", &[faves()]).await.unwrap();

        let pushed = subscription.next().await.unwrap();
        assert_eq!(pushed.lists, vec![faves()]);
    }
}
