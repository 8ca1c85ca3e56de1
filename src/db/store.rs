use tokio::sync::mpsc;

use crate::{
    error::AppResult,
    models::{Movie, UserDocument, Watchlist},
};

/// Remote document store holding one document per principal
///
/// The session loads the document once per sign-in, keeps a subscription open
/// for pushes from other devices, and writes each collection back independently.
/// Writes are partial merges: saving lists never touches custom movies and
/// vice versa.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// One-shot fetch. A principal without a document gets an empty one.
    async fn load(&self, principal_id: &str) -> AppResult<UserDocument>;

    /// Opens the push channel for a principal's document
    ///
    /// The subscription may yield zero or more documents. Dropping it unsubscribes.
    async fn subscribe(&self, principal_id: &str) -> AppResult<Subscription>;

    /// Replaces the `lists` field of the document
    async fn save_lists(&self, principal_id: &str, lists: &[Watchlist]) -> AppResult<()>;

    /// Replaces the `customMovies` field of the document
    async fn save_custom_movies(&self, principal_id: &str, movies: &[Movie]) -> AppResult<()>;

    /// Store name for logging and debugging
    fn name(&self) -> &'static str;
}

type CancelFn = Box<dyn FnOnce() + Send>;

/// Live push channel for one principal's document
///
/// Unsubscribes when dropped.
pub struct Subscription {
    updates: mpsc::UnboundedReceiver<UserDocument>,
    cancel: Option<CancelFn>,
}

impl Subscription {
    pub fn new(updates: mpsc::UnboundedReceiver<UserDocument>) -> Self {
        Self {
            updates,
            cancel: None,
        }
    }

    /// Subscription whose teardown also runs `cancel`, e.g. to stop a listener task
    pub fn with_cancel(
        updates: mpsc::UnboundedReceiver<UserDocument>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            updates,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Subscription that never yields
    pub fn closed() -> Self {
        let (_tx, rx) = mpsc::unbounded_channel();
        Self::new(rx)
    }

    /// Waits for the next pushed document. `None` once the channel is gone.
    pub async fn next(&mut self) -> Option<UserDocument> {
        self.updates.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}
