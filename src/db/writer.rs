use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{
    db::RemoteStore,
    error::AppResult,
    models::{Movie, Watchlist},
};

/// One collection snapshot waiting to be written for a principal
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    Lists {
        principal_id: String,
        lists: Vec<Watchlist>,
    },
    CustomMovies {
        principal_id: String,
        movies: Vec<Movie>,
    },
}

impl PendingWrite {
    pub fn principal_id(&self) -> &str {
        match self {
            PendingWrite::Lists { principal_id, .. }
            | PendingWrite::CustomMovies { principal_id, .. } => principal_id,
        }
    }

    fn collection(&self) -> &'static str {
        match self {
            PendingWrite::Lists { .. } => "lists",
            PendingWrite::CustomMovies { .. } => "custom_movies",
        }
    }
}

/// Fire-and-forget writer in front of the remote store
///
/// Enqueuing never blocks and never fails from the caller's point of view.
/// A background task performs the writes in order; failures are logged and
/// dropped, never retried.
#[derive(Clone)]
pub struct PersistenceWriter {
    write_tx: mpsc::UnboundedSender<PendingWrite>,
}

/// Handle for gracefully shutting down the persistence writer
pub struct PersistenceWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl PersistenceWriterHandle {
    /// Initiates a graceful shutdown of the writer
    ///
    /// Sends a shutdown signal and waits until every write queued before the
    /// signal has been attempted.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Persistence writer shutdown signal sent");
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Persistence writer task ended abnormally");
        }
    }
}

impl PersistenceWriter {
    /// Creates a writer and spawns its background task
    pub fn spawn(store: Arc<dyn RemoteStore>) -> (Self, PersistenceWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            Self::writer_task(store, write_rx, shutdown_rx).await;
        });

        (Self { write_tx }, PersistenceWriterHandle { shutdown_tx, task })
    }

    /// Background task that drains the write queue
    ///
    /// On shutdown it flushes whatever is already queued before exiting.
    async fn writer_task(
        store: Arc<dyn RemoteStore>,
        mut write_rx: mpsc::UnboundedReceiver<PendingWrite>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(store = store.name(), "Persistence writer task started");

        loop {
            tokio::select! {
                Some(write) = write_rx.recv() => {
                    Self::write_logged(store.as_ref(), write).await;
                }
                Some(()) = shutdown_rx.recv() => {
                    let mut flushed = 0usize;
                    while let Ok(write) = write_rx.try_recv() {
                        Self::write_logged(store.as_ref(), write).await;
                        flushed += 1;
                    }

                    tracing::info!(flushed, "Persistence writer task stopped");
                    break;
                }
                else => break,
            }
        }
    }

    async fn write_logged(store: &dyn RemoteStore, write: PendingWrite) {
        let collection = write.collection();
        let principal = write.principal_id().to_string();

        match Self::write(store, write).await {
            Ok(()) => {
                tracing::debug!(principal = %principal, collection, "Collection saved");
            }
            Err(e) => {
                tracing::error!(error = %e, principal = %principal, collection, "Failed to save collection");
            }
        }
    }

    async fn write(store: &dyn RemoteStore, write: PendingWrite) -> AppResult<()> {
        match write {
            PendingWrite::Lists {
                principal_id,
                lists,
            } => store.save_lists(&principal_id, &lists).await,
            PendingWrite::CustomMovies {
                principal_id,
                movies,
            } => store.save_custom_movies(&principal_id, &movies).await,
        }
    }

    /// Queues a write without waiting for it
    pub fn enqueue(&self, write: PendingWrite) {
        if let Err(e) = self.write_tx.send(write) {
            tracing::error!(error = %e, "Failed to queue write, persistence writer is gone");
        }
    }
}
