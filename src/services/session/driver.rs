use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{IdentityTransition, WatchlistSession};
use crate::{
    db::RemoteStore,
    models::UserDocument,
    services::identity::{IdentityState, IdentityWatch},
};

/// Completion reported back to the driver by its load and feed tasks
#[derive(Debug)]
enum SyncEvent {
    Loaded { epoch: u64, document: UserDocument },
    Pushed { epoch: u64, document: UserDocument },
    FeedClosed { epoch: u64 },
}

/// Event loop that keeps a session in sync with the identity gate and the store
///
/// One driver per session. It owns the load and subscription tasks for the
/// current principal and replaces them whenever the principal changes.
pub struct SyncDriver {
    session: WatchlistSession,
    store: Arc<dyn RemoteStore>,
    identity: IdentityWatch,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: mpsc::UnboundedReceiver<SyncEvent>,
    load_task: Option<JoinHandle<()>>,
    feed_task: Option<JoinHandle<()>>,
}

/// Handle for stopping the sync driver
pub struct SyncDriverHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SyncDriverHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Sync driver task ended abnormally");
        }
    }
}

impl SyncDriver {
    pub fn spawn(
        session: WatchlistSession,
        store: Arc<dyn RemoteStore>,
        identity: IdentityWatch,
    ) -> SyncDriverHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let driver = Self {
            session,
            store,
            identity,
            events_tx,
            events_rx,
            load_task: None,
            feed_task: None,
        };
        let task = tokio::spawn(driver.run(shutdown_rx));

        SyncDriverHandle { shutdown_tx, task }
    }

    async fn run(mut self, mut shutdown_rx: mpsc::Receiver<()>) {
        tracing::info!(store = self.store.name(), "Sync driver started");

        let initial = self.identity.borrow_and_update().clone();
        self.on_identity(&initial);

        let mut identity_open = true;
        loop {
            tokio::select! {
                changed = self.identity.changed(), if identity_open => {
                    match changed {
                        Ok(()) => {
                            let identity = self.identity.borrow_and_update().clone();
                            self.on_identity(&identity);
                        }
                        Err(_) => {
                            tracing::warn!("Identity gate dropped, keeping current principal");
                            identity_open = false;
                        }
                    }
                }
                Some(event) = self.events_rx.recv() => {
                    self.on_event(event);
                }
                Some(()) = shutdown_rx.recv() => break,
                else => break,
            }
        }

        self.stop_sync();
        tracing::info!("Sync driver stopped");
    }

    fn on_identity(&mut self, identity: &IdentityState) {
        match self.session.apply_identity(identity) {
            IdentityTransition::Unchanged => {}
            IdentityTransition::SignedOut(_) => {
                self.stop_sync();
                tracing::info!("Session cleared after sign-out");
            }
            IdentityTransition::Load {
                epoch,
                principal_id,
                ..
            } => {
                self.stop_sync();
                tracing::info!(principal = %principal_id, epoch, "Loading watchlists");
                self.load_task = Some(self.spawn_load(epoch, principal_id.clone()));
                self.feed_task = Some(self.spawn_feed(epoch, principal_id));
            }
        }
    }

    fn on_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Loaded { epoch, document } => {
                if self.session.apply_load(epoch, document) {
                    let snapshot = self.session.snapshot();
                    tracing::info!(
                        epoch,
                        lists = snapshot.lists.len(),
                        custom_movies = snapshot.custom_movies.len(),
                        "Watchlists ready"
                    );
                } else {
                    tracing::debug!(epoch, "Discarded stale load");
                }
            }
            SyncEvent::Pushed { epoch, document } => {
                if self.session.apply_push(epoch, document) {
                    tracing::debug!(epoch, "Applied remote change");
                }
            }
            SyncEvent::FeedClosed { epoch } => {
                tracing::debug!(epoch, "Subscription feed ended");
            }
        }
    }

    /// Drops the current subscription and abandons any in-flight load
    fn stop_sync(&mut self) {
        if let Some(task) = self.load_task.take() {
            task.abort();
        }
        if let Some(task) = self.feed_task.take() {
            task.abort();
        }
    }

    fn spawn_load(&self, epoch: u64, principal_id: String) -> JoinHandle<()> {
        let store = self.store.clone();
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            let document = match store.load(&principal_id).await {
                Ok(document) => document,
                Err(e) => {
                    tracing::error!(error = %e, principal = %principal_id, "Failed to load watchlists, starting empty");
                    UserDocument::default()
                }
            };
            let _ = events_tx.send(SyncEvent::Loaded { epoch, document });
        })
    }

    /// Forwards pushes until the feed ends; aborting the task drops the subscription
    fn spawn_feed(&self, epoch: u64, principal_id: String) -> JoinHandle<()> {
        let store = self.store.clone();
        let events_tx = self.events_tx.clone();

        tokio::spawn(async move {
            match store.subscribe(&principal_id).await {
                Ok(mut subscription) => {
                    while let Some(document) = subscription.next().await {
                        if events_tx.send(SyncEvent::Pushed { epoch, document }).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, principal = %principal_id, "Failed to subscribe to watchlist changes");
                }
            }
            let _ = events_tx.send(SyncEvent::FeedClosed { epoch });
        })
    }
}
