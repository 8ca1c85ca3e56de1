pub mod driver;
pub mod observers;
pub mod reconcile;
pub mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;

pub use driver::{SyncDriver, SyncDriverHandle};
pub use observers::{ChangeEvent, ObserverHandle, ObserverRegistry};
pub use state::{Commit, IdentityTransition, Origin, Phase, SessionState};

use crate::{
    db::{PersistenceWriter, PersistenceWriterHandle, RemoteStore},
    models::{sort_for_display, Movie, MovieId, NewMovie, Principal, UserDocument, Watchlist},
    services::identity::{IdentityGate, IdentityState},
};

/// Point-in-time copy of the session for consumers
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub principal: Option<Principal>,
    pub phase: Phase,
    pub is_ready: bool,
    pub lists: Vec<Watchlist>,
    pub custom_movies: Vec<Movie>,
}

/// Handle to the watchlist state of the signed-in user
///
/// Cheap to clone. Mutations are synchronous and immediately visible to every
/// clone; persistence happens in the background. Reads hand out copies.
#[derive(Clone)]
pub struct WatchlistSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    state: Mutex<SessionState>,
    writer: PersistenceWriter,
    observers: ObserverRegistry,
}

/// Stops the sync driver and the persistence writer
pub struct SessionHandle {
    driver: SyncDriverHandle,
    writer: PersistenceWriterHandle,
}

impl SessionHandle {
    /// Stops reacting to identity and pushes, then flushes queued writes
    pub async fn shutdown(self) {
        self.driver.shutdown().await;
        self.writer.shutdown().await;
    }
}

impl WatchlistSession {
    /// Builds a session bound to `identity` and starts syncing it with `store`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(store: Arc<dyn RemoteStore>, identity: &IdentityGate) -> (Self, SessionHandle) {
        let (writer, writer_handle) = PersistenceWriter::spawn(store.clone());
        let session = Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(SessionState::new()),
                writer,
                observers: ObserverRegistry::default(),
            }),
        };

        let driver = SyncDriver::spawn(session.clone(), store, identity.subscribe());
        tracing::info!("Watchlist session started");

        (
            session,
            SessionHandle {
                driver,
                writer: writer_handle,
            },
        )
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs a transition, queues the writes it owes, then notifies observers
    ///
    /// Writes are queued under the lock so they reach the writer in commit
    /// order; observers run after it is released.
    fn commit<T>(&self, transition: impl FnOnce(&mut SessionState) -> (T, Option<Commit>)) -> T {
        let (value, commit) = {
            let mut state = self.state();
            let (value, commit) = transition(&mut state);
            if let Some(commit) = &commit {
                for write in state.pending_writes(commit) {
                    self.inner.writer.enqueue(write);
                }
            }
            (value, commit)
        };

        if let Some(commit) = commit {
            self.inner.observers.notify(commit.into());
        }
        value
    }

    fn commit_unit(&self, transition: impl FnOnce(&mut SessionState) -> Option<Commit>) -> bool {
        self.commit(|state| {
            let commit = transition(state);
            (commit.is_some(), commit)
        })
    }

    pub(crate) fn apply_identity(&self, identity: &IdentityState) -> IdentityTransition {
        let transition = self.state().apply_identity(identity);
        match &transition {
            IdentityTransition::SignedOut(commit) | IdentityTransition::Load { commit, .. } => {
                self.inner.observers.notify((*commit).into());
            }
            IdentityTransition::Unchanged => {}
        }
        transition
    }

    pub(crate) fn apply_load(&self, epoch: u64, document: UserDocument) -> bool {
        self.commit_unit(|state| state.apply_load(epoch, document))
    }

    pub(crate) fn apply_push(&self, epoch: u64, document: UserDocument) -> bool {
        self.commit_unit(|state| state.apply_push(epoch, document))
    }

    // Reads

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state();
        SessionSnapshot {
            principal: state.principal().cloned(),
            phase: state.phase(),
            is_ready: state.is_ready(),
            lists: state.lists().to_vec(),
            custom_movies: state.custom_movies().to_vec(),
        }
    }

    pub fn lists(&self) -> Vec<Watchlist> {
        self.state().lists().to_vec()
    }

    /// Lists in the order they are shown to the user
    pub fn display_lists(&self) -> Vec<Watchlist> {
        sort_for_display(self.state().lists())
    }

    pub fn custom_movies(&self) -> Vec<Movie> {
        self.state().custom_movies().to_vec()
    }

    pub fn watchlist(&self, id: &str) -> Option<Watchlist> {
        self.state().watchlist(id).cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    pub fn phase(&self) -> Phase {
        self.state().phase()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.state().principal().cloned()
    }

    pub fn revision(&self) -> u64 {
        self.state().revision()
    }

    /// Registers a callback run after every committed change
    pub fn on_change(&self, callback: impl Fn(ChangeEvent) + Send + Sync + 'static) -> ObserverHandle {
        self.inner.observers.register(callback)
    }

    /// Waits until `condition` holds for the session state or `timeout` passes
    ///
    /// Returns whether the condition was met. Rechecked after every commit.
    pub async fn wait_for(
        &self,
        condition: impl Fn(&SessionState) -> bool,
        timeout: Duration,
    ) -> bool {
        let changed = Arc::new(Notify::new());
        let notifier = changed.clone();
        let _observer = self.on_change(move |_| notifier.notify_one());

        let wait = async {
            loop {
                let met = condition(&*self.state());
                if met {
                    break;
                }
                changed.notified().await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// Waits for the first load of `principal_id` to commit
    pub async fn wait_until_loaded(&self, principal_id: &str, timeout: Duration) -> bool {
        self.wait_for(
            |state| {
                state.phase() == Phase::Ready
                    && state.principal().is_some_and(|p| p.uid == principal_id)
            },
            timeout,
        )
        .await
    }

    // Mutations

    pub fn create_watchlist(&self, name: &str) -> Option<Watchlist> {
        let list = self.commit(|state| match state.create_watchlist(name) {
            Some((list, commit)) => (Some(list), Some(commit)),
            None => (None, None),
        })?;
        tracing::debug!(list = %list.id, name = %list.name, "Watchlist created");
        Some(list)
    }

    pub fn delete_watchlist(&self, id: &str) -> bool {
        self.commit_unit(|state| state.delete_watchlist(id))
    }

    pub fn add_movie_to_watchlist(&self, list_id: &str, movie: &Movie) -> bool {
        self.commit_unit(|state| state.add_movie_to_watchlist(list_id, movie.id))
    }

    pub fn remove_movie_from_watchlist(&self, list_id: &str, movie_id: MovieId) -> bool {
        self.commit_unit(|state| state.remove_movie_from_watchlist(list_id, movie_id))
    }

    pub fn mark_as_watched(&self, from_list_id: &str, movie: &Movie) -> bool {
        self.commit_unit(|state| state.mark_as_watched(from_list_id, movie.id))
    }

    pub fn move_movie_to_watchlist(&self, from_list_id: &str, to_list_id: &str, movie_id: MovieId) -> bool {
        self.commit_unit(|state| state.move_movie_to_watchlist(from_list_id, to_list_id, movie_id))
    }

    pub fn add_custom_movie(&self, data: NewMovie) -> Movie {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let movie = self.commit(|state| {
            let (movie, commit) = state.add_custom_movie(data, now_ms);
            (movie, Some(commit))
        });
        tracing::debug!(movie = movie.id, title = %movie.title, "Custom movie added");
        movie
    }

    /// Custom movie by id; catalog movies are never held here
    pub fn get_movie(&self, id: MovieId) -> Option<Movie> {
        self.state().get_movie(id).cloned()
    }
}
