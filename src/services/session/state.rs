use std::collections::VecDeque;

use serde::Serialize;

use super::reconcile::reconcile;
use crate::{
    db::PendingWrite,
    models::{
        is_reserved_id, Movie, MovieId, NewMovie, Principal, UserDocument, Watchlist,
        ALREADY_WATCHED_ID, CUSTOM_MOVIES_ID,
    },
    services::identity::IdentityState,
};

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    SignedOut,
    Loading,
    Ready,
}

/// Why a state change happened
///
/// Only local mutations are written back to the store; everything else came
/// from the store (or from the identity gate) and writing it back would echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    LocalMutation,
    RemoteLoad,
    RemoteSubscriptionPush,
    /// Sign-out or principal switch cleared the collections
    SessionReset,
}

/// A committed state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commit {
    pub origin: Origin,
    pub revision: u64,
    pub lists_changed: bool,
    pub custom_movies_changed: bool,
}

/// What the driver has to do after an identity change
#[derive(Debug, Clone, PartialEq)]
pub enum IdentityTransition {
    /// Same principal (or still undetermined); nothing to do
    Unchanged,
    /// Collections cleared; any open subscription must be dropped
    SignedOut(Commit),
    /// A new principal: load and subscribe under `epoch`
    Load {
        epoch: u64,
        principal_id: String,
        commit: Commit,
    },
}

/// Canonical in-memory watchlist state for one session
///
/// Pure and synchronous: it never performs I/O. Remote completions carry the
/// epoch they were started under and are ignored once the epoch has moved on.
#[derive(Debug)]
pub struct SessionState {
    phase: Phase,
    identity_determined: bool,
    principal: Option<Principal>,
    epoch: u64,
    revision: u64,
    lists: Vec<Watchlist>,
    custom_movies: Vec<Movie>,
    last_custom_id: MovieId,
    deferred_push: Option<UserDocument>,
    list_echoes: Echoes<Vec<Watchlist>>,
    custom_movie_echoes: Echoes<Vec<Movie>>,
}

/// Snapshots kept for echo matching; older ones belong to writes that never came back
const MAX_UNCONFIRMED: usize = 16;

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: Phase::SignedOut,
            identity_determined: false,
            principal: None,
            epoch: 0,
            revision: 0,
            lists: Vec::new(),
            custom_movies: Vec::new(),
            last_custom_id: 0,
            deferred_push: None,
            list_echoes: Echoes::default(),
            custom_movie_echoes: Echoes::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn lists(&self) -> &[Watchlist] {
        &self.lists
    }

    pub fn custom_movies(&self) -> &[Movie] {
        &self.custom_movies
    }

    /// False while a load is in flight or before the identity gate has answered
    pub fn is_ready(&self) -> bool {
        match self.phase {
            Phase::SignedOut => self.identity_determined,
            Phase::Loading => false,
            Phase::Ready => true,
        }
    }

    pub fn watchlist(&self, id: &str) -> Option<&Watchlist> {
        self.lists.iter().find(|l| l.id == id)
    }

    fn watchlist_mut(&mut self, id: &str) -> Option<&mut Watchlist> {
        self.lists.iter_mut().find(|l| l.id == id)
    }

    fn record(&mut self, origin: Origin, lists_changed: bool, custom_movies_changed: bool) -> Commit {
        self.revision += 1;
        Commit {
            origin,
            revision: self.revision,
            lists_changed,
            custom_movies_changed,
        }
    }

    fn local(&mut self, lists_changed: bool) -> Option<Commit> {
        lists_changed.then(|| self.record(Origin::LocalMutation, true, false))
    }

    /// Clears both collections and invalidates in-flight remote work
    fn reset(&mut self) -> (bool, bool) {
        self.epoch += 1;
        self.deferred_push = None;
        self.list_echoes = Echoes::default();
        self.custom_movie_echoes = Echoes::default();
        let lists_changed = !self.lists.is_empty();
        let custom_movies_changed = !self.custom_movies.is_empty();
        self.lists.clear();
        self.custom_movies.clear();
        (lists_changed, custom_movies_changed)
    }

    // ------------------------------------------------------------------
    // Identity and remote sync
    // ------------------------------------------------------------------

    pub fn apply_identity(&mut self, identity: &IdentityState) -> IdentityTransition {
        match identity {
            IdentityState::Undetermined => IdentityTransition::Unchanged,
            IdentityState::SignedOut => {
                let first_answer = !self.identity_determined;
                self.identity_determined = true;
                if self.principal.is_none() && self.phase == Phase::SignedOut && !first_answer {
                    return IdentityTransition::Unchanged;
                }

                self.principal = None;
                self.phase = Phase::SignedOut;
                let (lists_changed, custom_movies_changed) = self.reset();
                IdentityTransition::SignedOut(self.record(
                    Origin::SessionReset,
                    lists_changed,
                    custom_movies_changed,
                ))
            }
            IdentityState::SignedIn(principal) => {
                self.identity_determined = true;
                if let Some(current) = self.principal.as_mut() {
                    if current.uid == principal.uid {
                        *current = principal.clone();
                        return IdentityTransition::Unchanged;
                    }
                }

                self.principal = Some(principal.clone());
                self.phase = Phase::Loading;
                let (lists_changed, custom_movies_changed) = self.reset();
                let commit =
                    self.record(Origin::SessionReset, lists_changed, custom_movies_changed);

                IdentityTransition::Load {
                    epoch: self.epoch,
                    principal_id: principal.uid.clone(),
                    commit,
                }
            }
        }
    }

    /// Commits the initial load, backfilling reserved lists. `None` if stale.
    pub fn apply_load(&mut self, epoch: u64, document: UserDocument) -> Option<Commit> {
        if epoch != self.epoch || self.phase != Phase::Loading {
            return None;
        }

        let mut lists = document.lists;
        reconcile(&mut lists);
        self.list_echoes.settle(lists.clone());
        self.custom_movie_echoes.settle(document.custom_movies.clone());
        self.lists = lists;
        self.custom_movies = document.custom_movies;
        self.seed_custom_ids();
        self.phase = Phase::Ready;

        if let Some(pushed) = self.deferred_push.take() {
            self.merge_push(pushed);
        }

        Some(self.record(Origin::RemoteLoad, true, true))
    }

    /// Applies a subscription push. `None` if stale, deferred, or it changed nothing.
    ///
    /// A collection is only replaced when the push carries a non-empty value
    /// for it, so an early empty snapshot never wipes loaded data. Pushes that
    /// arrive before the load are held (latest wins) and replayed after it.
    pub fn apply_push(&mut self, epoch: u64, document: UserDocument) -> Option<Commit> {
        if epoch != self.epoch {
            return None;
        }

        match self.phase {
            Phase::SignedOut => None,
            Phase::Loading => {
                self.deferred_push = Some(document);
                None
            }
            Phase::Ready => {
                let (lists_changed, custom_movies_changed) = self.merge_push(document);
                (lists_changed || custom_movies_changed).then(|| {
                    self.record(
                        Origin::RemoteSubscriptionPush,
                        lists_changed,
                        custom_movies_changed,
                    )
                })
            }
        }
    }

    fn merge_push(&mut self, document: UserDocument) -> (bool, bool) {
        let mut lists_changed = false;
        let mut custom_movies_changed = false;

        if !document.lists.is_empty() {
            let mut lists = document.lists;
            reconcile(&mut lists);
            if self.list_echoes.classify(&lists) == PushKind::Foreign && lists != self.lists {
                self.lists = lists;
                lists_changed = true;
            }
        }

        let movies = document.custom_movies;
        if !movies.is_empty()
            && self.custom_movie_echoes.classify(&movies) == PushKind::Foreign
            && movies != self.custom_movies
        {
            self.custom_movies = movies;
            self.seed_custom_ids();
            custom_movies_changed = true;
        }

        (lists_changed, custom_movies_changed)
    }

    fn seed_custom_ids(&mut self) {
        let highest = self.custom_movies.iter().map(|m| m.id).max().unwrap_or(0);
        self.last_custom_id = self.last_custom_id.max(highest);
    }

    /// Writes owed to the store for a commit
    ///
    /// Only local mutations made while `Ready` for a signed-in principal are
    /// persisted; remote-origin commits are never echoed back. Each written
    /// snapshot is remembered until the store pushes it back.
    pub fn pending_writes(&mut self, commit: &Commit) -> Vec<PendingWrite> {
        let principal_id = match (&self.principal, commit.origin, self.phase) {
            (Some(principal), Origin::LocalMutation, Phase::Ready) => principal.uid.clone(),
            _ => return Vec::new(),
        };

        let mut writes = Vec::new();
        if commit.lists_changed {
            self.list_echoes.remember(self.lists.clone());
            writes.push(PendingWrite::Lists {
                principal_id: principal_id.clone(),
                lists: self.lists.clone(),
            });
        }
        if commit.custom_movies_changed {
            self.custom_movie_echoes.remember(self.custom_movies.clone());
            writes.push(PendingWrite::CustomMovies {
                principal_id,
                movies: self.custom_movies.clone(),
            });
        }
        writes
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Appends a new, empty list. A blank name is ignored.
    pub fn create_watchlist(&mut self, name: &str) -> Option<(Watchlist, Commit)> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let list = Watchlist::new(name.to_string());
        self.lists.push(list.clone());
        let commit = self.record(Origin::LocalMutation, true, false);
        Some((list, commit))
    }

    /// Removes a list. Reserved and unknown ids are ignored.
    pub fn delete_watchlist(&mut self, id: &str) -> Option<Commit> {
        if is_reserved_id(id) {
            return None;
        }

        let before = self.lists.len();
        self.lists.retain(|l| l.id != id);
        let changed = self.lists.len() != before;
        self.local(changed)
    }

    pub fn add_movie_to_watchlist(&mut self, list_id: &str, movie_id: MovieId) -> Option<Commit> {
        let changed = self
            .watchlist_mut(list_id)
            .map(|l| l.push_movie(movie_id))
            .unwrap_or(false);
        self.local(changed)
    }

    pub fn remove_movie_from_watchlist(
        &mut self,
        list_id: &str,
        movie_id: MovieId,
    ) -> Option<Commit> {
        let changed = self
            .watchlist_mut(list_id)
            .map(|l| l.remove_movie(movie_id))
            .unwrap_or(false);
        self.local(changed)
    }

    /// Moves a movie into "Already Watched"
    pub fn mark_as_watched(&mut self, from_list_id: &str, movie_id: MovieId) -> Option<Commit> {
        self.transfer(from_list_id, ALREADY_WATCHED_ID, movie_id)
    }

    pub fn move_movie_to_watchlist(
        &mut self,
        from_list_id: &str,
        to_list_id: &str,
        movie_id: MovieId,
    ) -> Option<Commit> {
        self.transfer(from_list_id, to_list_id, movie_id)
    }

    /// Removes from the source and appends to the destination in one commit
    ///
    /// Same source and destination leaves membership and order untouched. An
    /// unknown destination is ignored so the movie is never dropped.
    fn transfer(&mut self, from_list_id: &str, to_list_id: &str, movie_id: MovieId) -> Option<Commit> {
        if from_list_id == to_list_id || self.watchlist(to_list_id).is_none() {
            return None;
        }

        let removed = self
            .watchlist_mut(from_list_id)
            .map(|l| l.remove_movie(movie_id))
            .unwrap_or(false);
        let added = self
            .watchlist_mut(to_list_id)
            .map(|l| l.push_movie(movie_id))
            .unwrap_or(false);

        self.local(removed || added)
    }

    /// Creates a custom movie and files it under "My Custom Movies" in the same commit
    ///
    /// Ids come from the millisecond clock but never repeat or go backwards.
    /// Outside `Ready` the reserved lists are backfilled first so the new id
    /// always has a list to land in.
    pub fn add_custom_movie(&mut self, data: NewMovie, now_ms: i64) -> (Movie, Commit) {
        let id = now_ms.max(self.last_custom_id + 1);
        self.last_custom_id = id;

        let movie = data.into_movie(id);
        self.custom_movies.push(movie.clone());
        let backfilled = reconcile(&mut self.lists);
        let added = self
            .watchlist_mut(CUSTOM_MOVIES_ID)
            .map(|l| l.push_movie(id))
            .unwrap_or(false);
        let lists_changed = backfilled || added;

        let commit = self.record(Origin::LocalMutation, lists_changed, true);
        (movie, commit)
    }

    /// Looks up a custom movie. Catalog ids are never found here.
    pub fn get_movie(&self, id: MovieId) -> Option<&Movie> {
        self.custom_movies.iter().find(|m| m.id == id)
    }
}

/// How a pushed collection relates to our own writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushKind {
    /// One of our writes coming back
    OwnEcho,
    /// The store's value from before our pending writes; they have not landed yet
    Stale,
    Foreign,
}

/// Echo bookkeeping for one persisted collection
///
/// `confirmed` is the last value known to be in the store. `unconfirmed`
/// holds snapshots written since, oldest first. A store that pushes the whole
/// document after each field write will repeat `confirmed` for the field that
/// has not been written yet; that is not a change from elsewhere.
#[derive(Debug)]
struct Echoes<T> {
    confirmed: Option<T>,
    unconfirmed: VecDeque<T>,
}

impl<T> Default for Echoes<T> {
    fn default() -> Self {
        Self {
            confirmed: None,
            unconfirmed: VecDeque::new(),
        }
    }
}

impl<T: Clone + PartialEq> Echoes<T> {
    fn settle(&mut self, value: T) {
        self.confirmed = Some(value);
        self.unconfirmed.clear();
    }

    fn remember(&mut self, snapshot: T) {
        if self.unconfirmed.len() == MAX_UNCONFIRMED {
            self.unconfirmed.pop_front();
        }
        self.unconfirmed.push_back(snapshot);
    }

    /// A matching snapshot confirms it and every older one. Anything that is
    /// neither ours nor the stale confirmed value is a change from elsewhere,
    /// after which pending snapshots are no longer trusted.
    fn classify(&mut self, pushed: &T) -> PushKind {
        if let Some(index) = self.unconfirmed.iter().position(|s| s == pushed) {
            self.unconfirmed.drain(..index);
            if let Some(snapshot) = self.unconfirmed.pop_front() {
                self.confirmed = Some(snapshot);
            }
            return PushKind::OwnEcho;
        }

        if !self.unconfirmed.is_empty() && self.confirmed.as_ref() == Some(pushed) {
            return PushKind::Stale;
        }

        self.settle(pushed.clone());
        PushKind::Foreign
    }
}
