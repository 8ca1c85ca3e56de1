//! Reserved-list backfill run when a session's first load lands.
//!
//! Older documents predate one or both reserved lists; they are added in
//! front of the user's own lists without touching those lists. Running the
//! backfill on a collection that already has both is a no-op.

use std::collections::HashSet;

use crate::models::{Watchlist, ALREADY_WATCHED_ID, CUSTOM_MOVIES_ID};

/// Ensures both reserved lists exist exactly once and no list repeats a movie.
/// Returns whether the collection changed.
pub fn reconcile(lists: &mut Vec<Watchlist>) -> bool {
    let mut changed = normalize(lists);

    let has_already_watched = lists.iter().any(|l| l.id == ALREADY_WATCHED_ID);
    let has_custom_movies = lists.iter().any(|l| l.id == CUSTOM_MOVIES_ID);

    // Custom movies ends up first when both are synthesized
    if !has_already_watched {
        lists.insert(0, Watchlist::already_watched());
        changed = true;
    }
    if !has_custom_movies {
        lists.insert(0, Watchlist::custom_movies());
        changed = true;
    }

    changed
}

/// Collapses repeated reserved lists (first wins) and repeated movie ids within a list
fn normalize(lists: &mut Vec<Watchlist>) -> bool {
    let before = lists.len();
    let mut seen_reserved = HashSet::new();
    lists.retain(|l| !l.is_reserved() || seen_reserved.insert(l.id.clone()));

    let mut changed = lists.len() != before;
    for list in lists.iter_mut() {
        if list.dedup_movies() {
            tracing::warn!(list = %list.id, "Dropped repeated movie ids from stored list");
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faves() -> Watchlist {
        Watchlist {
            id: "x".to_string(),
            name: "Faves".to_string(),
            movie_ids: vec![5],
            created_at: 1_700_000_000_000,
        }
    }

    fn reconciled(mut lists: Vec<Watchlist>) -> Vec<Watchlist> {
        reconcile(&mut lists);
        lists
    }

    fn ids(lists: &[Watchlist]) -> Vec<&str> {
        lists.iter().map(|l| l.id.as_str()).collect()
    }

    #[test]
    fn test_empty_collection_gets_both_defaults() {
        let lists = reconciled(Vec::new());
        assert_eq!(ids(&lists), vec![CUSTOM_MOVIES_ID, ALREADY_WATCHED_ID]);
        assert!(lists.iter().all(|l| l.movie_ids.is_empty()));
        assert!(lists.iter().all(|l| l.created_at <= 1));
    }

    #[test]
    fn test_existing_lists_kept_behind_defaults() {
        let lists = reconciled(vec![faves()]);
        assert_eq!(
            ids(&lists),
            vec![CUSTOM_MOVIES_ID, ALREADY_WATCHED_ID, "x"]
        );
        assert_eq!(lists[2], faves());
    }

    #[test]
    fn test_only_missing_default_is_added() {
        let mut watched = Watchlist::already_watched();
        watched.movie_ids = vec![42];

        let mut lists = vec![faves(), watched.clone()];
        assert!(reconcile(&mut lists));
        assert_eq!(ids(&lists), vec![CUSTOM_MOVIES_ID, "x", ALREADY_WATCHED_ID]);
        assert_eq!(lists[2], watched);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let once = reconciled(vec![faves()]);
        let mut twice = once.clone();
        assert!(!reconcile(&mut twice));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_duplicate_reserved_lists_collapse_to_first() {
        let mut first = Watchlist::already_watched();
        first.movie_ids = vec![1];
        let mut second = Watchlist::already_watched();
        second.movie_ids = vec![2];

        let lists = reconciled(vec![first.clone(), Watchlist::custom_movies(), second]);
        assert_eq!(lists.len(), 2);
        assert_eq!(
            lists.iter().filter(|l| l.id == ALREADY_WATCHED_ID).count(),
            1
        );
        assert_eq!(lists[0], first);
    }

    #[test]
    fn test_repeated_movie_ids_dropped() {
        let mut list = faves();
        list.movie_ids = vec![5, 6, 5];

        let lists = reconciled(vec![list]);
        assert_eq!(lists[2].movie_ids, vec![5, 6]);
    }
}
