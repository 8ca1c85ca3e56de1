use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use super::MovieId;

/// Reserved list holding movies the user has already seen
pub const ALREADY_WATCHED_ID: &str = "already-watched";
/// Reserved list every custom movie is added to on creation
pub const CUSTOM_MOVIES_ID: &str = "custom-movies";

const ALREADY_WATCHED_NAME: &str = "Already Watched";
const CUSTOM_MOVIES_NAME: &str = "My Custom Movies";

/// A named, ordered collection of movie references
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Watchlist {
    pub id: String,
    pub name: String,
    /// Insertion order is display order
    #[serde(default)]
    pub movie_ids: Vec<MovieId>,
    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub created_at: i64,
}

impl Watchlist {
    /// Creates an empty list with a fresh id, stamped now
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            movie_ids: Vec::new(),
            created_at: Utc::now().timestamp_millis(),
        }
    }

    /// Default "Already Watched" list, synthesized when missing
    pub fn already_watched() -> Self {
        Self {
            id: ALREADY_WATCHED_ID.to_string(),
            name: ALREADY_WATCHED_NAME.to_string(),
            movie_ids: Vec::new(),
            created_at: 0,
        }
    }

    /// Default "My Custom Movies" list, synthesized when missing
    pub fn custom_movies() -> Self {
        Self {
            id: CUSTOM_MOVIES_ID.to_string(),
            name: CUSTOM_MOVIES_NAME.to_string(),
            movie_ids: Vec::new(),
            created_at: 1,
        }
    }

    pub fn is_reserved(&self) -> bool {
        is_reserved_id(&self.id)
    }

    pub fn contains(&self, movie_id: MovieId) -> bool {
        self.movie_ids.contains(&movie_id)
    }

    /// Appends a movie id unless it is already present. Returns whether the list changed.
    pub fn push_movie(&mut self, movie_id: MovieId) -> bool {
        if self.contains(movie_id) {
            return false;
        }
        self.movie_ids.push(movie_id);
        true
    }

    /// Removes a movie id, keeping the order of the rest. Returns whether the list changed.
    pub fn remove_movie(&mut self, movie_id: MovieId) -> bool {
        let before = self.movie_ids.len();
        self.movie_ids.retain(|id| *id != movie_id);
        self.movie_ids.len() != before
    }

    /// Drops repeated movie ids, keeping the first occurrence
    pub fn dedup_movies(&mut self) -> bool {
        let before = self.movie_ids.len();
        let mut seen = std::collections::HashSet::with_capacity(before);
        self.movie_ids.retain(|id| seen.insert(*id));
        self.movie_ids.len() != before
    }
}

/// Whether the id belongs to one of the two non-deletable lists
pub fn is_reserved_id(id: &str) -> bool {
    id == ALREADY_WATCHED_ID || id == CUSTOM_MOVIES_ID
}

fn display_rank(list: &Watchlist) -> u8 {
    match list.id.as_str() {
        ALREADY_WATCHED_ID => 0,
        CUSTOM_MOVIES_ID => 1,
        _ => 2,
    }
}

/// Orders lists for display: "Already Watched", then "My Custom Movies", then newest first
pub fn sort_for_display(lists: &[Watchlist]) -> Vec<Watchlist> {
    let mut sorted = lists.to_vec();
    sorted.sort_by(|a, b| match display_rank(a).cmp(&display_rank(b)) {
        Ordering::Equal => b.created_at.cmp(&a.created_at),
        other => other,
    });
    sorted
}
