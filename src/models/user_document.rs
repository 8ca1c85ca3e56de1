use serde::{Deserialize, Serialize};

use super::{Movie, Watchlist};

/// Per-principal document held by the remote store
///
/// Both fields are optional on read. Older documents stored lists under
/// `watchlists`, which is still accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    #[serde(default, alias = "watchlists")]
    pub lists: Vec<Watchlist>,
    #[serde(default)]
    pub custom_movies: Vec<Movie>,
}

impl UserDocument {
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty() && self.custom_movies.is_empty()
    }

    /// Parses a stored document, treating anything malformed as empty
    pub fn from_json_lenient(json: &str) -> Self {
        serde_json::from_str(json).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Malformed user document, treating as empty");
            Self::default()
        })
    }
}
