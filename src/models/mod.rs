use serde::{Deserialize, Serialize};

pub mod principal;
pub mod user_document;
pub mod watchlist;

pub use principal::Principal;
pub use user_document::UserDocument;
pub use watchlist::{
    is_reserved_id, sort_for_display, Watchlist, ALREADY_WATCHED_ID, CUSTOM_MOVIES_ID,
};

/// Movie identifier, shared by catalog and custom movies
pub type MovieId = i64;

/// Ids above this are almost certainly clock-generated custom ids, not catalog ids
pub const CUSTOM_ID_THRESHOLD: MovieId = 1_000_000_000_000;

/// A catalog or user-authored film
///
/// Field names follow the persisted document, so catalog fields stay snake_case
/// while the custom flag is `isCustom`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(rename = "isCustom", default, skip_serializing_if = "Option::is_none")]
    pub is_custom: Option<bool>,
}

impl Movie {
    pub fn is_custom(&self) -> bool {
        self.is_custom.unwrap_or(false)
    }

    pub fn is_likely_custom_id(id: MovieId) -> bool {
        id > CUSTOM_ID_THRESHOLD
    }

    /// Year part of the release date, if any
    pub fn release_year(&self) -> Option<i32> {
        self.release_date.get(..4).and_then(|y| y.parse().ok())
    }
}

/// Movie fields supplied when authoring a custom movie; the id is assigned on creation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewMovie {
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub vote_average: f64,
}

impl NewMovie {
    /// Custom movie with only a title and release year, as entered by hand
    pub fn with_year(title: impl Into<String>, overview: impl Into<String>, year: i32) -> Self {
        Self {
            title: title.into(),
            overview: overview.into(),
            poster_path: None,
            release_date: format!("{}-01-01", year),
            vote_average: 0.0,
        }
    }

    pub(crate) fn into_movie(self, id: MovieId) -> Movie {
        Movie {
            id,
            title: self.title,
            overview: self.overview,
            poster_path: self.poster_path,
            release_date: self.release_date,
            vote_average: self.vote_average,
            is_custom: Some(true),
        }
    }
}

/// Extended movie information with credits, fetched on demand from the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieDetails {
    pub id: MovieId,
    pub title: String,
    pub overview: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: String,
    pub vote_average: f64,
    pub runtime: Option<u32>,
    pub genres: Vec<Genre>,
    pub tagline: String,
    pub status: String,
    pub budget: u64,
    pub revenue: u64,
    pub cast: Vec<CastMember>,
    pub crew: Vec<CrewMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Genre {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CastMember {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub character: String,
    #[serde(default)]
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrewMember {
    pub id: u64,
    pub name: String,
    pub job: String,
    #[serde(default)]
    pub department: String,
}

// ============================================================================
// TMDB API Types
// ============================================================================

/// Paged result envelope returned by TMDB list endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbPage {
    #[serde(default)]
    pub results: Vec<TmdbMovie>,
    #[serde(default)]
    #[allow(dead_code)]
    pub page: u32,
    #[serde(default)]
    #[allow(dead_code)]
    pub total_pages: u32,
}

/// Raw TMDB movie record
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovie {
    pub id: MovieId,
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
}

impl From<TmdbMovie> for Movie {
    fn from(movie: TmdbMovie) -> Self {
        Movie {
            id: movie.id,
            title: movie.title,
            overview: movie.overview.unwrap_or_default(),
            poster_path: movie.poster_path,
            release_date: movie.release_date.unwrap_or_default(),
            vote_average: movie.vote_average,
            is_custom: None,
        }
    }
}

/// Raw TMDB `/movie/{id}?append_to_response=credits` response
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMovieDetails {
    pub id: MovieId,
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub budget: u64,
    #[serde(default)]
    pub revenue: u64,
    #[serde(default)]
    pub credits: Option<TmdbCredits>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TmdbCredits {
    #[serde(default)]
    pub cast: Vec<CastMember>,
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

const MAX_CAST: usize = 10;
const MAX_CREW: usize = 5;
const CREW_JOBS: [&str; 4] = ["Director", "Producer", "Screenplay", "Writer"];

impl From<TmdbMovieDetails> for MovieDetails {
    fn from(details: TmdbMovieDetails) -> Self {
        let credits = details.credits.unwrap_or_default();

        MovieDetails {
            id: details.id,
            title: details.title,
            overview: details.overview.unwrap_or_default(),
            poster_path: details.poster_path,
            backdrop_path: details.backdrop_path,
            release_date: details.release_date.unwrap_or_default(),
            vote_average: details.vote_average,
            runtime: details.runtime,
            genres: details.genres,
            tagline: details.tagline.unwrap_or_default(),
            status: details.status.unwrap_or_default(),
            budget: details.budget,
            revenue: details.revenue,
            cast: credits.cast.into_iter().take(MAX_CAST).collect(),
            crew: credits
                .crew
                .into_iter()
                .filter(|c| CREW_JOBS.contains(&c.job.as_str()))
                .take(MAX_CREW)
                .collect(),
        }
    }
}
