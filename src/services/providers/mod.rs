use crate::{
    error::AppResult,
    models::{Movie, MovieDetails, MovieId},
};

pub mod tmdb;

pub use tmdb::TmdbProvider;

const IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p";

/// Poster and backdrop sizes served by the image CDN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSize {
    Small,
    Medium,
    Original,
}

impl ImageSize {
    fn as_str(&self) -> &'static str {
        match self {
            ImageSize::Small => "w200",
            ImageSize::Medium => "w500",
            ImageSize::Original => "original",
        }
    }
}

/// Full image URL for a catalog image path such as `/abc.jpg`
pub fn image_url(path: &str, size: ImageSize) -> String {
    format!("{}/{}{}", IMAGE_BASE_URL, size.as_str(), path)
}

/// Read-only movie catalog
///
/// Lookups by id answer `Ok(None)` when the catalog does not know the movie;
/// errors are reserved for transport and upstream failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Search by title. A blank query returns popular movies instead.
    async fn search_movies(&self, query: &str) -> AppResult<Vec<Movie>>;

    async fn popular_movies(&self) -> AppResult<Vec<Movie>>;

    async fn movie(&self, id: MovieId) -> AppResult<Option<Movie>>;

    /// Movie with runtime, genres and the leading cast and crew
    async fn movie_details(&self, id: MovieId) -> AppResult<Option<MovieDetails>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
