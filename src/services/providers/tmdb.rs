/// TMDB catalog provider
///
/// API Flow:
/// 1. Search: /search/movie?query= → paged movie results
/// 2. Popular: /movie/popular → paged movie results
/// 3. Lookup: /movie/{id} (details add `append_to_response=credits`)
use crate::{
    error::{AppError, AppResult},
    models::{Movie, MovieDetails, MovieId, TmdbMovie, TmdbMovieDetails, TmdbPage},
    services::providers::CatalogProvider,
};
use reqwest::{Client as HttpClient, Response, StatusCode};
use serde::de::DeserializeOwned;

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
}

impl TmdbProvider {
    pub fn new(api_key: String, api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> AppResult<Response> {
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;

        Ok(response)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> AppResult<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "TMDB API returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    async fn fetch_page(&self, path: &str, query: &[(&str, &str)]) -> AppResult<Vec<Movie>> {
        let response = self.get(path, query).await?;
        let page: TmdbPage = Self::parse(response).await?;
        Ok(page.results.into_iter().map(Movie::from).collect())
    }

    /// Lookup by id; any non-success status reads as "not in the catalog"
    async fn fetch_by_id<T: DeserializeOwned>(
        &self,
        id: MovieId,
        query: &[(&str, &str)],
    ) -> AppResult<Option<T>> {
        let response = self.get(&format!("/movie/{}", id), query).await?;

        if !response.status().is_success() {
            let status = response.status();
            if status != StatusCode::NOT_FOUND {
                tracing::warn!(movie_id = id, status = %status, "TMDB lookup failed");
            }
            return Ok(None);
        }

        Ok(Some(response.json().await?))
    }
}

#[async_trait::async_trait]
impl CatalogProvider for TmdbProvider {
    async fn search_movies(&self, query: &str) -> AppResult<Vec<Movie>> {
        let query = query.trim();
        if query.is_empty() {
            return self.popular_movies().await;
        }

        let movies = self.fetch_page("/search/movie", &[("query", query)]).await?;
        tracing::info!(
            query = %query,
            results_count = movies.len(),
            provider = self.name(),
            "Movie search completed"
        );

        Ok(movies)
    }

    async fn popular_movies(&self) -> AppResult<Vec<Movie>> {
        let movies = self.fetch_page("/movie/popular", &[]).await?;
        tracing::debug!(results_count = movies.len(), "Fetched popular movies");
        Ok(movies)
    }

    async fn movie(&self, id: MovieId) -> AppResult<Option<Movie>> {
        let movie: Option<TmdbMovie> = self.fetch_by_id(id, &[]).await?;
        Ok(movie.map(Movie::from))
    }

    async fn movie_details(&self, id: MovieId) -> AppResult<Option<MovieDetails>> {
        let details: Option<TmdbMovieDetails> = self
            .fetch_by_id(id, &[("append_to_response", "credits")])
            .await?;
        Ok(details.map(MovieDetails::from))
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}
