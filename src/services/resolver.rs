use crate::{
    error::{AppError, AppResult},
    models::{Movie, MovieId},
    services::{providers::CatalogProvider, session::WatchlistSession},
};

/// Movies of a list, in list order
///
/// Custom movies come from the session. Catalog ids are looked up one by one;
/// misses and failures are logged and left out rather than failing the list.
pub async fn resolve_list_movies(
    session: &WatchlistSession,
    catalog: &dyn CatalogProvider,
    list_id: &str,
) -> AppResult<Vec<Movie>> {
    let list = session
        .watchlist(list_id)
        .ok_or_else(|| AppError::NotFound(format!("Watchlist {} not found", list_id)))?;

    let mut movies = Vec::with_capacity(list.movie_ids.len());
    for id in list.movie_ids {
        if let Some(movie) = resolve_movie(session, catalog, id).await {
            movies.push(movie);
        }
    }

    tracing::debug!(
        list = %list_id,
        resolved = movies.len(),
        provider = catalog.name(),
        "Resolved list movies"
    );

    Ok(movies)
}

async fn resolve_movie(
    session: &WatchlistSession,
    catalog: &dyn CatalogProvider,
    id: MovieId,
) -> Option<Movie> {
    if let Some(movie) = session.get_movie(id) {
        return Some(movie);
    }

    // Custom movie that has not synced to this session yet
    if Movie::is_likely_custom_id(id) {
        tracing::debug!(movie_id = id, "Skipping unknown custom movie");
        return None;
    }

    match catalog.movie(id).await {
        Ok(Some(movie)) => Some(movie),
        Ok(None) => {
            tracing::warn!(movie_id = id, "Movie not found in catalog");
            None
        }
        Err(e) => {
            tracing::error!(error = %e, movie_id = id, "Catalog lookup failed");
            None
        }
    }
}

/// Case-insensitive match on title or overview. A blank query keeps everything.
pub fn filter_movies(movies: Vec<Movie>, query: &str) -> Vec<Movie> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return movies;
    }

    movies
        .into_iter()
        .filter(|m| {
            m.title.to_lowercase().contains(&query) || m.overview.to_lowercase().contains(&query)
        })
        .collect()
}
