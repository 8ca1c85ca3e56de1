use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::request_id::{make_span_with_request_id, request_id_middleware};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Session
        .route(
            "/session",
            get(handlers::get_session)
                .post(handlers::sign_in)
                .delete(handlers::sign_out),
        )
        // Watchlists
        .route(
            "/lists",
            get(handlers::get_watchlists).post(handlers::create_watchlist),
        )
        .route(
            "/lists/:id",
            get(handlers::get_watchlist).delete(handlers::delete_watchlist),
        )
        .route("/lists/:id/movies", post(handlers::add_movie))
        .route(
            "/lists/:id/movies/:movie_id",
            delete(handlers::remove_movie),
        )
        .route(
            "/lists/:id/movies/:movie_id/watched",
            post(handlers::mark_watched),
        )
        .route("/lists/:id/movies/:movie_id/move", post(handlers::move_movie))
        // Custom movies
        .route(
            "/custom-movies",
            get(handlers::get_custom_movies).post(handlers::create_custom_movie),
        )
        // Catalog
        .route("/movies/search", get(handlers::search_movies))
        .route("/movies/:id", get(handlers::get_movie))
}
