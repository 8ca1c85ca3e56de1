use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{is_reserved_id, Movie, MovieDetails, MovieId, NewMovie, Principal, Watchlist},
    services::{
        resolver::{filter_movies, resolve_list_movies},
        session::Phase,
    },
};

use super::AppState;

/// How long sign-in waits for the first load before answering anyway
const SIGN_IN_LOAD_TIMEOUT: Duration = Duration::from_secs(5);

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub uid: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub principal: Option<Principal>,
    pub phase: Phase,
    pub is_ready: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateWatchlistRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveMovieRequest {
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct WatchlistResponse {
    #[serde(flatten)]
    pub list: Watchlist,
    pub movies: Vec<Movie>,
}

/// A custom movie as stored, or the catalog's detailed record
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MovieResponse {
    Custom(Movie),
    Catalog(MovieDetails),
}

fn session_response(state: &AppState) -> SessionResponse {
    let snapshot = state.session.snapshot();
    SessionResponse {
        principal: snapshot.principal,
        phase: snapshot.phase,
        is_ready: snapshot.is_ready,
    }
}

fn find_list(state: &AppState, id: &str) -> AppResult<Watchlist> {
    state
        .session
        .watchlist(id)
        .ok_or_else(|| AppError::NotFound(format!("Watchlist {} not found", id)))
}

/// Custom movie from the session, otherwise the catalog record
async fn find_movie(state: &AppState, id: MovieId) -> AppResult<Movie> {
    if let Some(movie) = state.session.get_movie(id) {
        return Ok(movie);
    }

    state
        .catalog
        .movie(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Movie {} not found", id)))
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

pub async fn get_session(State(state): State<AppState>) -> Json<SessionResponse> {
    Json(session_response(&state))
}

/// Signs in and waits (briefly) for the principal's watchlists to load
pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SignInRequest>,
) -> AppResult<Json<SessionResponse>> {
    let uid = payload.uid.trim();
    if uid.is_empty() {
        return Err(AppError::InvalidInput("uid cannot be empty".to_string()));
    }

    let principal = Principal {
        uid: uid.to_string(),
        display_name: payload.display_name,
    };
    state.identity.sign_in(principal);

    if !state
        .session
        .wait_until_loaded(uid, SIGN_IN_LOAD_TIMEOUT)
        .await
    {
        tracing::warn!(principal = %uid, "Sign-in answered before watchlists finished loading");
    }

    Ok(Json(session_response(&state)))
}

pub async fn sign_out(State(state): State<AppState>) -> Json<SessionResponse> {
    state.identity.sign_out();
    state
        .session
        .wait_for(|s| s.principal().is_none(), SIGN_IN_LOAD_TIMEOUT)
        .await;
    Json(session_response(&state))
}

pub async fn get_watchlists(State(state): State<AppState>) -> AppResult<Json<Vec<Watchlist>>> {
    state.require_principal()?;
    Ok(Json(state.session.display_lists()))
}

pub async fn create_watchlist(
    State(state): State<AppState>,
    Json(payload): Json<CreateWatchlistRequest>,
) -> AppResult<(StatusCode, Json<Watchlist>)> {
    state.require_principal()?;

    let list = state
        .session
        .create_watchlist(&payload.name)
        .ok_or_else(|| AppError::InvalidInput("Watchlist name cannot be empty".to_string()))?;

    Ok((StatusCode::CREATED, Json(list)))
}

/// One list with its movies resolved, optionally filtered by `q`
pub async fn get_watchlist(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<WatchlistResponse>> {
    state.require_principal()?;

    let list = find_list(&state, &id)?;
    let movies = resolve_list_movies(&state.session, state.catalog.as_ref(), &id).await?;

    Ok(Json(WatchlistResponse {
        list,
        movies: filter_movies(movies, &params.q),
    }))
}

pub async fn delete_watchlist(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.require_principal()?;

    if is_reserved_id(&id) {
        return Err(AppError::Conflict(format!("Watchlist {} cannot be deleted", id)));
    }
    if !state.session.delete_watchlist(&id) {
        return Err(AppError::NotFound(format!("Watchlist {} not found", id)));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(movie): Json<Movie>,
) -> AppResult<Json<Watchlist>> {
    state.require_principal()?;
    find_list(&state, &id)?;

    state.session.add_movie_to_watchlist(&id, &movie);
    Ok(Json(find_list(&state, &id)?))
}

pub async fn remove_movie(
    State(state): State<AppState>,
    Path((id, movie_id)): Path<(String, MovieId)>,
) -> AppResult<Json<Watchlist>> {
    state.require_principal()?;
    find_list(&state, &id)?;

    state.session.remove_movie_from_watchlist(&id, movie_id);
    Ok(Json(find_list(&state, &id)?))
}

/// Moves a movie into "Already Watched"; answers with the source list
pub async fn mark_watched(
    State(state): State<AppState>,
    Path((id, movie_id)): Path<(String, MovieId)>,
) -> AppResult<Json<Watchlist>> {
    state.require_principal()?;
    find_list(&state, &id)?;

    let movie = find_movie(&state, movie_id).await?;
    state.session.mark_as_watched(&id, &movie);
    Ok(Json(find_list(&state, &id)?))
}

/// Moves a movie between lists; answers with the destination list
pub async fn move_movie(
    State(state): State<AppState>,
    Path((id, movie_id)): Path<(String, MovieId)>,
    Json(payload): Json<MoveMovieRequest>,
) -> AppResult<Json<Watchlist>> {
    state.require_principal()?;
    find_list(&state, &id)?;
    find_list(&state, &payload.to)?;

    state
        .session
        .move_movie_to_watchlist(&id, &payload.to, movie_id);
    Ok(Json(find_list(&state, &payload.to)?))
}

pub async fn get_custom_movies(State(state): State<AppState>) -> AppResult<Json<Vec<Movie>>> {
    state.require_principal()?;
    Ok(Json(state.session.custom_movies()))
}

pub async fn create_custom_movie(
    State(state): State<AppState>,
    Json(payload): Json<NewMovie>,
) -> AppResult<(StatusCode, Json<Movie>)> {
    state.require_principal()?;

    if payload.title.trim().is_empty() {
        return Err(AppError::InvalidInput("Movie title cannot be empty".to_string()));
    }

    let movie = state.session.add_custom_movie(payload);
    Ok((StatusCode::CREATED, Json(movie)))
}

/// Catalog search; a blank query lists popular movies
pub async fn search_movies(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<Vec<Movie>>> {
    let movies = state.catalog.search_movies(&params.q).await?;
    Ok(Json(movies))
}

pub async fn get_movie(
    State(state): State<AppState>,
    Path(id): Path<MovieId>,
) -> AppResult<Json<MovieResponse>> {
    if let Some(movie) = state.session.get_movie(id) {
        return Ok(Json(MovieResponse::Custom(movie)));
    }

    let details = state
        .catalog
        .movie_details(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Movie {} not found", id)))?;

    Ok(Json(MovieResponse::Catalog(details)))
}
