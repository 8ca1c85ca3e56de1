use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use watchlist_sync::api::{create_router, AppState};
use watchlist_sync::db::MemoryStore;
use watchlist_sync::error::{AppError, AppResult};
use watchlist_sync::models::{Movie, MovieDetails, MovieId, UserDocument, Watchlist};
use watchlist_sync::services::identity::IdentityGate;
use watchlist_sync::services::providers::CatalogProvider;
use watchlist_sync::services::session::{SessionHandle, WatchlistSession};

/// Catalog with a fixed handful of movies
struct StubCatalog;

fn catalog_movie(id: MovieId, title: &str) -> Movie {
    Movie {
        id,
        title: title.to_string(),
        overview: format!("{} overview", title),
        poster_path: None,
        release_date: "1999-03-31".to_string(),
        vote_average: 8.0,
        is_custom: None,
    }
}

fn catalog() -> Vec<Movie> {
    vec![catalog_movie(603, "The Matrix"), catalog_movie(949, "Heat")]
}

#[async_trait::async_trait]
impl CatalogProvider for StubCatalog {
    async fn search_movies(&self, query: &str) -> AppResult<Vec<Movie>> {
        if query.trim().is_empty() {
            return self.popular_movies().await;
        }
        let query = query.to_lowercase();
        Ok(catalog()
            .into_iter()
            .filter(|m| m.title.to_lowercase().contains(&query))
            .collect())
    }

    async fn popular_movies(&self) -> AppResult<Vec<Movie>> {
        Ok(catalog())
    }

    async fn movie(&self, id: MovieId) -> AppResult<Option<Movie>> {
        if id == 500 {
            return Err(AppError::ExternalApi("catalog down".to_string()));
        }
        Ok(catalog().into_iter().find(|m| m.id == id))
    }

    async fn movie_details(&self, id: MovieId) -> AppResult<Option<MovieDetails>> {
        Ok(catalog().into_iter().find(|m| m.id == id).map(|m| MovieDetails {
            id: m.id,
            title: m.title,
            overview: m.overview,
            poster_path: None,
            backdrop_path: None,
            release_date: m.release_date,
            vote_average: m.vote_average,
            runtime: Some(120),
            genres: Vec::new(),
            tagline: String::new(),
            status: "Released".to_string(),
            budget: 0,
            revenue: 0,
            cast: Vec::new(),
            crew: Vec::new(),
        }))
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

struct TestApp {
    server: TestServer,
    store: MemoryStore,
    _handle: SessionHandle,
}

fn create_test_app(store: MemoryStore) -> TestApp {
    let identity = IdentityGate::signed_out();
    let (session, handle) = WatchlistSession::start(Arc::new(store.clone()), &identity);
    let state = AppState::new(session, identity, Arc::new(StubCatalog));
    let app = create_router(state);

    TestApp {
        server: TestServer::new(app).unwrap(),
        store,
        _handle: handle,
    }
}

async fn signed_in_app(store: MemoryStore) -> TestApp {
    let app = create_test_app(store);
    let response = app
        .server
        .post("/api/v1/session")
        .json(&json!({ "uid": "u1", "display_name": "Ana" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["phase"], "ready");
    app
}

fn list_ids(lists: &[Watchlist]) -> Vec<&str> {
    lists.iter().map(|l| l.id.as_str()).collect()
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app(MemoryStore::new());
    let response = app.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = create_test_app(MemoryStore::new());
    let response = app
        .server
        .get("/health")
        .add_header(
            axum::http::HeaderName::from_static("x-request-id"),
            axum::http::HeaderValue::from_static("trace-123"),
        )
        .await;
    assert_eq!(response.header("x-request-id"), "trace-123");
}

#[tokio::test]
async fn test_lists_require_sign_in() {
    let app = create_test_app(MemoryStore::new());

    let session: Value = app.server.get("/api/v1/session").await.json();
    assert_eq!(session["phase"], "signed_out");

    let response = app.server.get("/api/v1/lists").await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = app
        .server
        .post("/api/v1/custom-movies")
        .json(&json!({ "title": "Home Video" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sign_in_backfills_reserved_lists() {
    let store = MemoryStore::new();
    store.put_document(
        "u1",
        UserDocument {
            lists: vec![Watchlist {
                id: "x".to_string(),
                name: "Faves".to_string(),
                movie_ids: vec![5],
                created_at: 1_600_000_000_000,
            }],
            custom_movies: Vec::new(),
        },
    );
    let app = signed_in_app(store).await;

    let lists: Vec<Watchlist> = app.server.get("/api/v1/lists").await.json();
    assert_eq!(list_ids(&lists), vec!["already-watched", "custom-movies", "x"]);
}

#[tokio::test]
async fn test_create_and_delete_watchlist() {
    let app = signed_in_app(MemoryStore::new()).await;

    let response = app
        .server
        .post("/api/v1/lists")
        .json(&json!({ "name": "Weekend Binge" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: Watchlist = response.json();
    assert_eq!(created.name, "Weekend Binge");
    assert!(created.movie_ids.is_empty());

    let newer: Watchlist = app
        .server
        .post("/api/v1/lists")
        .json(&json!({ "name": "Date Night" }))
        .await
        .json();

    let lists: Vec<Watchlist> = app.server.get("/api/v1/lists").await.json();
    let ids = list_ids(&lists);
    assert_eq!(&ids[..2], &["already-watched", "custom-movies"]);
    assert!(ids.contains(&newer.id.as_str()));
    assert!(ids.contains(&created.id.as_str()));

    let response = app
        .server
        .delete(&format!("/api/v1/lists/{}", created.id))
        .await;
    response.assert_status(StatusCode::NO_CONTENT);

    let response = app
        .server
        .delete(&format!("/api/v1/lists/{}", created.id))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blank_list_name_rejected() {
    let app = signed_in_app(MemoryStore::new()).await;
    let response = app
        .server
        .post("/api/v1/lists")
        .json(&json!({ "name": "   " }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reserved_lists_cannot_be_deleted() {
    let app = signed_in_app(MemoryStore::new()).await;

    for id in ["already-watched", "custom-movies"] {
        let response = app.server.delete(&format!("/api/v1/lists/{}", id)).await;
        response.assert_status(StatusCode::CONFLICT);
    }

    let lists: Vec<Watchlist> = app.server.get("/api/v1/lists").await.json();
    assert_eq!(lists.len(), 2);
}

#[tokio::test]
async fn test_add_movie_is_idempotent_and_resolves() {
    let app = signed_in_app(MemoryStore::new()).await;
    let list: Watchlist = app
        .server
        .post("/api/v1/lists")
        .json(&json!({ "name": "Later" }))
        .await
        .json();

    for _ in 0..3 {
        let response = app
            .server
            .post(&format!("/api/v1/lists/{}/movies", list.id))
            .json(&catalog_movie(603, "The Matrix"))
            .await;
        response.assert_status_ok();
        let updated: Watchlist = response.json();
        assert_eq!(updated.movie_ids, vec![603]);
    }

    let detail: Value = app
        .server
        .get(&format!("/api/v1/lists/{}", list.id))
        .await
        .json();
    assert_eq!(detail["name"], "Later");
    assert_eq!(detail["movies"][0]["title"], "The Matrix");

    let filtered: Value = app
        .server
        .get(&format!("/api/v1/lists/{}", list.id))
        .add_query_param("q", "heat")
        .await
        .json();
    assert_eq!(filtered["movies"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_unknown_list_is_not_found() {
    let app = signed_in_app(MemoryStore::new()).await;
    let response = app.server.get("/api/v1/lists/nope").await;
    response.assert_status(StatusCode::NOT_FOUND);

    let response = app
        .server
        .post("/api/v1/lists/nope/movies")
        .json(&catalog_movie(603, "The Matrix"))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mark_watched_and_move() {
    let app = signed_in_app(MemoryStore::new()).await;
    let later: Watchlist = app
        .server
        .post("/api/v1/lists")
        .json(&json!({ "name": "Later" }))
        .await
        .json();
    app.server
        .post(&format!("/api/v1/lists/{}/movies", later.id))
        .json(&catalog_movie(949, "Heat"))
        .await
        .assert_status_ok();

    let source: Watchlist = app
        .server
        .post(&format!("/api/v1/lists/{}/movies/949/watched", later.id))
        .await
        .json();
    assert!(source.movie_ids.is_empty());

    let watched: Value = app.server.get("/api/v1/lists/already-watched").await.json();
    assert_eq!(watched["movieIds"], json!([949]));

    let destination: Watchlist = app
        .server
        .post("/api/v1/lists/already-watched/movies/949/move")
        .json(&json!({ "to": later.id }))
        .await
        .json();
    assert_eq!(destination.movie_ids, vec![949]);

    let response = app
        .server
        .post("/api/v1/lists/already-watched/movies/949/move")
        .json(&json!({ "to": "missing" }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_remove_movie() {
    let app = signed_in_app(MemoryStore::new()).await;
    app.server
        .post("/api/v1/lists/already-watched/movies")
        .json(&catalog_movie(603, "The Matrix"))
        .await
        .assert_status_ok();

    let list: Watchlist = app
        .server
        .delete("/api/v1/lists/already-watched/movies/603")
        .await
        .json();
    assert!(list.movie_ids.is_empty());
}

#[tokio::test]
async fn test_custom_movie_flow() {
    let app = signed_in_app(MemoryStore::new()).await;

    let response = app
        .server
        .post("/api/v1/custom-movies")
        .json(&json!({ "title": "Home Video", "overview": "Summer 2003", "release_date": "2003-01-01" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: Value = response.json();
    assert_eq!(created["isCustom"], true);
    let id = created["id"].as_i64().unwrap();

    let custom: Vec<Movie> = app.server.get("/api/v1/custom-movies").await.json();
    assert_eq!(custom.len(), 1);

    let list: Value = app.server.get("/api/v1/lists/custom-movies").await.json();
    assert_eq!(list["movieIds"], json!([id]));
    assert_eq!(list["movies"][0]["title"], "Home Video");

    let movie: Value = app.server.get(&format!("/api/v1/movies/{}", id)).await.json();
    assert_eq!(movie["title"], "Home Video");

    let response = app
        .server
        .post("/api/v1/custom-movies")
        .json(&json!({ "title": " " }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_catalog_search_and_details() {
    let app = create_test_app(MemoryStore::new());

    let results: Vec<Movie> = app
        .server
        .get("/api/v1/movies/search")
        .add_query_param("q", "matrix")
        .await
        .json();
    assert_eq!(results.len(), 1);

    let popular: Vec<Movie> = app.server.get("/api/v1/movies/search").await.json();
    assert_eq!(popular.len(), 2);

    let details: Value = app.server.get("/api/v1/movies/603").await.json();
    assert_eq!(details["runtime"], 120);

    let response = app.server.get("/api/v1/movies/42").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mutations_are_persisted_and_sign_out_clears() {
    let app = signed_in_app(MemoryStore::new()).await;
    app.server
        .post("/api/v1/lists")
        .json(&json!({ "name": "Later" }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = app.server.delete("/api/v1/session").await;
    response.assert_status_ok();
    let session: Value = response.json();
    assert_eq!(session["phase"], "signed_out");

    app.server
        .get("/api/v1/lists")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    // Signing back in restores what was written before signing out
    let app_store = app.store.clone();
    let response = app
        .server
        .post("/api/v1/session")
        .json(&json!({ "uid": "u1" }))
        .await;
    response.assert_status_ok();

    let lists: Vec<Watchlist> = app.server.get("/api/v1/lists").await.json();
    assert_eq!(lists.len(), 3);
    assert_eq!(app_store.document("u1").unwrap().lists.len(), 3);
}
