use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use redis::Client;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::{
    db::{RemoteStore, Subscription},
    error::AppResult,
    models::{Movie, UserDocument, Watchlist},
};

const FIELD_LISTS: &str = "lists";
const FIELD_CUSTOM_MOVIES: &str = "customMovies";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Hash holding one user's document, one JSON field per collection
    Document(String),
    /// Pub/sub channel announcing writes to that document
    Changes(String),
}

impl Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKey::Document(uid) => write!(f, "watchlist:user:{}", uid),
            StoreKey::Changes(uid) => write!(f, "watchlist:user:{}:changes", uid),
        }
    }
}

/// Creates a Redis client for the document store
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Redis-backed document store
///
/// Each collection lives in its own hash field, so a save only rewrites the
/// field it owns. Every save is announced on the document's change channel,
/// which is what subscriptions listen to.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects to Redis and returns a store sharing one managed connection
    pub async fn new(client: Client) -> AppResult<Self> {
        let conn = ConnectionManager::new(client.clone()).await?;
        tracing::info!("Connected to Redis document store");
        Ok(Self { client, conn })
    }

    /// Reads both fields. `None` when the user has no document at all.
    async fn read_document(
        conn: &mut ConnectionManager,
        principal_id: &str,
    ) -> AppResult<Option<UserDocument>> {
        let key = StoreKey::Document(principal_id.to_string()).to_string();
        let (lists, custom_movies): (Option<String>, Option<String>) = conn
            .hget(&key, &[FIELD_LISTS, FIELD_CUSTOM_MOVIES])
            .await?;

        if lists.is_none() && custom_movies.is_none() {
            return Ok(None);
        }

        Ok(Some(UserDocument {
            lists: parse_field(FIELD_LISTS, lists),
            custom_movies: parse_field(FIELD_CUSTOM_MOVIES, custom_movies),
        }))
    }

    async fn write_field<T: serde::Serialize>(
        &self,
        principal_id: &str,
        field: &str,
        value: &T,
    ) -> AppResult<()> {
        let json = serde_json::to_string(value)?;
        let mut conn = self.conn.clone();

        let _: () = conn
            .hset(StoreKey::Document(principal_id.to_string()).to_string(), field, json)
            .await?;
        let _: () = conn
            .publish(StoreKey::Changes(principal_id.to_string()).to_string(), field)
            .await?;

        tracing::debug!(principal = %principal_id, field, "Document field written");
        Ok(())
    }
}

/// Decodes one stored field, treating absent or malformed values as empty
fn parse_field<T: DeserializeOwned>(field: &str, raw: Option<String>) -> Vec<T> {
    match raw {
        Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
            tracing::warn!(error = %e, field, "Malformed document field, treating as empty");
            Vec::new()
        }),
        None => Vec::new(),
    }
}

#[async_trait::async_trait]
impl RemoteStore for RedisStore {
    async fn load(&self, principal_id: &str) -> AppResult<UserDocument> {
        let mut conn = self.conn.clone();
        let document = Self::read_document(&mut conn, principal_id)
            .await?
            .unwrap_or_default();

        tracing::info!(
            principal = %principal_id,
            lists = document.lists.len(),
            custom_movies = document.custom_movies.len(),
            store = "redis",
            "Document loaded"
        );

        Ok(document)
    }

    async fn subscribe(&self, principal_id: &str) -> AppResult<Subscription> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub
            .subscribe(StoreKey::Changes(principal_id.to_string()).to_string())
            .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut conn = self.conn.clone();

        // Subscribed before this read, so a write racing it is still announced
        if let Some(current) = Self::read_document(&mut conn, principal_id).await? {
            let _ = tx.send(current);
        }

        let principal_id = principal_id.to_string();
        let task = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();

            while let Some(msg) = messages.next().await {
                let field: String = msg.get_payload().unwrap_or_default();
                tracing::debug!(principal = %principal_id, field = %field, "Change announced");

                match Self::read_document(&mut conn, &principal_id).await {
                    Ok(Some(document)) => {
                        if tx.send(document).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(error = %e, principal = %principal_id, "Change feed read failed, closing subscription");
                        break;
                    }
                }
            }

            tracing::debug!(principal = %principal_id, "Change feed closed");
        });

        Ok(Subscription::with_cancel(rx, move || task.abort()))
    }

    async fn save_lists(&self, principal_id: &str, lists: &[Watchlist]) -> AppResult<()> {
        self.write_field(principal_id, FIELD_LISTS, &lists).await
    }

    async fn save_custom_movies(&self, principal_id: &str, movies: &[Movie]) -> AppResult<()> {
        self.write_field(principal_id, FIELD_CUSTOM_MOVIES, &movies)
            .await
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
