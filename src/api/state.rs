use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::Principal,
    services::{identity::IdentityGate, providers::CatalogProvider, session::WatchlistSession},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session: WatchlistSession,
    pub identity: IdentityGate,
    pub catalog: Arc<dyn CatalogProvider>,
}

impl AppState {
    pub fn new(
        session: WatchlistSession,
        identity: IdentityGate,
        catalog: Arc<dyn CatalogProvider>,
    ) -> Self {
        Self {
            session,
            identity,
            catalog,
        }
    }

    /// The signed-in principal, or `Unauthenticated`
    pub fn require_principal(&self) -> AppResult<Principal> {
        self.identity.principal().ok_or(AppError::Unauthenticated)
    }
}
