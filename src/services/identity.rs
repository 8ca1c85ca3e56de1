use std::sync::Arc;
use tokio::sync::watch;

use crate::models::Principal;

/// What the identity provider currently knows about the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    /// The provider has not answered yet
    Undetermined,
    SignedOut,
    SignedIn(Principal),
}

impl IdentityState {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            IdentityState::SignedIn(principal) => Some(principal),
            _ => None,
        }
    }

    pub fn is_determined(&self) -> bool {
        !matches!(self, IdentityState::Undetermined)
    }
}

/// Receiver of identity changes; its first value is the state at subscription time
pub type IdentityWatch = watch::Receiver<IdentityState>;

/// Tracks the current authenticated principal
///
/// Subscribers see the current state immediately and then every real change.
/// Signing in again as the same principal is a refresh and wakes nobody.
#[derive(Clone)]
pub struct IdentityGate {
    tx: Arc<watch::Sender<IdentityState>>,
}

impl Default for IdentityGate {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityGate {
    /// Gate whose provider has not reported yet
    pub fn new() -> Self {
        Self::starting_at(IdentityState::Undetermined)
    }

    pub fn signed_out() -> Self {
        Self::starting_at(IdentityState::SignedOut)
    }

    pub fn with_principal(principal: Principal) -> Self {
        Self::starting_at(IdentityState::SignedIn(principal))
    }

    fn starting_at(state: IdentityState) -> Self {
        let (tx, _) = watch::channel(state);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> IdentityWatch {
        self.tx.subscribe()
    }

    pub fn current(&self) -> IdentityState {
        self.tx.borrow().clone()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.tx.borrow().principal().cloned()
    }

    /// Records a sign-in. Returns whether observers were notified.
    pub fn sign_in(&self, principal: Principal) -> bool {
        let changed = self.transition(IdentityState::SignedIn(principal.clone()));
        if changed {
            tracing::info!(principal = %principal, "Signed in");
        } else {
            tracing::debug!(principal = %principal, "Identity refresh, principal unchanged");
        }
        changed
    }

    /// Records a sign-out. Returns whether observers were notified.
    pub fn sign_out(&self) -> bool {
        let changed = self.transition(IdentityState::SignedOut);
        if changed {
            tracing::info!("Signed out");
        }
        changed
    }

    fn transition(&self, next: IdentityState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        })
    }
}
