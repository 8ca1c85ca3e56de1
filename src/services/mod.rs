pub mod identity;
pub mod providers;
pub mod resolver;
pub mod session;

pub use identity::{IdentityGate, IdentityState, IdentityWatch};
pub use providers::{CatalogProvider, TmdbProvider};
pub use session::{SessionHandle, SessionSnapshot, WatchlistSession};
