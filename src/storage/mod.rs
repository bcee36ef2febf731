//! Persistence contract.
//!
//! The engine owns the aggregates and their lifecycles; the host owns
//! durability. Stores are last-writer-wins key/value maps with a handful of
//! keyed getters. A miss is reported through the distinguished
//! [`StorageError::NotFound`] kind, which the engine maps to the proper
//! protocol answer (inactive token, invalid grant, unknown client).

pub mod memory;

use async_trait::async_trait;
use snafu::Snafu;

use crate::client::Client;
use crate::session::{AuthnSession, GrantSession};

/// Errors surfaced by host-provided stores.
#[derive(Debug, Snafu)]
pub enum StorageError {
    /// No entity matches the lookup key.
    #[snafu(display("entity not found"))]
    NotFound,
    /// The backend failed. The engine reports this as `internal_error`.
    #[snafu(display("storage backend failure: {message}"))]
    Backend {
        /// A backend-specific description.
        message: String,
    },
}

impl StorageError {
    /// Wraps an arbitrary backend failure.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Persistence for client records created by static configuration or
/// dynamic registration.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Creates or replaces a client.
    async fn save(&self, client: Client) -> Result<(), StorageError>;
    /// The client with the given id.
    async fn get(&self, id: &str) -> Result<Client, StorageError>;
    /// Removes a client.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;
}

/// Persistence for in-flight authorization requests.
#[async_trait]
pub trait AuthnSessionStore: Send + Sync {
    /// Creates or replaces a session.
    async fn save(&self, session: AuthnSession) -> Result<(), StorageError>;
    /// The session holding the given callback id.
    async fn get_by_callback_id(&self, callback_id: &str) -> Result<AuthnSession, StorageError>;
    /// The session holding the given authorization code.
    async fn get_by_authorization_code(&self, code: &str) -> Result<AuthnSession, StorageError>;
    /// The session holding the given pushed `request_uri`.
    async fn get_by_reference_id(&self, reference_id: &str)
        -> Result<AuthnSession, StorageError>;
    /// Removes a session by id.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;
}

/// Persistence for issued grants.
#[async_trait]
pub trait GrantSessionStore: Send + Sync {
    /// Creates or replaces a grant session.
    async fn save(&self, session: GrantSession) -> Result<(), StorageError>;
    /// The grant session whose latest access token has the given id.
    async fn get_by_token_id(&self, token_id: &str) -> Result<GrantSession, StorageError>;
    /// The grant session holding the given refresh token.
    async fn get_by_refresh_token(&self, refresh_token: &str)
        -> Result<GrantSession, StorageError>;
    /// The grant session minted under the given authorization code. Used
    /// for code replay defense.
    async fn get_by_authorization_code(&self, code: &str) -> Result<GrantSession, StorageError>;
    /// Removes a grant session by id.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;
}
