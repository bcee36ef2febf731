//! In-memory reference stores.
//!
//! Suitable for tests, demos and single-instance deployments. Every store is
//! a `RwLock`-guarded map keyed by the aggregate id; secondary lookups scan.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{AuthnSessionStore, ClientStore, GrantSessionStore, StorageError};
use crate::client::Client;
use crate::session::{AuthnSession, GrantSession};

/// An in-memory client store.
#[derive(Debug, Default)]
pub struct InMemoryClientStore {
    clients: RwLock<HashMap<String, Client>>,
}

impl InMemoryClientStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn save(&self, client: Client) -> Result<(), StorageError> {
        let mut clients = self.clients.write().map_err(poisoned)?;
        clients.insert(client.id.clone(), client);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Client, StorageError> {
        let clients = self.clients.read().map_err(poisoned)?;
        clients.get(id).cloned().ok_or(StorageError::NotFound)
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let mut clients = self.clients.write().map_err(poisoned)?;
        clients.remove(id);
        Ok(())
    }
}

/// An in-memory authentication session store.
#[derive(Debug, Default)]
pub struct InMemoryAuthnSessionStore {
    sessions: RwLock<HashMap<String, AuthnSession>>,
}

impl InMemoryAuthnSessionStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn find<F>(&self, predicate: F) -> Result<AuthnSession, StorageError>
    where
        F: Fn(&AuthnSession) -> bool,
    {
        let sessions = self.sessions.read().map_err(poisoned)?;
        sessions
            .values()
            .find(|s| predicate(s))
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl AuthnSessionStore for InMemoryAuthnSessionStore {
    async fn save(&self, session: AuthnSession) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get_by_callback_id(&self, callback_id: &str) -> Result<AuthnSession, StorageError> {
        self.find(|s| s.callback_id.as_deref() == Some(callback_id))
    }

    async fn get_by_authorization_code(&self, code: &str) -> Result<AuthnSession, StorageError> {
        self.find(|s| s.authorization_code.as_deref() == Some(code))
    }

    async fn get_by_reference_id(
        &self,
        reference_id: &str,
    ) -> Result<AuthnSession, StorageError> {
        self.find(|s| s.reference_id.as_deref() == Some(reference_id))
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.remove(id);
        Ok(())
    }
}

/// An in-memory grant session store.
#[derive(Debug, Default)]
pub struct InMemoryGrantSessionStore {
    sessions: RwLock<HashMap<String, GrantSession>>,
}

impl InMemoryGrantSessionStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn find<F>(&self, predicate: F) -> Result<GrantSession, StorageError>
    where
        F: Fn(&GrantSession) -> bool,
    {
        let sessions = self.sessions.read().map_err(poisoned)?;
        sessions
            .values()
            .find(|s| predicate(s))
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl GrantSessionStore for InMemoryGrantSessionStore {
    async fn save(&self, session: GrantSession) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get_by_token_id(&self, token_id: &str) -> Result<GrantSession, StorageError> {
        self.find(|s| s.token_id == token_id)
    }

    async fn get_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<GrantSession, StorageError> {
        self.find(|s| s.refresh_token.as_deref() == Some(refresh_token))
    }

    async fn get_by_authorization_code(&self, code: &str) -> Result<GrantSession, StorageError> {
        self.find(|s| s.authorization_code.as_deref() == Some(code))
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.remove(id);
        Ok(())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StorageError {
    StorageError::backend("lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::AuthorizationParameters;

    #[tokio::test]
    async fn test_authn_session_lookups() {
        let store = InMemoryAuthnSessionStore::new();
        let mut session = AuthnSession::new("c1", AuthorizationParameters::default());
        session.callback_id = Some("cb-1".into());
        session.authorization_code = Some("code-1".into());
        let id = session.id.clone();
        store.save(session).await.unwrap();

        assert_eq!(store.get_by_callback_id("cb-1").await.unwrap().id, id);
        assert_eq!(
            store.get_by_authorization_code("code-1").await.unwrap().id,
            id
        );
        assert!(matches!(
            store.get_by_reference_id("missing").await,
            Err(StorageError::NotFound)
        ));

        store.delete(&id).await.unwrap();
        assert!(matches!(
            store.get_by_callback_id("cb-1").await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_save_is_last_writer_wins() {
        let store = InMemoryAuthnSessionStore::new();
        let mut session = AuthnSession::new("c1", AuthorizationParameters::default());
        session.callback_id = Some("cb-1".into());
        store.save(session.clone()).await.unwrap();

        session.subject = Some("user-1".into());
        store.save(session.clone()).await.unwrap();

        let loaded = store.get_by_callback_id("cb-1").await.unwrap();
        assert_eq!(loaded.subject.as_deref(), Some("user-1"));
    }
}
