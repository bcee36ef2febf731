//! The per-request context.
//!
//! A plain record pairing the immutable configuration with the inbound
//! request. Helper methods wrap store access, map storage misses to the
//! proper protocol answers, and expose request-derived values such as the
//! trusted assertion audiences.

use crate::client::Client;
use crate::config::Configuration;
use crate::error::{Error, ErrorCode};
use crate::http::Request;
use crate::oauth::{GrantInfo, TokenOptions};
use crate::session::{AuthnSession, GrantSession};
use crate::storage::StorageError;

pub(crate) struct Context<'a> {
    pub config: &'a Configuration,
    pub request: &'a Request,
}

impl Context<'_> {
    /// The client with the given id: static clients first, then the store.
    pub async fn client(&self, id: &str) -> Result<Client, Error> {
        if let Some(client) = self.config.static_clients.iter().find(|c| c.id == id) {
            return Ok(client.clone());
        }
        self.config.clients.get(id).await.map_err(|err| match err {
            StorageError::NotFound => Error::new(ErrorCode::InvalidClient, "client not found"),
            other => Error::internal(other),
        })
    }

    pub async fn save_client(&self, client: Client) -> Result<(), Error> {
        self.config
            .clients
            .save(client)
            .await
            .map_err(Error::internal)
    }

    pub async fn delete_client(&self, id: &str) -> Result<(), Error> {
        match self.config.clients.delete(id).await {
            Ok(()) | Err(StorageError::NotFound) => Ok(()),
            Err(other) => Err(Error::internal(other)),
        }
    }

    pub async fn save_authn_session(&self, session: AuthnSession) -> Result<(), Error> {
        self.config
            .authn_sessions
            .save(session)
            .await
            .map_err(Error::internal)
    }

    pub async fn delete_authn_session(&self, id: &str) -> Result<(), Error> {
        match self.config.authn_sessions.delete(id).await {
            Ok(()) | Err(StorageError::NotFound) => Ok(()),
            Err(other) => Err(Error::internal(other)),
        }
    }

    /// A live (unexpired) session by callback id.
    pub async fn authn_session_by_callback_id(
        &self,
        callback_id: &str,
    ) -> Result<Option<AuthnSession>, Error> {
        live_authn(self.config.authn_sessions.get_by_callback_id(callback_id).await)
    }

    /// A live session by authorization code.
    pub async fn authn_session_by_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthnSession>, Error> {
        live_authn(
            self.config
                .authn_sessions
                .get_by_authorization_code(code)
                .await,
        )
    }

    /// A live session by pushed `request_uri`.
    pub async fn authn_session_by_reference_id(
        &self,
        reference_id: &str,
    ) -> Result<Option<AuthnSession>, Error> {
        live_authn(
            self.config
                .authn_sessions
                .get_by_reference_id(reference_id)
                .await,
        )
    }

    pub async fn save_grant_session(&self, session: GrantSession) -> Result<(), Error> {
        self.config
            .grant_sessions
            .save(session)
            .await
            .map_err(Error::internal)
    }

    pub async fn delete_grant_session(&self, id: &str) -> Result<(), Error> {
        match self.config.grant_sessions.delete(id).await {
            Ok(()) | Err(StorageError::NotFound) => Ok(()),
            Err(other) => Err(Error::internal(other)),
        }
    }

    pub async fn grant_session_by_token_id(
        &self,
        token_id: &str,
    ) -> Result<Option<GrantSession>, Error> {
        optional(self.config.grant_sessions.get_by_token_id(token_id).await)
    }

    pub async fn grant_session_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<GrantSession>, Error> {
        optional(
            self.config
                .grant_sessions
                .get_by_refresh_token(refresh_token)
                .await,
        )
    }

    pub async fn grant_session_by_code(
        &self,
        code: &str,
    ) -> Result<Option<GrantSession>, Error> {
        optional(
            self.config
                .grant_sessions
                .get_by_authorization_code(code)
                .await,
        )
    }

    /// Deletes any grant minted under an authorization code. Used when a
    /// code is replayed or found expired.
    pub async fn revoke_grant_for_code(&self, code: &str) -> Result<(), Error> {
        if let Some(grant) = self.grant_session_by_code(code).await? {
            tracing::warn!(grant_id = %grant.id, "revoking grant after authorization code misuse");
            self.delete_grant_session(&grant.id).await?;
        }
        Ok(())
    }

    /// The audiences trusted for client assertions: the issuer and the
    /// client-facing endpoints, plus their mTLS mirrors when configured.
    pub fn audiences(&self) -> Vec<String> {
        let base = self.config.base_url();
        let mut audiences = vec![
            self.config.host.clone(),
            format!("{base}{}", crate::endpoint::TOKEN_PATH),
            format!("{base}{}", crate::endpoint::PAR_PATH),
            format!("{base}{}", crate::endpoint::USERINFO_PATH),
            format!("{}{}", self.config.host, self.request.path),
        ];
        if let (Some(mtls_host), Some(mtls_base)) =
            (&self.config.mtls_host, self.config.mtls_base_url())
        {
            audiences.push(mtls_host.clone());
            audiences.push(format!("{mtls_base}{}", crate::endpoint::TOKEN_PATH));
            audiences.push(format!("{mtls_base}{}", crate::endpoint::PAR_PATH));
            audiences.push(format!("{mtls_base}{}", crate::endpoint::USERINFO_PATH));
            audiences.push(format!("{mtls_host}{}", self.request.path));
        }
        audiences
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.config.http_client
    }

    /// The access token template for a grant. Opaque lengths colliding with
    /// the refresh token length are bumped, since opaque tokens are told
    /// apart from refresh tokens by length during introspection.
    pub fn token_options(&self, client: &Client, grant: &GrantInfo) -> TokenOptions {
        let mut options = self.config.hooks.token_options(client, grant);
        if options.opaque_length == Some(crate::material::REFRESH_TOKEN_LENGTH) {
            options.opaque_length = Some(crate::material::REFRESH_TOKEN_LENGTH + 1);
        }
        options
    }

    /// Whether a refresh token accompanies this grant.
    pub fn should_issue_refresh_token(&self, client: &Client, grant: &GrantInfo) -> bool {
        client.is_grant_allowed(crate::oauth::GrantType::RefreshToken)
            && self.config.hooks.should_issue_refresh_token(client, grant)
    }
}

fn live_authn(
    result: Result<AuthnSession, StorageError>,
) -> Result<Option<AuthnSession>, Error> {
    match result {
        Ok(session) if session.is_expired() => Ok(None),
        Ok(session) => Ok(Some(session)),
        Err(StorageError::NotFound) => Ok(None),
        Err(other) => Err(Error::internal(other)),
    }
}

fn optional(result: Result<GrantSession, StorageError>) -> Result<Option<GrantSession>, Error> {
    match result {
        Ok(session) => Ok(Some(session)),
        Err(StorageError::NotFound) => Ok(None),
        Err(other) => Err(Error::internal(other)),
    }
}
