//! Host extension points.
//!
//! One trait with defaulted methods covers every optional behavior the host
//! can supply. The defaults are safe: no replay cache, JWT tokens with the
//! default signing key, no refresh tokens, introspection gated on the
//! client's grant types.

use async_trait::async_trait;

use crate::client::{Client, ClientMetadata};
use crate::error::Error;
use crate::http::{Request, Response};
use crate::oauth::{AuthorizationDetail, GrantInfo, GrantType, TokenOptions};

/// Host-supplied behavior the engine calls into.
#[async_trait]
pub trait Hooks: Send + Sync {
    /// Replay cache for assertion `jti` values. Returning an error rejects
    /// the assertion.
    async fn check_jti(&self, _jti: &str) -> Result<(), Error> {
        Ok(())
    }

    /// Gatekeeper for dynamic client registration. `token` is the bearer
    /// token of the registration request, when one was sent.
    async fn validate_initial_access_token(
        &self,
        _request: &Request,
        _token: Option<&str>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Runs during registration and update of dynamic clients. May mutate
    /// the metadata (set default scopes, stamp custom members) or reject it.
    async fn handle_dynamic_client(
        &self,
        _request: &Request,
        _metadata: &mut ClientMetadata,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// The access token template for a grant.
    fn token_options(&self, _client: &Client, _grant: &GrantInfo) -> TokenOptions {
        TokenOptions::default()
    }

    /// Whether a refresh token accompanies the access token. Only consulted
    /// when the client is allowed the `refresh_token` grant.
    fn should_issue_refresh_token(&self, _client: &Client, _grant: &GrantInfo) -> bool {
        false
    }

    /// Last-moment veto and mutation point before tokens are minted.
    async fn handle_grant(&self, _request: &Request, _grant: &mut GrantInfo) -> Result<(), Error> {
        Ok(())
    }

    /// Compares requested authorization details against granted ones during
    /// refresh. The default accepts any narrowing.
    fn compare_authorization_details(
        &self,
        _granted: &[AuthorizationDetail],
        _requested: &[AuthorizationDetail],
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Whether a client may call the introspection endpoint.
    fn is_client_allowed_introspection(&self, client: &Client) -> bool {
        client.metadata.grant_types.contains(&GrantType::Introspection)
    }

    /// Observes every error the engine is about to surface.
    fn notify_error(&self, _request: &Request, _error: &Error) {}

    /// Renders errors that cannot be redirected back to the client. `None`
    /// falls through to the JSON error body.
    fn render_error(&self, _request: &Request, _error: &Error) -> Option<Response> {
        None
    }
}

/// The default hook set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl Hooks for DefaultHooks {}
