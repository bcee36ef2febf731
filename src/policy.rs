//! User authentication policies.
//!
//! A policy owns the interactive part of an authorization request: login
//! pages, MFA, consent. The engine asks each configured policy, in
//! declaration order, whether it wants the request; the first taker runs.
//! A policy that needs user interaction returns
//! [`AuthnOutcome::InProgress`] with whatever response sends the user agent
//! to its UI; the engine suspends the session and re-enters the policy when
//! the callback endpoint is hit. This is a protocol rendezvous keyed by the
//! session callback id, not a language-level suspension.

use async_trait::async_trait;

use crate::client::Client;
use crate::error::Error;
use crate::http::{Request, Response};
use crate::session::AuthnSession;

/// The result of one policy step.
#[derive(Debug)]
pub enum AuthnOutcome {
    /// The user is authenticated and consent is granted. The engine emits
    /// the authorization response.
    Success,
    /// User interaction is needed. The response is returned verbatim and
    /// the session is kept for resumption.
    InProgress(Response),
    /// The flow failed. `None` becomes a generic `access_denied`.
    Failure(Option<Error>),
}

/// A resumable user-authentication policy.
#[async_trait]
pub trait AuthnPolicy: Send + Sync {
    /// A stable identifier, persisted into the session for resumption.
    fn id(&self) -> &str;

    /// Whether this policy takes the request. May initialize the session.
    fn set_up(&self, request: &Request, client: &Client, session: &mut AuthnSession) -> bool;

    /// Runs one authentication step. Called on flow start and on every
    /// callback until a terminal outcome is returned.
    async fn authenticate(&self, request: &Request, session: &mut AuthnSession) -> AuthnOutcome;
}
