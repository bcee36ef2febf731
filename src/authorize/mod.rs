//! The authorization engine.
//!
//! Drives an authorization request from its first contact (a pushed
//! request, a request object, or plain query parameters) through the
//! selected user-authentication policy to a terminal redirect. A policy may
//! suspend any number of times; each suspension persists the session and
//! hands the user agent a response, and each hit on the callback endpoint
//! re-enters the policy with the stored session.

pub(crate) mod jar;
pub(crate) mod par;
pub(crate) mod response;
pub(crate) mod validation;

use std::sync::Arc;

use response::RedirectParams;

use crate::client::Client;
use crate::config::Context;
use crate::error::{Error, ErrorCode};
use crate::http::Response;
use crate::oauth::{AuthorizationParameters, GrantType, ResponseType};
use crate::policy::{AuthnOutcome, AuthnPolicy};
use crate::session::{AuthnSession, GrantSession};
use crate::token::issue::{self, IdTokenRequest, SenderBinding};

/// A flow failure, split by whether it may travel on the redirect.
pub(crate) enum FlowError {
    /// Returned as a direct JSON (or rendered) error. Used before a
    /// trustworthy redirect URI is established.
    Plain(Error),
    /// Carried to the client via the negotiated response mode.
    Redirect(Error, Box<AuthorizationParameters>),
}

impl From<Error> for FlowError {
    fn from(error: Error) -> Self {
        Self::Plain(error)
    }
}

/// Handles `GET /authorize`.
pub(crate) async fn init(ctx: &Context<'_>) -> Result<Response, Error> {
    let query = AuthorizationParameters::from_map(&ctx.request.query);
    let client_id = ctx
        .request
        .query_param("client_id")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::new(ErrorCode::InvalidClient, "invalid client_id"))?;
    let client = ctx
        .client(client_id)
        .await
        .map_err(|_| Error::new(ErrorCode::InvalidClient, "invalid client_id"))?;

    match start(ctx, &client, query).await {
        Ok(response) => Ok(response),
        Err(FlowError::Plain(error)) => Err(error),
        Err(FlowError::Redirect(error, params)) => {
            response::redirect_error(ctx, &client, &params, error).await
        }
    }
}

/// Handles `POST /authorize/{callback_id}`, resuming a suspended policy.
pub(crate) async fn resume(ctx: &Context<'_>, callback_id: &str) -> Result<Response, Error> {
    let session = ctx
        .authn_session_by_callback_id(callback_id)
        .await?
        .ok_or_else(|| {
            Error::new(
                ErrorCode::InvalidRequest,
                "the authentication session was not found or has expired",
            )
        })?;

    let client = ctx
        .client(&session.client_id)
        .await
        .map_err(|err| Error::internal(err))?;
    let policy = session
        .policy_id
        .as_deref()
        .and_then(|id| ctx.config.policy_by_id(id))
        .cloned()
        .ok_or_else(|| Error::internal("the session references an unknown policy"))?;

    match run_policy(ctx, &client, session, policy).await {
        Ok(response) => Ok(response),
        Err(FlowError::Plain(error)) => Err(error),
        Err(FlowError::Redirect(error, params)) => {
            response::redirect_error(ctx, &client, &params, error).await
        }
    }
}

async fn start(
    ctx: &Context<'_>,
    client: &Client,
    query: AuthorizationParameters,
) -> Result<Response, FlowError> {
    let mut session = build_session(ctx, client, query).await?;

    validation::validate(ctx, client, &session.params)?;

    let Some(policy) = select_policy(ctx, client, &mut session) else {
        return Err(FlowError::Redirect(
            Error::new(ErrorCode::InvalidRequest, "no policy available"),
            Box::new(session.params.clone()),
        ));
    };

    tracing::info!(client_id = %client.id, policy = policy.id(), "authorization flow started");
    session.start(policy.id().to_string(), ctx.config.authn_session_timeout_secs);
    run_policy(ctx, client, session, policy).await
}

/// Builds the session from whichever source carries the parameters:
/// a pushed reference, a request object, or the bare query. Inner sources
/// override the outer query on merge.
async fn build_session(
    ctx: &Context<'_>,
    client: &Client,
    query: AuthorizationParameters,
) -> Result<AuthnSession, FlowError> {
    if let Some(reference) = query.request_uri.clone() {
        if !ctx.config.par_enabled {
            return Err(invalid_request("pushed authorization requests are not supported").into());
        }
        let mut session = ctx
            .authn_session_by_reference_id(&reference)
            .await?
            .ok_or_else(|| invalid_request("invalid request_uri"))?;
        if session.client_id != client.id {
            return Err(invalid_request("invalid request_uri").into());
        }
        session.params = session.params.clone().merge(query);
        return Ok(session);
    }

    if let Some(raw) = query.request_object.clone() {
        if ctx.config.jar_enabled {
            let (object_params, protected) =
                jar::extract_request_object(ctx, client, &raw).await?;
            let mut session = AuthnSession::new(&client.id, object_params.merge(query));
            session.protected_params = protected;
            return Ok(session);
        }
    }

    if ctx.config.par_required || client.metadata.require_par {
        return Err(invalid_request("the authorization request must be pushed").into());
    }
    if ctx.config.jar_required {
        return Err(invalid_request("a request object is required").into());
    }
    Ok(AuthnSession::new(&client.id, query))
}

fn select_policy(
    ctx: &Context<'_>,
    client: &Client,
    session: &mut AuthnSession,
) -> Option<Arc<dyn AuthnPolicy>> {
    ctx.config
        .policies
        .iter()
        .find(|policy| policy.set_up(ctx.request, client, session))
        .cloned()
}

async fn run_policy(
    ctx: &Context<'_>,
    client: &Client,
    mut session: AuthnSession,
    policy: Arc<dyn AuthnPolicy>,
) -> Result<Response, FlowError> {
    match policy.authenticate(ctx.request, &mut session).await {
        AuthnOutcome::Success => finish_success(ctx, client, session).await,
        AuthnOutcome::InProgress(response) => {
            tracing::debug!(session_id = %session.id, "authentication in progress");
            ctx.save_authn_session(session).await?;
            Ok(response)
        }
        AuthnOutcome::Failure(cause) => {
            tracing::info!(session_id = %session.id, "authentication failed");
            let params = session.params.clone();
            let stored_cause = session.error.take();
            ctx.delete_authn_session(&session.id).await?;
            let error = cause
                .or(stored_cause)
                .unwrap_or_else(|| Error::new(ErrorCode::AccessDenied, "access denied"));
            Err(FlowError::Redirect(error, Box::new(params)))
        }
    }
}

async fn finish_success(
    ctx: &Context<'_>,
    client: &Client,
    mut session: AuthnSession,
) -> Result<Response, FlowError> {
    let params = session.params.clone();
    let redirect_err =
        |error: Error| FlowError::Redirect(error, Box::new(params.clone()));

    if session.granted_scopes.is_none() {
        session.granted_scopes = session.params.scopes.clone();
    }
    let response_type = session.params.response_type.unwrap_or(ResponseType::Code);

    let mut redirect = RedirectParams {
        state: session.params.state.clone(),
        ..RedirectParams::default()
    };

    if response_type.contains_token() {
        let mut grant = session.grant_info(GrantType::Implicit);
        grant.token_options = ctx.token_options(client, &grant);
        ctx.config
            .hooks
            .handle_grant(ctx.request, &mut grant)
            .await
            .map_err(&redirect_err)?;

        let scopes = grant.granted_scopes.clone();
        let token = issue::make_access_token(ctx.config, &grant, &scopes, &SenderBinding::default())
            .map_err(&redirect_err)?;
        let grant_session = GrantSession::new(grant, &token.id, token.lifetime_secs);
        ctx.save_grant_session(grant_session)
            .await
            .map_err(&redirect_err)?;

        redirect.expires_in = Some(token.lifetime_secs);
        redirect.token_type = Some(token.token_type);
        redirect.access_token = Some(token.value);
    }

    if response_type.contains_code() {
        redirect.code = Some(session.issue_authorization_code());
    }

    if response_type.contains_id_token() {
        let state_for_hash = session
            .params
            .negotiated_response_mode()
            .is_jarm()
            .then(|| session.params.state.clone())
            .flatten();
        let id_token = issue::make_id_token(
            ctx,
            client,
            IdTokenRequest {
                subject: session.subject.clone().unwrap_or_default(),
                nonce: session.params.nonce.clone(),
                access_token: redirect.access_token.clone(),
                code: redirect.code.clone(),
                state: state_for_hash,
                additional_claims: session.additional_id_token_claims.clone(),
            },
        )
        .await
        .map_err(&redirect_err)?;
        redirect.id_token = Some(id_token);
    }

    if response_type.contains_code() {
        // The session now backs the authorization code until it is
        // exchanged or expires.
        ctx.save_authn_session(session).await.map_err(&redirect_err)?;
    } else {
        ctx.delete_authn_session(&session.id)
            .await
            .map_err(&redirect_err)?;
    }

    response::respond(ctx, client, &params, redirect)
        .await
        .map_err(FlowError::Plain)
}

fn invalid_request(description: &str) -> Error {
    Error::new(ErrorCode::InvalidRequest, description)
}
