//! Pushed authorization requests, RFC 9126.

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use super::validation;
use crate::client::authn::{self, AuthnSurface};
use crate::config::Context;
use crate::error::{Error, ErrorCode};
use crate::http::Response;
use crate::material::PROTECTED_PARAM_PREFIX;
use crate::oauth::AuthorizationParameters;
use crate::session::AuthnSession;

#[derive(Debug, Serialize)]
struct PushedResponse {
    request_uri: String,
    expires_in: i64,
}

/// Handles `POST /par`. The client authenticates exactly as at the token
/// endpoint; accepted parameters are stored and exchanged for a single-use
/// `request_uri` reference.
pub(crate) async fn push(ctx: &Context<'_>) -> Result<Response, Error> {
    if !ctx.config.par_enabled {
        return Err(Error::new(
            ErrorCode::InvalidRequest,
            "pushed authorization requests are not supported",
        ));
    }

    let client = authn::authenticated(ctx, AuthnSurface::Token).await?;

    let mut params = AuthorizationParameters::from_map(&ctx.request.form);
    let mut protected = protected_form_params(ctx);

    if let Some(request_object) = params.request_object.clone() {
        if ctx.config.jar_enabled {
            let (object_params, object_protected) =
                super::jar::extract_request_object(ctx, &client, &request_object).await?;
            protected.extend(object_protected);
            params = object_params.merge(params);
        }
    }

    validation::validate_pushed(ctx, &client, &params)?;

    let mut session = AuthnSession::new(&client.id, params);
    session.protected_params = protected;
    let request_uri = session.push(ctx.config.par_lifetime_secs);

    tracing::debug!(client_id = %client.id, "authorization request pushed");
    ctx.save_authn_session(session).await?;

    Ok(Response::json(
        StatusCode::CREATED,
        &PushedResponse {
            request_uri,
            expires_in: ctx.config.par_lifetime_secs,
        },
    ))
}

fn protected_form_params(ctx: &Context<'_>) -> serde_json::Map<String, Value> {
    ctx.request
        .form
        .iter()
        .filter(|(name, _)| name.starts_with(PROTECTED_PARAM_PREFIX))
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect()
}
