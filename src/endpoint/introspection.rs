//! Token introspection, RFC 7662.
//!
//! A token value is disambiguated by shape: refresh tokens by their fixed
//! length, JWT access tokens by structure, everything else as an opaque
//! token id. Misses and expired grants are not errors; they are the
//! protocol-defined `active: false` answer.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::client::authn::{self, AuthnSurface};
use crate::config::Context;
use crate::error::{Error, ErrorCode};
use crate::http::Response;
use crate::jose;
use crate::keys::KeyUse;
use crate::material::REFRESH_TOKEN_LENGTH;
use crate::oauth::{AuthorizationDetail, TokenConfirmation, TokenTypeHint};
use crate::session::GrantSession;

/// The introspection response body.
#[derive(Debug, Default, Serialize)]
pub(crate) struct TokenInfo {
    active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<TokenTypeHint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cnf: Option<TokenConfirmation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_details: Option<Vec<AuthorizationDetail>>,
    #[serde(flatten)]
    additional: Map<String, Value>,
}

impl TokenInfo {
    fn inactive() -> Self {
        Self::default()
    }
}

/// Handles `POST /introspect`.
pub(crate) async fn introspect(ctx: &Context<'_>) -> Result<Response, Error> {
    let client = authn::authenticated(ctx, AuthnSurface::Introspection).await?;
    if !ctx.config.hooks.is_client_allowed_introspection(&client) {
        return Err(Error::new(
            ErrorCode::InvalidGrant,
            "the client is not allowed to introspect tokens",
        ));
    }

    let token = ctx
        .request
        .form_param("token")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::new(ErrorCode::InvalidRequest, "token is required"))?;

    let info = token_info(ctx, token).await?;
    Ok(Response::ok_json(&info))
}

async fn token_info(ctx: &Context<'_>, token: &str) -> Result<TokenInfo, Error> {
    if token.len() == REFRESH_TOKEN_LENGTH {
        return refresh_token_info(ctx, token).await;
    }
    if jose::is_jws(token) {
        return jwt_token_info(ctx, token).await;
    }
    access_token_info_by_id(ctx, token).await
}

async fn refresh_token_info(ctx: &Context<'_>, token: &str) -> Result<TokenInfo, Error> {
    let Some(grant) = ctx.grant_session_by_refresh_token(token).await? else {
        return Ok(TokenInfo::inactive());
    };
    if grant.is_expired() {
        return Ok(TokenInfo::inactive());
    }
    Ok(TokenInfo {
        active: true,
        hint: Some(TokenTypeHint::RefreshToken),
        scope: Some(grant.grant_info.granted_scopes.clone()),
        client_id: Some(grant.grant_info.client_id.clone()),
        sub: Some(grant.grant_info.subject.clone()),
        exp: Some(grant.expires_at),
        cnf: confirmation(&grant),
        authorization_details: grant.grant_info.granted_authorization_details.clone(),
        additional: grant.grant_info.additional_token_claims.clone(),
    })
}

// The grant session, not the signature, decides whether a JWT access token
// is active. A cryptographically valid JWT whose grant is gone or expired
// introspects as inactive.
async fn jwt_token_info(ctx: &Context<'_>, token: &str) -> Result<TokenInfo, Error> {
    let Ok(header) = jose::decode_header(token) else {
        return Ok(TokenInfo::inactive());
    };
    let Some(kid) = header.get("kid").and_then(Value::as_str) else {
        return Ok(TokenInfo::inactive());
    };
    let Some(key) = ctx
        .config
        .key_ring
        .by_kid(kid)
        .filter(|k| k.key_use() == Some(KeyUse::Signature.as_str()))
    else {
        return Ok(TokenInfo::inactive());
    };

    let allowed = ctx.config.key_ring.signing_algorithms();
    let Ok(claims) = jose::verify(token, key, &allowed) else {
        return Ok(TokenInfo::inactive());
    };
    if claims.get("iss").and_then(Value::as_str) != Some(ctx.config.host.as_str()) {
        return Ok(TokenInfo::inactive());
    }
    let Some(token_id) = claims.get("jti").and_then(Value::as_str) else {
        return Ok(TokenInfo::inactive());
    };
    access_token_info_by_id(ctx, token_id).await
}

async fn access_token_info_by_id(ctx: &Context<'_>, token_id: &str) -> Result<TokenInfo, Error> {
    let Some(grant) = ctx.grant_session_by_token_id(token_id).await? else {
        return Ok(TokenInfo::inactive());
    };
    if grant.has_last_token_expired() {
        return Ok(TokenInfo::inactive());
    }
    Ok(TokenInfo {
        active: true,
        hint: Some(TokenTypeHint::AccessToken),
        scope: Some(grant.active_scopes.clone()),
        client_id: Some(grant.grant_info.client_id.clone()),
        sub: Some(grant.grant_info.subject.clone()),
        exp: Some(grant.last_token_issued_at + grant.grant_info.token_options.lifetime_secs),
        cnf: confirmation(&grant),
        authorization_details: grant.grant_info.granted_authorization_details.clone(),
        additional: grant.grant_info.additional_token_claims.clone(),
    })
}

fn confirmation(grant: &GrantSession) -> Option<TokenConfirmation> {
    if grant.jwk_thumbprint.is_none() && grant.client_cert_thumbprint.is_none() {
        return None;
    }
    Some(TokenConfirmation {
        jwk_thumbprint: grant.jwk_thumbprint.clone(),
        certificate_thumbprint: grant.client_cert_thumbprint.clone(),
    })
}
