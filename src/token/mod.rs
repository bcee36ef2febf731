//! The token engine.
//!
//! Dispatches on `grant_type`, authenticates the client, enforces sender
//! constraints, and mints tokens through [`issue`].

pub(crate) mod authorization_code;
pub(crate) mod client_credentials;
pub(crate) mod dpop;
pub(crate) mod issue;
pub(crate) mod refresh;

use serde::Serialize;

use crate::config::Context;
use crate::error::{Error, ErrorCode};
use crate::http::Response;
use crate::jose;
use crate::oauth::{GrantType, TokenType};

use dpop::ExpectedProof;
use issue::SenderBinding;

/// The token endpoint response body.
#[derive(Debug, Serialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub token_type: TokenType,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Handles `POST /token`.
pub(crate) async fn handle(ctx: &Context<'_>) -> Result<Response, Error> {
    let raw = ctx
        .request
        .form_param("grant_type")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::new(ErrorCode::InvalidRequest, "grant_type is required"))?;
    let grant_type = GrantType::parse(raw).ok_or_else(|| {
        Error::new(ErrorCode::UnsupportedGrantType, "unsupported grant_type")
    })?;
    if !ctx.config.grant_types.contains(&grant_type) {
        return Err(Error::new(
            ErrorCode::UnsupportedGrantType,
            "unsupported grant_type",
        ));
    }

    let response = match grant_type {
        GrantType::AuthorizationCode => authorization_code::exchange(ctx).await?,
        GrantType::RefreshToken => refresh::refresh(ctx).await?,
        GrantType::ClientCredentials => client_credentials::issue_for_client(ctx).await?,
        GrantType::Implicit | GrantType::Introspection => {
            return Err(Error::new(
                ErrorCode::UnsupportedGrantType,
                "unsupported grant_type",
            ))
        }
    };
    Ok(Response::ok_json(&response))
}

/// Derives the sender-constraint bindings for this token request.
///
/// `pinned_jkt` carries the `dpop_jkt` value from the authorization request
/// when one was sent; the proof key must match it.
pub(crate) fn sender_binding(
    ctx: &Context<'_>,
    pinned_jkt: Option<&str>,
) -> Result<SenderBinding, Error> {
    let mut binding = SenderBinding::default();

    if ctx.config.dpop_enabled {
        if let Some(proof) = ctx.request.dpop_proof() {
            let thumbprint = dpop::validate_proof(
                ctx,
                proof,
                &ExpectedProof {
                    access_token: None,
                    jwk_thumbprint: pinned_jkt,
                },
            )?;
            binding.jwk_thumbprint = Some(thumbprint);
        } else if pinned_jkt.is_some() {
            return Err(Error::new(
                ErrorCode::InvalidGrant,
                "a dpop proof is required for this grant",
            ));
        } else if ctx.config.dpop_required {
            return Err(Error::new(
                ErrorCode::InvalidRequest,
                "the dpop header is required",
            ));
        }
    }

    if ctx.config.mtls_token_binding_enabled {
        if let Some(der) = &ctx.request.client_cert {
            binding.cert_thumbprint = Some(jose::sha256_b64url(der));
        }
    }

    if ctx.config.sender_constrained_required && binding.is_empty() {
        return Err(Error::new(
            ErrorCode::InvalidGrant,
            "sender constrained tokens are required",
        ));
    }
    Ok(binding)
}
