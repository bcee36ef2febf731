//! The refresh token grant.

use super::{dpop, issue, TokenResponse};
use crate::client::authn::{self, AuthnSurface};
use crate::config::Context;
use crate::error::{Error, ErrorCode};
use crate::jose;
use crate::material;
use crate::oauth::{contains_all_scopes, scopes_contain_openid, GrantType};

/// Handles `grant_type=refresh_token`.
///
/// The active scope set may be narrowed to a subset of the granted one.
/// When rotation is enabled the presented token is replaced atomically and
/// stops working. Sender-constrained grants must re-prove their binding.
pub(crate) async fn refresh(ctx: &Context<'_>) -> Result<TokenResponse, Error> {
    let refresh_token = ctx
        .request
        .form_param("refresh_token")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::new(ErrorCode::InvalidRequest, "refresh_token is required"))?;

    let client = authn::authenticated(ctx, AuthnSurface::Token).await?;

    let Some(mut grant_session) = ctx.grant_session_by_refresh_token(refresh_token).await? else {
        return Err(Error::new(ErrorCode::InvalidGrant, "invalid refresh_token"));
    };

    if grant_session.is_expired() {
        ctx.delete_grant_session(&grant_session.id).await?;
        return Err(Error::new(
            ErrorCode::InvalidGrant,
            "the refresh token is expired",
        ));
    }
    if !client.is_grant_allowed(GrantType::RefreshToken) {
        return Err(Error::new(
            ErrorCode::UnauthorizedClient,
            "the client is not allowed the refresh_token grant",
        ));
    }
    if grant_session.grant_info.client_id != client.id {
        return Err(Error::new(
            ErrorCode::InvalidGrant,
            "the refresh token was not issued to the client",
        ));
    }

    if let Some(requested) = ctx.request.form_param("scope").filter(|s| !s.is_empty()) {
        if !contains_all_scopes(&grant_session.grant_info.granted_scopes, requested) {
            return Err(Error::new(
                ErrorCode::InvalidScope,
                "scope exceeds what was granted",
            ));
        }
        grant_session.active_scopes = requested.to_string();
    }

    if let Some(raw) = ctx
        .request
        .form_param("authorization_details")
        .filter(|d| !d.is_empty())
    {
        let requested: Vec<crate::oauth::AuthorizationDetail> = serde_json::from_str(raw)
            .map_err(|_| {
                Error::new(
                    ErrorCode::InvalidAuthorizationDetails,
                    "malformed authorization_details",
                )
            })?;
        let granted = grant_session
            .grant_info
            .granted_authorization_details
            .clone()
            .unwrap_or_default();
        ctx.config
            .hooks
            .compare_authorization_details(&granted, &requested)?;
    }

    verify_binding_continuity(ctx, &grant_session)?;

    let grant = grant_session.grant_info.clone();
    let binding = issue::SenderBinding {
        jwk_thumbprint: grant_session.jwk_thumbprint.clone(),
        cert_thumbprint: grant_session.client_cert_thumbprint.clone(),
    };
    let token =
        issue::make_access_token(ctx.config, &grant, &grant_session.active_scopes, &binding)?;

    if ctx.config.refresh_rotation_enabled {
        grant_session.refresh_token = Some(issue::make_refresh_token());
    }
    grant_session.token_id = token.id.clone();
    grant_session.last_token_issued_at = material::unix_now();

    let id_token = if scopes_contain_openid(&grant_session.active_scopes) {
        Some(
            issue::make_id_token(
                ctx,
                &client,
                issue::IdTokenRequest {
                    subject: grant.subject.clone(),
                    nonce: None,
                    access_token: Some(token.value.clone()),
                    code: None,
                    state: None,
                    additional_claims: grant.additional_id_token_claims.clone(),
                },
            )
            .await?,
        )
    } else {
        None
    };

    let response = TokenResponse {
        access_token: token.value,
        token_type: token.token_type,
        expires_in: token.lifetime_secs,
        refresh_token: grant_session.refresh_token.clone(),
        id_token,
        scope: Some(grant_session.active_scopes.clone()),
    };
    ctx.save_grant_session(grant_session).await?;

    tracing::info!(client_id = %client.id, "refresh token used");
    Ok(response)
}

// A grant bound to a key or certificate only ever issues tokens carrying
// that same binding.
fn verify_binding_continuity(
    ctx: &Context<'_>,
    grant_session: &crate::session::GrantSession,
) -> Result<(), Error> {
    if let Some(jkt) = &grant_session.jwk_thumbprint {
        let proof = ctx.request.dpop_proof().ok_or_else(|| {
            Error::new(ErrorCode::InvalidGrant, "a dpop proof is required")
        })?;
        dpop::validate_proof(
            ctx,
            proof,
            &dpop::ExpectedProof {
                access_token: None,
                jwk_thumbprint: Some(jkt),
            },
        )?;
    }
    if let Some(cert_thumbprint) = &grant_session.client_cert_thumbprint {
        let der = ctx.request.client_cert.as_deref().ok_or_else(|| {
            Error::new(ErrorCode::InvalidGrant, "a client certificate is required")
        })?;
        if &jose::sha256_b64url(der) != cert_thumbprint {
            return Err(Error::new(
                ErrorCode::InvalidGrant,
                "the client certificate does not match the grant binding",
            ));
        }
    }
    Ok(())
}
