//! The client credentials grant.

use serde_json::Map;

use super::{issue, sender_binding, TokenResponse};
use crate::client::authn::{self, AuthnSurface};
use crate::config::Context;
use crate::error::{Error, ErrorCode};
use crate::oauth::{ClientAuthnMethod, GrantInfo, GrantType, TokenOptions};
use crate::session::GrantSession;

/// Handles `grant_type=client_credentials`. No user is involved: the
/// subject is the client itself, and neither refresh nor ID tokens are
/// issued.
pub(crate) async fn issue_for_client(ctx: &Context<'_>) -> Result<TokenResponse, Error> {
    let client = authn::authenticated(ctx, AuthnSurface::Token).await?;

    if client.metadata.authn_method == ClientAuthnMethod::None {
        return Err(Error::new(
            ErrorCode::InvalidClient,
            "public clients cannot use client_credentials",
        ));
    }
    if !client.is_grant_allowed(GrantType::ClientCredentials) {
        return Err(Error::new(
            ErrorCode::UnauthorizedClient,
            "the client is not allowed the client_credentials grant",
        ));
    }

    let scopes = ctx
        .request
        .form_param("scope")
        .filter(|s| !s.is_empty())
        .unwrap_or(&client.metadata.scopes)
        .to_string();
    if !client.are_scopes_allowed(&ctx.config.scopes, &scopes) {
        return Err(Error::new(ErrorCode::InvalidScope, "invalid scope"));
    }

    let mut grant = GrantInfo {
        grant_type: GrantType::ClientCredentials,
        subject: client.id.clone(),
        client_id: client.id.clone(),
        granted_scopes: scopes.clone(),
        granted_authorization_details: None,
        granted_resources: None,
        additional_token_claims: Map::new(),
        additional_id_token_claims: Map::new(),
        additional_user_info_claims: Map::new(),
        token_options: TokenOptions::default(),
    };
    grant.token_options = ctx.token_options(&client, &grant);
    ctx.config
        .hooks
        .handle_grant(ctx.request, &mut grant)
        .await?;

    let binding = sender_binding(ctx, None)?;
    let token = issue::make_access_token(ctx.config, &grant, &scopes, &binding)?;

    let mut grant_session = GrantSession::new(grant, &token.id, token.lifetime_secs);
    grant_session.jwk_thumbprint = binding.jwk_thumbprint.clone();
    grant_session.client_cert_thumbprint = binding.cert_thumbprint.clone();
    ctx.save_grant_session(grant_session).await?;

    tracing::info!(client_id = %client.id, "client credentials grant issued");
    Ok(TokenResponse {
        access_token: token.value,
        token_type: token.token_type,
        expires_in: token.lifetime_secs,
        refresh_token: None,
        id_token: None,
        scope: Some(scopes),
    })
}
