//! The authorization code grant.

use subtle::ConstantTimeEq;

use super::{issue, sender_binding, TokenResponse};
use crate::client::authn::{self, AuthnSurface};
use crate::client::Client;
use crate::config::Context;
use crate::error::{Error, ErrorCode};
use crate::jose;
use crate::oauth::{scopes_contain_openid, CodeChallengeMethod, GrantType};
use crate::session::{AuthnSession, GrantSession};

/// Handles `grant_type=authorization_code`.
///
/// Codes are single use. The backing session is deleted before anything can
/// fail, and a code that no longer resolves is treated as replayed: any
/// grant already minted under it is revoked before the request is refused.
pub(crate) async fn exchange(ctx: &Context<'_>) -> Result<TokenResponse, Error> {
    let code = ctx
        .request
        .form_param("code")
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::new(ErrorCode::InvalidRequest, "code is required"))?;

    let client = authn::authenticated(ctx, AuthnSurface::Token).await?;

    let Some(session) = ctx.authn_session_by_code(code).await? else {
        ctx.revoke_grant_for_code(code).await?;
        return Err(Error::new(
            ErrorCode::InvalidGrant,
            "invalid authorization code",
        ));
    };
    ctx.delete_authn_session(&session.id).await?;

    validate_exchange(ctx, &client, &session)?;

    let mut grant = session.grant_info(GrantType::AuthorizationCode);
    grant.token_options = ctx.token_options(&client, &grant);
    ctx.config
        .hooks
        .handle_grant(ctx.request, &mut grant)
        .await?;

    let binding = sender_binding(ctx, session.params.dpop_jkt.as_deref())?;
    let token = issue::make_access_token(ctx.config, &grant, &grant.granted_scopes, &binding)?;

    let refresh_token = ctx
        .should_issue_refresh_token(&client, &grant)
        .then(issue::make_refresh_token);

    let id_token = if scopes_contain_openid(&grant.granted_scopes) {
        Some(
            issue::make_id_token(
                ctx,
                &client,
                issue::IdTokenRequest {
                    subject: grant.subject.clone(),
                    nonce: session.params.nonce.clone(),
                    access_token: Some(token.value.clone()),
                    code: Some(code.to_string()),
                    state: None,
                    additional_claims: grant.additional_id_token_claims.clone(),
                },
            )
            .await?,
        )
    } else {
        None
    };

    let scope = grant.granted_scopes.clone();
    let grant_lifetime = if refresh_token.is_some() {
        ctx.config.refresh_token_lifetime_secs
    } else {
        token.lifetime_secs
    };

    let mut grant_session = GrantSession::new(grant, &token.id, grant_lifetime);
    grant_session.authorization_code = Some(code.to_string());
    grant_session.refresh_token = refresh_token.clone();
    grant_session.jwk_thumbprint = binding.jwk_thumbprint.clone();
    grant_session.client_cert_thumbprint = binding.cert_thumbprint.clone();
    ctx.save_grant_session(grant_session).await?;

    tracing::info!(client_id = %client.id, "authorization code exchanged");
    Ok(TokenResponse {
        access_token: token.value,
        token_type: token.token_type,
        expires_in: token.lifetime_secs,
        refresh_token,
        id_token,
        scope: Some(scope),
    })
}

fn validate_exchange(
    ctx: &Context<'_>,
    client: &Client,
    session: &AuthnSession,
) -> Result<(), Error> {
    if !client.is_grant_allowed(GrantType::AuthorizationCode) {
        return Err(Error::new(
            ErrorCode::UnauthorizedClient,
            "the client is not allowed the authorization_code grant",
        ));
    }
    if session.client_id != client.id {
        return Err(Error::new(
            ErrorCode::InvalidGrant,
            "the authorization code was not issued to the client",
        ));
    }
    if ctx.request.form_param("redirect_uri") != session.params.redirect_uri.as_deref() {
        return Err(Error::new(ErrorCode::InvalidGrant, "invalid redirect_uri"));
    }
    validate_pkce(ctx, session)
}

fn validate_pkce(ctx: &Context<'_>, session: &AuthnSession) -> Result<(), Error> {
    let Some(challenge) = session.params.code_challenge.as_deref() else {
        return Ok(());
    };

    let verifier = ctx
        .request
        .form_param("code_verifier")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::new(ErrorCode::InvalidGrant, "code_verifier is required"))?;

    let method = session
        .params
        .code_challenge_method
        .unwrap_or(CodeChallengeMethod::Plain);
    let derived = match method {
        CodeChallengeMethod::S256 => jose::sha256_b64url(verifier.as_bytes()),
        CodeChallengeMethod::Plain => verifier.to_string(),
    };

    if derived.as_bytes().ct_eq(challenge.as_bytes()).into() {
        Ok(())
    } else {
        Err(Error::new(ErrorCode::InvalidGrant, "invalid code_verifier"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::minimal_config;
    use crate::http::Request;
    use crate::oauth::AuthorizationParameters;
    use std::collections::HashMap;

    fn session_with_challenge(
        challenge: &str,
        method: CodeChallengeMethod,
    ) -> AuthnSession {
        AuthnSession::new(
            "c1",
            AuthorizationParameters {
                code_challenge: Some(challenge.into()),
                code_challenge_method: Some(method),
                ..Default::default()
            },
        )
    }

    fn ctx_with_verifier(verifier: Option<&str>) -> (crate::config::Configuration, Request) {
        let config = minimal_config();
        let mut form = HashMap::new();
        if let Some(verifier) = verifier {
            form.insert("code_verifier".to_string(), verifier.to_string());
        }
        let request = Request::builder()
            .method(http::Method::POST)
            .path("/token")
            .form(form)
            .build();
        (config, request)
    }

    // Verifier and challenge pair from RFC 7636 appendix B.
    #[test]
    fn test_pkce_s256_vector() {
        let session = session_with_challenge(
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
            CodeChallengeMethod::S256,
        );
        let (config, request) =
            ctx_with_verifier(Some("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"));
        let ctx = Context {
            config: &config,
            request: &request,
        };
        assert!(validate_pkce(&ctx, &session).is_ok());
    }

    #[test]
    fn test_pkce_wrong_verifier() {
        let session = session_with_challenge(
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
            CodeChallengeMethod::S256,
        );
        let (config, request) = ctx_with_verifier(Some("wrong-verifier"));
        let ctx = Context {
            config: &config,
            request: &request,
        };
        let err = validate_pkce(&ctx, &session).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidGrant);
    }

    #[test]
    fn test_pkce_verifier_required_when_challenged() {
        let session = session_with_challenge("challenge", CodeChallengeMethod::Plain);
        let (config, request) = ctx_with_verifier(None);
        let ctx = Context {
            config: &config,
            request: &request,
        };
        let err = validate_pkce(&ctx, &session).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidGrant);
    }
}
