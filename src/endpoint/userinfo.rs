//! The userinfo endpoint.
//!
//! Resolves the presented access token to its grant session, verifies any
//! sender-constraint binding, and returns the user claims: plain JSON by
//! default, signed (and optionally encrypted) when the client registered
//! response algorithms.

use serde_json::{Map, Value};

use crate::config::Context;
use crate::error::{Error, ErrorCode};
use crate::http::Response;
use crate::jose::{self, ContentEncAlg};
use crate::material;
use crate::oauth::{claims, scopes_contain_openid};
use crate::session::GrantSession;
use crate::token::dpop::{self, ExpectedProof};

/// Handles `GET|POST /userinfo`.
pub(crate) async fn handle(ctx: &Context<'_>) -> Result<Response, Error> {
    let (scheme, token) = ctx
        .request
        .authorization_token()
        .ok_or_else(|| invalid_token("the access token is required"))?;

    let token_id = resolve_token_id(ctx, token)?;
    let grant = ctx
        .grant_session_by_token_id(&token_id)
        .await?
        .ok_or_else(|| invalid_token("invalid access token"))?;
    if grant.has_last_token_expired() {
        return Err(invalid_token("the access token is expired"));
    }
    if !scopes_contain_openid(&grant.active_scopes) {
        return Err(invalid_token("the openid scope is required"));
    }

    verify_possession(ctx, scheme, token, &grant)?;

    let client = ctx.client(&grant.grant_info.client_id).await?;

    let mut body = Map::new();
    body.insert(
        claims::SUBJECT.into(),
        Value::String(grant.grant_info.subject.clone()),
    );
    for (name, value) in &grant.grant_info.additional_user_info_claims {
        body.insert(name.clone(), value.clone());
    }

    if client.metadata.user_info_sig_alg.is_none() {
        return Ok(Response::ok_json(&Value::Object(body)));
    }

    // Signed responses are full JWTs with issuer and audience.
    body.insert(claims::ISSUER.into(), Value::String(ctx.config.host.clone()));
    body.insert(claims::AUDIENCE.into(), Value::String(client.id.clone()));
    body.insert(claims::ISSUED_AT.into(), Value::from(material::unix_now()));

    let key = ctx.config.user_info_sig_key_for(&client)?;
    let mut serialized = jose::sign(&body, key, "JWT").map_err(Error::internal)?;

    if let Some(key_enc_alg) = client.metadata.user_info_key_enc_alg {
        if ctx.config.user_info_encryption_enabled {
            let content_enc = client
                .metadata
                .user_info_content_enc_alg
                .unwrap_or(ContentEncAlg::A128CbcHs256);
            let enc_jwk = client.encryption_jwk(ctx.http_client(), key_enc_alg).await?;
            serialized = jose::encrypt(&serialized, &enc_jwk, content_enc).map_err(Error::internal)?;
        }
    }

    Ok(Response::Jwt {
        status: http::StatusCode::OK,
        body: serialized,
    })
}

fn resolve_token_id(ctx: &Context<'_>, token: &str) -> Result<String, Error> {
    if !jose::is_jws(token) {
        return Ok(token.to_string());
    }

    let header = jose::decode_header(token).map_err(|_| invalid_token("invalid access token"))?;
    let kid = header
        .get("kid")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_token("invalid access token"))?;
    let key = ctx
        .config
        .key_ring
        .by_kid(kid)
        .ok_or_else(|| invalid_token("invalid access token"))?;

    let allowed = ctx.config.key_ring.signing_algorithms();
    let body = jose::verify(token, key, &allowed)
        .map_err(|_| invalid_token("invalid access token"))?;
    body.get("jti")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| invalid_token("invalid access token"))
}

fn verify_possession(
    ctx: &Context<'_>,
    scheme: &str,
    token: &str,
    grant: &GrantSession,
) -> Result<(), Error> {
    if let Some(jkt) = &grant.jwk_thumbprint {
        if scheme != "DPoP" {
            return Err(invalid_token("the token must be presented with DPoP"));
        }
        let proof = ctx
            .request
            .dpop_proof()
            .ok_or_else(|| invalid_token("a dpop proof is required"))?;
        dpop::validate_proof(
            ctx,
            proof,
            &ExpectedProof {
                access_token: Some(token),
                jwk_thumbprint: Some(jkt),
            },
        )
        .map_err(|_| invalid_token("invalid dpop proof"))?;
    } else if scheme != "Bearer" {
        return Err(invalid_token("invalid authorization scheme"));
    }

    if let Some(cert_thumbprint) = &grant.client_cert_thumbprint {
        let der = ctx
            .request
            .client_cert
            .as_deref()
            .ok_or_else(|| invalid_token("a client certificate is required"))?;
        if &jose::sha256_b64url(der) != cert_thumbprint {
            return Err(invalid_token(
                "the client certificate does not match the token binding",
            ));
        }
    }
    Ok(())
}

fn invalid_token(description: &str) -> Error {
    Error::new(ErrorCode::InvalidToken, description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::minimal_config;
    use crate::http::Request;

    #[test]
    fn test_opaque_token_resolves_to_itself() {
        let config = minimal_config();
        let request = Request::builder().path("/userinfo").build();
        let ctx = Context {
            config: &config,
            request: &request,
        };
        assert_eq!(resolve_token_id(&ctx, "opaque-value").unwrap(), "opaque-value");
    }
}
