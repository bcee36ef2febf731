//! JWT-secured authorization requests (request objects).

use serde_json::{Map, Value};

use crate::client::Client;
use crate::config::Context;
use crate::error::{Error, ErrorCode};
use crate::jose::{self, JoseKind};
use crate::keys::KeyUse;
use crate::material::{self, PROTECTED_PARAM_PREFIX};
use crate::oauth::AuthorizationParameters;

/// Verifies a request object and returns its parameters together with any
/// protected (`p_` prefixed) members.
///
/// An encrypted object is unwrapped first: the JWE must name one of the
/// configured decryption keys through its `kid` header. The inner (or bare)
/// JWS is verified against the client JWKS with the accepted algorithm set.
pub(crate) async fn extract_request_object(
    ctx: &Context<'_>,
    client: &Client,
    raw: &str,
) -> Result<(AuthorizationParameters, Map<String, Value>), Error> {
    let mut object = raw.to_string();

    if ctx.config.jar_encryption_enabled && jose::kind(&object) == Some(JoseKind::Jwe) {
        object = decrypt_request_object(ctx, &object)?;
    }

    if jose::kind(&object) != Some(JoseKind::Jws) {
        return Err(invalid_object("the request object is not a JWS"));
    }

    let algs = match client.metadata.jar_sig_alg {
        Some(alg) => vec![alg],
        None => ctx.config.jar_sig_algs.clone(),
    };

    let header = jose::decode_header(&object)
        .map_err(|_| invalid_object("malformed request object"))?;
    let jwk = match header.get("kid").and_then(Value::as_str) {
        Some(kid) => client.jwk_by_kid(ctx.http_client(), kid).await,
        None => {
            let alg = header
                .get("alg")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid_object("malformed request object"))?;
            client.jwk_by_alg(ctx.http_client(), alg).await
        }
    }
    .map_err(|err| invalid_object(err.description))?;

    let claims = jose::verify(&object, &jwk, &algs)
        .map_err(|err| invalid_object(format!("could not verify the request object: {err}")))?;
    validate_object_claims(ctx, client, &claims)?;

    let protected = claims
        .iter()
        .filter(|(name, _)| name.starts_with(PROTECTED_PARAM_PREFIX))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    let params: AuthorizationParameters =
        serde_json::from_value(Value::Object(claims))
            .map_err(|_| invalid_object("invalid request object parameters"))?;

    Ok((params, protected))
}

fn decrypt_request_object(ctx: &Context<'_>, jwe: &str) -> Result<String, Error> {
    let header = jose::decode_header(jwe)
        .map_err(|_| invalid_object("could not parse the encrypted request object"))?;
    let kid = header
        .get("kid")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_object("invalid JWE key id"))?;

    if !ctx.config.jar_key_enc_kids.iter().any(|k| k == kid) {
        return Err(invalid_object("invalid JWE key id"));
    }
    let jwk = ctx
        .config
        .key_ring
        .by_kid(kid)
        .filter(|k| k.key_use() == Some(KeyUse::Encryption.as_str()))
        .ok_or_else(|| invalid_object("invalid JWK used for encryption"))?;

    jose::decrypt(
        jwe,
        jwk,
        &ctx.config.jar_key_enc_algs(),
        &ctx.config.jar_content_enc_algs,
    )
    .map_err(|err| invalid_object(format!("could not decrypt the request object: {err}")))
}

fn validate_object_claims(
    ctx: &Context<'_>,
    client: &Client,
    claims: &Map<String, Value>,
) -> Result<(), Error> {
    let exp = jose::require_number(claims, "exp")
        .map_err(|_| invalid_object("claim exp is missing in the request object"))?;

    let now = material::unix_now();
    if now >= exp {
        return Err(invalid_object("the request object is expired"));
    }
    if exp - now > ctx.config.jar_lifetime_secs {
        return Err(invalid_object("the request object expires too far ahead"));
    }

    let iss = jose::require_string(claims, "iss")
        .map_err(|_| invalid_object("claim iss is missing in the request object"))?;
    if iss != client.id {
        return Err(invalid_object("invalid request object issuer"));
    }

    if !jose::audience_list(claims)
        .iter()
        .any(|aud| aud == &ctx.config.host)
    {
        return Err(invalid_object("invalid request object audience"));
    }
    Ok(())
}

fn invalid_object(description: impl Into<String>) -> Error {
    Error::new(ErrorCode::InvalidRequestObject, description)
}
