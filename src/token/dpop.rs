//! DPoP proof validation, RFC 9449.

use josekit::jwk::Jwk;
use serde_json::Value;
use url::Url;

use crate::config::Context;
use crate::error::{Error, ErrorCode};
use crate::jose;
use crate::material;

/// Values a proof must additionally bind to.
#[derive(Debug, Default)]
pub(crate) struct ExpectedProof<'a> {
    /// When presenting a token to a resource endpoint, the token whose hash
    /// must appear in `ath`.
    pub access_token: Option<&'a str>,
    /// A previously pinned key thumbprint (`dpop_jkt` or a stored grant
    /// binding) the proof key must match.
    pub jwk_thumbprint: Option<&'a str>,
}

/// Builds an `invalid_grant` error for a rejected DPoP proof.
fn invalid_proof(description: impl Into<String>) -> Error {
    Error::new(ErrorCode::InvalidGrant, description)
}

/// Validates the proof and returns the thumbprint of its key.
pub(crate) fn validate_proof(
    ctx: &Context<'_>,
    proof: &str,
    expected: &ExpectedProof<'_>,
) -> Result<String, Error> {
    let header = jose::decode_header(proof).map_err(|_| invalid_proof("invalid dpop"))?;

    if header.get("typ").and_then(Value::as_str) != Some("dpop+jwt") {
        return Err(invalid_proof("invalid typ header, it should be dpop+jwt"));
    }

    let jwk_map = header
        .get("jwk")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid_proof("invalid jwk header"))?;
    if jwk_map.contains_key("d") || jwk_map.contains_key("k") {
        return Err(invalid_proof("the dpop key must be public"));
    }
    let jwk =
        Jwk::from_map(jwk_map.clone()).map_err(|_| invalid_proof("invalid jwk header"))?;

    let claims = jose::verify(proof, &jwk, &ctx.config.dpop_sig_algs)
        .map_err(|_| invalid_proof("invalid dpop"))?;

    let jti = jose::require_string(&claims, "jti")
        .map_err(|_| invalid_proof("invalid jti claim"))?;
    if jti.is_empty() {
        return Err(invalid_proof("invalid jti claim"));
    }

    let iat = jose::require_number(&claims, "iat")
        .map_err(|_| invalid_proof("invalid iat claim"))?;
    let now = material::unix_now();
    if iat > now || now - iat > ctx.config.dpop_lifetime_secs {
        return Err(invalid_proof("the dpop proof is too old"));
    }

    let htm = jose::require_string(&claims, "htm")
        .map_err(|_| invalid_proof("invalid htm claim"))?;
    if htm != ctx.request.method.as_str() {
        return Err(invalid_proof("invalid htm claim"));
    }

    let htu = jose::require_string(&claims, "htu")
        .map_err(|_| invalid_proof("invalid htu claim"))?;
    let normalized = normalize_htu(htu).ok_or_else(|| invalid_proof("invalid htu claim"))?;
    let audiences = ctx.audiences();
    if !audiences
        .iter()
        .any(|aud| aud.trim_end_matches('/') == normalized)
    {
        return Err(invalid_proof("invalid htu claim"));
    }

    if let Some(access_token) = expected.access_token {
        let ath = jose::require_string(&claims, "ath")
            .map_err(|_| invalid_proof("invalid ath claim"))?;
        if ath != jose::sha256_b64url(access_token.as_bytes()) {
            return Err(invalid_proof("invalid ath claim"));
        }
    }

    let thumbprint = jose::thumbprint_sha256(&jwk)
        .map_err(|_| invalid_proof("invalid jwk header"))?;
    if let Some(expected_thumbprint) = expected.jwk_thumbprint {
        if thumbprint != expected_thumbprint {
            return Err(Error::new(
                ErrorCode::InvalidGrant,
                "the dpop proof key does not match the expected thumbprint",
            ));
        }
    }

    Ok(thumbprint)
}

// The query and fragment components of htu are ignored and matching is case
// insensitive on scheme and host.
fn normalize_htu(htu: &str) -> Option<String> {
    let mut url = Url::parse(htu).ok()?;
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_htu() {
        assert_eq!(
            normalize_htu("https://AS.example.com/token?foo=bar#frag").unwrap(),
            "https://as.example.com/token"
        );
        assert_eq!(
            normalize_htu("https://as.example.com/").unwrap(),
            "https://as.example.com"
        );
        assert!(normalize_htu("not a url").is_none());
    }
}
