//! Token minting.
//!
//! Access tokens are self-contained JWTs or opaque references, per the
//! host-chosen template. ID tokens are signed with the client's preferred
//! algorithm and optionally nested in a JWE addressed to the client.

use serde_json::{Map, Value};

use crate::client::Client;
use crate::config::{Configuration, Context};
use crate::error::Error;
use crate::jose::{self, ContentEncAlg};
use crate::material;
use crate::oauth::{claims, GrantInfo, TokenConfirmation, TokenFormat, TokenType};

/// The sender-constraint bindings attached to a token issuance.
#[derive(Debug, Clone, Default)]
pub(crate) struct SenderBinding {
    /// RFC 7638 thumbprint of the DPoP proof key.
    pub jwk_thumbprint: Option<String>,
    /// SHA-256 thumbprint of the client certificate.
    pub cert_thumbprint: Option<String>,
}

impl SenderBinding {
    /// Whether no binding is present.
    pub(crate) fn is_empty(&self) -> bool {
        self.jwk_thumbprint.is_none() && self.cert_thumbprint.is_none()
    }

    /// The `cnf` claim for this binding, when any.
    pub(crate) fn confirmation(&self) -> Option<TokenConfirmation> {
        if self.is_empty() {
            return None;
        }
        Some(TokenConfirmation {
            jwk_thumbprint: self.jwk_thumbprint.clone(),
            certificate_thumbprint: self.cert_thumbprint.clone(),
        })
    }

    /// DPoP-bound tokens present with the `DPoP` scheme, all others as
    /// plain bearer tokens.
    pub(crate) fn token_type(&self) -> TokenType {
        if self.jwk_thumbprint.is_some() {
            TokenType::DPoP
        } else {
            TokenType::Bearer
        }
    }
}

/// A freshly minted access token.
#[derive(Debug, Clone)]
pub(crate) struct IssuedToken {
    /// The wire value handed to the client.
    pub value: String,
    /// The id indexing the grant session: `jti` for JWTs, the value itself
    /// for opaque tokens.
    pub id: String,
    /// Bearer or DPoP.
    pub token_type: TokenType,
    /// Seconds until expiry.
    pub lifetime_secs: i64,
}

/// Mints an access token for a grant. `scopes` is the active scope set,
/// which a refresh request may have narrowed below the granted one.
pub(crate) fn make_access_token(
    config: &Configuration,
    grant: &GrantInfo,
    scopes: &str,
    binding: &SenderBinding,
) -> Result<IssuedToken, Error> {
    let options = &grant.token_options;
    match options.format {
        TokenFormat::Opaque => {
            let mut length = options.opaque_length.unwrap_or(material::AUTHORIZATION_CODE_LENGTH);
            // Opaque tokens must never share the refresh token length, which
            // is how the two are told apart during introspection.
            if length == material::REFRESH_TOKEN_LENGTH {
                length += 1;
            }
            let value = material::random_string(length);
            Ok(IssuedToken {
                id: value.clone(),
                value,
                token_type: binding.token_type(),
                lifetime_secs: options.lifetime_secs,
            })
        }
        TokenFormat::Jwt => {
            let id = material::random_string(30);
            let now = material::unix_now();

            let mut body = Map::new();
            body.insert(claims::ISSUER.into(), Value::String(config.host.clone()));
            body.insert(claims::SUBJECT.into(), Value::String(grant.subject.clone()));
            body.insert(claims::CLIENT_ID.into(), Value::String(grant.client_id.clone()));
            body.insert(claims::SCOPE.into(), Value::String(scopes.to_string()));
            body.insert(claims::TOKEN_ID.into(), Value::String(id.clone()));
            body.insert(claims::ISSUED_AT.into(), Value::from(now));
            body.insert(
                claims::EXPIRY.into(),
                Value::from(now + options.lifetime_secs),
            );
            let audience = match &grant.granted_resources {
                Some(resources) if !resources.0.is_empty() => {
                    serde_json::to_value(resources).map_err(Error::internal)?
                }
                _ => Value::String(grant.client_id.clone()),
            };
            body.insert(claims::AUDIENCE.into(), audience);
            if let Some(details) = &grant.granted_authorization_details {
                body.insert(
                    claims::AUTHORIZATION_DETAILS.into(),
                    serde_json::to_value(details).map_err(Error::internal)?,
                );
            }
            if let Some(confirmation) = binding.confirmation() {
                body.insert(
                    claims::CONFIRMATION.into(),
                    serde_json::to_value(confirmation).map_err(Error::internal)?,
                );
            }
            for (name, value) in &grant.additional_token_claims {
                body.insert(name.clone(), value.clone());
            }

            let key = config.token_sig_key(options)?;
            let value = jose::sign(&body, key, "at+jwt").map_err(Error::internal)?;
            Ok(IssuedToken {
                value,
                id,
                token_type: binding.token_type(),
                lifetime_secs: options.lifetime_secs,
            })
        }
    }
}

/// What goes into an ID token besides the grant itself.
#[derive(Debug, Default)]
pub(crate) struct IdTokenRequest {
    pub subject: String,
    pub nonce: Option<String>,
    /// When issued alongside an access token, hashed into `at_hash`.
    pub access_token: Option<String>,
    /// When issued alongside an authorization code, hashed into `c_hash`.
    pub code: Option<String>,
    /// When the response travels via JARM and carried state, hashed into
    /// `s_hash`.
    pub state: Option<String>,
    pub additional_claims: Map<String, Value>,
}

/// Mints (and optionally encrypts) an ID token for a client.
pub(crate) async fn make_id_token(
    ctx: &Context<'_>,
    client: &Client,
    request: IdTokenRequest,
) -> Result<String, Error> {
    let key = ctx.config.id_token_sig_key_for(client)?;
    let alg = jose::signature_algorithm(key)
        .ok_or_else(|| Error::internal("the ID token signing key has no usable algorithm"))?;

    let now = material::unix_now();
    let mut body = Map::new();
    body.insert(claims::ISSUER.into(), Value::String(ctx.config.host.clone()));
    body.insert(claims::SUBJECT.into(), Value::String(request.subject));
    body.insert(claims::AUDIENCE.into(), Value::String(client.id.clone()));
    body.insert(claims::ISSUED_AT.into(), Value::from(now));
    body.insert(
        claims::EXPIRY.into(),
        Value::from(now + ctx.config.id_token_lifetime_secs),
    );
    if let Some(nonce) = request.nonce {
        body.insert(claims::NONCE.into(), Value::String(nonce));
    }
    if let Some(access_token) = &request.access_token {
        body.insert(
            claims::ACCESS_TOKEN_HASH.into(),
            Value::String(jose::halved_hash(alg, access_token)),
        );
    }
    if let Some(code) = &request.code {
        body.insert(
            claims::CODE_HASH.into(),
            Value::String(jose::halved_hash(alg, code)),
        );
    }
    if let Some(state) = &request.state {
        body.insert(
            claims::STATE_HASH.into(),
            Value::String(jose::halved_hash(alg, state)),
        );
    }
    for (name, value) in request.additional_claims {
        body.insert(name, value);
    }

    let jws = jose::sign(&body, key, "JWT").map_err(Error::internal)?;

    let Some(key_enc_alg) = client.metadata.id_token_key_enc_alg else {
        return Ok(jws);
    };
    if !ctx.config.user_info_encryption_enabled {
        return Ok(jws);
    }
    let content_enc = client
        .metadata
        .id_token_content_enc_alg
        .unwrap_or(ContentEncAlg::A128CbcHs256);
    let enc_jwk = client.encryption_jwk(ctx.http_client(), key_enc_alg).await?;
    jose::encrypt(&jws, &enc_jwk, content_enc).map_err(Error::internal)
}

/// Mints a refresh token. Always opaque, always the protocol length.
pub(crate) fn make_refresh_token() -> String {
    material::refresh_token()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::minimal_config;
    use crate::oauth::{GrantType, TokenOptions};

    fn grant(options: TokenOptions) -> GrantInfo {
        GrantInfo {
            grant_type: GrantType::ClientCredentials,
            subject: "user-1".into(),
            client_id: "c1".into(),
            granted_scopes: "openid".into(),
            granted_authorization_details: None,
            granted_resources: None,
            additional_token_claims: Map::new(),
            additional_id_token_claims: Map::new(),
            additional_user_info_claims: Map::new(),
            token_options: options,
        }
    }

    #[test]
    fn test_jwt_access_token_claims() {
        let config = minimal_config();
        let mut grant = grant(TokenOptions::jwt(None, 300));
        grant
            .additional_token_claims
            .insert("tenant".into(), Value::String("acme".into()));

        let binding = SenderBinding {
            jwk_thumbprint: Some("thumb".into()),
            cert_thumbprint: None,
        };
        let token = make_access_token(&config, &grant, "openid", &binding).unwrap();
        assert_eq!(token.token_type, TokenType::DPoP);

        let key = config.key_ring.by_kid("sig-1").unwrap();
        let body = jose::verify(&token.value, key, &[jose::SigAlg::ES256]).unwrap();
        assert_eq!(body["iss"], "https://as.example.com");
        assert_eq!(body["sub"], "user-1");
        assert_eq!(body["aud"], "c1");
        assert_eq!(body["client_id"], "c1");
        assert_eq!(body["scope"], "openid");
        assert_eq!(body["jti"], token.id.as_str());
        assert_eq!(body["cnf"]["jkt"], "thumb");
        assert_eq!(body["tenant"], "acme");
    }

    #[test]
    fn test_opaque_token_never_matches_refresh_length() {
        let config = minimal_config();
        let grant = grant(TokenOptions::opaque(material::REFRESH_TOKEN_LENGTH, 300));
        let token =
            make_access_token(&config, &grant, "openid", &SenderBinding::default()).unwrap();
        assert_eq!(token.value.len(), material::REFRESH_TOKEN_LENGTH + 1);
        assert_eq!(token.id, token.value);
        assert_eq!(token.token_type, TokenType::Bearer);
    }

    #[test]
    fn test_refresh_token_length() {
        assert_eq!(make_refresh_token().len(), material::REFRESH_TOKEN_LENGTH);
    }
}
