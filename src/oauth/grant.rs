//! Grant descriptions and access token templates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{AuthorizationDetail, GrantType, Resources, TokenFormat};
use crate::material::DEFAULT_TOKEN_LIFETIME_SECS;

/// A template for minting access tokens, chosen by the host per grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenOptions {
    /// JWT or opaque.
    pub format: TokenFormat,
    /// Access token lifetime in seconds.
    pub lifetime_secs: i64,
    /// Overrides the default signing key for JWT tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_signature_key_id: Option<String>,
    /// Length of opaque tokens. Bumped when it collides with the refresh
    /// token length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opaque_length: Option<usize>,
}

impl TokenOptions {
    /// A JWT access token template.
    #[must_use]
    pub fn jwt(signature_key_id: Option<String>, lifetime_secs: i64) -> Self {
        Self {
            format: TokenFormat::Jwt,
            lifetime_secs,
            jwt_signature_key_id: signature_key_id,
            opaque_length: None,
        }
    }

    /// An opaque access token template.
    #[must_use]
    pub fn opaque(length: usize, lifetime_secs: i64) -> Self {
        Self {
            format: TokenFormat::Opaque,
            lifetime_secs,
            jwt_signature_key_id: None,
            opaque_length: Some(length),
        }
    }
}

impl Default for TokenOptions {
    fn default() -> Self {
        Self::jwt(None, DEFAULT_TOKEN_LIFETIME_SECS)
    }
}

/// Everything the token pipeline knows about a granted authorization.
///
/// Built from the authentication session (authorization code and implicit
/// flows), from the client itself (client credentials), or recovered from a
/// stored grant session (refresh).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantInfo {
    /// The grant that produced this authorization.
    pub grant_type: GrantType,
    /// The authenticated end user, or the client id for machine grants.
    pub subject: String,
    /// The client the grant belongs to.
    pub client_id: String,
    /// Space-delimited scopes the user consented to.
    pub granted_scopes: String,
    /// Authorization details the user consented to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_authorization_details: Option<Vec<AuthorizationDetail>>,
    /// Resource indicators bound to the grant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_resources: Option<Resources>,
    /// Extra claims injected into access tokens.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_token_claims: Map<String, Value>,
    /// Extra claims injected into ID tokens.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_id_token_claims: Map<String, Value>,
    /// Extra claims returned from the userinfo endpoint.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_user_info_claims: Map<String, Value>,
    /// The access token template for this grant.
    pub token_options: TokenOptions,
}

/// Sender-constraint confirmation claims, RFC 7800 / RFC 9449 / RFC 8705.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenConfirmation {
    /// RFC 7638 thumbprint of the DPoP proof key.
    #[serde(rename = "jkt", skip_serializing_if = "Option::is_none")]
    pub jwk_thumbprint: Option<String>,
    /// SHA-256 thumbprint of the client certificate.
    #[serde(rename = "x5t#S256", skip_serializing_if = "Option::is_none")]
    pub certificate_thumbprint: Option<String>,
}

impl TokenConfirmation {
    /// Whether any binding is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jwk_thumbprint.is_none() && self.certificate_thumbprint.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_options_constructors() {
        let jwt = TokenOptions::jwt(Some("sig-key".into()), 600);
        assert_eq!(jwt.format, TokenFormat::Jwt);
        assert_eq!(jwt.lifetime_secs, 600);
        assert_eq!(jwt.jwt_signature_key_id.as_deref(), Some("sig-key"));

        let opaque = TokenOptions::opaque(40, 300);
        assert_eq!(opaque.format, TokenFormat::Opaque);
        assert_eq!(opaque.opaque_length, Some(40));
    }

    #[test]
    fn test_confirmation_serialization() {
        let cnf = TokenConfirmation {
            jwk_thumbprint: None,
            certificate_thumbprint: Some("abc".into()),
        };
        let json = serde_json::to_value(&cnf).unwrap();
        assert_eq!(json["x5t#S256"], "abc");
        assert!(json.get("jkt").is_none());
    }
}
