//! Client records and metadata.
//!
//! A [`Client`] couples its identity and credentials with the RFC 7591
//! metadata document it was registered with. Static clients are declared in
//! configuration; dynamic ones go through the registration endpoint. Either
//! way the same record flows through authentication, authorization and
//! token issuance.

pub(crate) mod authn;

use std::sync::{Arc, RwLock};

use josekit::jwk::Jwk;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ErrorCode};
use crate::jose::{ContentEncAlg, KeyEncAlg, SigAlg};
use crate::oauth::{
    split_scopes, ClientAuthnMethod, GrantType, ResponseType, Scope, SubjectIdentifierType,
};

/// A registered client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// The client identifier.
    pub id: String,
    /// bcrypt hash of the client secret, for the basic and post methods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashed_secret: Option<String>,
    /// The plaintext secret. Required for `client_secret_jwt`, where the
    /// secret is the HMAC key and a hash cannot verify anything.
    #[serde(with = "serde_secret", default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretString>,
    /// bcrypt hash of the registration access token for dynamic clients.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_token_hash: Option<String>,
    /// The registered metadata.
    #[serde(flatten)]
    pub metadata: ClientMetadata,
    /// Per-instance cache of a fetched `jwks_uri` document.
    #[serde(skip, default)]
    jwks_cache: Arc<RwLock<Option<Value>>>,
}

impl Client {
    /// A client with the given id and metadata and no credentials.
    #[must_use]
    pub fn new(id: impl Into<String>, metadata: ClientMetadata) -> Self {
        Self {
            id: id.into(),
            hashed_secret: None,
            secret: None,
            registration_token_hash: None,
            metadata,
            jwks_cache: Arc::default(),
        }
    }

    /// Whether the client registered this grant type.
    #[must_use]
    pub fn is_grant_allowed(&self, grant: GrantType) -> bool {
        self.metadata.grant_types.contains(&grant)
    }

    /// Whether the client registered this response type.
    #[must_use]
    pub fn is_response_type_allowed(&self, response_type: ResponseType) -> bool {
        self.metadata.response_types.contains(&response_type)
    }

    /// Whether the redirect URI is registered. Comparison is exact.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.metadata.redirect_uris.iter().any(|r| r == uri)
    }

    /// Whether every requested scope is covered by a server scope the
    /// client registered.
    #[must_use]
    pub fn are_scopes_allowed(&self, server_scopes: &[Scope], requested: &str) -> bool {
        let registered = split_scopes(&self.metadata.scopes);
        split_scopes(requested).iter().all(|req| {
            server_scopes
                .iter()
                .any(|scope| registered.contains(&scope.id()) && scope.matches(req))
        })
    }

    /// The client's public JWKS document: the inline one, or the content of
    /// `jwks_uri` fetched once per instance and cached on the record.
    pub async fn public_jwks(&self, http: &reqwest::Client) -> Result<Value, Error> {
        if let Some(jwks) = &self.metadata.public_jwks {
            return Ok(jwks.clone());
        }

        if let Ok(cache) = self.jwks_cache.read() {
            if let Some(jwks) = cache.as_ref() {
                return Ok(jwks.clone());
            }
        }

        let Some(uri) = &self.metadata.jwks_uri else {
            return Err(Error::new(
                ErrorCode::InvalidClient,
                "the client has no JWKS",
            ));
        };

        tracing::debug!(client_id = %self.id, %uri, "fetching client JWKS");
        let document: Value = http
            .get(uri)
            .send()
            .await
            .map_err(Error::internal)?
            .error_for_status()
            .map_err(Error::internal)?
            .json()
            .await
            .map_err(Error::internal)?;

        if let Ok(mut cache) = self.jwks_cache.write() {
            *cache = Some(document.clone());
        }
        Ok(document)
    }

    /// The client key with the given id.
    pub async fn jwk_by_kid(&self, http: &reqwest::Client, kid: &str) -> Result<Jwk, Error> {
        let jwks = self.public_jwks(http).await?;
        keys_of(&jwks)
            .into_iter()
            .find(|k| k.key_id() == Some(kid))
            .ok_or_else(|| {
                Error::new(
                    ErrorCode::InvalidClient,
                    format!("no client JWK matches kid {kid}"),
                )
            })
    }

    /// The first client key with the given algorithm.
    pub async fn jwk_by_alg(&self, http: &reqwest::Client, alg: &str) -> Result<Jwk, Error> {
        let jwks = self.public_jwks(http).await?;
        keys_of(&jwks)
            .into_iter()
            .find(|k| k.algorithm() == Some(alg))
            .ok_or_else(|| {
                Error::new(
                    ErrorCode::InvalidClient,
                    format!("no client JWK matches alg {alg}"),
                )
            })
    }

    /// The first client key usable for encryption with the given key
    /// management algorithm.
    pub async fn encryption_jwk(&self, http: &reqwest::Client, alg: KeyEncAlg) -> Result<Jwk, Error> {
        let jwks = self.public_jwks(http).await?;
        keys_of(&jwks)
            .into_iter()
            .find(|k| {
                k.algorithm() == Some(alg.as_str())
                    || (k.algorithm().is_none() && k.key_use() == Some("enc"))
            })
            .ok_or_else(|| {
                Error::new(
                    ErrorCode::InvalidClient,
                    format!("no client JWK usable for {}", alg.as_str()),
                )
            })
    }
}

/// Parses the keys of a JWKS document, skipping malformed members.
pub(crate) fn keys_of(document: &Value) -> Vec<Jwk> {
    document
        .get("keys")
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(Value::as_object)
                .filter_map(|map| Jwk::from_map(map.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// RFC 7591 client metadata, with the OpenID Connect registration members
/// this engine understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMetadata {
    /// `client_name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// `redirect_uris`.
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    /// `grant_types`.
    #[serde(default = "default_grant_types")]
    pub grant_types: Vec<GrantType>,
    /// `response_types`.
    #[serde(default = "default_response_types")]
    pub response_types: Vec<ResponseType>,
    /// `scope`, space-delimited.
    #[serde(rename = "scope", default)]
    pub scopes: String,
    /// `jwks`, the inline public key set.
    #[serde(rename = "jwks", skip_serializing_if = "Option::is_none")]
    pub public_jwks: Option<Value>,
    /// `jwks_uri`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    /// `token_endpoint_auth_method`.
    #[serde(rename = "token_endpoint_auth_method", default = "default_authn_method")]
    pub authn_method: ClientAuthnMethod,
    /// `token_endpoint_auth_signing_alg`.
    #[serde(
        rename = "token_endpoint_auth_signing_alg",
        skip_serializing_if = "Option::is_none"
    )]
    pub authn_sig_alg: Option<SigAlg>,
    /// `id_token_signed_response_alg`.
    #[serde(
        rename = "id_token_signed_response_alg",
        skip_serializing_if = "Option::is_none"
    )]
    pub id_token_sig_alg: Option<SigAlg>,
    /// `id_token_encrypted_response_alg`.
    #[serde(
        rename = "id_token_encrypted_response_alg",
        skip_serializing_if = "Option::is_none"
    )]
    pub id_token_key_enc_alg: Option<KeyEncAlg>,
    /// `id_token_encrypted_response_enc`.
    #[serde(
        rename = "id_token_encrypted_response_enc",
        skip_serializing_if = "Option::is_none"
    )]
    pub id_token_content_enc_alg: Option<ContentEncAlg>,
    /// `userinfo_signed_response_alg`.
    #[serde(
        rename = "userinfo_signed_response_alg",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_info_sig_alg: Option<SigAlg>,
    /// `userinfo_encrypted_response_alg`.
    #[serde(
        rename = "userinfo_encrypted_response_alg",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_info_key_enc_alg: Option<KeyEncAlg>,
    /// `userinfo_encrypted_response_enc`.
    #[serde(
        rename = "userinfo_encrypted_response_enc",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_info_content_enc_alg: Option<ContentEncAlg>,
    /// `authorization_signed_response_alg` (JARM).
    #[serde(
        rename = "authorization_signed_response_alg",
        skip_serializing_if = "Option::is_none"
    )]
    pub jarm_sig_alg: Option<SigAlg>,
    /// `authorization_encrypted_response_alg` (JARM).
    #[serde(
        rename = "authorization_encrypted_response_alg",
        skip_serializing_if = "Option::is_none"
    )]
    pub jarm_key_enc_alg: Option<KeyEncAlg>,
    /// `authorization_encrypted_response_enc` (JARM).
    #[serde(
        rename = "authorization_encrypted_response_enc",
        skip_serializing_if = "Option::is_none"
    )]
    pub jarm_content_enc_alg: Option<ContentEncAlg>,
    /// `request_object_signing_alg` (JAR).
    #[serde(
        rename = "request_object_signing_alg",
        skip_serializing_if = "Option::is_none"
    )]
    pub jar_sig_alg: Option<SigAlg>,
    /// `request_object_encryption_alg` (JAR).
    #[serde(
        rename = "request_object_encryption_alg",
        skip_serializing_if = "Option::is_none"
    )]
    pub jar_key_enc_alg: Option<KeyEncAlg>,
    /// `request_object_encryption_enc` (JAR).
    #[serde(
        rename = "request_object_encryption_enc",
        skip_serializing_if = "Option::is_none"
    )]
    pub jar_content_enc_alg: Option<ContentEncAlg>,
    /// `tls_client_auth_subject_dn`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_client_auth_subject_dn: Option<String>,
    /// `tls_client_auth_san_dns`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_client_auth_san_dns: Option<String>,
    /// `tls_client_auth_san_ip`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_client_auth_san_ip: Option<String>,
    /// `authorization_details_types`, RFC 9396.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_detail_types: Option<Vec<String>>,
    /// `require_pushed_authorization_requests`.
    #[serde(rename = "require_pushed_authorization_requests", default)]
    pub require_par: bool,
    /// `require_auth_time`.
    #[serde(default)]
    pub require_auth_time: bool,
    /// `default_max_age`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_max_age: Option<i64>,
    /// `subject_type`.
    #[serde(rename = "subject_type", skip_serializing_if = "Option::is_none")]
    pub subject_identifier_type: Option<SubjectIdentifierType>,
}

impl Default for ClientMetadata {
    fn default() -> Self {
        Self {
            client_name: None,
            redirect_uris: Vec::new(),
            grant_types: default_grant_types(),
            response_types: default_response_types(),
            scopes: String::new(),
            public_jwks: None,
            jwks_uri: None,
            authn_method: default_authn_method(),
            authn_sig_alg: None,
            id_token_sig_alg: None,
            id_token_key_enc_alg: None,
            id_token_content_enc_alg: None,
            user_info_sig_alg: None,
            user_info_key_enc_alg: None,
            user_info_content_enc_alg: None,
            jarm_sig_alg: None,
            jarm_key_enc_alg: None,
            jarm_content_enc_alg: None,
            jar_sig_alg: None,
            jar_key_enc_alg: None,
            jar_content_enc_alg: None,
            tls_client_auth_subject_dn: None,
            tls_client_auth_san_dns: None,
            tls_client_auth_san_ip: None,
            authorization_detail_types: None,
            require_par: false,
            require_auth_time: false,
            default_max_age: None,
            subject_identifier_type: None,
        }
    }
}

fn default_grant_types() -> Vec<GrantType> {
    vec![GrantType::AuthorizationCode]
}

fn default_response_types() -> Vec<ResponseType> {
    vec![ResponseType::Code]
}

fn default_authn_method() -> ClientAuthnMethod {
    ClientAuthnMethod::SecretBasic
}

mod serde_secret {
    use secrecy::{ExposeSecret, SecretString};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<SecretString>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(secret) => serializer.serialize_some(secret.expose_secret()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<SecretString>, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_wire_names() {
        let metadata: ClientMetadata = serde_json::from_value(serde_json::json!({
            "redirect_uris": ["https://c1/cb"],
            "grant_types": ["authorization_code", "refresh_token"],
            "response_types": ["code"],
            "scope": "openid profile",
            "token_endpoint_auth_method": "private_key_jwt",
            "id_token_signed_response_alg": "ES256",
            "authorization_signed_response_alg": "RS256",
            "require_pushed_authorization_requests": true,
        }))
        .unwrap();

        assert_eq!(metadata.redirect_uris, vec!["https://c1/cb"]);
        assert_eq!(metadata.authn_method, ClientAuthnMethod::PrivateKeyJwt);
        assert_eq!(metadata.id_token_sig_alg, Some(SigAlg::ES256));
        assert_eq!(metadata.jarm_sig_alg, Some(SigAlg::RS256));
        assert!(metadata.require_par);
        assert!(metadata.grant_types.contains(&GrantType::RefreshToken));
    }

    #[test]
    fn test_metadata_defaults() {
        let metadata: ClientMetadata = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(metadata.grant_types, vec![GrantType::AuthorizationCode]);
        assert_eq!(metadata.response_types, vec![ResponseType::Code]);
        assert_eq!(metadata.authn_method, ClientAuthnMethod::SecretBasic);
    }

    #[test]
    fn test_scope_checks() {
        let server_scopes = vec![
            Scope::new("openid"),
            Scope::new("profile"),
            Scope::dynamic("payment", |s| s.starts_with("payment:")),
        ];
        let client = Client::new(
            "c1",
            ClientMetadata {
                scopes: "openid payment".into(),
                ..Default::default()
            },
        );

        assert!(client.are_scopes_allowed(&server_scopes, "openid"));
        assert!(client.are_scopes_allowed(&server_scopes, "openid payment:30"));
        // profile is a server scope but the client did not register it.
        assert!(!client.are_scopes_allowed(&server_scopes, "openid profile"));
        assert!(!client.are_scopes_allowed(&server_scopes, "unknown"));
    }

    #[test]
    fn test_redirect_uri_is_exact() {
        let client = Client::new(
            "c1",
            ClientMetadata {
                redirect_uris: vec!["https://c1/cb".into()],
                ..Default::default()
            },
        );
        assert!(client.is_redirect_uri_allowed("https://c1/cb"));
        assert!(!client.is_redirect_uri_allowed("https://c1/cb/"));
        assert!(!client.is_redirect_uri_allowed("https://c1/cb?x=1"));
    }

    #[test]
    fn test_inline_jwks_takes_priority() {
        let client = Client::new(
            "c1",
            ClientMetadata {
                public_jwks: Some(serde_json::json!({"keys": []})),
                jwks_uri: Some("https://c1/jwks".into()),
                ..Default::default()
            },
        );
        let http = reqwest::Client::new();
        let jwks = futures_executor(client.public_jwks(&http));
        assert_eq!(jwks.unwrap(), serde_json::json!({"keys": []}));
    }

    fn futures_executor<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }
}
