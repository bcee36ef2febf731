//! Core OAuth 2.0 / OpenID Connect protocol vocabulary.
//!
//! Wire-level enums and small value types shared by every component. Each
//! enum serializes to its registered protocol string.

mod grant;
mod params;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use grant::{GrantInfo, TokenConfirmation, TokenOptions};
pub use params::{AuthorizationParameters, ClaimRule, ClaimsObject, Resources};

/// Server hardening profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Profile {
    /// Standard OpenID Connect.
    #[serde(rename = "openid")]
    OpenId,
    /// FAPI 2.0 security profile.
    #[serde(rename = "fapi2")]
    Fapi2,
}

/// OAuth 2.0 grant types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantType {
    /// RFC 6749 §4.4.
    #[serde(rename = "client_credentials")]
    ClientCredentials,
    /// RFC 6749 §4.1.
    #[serde(rename = "authorization_code")]
    AuthorizationCode,
    /// RFC 6749 §6.
    #[serde(rename = "refresh_token")]
    RefreshToken,
    /// RFC 6749 §4.2.
    #[serde(rename = "implicit")]
    Implicit,
    /// Not an issuance grant. A client carrying it may introspect tokens.
    #[serde(rename = "urn:heimdallr:oauth2:grant_type:token_introspection")]
    Introspection,
}

impl GrantType {
    /// The wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientCredentials => "client_credentials",
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::Implicit => "implicit",
            Self::Introspection => "urn:heimdallr:oauth2:grant_type:token_introspection",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "client_credentials" => Some(Self::ClientCredentials),
            "authorization_code" => Some(Self::AuthorizationCode),
            "refresh_token" => Some(Self::RefreshToken),
            "implicit" => Some(Self::Implicit),
            "urn:heimdallr:oauth2:grant_type:token_introspection" => Some(Self::Introspection),
            _ => None,
        }
    }
}

/// Response type combinations per OAuth 2.0 Multiple Response Types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseType {
    /// `code`
    #[serde(rename = "code")]
    Code,
    /// `id_token`
    #[serde(rename = "id_token")]
    IdToken,
    /// `token`
    #[serde(rename = "token")]
    Token,
    /// `code id_token`
    #[serde(rename = "code id_token")]
    CodeIdToken,
    /// `code token`
    #[serde(rename = "code token")]
    CodeToken,
    /// `id_token token`
    #[serde(rename = "id_token token")]
    IdTokenToken,
    /// `code id_token token`
    #[serde(rename = "code id_token token")]
    CodeIdTokenToken,
}

impl ResponseType {
    /// The wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::IdToken => "id_token",
            Self::Token => "token",
            Self::CodeIdToken => "code id_token",
            Self::CodeToken => "code token",
            Self::IdTokenToken => "id_token token",
            Self::CodeIdTokenToken => "code id_token token",
        }
    }

    /// Parses a space-delimited response type. Member order is not
    /// significant.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let mut code = false;
        let mut id_token = false;
        let mut token = false;
        for part in value.split_ascii_whitespace() {
            match part {
                "code" if !code => code = true,
                "id_token" if !id_token => id_token = true,
                "token" if !token => token = true,
                _ => return None,
            }
        }
        match (code, id_token, token) {
            (true, false, false) => Some(Self::Code),
            (false, true, false) => Some(Self::IdToken),
            (false, false, true) => Some(Self::Token),
            (true, true, false) => Some(Self::CodeIdToken),
            (true, false, true) => Some(Self::CodeToken),
            (false, true, true) => Some(Self::IdTokenToken),
            (true, true, true) => Some(Self::CodeIdTokenToken),
            (false, false, false) => None,
        }
    }

    /// Whether the combination includes `code`.
    #[must_use]
    pub fn contains_code(self) -> bool {
        matches!(
            self,
            Self::Code | Self::CodeIdToken | Self::CodeToken | Self::CodeIdTokenToken
        )
    }

    /// Whether the combination includes `id_token`.
    #[must_use]
    pub fn contains_id_token(self) -> bool {
        matches!(
            self,
            Self::IdToken | Self::CodeIdToken | Self::IdTokenToken | Self::CodeIdTokenToken
        )
    }

    /// Whether the combination includes `token`.
    #[must_use]
    pub fn contains_token(self) -> bool {
        matches!(
            self,
            Self::Token | Self::CodeToken | Self::IdTokenToken | Self::CodeIdTokenToken
        )
    }

    /// Whether any part of the combination is issued straight from the
    /// authorization endpoint.
    #[must_use]
    pub fn is_implicit(self) -> bool {
        self.contains_id_token() || self.contains_token()
    }

    /// The default response mode for this combination, per "Definitions of
    /// Multiple-Valued Response Type Combinations".
    #[must_use]
    pub fn default_response_mode(self, jarm: bool) -> ResponseMode {
        match (self.is_implicit(), jarm) {
            (true, true) => ResponseMode::FragmentJwt,
            (true, false) => ResponseMode::Fragment,
            (false, true) => ResponseMode::QueryJwt,
            (false, false) => ResponseMode::Query,
        }
    }
}

/// Authorization response modes, including the JARM variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseMode {
    /// Parameters in the redirect query component.
    #[serde(rename = "query")]
    Query,
    /// Parameters in the redirect fragment component.
    #[serde(rename = "fragment")]
    Fragment,
    /// Parameters posted from an auto-submitting HTML form.
    #[serde(rename = "form_post")]
    FormPost,
    /// JARM response in the query component.
    #[serde(rename = "query.jwt")]
    QueryJwt,
    /// JARM response in the fragment component.
    #[serde(rename = "fragment.jwt")]
    FragmentJwt,
    /// JARM response posted from an HTML form.
    #[serde(rename = "form_post.jwt")]
    FormPostJwt,
    /// JARM response; the carrier follows the response type default.
    #[serde(rename = "jwt")]
    Jwt,
}

impl ResponseMode {
    /// The wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Fragment => "fragment",
            Self::FormPost => "form_post",
            Self::QueryJwt => "query.jwt",
            Self::FragmentJwt => "fragment.jwt",
            Self::FormPostJwt => "form_post.jwt",
            Self::Jwt => "jwt",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "query" => Some(Self::Query),
            "fragment" => Some(Self::Fragment),
            "form_post" => Some(Self::FormPost),
            "query.jwt" => Some(Self::QueryJwt),
            "fragment.jwt" => Some(Self::FragmentJwt),
            "form_post.jwt" => Some(Self::FormPostJwt),
            "jwt" => Some(Self::Jwt),
            _ => None,
        }
    }

    /// Whether the response is wrapped in a JARM JWT.
    #[must_use]
    pub fn is_jarm(self) -> bool {
        matches!(
            self,
            Self::QueryJwt | Self::FragmentJwt | Self::FormPostJwt | Self::Jwt
        )
    }

    /// Whether the carrier is the query component.
    #[must_use]
    pub fn is_query(self) -> bool {
        matches!(self, Self::Query | Self::QueryJwt)
    }

    /// Whether the carrier is an auto-submitting form.
    #[must_use]
    pub fn is_form_post(self) -> bool {
        matches!(self, Self::FormPost | Self::FormPostJwt)
    }
}

/// PKCE code challenge methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    /// `BASE64URL(SHA256(verifier))`.
    #[serde(rename = "S256")]
    S256,
    /// The verifier itself. Discouraged.
    #[serde(rename = "plain")]
    Plain,
}

/// Client authentication methods at token-issuing endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientAuthnMethod {
    /// Public client, identified but not authenticated.
    #[serde(rename = "none")]
    None,
    /// Shared secret via HTTP Basic.
    #[serde(rename = "client_secret_basic")]
    SecretBasic,
    /// Shared secret in the form body.
    #[serde(rename = "client_secret_post")]
    SecretPost,
    /// HMAC assertion keyed with the client secret.
    #[serde(rename = "client_secret_jwt")]
    SecretJwt,
    /// Asymmetric assertion verified against the client JWKS.
    #[serde(rename = "private_key_jwt")]
    PrivateKeyJwt,
    /// PKI mutual TLS, matched on certificate subject identifiers.
    #[serde(rename = "tls_client_auth")]
    Tls,
    /// Self-signed certificate matched against the client JWKS.
    #[serde(rename = "self_signed_tls_client_auth")]
    SelfSignedTls,
}

impl ClientAuthnMethod {
    /// The wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SecretBasic => "client_secret_basic",
            Self::SecretPost => "client_secret_post",
            Self::SecretJwt => "client_secret_jwt",
            Self::PrivateKeyJwt => "private_key_jwt",
            Self::Tls => "tls_client_auth",
            Self::SelfSignedTls => "self_signed_tls_client_auth",
        }
    }
}

/// The assertion type accepted for JWT client authentication.
pub const ASSERTION_TYPE_JWT_BEARER: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Access token presentation schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    /// RFC 6750 bearer token.
    Bearer,
    /// DPoP-bound token, RFC 9449.
    DPoP,
}

/// Access token representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenFormat {
    /// Self-contained signed JWT.
    #[serde(rename = "jwt")]
    Jwt,
    /// Random string resolved through the grant store.
    #[serde(rename = "opaque")]
    Opaque,
}

/// Hints accepted by the introspection endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenTypeHint {
    /// The value is an access token.
    #[serde(rename = "access_token")]
    AccessToken,
    /// The value is a refresh token.
    #[serde(rename = "refresh_token")]
    RefreshToken,
}

/// How subject identifiers are minted for clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectIdentifierType {
    /// Every client sees the same subject value.
    #[serde(rename = "public")]
    Public,
}

/// OpenID Connect `prompt` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    /// No interactive prompt may be shown.
    None,
    /// Force reauthentication.
    Login,
    /// Force a consent prompt.
    Consent,
    /// Force account selection.
    SelectAccount,
}

/// OpenID Connect `display` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayValue {
    /// Full page.
    Page,
    /// Popup window.
    Popup,
    /// Touch device.
    Touch,
    /// Feature phone.
    Wap,
}

/// Claim type values advertised in discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    /// Claims returned directly.
    Normal,
    /// Claims aggregated from another provider.
    Aggregated,
    /// Claims referenced at another provider.
    Distributed,
}

/// Standard claim names used across tokens.
pub mod claims {
    /// `jti`
    pub const TOKEN_ID: &str = "jti";
    /// `iss`
    pub const ISSUER: &str = "iss";
    /// `sub`
    pub const SUBJECT: &str = "sub";
    /// `aud`
    pub const AUDIENCE: &str = "aud";
    /// `client_id`
    pub const CLIENT_ID: &str = "client_id";
    /// `exp`
    pub const EXPIRY: &str = "exp";
    /// `iat`
    pub const ISSUED_AT: &str = "iat";
    /// `scope`
    pub const SCOPE: &str = "scope";
    /// `nonce`
    pub const NONCE: &str = "nonce";
    /// `auth_time`
    pub const AUTH_TIME: &str = "auth_time";
    /// `amr`
    pub const AMR: &str = "amr";
    /// `acr`
    pub const ACR: &str = "acr";
    /// `authorization_details`
    pub const AUTHORIZATION_DETAILS: &str = "authorization_details";
    /// `at_hash`
    pub const ACCESS_TOKEN_HASH: &str = "at_hash";
    /// `c_hash`
    pub const CODE_HASH: &str = "c_hash";
    /// `s_hash`
    pub const STATE_HASH: &str = "s_hash";
    /// `cnf`
    pub const CONFIRMATION: &str = "cnf";
}

/// A scope the server is willing to grant.
///
/// Plain scopes match by string equality. Dynamic scopes carry a matcher so
/// parameterized values (say `payment:30`) can be accepted under one
/// published identifier.
#[derive(Clone)]
pub struct Scope {
    id: String,
    matcher: Option<Arc<dyn Fn(&str) -> bool + Send + Sync>>,
}

impl Scope {
    /// A scope matched by exact string comparison.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            matcher: None,
        }
    }

    /// A scope with custom matching logic.
    ///
    /// ```
    /// use heimdallr::oauth::Scope;
    ///
    /// let payment = Scope::dynamic("payment", |requested| requested.starts_with("payment:"));
    /// assert!(payment.matches("payment:30"));
    /// ```
    pub fn dynamic(
        id: impl Into<String>,
        matcher: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            matcher: Some(Arc::new(matcher)),
        }
    }

    /// The published identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether a requested scope value matches this scope.
    #[must_use]
    pub fn matches(&self, requested: &str) -> bool {
        match &self.matcher {
            Some(matcher) => matcher(requested),
            None => self.id == requested,
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("dynamic", &self.matcher.is_some())
            .finish()
    }
}

/// The `openid` scope identifier.
pub const SCOPE_OPENID: &str = "openid";
/// The `offline_access` scope identifier.
pub const SCOPE_OFFLINE_ACCESS: &str = "offline_access";

/// Splits a space-delimited scope string, dropping empty members.
#[must_use]
pub fn split_scopes(scopes: &str) -> Vec<&str> {
    scopes.split_ascii_whitespace().collect()
}

/// Whether `openid` appears in a space-delimited scope string.
#[must_use]
pub fn scopes_contain_openid(scopes: &str) -> bool {
    split_scopes(scopes).contains(&SCOPE_OPENID)
}

/// Whether `offline_access` appears in a space-delimited scope string.
#[must_use]
pub fn scopes_contain_offline_access(scopes: &str) -> bool {
    split_scopes(scopes).contains(&SCOPE_OFFLINE_ACCESS)
}

/// Whether every member of `subset` appears in `superset`, both
/// space-delimited.
#[must_use]
pub fn contains_all_scopes(superset: &str, subset: &str) -> bool {
    let superset = split_scopes(superset);
    split_scopes(subset).iter().all(|s| superset.contains(s))
}

/// A rich authorization request detail, RFC 9396.
///
/// Kept as a raw object because its members vary by use case. The well known
/// members are reachable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationDetail(pub serde_json::Map<String, serde_json::Value>);

impl AuthorizationDetail {
    /// The mandatory `type` member.
    #[must_use]
    pub fn detail_type(&self) -> Option<&str> {
        self.string("type")
    }

    /// The `identifier` member.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        self.string("identifier")
    }

    /// The `locations` member.
    #[must_use]
    pub fn locations(&self) -> Vec<&str> {
        self.string_list("locations")
    }

    /// The `actions` member.
    #[must_use]
    pub fn actions(&self) -> Vec<&str> {
        self.string_list("actions")
    }

    /// The `datatypes` member.
    #[must_use]
    pub fn datatypes(&self) -> Vec<&str> {
        self.string_list("datatypes")
    }

    fn string(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(serde_json::Value::as_str)
    }

    fn string_list(&self, key: &str) -> Vec<&str> {
        self.0
            .get(key)
            .and_then(serde_json::Value::as_array)
            .map(|values| values.iter().filter_map(serde_json::Value::as_str).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_type_parse_order_insensitive() {
        assert_eq!(ResponseType::parse("code"), Some(ResponseType::Code));
        assert_eq!(
            ResponseType::parse("code id_token"),
            Some(ResponseType::CodeIdToken)
        );
        assert_eq!(
            ResponseType::parse("id_token code"),
            Some(ResponseType::CodeIdToken)
        );
        assert_eq!(
            ResponseType::parse("token id_token code"),
            Some(ResponseType::CodeIdTokenToken)
        );
        assert_eq!(ResponseType::parse(""), None);
        assert_eq!(ResponseType::parse("code code"), None);
        assert_eq!(ResponseType::parse("code unknown"), None);
    }

    #[test]
    fn test_default_response_mode() {
        assert_eq!(
            ResponseType::Code.default_response_mode(false),
            ResponseMode::Query
        );
        assert_eq!(
            ResponseType::Code.default_response_mode(true),
            ResponseMode::QueryJwt
        );
        assert_eq!(
            ResponseType::IdTokenToken.default_response_mode(false),
            ResponseMode::Fragment
        );
        assert_eq!(
            ResponseType::CodeIdToken.default_response_mode(true),
            ResponseMode::FragmentJwt
        );
    }

    #[test]
    fn test_dynamic_scope() {
        let payment = Scope::dynamic("payment", |requested| requested.starts_with("payment:"));
        assert!(payment.matches("payment:30"));
        assert!(!payment.matches("openid"));

        let openid = Scope::new("openid");
        assert!(openid.matches("openid"));
        assert!(!openid.matches("openid2"));
    }

    #[test]
    fn test_scope_helpers() {
        assert!(scopes_contain_openid("openid profile"));
        assert!(!scopes_contain_openid("profile email"));
        assert!(contains_all_scopes("openid email profile", "openid email"));
        assert!(!contains_all_scopes("openid email", "openid payments"));
        assert!(contains_all_scopes("openid", ""));
    }

    #[test]
    fn test_authorization_detail_accessors() {
        let detail: AuthorizationDetail = serde_json::from_value(serde_json::json!({
            "type": "payment_initiation",
            "locations": ["https://bank.example.com"],
            "actions": ["initiate"],
        }))
        .unwrap();
        assert_eq!(detail.detail_type(), Some("payment_initiation"));
        assert_eq!(detail.locations(), vec!["https://bank.example.com"]);
        assert_eq!(detail.actions(), vec!["initiate"]);
        assert!(detail.datatypes().is_empty());
    }

    #[test]
    fn test_grant_type_wire_names() {
        assert_eq!(
            serde_json::to_value(GrantType::AuthorizationCode).unwrap(),
            "authorization_code"
        );
        assert_eq!(
            GrantType::parse("urn:heimdallr:oauth2:grant_type:token_introspection"),
            Some(GrantType::Introspection)
        );
    }
}
