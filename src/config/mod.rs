//! Server configuration.
//!
//! A [`Configuration`] is assembled once by the host, validated, and then
//! treated as immutable while serving. It carries the protocol feature
//! switches, lifetimes and algorithm lists, the key ring, the stores, the
//! authentication policies and the host hooks.

mod context;
pub(crate) mod validation;

use std::sync::Arc;

use bon::Builder;
use josekit::jwk::Jwk;

pub(crate) use context::Context;
pub use validation::ConfigurationError;

use crate::client::Client;
use crate::error::Error;
use crate::hooks::{DefaultHooks, Hooks};
use crate::jose::{ContentEncAlg, KeyEncAlg, SigAlg};
use crate::keys::{KeyRing, KeyUse};
use crate::material;
use crate::oauth::{
    ClaimType, ClientAuthnMethod, CodeChallengeMethod, DisplayValue, GrantType, Profile,
    ResponseMode, ResponseType, Scope, SubjectIdentifierType, TokenOptions,
};
use crate::policy::AuthnPolicy;
use crate::storage::{AuthnSessionStore, ClientStore, GrantSessionStore};

/// Everything the engine needs to serve one issuer.
///
/// Multiple configurations may coexist in one process; nothing here is
/// global.
#[derive(Builder)]
#[builder(on(String, into))]
pub struct Configuration {
    /// The hardening profile. Drives extra validation at boot.
    #[builder(default = Profile::OpenId)]
    pub profile: Profile,
    /// The issuer, `https://` scheme included.
    pub host: String,
    /// The issuer alias served over mutual TLS, when enabled.
    pub mtls_host: Option<String>,
    /// Prefix prepended to every endpoint path.
    #[builder(default)]
    pub endpoint_prefix: String,

    /// Client persistence.
    pub clients: Arc<dyn ClientStore>,
    /// Authentication session persistence.
    pub authn_sessions: Arc<dyn AuthnSessionStore>,
    /// Grant session persistence.
    pub grant_sessions: Arc<dyn GrantSessionStore>,
    /// Clients declared in configuration, resolved before the store.
    #[builder(default)]
    pub static_clients: Vec<Client>,
    /// User authentication policies, probed in declaration order.
    #[builder(default)]
    pub policies: Vec<Arc<dyn AuthnPolicy>>,
    /// Host extension points.
    #[builder(default = Arc::new(DefaultHooks))]
    pub hooks: Arc<dyn Hooks>,
    /// Outbound HTTP client, used to fetch client JWKS documents.
    #[builder(default = reqwest::Client::new())]
    pub http_client: reqwest::Client,

    /// The server's private keys.
    pub key_ring: KeyRing,
    /// Key id used to sign access tokens unless overridden per grant.
    pub default_token_sig_key_id: String,
    /// Key id used to sign ID tokens and userinfo responses by default.
    pub default_user_sig_key_id: String,
    /// Additional user-facing signing keys clients may select by algorithm.
    /// At most one key per algorithm.
    #[builder(default)]
    pub user_sig_key_ids: Vec<String>,

    /// Scopes the server can grant.
    #[builder(default = vec![Scope::new(crate::oauth::SCOPE_OPENID)])]
    pub scopes: Vec<Scope>,
    /// Whether every authorization request must carry `openid`.
    #[builder(default)]
    pub open_id_scope_required: bool,
    /// Claims advertised in discovery.
    #[builder(default)]
    pub user_claims: Vec<String>,
    /// Claim types advertised in discovery.
    #[builder(default = vec![ClaimType::Normal])]
    pub claim_types: Vec<ClaimType>,
    /// Authentication context class references advertised in discovery.
    #[builder(default)]
    pub acr_values: Vec<String>,
    /// Display values accepted at the authorization endpoint.
    #[builder(default)]
    pub display_values: Vec<DisplayValue>,

    /// Grant types the server serves.
    #[builder(default = vec![GrantType::AuthorizationCode])]
    pub grant_types: Vec<GrantType>,
    /// Response types the server serves.
    #[builder(default = vec![ResponseType::Code])]
    pub response_types: Vec<ResponseType>,
    /// Response modes the server serves.
    #[builder(default = vec![
        ResponseMode::Query,
        ResponseMode::Fragment,
        ResponseMode::FormPost,
    ])]
    pub response_modes: Vec<ResponseMode>,
    /// Subject identifier types supported.
    #[builder(default = vec![SubjectIdentifierType::Public])]
    pub subject_identifier_types: Vec<SubjectIdentifierType>,

    /// Client authentication methods accepted at token-issuing endpoints.
    #[builder(default)]
    pub client_authn_methods: Vec<ClientAuthnMethod>,
    /// Signature algorithms accepted for `private_key_jwt` assertions.
    #[builder(default = vec![SigAlg::RS256, SigAlg::PS256, SigAlg::ES256])]
    pub private_key_jwt_sig_algs: Vec<SigAlg>,
    /// Signature algorithms accepted for `client_secret_jwt` assertions.
    #[builder(default = vec![SigAlg::HS256])]
    pub client_secret_jwt_sig_algs: Vec<SigAlg>,
    /// Longest acceptable distance between assertion `iat` and `exp`.
    #[builder(default = 600)]
    pub assertion_lifetime_secs: i64,

    /// ID token lifetime.
    #[builder(default = material::DEFAULT_ID_TOKEN_LIFETIME_SECS)]
    pub id_token_lifetime_secs: i64,
    /// Whether ID token and userinfo encryption is offered.
    #[builder(default)]
    pub user_info_encryption_enabled: bool,
    /// Key management algorithms offered for user-facing encryption.
    #[builder(default)]
    pub user_info_key_enc_algs: Vec<KeyEncAlg>,
    /// Content encryption algorithms offered for user-facing encryption.
    #[builder(default = vec![ContentEncAlg::A128CbcHs256])]
    pub user_info_content_enc_algs: Vec<ContentEncAlg>,

    /// Whether refresh tokens rotate on use.
    #[builder(default)]
    pub refresh_rotation_enabled: bool,
    /// Refresh token lifetime.
    #[builder(default = material::DEFAULT_REFRESH_TOKEN_LIFETIME_SECS)]
    pub refresh_token_lifetime_secs: i64,

    /// Whether redirects carry the `iss` parameter.
    #[builder(default)]
    pub issuer_response_param_enabled: bool,
    /// Whether the `claims` request parameter is accepted.
    #[builder(default)]
    pub claims_param_enabled: bool,
    /// Whether `authorization_details` is accepted.
    #[builder(default)]
    pub auth_details_enabled: bool,
    /// Authorization detail types the server understands.
    #[builder(default)]
    pub auth_detail_types: Vec<String>,

    /// Whether JARM response modes are offered.
    #[builder(default)]
    pub jarm_enabled: bool,
    /// Key id signing JARM responses by default.
    pub jarm_default_sig_key_id: Option<String>,
    /// Additional JARM signing keys clients may select by algorithm.
    #[builder(default)]
    pub jarm_sig_key_ids: Vec<String>,
    /// JARM response lifetime.
    #[builder(default = 600)]
    pub jarm_lifetime_secs: i64,
    /// Whether JARM responses may be encrypted to the client.
    #[builder(default)]
    pub jarm_encryption_enabled: bool,
    /// Key management algorithms offered for JARM encryption.
    #[builder(default)]
    pub jarm_key_enc_algs: Vec<KeyEncAlg>,
    /// Content encryption algorithms offered for JARM encryption.
    #[builder(default = vec![ContentEncAlg::A128CbcHs256])]
    pub jarm_content_enc_algs: Vec<ContentEncAlg>,

    /// Whether JAR request objects are accepted.
    #[builder(default)]
    pub jar_enabled: bool,
    /// Whether authorization requests must arrive as request objects.
    #[builder(default)]
    pub jar_required: bool,
    /// Signature algorithms accepted on request objects.
    #[builder(default)]
    pub jar_sig_algs: Vec<SigAlg>,
    /// Longest acceptable request object lifetime.
    #[builder(default = 600)]
    pub jar_lifetime_secs: i64,
    /// Whether encrypted request objects are accepted.
    #[builder(default)]
    pub jar_encryption_enabled: bool,
    /// Ids of the server keys clients may encrypt request objects to.
    #[builder(default)]
    pub jar_key_enc_kids: Vec<String>,
    /// Content encryption algorithms accepted on request objects.
    #[builder(default = vec![ContentEncAlg::A128CbcHs256])]
    pub jar_content_enc_algs: Vec<ContentEncAlg>,

    /// Whether the pushed authorization endpoint is served.
    #[builder(default)]
    pub par_enabled: bool,
    /// Whether authorization requests must be pushed.
    #[builder(default)]
    pub par_required: bool,
    /// Pushed request lifetime.
    #[builder(default = 60)]
    pub par_lifetime_secs: i64,

    /// Whether DPoP proofs are accepted.
    #[builder(default)]
    pub dpop_enabled: bool,
    /// Whether every token request must carry a DPoP proof.
    #[builder(default)]
    pub dpop_required: bool,
    /// Longest acceptable DPoP proof age.
    #[builder(default = 300)]
    pub dpop_lifetime_secs: i64,
    /// Signature algorithms accepted on DPoP proofs.
    #[builder(default = vec![SigAlg::ES256, SigAlg::RS256])]
    pub dpop_sig_algs: Vec<SigAlg>,

    /// Whether PKCE is offered.
    #[builder(default)]
    pub pkce_enabled: bool,
    /// Whether authorization code requests must carry a code challenge.
    #[builder(default)]
    pub pkce_required: bool,
    /// Code challenge methods accepted.
    #[builder(default = vec![CodeChallengeMethod::S256])]
    pub code_challenge_methods: Vec<CodeChallengeMethod>,

    /// Whether the introspection endpoint is served.
    #[builder(default)]
    pub introspection_enabled: bool,
    /// Client authentication methods accepted at introspection.
    #[builder(default)]
    pub introspection_authn_methods: Vec<ClientAuthnMethod>,

    /// Whether dynamic client registration is served.
    #[builder(default)]
    pub dcr_enabled: bool,
    /// Whether registration access tokens rotate on update.
    #[builder(default)]
    pub rotate_registration_tokens: bool,

    /// Lifetime of an in-flight authentication session.
    #[builder(default = material::DEFAULT_AUTHN_SESSION_TIMEOUT_SECS)]
    pub authn_session_timeout_secs: i64,

    /// Whether access tokens are bound to the mTLS client certificate.
    #[builder(default)]
    pub mtls_token_binding_enabled: bool,
    /// Whether every issued access token must be sender constrained.
    #[builder(default)]
    pub sender_constrained_required: bool,
}

impl Configuration {
    /// Runs the cross-feature invariant matrix. Serving a configuration
    /// that fails validation is unsupported.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validation::validate(self)
    }

    /// The issuer base URL with the endpoint prefix applied.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}{}", self.host, self.endpoint_prefix)
    }

    /// The mTLS base URL, when a mutual TLS host is configured.
    #[must_use]
    pub fn mtls_base_url(&self) -> Option<String> {
        self.mtls_host
            .as_ref()
            .map(|host| format!("{host}{}", self.endpoint_prefix))
    }

    /// The user-facing signing key ids, default first, deduplicated.
    #[must_use]
    pub fn effective_user_sig_key_ids(&self) -> Vec<&str> {
        let mut ids = vec![self.default_user_sig_key_id.as_str()];
        for id in &self.user_sig_key_ids {
            if !ids.contains(&id.as_str()) {
                ids.push(id);
            }
        }
        ids
    }

    /// The JARM signing key ids, default first, deduplicated.
    #[must_use]
    pub fn effective_jarm_sig_key_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        if let Some(default) = &self.jarm_default_sig_key_id {
            ids.push(default);
        }
        for id in &self.jarm_sig_key_ids {
            if !ids.contains(&id.as_str()) {
                ids.push(id);
            }
        }
        ids
    }

    /// All signature algorithms accepted on client assertions.
    #[must_use]
    pub fn client_assertion_sig_algs(&self) -> Vec<SigAlg> {
        let mut algs = self.private_key_jwt_sig_algs.clone();
        for alg in &self.client_secret_jwt_sig_algs {
            if !algs.contains(alg) {
                algs.push(*alg);
            }
        }
        algs
    }

    fn sig_algs_of_keys(&self, key_ids: &[&str]) -> Vec<SigAlg> {
        let mut algs = Vec::new();
        for kid in key_ids {
            let Some(alg) = self
                .key_ring
                .by_kid(kid)
                .and_then(crate::jose::signature_algorithm)
            else {
                continue;
            };
            if !algs.contains(&alg) {
                algs.push(alg);
            }
        }
        algs
    }

    /// Signature algorithms offered for ID tokens and userinfo responses.
    #[must_use]
    pub fn user_info_sig_algs(&self) -> Vec<SigAlg> {
        self.sig_algs_of_keys(&self.effective_user_sig_key_ids())
    }

    /// Signature algorithms offered for JARM responses.
    #[must_use]
    pub fn jarm_sig_algs(&self) -> Vec<SigAlg> {
        self.sig_algs_of_keys(&self.effective_jarm_sig_key_ids())
    }

    /// Key management algorithms accepted on encrypted request objects,
    /// derived from the configured decryption keys.
    #[must_use]
    pub fn jar_key_enc_algs(&self) -> Vec<KeyEncAlg> {
        let mut algs = Vec::new();
        for kid in &self.jar_key_enc_kids {
            let Some(alg) = self
                .key_ring
                .by_kid(kid)
                .and_then(|k| k.algorithm())
                .and_then(KeyEncAlg::parse)
            else {
                continue;
            };
            if !algs.contains(&alg) {
                algs.push(alg);
            }
        }
        algs
    }

    /// The key signing the next access token: the per-grant override when
    /// it names a signing key, the default otherwise.
    pub(crate) fn token_sig_key(&self, options: &TokenOptions) -> Result<&Jwk, Error> {
        if let Some(kid) = &options.jwt_signature_key_id {
            if let Some(key) = self.key_ring.by_kid(kid) {
                if key.key_use() == Some(KeyUse::Signature.as_str()) {
                    return Ok(key);
                }
            }
        }
        self.key_ring
            .by_kid(&self.default_token_sig_key_id)
            .ok_or_else(|| Error::internal("the default token signing key is missing"))
    }

    fn sig_key_by_alg_or_default<'a>(
        &'a self,
        preferred: Option<SigAlg>,
        default_kid: &str,
        key_ids: &[&str],
    ) -> Result<&'a Jwk, Error> {
        if let Some(alg) = preferred {
            for kid in key_ids {
                let Some(key) = self.key_ring.by_kid(kid) else {
                    continue;
                };
                if key.algorithm() == Some(alg.as_str()) {
                    return Ok(key);
                }
            }
        }
        self.key_ring
            .by_kid(default_kid)
            .ok_or_else(|| Error::internal("a configured signing key is missing"))
    }

    /// The key signing ID tokens for this client.
    pub(crate) fn id_token_sig_key_for(&self, client: &Client) -> Result<&Jwk, Error> {
        self.sig_key_by_alg_or_default(
            client.metadata.id_token_sig_alg,
            &self.default_user_sig_key_id,
            &self.effective_user_sig_key_ids(),
        )
    }

    /// The key signing userinfo responses for this client.
    pub(crate) fn user_info_sig_key_for(&self, client: &Client) -> Result<&Jwk, Error> {
        self.sig_key_by_alg_or_default(
            client.metadata.user_info_sig_alg,
            &self.default_user_sig_key_id,
            &self.effective_user_sig_key_ids(),
        )
    }

    /// The key signing JARM responses for this client.
    pub(crate) fn jarm_sig_key_for(&self, client: &Client) -> Result<&Jwk, Error> {
        let default_kid = self
            .jarm_default_sig_key_id
            .as_deref()
            .ok_or_else(|| Error::internal("JARM is enabled without a default signing key"))?;
        self.sig_key_by_alg_or_default(
            client.metadata.jarm_sig_alg,
            default_kid,
            &self.effective_jarm_sig_key_ids(),
        )
    }

    /// The policy with the given id.
    #[must_use]
    pub(crate) fn policy_by_id(&self, id: &str) -> Option<&Arc<dyn AuthnPolicy>> {
        self.policies.iter().find(|p| p.id() == id)
    }

    /// Whether the server advertises this response mode.
    #[must_use]
    pub(crate) fn is_response_mode_supported(&self, mode: ResponseMode) -> bool {
        self.response_modes.contains(&mode) || (mode.is_jarm() && self.jarm_enabled)
    }

    /// Whether any requested scope fails to match the server scope set.
    #[must_use]
    pub(crate) fn are_scopes_known(&self, requested: &str) -> bool {
        crate::oauth::split_scopes(requested)
            .iter()
            .all(|req| self.scopes.iter().any(|scope| scope.matches(req)))
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("host", &self.host)
            .field("profile", &self.profile)
            .field("grant_types", &self.grant_types)
            .field("response_types", &self.response_types)
            .field("client_authn_methods", &self.client_authn_methods)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::storage::memory::{
        InMemoryAuthnSessionStore, InMemoryClientStore, InMemoryGrantSessionStore,
    };

    /// A signing key for tests.
    pub(crate) fn ec_key(kid: &str, alg: &str, key_use: &str) -> Jwk {
        let mut jwk = Jwk::generate_ec_key(josekit::jwk::alg::ec::EcCurve::P256).unwrap();
        jwk.set_key_id(kid);
        jwk.set_algorithm(alg);
        jwk.set_key_use(key_use);
        jwk
    }

    /// The smallest configuration that validates.
    pub(crate) fn minimal_config() -> Configuration {
        let ring = KeyRing::from_keys(vec![ec_key("sig-1", "ES256", "sig")]).unwrap();
        Configuration::builder()
            .host("https://as.example.com")
            .clients(Arc::new(InMemoryClientStore::new()))
            .authn_sessions(Arc::new(InMemoryAuthnSessionStore::new()))
            .grant_sessions(Arc::new(InMemoryGrantSessionStore::new()))
            .key_ring(ring)
            .default_token_sig_key_id("sig-1")
            .default_user_sig_key_id("sig-1")
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::minimal_config;
    use super::*;

    #[test]
    fn test_effective_key_ids_dedup() {
        let mut config = minimal_config();
        config.user_sig_key_ids = vec!["sig-1".into(), "sig-2".into()];
        assert_eq!(config.effective_user_sig_key_ids(), vec!["sig-1", "sig-2"]);
    }

    #[test]
    fn test_user_info_sig_algs_derive_from_keys() {
        let config = minimal_config();
        assert_eq!(config.user_info_sig_algs(), vec![SigAlg::ES256]);
    }

    #[test]
    fn test_token_sig_key_falls_back_to_default() {
        let config = minimal_config();
        let options = TokenOptions::jwt(Some("missing".into()), 300);
        let key = config.token_sig_key(&options).unwrap();
        assert_eq!(key.key_id(), Some("sig-1"));
    }
}
