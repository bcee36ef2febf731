//! Session aggregates persisted through the host stores.
//!
//! An [`AuthnSession`] is the short-lived ledger of one authorization
//! request, from push or first hit on the authorization endpoint until the
//! code exchange. A [`GrantSession`] is the longer-lived ledger of an issued
//! grant and outlives individual access tokens.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::material;
use crate::oauth::{AuthorizationDetail, AuthorizationParameters, GrantInfo};

/// The in-flight record of an authorization request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthnSession {
    /// Storage key.
    pub id: String,
    /// Handle for resuming a suspended policy, part of the callback URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,
    /// The `request_uri` value minted by the pushed authorization endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    /// The client that opened the request.
    pub client_id: String,
    /// The policy driving user authentication, chosen at flow start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    /// Unix seconds after which the session is treated as absent.
    pub expires_at: i64,
    /// Unix seconds of creation.
    pub created_at: i64,
    /// Set only after the policy succeeds for a `code` response type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
    /// The authenticated end user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Space-delimited scopes the user consented to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_scopes: Option<String>,
    /// Authorization details the user consented to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_authorization_details: Option<Vec<AuthorizationDetail>>,
    /// Custom parameters prefixed `p_`, pushed by the client and visible
    /// only to policies.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub protected_params: Map<String, Value>,
    /// Scratchpad for policies to keep state between interactions.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub store: Map<String, Value>,
    /// Claims a policy wants added to access tokens.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_token_claims: Map<String, Value>,
    /// Claims a policy wants added to ID tokens.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_id_token_claims: Map<String, Value>,
    /// Claims a policy wants returned from the userinfo endpoint.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_user_info_claims: Map<String, Value>,
    /// The request parameters after merging.
    pub params: AuthorizationParameters,
    /// A failure cause set by a policy. Not persisted.
    #[serde(skip)]
    pub error: Option<Error>,
}

impl AuthnSession {
    /// Creates a session for the given client and parameters.
    #[must_use]
    pub fn new(client_id: impl Into<String>, params: AuthorizationParameters) -> Self {
        let now = material::unix_now();
        Self {
            id: material::session_id(),
            callback_id: None,
            reference_id: None,
            client_id: client_id.into(),
            policy_id: None,
            expires_at: now,
            created_at: now,
            authorization_code: None,
            subject: None,
            granted_scopes: None,
            granted_authorization_details: None,
            protected_params: Map::new(),
            store: Map::new(),
            additional_token_claims: Map::new(),
            additional_id_token_claims: Map::new(),
            additional_user_info_claims: Map::new(),
            params,
            error: None,
        }
    }

    /// Marks the session as pushed: mints the `request_uri` reference and
    /// bounds its life.
    pub(crate) fn push(&mut self, lifetime_secs: i64) -> String {
        let reference = material::request_uri();
        self.reference_id = Some(reference.clone());
        self.expires_at = material::unix_now() + lifetime_secs;
        reference
    }

    /// Starts the interactive phase: consumes the reference, mints the
    /// callback id and rebounds the session life.
    pub(crate) fn start(&mut self, policy_id: impl Into<String>, timeout_secs: i64) {
        self.reference_id = None;
        self.policy_id = Some(policy_id.into());
        self.callback_id = Some(material::callback_id());
        self.expires_at = material::unix_now() + timeout_secs;
    }

    /// Mints the single-use authorization code. The session is terminal
    /// now: the callback handle stops working and the record lives only as
    /// long as the code is exchangeable.
    pub(crate) fn issue_authorization_code(&mut self) -> String {
        let code = material::authorization_code();
        self.authorization_code = Some(code.clone());
        self.callback_id = None;
        self.expires_at = material::unix_now() + material::AUTHORIZATION_CODE_LIFETIME_SECS;
        code
    }

    /// Whether the session is past its deadline.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        material::unix_now() > self.expires_at
    }

    /// Records the authenticated end user.
    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.subject = Some(subject.into());
    }

    /// Grants the scopes the client will receive.
    pub fn grant_scopes(&mut self, scopes: impl Into<String>) {
        self.granted_scopes = Some(scopes.into());
    }

    /// Grants the authorization details the client will receive.
    pub fn grant_authorization_details(&mut self, details: Vec<AuthorizationDetail>) {
        self.granted_authorization_details = Some(details);
    }

    /// Stores a value in the policy scratchpad.
    pub fn store_value(&mut self, key: impl Into<String>, value: Value) {
        self.store.insert(key.into(), value);
    }

    /// Reads a value from the policy scratchpad.
    #[must_use]
    pub fn stored_value(&self, key: &str) -> Option<&Value> {
        self.store.get(key)
    }

    /// A protected (`p_` prefixed) parameter pushed by the client.
    #[must_use]
    pub fn protected_param(&self, key: &str) -> Option<&Value> {
        self.protected_params.get(key)
    }

    /// Adds a claim to future access tokens.
    pub fn set_token_claim(&mut self, claim: impl Into<String>, value: Value) {
        self.additional_token_claims.insert(claim.into(), value);
    }

    /// Adds a claim to future ID tokens.
    pub fn set_id_token_claim(&mut self, claim: impl Into<String>, value: Value) {
        self.additional_id_token_claims.insert(claim.into(), value);
    }

    /// Records the authentication time for ID tokens.
    pub fn set_id_token_auth_time(&mut self, auth_time: i64) {
        self.set_id_token_claim(crate::oauth::claims::AUTH_TIME, auth_time.into());
    }

    /// Records the authentication context class for ID tokens.
    pub fn set_id_token_acr(&mut self, acr: impl Into<String>) {
        self.set_id_token_claim(crate::oauth::claims::ACR, Value::String(acr.into()));
    }

    /// Records the authentication method references for ID tokens.
    pub fn set_id_token_amr<I, S>(&mut self, amrs: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<Value> = amrs.into_iter().map(|a| Value::String(a.into())).collect();
        self.set_id_token_claim(crate::oauth::claims::AMR, Value::Array(values));
    }

    /// Adds a claim to userinfo responses.
    pub fn set_user_info_claim(&mut self, claim: impl Into<String>, value: Value) {
        self.additional_user_info_claims.insert(claim.into(), value);
    }

    /// Fails the flow with a specific error instead of the generic
    /// `access_denied`.
    pub fn fail_with(&mut self, error: Error) {
        self.error = Some(error);
    }

    /// The grant description backing tokens issued from this session. The
    /// token options are filled in by the host hook afterwards.
    #[must_use]
    pub(crate) fn grant_info(&self, grant_type: crate::oauth::GrantType) -> GrantInfo {
        GrantInfo {
            grant_type,
            subject: self.subject.clone().unwrap_or_default(),
            client_id: self.client_id.clone(),
            granted_scopes: self.granted_scopes.clone().unwrap_or_default(),
            granted_authorization_details: self.granted_authorization_details.clone(),
            granted_resources: self.params.resources.clone(),
            additional_token_claims: self.additional_token_claims.clone(),
            additional_id_token_claims: self.additional_id_token_claims.clone(),
            additional_user_info_claims: self.additional_user_info_claims.clone(),
            token_options: crate::oauth::TokenOptions::default(),
        }
    }
}

/// The persisted record of an issued grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantSession {
    /// Storage key.
    pub id: String,
    /// The id of the most recently issued access token: the `jti` of a JWT
    /// token or the opaque value itself.
    pub token_id: String,
    /// The active refresh token, when one was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// The authorization code the grant was minted under, kept for replay
    /// detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
    /// DPoP binding: the proof key thumbprint every token must confirm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk_thumbprint: Option<String>,
    /// mTLS binding: the client certificate thumbprint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_cert_thumbprint: Option<String>,
    /// Unix seconds of creation.
    pub created_at: i64,
    /// Unix seconds the latest access token was issued at.
    pub last_token_issued_at: i64,
    /// Unix seconds after which the grant is dead.
    pub expires_at: i64,
    /// Space-delimited scopes currently active, possibly narrowed below the
    /// granted set by a refresh request.
    pub active_scopes: String,
    /// The full grant description.
    pub grant_info: GrantInfo,
}

impl GrantSession {
    /// Creates a grant session around a freshly issued token.
    #[must_use]
    pub fn new(grant_info: GrantInfo, token_id: impl Into<String>, lifetime_secs: i64) -> Self {
        let now = material::unix_now();
        Self {
            id: material::session_id(),
            token_id: token_id.into(),
            refresh_token: None,
            authorization_code: None,
            jwk_thumbprint: None,
            client_cert_thumbprint: None,
            created_at: now,
            last_token_issued_at: now,
            expires_at: now + lifetime_secs,
            active_scopes: grant_info.granted_scopes.clone(),
            grant_info,
        }
    }

    /// Whether the grant itself is past its deadline.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        material::unix_now() > self.expires_at
    }

    /// Whether the most recent access token is past its lifetime.
    #[must_use]
    pub fn has_last_token_expired(&self) -> bool {
        material::unix_now() > self.last_token_issued_at + self.grant_info.token_options.lifetime_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::{GrantType, TokenOptions};

    fn grant_info() -> GrantInfo {
        GrantInfo {
            grant_type: GrantType::AuthorizationCode,
            subject: "user-1".into(),
            client_id: "c1".into(),
            granted_scopes: "openid profile".into(),
            granted_authorization_details: None,
            granted_resources: None,
            additional_token_claims: Map::new(),
            additional_id_token_claims: Map::new(),
            additional_user_info_claims: Map::new(),
            token_options: TokenOptions::jwt(None, 300),
        }
    }

    #[test]
    fn test_push_then_start_consumes_reference() {
        let mut session = AuthnSession::new("c1", AuthorizationParameters::default());
        let reference = session.push(60);
        assert!(reference.starts_with("urn:ietf:params:oauth:request_uri:"));
        assert_eq!(session.reference_id.as_deref(), Some(reference.as_str()));

        session.start("main-policy", 1800);
        assert!(session.reference_id.is_none());
        assert_eq!(session.policy_id.as_deref(), Some("main-policy"));
        assert_eq!(session.callback_id.as_ref().map(String::len), Some(20));
        assert!(!session.is_expired());
    }

    #[test]
    fn test_authorization_code_bounds_session_life() {
        let mut session = AuthnSession::new("c1", AuthorizationParameters::default());
        session.start("main-policy", 1800);
        let code = session.issue_authorization_code();
        assert_eq!(code.len(), 30);
        assert!(session.expires_at <= material::unix_now() + 60);
        // Terminal: the policy can no longer be resumed.
        assert!(session.callback_id.is_none());
    }

    #[test]
    fn test_grant_session_token_expiry() {
        let mut session = GrantSession::new(grant_info(), "token-1", 6000);
        assert!(!session.has_last_token_expired());
        session.last_token_issued_at = material::unix_now() - 301;
        assert!(session.has_last_token_expired());
        assert!(!session.is_expired());
    }

    #[test]
    fn test_policy_facing_helpers() {
        let mut session = AuthnSession::new("c1", AuthorizationParameters::default());
        session.set_subject("user-1");
        session.grant_scopes("openid");
        session.store_value("step", 2.into());
        session.set_id_token_acr("urn:mace:incommon:iap:silver");
        session.set_id_token_amr(["pwd", "otp"]);

        assert_eq!(session.subject.as_deref(), Some("user-1"));
        assert_eq!(session.stored_value("step"), Some(&Value::from(2)));
        assert_eq!(
            session.additional_id_token_claims["acr"],
            "urn:mace:incommon:iap:silver"
        );
        assert_eq!(
            session.additional_id_token_claims["amr"],
            serde_json::json!(["pwd", "otp"])
        );
    }
}
