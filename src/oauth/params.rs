//! Authorization request parameters and their merge semantics.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{
    AuthorizationDetail, CodeChallengeMethod, DisplayValue, Prompt, ResponseMode, ResponseType,
};

/// The parameters of an authorization request.
///
/// Populated from the query string, a pushed request, or a JAR request
/// object. All members are optional at this layer; the validator decides
/// what a complete request looks like.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationParameters {
    /// `request_uri`, a pushed request reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_uri: Option<String>,
    /// `request`, a JAR request object.
    #[serde(rename = "request", skip_serializing_if = "Option::is_none")]
    pub request_object: Option<String>,
    /// `redirect_uri`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    /// `response_mode`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<ResponseMode>,
    /// `response_type`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
    /// `scope`, space-delimited.
    #[serde(rename = "scope", skip_serializing_if = "Option::is_none")]
    pub scopes: Option<String>,
    /// `state`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// `nonce`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// `code_challenge` (PKCE).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    /// `code_challenge_method` (PKCE).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<CodeChallengeMethod>,
    /// `prompt`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Prompt>,
    /// `max_age`, the maximum acceptable authentication age in seconds.
    #[serde(rename = "max_age", skip_serializing_if = "Option::is_none")]
    pub max_authn_age_secs: Option<i64>,
    /// `display`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayValue>,
    /// `acr_values`, space-delimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acr_values: Option<String>,
    /// The `claims` request parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<ClaimsObject>,
    /// `authorization_details`, RFC 9396.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_details: Option<Vec<AuthorizationDetail>>,
    /// `resource` indicators, RFC 8707. One or many.
    #[serde(rename = "resource", skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    /// `dpop_jkt`, the thumbprint the token request must prove possession of.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpop_jkt: Option<String>,
    /// `login_hint`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_hint: Option<String>,
    /// `id_token_hint`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_hint: Option<String>,
}

impl AuthorizationParameters {
    /// Merges two parameter sets. Members of `self` (the inner source, e.g. a
    /// request object or a pushed request) take priority over `outer`.
    #[must_use]
    pub fn merge(self, outer: Self) -> Self {
        Self {
            request_uri: None,
            request_object: None,
            redirect_uri: self.redirect_uri.or(outer.redirect_uri),
            response_mode: self.response_mode.or(outer.response_mode),
            response_type: self.response_type.or(outer.response_type),
            scopes: self.scopes.or(outer.scopes),
            state: self.state.or(outer.state),
            nonce: self.nonce.or(outer.nonce),
            code_challenge: self.code_challenge.or(outer.code_challenge),
            code_challenge_method: self.code_challenge_method.or(outer.code_challenge_method),
            prompt: self.prompt.or(outer.prompt),
            max_authn_age_secs: self.max_authn_age_secs.or(outer.max_authn_age_secs),
            display: self.display.or(outer.display),
            acr_values: self.acr_values.or(outer.acr_values),
            claims: self.claims.or(outer.claims),
            authorization_details: self.authorization_details.or(outer.authorization_details),
            resources: self.resources.or(outer.resources),
            dpop_jkt: self.dpop_jkt.or(outer.dpop_jkt),
            login_hint: self.login_hint.or(outer.login_hint),
            id_token_hint: self.id_token_hint.or(outer.id_token_hint),
        }
    }

    /// The response mode to answer with: the requested one, with bare `jwt`
    /// resolved by the response type, or the response type default.
    #[must_use]
    pub fn negotiated_response_mode(&self) -> ResponseMode {
        let response_type = self.response_type.unwrap_or(ResponseType::Code);
        match self.response_mode {
            None => response_type.default_response_mode(false),
            Some(ResponseMode::Jwt) => response_type.default_response_mode(true),
            Some(mode) => mode,
        }
    }

    /// Builds parameters from a decoded query or form map. Unknown members
    /// are ignored; structured members parse leniently and are re-validated
    /// later.
    #[must_use]
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |name: &str| map.get(name).filter(|v| !v.is_empty()).cloned();
        Self {
            request_uri: get("request_uri"),
            request_object: get("request"),
            redirect_uri: get("redirect_uri"),
            response_mode: get("response_mode").and_then(|v| ResponseMode::parse(&v)),
            response_type: get("response_type").and_then(|v| ResponseType::parse(&v)),
            scopes: get("scope"),
            state: get("state"),
            nonce: get("nonce"),
            code_challenge: get("code_challenge"),
            code_challenge_method: get("code_challenge_method")
                .and_then(|v| serde_json::from_value(serde_json::Value::String(v)).ok()),
            prompt: get("prompt")
                .and_then(|v| serde_json::from_value(serde_json::Value::String(v)).ok()),
            max_authn_age_secs: get("max_age").and_then(|v| v.parse().ok()),
            display: get("display")
                .and_then(|v| serde_json::from_value(serde_json::Value::String(v)).ok()),
            acr_values: get("acr_values"),
            claims: get("claims").and_then(|v| serde_json::from_str(&v).ok()),
            authorization_details: get("authorization_details")
                .and_then(|v| serde_json::from_str(&v).ok()),
            resources: get("resource").map(|v| Resources(vec![v])),
            dpop_jkt: get("dpop_jkt"),
            login_hint: get("login_hint"),
            id_token_hint: get("id_token_hint"),
        }
    }
}

/// RFC 8707 resource indicators. Serializes as a bare string when single.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resources(pub Vec<String>);

impl Serialize for Resources {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.len() == 1 {
            self.0[0].serialize(serializer)
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Resources {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<String>),
        }
        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(value) => Self(vec![value]),
            OneOrMany::Many(values) => Self(values),
        })
    }
}

/// The OpenID Connect `claims` request parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimsObject {
    /// Claims requested for the userinfo response.
    #[serde(default)]
    pub userinfo: HashMap<String, Option<ClaimRule>>,
    /// Claims requested for the ID token.
    #[serde(default)]
    pub id_token: HashMap<String, Option<ClaimRule>>,
}

impl ClaimsObject {
    /// Names of claims marked essential for the ID token.
    #[must_use]
    pub fn id_token_essentials(&self) -> Vec<&str> {
        essentials(&self.id_token)
    }

    /// Names of claims marked essential for the userinfo response.
    #[must_use]
    pub fn userinfo_essentials(&self) -> Vec<&str> {
        essentials(&self.userinfo)
    }
}

fn essentials(claims: &HashMap<String, Option<ClaimRule>>) -> Vec<&str> {
    claims
        .iter()
        .filter(|(_, rule)| rule.as_ref().is_some_and(|r| r.essential))
        .map(|(name, _)| name.as_str())
        .collect()
}

/// Constraints on an individual requested claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimRule {
    /// Whether the claim is essential for the requested flow.
    #[serde(default)]
    pub essential: bool,
    /// A specific value the claim must take.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// A set of acceptable values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<serde_json::Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_inner_overrides_outer() {
        let inner = AuthorizationParameters {
            scopes: Some("openid profile".into()),
            state: Some("inner-state".into()),
            ..Default::default()
        };
        let outer = AuthorizationParameters {
            scopes: Some("openid".into()),
            nonce: Some("outer-nonce".into()),
            request_uri: Some("urn:ietf:params:oauth:request_uri:abc".into()),
            ..Default::default()
        };

        let merged = inner.merge(outer);
        assert_eq!(merged.scopes.as_deref(), Some("openid profile"));
        assert_eq!(merged.state.as_deref(), Some("inner-state"));
        assert_eq!(merged.nonce.as_deref(), Some("outer-nonce"));
        assert!(merged.request_uri.is_none());
    }

    #[test]
    fn test_negotiated_response_mode_resolves_bare_jwt() {
        let params = AuthorizationParameters {
            response_type: Some(ResponseType::Code),
            response_mode: Some(ResponseMode::Jwt),
            ..Default::default()
        };
        assert_eq!(params.negotiated_response_mode(), ResponseMode::QueryJwt);

        let params = AuthorizationParameters {
            response_type: Some(ResponseType::IdTokenToken),
            response_mode: Some(ResponseMode::Jwt),
            ..Default::default()
        };
        assert_eq!(params.negotiated_response_mode(), ResponseMode::FragmentJwt);
    }

    #[test]
    fn test_from_map() {
        let mut map = HashMap::new();
        map.insert("response_type".to_string(), "code".to_string());
        map.insert("scope".to_string(), "openid profile".to_string());
        map.insert("redirect_uri".to_string(), "https://c1/cb".to_string());
        map.insert("code_challenge_method".to_string(), "S256".to_string());
        map.insert("max_age".to_string(), "3600".to_string());
        map.insert("unknown".to_string(), "ignored".to_string());

        let params = AuthorizationParameters::from_map(&map);
        assert_eq!(params.response_type, Some(ResponseType::Code));
        assert_eq!(params.scopes.as_deref(), Some("openid profile"));
        assert_eq!(params.redirect_uri.as_deref(), Some("https://c1/cb"));
        assert_eq!(
            params.code_challenge_method,
            Some(CodeChallengeMethod::S256)
        );
        assert_eq!(params.max_authn_age_secs, Some(3600));
    }

    #[test]
    fn test_resources_one_or_many() {
        let one: Resources = serde_json::from_str(r#""https://api.example.com""#).unwrap();
        assert_eq!(one.0, vec!["https://api.example.com"]);
        assert_eq!(
            serde_json::to_string(&one).unwrap(),
            r#""https://api.example.com""#
        );

        let many: Resources = serde_json::from_str(r#"["https://a", "https://b"]"#).unwrap();
        assert_eq!(many.0.len(), 2);
    }

    #[test]
    fn test_claims_object_essentials() {
        let claims: ClaimsObject = serde_json::from_value(serde_json::json!({
            "id_token": {
                "auth_time": {"essential": true},
                "email": null,
            },
            "userinfo": {
                "name": {"essential": false},
            }
        }))
        .unwrap();
        assert_eq!(claims.id_token_essentials(), vec!["auth_time"]);
        assert!(claims.userinfo_essentials().is_empty());
    }
}
