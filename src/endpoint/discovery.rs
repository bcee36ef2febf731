//! The discovery document, derived from live configuration.

use serde::Serialize;

use crate::config::Context;
use crate::http::Response;
use crate::jose::{ContentEncAlg, KeyEncAlg, SigAlg};
use crate::oauth::{
    ClaimType, ClientAuthnMethod, CodeChallengeMethod, DisplayValue, GrantType, ResponseMode,
    ResponseType, SubjectIdentifierType,
};

#[derive(Debug, Serialize)]
struct OpenIdConfiguration {
    issuer: String,
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
    jwks_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    registration_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pushed_authorization_request_endpoint: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    require_pushed_authorization_requests: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    introspection_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    introspection_endpoint_auth_methods_supported: Option<Vec<ClientAuthnMethod>>,
    response_types_supported: Vec<ResponseType>,
    response_modes_supported: Vec<ResponseMode>,
    grant_types_supported: Vec<GrantType>,
    subject_types_supported: Vec<SubjectIdentifierType>,
    scopes_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    claims_supported: Vec<String>,
    claim_types_supported: Vec<ClaimType>,
    claims_parameter_supported: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    acr_values_supported: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    display_values_supported: Vec<DisplayValue>,
    token_endpoint_auth_methods_supported: Vec<ClientAuthnMethod>,
    token_endpoint_auth_signing_alg_values_supported: Vec<SigAlg>,
    id_token_signing_alg_values_supported: Vec<SigAlg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id_token_encryption_alg_values_supported: Option<Vec<KeyEncAlg>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id_token_encryption_enc_values_supported: Option<Vec<ContentEncAlg>>,
    userinfo_signing_alg_values_supported: Vec<SigAlg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    userinfo_encryption_alg_values_supported: Option<Vec<KeyEncAlg>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    userinfo_encryption_enc_values_supported: Option<Vec<ContentEncAlg>>,
    request_parameter_supported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_object_signing_alg_values_supported: Option<Vec<SigAlg>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_object_encryption_alg_values_supported: Option<Vec<KeyEncAlg>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_object_encryption_enc_values_supported: Option<Vec<ContentEncAlg>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_signing_alg_values_supported: Option<Vec<SigAlg>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_encryption_alg_values_supported: Option<Vec<KeyEncAlg>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_encryption_enc_values_supported: Option<Vec<ContentEncAlg>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dpop_signing_alg_values_supported: Option<Vec<SigAlg>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    code_challenge_methods_supported: Vec<CodeChallengeMethod>,
    authorization_response_iss_parameter_supported: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    authorization_details_types_supported: Vec<String>,
    tls_client_certificate_bound_access_tokens: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    mtls_endpoint_aliases: Option<MtlsEndpointAliases>,
}

#[derive(Debug, Serialize)]
struct MtlsEndpointAliases {
    token_endpoint: String,
    userinfo_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pushed_authorization_request_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    introspection_endpoint: Option<String>,
}

/// Handles `GET /.well-known/openid-configuration`.
pub(crate) fn metadata(ctx: &Context<'_>) -> Response {
    let config = ctx.config;
    let base = config.base_url();

    let document = OpenIdConfiguration {
        issuer: config.host.clone(),
        authorization_endpoint: format!("{base}{}", super::AUTHORIZE_PATH),
        token_endpoint: format!("{base}{}", super::TOKEN_PATH),
        userinfo_endpoint: format!("{base}{}", super::USERINFO_PATH),
        jwks_uri: format!("{base}{}", super::JWKS_PATH),
        registration_endpoint: config
            .dcr_enabled
            .then(|| format!("{base}{}", super::REGISTER_PATH)),
        pushed_authorization_request_endpoint: config
            .par_enabled
            .then(|| format!("{base}{}", super::PAR_PATH)),
        require_pushed_authorization_requests: config.par_required,
        introspection_endpoint: config
            .introspection_enabled
            .then(|| format!("{base}{}", super::INTROSPECT_PATH)),
        introspection_endpoint_auth_methods_supported: config
            .introspection_enabled
            .then(|| config.introspection_authn_methods.clone()),
        response_types_supported: config.response_types.clone(),
        response_modes_supported: config.response_modes.clone(),
        grant_types_supported: config.grant_types.clone(),
        subject_types_supported: config.subject_identifier_types.clone(),
        scopes_supported: config.scopes.iter().map(|s| s.id().to_string()).collect(),
        claims_supported: config.user_claims.clone(),
        claim_types_supported: config.claim_types.clone(),
        claims_parameter_supported: config.claims_param_enabled,
        acr_values_supported: config.acr_values.clone(),
        display_values_supported: config.display_values.clone(),
        token_endpoint_auth_methods_supported: config.client_authn_methods.clone(),
        token_endpoint_auth_signing_alg_values_supported: config.client_assertion_sig_algs(),
        id_token_signing_alg_values_supported: config.user_info_sig_algs(),
        id_token_encryption_alg_values_supported: config
            .user_info_encryption_enabled
            .then(|| config.user_info_key_enc_algs.clone()),
        id_token_encryption_enc_values_supported: config
            .user_info_encryption_enabled
            .then(|| config.user_info_content_enc_algs.clone()),
        userinfo_signing_alg_values_supported: config.user_info_sig_algs(),
        userinfo_encryption_alg_values_supported: config
            .user_info_encryption_enabled
            .then(|| config.user_info_key_enc_algs.clone()),
        userinfo_encryption_enc_values_supported: config
            .user_info_encryption_enabled
            .then(|| config.user_info_content_enc_algs.clone()),
        request_parameter_supported: config.jar_enabled,
        request_object_signing_alg_values_supported: config
            .jar_enabled
            .then(|| config.jar_sig_algs.clone()),
        request_object_encryption_alg_values_supported: config
            .jar_encryption_enabled
            .then(|| config.jar_key_enc_algs()),
        request_object_encryption_enc_values_supported: config
            .jar_encryption_enabled
            .then(|| config.jar_content_enc_algs.clone()),
        authorization_signing_alg_values_supported: config
            .jarm_enabled
            .then(|| config.jarm_sig_algs()),
        authorization_encryption_alg_values_supported: config
            .jarm_encryption_enabled
            .then(|| config.jarm_key_enc_algs.clone()),
        authorization_encryption_enc_values_supported: config
            .jarm_encryption_enabled
            .then(|| config.jarm_content_enc_algs.clone()),
        dpop_signing_alg_values_supported: config
            .dpop_enabled
            .then(|| config.dpop_sig_algs.clone()),
        code_challenge_methods_supported: if config.pkce_enabled {
            config.code_challenge_methods.clone()
        } else {
            Vec::new()
        },
        authorization_response_iss_parameter_supported: config.issuer_response_param_enabled,
        authorization_details_types_supported: if config.auth_details_enabled {
            config.auth_detail_types.clone()
        } else {
            Vec::new()
        },
        tls_client_certificate_bound_access_tokens: config.mtls_token_binding_enabled,
        mtls_endpoint_aliases: config.mtls_base_url().map(|mtls_base| MtlsEndpointAliases {
            token_endpoint: format!("{mtls_base}{}", super::TOKEN_PATH),
            userinfo_endpoint: format!("{mtls_base}{}", super::USERINFO_PATH),
            pushed_authorization_request_endpoint: config
                .par_enabled
                .then(|| format!("{mtls_base}{}", super::PAR_PATH)),
            introspection_endpoint: config
                .introspection_enabled
                .then(|| format!("{mtls_base}{}", super::INTROSPECT_PATH)),
        }),
    };
    Response::ok_json(&document)
}
