//! Dynamic client metadata validation.
//!
//! The same discipline the boot validator applies to static configuration,
//! applied per client at registration and update time. Failures are
//! `invalid_client_metadata`, except redirect URI problems which use the
//! dedicated `invalid_redirect_uri` code.

use serde_json::Value;
use url::Url;

use crate::client::ClientMetadata;
use crate::config::Context;
use crate::error::{Error, ErrorCode};
use crate::oauth::{
    scopes_contain_offline_access, scopes_contain_openid, split_scopes, ClientAuthnMethod,
    GrantType, ResponseType,
};

type Validator = fn(&Context<'_>, &ClientMetadata) -> Result<(), Error>;

pub(crate) fn validate_metadata(
    ctx: &Context<'_>,
    metadata: &ClientMetadata,
) -> Result<(), Error> {
    let validators: &[Validator] = &[
        validate_authn_method,
        validate_grant_types,
        validate_response_types,
        validate_scopes,
        validate_refresh_token_grant,
        validate_redirect_uris,
        validate_authn_sig_alg,
        validate_jwks_presence,
        validate_tls_subject_identifiers,
        validate_public_jwks,
        validate_signing_preferences,
        validate_encryption_preferences,
        validate_authorization_detail_types,
        validate_subject_identifier_type,
    ];
    for validator in validators {
        validator(ctx, metadata)?;
    }
    Ok(())
}

fn metadata_error(description: impl Into<String>) -> Error {
    Error::new(ErrorCode::InvalidClientMetadata, description)
}

fn validate_authn_method(ctx: &Context<'_>, metadata: &ClientMetadata) -> Result<(), Error> {
    if !ctx
        .config
        .client_authn_methods
        .contains(&metadata.authn_method)
    {
        return Err(metadata_error("authentication method not allowed"));
    }
    Ok(())
}

fn validate_grant_types(ctx: &Context<'_>, metadata: &ClientMetadata) -> Result<(), Error> {
    for grant in &metadata.grant_types {
        if !ctx.config.grant_types.contains(grant) {
            return Err(metadata_error("grant type not allowed"));
        }
    }
    if metadata.authn_method == ClientAuthnMethod::None
        && metadata.grant_types.contains(&GrantType::ClientCredentials)
    {
        return Err(metadata_error(
            "client_credentials is not allowed for public clients",
        ));
    }
    if metadata.grant_types.contains(&GrantType::Introspection)
        && !ctx
            .config
            .introspection_authn_methods
            .contains(&metadata.authn_method)
    {
        return Err(metadata_error(
            "the authentication method is not accepted for introspection",
        ));
    }
    Ok(())
}

fn validate_response_types(ctx: &Context<'_>, metadata: &ClientMetadata) -> Result<(), Error> {
    for response_type in &metadata.response_types {
        if !ctx.config.response_types.contains(response_type) {
            return Err(metadata_error("response type not allowed"));
        }
        if response_type.contains_code()
            && !metadata.grant_types.contains(&GrantType::AuthorizationCode)
        {
            return Err(metadata_error(
                "the authorization_code grant is required for code response types",
            ));
        }
        if response_type.is_implicit()
            && (response_type.contains_token() || *response_type == ResponseType::IdToken)
            && !metadata.grant_types.contains(&GrantType::Implicit)
        {
            return Err(metadata_error(
                "the implicit grant is required for implicit response types",
            ));
        }
    }
    Ok(())
}

fn validate_scopes(ctx: &Context<'_>, metadata: &ClientMetadata) -> Result<(), Error> {
    for requested in split_scopes(&metadata.scopes) {
        if !ctx.config.scopes.iter().any(|scope| scope.id() == requested) {
            return Err(metadata_error(format!("scope {requested} is not valid")));
        }
    }
    if ctx.config.open_id_scope_required && !scopes_contain_openid(&metadata.scopes) {
        return Err(metadata_error("the openid scope is required"));
    }
    Ok(())
}

fn validate_refresh_token_grant(
    _ctx: &Context<'_>,
    metadata: &ClientMetadata,
) -> Result<(), Error> {
    if scopes_contain_offline_access(&metadata.scopes)
        && !metadata.grant_types.contains(&GrantType::RefreshToken)
    {
        return Err(metadata_error(
            "the refresh_token grant is required for the offline_access scope",
        ));
    }
    Ok(())
}

fn validate_redirect_uris(_ctx: &Context<'_>, metadata: &ClientMetadata) -> Result<(), Error> {
    let needs_redirects = metadata.grant_types.contains(&GrantType::AuthorizationCode)
        || metadata.grant_types.contains(&GrantType::Implicit);
    if needs_redirects && metadata.redirect_uris.is_empty() {
        return Err(Error::new(
            ErrorCode::InvalidRedirectUri,
            "at least one redirect uri is required",
        ));
    }
    for uri in &metadata.redirect_uris {
        let parsed = Url::parse(uri).map_err(|_| {
            Error::new(ErrorCode::InvalidRedirectUri, "invalid redirect uri")
        })?;
        if parsed.fragment().is_some() {
            return Err(Error::new(
                ErrorCode::InvalidRedirectUri,
                "the redirect uri cannot contain a fragment",
            ));
        }
    }
    Ok(())
}

fn validate_authn_sig_alg(ctx: &Context<'_>, metadata: &ClientMetadata) -> Result<(), Error> {
    let Some(alg) = metadata.authn_sig_alg else {
        return Ok(());
    };
    match metadata.authn_method {
        ClientAuthnMethod::PrivateKeyJwt => {
            if !ctx.config.private_key_jwt_sig_algs.contains(&alg) {
                return Err(metadata_error(
                    "token_endpoint_auth_signing_alg not supported",
                ));
            }
        }
        ClientAuthnMethod::SecretJwt => {
            if !ctx.config.client_secret_jwt_sig_algs.contains(&alg) {
                return Err(metadata_error(
                    "token_endpoint_auth_signing_alg not supported",
                ));
            }
        }
        _ => {}
    }
    Ok(())
}

fn validate_jwks_presence(_ctx: &Context<'_>, metadata: &ClientMetadata) -> Result<(), Error> {
    let needs_jwks = matches!(
        metadata.authn_method,
        ClientAuthnMethod::PrivateKeyJwt | ClientAuthnMethod::SelfSignedTls
    );
    if needs_jwks && metadata.public_jwks.is_none() && metadata.jwks_uri.is_none() {
        return Err(metadata_error(format!(
            "a jwks is required for {}",
            metadata.authn_method.as_str()
        )));
    }
    Ok(())
}

fn validate_tls_subject_identifiers(
    _ctx: &Context<'_>,
    metadata: &ClientMetadata,
) -> Result<(), Error> {
    if metadata.authn_method != ClientAuthnMethod::Tls {
        return Ok(());
    }
    let identifiers = [
        metadata.tls_client_auth_subject_dn.as_ref(),
        metadata.tls_client_auth_san_dns.as_ref(),
        metadata.tls_client_auth_san_ip.as_ref(),
    ];
    if identifiers.iter().filter(|id| id.is_some()).count() != 1 {
        return Err(metadata_error(
            "exactly one of tls_client_auth_subject_dn, tls_client_auth_san_dns and \
             tls_client_auth_san_ip must be informed",
        ));
    }
    Ok(())
}

fn validate_public_jwks(_ctx: &Context<'_>, metadata: &ClientMetadata) -> Result<(), Error> {
    let Some(document) = &metadata.public_jwks else {
        return Ok(());
    };
    let Some(keys) = document.get("keys").and_then(Value::as_array) else {
        return Err(metadata_error("invalid jwks"));
    };
    for key in keys {
        let Some(map) = key.as_object() else {
            return Err(metadata_error("invalid jwks"));
        };
        if josekit::jwk::Jwk::from_map(map.clone()).is_err() {
            return Err(metadata_error("invalid jwks"));
        }
        if map.contains_key("d") || map.contains_key("k") {
            return Err(metadata_error("the client jwks must only hold public keys"));
        }
    }
    Ok(())
}

fn validate_signing_preferences(
    ctx: &Context<'_>,
    metadata: &ClientMetadata,
) -> Result<(), Error> {
    let user_algs = ctx.config.user_info_sig_algs();
    if let Some(alg) = metadata.id_token_sig_alg {
        if !user_algs.contains(&alg) {
            return Err(metadata_error("id_token_signed_response_alg not supported"));
        }
    }
    if let Some(alg) = metadata.user_info_sig_alg {
        if !user_algs.contains(&alg) {
            return Err(metadata_error("userinfo_signed_response_alg not supported"));
        }
    }
    if let Some(alg) = metadata.jarm_sig_alg {
        if !ctx.config.jarm_enabled || !ctx.config.jarm_sig_algs().contains(&alg) {
            return Err(metadata_error(
                "authorization_signed_response_alg not supported",
            ));
        }
    }
    if let Some(alg) = metadata.jar_sig_alg {
        if !ctx.config.jar_enabled || !ctx.config.jar_sig_algs.contains(&alg) {
            return Err(metadata_error("request_object_signing_alg not supported"));
        }
    }
    Ok(())
}

fn validate_encryption_preferences(
    ctx: &Context<'_>,
    metadata: &ClientMetadata,
) -> Result<(), Error> {
    // ID token and userinfo share one encryption feature.
    validate_enc_pair(
        ctx.config.user_info_encryption_enabled,
        &ctx.config.user_info_key_enc_algs,
        &ctx.config.user_info_content_enc_algs,
        metadata.id_token_key_enc_alg,
        metadata.id_token_content_enc_alg,
        "id_token",
    )?;
    validate_enc_pair(
        ctx.config.user_info_encryption_enabled,
        &ctx.config.user_info_key_enc_algs,
        &ctx.config.user_info_content_enc_algs,
        metadata.user_info_key_enc_alg,
        metadata.user_info_content_enc_alg,
        "userinfo",
    )?;
    validate_enc_pair(
        ctx.config.jarm_encryption_enabled,
        &ctx.config.jarm_key_enc_algs,
        &ctx.config.jarm_content_enc_algs,
        metadata.jarm_key_enc_alg,
        metadata.jarm_content_enc_alg,
        "authorization response",
    )?;
    validate_enc_pair(
        ctx.config.jar_encryption_enabled,
        &ctx.config.jar_key_enc_algs(),
        &ctx.config.jar_content_enc_algs,
        metadata.jar_key_enc_alg,
        metadata.jar_content_enc_alg,
        "request object",
    )
}

fn validate_enc_pair(
    feature_enabled: bool,
    allowed_key_algs: &[crate::jose::KeyEncAlg],
    allowed_content_algs: &[crate::jose::ContentEncAlg],
    key_alg: Option<crate::jose::KeyEncAlg>,
    content_alg: Option<crate::jose::ContentEncAlg>,
    feature: &str,
) -> Result<(), Error> {
    if !feature_enabled {
        if key_alg.is_some() || content_alg.is_some() {
            return Err(metadata_error(format!(
                "{feature} encryption is not supported"
            )));
        }
        return Ok(());
    }
    if let Some(alg) = key_alg {
        if !allowed_key_algs.contains(&alg) {
            return Err(metadata_error(format!(
                "{feature} encryption algorithm not supported"
            )));
        }
    }
    if content_alg.is_some() && key_alg.is_none() {
        return Err(metadata_error(format!(
            "a {feature} key encryption algorithm is required when a content algorithm is set"
        )));
    }
    if let Some(alg) = content_alg {
        if !allowed_content_algs.contains(&alg) {
            return Err(metadata_error(format!(
                "{feature} content encryption algorithm not supported"
            )));
        }
    }
    Ok(())
}

fn validate_authorization_detail_types(
    ctx: &Context<'_>,
    metadata: &ClientMetadata,
) -> Result<(), Error> {
    let Some(types) = &metadata.authorization_detail_types else {
        return Ok(());
    };
    if !ctx.config.auth_details_enabled {
        return Err(metadata_error("authorization details are not supported"));
    }
    for detail_type in types {
        if !ctx.config.auth_detail_types.contains(detail_type) {
            return Err(metadata_error("authorization detail type not supported"));
        }
    }
    Ok(())
}

fn validate_subject_identifier_type(
    ctx: &Context<'_>,
    metadata: &ClientMetadata,
) -> Result<(), Error> {
    if let Some(subject_type) = metadata.subject_identifier_type {
        if !ctx.config.subject_identifier_types.contains(&subject_type) {
            return Err(metadata_error("subject_type not supported"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::minimal_config;
    use crate::http::Request;
    use crate::oauth::Scope;

    fn check(
        mutate_config: impl FnOnce(&mut crate::config::Configuration),
        metadata: &ClientMetadata,
    ) -> Result<(), Error> {
        let mut config = minimal_config();
        config.client_authn_methods = vec![
            ClientAuthnMethod::SecretBasic,
            ClientAuthnMethod::PrivateKeyJwt,
            ClientAuthnMethod::Tls,
            ClientAuthnMethod::None,
        ];
        config.scopes = vec![Scope::new("openid"), Scope::new("offline_access")];
        config.grant_types = vec![
            GrantType::AuthorizationCode,
            GrantType::RefreshToken,
            GrantType::ClientCredentials,
        ];
        mutate_config(&mut config);
        let request = Request::builder().path("/register").build();
        let ctx = Context {
            config: &config,
            request: &request,
        };
        validate_metadata(&ctx, metadata)
    }

    fn valid_metadata() -> ClientMetadata {
        ClientMetadata {
            redirect_uris: vec!["https://c1/cb".into()],
            scopes: "openid".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_metadata_passes() {
        assert!(check(|_| {}, &valid_metadata()).is_ok());
    }

    #[test]
    fn test_fragment_redirect_uri_rejected() {
        let mut metadata = valid_metadata();
        metadata.redirect_uris = vec!["https://c1/cb#frag".into()];
        let err = check(|_| {}, &metadata).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRedirectUri);
    }

    #[test]
    fn test_public_client_cannot_use_client_credentials() {
        let mut metadata = valid_metadata();
        metadata.authn_method = ClientAuthnMethod::None;
        metadata
            .grant_types
            .push(GrantType::ClientCredentials);
        let err = check(|_| {}, &metadata).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidClientMetadata);
    }

    #[test]
    fn test_private_key_jwt_requires_jwks() {
        let mut metadata = valid_metadata();
        metadata.authn_method = ClientAuthnMethod::PrivateKeyJwt;
        let err = check(|_| {}, &metadata).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidClientMetadata);

        metadata.jwks_uri = Some("https://c1/jwks".into());
        assert!(check(|_| {}, &metadata).is_ok());
    }

    #[test]
    fn test_tls_requires_exactly_one_identifier() {
        let mut metadata = valid_metadata();
        metadata.authn_method = ClientAuthnMethod::Tls;
        assert!(check(|_| {}, &metadata).is_err());

        metadata.tls_client_auth_subject_dn = Some("CN=c1".into());
        assert!(check(|_| {}, &metadata).is_ok());

        metadata.tls_client_auth_san_dns = Some("c1.example.com".into());
        assert!(check(|_| {}, &metadata).is_err());
    }

    #[test]
    fn test_offline_access_needs_refresh_grant() {
        let mut metadata = valid_metadata();
        metadata.scopes = "openid offline_access".into();
        let err = check(|_| {}, &metadata).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidClientMetadata);

        metadata.grant_types.push(GrantType::RefreshToken);
        assert!(check(|_| {}, &metadata).is_ok());
    }

    #[test]
    fn test_private_jwks_rejected() {
        let mut metadata = valid_metadata();
        let private = josekit::jwk::Jwk::generate_ec_key(josekit::jwk::alg::ec::EcCurve::P256)
            .unwrap();
        let mut map = serde_json::Map::new();
        map.insert("kty".into(), Value::String("EC".into()));
        for name in ["crv", "x", "y", "d"] {
            if let Some(value) = private.parameter(name) {
                map.insert(name.into(), value.clone());
            }
        }
        metadata.public_jwks = Some(serde_json::json!({ "keys": [map] }));
        let err = check(|_| {}, &metadata).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidClientMetadata);
    }

    #[test]
    fn test_encryption_preference_requires_feature() {
        let mut metadata = valid_metadata();
        metadata.id_token_key_enc_alg = Some(crate::jose::KeyEncAlg::RsaOaep256);
        let err = check(|_| {}, &metadata).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidClientMetadata);

        let result = check(
            |config| {
                config.user_info_encryption_enabled = true;
                config.user_info_key_enc_algs = vec![crate::jose::KeyEncAlg::RsaOaep256];
            },
            &metadata,
        );
        assert!(result.is_ok());
    }
}
