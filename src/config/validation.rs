//! Boot-time configuration validation.
//!
//! Every cross-feature invariant is checked once before the provider will
//! serve. Failures are fatal; there is no degraded mode.

use snafu::Snafu;

use super::Configuration;
use crate::jose::SigAlg;
use crate::keys::KeyUse;
use crate::oauth::{ClientAuthnMethod, GrantType, Profile};

/// A configuration that cannot be served.
#[derive(Debug, Clone, Snafu)]
pub enum ConfigurationError {
    /// A referenced key id is absent from the JWKS.
    #[snafu(display("the key {kid} is not present in the server JWKS"))]
    MissingKey {
        /// The missing key id.
        kid: String,
    },
    /// A key is used against its declared purpose.
    #[snafu(display("the key {kid} is not meant for {purpose}"))]
    WrongKeyUse {
        /// The offending key id.
        kid: String,
        /// `signing` or `encryption`.
        purpose: &'static str,
    },
    /// Two keys selectable by algorithm share one.
    #[snafu(display("keys {first} and {second} share an algorithm used for selection"))]
    AmbiguousAlgorithm {
        /// First key id.
        first: String,
        /// Second key id.
        second: String,
    },
    /// A symmetric algorithm was configured where only asymmetric ones
    /// belong.
    #[snafu(display("symmetric algorithms are not allowed for {feature}"))]
    SymmetricAlgorithm {
        /// The feature name.
        feature: &'static str,
    },
    /// An asymmetric algorithm was configured where only symmetric ones
    /// belong.
    #[snafu(display("asymmetric algorithms are not allowed for {feature}"))]
    AsymmetricAlgorithm {
        /// The feature name.
        feature: &'static str,
    },
    /// Introspection accepts an unauthenticated or unknown method.
    #[snafu(display("invalid client authentication method for token introspection"))]
    InvalidIntrospectionAuthn,
    /// An encryption add-on is enabled without its base feature.
    #[snafu(display("{feature} must be enabled before its encryption can be"))]
    EncryptionWithoutFeature {
        /// The base feature name.
        feature: &'static str,
    },
    /// Sender-constrained tokens are required with no binding mechanism.
    #[snafu(display(
        "if sender constraining tokens is required, at least one mechanism must be enabled, either DPoP or TLS"
    ))]
    NoSenderConstraintMechanism,
    /// The OpenID profile pins the default user-facing algorithms.
    #[snafu(display("the default signature algorithm for {feature} must be RS256"))]
    OpenIdDefaultAlgorithm {
        /// `ID tokens` or `JARM`.
        feature: &'static str,
    },
    /// FAPI 2.0 restricts client authentication.
    #[snafu(display("only private_key_jwt and tls_client_auth are allowed for FAPI 2.0"))]
    Fapi2AuthnMethods,
    /// FAPI 2.0 forbids the implicit grant.
    #[snafu(display("the implicit grant is not allowed for FAPI 2.0"))]
    Fapi2ImplicitGrant,
    /// FAPI 2.0 requires pushed authorization requests.
    #[snafu(display("pushed authorization requests are required for FAPI 2.0"))]
    Fapi2ParRequired,
    /// FAPI 2.0 requires PKCE.
    #[snafu(display("proof key for code exchange is required for FAPI 2.0"))]
    Fapi2PkceRequired,
    /// FAPI 2.0 requires the issuer response parameter.
    #[snafu(display("the issuer response parameter is required for FAPI 2.0"))]
    Fapi2IssuerParamRequired,
    /// Refresh token rotation without grace semantics breaks FAPI 2.0.
    #[snafu(display(
        "refresh token rotation must be disabled for FAPI 2.0 because rotated tokens are forgotten immediately"
    ))]
    Fapi2RefreshRotation,
    /// JARM is enabled without a default signing key.
    #[snafu(display("JARM requires a default signature key"))]
    JarmWithoutKey,
    /// The configured scope set is missing `openid`.
    #[snafu(display("the openid scope must be among the configured scopes"))]
    MissingOpenIdScope,
}

pub(crate) fn validate(config: &Configuration) -> Result<(), ConfigurationError> {
    validate_scope_set(config)?;
    validate_signing_keys(config)?;
    validate_encryption_keys(config)?;
    validate_algorithm_uniqueness(config)?;
    validate_assertion_algorithms(config)?;
    validate_introspection(config)?;
    validate_encryption_features(config)?;
    validate_sender_constraints(config)?;
    validate_openid_profile(config)?;
    validate_fapi2_profile(config)?;
    Ok(())
}

// OpenID features hinge on the openid scope being grantable.
fn validate_scope_set(config: &Configuration) -> Result<(), ConfigurationError> {
    if !config
        .scopes
        .iter()
        .any(|scope| scope.id() == crate::oauth::SCOPE_OPENID)
    {
        return Err(ConfigurationError::MissingOpenIdScope);
    }
    Ok(())
}

fn validate_signing_keys(config: &Configuration) -> Result<(), ConfigurationError> {
    let mut kids: Vec<&str> = vec![
        config.default_token_sig_key_id.as_str(),
        config.default_user_sig_key_id.as_str(),
    ];
    kids.extend(config.user_sig_key_ids.iter().map(String::as_str));
    if config.jarm_enabled {
        kids.extend(config.effective_jarm_sig_key_ids());
    }

    for kid in kids {
        let key = config
            .key_ring
            .by_kid(kid)
            .ok_or_else(|| ConfigurationError::MissingKey { kid: kid.into() })?;
        if key.key_use() != Some(KeyUse::Signature.as_str()) {
            return Err(ConfigurationError::WrongKeyUse {
                kid: kid.into(),
                purpose: "signing",
            });
        }
        if key
            .algorithm()
            .and_then(SigAlg::parse)
            .is_some_and(SigAlg::is_symmetric)
        {
            return Err(ConfigurationError::SymmetricAlgorithm { feature: "signing" });
        }
    }
    Ok(())
}

fn validate_encryption_keys(config: &Configuration) -> Result<(), ConfigurationError> {
    for kid in &config.jar_key_enc_kids {
        let key = config
            .key_ring
            .by_kid(kid)
            .ok_or_else(|| ConfigurationError::MissingKey { kid: kid.clone() })?;
        if key.key_use() != Some(KeyUse::Encryption.as_str()) {
            return Err(ConfigurationError::WrongKeyUse {
                kid: kid.clone(),
                purpose: "encryption",
            });
        }
    }
    Ok(())
}

// Features whose key selection is algorithm driven cannot tolerate two keys
// with the same algorithm.
fn validate_algorithm_uniqueness(config: &Configuration) -> Result<(), ConfigurationError> {
    for key_ids in [
        config.effective_user_sig_key_ids(),
        config.effective_jarm_sig_key_ids(),
    ] {
        for (i, first) in key_ids.iter().enumerate() {
            let Some(first_key) = config.key_ring.by_kid(first) else {
                continue;
            };
            for second in &key_ids[i + 1..] {
                let Some(second_key) = config.key_ring.by_kid(second) else {
                    continue;
                };
                if first_key.algorithm().is_some()
                    && first_key.algorithm() == second_key.algorithm()
                {
                    return Err(ConfigurationError::AmbiguousAlgorithm {
                        first: (*first).into(),
                        second: (*second).into(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn validate_assertion_algorithms(config: &Configuration) -> Result<(), ConfigurationError> {
    if config
        .private_key_jwt_sig_algs
        .iter()
        .any(|alg| alg.is_symmetric())
    {
        return Err(ConfigurationError::SymmetricAlgorithm {
            feature: "private_key_jwt authentication",
        });
    }
    if config
        .client_secret_jwt_sig_algs
        .iter()
        .any(|alg| !alg.is_symmetric())
    {
        return Err(ConfigurationError::AsymmetricAlgorithm {
            feature: "client_secret_jwt authentication",
        });
    }
    Ok(())
}

fn validate_introspection(config: &Configuration) -> Result<(), ConfigurationError> {
    if !config.introspection_enabled {
        return Ok(());
    }
    if config
        .introspection_authn_methods
        .iter()
        .any(|m| *m == ClientAuthnMethod::None)
    {
        return Err(ConfigurationError::InvalidIntrospectionAuthn);
    }
    if config
        .introspection_authn_methods
        .iter()
        .any(|m| !config.client_authn_methods.contains(m))
    {
        return Err(ConfigurationError::InvalidIntrospectionAuthn);
    }
    Ok(())
}

fn validate_encryption_features(config: &Configuration) -> Result<(), ConfigurationError> {
    if config.jar_encryption_enabled && !config.jar_enabled {
        return Err(ConfigurationError::EncryptionWithoutFeature { feature: "JAR" });
    }
    if config.jarm_encryption_enabled && !config.jarm_enabled {
        return Err(ConfigurationError::EncryptionWithoutFeature { feature: "JARM" });
    }
    if config.jarm_enabled && config.jarm_default_sig_key_id.is_none() {
        return Err(ConfigurationError::JarmWithoutKey);
    }
    if config.user_info_encryption_enabled && config.user_info_key_enc_algs.is_empty() {
        return Err(ConfigurationError::EncryptionWithoutFeature {
            feature: "userinfo",
        });
    }
    Ok(())
}

fn validate_sender_constraints(config: &Configuration) -> Result<(), ConfigurationError> {
    if config.sender_constrained_required
        && !config.dpop_enabled
        && !config.mtls_token_binding_enabled
    {
        return Err(ConfigurationError::NoSenderConstraintMechanism);
    }
    Ok(())
}

fn validate_openid_profile(config: &Configuration) -> Result<(), ConfigurationError> {
    if config.profile != Profile::OpenId {
        return Ok(());
    }

    let default_user_key = config
        .key_ring
        .by_kid(&config.default_user_sig_key_id)
        .ok_or_else(|| ConfigurationError::MissingKey {
            kid: config.default_user_sig_key_id.clone(),
        })?;
    if default_user_key.algorithm() != Some(SigAlg::RS256.as_str()) {
        return Err(ConfigurationError::OpenIdDefaultAlgorithm {
            feature: "ID tokens",
        });
    }

    if config.jarm_enabled {
        let kid = config
            .jarm_default_sig_key_id
            .as_deref()
            .ok_or(ConfigurationError::JarmWithoutKey)?;
        let default_jarm_key = config
            .key_ring
            .by_kid(kid)
            .ok_or_else(|| ConfigurationError::MissingKey { kid: kid.into() })?;
        if default_jarm_key.algorithm() != Some(SigAlg::RS256.as_str()) {
            return Err(ConfigurationError::OpenIdDefaultAlgorithm { feature: "JARM" });
        }
    }
    Ok(())
}

fn validate_fapi2_profile(config: &Configuration) -> Result<(), ConfigurationError> {
    if config.profile != Profile::Fapi2 {
        return Ok(());
    }

    if config.client_authn_methods.iter().any(|method| {
        !matches!(
            method,
            ClientAuthnMethod::PrivateKeyJwt | ClientAuthnMethod::Tls
        )
    }) {
        return Err(ConfigurationError::Fapi2AuthnMethods);
    }
    if config.grant_types.contains(&GrantType::Implicit) {
        return Err(ConfigurationError::Fapi2ImplicitGrant);
    }
    if !config.par_enabled || !config.par_required {
        return Err(ConfigurationError::Fapi2ParRequired);
    }
    if !config.pkce_enabled || !config.pkce_required {
        return Err(ConfigurationError::Fapi2PkceRequired);
    }
    if !config.issuer_response_param_enabled {
        return Err(ConfigurationError::Fapi2IssuerParamRequired);
    }
    if config.grant_types.contains(&GrantType::RefreshToken) && config.refresh_rotation_enabled {
        return Err(ConfigurationError::Fapi2RefreshRotation);
    }
    Ok(())
}
