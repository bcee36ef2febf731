//! Client authentication.
//!
//! Implements the six token-endpoint authentication methods plus `none`.
//! Before any method runs, every surface a client id can arrive on (form
//! field, basic credentials, assertion issuer) is collected and must agree,
//! which defeats id confusion between authentication surfaces. All failures
//! are `invalid_client`.

use secrecy::ExposeSecret;
use serde_json::Value;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

use super::{keys_of, Client};
use crate::config::Context;
use crate::error::{Error, ErrorCode};
use crate::jose::{self, SigAlg};
use crate::material;
use crate::oauth::{ClientAuthnMethod, ASSERTION_TYPE_JWT_BEARER};

const ID_PARAM: &str = "client_id";
const SECRET_PARAM: &str = "client_secret";
const ASSERTION_PARAM: &str = "client_assertion";
const ASSERTION_TYPE_PARAM: &str = "client_assertion_type";

/// Which endpoint the client is authenticating against. Endpoints can
/// restrict the acceptable methods independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuthnSurface {
    /// The token, pushed authorization and registration surfaces.
    Token,
    /// The introspection endpoint.
    Introspection,
}

/// Resolves and authenticates the client behind the current request.
pub(crate) async fn authenticated(
    ctx: &Context<'_>,
    surface: AuthnSurface,
) -> Result<Client, Error> {
    let id = extract_id(ctx)?;
    let client = ctx
        .client(&id)
        .await
        .map_err(|_| invalid_client("client not found"))?;

    let methods = match surface {
        AuthnSurface::Token => &ctx.config.client_authn_methods,
        AuthnSurface::Introspection => &ctx.config.introspection_authn_methods,
    };
    if !methods.contains(&client.metadata.authn_method) {
        return Err(invalid_client("authentication method not allowed"));
    }

    authenticate(ctx, &client).await?;
    tracing::debug!(client_id = %client.id, method = client.metadata.authn_method.as_str(),
        "client authenticated");
    Ok(client)
}

async fn authenticate(ctx: &Context<'_>, client: &Client) -> Result<(), Error> {
    match client.metadata.authn_method {
        ClientAuthnMethod::None => Ok(()),
        ClientAuthnMethod::SecretPost => authenticate_secret_post(ctx, client),
        ClientAuthnMethod::SecretBasic => authenticate_secret_basic(ctx, client),
        ClientAuthnMethod::PrivateKeyJwt => authenticate_private_key_jwt(ctx, client).await,
        ClientAuthnMethod::SecretJwt => authenticate_secret_jwt(ctx, client).await,
        ClientAuthnMethod::SelfSignedTls => authenticate_self_signed_tls(ctx, client).await,
        ClientAuthnMethod::Tls => authenticate_tls(ctx, client),
    }
}

fn authenticate_secret_post(ctx: &Context<'_>, client: &Client) -> Result<(), Error> {
    if ctx.request.form_param(ID_PARAM) != Some(&client.id) {
        return Err(invalid_client("invalid client id"));
    }
    let secret = ctx
        .request
        .form_param(SECRET_PARAM)
        .ok_or_else(|| invalid_client("client secret not informed"))?;
    validate_secret(client, secret)
}

fn authenticate_secret_basic(ctx: &Context<'_>, client: &Client) -> Result<(), Error> {
    let (id, secret) = ctx
        .request
        .basic_auth()
        .ok_or_else(|| invalid_client("client basic authentication not informed"))?;
    if id != client.id {
        return Err(invalid_client("invalid client id"));
    }
    validate_secret(client, &secret)
}

fn validate_secret(client: &Client, secret: &str) -> Result<(), Error> {
    let hashed = client
        .hashed_secret
        .as_deref()
        .ok_or_else(|| invalid_client("the client has no secret"))?;
    match bcrypt::verify(secret, hashed) {
        Ok(true) => Ok(()),
        _ => Err(invalid_client("invalid client secret")),
    }
}

async fn authenticate_private_key_jwt(ctx: &Context<'_>, client: &Client) -> Result<(), Error> {
    let assertion = assertion(ctx)?;

    let algs = assertion_sig_algs(client, &ctx.config.private_key_jwt_sig_algs);
    if algs.iter().any(|alg| alg.is_symmetric()) {
        return Err(invalid_client(
            "symmetric algorithms are not accepted for private_key_jwt",
        ));
    }

    let header =
        jose::decode_header(assertion).map_err(|_| invalid_client("malformed client assertion"))?;
    let jwk = match header.get("kid").and_then(Value::as_str) {
        Some(kid) => client.jwk_by_kid(ctx.http_client(), kid).await?,
        None => {
            let alg = header
                .get("alg")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid_client("malformed client assertion"))?;
            client.jwk_by_alg(ctx.http_client(), alg).await?
        }
    };

    let claims = jose::verify(assertion, &jwk, &algs)
        .map_err(|err| invalid_client(format!("could not verify the client assertion: {err}")))?;
    validate_assertion_claims(ctx, client, &claims).await
}

async fn authenticate_secret_jwt(ctx: &Context<'_>, client: &Client) -> Result<(), Error> {
    let assertion = assertion(ctx)?;

    let algs = assertion_sig_algs(client, &ctx.config.client_secret_jwt_sig_algs);
    if algs.iter().any(|alg| !alg.is_symmetric()) {
        return Err(invalid_client(
            "only symmetric algorithms are accepted for client_secret_jwt",
        ));
    }

    let secret = client
        .secret
        .as_ref()
        .ok_or_else(|| invalid_client("the client has no secret"))?;
    let claims = jose::verify_with_secret(assertion, secret.expose_secret().as_bytes(), &algs)
        .map_err(|err| invalid_client(format!("could not verify the client assertion: {err}")))?;
    validate_assertion_claims(ctx, client, &claims).await
}

fn assertion_sig_algs(client: &Client, configured: &[SigAlg]) -> Vec<SigAlg> {
    match client.metadata.authn_sig_alg {
        Some(alg) => vec![alg],
        None => configured.to_vec(),
    }
}

fn assertion<'a>(ctx: &'a Context<'_>) -> Result<&'a str, Error> {
    let assertion_type = ctx.request.form_param(ASSERTION_TYPE_PARAM);
    if assertion_type != Some(ASSERTION_TYPE_JWT_BEARER) {
        return Err(invalid_client("invalid client_assertion_type"));
    }
    ctx.request
        .form_param(ASSERTION_PARAM)
        .ok_or_else(|| invalid_client("client_assertion not informed"))
}

async fn validate_assertion_claims(
    ctx: &Context<'_>,
    client: &Client,
    claims: &serde_json::Map<String, Value>,
) -> Result<(), Error> {
    let exp = jose::require_number(claims, "exp")
        .map_err(|_| invalid_client("claim exp is missing in the client assertion"))?;
    let iat = jose::require_number(claims, "iat")
        .map_err(|_| invalid_client("claim iat is missing in the client assertion"))?;

    if exp - iat > ctx.config.assertion_lifetime_secs {
        return Err(invalid_client("the assertion lives longer than allowed"));
    }

    let now = material::unix_now();
    if now >= exp || iat > now {
        return Err(invalid_client("the assertion is not currently valid"));
    }

    let iss = jose::require_string(claims, "iss")
        .map_err(|_| invalid_client("claim iss is missing in the client assertion"))?;
    let sub = jose::require_string(claims, "sub")
        .map_err(|_| invalid_client("claim sub is missing in the client assertion"))?;
    if iss != client.id || sub != client.id {
        return Err(invalid_client("invalid assertion issuer or subject"));
    }

    let audiences = ctx.audiences();
    if !jose::audience_list(claims)
        .iter()
        .any(|aud| audiences.contains(aud))
    {
        return Err(invalid_client("invalid assertion audience"));
    }

    let jti = jose::require_string(claims, "jti")
        .map_err(|_| invalid_client("claim jti is missing in the client assertion"))?;
    ctx.config
        .hooks
        .check_jti(jti)
        .await
        .map_err(|_| invalid_client("the assertion jti was already used"))?;

    Ok(())
}

async fn authenticate_self_signed_tls(ctx: &Context<'_>, client: &Client) -> Result<(), Error> {
    if ctx.request.form_param(ID_PARAM) != Some(&client.id) {
        return Err(invalid_client("invalid client id"));
    }

    let der = ctx
        .request
        .client_cert
        .as_deref()
        .ok_or_else(|| invalid_client("client certificate not informed"))?;

    let sha256 = jose::sha256_b64url(der);
    let sha1 = jose::sha1_b64url(der);

    let jwks = client.public_jwks(ctx.http_client()).await?;
    let matched = keys_of(&jwks).into_iter().any(|jwk| {
        let x5t_s256 = jwk.parameter("x5t#S256").and_then(Value::as_str);
        let x5t = jwk.parameter("x5t").and_then(Value::as_str);
        x5t_s256 == Some(sha256.as_str()) || x5t == Some(sha1.as_str())
    });

    if !matched {
        return Err(invalid_client(
            "no client JWK matches the client certificate",
        ));
    }
    Ok(())
}

fn authenticate_tls(ctx: &Context<'_>, client: &Client) -> Result<(), Error> {
    if ctx.request.form_param(ID_PARAM) != Some(&client.id) {
        return Err(invalid_client("invalid client id"));
    }

    let der = ctx
        .request
        .client_cert
        .as_deref()
        .ok_or_else(|| invalid_client("client certificate not informed"))?;
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|_| invalid_client("invalid client certificate"))?;

    if let Some(expected_dn) = &client.metadata.tls_client_auth_subject_dn {
        if &cert.subject().to_string() != expected_dn {
            return Err(invalid_client("invalid certificate subject"));
        }
        return Ok(());
    }
    if let Some(expected_dns) = &client.metadata.tls_client_auth_san_dns {
        if !san_dns_names(&cert).iter().any(|dns| dns == expected_dns) {
            return Err(invalid_client("invalid certificate alternative name"));
        }
        return Ok(());
    }
    if let Some(expected_ip) = &client.metadata.tls_client_auth_san_ip {
        let expected: std::net::IpAddr = expected_ip
            .parse()
            .map_err(|_| invalid_client("invalid configured alternative ip"))?;
        if !san_ips(&cert).contains(&expected) {
            return Err(invalid_client("invalid certificate alternative ip"));
        }
        return Ok(());
    }

    Err(invalid_client(
        "the client has no attributes for tls authentication",
    ))
}

fn san_dns_names(cert: &X509Certificate<'_>) -> Vec<String> {
    subject_alternative_names(cert)
        .into_iter()
        .filter_map(|name| match name {
            GeneralName::DNSName(dns) => Some(dns.to_string()),
            _ => None,
        })
        .collect()
}

fn san_ips(cert: &X509Certificate<'_>) -> Vec<std::net::IpAddr> {
    subject_alternative_names(cert)
        .into_iter()
        .filter_map(|name| match name {
            GeneralName::IPAddress(bytes) => match bytes.len() {
                4 => {
                    let octets: [u8; 4] = bytes.try_into().ok()?;
                    Some(std::net::IpAddr::from(octets))
                }
                16 => {
                    let octets: [u8; 16] = bytes.try_into().ok()?;
                    Some(std::net::IpAddr::from(octets))
                }
                _ => None,
            },
            _ => None,
        })
        .collect()
}

fn subject_alternative_names<'a>(cert: &'a X509Certificate<'a>) -> Vec<GeneralName<'a>> {
    cert.subject_alternative_name()
        .ok()
        .flatten()
        .map(|san| san.value.general_names.clone())
        .unwrap_or_default()
}

/// Collects every surface a client id can arrive on and requires agreement.
fn extract_id(ctx: &Context<'_>) -> Result<String, Error> {
    let mut ids: Vec<String> = Vec::new();

    if let Some(id) = ctx.request.form_param(ID_PARAM) {
        if !id.is_empty() {
            ids.push(id.to_string());
        }
    }

    if let Some((id, _)) = ctx.request.basic_auth() {
        if !id.is_empty() {
            ids.push(id);
        }
    }

    if let Some(assertion) = ctx.request.form_param(ASSERTION_PARAM) {
        ids.push(assertion_client_id(assertion)?);
    }

    if ids.is_empty() || ids.iter().any(|id| id != &ids[0]) {
        return Err(invalid_client("invalid client id"));
    }
    Ok(ids.remove(0))
}

/// The issuer of a client assertion, read without verification. The
/// assertion is verified later by the selected method.
fn assertion_client_id(assertion: &str) -> Result<String, Error> {
    let claims = jose::unverified_claims(assertion)
        .map_err(|_| invalid_client("could not parse the client assertion"))?;
    claims
        .get("iss")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| invalid_client("invalid claim iss in the client assertion"))
}

fn invalid_client(description: impl Into<String>) -> Error {
    Error::new(ErrorCode::InvalidClient, description)
}
