//! Allowlisted JOSE operations.
//!
//! Thin, deliberately restrictive wrappers over `josekit`. Every parse takes
//! the explicit set of algorithms the caller accepts; anything else fails
//! before a signature is ever checked. Claim validation is done with zero
//! clock leeway.

use base64::prelude::*;
use josekit::jwe::{JweDecrypter, JweEncrypter, JweHeader};
use josekit::jwk::Jwk;
use josekit::jws::{JwsHeader, JwsSigner, JwsVerifier};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use snafu::{ResultExt, Snafu};

/// Errors produced while handling JOSE objects.
#[derive(Debug, Snafu)]
pub enum EnvelopeError {
    /// The algorithm is not one this crate knows how to drive.
    #[snafu(display("unsupported algorithm {alg}"))]
    UnsupportedAlgorithm {
        /// The offending algorithm name.
        alg: String,
    },
    /// The algorithm is known but not in the caller's allowlist.
    #[snafu(display("algorithm {alg} is not allowed here"))]
    DisallowedAlgorithm {
        /// The offending algorithm name.
        alg: String,
    },
    /// The compact serialization is structurally broken.
    #[snafu(display("malformed jose object"))]
    Malformed,
    /// A required claim is absent.
    #[snafu(display("claim {name} is missing"))]
    MissingClaim {
        /// The claim name.
        name: &'static str,
    },
    /// A claim is present but unacceptable.
    #[snafu(display("claim {name} is invalid"))]
    InvalidClaim {
        /// The claim name.
        name: &'static str,
    },
    /// The underlying cryptographic operation failed.
    #[snafu(display("jose operation failed: {source}"))]
    Crypto {
        /// The `josekit` error.
        source: josekit::JoseError,
    },
}

/// JWS signature algorithms accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigAlg {
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    RS256,
    /// RSASSA-PKCS1-v1_5 with SHA-384.
    RS384,
    /// RSASSA-PKCS1-v1_5 with SHA-512.
    RS512,
    /// RSASSA-PSS with SHA-256.
    PS256,
    /// RSASSA-PSS with SHA-384.
    PS384,
    /// RSASSA-PSS with SHA-512.
    PS512,
    /// ECDSA P-256 with SHA-256.
    ES256,
    /// ECDSA P-384 with SHA-384.
    ES384,
    /// ECDSA P-521 with SHA-512.
    ES512,
    /// HMAC with SHA-256.
    HS256,
    /// HMAC with SHA-384.
    HS384,
    /// HMAC with SHA-512.
    HS512,
    /// Edwards-curve signatures.
    EdDSA,
}

impl SigAlg {
    /// The registered algorithm name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::ES512 => "ES512",
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::EdDSA => "EdDSA",
        }
    }

    /// Parses a registered algorithm name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RS256" => Some(Self::RS256),
            "RS384" => Some(Self::RS384),
            "RS512" => Some(Self::RS512),
            "PS256" => Some(Self::PS256),
            "PS384" => Some(Self::PS384),
            "PS512" => Some(Self::PS512),
            "ES256" => Some(Self::ES256),
            "ES384" => Some(Self::ES384),
            "ES512" => Some(Self::ES512),
            "HS256" => Some(Self::HS256),
            "HS384" => Some(Self::HS384),
            "HS512" => Some(Self::HS512),
            "EdDSA" => Some(Self::EdDSA),
            _ => None,
        }
    }

    /// Whether the algorithm is keyed with a shared secret.
    #[must_use]
    pub fn is_symmetric(self) -> bool {
        matches!(self, Self::HS256 | Self::HS384 | Self::HS512)
    }
}

/// JWE key management algorithms accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEncAlg {
    /// RSAES OAEP with SHA-1.
    #[serde(rename = "RSA-OAEP")]
    RsaOaep,
    /// RSAES OAEP with SHA-256.
    #[serde(rename = "RSA-OAEP-256")]
    RsaOaep256,
    /// AES-128 key wrap.
    #[serde(rename = "A128KW")]
    A128Kw,
    /// AES-192 key wrap.
    #[serde(rename = "A192KW")]
    A192Kw,
    /// AES-256 key wrap.
    #[serde(rename = "A256KW")]
    A256Kw,
    /// Static-ephemeral ECDH.
    #[serde(rename = "ECDH-ES")]
    EcdhEs,
}

impl KeyEncAlg {
    /// The registered algorithm name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RsaOaep => "RSA-OAEP",
            Self::RsaOaep256 => "RSA-OAEP-256",
            Self::A128Kw => "A128KW",
            Self::A192Kw => "A192KW",
            Self::A256Kw => "A256KW",
            Self::EcdhEs => "ECDH-ES",
        }
    }

    /// Parses a registered algorithm name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RSA-OAEP" => Some(Self::RsaOaep),
            "RSA-OAEP-256" => Some(Self::RsaOaep256),
            "A128KW" => Some(Self::A128Kw),
            "A192KW" => Some(Self::A192Kw),
            "A256KW" => Some(Self::A256Kw),
            "ECDH-ES" => Some(Self::EcdhEs),
            _ => None,
        }
    }
}

/// JWE content encryption algorithms accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentEncAlg {
    /// AES-128-CBC with HMAC-SHA-256.
    #[serde(rename = "A128CBC-HS256")]
    A128CbcHs256,
    /// AES-192-CBC with HMAC-SHA-384.
    #[serde(rename = "A192CBC-HS384")]
    A192CbcHs384,
    /// AES-256-CBC with HMAC-SHA-512.
    #[serde(rename = "A256CBC-HS512")]
    A256CbcHs512,
    /// AES-128-GCM.
    #[serde(rename = "A128GCM")]
    A128Gcm,
    /// AES-192-GCM.
    #[serde(rename = "A192GCM")]
    A192Gcm,
    /// AES-256-GCM.
    #[serde(rename = "A256GCM")]
    A256Gcm,
}

impl ContentEncAlg {
    /// The registered algorithm name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A128CbcHs256 => "A128CBC-HS256",
            Self::A192CbcHs384 => "A192CBC-HS384",
            Self::A256CbcHs512 => "A256CBC-HS512",
            Self::A128Gcm => "A128GCM",
            Self::A192Gcm => "A192GCM",
            Self::A256Gcm => "A256GCM",
        }
    }

    /// Parses a registered algorithm name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "A128CBC-HS256" => Some(Self::A128CbcHs256),
            "A192CBC-HS384" => Some(Self::A192CbcHs384),
            "A256CBC-HS512" => Some(Self::A256CbcHs512),
            "A128GCM" => Some(Self::A128Gcm),
            "A192GCM" => Some(Self::A192Gcm),
            "A256GCM" => Some(Self::A256Gcm),
            _ => None,
        }
    }
}

/// Structural classification of a compact serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoseKind {
    /// Three-part signed object.
    Jws,
    /// Five-part encrypted object.
    Jwe,
}

/// Classifies a compact serialization by part count.
#[must_use]
pub fn kind(compact: &str) -> Option<JoseKind> {
    if compact.is_empty() || compact.contains(char::is_whitespace) {
        return None;
    }
    match compact.split('.').count() {
        3 => Some(JoseKind::Jws),
        5 => Some(JoseKind::Jwe),
        _ => None,
    }
}

/// Whether the value looks like a signed compact JWT.
#[must_use]
pub fn is_jws(value: &str) -> bool {
    kind(value) == Some(JoseKind::Jws) && decode_part(value, 0).is_ok()
}

fn decode_part(compact: &str, index: usize) -> Result<Map<String, Value>, EnvelopeError> {
    let part = compact.split('.').nth(index).ok_or(EnvelopeError::Malformed)?;
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| EnvelopeError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| EnvelopeError::Malformed)
}

/// The protected header of a compact JWS or JWE, without verification.
pub(crate) fn decode_header(compact: &str) -> Result<Map<String, Value>, EnvelopeError> {
    decode_part(compact, 0)
}

/// The payload claims of a compact JWS, without verification.
///
/// Only usable for routing decisions such as extracting the issuer of a
/// client assertion. Never trust these values.
pub(crate) fn unverified_claims(compact: &str) -> Result<Map<String, Value>, EnvelopeError> {
    if kind(compact) != Some(JoseKind::Jws) {
        return Err(EnvelopeError::Malformed);
    }
    decode_part(compact, 1)
}

fn verifier_by_alg(alg: SigAlg, jwk: &Jwk) -> Result<Box<dyn JwsVerifier>, EnvelopeError> {
    use josekit::jws;
    let verifier: Box<dyn JwsVerifier> = match alg {
        SigAlg::RS256 => Box::new(jws::RS256.verifier_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::RS384 => Box::new(jws::RS384.verifier_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::RS512 => Box::new(jws::RS512.verifier_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::PS256 => Box::new(jws::PS256.verifier_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::PS384 => Box::new(jws::PS384.verifier_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::PS512 => Box::new(jws::PS512.verifier_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::ES256 => Box::new(jws::ES256.verifier_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::ES384 => Box::new(jws::ES384.verifier_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::ES512 => Box::new(jws::ES512.verifier_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::HS256 => Box::new(jws::HS256.verifier_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::HS384 => Box::new(jws::HS384.verifier_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::HS512 => Box::new(jws::HS512.verifier_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::EdDSA => Box::new(jws::EdDSA.verifier_from_jwk(jwk).context(CryptoSnafu)?),
    };
    Ok(verifier)
}

fn hmac_verifier(alg: SigAlg, secret: &[u8]) -> Result<Box<dyn JwsVerifier>, EnvelopeError> {
    use josekit::jws;
    let verifier: Box<dyn JwsVerifier> = match alg {
        SigAlg::HS256 => Box::new(jws::HS256.verifier_from_bytes(secret).context(CryptoSnafu)?),
        SigAlg::HS384 => Box::new(jws::HS384.verifier_from_bytes(secret).context(CryptoSnafu)?),
        SigAlg::HS512 => Box::new(jws::HS512.verifier_from_bytes(secret).context(CryptoSnafu)?),
        other => {
            return Err(EnvelopeError::UnsupportedAlgorithm {
                alg: other.as_str().to_string(),
            })
        }
    };
    Ok(verifier)
}

fn signer_for(jwk: &Jwk) -> Result<(SigAlg, Box<dyn JwsSigner>), EnvelopeError> {
    use josekit::jws;
    let alg_name = jwk.algorithm().ok_or(EnvelopeError::UnsupportedAlgorithm {
        alg: String::new(),
    })?;
    let alg = SigAlg::parse(alg_name).ok_or_else(|| EnvelopeError::UnsupportedAlgorithm {
        alg: alg_name.to_string(),
    })?;
    let signer: Box<dyn JwsSigner> = match alg {
        SigAlg::RS256 => Box::new(jws::RS256.signer_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::RS384 => Box::new(jws::RS384.signer_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::RS512 => Box::new(jws::RS512.signer_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::PS256 => Box::new(jws::PS256.signer_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::PS384 => Box::new(jws::PS384.signer_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::PS512 => Box::new(jws::PS512.signer_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::ES256 => Box::new(jws::ES256.signer_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::ES384 => Box::new(jws::ES384.signer_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::ES512 => Box::new(jws::ES512.signer_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::HS256 => Box::new(jws::HS256.signer_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::HS384 => Box::new(jws::HS384.signer_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::HS512 => Box::new(jws::HS512.signer_from_jwk(jwk).context(CryptoSnafu)?),
        SigAlg::EdDSA => Box::new(jws::EdDSA.signer_from_jwk(jwk).context(CryptoSnafu)?),
    };
    Ok((alg, signer))
}

/// The signature algorithm of a private key, when it is one we support.
pub(crate) fn signature_algorithm(jwk: &Jwk) -> Option<SigAlg> {
    jwk.algorithm().and_then(SigAlg::parse)
}

/// Signs claims into a compact JWS with the key's own algorithm. The key id
/// is copied into the header.
pub(crate) fn sign(
    claims: &Map<String, Value>,
    jwk: &Jwk,
    token_type: &str,
) -> Result<String, EnvelopeError> {
    let (_, signer) = signer_for(jwk)?;
    let mut header = JwsHeader::new();
    header.set_token_type(token_type);
    if let Some(kid) = jwk.key_id() {
        header.set_key_id(kid);
    }
    let payload = serde_json::to_vec(claims).map_err(|_| EnvelopeError::Malformed)?;
    josekit::jws::serialize_compact(&payload, &header, &*signer).context(CryptoSnafu)
}

fn header_alg(compact: &str, allowed: &[SigAlg]) -> Result<SigAlg, EnvelopeError> {
    let header = decode_header(compact)?;
    let alg_name = header
        .get("alg")
        .and_then(Value::as_str)
        .ok_or(EnvelopeError::Malformed)?;
    let alg = SigAlg::parse(alg_name).ok_or_else(|| EnvelopeError::UnsupportedAlgorithm {
        alg: alg_name.to_string(),
    })?;
    if !allowed.contains(&alg) {
        return Err(EnvelopeError::DisallowedAlgorithm {
            alg: alg_name.to_string(),
        });
    }
    Ok(alg)
}

/// Verifies a compact JWS against a public key, accepting only the listed
/// algorithms, and returns the claims.
pub(crate) fn verify(
    compact: &str,
    jwk: &Jwk,
    allowed: &[SigAlg],
) -> Result<Map<String, Value>, EnvelopeError> {
    let alg = header_alg(compact, allowed)?;
    let verifier = verifier_by_alg(alg, jwk)?;
    let (payload, _) = josekit::jws::deserialize_compact(compact, &*verifier).context(CryptoSnafu)?;
    serde_json::from_slice(&payload).map_err(|_| EnvelopeError::Malformed)
}

/// Verifies a compact JWS keyed with a shared secret, accepting only the
/// listed symmetric algorithms, and returns the claims.
pub(crate) fn verify_with_secret(
    compact: &str,
    secret: &[u8],
    allowed: &[SigAlg],
) -> Result<Map<String, Value>, EnvelopeError> {
    let alg = header_alg(compact, allowed)?;
    let verifier = hmac_verifier(alg, secret)?;
    let (payload, _) = josekit::jws::deserialize_compact(compact, &*verifier).context(CryptoSnafu)?;
    serde_json::from_slice(&payload).map_err(|_| EnvelopeError::Malformed)
}

fn encrypter_for(jwk: &Jwk, alg: KeyEncAlg) -> Result<Box<dyn JweEncrypter>, EnvelopeError> {
    use josekit::jwe;
    let encrypter: Box<dyn JweEncrypter> = match alg {
        KeyEncAlg::RsaOaep => Box::new(jwe::RSA_OAEP.encrypter_from_jwk(jwk).context(CryptoSnafu)?),
        KeyEncAlg::RsaOaep256 => {
            Box::new(jwe::RSA_OAEP_256.encrypter_from_jwk(jwk).context(CryptoSnafu)?)
        }
        KeyEncAlg::A128Kw => Box::new(jwe::A128KW.encrypter_from_jwk(jwk).context(CryptoSnafu)?),
        KeyEncAlg::A192Kw => Box::new(jwe::A192KW.encrypter_from_jwk(jwk).context(CryptoSnafu)?),
        KeyEncAlg::A256Kw => Box::new(jwe::A256KW.encrypter_from_jwk(jwk).context(CryptoSnafu)?),
        KeyEncAlg::EcdhEs => Box::new(jwe::ECDH_ES.encrypter_from_jwk(jwk).context(CryptoSnafu)?),
    };
    Ok(encrypter)
}

fn decrypter_for(jwk: &Jwk, alg: KeyEncAlg) -> Result<Box<dyn JweDecrypter>, EnvelopeError> {
    use josekit::jwe;
    let decrypter: Box<dyn JweDecrypter> = match alg {
        KeyEncAlg::RsaOaep => Box::new(jwe::RSA_OAEP.decrypter_from_jwk(jwk).context(CryptoSnafu)?),
        KeyEncAlg::RsaOaep256 => {
            Box::new(jwe::RSA_OAEP_256.decrypter_from_jwk(jwk).context(CryptoSnafu)?)
        }
        KeyEncAlg::A128Kw => Box::new(jwe::A128KW.decrypter_from_jwk(jwk).context(CryptoSnafu)?),
        KeyEncAlg::A192Kw => Box::new(jwe::A192KW.decrypter_from_jwk(jwk).context(CryptoSnafu)?),
        KeyEncAlg::A256Kw => Box::new(jwe::A256KW.decrypter_from_jwk(jwk).context(CryptoSnafu)?),
        KeyEncAlg::EcdhEs => Box::new(jwe::ECDH_ES.decrypter_from_jwk(jwk).context(CryptoSnafu)?),
    };
    Ok(decrypter)
}

/// Wraps a signed JWT in a compact JWE addressed to the given key.
///
/// The key's `alg` parameter selects the key management algorithm. The nested
/// structure is advertised through `cty: JWT`.
pub(crate) fn encrypt(
    jws: &str,
    jwk: &Jwk,
    content_encryption: ContentEncAlg,
) -> Result<String, EnvelopeError> {
    let alg_name = jwk.algorithm().unwrap_or_default();
    let alg = KeyEncAlg::parse(alg_name).ok_or_else(|| EnvelopeError::UnsupportedAlgorithm {
        alg: alg_name.to_string(),
    })?;
    let encrypter = encrypter_for(jwk, alg)?;
    let mut header = JweHeader::new();
    header.set_token_type("JWT");
    header.set_content_type("JWT");
    header.set_content_encryption(content_encryption.as_str());
    if let Some(kid) = jwk.key_id() {
        header.set_key_id(kid);
    }
    josekit::jwe::serialize_compact(jws.as_bytes(), &header, &*encrypter).context(CryptoSnafu)
}

/// Unwraps a compact JWE with a private key, accepting only the listed
/// algorithms, and returns the inner payload as text.
pub(crate) fn decrypt(
    jwe: &str,
    jwk: &Jwk,
    allowed_key_algs: &[KeyEncAlg],
    allowed_content_algs: &[ContentEncAlg],
) -> Result<String, EnvelopeError> {
    let header = decode_header(jwe)?;
    let alg_name = header
        .get("alg")
        .and_then(Value::as_str)
        .ok_or(EnvelopeError::Malformed)?;
    let alg = KeyEncAlg::parse(alg_name).ok_or_else(|| EnvelopeError::UnsupportedAlgorithm {
        alg: alg_name.to_string(),
    })?;
    if !allowed_key_algs.contains(&alg) {
        return Err(EnvelopeError::DisallowedAlgorithm {
            alg: alg_name.to_string(),
        });
    }
    let enc_name = header
        .get("enc")
        .and_then(Value::as_str)
        .ok_or(EnvelopeError::Malformed)?;
    let enc = ContentEncAlg::parse(enc_name).ok_or_else(|| EnvelopeError::UnsupportedAlgorithm {
        alg: enc_name.to_string(),
    })?;
    if !allowed_content_algs.contains(&enc) {
        return Err(EnvelopeError::DisallowedAlgorithm {
            alg: enc_name.to_string(),
        });
    }
    let decrypter = decrypter_for(jwk, alg)?;
    let (payload, _) = josekit::jwe::deserialize_compact(jwe, &*decrypter).context(CryptoSnafu)?;
    String::from_utf8(payload).map_err(|_| EnvelopeError::Malformed)
}

/// The RFC 7638 SHA-256 thumbprint of a key, base64url encoded.
pub(crate) fn thumbprint_sha256(jwk: &Jwk) -> Result<String, EnvelopeError> {
    let param = |name: &'static str| -> Result<&str, EnvelopeError> {
        jwk.parameter(name)
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::InvalidClaim { name: "jwk" })
    };
    let canonical = match jwk.key_type() {
        "RSA" => format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, param("e")?, param("n")?),
        "EC" => format!(
            r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
            param("crv")?,
            param("x")?,
            param("y")?
        ),
        "OKP" => format!(
            r#"{{"crv":"{}","kty":"OKP","x":"{}"}}"#,
            param("crv")?,
            param("x")?
        ),
        "oct" => format!(r#"{{"k":"{}","kty":"oct"}}"#, param("k")?),
        _ => return Err(EnvelopeError::InvalidClaim { name: "kty" }),
    };
    Ok(sha256_b64url(canonical.as_bytes()))
}

/// Base64url SHA-256 digest of raw bytes.
#[must_use]
pub(crate) fn sha256_b64url(bytes: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(bytes))
}

/// Base64url SHA-1 digest of raw bytes.
#[must_use]
pub(crate) fn sha1_b64url(bytes: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(Sha1::digest(bytes))
}

/// The base64url left half of the digest selected by the signature
/// algorithm, used for `at_hash`, `c_hash` and `s_hash`.
#[must_use]
pub(crate) fn halved_hash(alg: SigAlg, value: &str) -> String {
    let digest: Vec<u8> = match alg {
        SigAlg::RS256 | SigAlg::PS256 | SigAlg::ES256 | SigAlg::HS256 => {
            Sha256::digest(value.as_bytes()).to_vec()
        }
        SigAlg::RS384 | SigAlg::PS384 | SigAlg::ES384 | SigAlg::HS384 => {
            Sha384::digest(value.as_bytes()).to_vec()
        }
        SigAlg::RS512 | SigAlg::PS512 | SigAlg::ES512 | SigAlg::HS512 | SigAlg::EdDSA => {
            Sha512::digest(value.as_bytes()).to_vec()
        }
    };
    BASE64_URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

/// A required string claim.
pub(crate) fn require_string<'a>(
    claims: &'a Map<String, Value>,
    name: &'static str,
) -> Result<&'a str, EnvelopeError> {
    claims
        .get(name)
        .ok_or(EnvelopeError::MissingClaim { name })?
        .as_str()
        .ok_or(EnvelopeError::InvalidClaim { name })
}

/// A required integer claim.
pub(crate) fn require_number(
    claims: &Map<String, Value>,
    name: &'static str,
) -> Result<i64, EnvelopeError> {
    claims
        .get(name)
        .ok_or(EnvelopeError::MissingClaim { name })?
        .as_i64()
        .ok_or(EnvelopeError::InvalidClaim { name })
}

/// The `aud` claim as a list, accepting both the string and array forms.
pub(crate) fn audience_list(claims: &Map<String, Value>) -> Vec<String> {
    match claims.get("aud") {
        Some(Value::String(aud)) => vec![aud.clone()],
        Some(Value::Array(auds)) => auds
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsa_signing_key(kid: &str) -> Jwk {
        let mut jwk = Jwk::generate_rsa_key(2048).unwrap();
        jwk.set_key_id(kid);
        jwk.set_algorithm("RS256");
        jwk.set_key_use("sig");
        jwk
    }

    #[test]
    fn test_sign_then_verify_round_trip() {
        let jwk = rsa_signing_key("sig-1");
        let mut claims = Map::new();
        claims.insert("iss".into(), Value::String("https://as.example.com".into()));
        claims.insert("sub".into(), Value::String("user-1".into()));

        let jws = sign(&claims, &jwk, "JWT").unwrap();
        assert_eq!(kind(&jws), Some(JoseKind::Jws));

        let verified = verify(&jws, &jwk, &[SigAlg::RS256]).unwrap();
        assert_eq!(verified, claims);
    }

    #[test]
    fn test_verify_enforces_allowlist() {
        let jwk = rsa_signing_key("sig-1");
        let claims = Map::new();
        let jws = sign(&claims, &jwk, "JWT").unwrap();

        let err = verify(&jws, &jwk, &[SigAlg::ES256]).unwrap_err();
        assert!(matches!(err, EnvelopeError::DisallowedAlgorithm { .. }));
    }

    #[test]
    fn test_encrypt_then_decrypt_round_trip() {
        let sig_jwk = rsa_signing_key("sig-1");
        let mut enc_jwk = Jwk::generate_rsa_key(2048).unwrap();
        enc_jwk.set_key_id("enc-1");
        enc_jwk.set_algorithm("RSA-OAEP-256");
        enc_jwk.set_key_use("enc");

        let mut claims = Map::new();
        claims.insert("code".into(), Value::String("abc".into()));
        let jws = sign(&claims, &sig_jwk, "JWT").unwrap();

        let jwe = encrypt(&jws, &enc_jwk, ContentEncAlg::A256Gcm).unwrap();
        assert_eq!(kind(&jwe), Some(JoseKind::Jwe));

        let inner = decrypt(
            &jwe,
            &enc_jwk,
            &[KeyEncAlg::RsaOaep256],
            &[ContentEncAlg::A256Gcm],
        )
        .unwrap();
        assert_eq!(inner, jws);

        let verified = verify(&inner, &sig_jwk, &[SigAlg::RS256]).unwrap();
        assert_eq!(verified, claims);
    }

    #[test]
    fn test_decrypt_rejects_disallowed_content_alg() {
        let sig_jwk = rsa_signing_key("sig-1");
        let mut enc_jwk = Jwk::generate_rsa_key(2048).unwrap();
        enc_jwk.set_key_id("enc-1");
        enc_jwk.set_algorithm("RSA-OAEP-256");

        let jws = sign(&Map::new(), &sig_jwk, "JWT").unwrap();
        let jwe = encrypt(&jws, &enc_jwk, ContentEncAlg::A256Gcm).unwrap();

        let err = decrypt(
            &jwe,
            &enc_jwk,
            &[KeyEncAlg::RsaOaep256],
            &[ContentEncAlg::A128CbcHs256],
        )
        .unwrap_err();
        assert!(matches!(err, EnvelopeError::DisallowedAlgorithm { .. }));
    }

    // Thumbprint vector from RFC 7638 §3.1.
    #[test]
    fn test_rfc7638_thumbprint_vector() {
        let mut map = Map::new();
        map.insert("kty".into(), Value::String("RSA".into()));
        map.insert("n".into(), Value::String(
            "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw".into(),
        ));
        map.insert("e".into(), Value::String("AQAB".into()));
        let jwk = Jwk::from_map(map).unwrap();
        assert_eq!(
            thumbprint_sha256(&jwk).unwrap(),
            "NzbLsXh8uDCcd-6MNwXF4W_7noWXFZAfHkxZsRGC9Xs"
        );
    }

    #[test]
    fn test_halved_hash_lengths() {
        // SHA-256 halves to 16 bytes, which is 22 base64url characters.
        assert_eq!(halved_hash(SigAlg::RS256, "dummy").len(), 22);
        // SHA-512 halves to 32 bytes, which is 43 characters.
        assert_eq!(halved_hash(SigAlg::PS512, "dummy").len(), 43);
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(kind("a.b.c"), Some(JoseKind::Jws));
        assert_eq!(kind("a.b.c.d.e"), Some(JoseKind::Jwe));
        assert_eq!(kind("a.b"), None);
        assert_eq!(kind(""), None);
        assert_eq!(kind("not a token"), None);
    }

    #[test]
    fn test_audience_list_forms() {
        let mut claims = Map::new();
        claims.insert("aud".into(), Value::String("one".into()));
        assert_eq!(audience_list(&claims), vec!["one"]);

        claims.insert(
            "aud".into(),
            Value::Array(vec!["one".into(), "two".into()]),
        );
        assert_eq!(audience_list(&claims), vec!["one", "two"]);

        claims.remove("aud");
        assert!(audience_list(&claims).is_empty());
    }
}
