//! The server's private key ring.
//!
//! Keys are loaded once from a JWKS document at boot. Every key must carry a
//! `kid`, a `use` and an `alg`; selection happens by key id, or by algorithm
//! for features where clients pick algorithms rather than keys. When several
//! keys share an algorithm, algorithm lookup takes the first match, so such
//! configurations are rejected by the boot validator for the features that
//! select by algorithm.

use josekit::jwk::Jwk;
use serde_json::{Map, Value};
use snafu::Snafu;

use crate::jose::{KeyEncAlg, SigAlg};

/// The declared purpose of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUse {
    /// Signature keys, `use: sig`.
    Signature,
    /// Encryption keys, `use: enc`.
    Encryption,
}

impl KeyUse {
    /// The wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Signature => "sig",
            Self::Encryption => "enc",
        }
    }
}

/// Errors raised while loading the key ring.
#[derive(Debug, Snafu)]
pub enum KeyRingError {
    /// The JWKS document is not valid JSON or lacks a `keys` array.
    #[snafu(display("the JWKS document is malformed"))]
    MalformedDocument,
    /// A member of `keys` is not a valid JWK.
    #[snafu(display("key {index} in the JWKS is not a valid JWK"))]
    MalformedKey {
        /// Zero-based position in the `keys` array.
        index: usize,
    },
    /// A key misses one of the required parameters.
    #[snafu(display("key {kid} must declare kid, use and alg"))]
    IncompleteKey {
        /// The key id, or a placeholder when absent.
        kid: String,
    },
    /// Two keys share a key id.
    #[snafu(display("key id {kid} appears more than once"))]
    DuplicateKeyId {
        /// The duplicated key id.
        kid: String,
    },
}

/// The set of private keys the server signs and decrypts with.
#[derive(Debug, Clone)]
pub struct KeyRing {
    keys: Vec<Jwk>,
}

impl KeyRing {
    /// Loads a key ring from a private JWKS document.
    pub fn from_jwks(document: &Value) -> Result<Self, KeyRingError> {
        let members = document
            .get("keys")
            .and_then(Value::as_array)
            .ok_or(KeyRingError::MalformedDocument)?;

        let mut keys = Vec::with_capacity(members.len());
        for (index, member) in members.iter().enumerate() {
            let map = member
                .as_object()
                .ok_or(KeyRingError::MalformedKey { index })?;
            let jwk = Jwk::from_map(map.clone())
                .map_err(|_| KeyRingError::MalformedKey { index })?;
            if jwk.key_id().is_none() || jwk.key_use().is_none() || jwk.algorithm().is_none() {
                return Err(KeyRingError::IncompleteKey {
                    kid: jwk.key_id().unwrap_or("<missing>").to_string(),
                });
            }
            keys.push(jwk);
        }

        for (i, key) in keys.iter().enumerate() {
            let kid = key.key_id().unwrap_or_default();
            if keys[i + 1..].iter().any(|k| k.key_id() == Some(kid)) {
                return Err(KeyRingError::DuplicateKeyId {
                    kid: kid.to_string(),
                });
            }
        }

        Ok(Self { keys })
    }

    /// Builds a key ring from already parsed keys. Used by tests and by
    /// hosts that assemble keys programmatically.
    pub fn from_keys(keys: Vec<Jwk>) -> Result<Self, KeyRingError> {
        let document = Value::Object({
            let mut root = Map::new();
            root.insert(
                "keys".into(),
                Value::Array(keys.iter().map(jwk_to_value).collect()),
            );
            root
        });
        Self::from_jwks(&document)
    }

    /// The key with the given id.
    #[must_use]
    pub fn by_kid(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.key_id() == Some(kid))
    }

    /// The first key with the given algorithm and purpose.
    #[must_use]
    pub fn by_alg(&self, alg: &str, key_use: KeyUse) -> Option<&Jwk> {
        self.keys
            .iter()
            .find(|k| k.algorithm() == Some(alg) && k.key_use() == Some(key_use.as_str()))
    }

    /// All keys, private parameters included.
    #[must_use]
    pub fn keys(&self) -> &[Jwk] {
        &self.keys
    }

    /// The distinct signature algorithms across signing keys.
    #[must_use]
    pub fn signing_algorithms(&self) -> Vec<SigAlg> {
        let mut algs = Vec::new();
        for key in &self.keys {
            if key.key_use() != Some(KeyUse::Signature.as_str()) {
                continue;
            }
            if let Some(alg) = key.algorithm().and_then(SigAlg::parse) {
                if !algs.contains(&alg) {
                    algs.push(alg);
                }
            }
        }
        algs
    }

    /// The distinct key management algorithms across encryption keys.
    #[must_use]
    pub fn key_encryption_algorithms(&self) -> Vec<KeyEncAlg> {
        let mut algs = Vec::new();
        for key in &self.keys {
            if key.key_use() != Some(KeyUse::Encryption.as_str()) {
                continue;
            }
            if let Some(alg) = key.algorithm().and_then(KeyEncAlg::parse) {
                if !algs.contains(&alg) {
                    algs.push(alg);
                }
            }
        }
        algs
    }

    /// The public JWKS document, private parameters stripped.
    #[must_use]
    pub fn public_jwks(&self) -> Value {
        let keys: Vec<Value> = self.keys.iter().map(public_view).collect();
        let mut root = Map::new();
        root.insert("keys".into(), Value::Array(keys));
        Value::Object(root)
    }
}

fn jwk_to_value(jwk: &Jwk) -> Value {
    let mut map = Map::new();
    map.insert("kty".into(), Value::String(jwk.key_type().to_string()));
    for name in [
        "kid", "use", "alg", "crv", "x", "y", "d", "n", "e", "p", "q", "dp", "dq", "qi", "k",
        "x5c", "x5t", "x5t#S256",
    ] {
        if let Some(value) = jwk.parameter(name) {
            map.insert(name.into(), value.clone());
        }
    }
    Value::Object(map)
}

fn public_view(jwk: &Jwk) -> Value {
    let mut map = Map::new();
    map.insert("kty".into(), Value::String(jwk.key_type().to_string()));
    let public_params: &[&str] = match jwk.key_type() {
        "RSA" => &["n", "e"],
        "EC" => &["crv", "x", "y"],
        "OKP" => &["crv", "x"],
        _ => &[],
    };
    for name in ["kid", "use", "alg"].iter().chain(public_params) {
        if let Some(value) = jwk.parameter(name) {
            map.insert((*name).into(), value.clone());
        }
    }
    Value::Object(map)
}
