//! Random token material and timestamps.
//!
//! All opaque values handed to clients are drawn from a fixed alphanumeric
//! charset with a cryptographically secure generator. Lengths are part of the
//! protocol contract: refresh tokens are exactly [`REFRESH_TOKEN_LENGTH`]
//! characters so introspection can tell them apart from opaque access tokens
//! by length alone.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng as _;

/// Length of the callback id used to resume a suspended authentication flow.
pub const CALLBACK_ID_LENGTH: usize = 20;
/// Length of the random suffix of a pushed `request_uri`.
pub const REQUEST_URI_LENGTH: usize = 20;
/// Length of authorization codes.
pub const AUTHORIZATION_CODE_LENGTH: usize = 30;
/// Authorization codes are only exchangeable for this long.
pub const AUTHORIZATION_CODE_LIFETIME_SECS: i64 = 60;
/// Refresh tokens have an unusual length so they are never confused with
/// opaque access tokens, which are identified by length during introspection.
pub const REFRESH_TOKEN_LENGTH: usize = 99;
/// Length of generated dynamic client ids.
pub const DYNAMIC_CLIENT_ID_LENGTH: usize = 30;
/// Length of generated client secrets. 64 characters keeps the secret usable
/// as an HMAC key up to HS512, which needs at least 512 bits.
pub const CLIENT_SECRET_LENGTH: usize = 64;
/// Length of registration access tokens minted during dynamic registration.
pub const REGISTRATION_TOKEN_LENGTH: usize = 50;
/// Default access token lifetime.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 300;
/// Default ID token lifetime.
pub const DEFAULT_ID_TOKEN_LIFETIME_SECS: i64 = 600;
/// Default lifetime of an in-flight authentication session.
pub const DEFAULT_AUTHN_SESSION_TIMEOUT_SECS: i64 = 30 * 60;
/// Default refresh token lifetime.
pub const DEFAULT_REFRESH_TOKEN_LIFETIME_SECS: i64 = 6000;
/// Form or request object members with this prefix survive into the
/// authentication session and are exposed to policies.
pub const PROTECTED_PARAM_PREFIX: &str = "p_";

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// The current Unix timestamp in seconds.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// A random string of `n` charset characters.
#[must_use]
pub(crate) fn random_string(n: usize) -> String {
    let mut rng = rand::rng();
    (0..n)
        .map(|_| char::from(CHARSET[rng.random_range(0..CHARSET.len())]))
        .collect()
}

pub(crate) fn session_id() -> String {
    random_string(30)
}

pub(crate) fn callback_id() -> String {
    random_string(CALLBACK_ID_LENGTH)
}

pub(crate) fn authorization_code() -> String {
    random_string(AUTHORIZATION_CODE_LENGTH)
}

pub(crate) fn request_uri() -> String {
    format!(
        "urn:ietf:params:oauth:request_uri:{}",
        random_string(REQUEST_URI_LENGTH)
    )
}

pub(crate) fn refresh_token() -> String {
    random_string(REFRESH_TOKEN_LENGTH)
}

pub(crate) fn client_id() -> String {
    random_string(DYNAMIC_CLIENT_ID_LENGTH)
}

pub(crate) fn client_secret() -> String {
    random_string(CLIENT_SECRET_LENGTH)
}

pub(crate) fn registration_token() -> String {
    random_string(REGISTRATION_TOKEN_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lengths() {
        assert_eq!(callback_id().len(), 20);
        assert_eq!(authorization_code().len(), 30);
        assert_eq!(refresh_token().len(), 99);
        assert_eq!(client_id().len(), 30);
        assert_eq!(client_secret().len(), 64);
        assert_eq!(registration_token().len(), 50);
    }

    #[test]
    fn test_request_uri_shape() {
        let uri = request_uri();
        let suffix = uri
            .strip_prefix("urn:ietf:params:oauth:request_uri:")
            .expect("urn prefix");
        assert_eq!(suffix.len(), REQUEST_URI_LENGTH);
    }

    #[test]
    fn test_randomness() {
        let values: std::collections::HashSet<_> =
            (0..100).map(|_| authorization_code()).collect();
        assert_eq!(values.len(), 100);
    }

    #[test]
    fn test_charset() {
        for ch in random_string(200).chars() {
            assert!(ch.is_ascii_alphanumeric());
        }
    }
}
