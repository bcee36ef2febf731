//! Implements an embeddable OpenID Connect 1.0 / `OAuth2` authorization
//! server engine.
//!
//! The host application supplies persistence ([`storage`]), user
//! authentication ([`policy`]) and optional behavior overrides ([`hooks`]);
//! this crate owns protocol correctness: the authorization state machine
//! with pushed and JWT-secured requests, the token issuance pipeline with
//! PKCE and sender-constrained tokens, client authentication, dynamic
//! registration, discovery and introspection.
//!
//! The engine never opens a socket. Adapt your HTTP stack into a
//! [`Request`], hand it to [`Provider::handle`], and write the returned
//! [`Response`] back out. An mTLS listener is the same dispatch with the
//! validated peer certificate attached to each request.

#![forbid(unsafe_code)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod hooks;
pub mod jose;
pub mod keys;
pub mod oauth;
pub mod policy;
pub mod storage;

mod authorize;
mod dcr;
mod endpoint;
mod error;
mod http;
mod material;
mod session;
mod token;

pub use config::{Configuration, ConfigurationError};
pub use endpoint::Provider;
pub use error::{Error, ErrorCode};
pub use http::{Request, Response};
pub use session::{AuthnSession, GrantSession};

pub use material::{
    AUTHORIZATION_CODE_LENGTH, AUTHORIZATION_CODE_LIFETIME_SECS, CALLBACK_ID_LENGTH,
    CLIENT_SECRET_LENGTH, DEFAULT_ID_TOKEN_LIFETIME_SECS, DEFAULT_TOKEN_LIFETIME_SECS,
    DYNAMIC_CLIENT_ID_LENGTH, PROTECTED_PARAM_PREFIX, REFRESH_TOKEN_LENGTH,
    REGISTRATION_TOKEN_LENGTH, REQUEST_URI_LENGTH,
};

/// Re-export of the JWK types the configuration and client records build on.
pub mod jwk {
    pub use josekit::jwk::{Jwk, JwkSet};
}
