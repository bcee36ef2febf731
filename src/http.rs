//! Framework-agnostic request and response values.
//!
//! The engine never touches a socket. The host adapts whatever HTTP stack it
//! runs into a [`Request`], calls the provider, and writes the returned
//! [`Response`] back out. Client certificates validated by the host's TLS
//! stack (or a trusted proxy header) arrive as DER bytes on the request.

use std::collections::HashMap;

use base64::prelude::*;
use bon::Builder;
use http::{HeaderMap, Method, StatusCode};
use serde::Serialize;

/// An inbound HTTP request as seen by the engine.
#[derive(Debug, Clone, Builder)]
pub struct Request {
    /// The HTTP method.
    #[builder(default = Method::GET)]
    pub method: Method,
    /// The request path, including the configured endpoint prefix.
    #[builder(into)]
    pub path: String,
    /// Request headers.
    #[builder(default)]
    pub headers: HeaderMap,
    /// Decoded query parameters.
    #[builder(default)]
    pub query: HashMap<String, String>,
    /// Decoded `application/x-www-form-urlencoded` body parameters.
    #[builder(default)]
    pub form: HashMap<String, String>,
    /// Raw request body, used by endpoints that accept JSON.
    #[builder(into)]
    pub body: Option<String>,
    /// The validated client certificate in DER form, when the host
    /// terminated an mTLS connection for this request.
    pub client_cert: Option<Vec<u8>>,
}

impl Request {
    /// A single-valued header, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// A form parameter by name.
    #[must_use]
    pub fn form_param(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(String::as_str)
    }

    /// A query parameter by name.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// The credentials of an `Authorization: Basic` header.
    #[must_use]
    pub fn basic_auth(&self) -> Option<(String, String)> {
        let value = self.header("Authorization")?;
        let encoded = value.strip_prefix("Basic ")?;
        let decoded = BASE64_STANDARD.decode(encoded).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, password) = decoded.split_once(':')?;
        Some((user.to_string(), password.to_string()))
    }

    /// The `Authorization` header split into scheme and token.
    #[must_use]
    pub fn authorization_token(&self) -> Option<(&str, &str)> {
        let value = self.header("Authorization")?;
        let mut parts = value.splitn(2, ' ');
        let scheme = parts.next()?;
        let token = parts.next()?;
        if token.is_empty() {
            return None;
        }
        Some((scheme, token))
    }

    /// The bearer token of an `Authorization: Bearer` header.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        match self.authorization_token() {
            Some(("Bearer", token)) => Some(token),
            _ => None,
        }
    }

    /// The DPoP proof header. There must be exactly one value.
    #[must_use]
    pub fn dpop_proof(&self) -> Option<&str> {
        let mut values = self.headers.get_all("DPoP").iter();
        let first = values.next()?;
        if values.next().is_some() {
            return None;
        }
        first.to_str().ok()
    }
}

/// An outbound response produced by the engine.
#[derive(Debug, Clone)]
pub enum Response {
    /// A JSON body.
    Json {
        /// The HTTP status.
        status: StatusCode,
        /// The body document.
        body: serde_json::Value,
    },
    /// A compact JWT body with content type `application/jwt`.
    Jwt {
        /// The HTTP status.
        status: StatusCode,
        /// The serialized JWT.
        body: String,
    },
    /// A `303 See Other` redirect.
    Redirect {
        /// The target location.
        location: String,
    },
    /// An HTML page, used only for the `form_post` response mode.
    Html {
        /// The page body.
        body: String,
    },
    /// A bodyless status.
    Empty {
        /// The HTTP status.
        status: StatusCode,
    },
}

impl Response {
    /// A JSON response from any serializable value.
    ///
    /// Serialization failures degrade to an internal error body.
    #[must_use]
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self::Json { status, body },
            Err(err) => {
                tracing::error!(%err, "response serialization failed");
                Self::Json {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: serde_json::json!({
                        "error": "internal_error",
                        "error_description": "internal error",
                    }),
                }
            }
        }
    }

    /// A `200 OK` JSON response.
    #[must_use]
    pub fn ok_json<T: Serialize>(body: &T) -> Self {
        Self::json(StatusCode::OK, body)
    }

    /// A `303 See Other` redirect.
    #[must_use]
    pub fn see_other(location: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
        }
    }

    /// The status code this response will be written with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Json { status, .. } | Self::Jwt { status, .. } | Self::Empty { status } => {
                *status
            }
            Self::Redirect { .. } => StatusCode::SEE_OTHER,
            Self::Html { .. } => StatusCode::OK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_auth(value: &str) -> Request {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", value.parse().unwrap());
        Request::builder()
            .method(Method::POST)
            .path("/token")
            .headers(headers)
            .build()
    }

    #[test]
    fn test_basic_auth() {
        let encoded = BASE64_STANDARD.encode("c1:secret:with:colons");
        let req = request_with_auth(&format!("Basic {encoded}"));
        let (user, password) = req.basic_auth().unwrap();
        assert_eq!(user, "c1");
        assert_eq!(password, "secret:with:colons");
    }

    #[test]
    fn test_bearer_token() {
        let req = request_with_auth("Bearer opaque-token");
        assert_eq!(req.bearer_token(), Some("opaque-token"));

        let req = request_with_auth("DPoP opaque-token");
        assert_eq!(req.bearer_token(), None);
        assert_eq!(req.authorization_token(), Some(("DPoP", "opaque-token")));
    }

    #[test]
    fn test_single_dpop_header() {
        let mut headers = HeaderMap::new();
        headers.append("DPoP", "proof-1".parse().unwrap());
        let req = Request::builder()
            .path("/token")
            .headers(headers.clone())
            .build();
        assert_eq!(req.dpop_proof(), Some("proof-1"));

        headers.append("DPoP", "proof-2".parse().unwrap());
        let req = Request::builder().path("/token").headers(headers).build();
        assert_eq!(req.dpop_proof(), None);
    }
}
