//! Error types surfaced on the wire.
//!
//! Every protocol failure carries a stable OAuth error code and a human
//! readable description. The HTTP status is derived from the code, so
//! transports never have to map errors themselves.

use http::StatusCode;
use serde::Serialize;
use snafu::Snafu;

/// Stable OAuth 2.0 / OpenID Connect error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    /// The resource owner or server denied the request.
    #[serde(rename = "access_denied")]
    AccessDenied,
    /// Client authentication failed.
    #[serde(rename = "invalid_client")]
    InvalidClient,
    /// The grant (code, refresh token, binding proof) is invalid or expired.
    #[serde(rename = "invalid_grant")]
    InvalidGrant,
    /// The request is malformed or missing a required parameter.
    #[serde(rename = "invalid_request")]
    InvalidRequest,
    /// The client is not allowed to use this grant or response type.
    #[serde(rename = "unauthorized_client")]
    UnauthorizedClient,
    /// The requested scope is invalid or exceeds what was granted.
    #[serde(rename = "invalid_scope")]
    InvalidScope,
    /// The requested authorization details are not acceptable.
    #[serde(rename = "invalid_authorization_details")]
    InvalidAuthorizationDetails,
    /// The grant type is not supported by this server.
    #[serde(rename = "unsupported_grant_type")]
    UnsupportedGrantType,
    /// The JAR request object could not be parsed or verified.
    #[serde(rename = "invalid_request_object")]
    InvalidRequestObject,
    /// The presented token is invalid.
    #[serde(rename = "invalid_token")]
    InvalidToken,
    /// The redirect URI is missing, malformed or not registered.
    #[serde(rename = "invalid_redirect_uri")]
    InvalidRedirectUri,
    /// Dynamic client metadata failed validation.
    #[serde(rename = "invalid_client_metadata")]
    InvalidClientMetadata,
    /// Something went wrong on the server side.
    #[serde(rename = "internal_error")]
    InternalError,
}

impl ErrorCode {
    /// The wire representation of the code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessDenied => "access_denied",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidRequest => "invalid_request",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::InvalidScope => "invalid_scope",
            Self::InvalidAuthorizationDetails => "invalid_authorization_details",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidRequestObject => "invalid_request_object",
            Self::InvalidToken => "invalid_token",
            Self::InvalidRedirectUri => "invalid_redirect_uri",
            Self::InvalidClientMetadata => "invalid_client_metadata",
            Self::InternalError => "internal_error",
        }
    }

    /// The HTTP status conveyed alongside the code.
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::InvalidClient | Self::InvalidToken | Self::UnauthorizedClient => {
                StatusCode::UNAUTHORIZED
            }
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// A protocol error as returned to callers.
#[derive(Debug, Clone, Snafu)]
#[snafu(display("{}: {}", code.as_str(), description))]
pub struct Error {
    /// The stable error code.
    pub code: ErrorCode,
    /// A description suitable for the `error_description` member.
    pub description: String,
}

impl Error {
    /// Creates an error with the given code and description.
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    /// Wraps an unexpected failure as `internal_error`.
    ///
    /// The cause is logged but never leaks to the caller.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        tracing::error!(%cause, "internal error");
        Self {
            code: ErrorCode::InternalError,
            description: "internal error".into(),
        }
    }

    /// The JSON body for this error.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.code.as_str(),
            "error_description": self.description,
        })
    }
}
