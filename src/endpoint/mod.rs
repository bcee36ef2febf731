//! Endpoint dispatch.
//!
//! [`Provider`] is the host-facing entry point: it validates the
//! configuration once, then routes framework-agnostic requests to the
//! engines. Hosts with their own routing can still go through [`Provider::handle`]
//! with the path set accordingly; the mTLS listener reuses the same
//! dispatch with the client certificate attached to each request.

pub(crate) mod discovery;
pub(crate) mod introspection;
pub(crate) mod userinfo;

use std::sync::Arc;

use http::StatusCode;

use crate::authorize;
use crate::config::{Configuration, ConfigurationError, Context};
use crate::dcr;
use crate::error::Error;
use crate::http::{Request, Response};
use crate::token;

/// `GET /.well-known/openid-configuration`
pub(crate) const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";
/// `GET /jwks`
pub(crate) const JWKS_PATH: &str = "/jwks";
/// `POST /par`
pub(crate) const PAR_PATH: &str = "/par";
/// `GET /authorize` and `POST /authorize/{callback_id}`
pub(crate) const AUTHORIZE_PATH: &str = "/authorize";
/// `POST /token`
pub(crate) const TOKEN_PATH: &str = "/token";
/// `GET|POST /userinfo`
pub(crate) const USERINFO_PATH: &str = "/userinfo";
/// `POST /register` and `GET|PUT|DELETE /register/{client_id}`
pub(crate) const REGISTER_PATH: &str = "/register";
/// `POST /introspect`
pub(crate) const INTROSPECT_PATH: &str = "/introspect";

/// An embeddable authorization server for one issuer.
pub struct Provider {
    config: Arc<Configuration>,
}

impl Provider {
    /// Validates the configuration and wraps it for serving.
    pub fn new(config: Configuration) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Dispatches one request and always produces a response; protocol
    /// errors become their defined wire shapes.
    pub async fn handle(&self, request: Request) -> Response {
        let ctx = Context {
            config: &self.config,
            request: &request,
        };

        let Some(path) = request
            .path
            .strip_prefix(self.config.endpoint_prefix.as_str())
            .map(str::to_string)
        else {
            return not_found();
        };

        let result = self.route(&ctx, &path).await;
        match result {
            Ok(Some(response)) => response,
            Ok(None) => not_found(),
            Err(error) => self.error_response(&ctx, error),
        }
    }

    async fn route(
        &self,
        ctx: &Context<'_>,
        path: &str,
    ) -> Result<Option<Response>, Error> {
        let method = ctx.request.method.as_str();

        let response = match (method, path) {
            ("GET", WELL_KNOWN_PATH) => discovery::metadata(ctx),
            ("GET", JWKS_PATH) => Response::ok_json(&self.config.key_ring.public_jwks()),
            ("POST", PAR_PATH) if self.config.par_enabled => authorize::par::push(ctx).await?,
            ("GET", AUTHORIZE_PATH) => authorize::init(ctx).await?,
            ("POST", _) if path.starts_with("/authorize/") => {
                let callback_id = &path["/authorize/".len()..];
                authorize::resume(ctx, callback_id).await?
            }
            ("POST", TOKEN_PATH) => token::handle(ctx).await?,
            ("GET" | "POST", USERINFO_PATH) => userinfo::handle(ctx).await?,
            ("POST", INTROSPECT_PATH) if self.config.introspection_enabled => {
                introspection::introspect(ctx).await?
            }
            ("POST", REGISTER_PATH) if self.config.dcr_enabled => dcr::create(ctx).await?,
            (_, _) if self.config.dcr_enabled && path.starts_with("/register/") => {
                let client_id = &path["/register/".len()..];
                match method {
                    "GET" => dcr::get(ctx, client_id).await?,
                    "PUT" => dcr::update(ctx, client_id).await?,
                    "DELETE" => dcr::delete(ctx, client_id).await?,
                    _ => return Ok(None),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(response))
    }

    fn error_response(&self, ctx: &Context<'_>, error: Error) -> Response {
        self.config.hooks.notify_error(ctx.request, &error);
        if let Some(rendered) = self.config.hooks.render_error(ctx.request, &error) {
            return rendered;
        }
        Response::Json {
            status: error.code.status(),
            body: error.to_json(),
        }
    }
}

fn not_found() -> Response {
    Response::Json {
        status: StatusCode::NOT_FOUND,
        body: serde_json::json!({
            "error": "invalid_request",
            "error_description": "unknown endpoint",
        }),
    }
}
