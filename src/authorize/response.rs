//! Authorization response carriers.
//!
//! Turns the outcome of a flow (success parameters or an error) into the
//! negotiated carrier: query or fragment components of a redirect, an
//! auto-submitting form, or a JARM JWT in any of the three.

use serde_json::{Map, Value};
use url::Url;

use crate::client::Client;
use crate::config::Context;
use crate::error::{Error, ErrorCode};
use crate::jose::{self, ContentEncAlg};
use crate::http::Response;
use crate::material;
use crate::oauth::{claims, AuthorizationParameters, TokenType};

/// The parameters carried back to the client on the redirect.
#[derive(Debug, Default)]
pub(crate) struct RedirectParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub access_token: Option<String>,
    pub token_type: Option<TokenType>,
    pub expires_in: Option<i64>,
    pub id_token: Option<String>,
    pub error: Option<ErrorCode>,
    pub error_description: Option<String>,
}

impl RedirectParams {
    pub(crate) fn from_error(error: &Error, state: Option<&str>) -> Self {
        Self {
            state: state.map(str::to_string),
            error: Some(error.code),
            error_description: Some(error.description.clone()),
            ..Self::default()
        }
    }

    fn into_pairs(self, issuer: Option<&str>) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(code) = self.code {
            pairs.push(("code".into(), code));
        }
        if let Some(access_token) = self.access_token {
            pairs.push(("access_token".into(), access_token));
        }
        if let Some(token_type) = self.token_type {
            let name = match token_type {
                TokenType::Bearer => "Bearer",
                TokenType::DPoP => "DPoP",
            };
            pairs.push(("token_type".into(), name.into()));
        }
        if let Some(expires_in) = self.expires_in {
            pairs.push(("expires_in".into(), expires_in.to_string()));
        }
        if let Some(id_token) = self.id_token {
            pairs.push(("id_token".into(), id_token));
        }
        if let Some(error) = self.error {
            pairs.push(("error".into(), error.as_str().into()));
        }
        if let Some(description) = self.error_description {
            pairs.push(("error_description".into(), description));
        }
        if let Some(state) = self.state {
            pairs.push(("state".into(), state));
        }
        if let Some(issuer) = issuer {
            pairs.push(("iss".into(), issuer.into()));
        }
        pairs
    }
}

/// Sends flow results back to the client via the negotiated response mode.
pub(crate) async fn respond(
    ctx: &Context<'_>,
    client: &Client,
    params: &AuthorizationParameters,
    redirect: RedirectParams,
) -> Result<Response, Error> {
    let redirect_uri = params
        .redirect_uri
        .as_deref()
        .ok_or_else(|| Error::new(ErrorCode::InvalidRequest, "missing redirect_uri"))?;

    let issuer = ctx
        .config
        .issuer_response_param_enabled
        .then_some(ctx.config.host.as_str());
    let mode = params.negotiated_response_mode();

    let pairs = if mode.is_jarm() {
        let jarm = jarm_response(ctx, client, redirect.into_pairs(issuer)).await?;
        vec![("response".to_string(), jarm)]
    } else {
        redirect.into_pairs(issuer)
    };

    if mode.is_form_post() {
        return Ok(Response::Html {
            body: form_post_page(redirect_uri, &pairs),
        });
    }

    let mut url = Url::parse(redirect_uri)
        .map_err(|_| Error::new(ErrorCode::InvalidRequest, "invalid redirect_uri"))?;
    if mode.is_query() {
        for (name, value) in &pairs {
            url.query_pairs_mut().append_pair(name, value);
        }
    } else {
        let fragment: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter().map(|(n, v)| (n.as_str(), v.as_str())))
            .finish();
        url.set_fragment(Some(&fragment));
    }
    Ok(Response::see_other(url.as_str()))
}

/// Carries an error to the client on the redirect, or as JSON when the
/// request never established a trustworthy redirect URI.
pub(crate) async fn redirect_error(
    ctx: &Context<'_>,
    client: &Client,
    params: &AuthorizationParameters,
    error: Error,
) -> Result<Response, Error> {
    if params.redirect_uri.is_none() {
        return Err(error);
    }
    tracing::debug!(code = error.code.as_str(), "redirecting flow error");
    let redirect = RedirectParams::from_error(&error, params.state.as_deref());
    respond(ctx, client, params, redirect).await
}

/// Signs (and optionally encrypts) the response parameters as a JARM JWT.
async fn jarm_response(
    ctx: &Context<'_>,
    client: &Client,
    pairs: Vec<(String, String)>,
) -> Result<String, Error> {
    if !ctx.config.jarm_enabled {
        return Err(Error::new(
            ErrorCode::InvalidRequest,
            "jarm response modes are not supported",
        ));
    }

    let now = material::unix_now();
    let mut body = Map::new();
    body.insert(claims::ISSUER.into(), Value::String(ctx.config.host.clone()));
    body.insert(claims::AUDIENCE.into(), Value::String(client.id.clone()));
    body.insert(claims::ISSUED_AT.into(), Value::from(now));
    body.insert(
        claims::EXPIRY.into(),
        Value::from(now + ctx.config.jarm_lifetime_secs),
    );
    for (name, value) in pairs {
        body.insert(name, Value::String(value));
    }

    let key = ctx.config.jarm_sig_key_for(client)?;
    let jws = jose::sign(&body, key, "JWT").map_err(Error::internal)?;

    let Some(key_enc_alg) = client.metadata.jarm_key_enc_alg else {
        return Ok(jws);
    };
    if !ctx.config.jarm_encryption_enabled {
        return Ok(jws);
    }

    let content_enc = client
        .metadata
        .jarm_content_enc_alg
        .unwrap_or(ContentEncAlg::A128CbcHs256);
    let enc_jwk = client.encryption_jwk(ctx.http_client(), key_enc_alg).await?;
    jose::encrypt(&jws, &enc_jwk, content_enc).map_err(Error::internal)
}

fn form_post_page(action: &str, pairs: &[(String, String)]) -> String {
    let mut inputs = String::new();
    for (name, value) in pairs {
        inputs.push_str(&format!(
            r#"<input type="hidden" name="{}" value="{}"/>"#,
            escape_html(name),
            escape_html(value)
        ));
    }
    format!(
        concat!(
            "<!DOCTYPE html><html><head><title>Authorization response</title></head>",
            "<body onload=\"document.forms[0].submit()\">",
            "<form method=\"post\" action=\"{}\">{}</form>",
            "</body></html>"
        ),
        escape_html(action),
        inputs
    )
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_order_and_content() {
        let redirect = RedirectParams {
            code: Some("abc".into()),
            state: Some("xyz".into()),
            ..Default::default()
        };
        let pairs = redirect.into_pairs(Some("https://as.example.com"));
        assert_eq!(
            pairs,
            vec![
                ("code".to_string(), "abc".to_string()),
                ("state".to_string(), "xyz".to_string()),
                ("iss".to_string(), "https://as.example.com".to_string()),
            ]
        );
    }

    #[test]
    fn test_error_pairs() {
        let error = Error::new(ErrorCode::AccessDenied, "denied");
        let pairs = RedirectParams::from_error(&error, Some("xyz")).into_pairs(None);
        assert_eq!(
            pairs,
            vec![
                ("error".to_string(), "access_denied".to_string()),
                ("error_description".to_string(), "denied".to_string()),
                ("state".to_string(), "xyz".to_string()),
            ]
        );
    }

    #[test]
    fn test_form_post_page_escapes_values() {
        let page = form_post_page(
            "https://c1/cb",
            &[("state".to_string(), "a\"b<c>".to_string())],
        );
        assert!(page.contains("action=\"https://c1/cb\""));
        assert!(page.contains("a&quot;b&lt;c&gt;"));
        assert!(page.contains("document.forms[0].submit()"));
    }
}
