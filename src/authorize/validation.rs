//! Authorization request validation.
//!
//! The redirect URI is checked first; until it passes, errors must not be
//! redirected anywhere. Everything after that travels back to the client on
//! the negotiated response mode.

use super::FlowError;
use crate::client::Client;
use crate::config::Context;
use crate::error::{Error, ErrorCode};
use crate::oauth::{
    scopes_contain_openid, AuthorizationParameters, CodeChallengeMethod, GrantType, ResponseType,
};

type Validator = fn(&Context<'_>, &Client, &AuthorizationParameters) -> Result<(), Error>;

/// Validates a complete (merged) authorization request.
pub(crate) fn validate(
    ctx: &Context<'_>,
    client: &Client,
    params: &AuthorizationParameters,
) -> Result<(), FlowError> {
    validate_redirect_uri(ctx, client, params).map_err(FlowError::Plain)?;

    let validators: &[Validator] = &[
        validate_response_type,
        validate_response_mode,
        validate_scopes,
        validate_pkce,
        validate_claims_param,
        validate_authorization_details,
        validate_display,
    ];
    for validator in validators {
        validator(ctx, client, params)
            .map_err(|err| FlowError::Redirect(err, Box::new(params.clone())))?;
    }
    Ok(())
}

/// Validates pushed parameters. Only members that were actually pushed are
/// checked; the merged request is validated in full when the flow starts.
pub(crate) fn validate_pushed(
    ctx: &Context<'_>,
    client: &Client,
    params: &AuthorizationParameters,
) -> Result<(), Error> {
    if params.request_uri.is_some() {
        return Err(Error::new(
            ErrorCode::InvalidRequest,
            "request_uri must not be sent to the pushed authorization endpoint",
        ));
    }
    if let Some(redirect_uri) = &params.redirect_uri {
        if !client.is_redirect_uri_allowed(redirect_uri) {
            return Err(Error::new(ErrorCode::InvalidRequest, "invalid redirect_uri"));
        }
    }
    if params.response_type.is_some() {
        validate_response_type(ctx, client, params)?;
    }
    if params.scopes.is_some() {
        validate_scopes(ctx, client, params)?;
    }
    if params.authorization_details.is_some() {
        validate_authorization_details(ctx, client, params)?;
    }
    Ok(())
}

fn validate_redirect_uri(
    _ctx: &Context<'_>,
    client: &Client,
    params: &AuthorizationParameters,
) -> Result<(), Error> {
    let redirect_uri = params
        .redirect_uri
        .as_deref()
        .ok_or_else(|| Error::new(ErrorCode::InvalidRequest, "redirect_uri is required"))?;
    if !client.is_redirect_uri_allowed(redirect_uri) {
        return Err(Error::new(ErrorCode::InvalidRequest, "invalid redirect_uri"));
    }
    Ok(())
}

fn validate_response_type(
    ctx: &Context<'_>,
    client: &Client,
    params: &AuthorizationParameters,
) -> Result<(), Error> {
    let response_type = params
        .response_type
        .ok_or_else(|| Error::new(ErrorCode::InvalidRequest, "response_type is required"))?;

    if !ctx.config.response_types.contains(&response_type) {
        return Err(Error::new(
            ErrorCode::InvalidRequest,
            "response_type not supported",
        ));
    }
    if !client.is_response_type_allowed(response_type) {
        return Err(Error::new(
            ErrorCode::UnauthorizedClient,
            "response_type not allowed for the client",
        ));
    }
    if response_type.contains_code() && !client.is_grant_allowed(GrantType::AuthorizationCode) {
        return Err(Error::new(
            ErrorCode::UnauthorizedClient,
            "the client is not allowed the authorization_code grant",
        ));
    }
    if response_type.contains_token() {
        if !ctx.config.grant_types.contains(&GrantType::Implicit) {
            return Err(Error::new(
                ErrorCode::InvalidRequest,
                "the implicit grant is not supported",
            ));
        }
        if !client.is_grant_allowed(GrantType::Implicit) {
            return Err(Error::new(
                ErrorCode::UnauthorizedClient,
                "the client is not allowed the implicit grant",
            ));
        }
    }
    if response_type.contains_id_token() {
        let scopes = params.scopes.as_deref().unwrap_or_default();
        if !scopes_contain_openid(scopes) {
            return Err(Error::new(
                ErrorCode::InvalidScope,
                "the openid scope is required for id_token response types",
            ));
        }
        if params.nonce.is_none() {
            return Err(Error::new(
                ErrorCode::InvalidRequest,
                "nonce is required for id_token response types",
            ));
        }
    }
    Ok(())
}

fn validate_response_mode(
    ctx: &Context<'_>,
    _client: &Client,
    params: &AuthorizationParameters,
) -> Result<(), Error> {
    let Some(mode) = params.response_mode else {
        return Ok(());
    };
    if mode.is_jarm() && !ctx.config.jarm_enabled {
        return Err(Error::new(
            ErrorCode::InvalidRequest,
            "jarm response modes are not supported",
        ));
    }
    if !ctx.config.is_response_mode_supported(mode) {
        return Err(Error::new(
            ErrorCode::InvalidRequest,
            "response_mode not supported",
        ));
    }
    Ok(())
}

fn validate_scopes(
    ctx: &Context<'_>,
    client: &Client,
    params: &AuthorizationParameters,
) -> Result<(), Error> {
    let scopes = params.scopes.as_deref().unwrap_or_default();
    if ctx.config.open_id_scope_required && !scopes_contain_openid(scopes) {
        return Err(Error::new(
            ErrorCode::InvalidScope,
            "the openid scope is required",
        ));
    }
    if !ctx.config.are_scopes_known(scopes) {
        return Err(Error::new(ErrorCode::InvalidScope, "invalid scope"));
    }
    if !client.are_scopes_allowed(&ctx.config.scopes, scopes) {
        return Err(Error::new(
            ErrorCode::InvalidScope,
            "scope not allowed for the client",
        ));
    }
    Ok(())
}

fn validate_pkce(
    ctx: &Context<'_>,
    _client: &Client,
    params: &AuthorizationParameters,
) -> Result<(), Error> {
    if params.code_challenge.is_some() && !ctx.config.pkce_enabled {
        return Err(Error::new(
            ErrorCode::InvalidRequest,
            "pkce is not supported",
        ));
    }

    let wants_code = params.response_type.is_some_and(ResponseType::contains_code);
    if ctx.config.pkce_required && wants_code && params.code_challenge.is_none() {
        return Err(Error::new(
            ErrorCode::InvalidRequest,
            "code_challenge is required",
        ));
    }

    if params.code_challenge.is_some() {
        let method = params
            .code_challenge_method
            .unwrap_or(CodeChallengeMethod::Plain);
        if !ctx.config.code_challenge_methods.contains(&method) {
            return Err(Error::new(
                ErrorCode::InvalidRequest,
                "code_challenge_method not supported",
            ));
        }
    }
    Ok(())
}

fn validate_claims_param(
    ctx: &Context<'_>,
    _client: &Client,
    params: &AuthorizationParameters,
) -> Result<(), Error> {
    if params.claims.is_some() && !ctx.config.claims_param_enabled {
        return Err(Error::new(
            ErrorCode::InvalidRequest,
            "the claims parameter is not supported",
        ));
    }
    Ok(())
}

fn validate_authorization_details(
    ctx: &Context<'_>,
    client: &Client,
    params: &AuthorizationParameters,
) -> Result<(), Error> {
    let Some(details) = &params.authorization_details else {
        return Ok(());
    };
    if !ctx.config.auth_details_enabled {
        return Err(Error::new(
            ErrorCode::InvalidAuthorizationDetails,
            "authorization_details is not supported",
        ));
    }
    for detail in details {
        let Some(detail_type) = detail.detail_type() else {
            return Err(Error::new(
                ErrorCode::InvalidAuthorizationDetails,
                "authorization detail type is required",
            ));
        };
        if !ctx.config.auth_detail_types.iter().any(|t| t == detail_type) {
            return Err(Error::new(
                ErrorCode::InvalidAuthorizationDetails,
                "authorization detail type not supported",
            ));
        }
        if let Some(allowed) = &client.metadata.authorization_detail_types {
            if !allowed.iter().any(|t| t == detail_type) {
                return Err(Error::new(
                    ErrorCode::InvalidAuthorizationDetails,
                    "authorization detail type not allowed for the client",
                ));
            }
        }
    }
    Ok(())
}

fn validate_display(
    ctx: &Context<'_>,
    _client: &Client,
    params: &AuthorizationParameters,
) -> Result<(), Error> {
    if let Some(display) = params.display {
        if !ctx.config.display_values.contains(&display) {
            return Err(Error::new(
                ErrorCode::InvalidRequest,
                "display value not supported",
            ));
        }
    }
    Ok(())
}
