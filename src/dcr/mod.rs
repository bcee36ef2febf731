//! Dynamic client registration and management, RFC 7591 / RFC 7592.

pub(crate) mod validation;

use http::StatusCode;
use secrecy::SecretString;
use serde::Serialize;

use crate::client::{Client, ClientMetadata};
use crate::config::Context;
use crate::error::{Error, ErrorCode};
use crate::http::Response;
use crate::material;
use crate::oauth::ClientAuthnMethod;

#[derive(Debug, Serialize)]
struct RegistrationResponse {
    client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    registration_access_token: Option<String>,
    registration_client_uri: String,
    #[serde(flatten)]
    metadata: ClientMetadata,
}

/// Handles `POST /register`.
pub(crate) async fn create(ctx: &Context<'_>) -> Result<Response, Error> {
    let initial_token = ctx.request.bearer_token();
    ctx.config
        .hooks
        .validate_initial_access_token(ctx.request, initial_token)
        .await?;

    let mut metadata = parse_metadata(ctx)?;
    ctx.config
        .hooks
        .handle_dynamic_client(ctx.request, &mut metadata)
        .await?;
    validation::validate_metadata(ctx, &metadata)?;

    let id = material::client_id();
    let secret = needs_secret(metadata.authn_method).then(material::client_secret);
    let registration_token = material::registration_token();

    let mut client = Client::new(&id, metadata);
    if let Some(secret) = &secret {
        client.hashed_secret = Some(hash(secret)?);
        client.secret = Some(SecretString::from(secret.clone()));
    }
    client.registration_token_hash = Some(hash(&registration_token)?);

    let response = RegistrationResponse {
        client_id: id.clone(),
        client_secret: secret,
        registration_access_token: Some(registration_token),
        registration_client_uri: registration_uri(ctx, &id),
        metadata: client.metadata.clone(),
    };
    ctx.save_client(client).await?;

    tracing::info!(client_id = %id, "dynamic client registered");
    Ok(Response::json(StatusCode::CREATED, &response))
}

/// Handles `GET /register/{client_id}`.
pub(crate) async fn get(ctx: &Context<'_>, client_id: &str) -> Result<Response, Error> {
    let client = authorize_registration(ctx, client_id).await?;
    Ok(Response::ok_json(&RegistrationResponse {
        client_id: client.id.clone(),
        client_secret: None,
        registration_access_token: None,
        registration_client_uri: registration_uri(ctx, &client.id),
        metadata: client.metadata,
    }))
}

/// Handles `PUT /register/{client_id}`. Credentials survive the update;
/// the registration access token rotates when so configured, at which point
/// the presented token stops working.
pub(crate) async fn update(ctx: &Context<'_>, client_id: &str) -> Result<Response, Error> {
    let mut client = authorize_registration(ctx, client_id).await?;

    let mut metadata = parse_metadata(ctx)?;
    ctx.config
        .hooks
        .handle_dynamic_client(ctx.request, &mut metadata)
        .await?;
    validation::validate_metadata(ctx, &metadata)?;

    client.metadata = metadata;
    let rotated_token = if ctx.config.rotate_registration_tokens {
        let token = material::registration_token();
        client.registration_token_hash = Some(hash(&token)?);
        Some(token)
    } else {
        None
    };

    let response = RegistrationResponse {
        client_id: client.id.clone(),
        client_secret: None,
        registration_access_token: rotated_token,
        registration_client_uri: registration_uri(ctx, &client.id),
        metadata: client.metadata.clone(),
    };
    ctx.save_client(client).await?;

    tracing::info!(client_id, "dynamic client updated");
    Ok(Response::ok_json(&response))
}

/// Handles `DELETE /register/{client_id}`.
pub(crate) async fn delete(ctx: &Context<'_>, client_id: &str) -> Result<Response, Error> {
    let client = authorize_registration(ctx, client_id).await?;
    ctx.delete_client(&client.id).await?;
    tracing::info!(client_id, "dynamic client deleted");
    Ok(Response::Empty {
        status: StatusCode::NO_CONTENT,
    })
}

async fn authorize_registration(ctx: &Context<'_>, client_id: &str) -> Result<Client, Error> {
    let token = ctx.request.bearer_token().ok_or_else(|| {
        Error::new(
            ErrorCode::InvalidToken,
            "the registration access token is required",
        )
    })?;
    let client = ctx
        .client(client_id)
        .await
        .map_err(|_| Error::new(ErrorCode::InvalidToken, "invalid registration access token"))?;
    let hash = client.registration_token_hash.as_deref().ok_or_else(|| {
        Error::new(ErrorCode::InvalidToken, "invalid registration access token")
    })?;
    match bcrypt::verify(token, hash) {
        Ok(true) => Ok(client),
        _ => Err(Error::new(
            ErrorCode::InvalidToken,
            "invalid registration access token",
        )),
    }
}

fn parse_metadata(ctx: &Context<'_>) -> Result<ClientMetadata, Error> {
    let body = ctx.request.body.as_deref().unwrap_or_default();
    serde_json::from_str(body)
        .map_err(|_| Error::new(ErrorCode::InvalidClientMetadata, "invalid client metadata"))
}

fn needs_secret(method: ClientAuthnMethod) -> bool {
    matches!(
        method,
        ClientAuthnMethod::SecretBasic | ClientAuthnMethod::SecretPost | ClientAuthnMethod::SecretJwt
    )
}

fn hash(value: &str) -> Result<String, Error> {
    bcrypt::hash(value, bcrypt::DEFAULT_COST).map_err(Error::internal)
}

fn registration_uri(ctx: &Context<'_>, client_id: &str) -> String {
    format!(
        "{}{}/{client_id}",
        ctx.config.base_url(),
        crate::endpoint::REGISTER_PATH
    )
}
