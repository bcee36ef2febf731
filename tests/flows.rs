//! End-to-end protocol flows over in-memory stores.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::prelude::*;
use josekit::jwk::Jwk;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use heimdallr::client::{Client, ClientMetadata};
use heimdallr::hooks::Hooks;
use heimdallr::keys::KeyRing;
use heimdallr::oauth::{
    ClientAuthnMethod, GrantInfo, GrantType, ResponseType, Scope, TokenOptions,
};
use heimdallr::policy::{AuthnOutcome, AuthnPolicy};
use heimdallr::storage::memory::{
    InMemoryAuthnSessionStore, InMemoryClientStore, InMemoryGrantSessionStore,
};
use heimdallr::{AuthnSession, Configuration, Provider, Request, Response};

const PKCE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
const PKCE_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

/// Grants whatever was requested to a fixed user without interaction.
struct AutoApprovePolicy;

#[async_trait]
impl AuthnPolicy for AutoApprovePolicy {
    fn id(&self) -> &str {
        "auto-approve"
    }

    fn set_up(&self, _request: &Request, _client: &Client, _session: &mut AuthnSession) -> bool {
        true
    }

    async fn authenticate(
        &self,
        _request: &Request,
        session: &mut AuthnSession,
    ) -> AuthnOutcome {
        session.set_subject("user-1");
        AuthnOutcome::Success
    }
}

/// Suspends until the callback posts a username.
struct LoginFormPolicy;

#[async_trait]
impl AuthnPolicy for LoginFormPolicy {
    fn id(&self) -> &str {
        "login-form"
    }

    fn set_up(&self, _request: &Request, _client: &Client, _session: &mut AuthnSession) -> bool {
        true
    }

    async fn authenticate(&self, request: &Request, session: &mut AuthnSession) -> AuthnOutcome {
        match request.form_param("username") {
            Some(username) => {
                session.set_subject(username);
                AuthnOutcome::Success
            }
            None => AuthnOutcome::InProgress(Response::see_other(format!(
                "https://as.example.com/login-ui?callback={}",
                session.callback_id.as_deref().unwrap_or_default()
            ))),
        }
    }
}

struct TestHooks;

impl Hooks for TestHooks {
    fn should_issue_refresh_token(&self, _client: &Client, _grant: &GrantInfo) -> bool {
        true
    }

    fn token_options(&self, _client: &Client, _grant: &GrantInfo) -> TokenOptions {
        TokenOptions::jwt(None, 300)
    }
}

fn rsa_key(kid: &str, alg: &str, key_use: &str) -> Jwk {
    let mut jwk = Jwk::generate_rsa_key(2048).unwrap();
    jwk.set_key_id(kid);
    jwk.set_algorithm(alg);
    jwk.set_key_use(key_use);
    jwk
}

fn public_client(id: &str) -> Client {
    Client::new(
        id,
        ClientMetadata {
            redirect_uris: vec![format!("https://{id}/cb")],
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            response_types: vec![ResponseType::Code],
            scopes: "openid profile email".into(),
            authn_method: ClientAuthnMethod::None,
            ..Default::default()
        },
    )
}

fn introspector_client(secret: &str) -> Client {
    let mut client = Client::new(
        "rs1",
        ClientMetadata {
            grant_types: vec![GrantType::Introspection],
            response_types: vec![],
            authn_method: ClientAuthnMethod::SecretPost,
            ..Default::default()
        },
    );
    client.hashed_secret = Some(bcrypt::hash(secret, 4).unwrap());
    client
}

fn base_configuration() -> Configuration {
    let ring = KeyRing::from_keys(vec![rsa_key("rs-1", "RS256", "sig")]).unwrap();
    let mut config = Configuration::builder()
        .host("https://as.example.com")
        .clients(Arc::new(InMemoryClientStore::new()))
        .authn_sessions(Arc::new(InMemoryAuthnSessionStore::new()))
        .grant_sessions(Arc::new(InMemoryGrantSessionStore::new()))
        .key_ring(ring)
        .default_token_sig_key_id("rs-1")
        .default_user_sig_key_id("rs-1")
        .policies(vec![Arc::new(AutoApprovePolicy) as Arc<dyn AuthnPolicy>])
        .hooks(Arc::new(TestHooks))
        .build();

    config.scopes = vec![
        Scope::new("openid"),
        Scope::new("profile"),
        Scope::new("email"),
    ];
    config.grant_types = vec![
        GrantType::AuthorizationCode,
        GrantType::RefreshToken,
        GrantType::Introspection,
    ];
    config.client_authn_methods = vec![ClientAuthnMethod::None, ClientAuthnMethod::SecretPost];
    config.pkce_enabled = true;
    config.par_enabled = true;
    config.refresh_rotation_enabled = true;
    config.introspection_enabled = true;
    config.introspection_authn_methods = vec![ClientAuthnMethod::SecretPost];
    config.static_clients = vec![public_client("c1"), introspector_client("rs1-secret")];
    config
}

fn provider() -> Provider {
    Provider::new(base_configuration()).unwrap()
}

fn get(path: &str, query: &[(&str, &str)]) -> Request {
    Request::builder()
        .method(http::Method::GET)
        .path(path)
        .query(to_map(query))
        .build()
}

fn post(path: &str, form: &[(&str, &str)]) -> Request {
    Request::builder()
        .method(http::Method::POST)
        .path(path)
        .form(to_map(form))
        .build()
}

fn to_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn redirect_location(response: &Response) -> String {
    match response {
        Response::Redirect { location } => location.clone(),
        other => panic!("expected a redirect, got {other:?}"),
    }
}

fn json_body(response: &Response) -> (http::StatusCode, Value) {
    match response {
        Response::Json { status, body } => (*status, body.clone()),
        other => panic!("expected json, got {other:?}"),
    }
}

fn query_params(location: &str) -> HashMap<String, String> {
    let url = url::Url::parse(location).unwrap();
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn unverified_claims(jwt: &str) -> Map<String, Value> {
    let payload = jwt.split('.').nth(1).unwrap();
    serde_json::from_slice(&BASE64_URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap()
}

fn left_half_sha256(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    BASE64_URL_SAFE_NO_PAD.encode(&digest[..16])
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

async fn authorize_and_get_code(provider: &Provider) -> String {
    let response = provider
        .handle(get(
            "/authorize",
            &[
                ("client_id", "c1"),
                ("redirect_uri", "https://c1/cb"),
                ("response_type", "code"),
                ("scope", "openid profile"),
                ("state", "xyz"),
                ("nonce", "n-0S6_WzA2Mj"),
                ("code_challenge", PKCE_CHALLENGE),
                ("code_challenge_method", "S256"),
            ],
        ))
        .await;
    let location = redirect_location(&response);
    assert!(location.starts_with("https://c1/cb?"));
    let params = query_params(&location);
    assert_eq!(params["state"], "xyz");
    let code = params["code"].clone();
    assert_eq!(code.len(), 30);
    code
}

async fn exchange_code(provider: &Provider, code: &str) -> (http::StatusCode, Value) {
    let response = provider
        .handle(post(
            "/token",
            &[
                ("grant_type", "authorization_code"),
                ("client_id", "c1"),
                ("code", code),
                ("redirect_uri", "https://c1/cb"),
                ("code_verifier", PKCE_VERIFIER),
            ],
        ))
        .await;
    json_body(&response)
}

#[tokio::test]
async fn test_authorization_code_flow_with_pkce_and_openid() {
    let provider = provider();
    let code = authorize_and_get_code(&provider).await;

    let (status, body) = exchange_code(&provider, &code).await;
    assert_eq!(status, http::StatusCode::OK);
    assert!(body["access_token"].as_str().is_some());
    assert_eq!(body["token_type"], "Bearer");

    let id_token = body["id_token"].as_str().expect("id token expected");
    let claims = unverified_claims(id_token);
    assert_eq!(claims["iss"], "https://as.example.com");
    assert_eq!(claims["sub"], "user-1");
    assert_eq!(claims["aud"], "c1");
    assert_eq!(claims["nonce"], "n-0S6_WzA2Mj");
    assert_eq!(claims["c_hash"], left_half_sha256(&code));

    let refresh_token = body["refresh_token"].as_str().unwrap();
    assert_eq!(refresh_token.len(), 99);
}

#[tokio::test]
async fn test_wrong_pkce_verifier_rejected() {
    let provider = provider();
    let code = authorize_and_get_code(&provider).await;

    let response = provider
        .handle(post(
            "/token",
            &[
                ("grant_type", "authorization_code"),
                ("client_id", "c1"),
                ("code", &code),
                ("redirect_uri", "https://c1/cb"),
                ("code_verifier", "not-the-right-verifier-at-all-no"),
            ],
        ))
        .await;
    let (status, body) = json_body(&response);
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn test_refresh_rotation_and_scope_narrowing() {
    let provider = provider();
    let response = provider
        .handle(get(
            "/authorize",
            &[
                ("client_id", "c1"),
                ("redirect_uri", "https://c1/cb"),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", "s1"),
            ],
        ))
        .await;
    let code = query_params(&redirect_location(&response))["code"].clone();
    let (_, body) = exchange_code(&provider, &code).await;
    let first_refresh = body["refresh_token"].as_str().unwrap().to_string();
    let first_access = body["access_token"].as_str().unwrap().to_string();

    let response = provider
        .handle(post(
            "/token",
            &[
                ("grant_type", "refresh_token"),
                ("client_id", "c1"),
                ("refresh_token", &first_refresh),
                ("scope", "openid email"),
            ],
        ))
        .await;
    let (status, body) = json_body(&response);
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body["scope"], "openid email");

    let new_access = body["access_token"].as_str().unwrap();
    assert_ne!(new_access, first_access);
    let access_claims = unverified_claims(new_access);
    assert_eq!(access_claims["scope"], "openid email");

    let new_refresh = body["refresh_token"].as_str().unwrap();
    assert_ne!(new_refresh, first_refresh);
    assert_eq!(new_refresh.len(), 99);

    // The rotated-out token no longer works.
    let response = provider
        .handle(post(
            "/token",
            &[
                ("grant_type", "refresh_token"),
                ("client_id", "c1"),
                ("refresh_token", &first_refresh),
            ],
        ))
        .await;
    let (status, body) = json_body(&response);
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_grant");

    // A scope beyond the grant is refused.
    let response = provider
        .handle(post(
            "/token",
            &[
                ("grant_type", "refresh_token"),
                ("client_id", "c1"),
                ("refresh_token", new_refresh),
                ("scope", "openid payments"),
            ],
        ))
        .await;
    let (_, body) = json_body(&response);
    assert_eq!(body["error"], "invalid_scope");
}

#[tokio::test]
async fn test_authorization_code_replay_revokes_the_grant() {
    let provider = provider();
    let code = authorize_and_get_code(&provider).await;

    let (status, body) = exchange_code(&provider, &code).await;
    assert_eq!(status, http::StatusCode::OK);
    let access_token = body["access_token"].as_str().unwrap().to_string();

    // Second exchange of the same code.
    let (status, body) = exchange_code(&provider, &code).await;
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_grant");

    // The originally issued token is now inactive.
    let response = provider
        .handle(post(
            "/introspect",
            &[
                ("client_id", "rs1"),
                ("client_secret", "rs1-secret"),
                ("token", &access_token),
            ],
        ))
        .await;
    let (status, body) = json_body(&response);
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body["active"], false);
}

#[tokio::test]
async fn test_introspection_of_active_token() {
    let provider = provider();
    let code = authorize_and_get_code(&provider).await;
    let (_, body) = exchange_code(&provider, &code).await;
    let access_token = body["access_token"].as_str().unwrap().to_string();
    let refresh_token = body["refresh_token"].as_str().unwrap().to_string();

    let response = provider
        .handle(post(
            "/introspect",
            &[
                ("client_id", "rs1"),
                ("client_secret", "rs1-secret"),
                ("token", &access_token),
            ],
        ))
        .await;
    let (_, body) = json_body(&response);
    assert_eq!(body["active"], true);
    assert_eq!(body["client_id"], "c1");
    assert_eq!(body["sub"], "user-1");
    assert_eq!(body["scope"], "openid profile");

    // The refresh token is recognized by its length.
    let response = provider
        .handle(post(
            "/introspect",
            &[
                ("client_id", "rs1"),
                ("client_secret", "rs1-secret"),
                ("token", &refresh_token),
            ],
        ))
        .await;
    let (_, body) = json_body(&response);
    assert_eq!(body["active"], true);
    assert_eq!(body["hint"], "refresh_token");
}

#[tokio::test]
async fn test_par_reference_is_single_use() {
    let provider = provider();
    let response = provider
        .handle(post(
            "/par",
            &[
                ("client_id", "c1"),
                ("redirect_uri", "https://c1/cb"),
                ("response_type", "code"),
                ("scope", "openid"),
                ("state", "par-state"),
                ("p_custom", "hidden"),
            ],
        ))
        .await;
    let (status, body) = json_body(&response);
    assert_eq!(status, http::StatusCode::CREATED);
    let request_uri = body["request_uri"].as_str().unwrap().to_string();
    assert!(request_uri.starts_with("urn:ietf:params:oauth:request_uri:"));
    assert_eq!(body["expires_in"], 60);

    let response = provider
        .handle(get(
            "/authorize",
            &[("client_id", "c1"), ("request_uri", &request_uri)],
        ))
        .await;
    let params = query_params(&redirect_location(&response));
    assert_eq!(params["state"], "par-state");
    assert!(params.contains_key("code"));

    // Dereferencing the same reference again fails.
    let response = provider
        .handle(get(
            "/authorize",
            &[("client_id", "c1"), ("request_uri", &request_uri)],
        ))
        .await;
    let (status, body) = json_body(&response);
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_policy_suspension_and_callback_resumption() {
    let mut config = base_configuration();
    config.policies = vec![Arc::new(LoginFormPolicy) as Arc<dyn AuthnPolicy>];
    let provider = Provider::new(config).unwrap();

    let response = provider
        .handle(get(
            "/authorize",
            &[
                ("client_id", "c1"),
                ("redirect_uri", "https://c1/cb"),
                ("response_type", "code"),
                ("scope", "openid"),
                ("state", "suspend-state"),
            ],
        ))
        .await;
    // The policy sent the user agent to its login UI, carrying the callback
    // handle it will resume with.
    let location = redirect_location(&response);
    assert!(location.starts_with("https://as.example.com/login-ui?callback="));
    let callback_id = query_params(&location)["callback"].clone();
    assert_eq!(callback_id.len(), 20);

    let response = provider
        .handle(post(
            &format!("/authorize/{callback_id}"),
            &[("username", "resumed-user")],
        ))
        .await;
    let params = query_params(&redirect_location(&response));
    assert_eq!(params["state"], "suspend-state");
    assert!(params.contains_key("code"));

    // The callback is gone once the flow reaches a terminal state.
    let response = provider
        .handle(post(
            &format!("/authorize/{callback_id}"),
            &[("username", "resumed-user")],
        ))
        .await;
    let (status, _) = json_body(&response);
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_issuer_response_parameter() {
    let mut config = base_configuration();
    config.issuer_response_param_enabled = true;
    let provider = Provider::new(config).unwrap();

    let response = provider
        .handle(get(
            "/authorize",
            &[
                ("client_id", "c1"),
                ("redirect_uri", "https://c1/cb"),
                ("response_type", "code"),
                ("scope", "openid"),
            ],
        ))
        .await;
    let params = query_params(&redirect_location(&response));
    assert_eq!(params["iss"], "https://as.example.com");
}

fn ec_public_map(jwk: &Jwk) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("kty".into(), Value::String("EC".into()));
    for name in ["crv", "x", "y"] {
        map.insert(name.into(), jwk.parameter(name).unwrap().clone());
    }
    map
}

fn ec_thumbprint(jwk: &Jwk) -> String {
    let canonical = format!(
        r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
        jwk.parameter("crv").unwrap().as_str().unwrap(),
        jwk.parameter("x").unwrap().as_str().unwrap(),
        jwk.parameter("y").unwrap().as_str().unwrap(),
    );
    BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}

fn dpop_proof(key: &Jwk, htm: &str, htu: &str) -> String {
    let mut header = josekit::jws::JwsHeader::new();
    header.set_token_type("dpop+jwt");
    header
        .set_claim("jwk", Some(Value::Object(ec_public_map(key))))
        .unwrap();
    let payload = json!({
        "jti": format!("jti-{}", unix_now()),
        "htm": htm,
        "htu": htu,
        "iat": unix_now(),
    });
    let signer = josekit::jws::ES256.signer_from_jwk(key).unwrap();
    josekit::jws::serialize_compact(payload.to_string().as_bytes(), &header, &signer).unwrap()
}

#[tokio::test]
async fn test_dpop_binding_pins_the_authorized_key() {
    let mut config = base_configuration();
    config.dpop_enabled = true;
    let provider = Provider::new(config).unwrap();

    let key_a = Jwk::generate_ec_key(josekit::jwk::alg::ec::EcCurve::P256).unwrap();
    let key_b = Jwk::generate_ec_key(josekit::jwk::alg::ec::EcCurve::P256).unwrap();
    let thumb_a = ec_thumbprint(&key_a);

    let response = provider
        .handle(get(
            "/authorize",
            &[
                ("client_id", "c1"),
                ("redirect_uri", "https://c1/cb"),
                ("response_type", "code"),
                ("scope", "openid"),
                ("dpop_jkt", &thumb_a),
            ],
        ))
        .await;
    let code = query_params(&redirect_location(&response))["code"].clone();

    // A proof from the wrong key is rejected.
    let mut request = post(
        "/token",
        &[
            ("grant_type", "authorization_code"),
            ("client_id", "c1"),
            ("code", &code),
            ("redirect_uri", "https://c1/cb"),
        ],
    );
    let proof_b = dpop_proof(&key_b, "POST", "https://as.example.com/token");
    request
        .headers
        .insert("DPoP", proof_b.parse().unwrap());
    let (status, body) = json_body(&provider.handle(request).await);
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_grant");

    // The same code is burned; run a fresh flow with the right key.
    let response = provider
        .handle(get(
            "/authorize",
            &[
                ("client_id", "c1"),
                ("redirect_uri", "https://c1/cb"),
                ("response_type", "code"),
                ("scope", "openid"),
                ("dpop_jkt", &thumb_a),
            ],
        ))
        .await;
    let code = query_params(&redirect_location(&response))["code"].clone();

    let mut request = post(
        "/token",
        &[
            ("grant_type", "authorization_code"),
            ("client_id", "c1"),
            ("code", &code),
            ("redirect_uri", "https://c1/cb"),
        ],
    );
    let proof_a = dpop_proof(&key_a, "POST", "https://as.example.com/token");
    request
        .headers
        .insert("DPoP", proof_a.parse().unwrap());
    let (status, body) = json_body(&provider.handle(request).await);
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body["token_type"], "DPoP");

    let claims = unverified_claims(body["access_token"].as_str().unwrap());
    assert_eq!(claims["cnf"]["jkt"], thumb_a.as_str());
}

#[tokio::test]
async fn test_jarm_error_response_is_encrypted_and_signed() {
    let mut config = base_configuration();
    config.jarm_enabled = true;
    config.jarm_default_sig_key_id = Some("rs-1".into());
    config.jarm_encryption_enabled = true;
    config.jarm_key_enc_algs = vec![heimdallr::jose::KeyEncAlg::RsaOaep256];
    config.jarm_content_enc_algs = vec![heimdallr::jose::ContentEncAlg::A256Gcm];

    // The client holds an RSA decryption key; the server only ever sees the
    // public half through the registered JWKS.
    let mut client_enc_key = Jwk::generate_rsa_key(2048).unwrap();
    client_enc_key.set_key_id("c-jarm-enc");
    client_enc_key.set_algorithm("RSA-OAEP-256");
    client_enc_key.set_key_use("enc");
    let mut public_map = Map::new();
    public_map.insert("kty".into(), Value::String("RSA".into()));
    for name in ["kid", "use", "alg", "n", "e"] {
        public_map.insert(
            name.into(),
            client_enc_key.parameter(name).unwrap().clone(),
        );
    }

    let mut jarm_client = public_client("c-jarm");
    jarm_client.metadata.jarm_sig_alg = Some(heimdallr::jose::SigAlg::RS256);
    jarm_client.metadata.jarm_key_enc_alg = Some(heimdallr::jose::KeyEncAlg::RsaOaep256);
    jarm_client.metadata.jarm_content_enc_alg = Some(heimdallr::jose::ContentEncAlg::A256Gcm);
    jarm_client.metadata.public_jwks = Some(json!({ "keys": [public_map] }));
    config.static_clients.push(jarm_client);

    let provider = Provider::new(config).unwrap();

    // An unknown scope forces a redirected error, carried as JARM.
    let response = provider
        .handle(get(
            "/authorize",
            &[
                ("client_id", "c-jarm"),
                ("redirect_uri", "https://c-jarm/cb"),
                ("response_type", "code"),
                ("scope", "openid payments"),
                ("state", "jarm-state"),
                ("response_mode", "query.jwt"),
            ],
        ))
        .await;
    let location = redirect_location(&response);
    assert!(location.starts_with("https://c-jarm/cb?"));
    let params = query_params(&location);
    let jarm = params["response"].clone();
    assert_eq!(jarm.split('.').count(), 5, "the response should be a JWE");

    // Decrypt with the client key.
    let decrypter = josekit::jwe::RSA_OAEP_256
        .decrypter_from_jwk(&client_enc_key)
        .unwrap();
    let (inner, _) = josekit::jwe::deserialize_compact(&jarm, &decrypter).unwrap();
    let inner = String::from_utf8(inner).unwrap();
    assert_eq!(inner.split('.').count(), 3, "the payload should be a JWS");

    // Verify with the server public key.
    let public_jwks = provider.config().key_ring.public_jwks();
    let server_key =
        Jwk::from_map(public_jwks["keys"][0].as_object().unwrap().clone()).unwrap();
    let verifier = josekit::jws::RS256.verifier_from_jwk(&server_key).unwrap();
    let (payload, _) = josekit::jws::deserialize_compact(&inner, &verifier).unwrap();
    let claims: Map<String, Value> = serde_json::from_slice(&payload).unwrap();

    assert_eq!(claims["iss"], "https://as.example.com");
    assert_eq!(claims["aud"], "c-jarm");
    assert_eq!(claims["error"], "invalid_scope");
    assert_eq!(claims["state"], "jarm-state");
    assert!(claims["exp"].as_i64().unwrap() > unix_now());
}

#[tokio::test]
async fn test_discovery_document() {
    let provider = provider();
    let response = provider
        .handle(get("/.well-known/openid-configuration", &[]))
        .await;
    let (status, body) = json_body(&response);
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body["issuer"], "https://as.example.com");
    assert_eq!(
        body["authorization_endpoint"],
        "https://as.example.com/authorize"
    );
    assert_eq!(body["token_endpoint"], "https://as.example.com/token");
    assert_eq!(body["jwks_uri"], "https://as.example.com/jwks");
    assert_eq!(
        body["pushed_authorization_request_endpoint"],
        "https://as.example.com/par"
    );
    assert_eq!(
        body["code_challenge_methods_supported"],
        json!(["S256"])
    );
    assert_eq!(
        body["id_token_signing_alg_values_supported"],
        json!(["RS256"])
    );

    let response = provider.handle(get("/jwks", &[])).await;
    let (_, body) = json_body(&response);
    let key = &body["keys"][0];
    assert_eq!(key["kid"], "rs-1");
    assert!(key.get("d").is_none());
}

#[tokio::test]
async fn test_dynamic_client_registration_lifecycle() {
    let mut config = base_configuration();
    config.dcr_enabled = true;
    let provider = Provider::new(config).unwrap();

    let metadata = json!({
        "redirect_uris": ["https://dyn/cb"],
        "grant_types": ["authorization_code"],
        "response_types": ["code"],
        "scope": "openid",
        "token_endpoint_auth_method": "client_secret_post",
    });
    let request = Request::builder()
        .method(http::Method::POST)
        .path("/register")
        .body(metadata.to_string())
        .build();
    let (status, body) = json_body(&provider.handle(request).await);
    assert_eq!(status, http::StatusCode::CREATED);

    let client_id = body["client_id"].as_str().unwrap().to_string();
    assert_eq!(client_id.len(), 30);
    assert_eq!(body["client_secret"].as_str().unwrap().len(), 64);
    let registration_token = body["registration_access_token"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(registration_token.len(), 50);
    assert_eq!(
        body["registration_client_uri"],
        format!("https://as.example.com/register/{client_id}")
    );

    // Read it back with the registration token.
    let mut request = Request::builder()
        .method(http::Method::GET)
        .path(format!("/register/{client_id}"))
        .build();
    request.headers.insert(
        "Authorization",
        format!("Bearer {registration_token}").parse().unwrap(),
    );
    let (status, body) = json_body(&provider.handle(request).await);
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body["client_id"], client_id.as_str());
    assert_eq!(body["scope"], "openid");

    // A wrong token is refused.
    let mut request = Request::builder()
        .method(http::Method::GET)
        .path(format!("/register/{client_id}"))
        .build();
    request
        .headers
        .insert("Authorization", "Bearer wrong-token".parse().unwrap());
    let (status, body) = json_body(&provider.handle(request).await);
    assert_eq!(status, http::StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");

    // Delete.
    let mut request = Request::builder()
        .method(http::Method::DELETE)
        .path(format!("/register/{client_id}"))
        .build();
    request.headers.insert(
        "Authorization",
        format!("Bearer {registration_token}").parse().unwrap(),
    );
    let response = provider.handle(request).await;
    assert_eq!(response.status(), http::StatusCode::NO_CONTENT);

    // Invalid metadata is rejected with the registration error code.
    let request = Request::builder()
        .method(http::Method::POST)
        .path("/register")
        .body(json!({ "grant_types": ["device_code"] }).to_string())
        .build();
    let (status, body) = json_body(&provider.handle(request).await);
    assert_eq!(status, http::StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_client_metadata");
}

#[tokio::test]
async fn test_userinfo_with_bearer_token() {
    let provider = provider();
    let code = authorize_and_get_code(&provider).await;
    let (_, body) = exchange_code(&provider, &code).await;
    let access_token = body["access_token"].as_str().unwrap().to_string();

    let mut request = get("/userinfo", &[]);
    request.headers.insert(
        "Authorization",
        format!("Bearer {access_token}").parse().unwrap(),
    );
    let (status, body) = json_body(&provider.handle(request).await);
    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(body["sub"], "user-1");

    // A garbage token is inactive.
    let mut request = get("/userinfo", &[]);
    request
        .headers
        .insert("Authorization", "Bearer nonsense".parse().unwrap());
    let (status, body) = json_body(&provider.handle(request).await);
    assert_eq!(status, http::StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");
}
