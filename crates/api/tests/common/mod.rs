#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use newsroom_api::auth::jwt::JwtConfig;
use newsroom_api::auth::password::hash_password;
use newsroom_api::config::ServerConfig;
use newsroom_api::router::build_app_router;
use newsroom_api::state::AppState;
use newsroom_db::models::admin_user::{AdminUser, CreateAdminUser};
use newsroom_db::repositories::AdminUserRepo;
use newsroom_events::{EventBus, MailError, Mailer, OutgoingEmail};
use newsroom_pipeline::{DeliveryConfig, Sender};
use sqlx::PgPool;
use tower::ServiceExt;

pub const TEST_PASSWORD: &str = "desk-password-123";

/// Mailer that records every email it is asked to send.
#[derive(Default)]
pub struct TestMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

impl TestMailer {
    pub fn sent_to(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.to_email.clone())
            .collect()
    }
}

#[async_trait]
impl Mailer for TestMailer {
    fn provider(&self) -> &'static str {
        "test"
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        jwt: JwtConfig {
            secret: "newsroom-integration-test-secret".to_string(),
            access_token_expiry_mins: 15,
            refresh_token_expiry_days: 7,
        },
    }
}

pub fn test_state(pool: PgPool) -> (AppState, Arc<TestMailer>) {
    let mailer = Arc::new(TestMailer::default());
    let delivery = DeliveryConfig {
        app_url: "https://news.example.com".into(),
        batch_delay: std::time::Duration::ZERO,
        ..DeliveryConfig::default()
    };
    let sender = Sender::new(pool.clone(), mailer.clone(), delivery);
    let state = AppState::new(pool, test_config(), Arc::new(EventBus::default()), sender);
    (state, mailer)
}

/// The production router and middleware stack over a test state.
pub fn build_test_app(pool: PgPool) -> Router {
    let (state, _) = test_state(pool);
    build_app_router(state, &test_config())
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    json: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match json {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::GET, uri, Some(token), None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, None, Some(body)).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    send(app, Method::POST, uri, Some(token), Some(body)).await
}

pub async fn post_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::POST, uri, Some(token), None).await
}

pub async fn put_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    send(app, Method::PUT, uri, Some(token), Some(body)).await
}

pub async fn delete_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Some(token), None).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

pub async fn create_admin(pool: &PgPool, email: &str, role: &str) -> AdminUser {
    AdminUserRepo::create(
        pool,
        &CreateAdminUser {
            email: email.to_string(),
            password_hash: hash_password(TEST_PASSWORD).unwrap(),
            role: role.to_string(),
        },
    )
    .await
    .unwrap()
}

/// Log in through the API and return the `data` object.
pub async fn login(app: Router, email: &str, password: &str) -> serde_json::Value {
    let response = post_json(
        app,
        "/api/v1/auth/login",
        serde_json::json!({ "email": email, "password": password }),
    )
    .await;
    assert_eq!(response.status(), 200);
    body_json(response).await["data"].clone()
}

/// Create an account with `role` and return an access token for it.
pub async fn token_for(pool: &PgPool, role: &str) -> String {
    let email = format!("{role}@newsroom.test");
    create_admin(pool, &email, role).await;
    let data = login(build_test_app(pool.clone()), &email, TEST_PASSWORD).await;
    data["access_token"].as_str().unwrap().to_string()
}
