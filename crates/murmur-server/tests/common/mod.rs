#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use murmur_api::AppState;
use murmur_api::notify::{Job, JobQueue};
use murmur_api::password::PasswordHashing;
use murmur_db::Database;
use murmur_server::config::Config;
use murmur_server::{build_state, router};

/// Reversible "hash" so tests don't pay for argon2.
pub struct PlainHasher;

impl PasswordHashing for PlainHasher {
    fn hash(&self, password: &str) -> anyhow::Result<String> {
        Ok(format!("plain:{}", password))
    }

    fn verify(&self, password: &str, hash: &str) -> anyhow::Result<bool> {
        Ok(hash == format!("plain:{}", password))
    }
}

/// Captures scheduled jobs so tests can follow the verification link.
#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<Job>>,
}

impl RecordingQueue {
    pub fn verification_token_for(&self, email: &str) -> String {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|job| match job {
                Job::VerificationEmail { email: to, token } if to == email => Some(token.clone()),
                _ => None,
            })
            .expect("verification email scheduled")
    }
}

impl JobQueue for RecordingQueue {
    fn schedule(&self, job: Job) -> anyhow::Result<()> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub jobs: Arc<RecordingQueue>,
}

pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "MURMUR_JWT_SECRET" => Some("test-access-secret".into()),
        "MURMUR_REFRESH_SECRET" => Some("test-refresh-secret".into()),
        "MURMUR_STORE_TIMEOUT_MS" => Some("2000".into()),
        _ => None,
    })
    .expect("test config")
}

pub fn test_app() -> TestApp {
    let db = Arc::new(Database::open_in_memory().expect("in-memory db"));
    let jobs = Arc::new(RecordingQueue::default());
    let state = build_state(db, &test_config(), jobs.clone(), Arc::new(PlainHasher));
    TestApp {
        router: router(state.clone()),
        state,
        jobs,
    }
}

pub async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("build request");

    let response = app.clone().oneshot(request).await.expect("call router");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

pub struct LoggedIn {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
}

pub async fn register(app: &TestApp, name: &str, email: &str) -> String {
    let (status, body) = call(
        &app.router,
        "POST",
        "/api/user/register",
        None,
        Some(json!({
            "name": name,
            "email": email,
            "password": "Secret!1",
            "confirm_password": "Secret!1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    body["data"]["id"].as_str().expect("user id").to_string()
}

pub async fn login(app: &TestApp, email: &str) -> LoggedIn {
    let (status, body) = call(
        &app.router,
        "POST",
        "/api/user/login",
        None,
        Some(json!({ "email": email, "password": "Secret!1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    LoggedIn {
        user_id: body["data"]["user"]["id"].as_str().expect("user id").to_string(),
        access_token: body["data"]["access_token"].as_str().expect("access").to_string(),
        refresh_token: body["data"]["refresh_token"].as_str().expect("refresh").to_string(),
    }
}
