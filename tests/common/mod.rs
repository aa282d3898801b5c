use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use quill::config::Config;
use quill::db::{MemoryPostStore, MemoryUserStore, UserStore};
use quill::state::SharedState;

/// A running test server backed by an in-memory user store.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub state: SharedState,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn register(&self, email: &str, password: &str) -> (Value, StatusCode) {
        self.post(
            "/api/v1/auth/register",
            &json!({ "email": email, "password": password }),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> (Value, StatusCode) {
        self.post(
            "/api/v1/auth/login",
            &json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Register and log in, return (user id, access token).
    pub async fn signup(&self, email: &str, password: &str) -> (i64, String) {
        let (body, status) = self.register(email, password).await;
        assert_eq!(status, StatusCode::OK, "register failed: {body}");
        let id = body["id"].as_i64().unwrap();

        let (body, status) = self.login(email, password).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        (id, body["access_token"].as_str().unwrap().to_string())
    }

    /// Register, log in and confirm, return (user id, access token).
    pub async fn signup_confirmed(&self, email: &str, password: &str) -> (i64, String) {
        let (id, token) = self.signup(email, password).await;
        let user = self.state.accounts.store().get(id).await.unwrap().unwrap();
        let confirm = self.state.accounts.generate_confirmation_token(&user).unwrap();

        let (body, status) = self
            .post_auth("/api/v1/auth/confirm", &token, &json!({ "token": confirm }))
            .await;
        assert_eq!(status, StatusCode::OK, "confirm failed: {body}");
        (id, token)
    }

    pub async fn post(&self, path: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn get(&self, path: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn get_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn post_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        secret_key: "test-secret-key-that-is-long-enough".to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0, // unused, we bind to random port
        base_url: "http://localhost:0".to_string(),
        token_max_age: Duration::from_secs(3600),
        session_max_age: Duration::from_secs(3600),
        log_level: "warn".to_string(),
    }
}

/// Spawn a test app with fresh in-memory stores.
pub async fn spawn_app() -> TestApp {
    let (app, state) = quill::build_app(
        Arc::new(MemoryUserStore::new()),
        Arc::new(MemoryPostStore::new()),
        test_config(),
    );

    // Bind to random port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        addr,
        client,
        state,
    }
}
