use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use estate_portal_rust::client::AuthEndpoints;
use estate_portal_rust::session::scheduler::TokioScheduler;
use estate_portal_rust::session::{SessionManager, SessionStore};

/// Mutable knobs and counters of the in-process mock portal server.
/// Counters record attempts, including rejected ones.
pub struct PortalState {
    pub password: String,
    pub token_ttl: Duration,
    pub access_tokens: HashSet<String>,
    pub refresh_tokens: HashSet<String>,
    pub fail_refresh: bool,
    pub reject_info: bool,
    pub login_count: usize,
    pub refresh_count: usize,
    pub info_count: usize,
    pub logout_count: usize,
}

pub type SharedState = Arc<Mutex<PortalState>>;

pub struct TestPortal {
    pub base_url: String,
    pub state: SharedState,
}

impl TestPortal {
    pub fn lock(&self) -> MutexGuard<'_, PortalState> {
        self.state.lock().unwrap()
    }
}

/// Start a mock portal server on an unused port. The listener is bound
/// before this returns, so requests can be made immediately.
pub async fn spawn_portal() -> Result<TestPortal> {
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;

    let state: SharedState = Arc::new(Mutex::new(PortalState {
        password: "correct".to_string(),
        token_ttl: Duration::hours(1),
        access_tokens: HashSet::new(),
        refresh_tokens: HashSet::new(),
        fail_refresh: false,
        reject_info: false,
        login_count: 0,
        refresh_count: 0,
        info_count: 0,
        logout_count: 0,
    }));

    let app = Router::new()
        .route("/portal/auth/login", post(login))
        .route("/portal/auth/refresh", post(refresh))
        .route("/portal/auth/info", get(info))
        .route("/portal/auth/logout", post(logout))
        .route("/portal/echo", post(echo))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .context("failed to bind mock portal")?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock portal server");
    });

    Ok(TestPortal {
        base_url: format!("http://127.0.0.1:{}", port),
        state,
    })
}

/// Isolated per-test session slot directory.
pub fn temp_config_dir() -> PathBuf {
    std::env::temp_dir().join(format!("estate-portal-test-{}", uuid::Uuid::new_v4().simple()))
}

pub fn manager(portal: &TestPortal, dir: &Path) -> Arc<SessionManager> {
    manager_with_margin(portal, dir, 300)
}

pub fn manager_with_margin(portal: &TestPortal, dir: &Path, margin_secs: i64) -> Arc<SessionManager> {
    SessionManager::with_parts(
        AuthEndpoints::new(portal.base_url.clone()),
        SessionStore::new(dir.to_path_buf()),
        Box::new(TokioScheduler),
        Duration::seconds(margin_secs),
    )
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.to_string())
}

fn mint_token(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

async fn login(State(state): State<SharedState>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();
    state.login_count += 1;

    let portal_id = body["portalId"].as_str().unwrap_or("");
    let password = body["password"].as_str().unwrap_or("");
    let role = body["role"].as_str().unwrap_or("");

    if portal_id.is_empty() || password != state.password || (role != "tenant" && role != "owner") {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Login failed" })));
    }

    let access_token = mint_token("at");
    let refresh_token = mint_token("rt");
    let expires_at = Utc::now() + state.token_ttl;
    state.access_tokens.insert(access_token.clone());
    state.refresh_tokens.insert(refresh_token.clone());

    (
        StatusCode::OK,
        Json(json!({
            "user": {
                "contractId": 100,
                "role": role,
                "email": format!("{}@example.com", role),
                "name": "Test Tenant",
                "agencyId": 1,
                "propertyId": 42,
                "propertyTitle": "Seaside Apartment"
            },
            "accessToken": access_token,
            "refreshToken": refresh_token,
            "expiresAt": expires_at
        })),
    )
}

async fn refresh(State(state): State<SharedState>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();
    state.refresh_count += 1;

    let token = body["refreshToken"].as_str().unwrap_or("").to_string();
    if state.fail_refresh || !state.refresh_tokens.remove(&token) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Invalid refresh token" })));
    }

    let access_token = mint_token("at");
    let refresh_token = mint_token("rt");
    let expires_at = Utc::now() + state.token_ttl;
    state.access_tokens.insert(access_token.clone());
    state.refresh_tokens.insert(refresh_token.clone());

    (
        StatusCode::OK,
        Json(json!({
            "accessToken": access_token,
            "refreshToken": refresh_token,
            "expiresAt": expires_at
        })),
    )
}

async fn info(State(state): State<SharedState>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();
    state.info_count += 1;

    let live = match bearer(&headers) {
        Some(token) => !state.reject_info && state.access_tokens.contains(&token),
        None => false,
    };

    if live {
        (StatusCode::OK, Json(json!({ "authenticated": true })))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Token rejected" })))
    }
}

async fn logout(State(state): State<SharedState>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().unwrap();
    state.logout_count += 1;

    if let Some(token) = bearer(&headers) {
        state.access_tokens.remove(&token);
    }

    (StatusCode::OK, Json(json!({ "success": true })))
}

async fn echo(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let live = {
        let state = state.lock().unwrap();
        match bearer(&headers) {
            Some(token) => state.access_tokens.contains(&token),
            None => false,
        }
    };

    if live {
        (StatusCode::OK, Json(body))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Token rejected" })))
    }
}
