//! Axum-based web console.
//!
//! Thin request/response glue over the account registry: login,
//! password change, user administration, a status endpoint, and the
//! shutdown activity that cooperatively stops the whole process.
//! Console identity is its own cookie-based session concept (a random
//! bearer token mapped to a username in memory), deliberately separate
//! from the TCP session model. The two transports share only the
//! account registry.

use crate::accounts::Accounts;
use crate::api::ApiStats;
use crate::telemetry;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use parking_lot::Mutex;
use rand::RngCore;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB).
const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout; the console serves only small JSON exchanges.
const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Console session lifetime.
const SESSION_TTL_SECS: u64 = 24 * 3600;
/// Session cookie name.
const SESSION_COOKIE: &str = "servctl_session";
/// Token byte length before hex encoding.
const TOKEN_BYTES: usize = 32;

/// In-memory map of console session tokens to usernames.
pub struct ConsoleSessions {
    entries: Mutex<HashMap<String, SessionEntry>>,
    ttl: Duration,
}

struct SessionEntry {
    username: String,
    expires_at: Instant,
}

impl ConsoleSessions {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(SESSION_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Mint a session token for an authenticated username.
    pub fn create(&self, username: &str) -> String {
        let token = generate_token();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.expires_at > Instant::now());
        entries.insert(
            token.clone(),
            SessionEntry {
                username: username.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        token
    }

    /// Resolve a token to its username, purging it when expired.
    pub fn resolve(&self, token: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        match entries.get(token) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.username.clone()),
            Some(_) => {
                entries.remove(token);
                None
            }
            None => None,
        }
    }

    pub fn revoke(&self, token: &str) {
        self.entries.lock().remove(token);
    }
}

impl Default for ConsoleSessions {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Shared state for all console handlers.
#[derive(Clone)]
pub struct ConsoleState {
    pub accounts: Arc<Accounts>,
    pub sessions: Arc<ConsoleSessions>,
    pub api_stats: ApiStats,
    pub shutdown: watch::Sender<bool>,
    pub server_name: String,
}

/// Run the console until the shutdown signal fires.
pub async fn run(host: &str, port: u16, state: ConsoleState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .with_context(|| format!("binding web console on {host}:{port}"))?;
    let addr = listener.local_addr().context("reading console address")?;
    tracing::info!(%addr, "Web console is running");

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let mut shutdown = state.shutdown.subscribe();
    let app = Router::new()
        .route("/api/login", post(handle_login))
        .route("/api/logout", post(handle_logout))
        .route("/api/whoami", get(handle_whoami))
        .route("/api/change_password", post(handle_change_password))
        .route("/api/add_user", post(handle_add_user))
        .route("/api/status", get(handle_status))
        .route("/api/activity/{name}", post(handle_activity))
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    tracing::info!("Web console stopped");
    Ok(())
}

// ── Session helpers ─────────────────────────────────────────────────

/// Pull the session token out of the `Cookie` header.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|part| {
        let (name, value) = part.trim().split_once('=')?;
        (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

/// The logged-in console user, if the request carries a live session.
fn session_user(state: &ConsoleState, headers: &HeaderMap) -> Option<String> {
    state.sessions.resolve(&session_token(headers)?)
}

fn status_message(status: &str, message: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": status, "message": message }))
}

fn not_logged_in() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        status_message("fail", "You are not logged in"),
    )
}

// ── Handlers ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

/// POST /api/login — authenticate and set the session cookie.
async fn handle_login(
    State(state): State<ConsoleState>,
    body: Result<Json<LoginBody>, axum::extract::rejection::JsonRejection>,
) -> axum::response::Response {
    let Ok(Json(body)) = body else {
        return (
            StatusCode::BAD_REQUEST,
            status_message("fail", "Invalid request: expected username and password"),
        )
            .into_response();
    };

    if !state.accounts.authenticate(&body.username, &body.password) {
        return (
            StatusCode::UNAUTHORIZED,
            status_message("fail", "Unable to login: username or password invalid"),
        )
            .into_response();
    }

    let token = state.sessions.create(&body.username);
    let cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={SESSION_TTL_SECS}"
    );
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        status_message("success", "User logged in successfully"),
    )
        .into_response()
}

/// POST /api/logout — revoke the session and clear the cookie.
async fn handle_logout(
    State(state): State<ConsoleState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        state.sessions.revoke(&token);
    }
    let cookie = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0");
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        status_message("success", "Logged out successfully"),
    )
}

/// GET /api/whoami — the account this console session belongs to.
async fn handle_whoami(
    State(state): State<ConsoleState>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    match session_user(&state, &headers) {
        Some(username) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "success", "username": username })),
        ),
        None => not_logged_in(),
    }
}

#[derive(Deserialize)]
struct ChangePasswordBody {
    new_password: String,
}

/// POST /api/change_password — for the logged-in account, same salt.
async fn handle_change_password(
    State(state): State<ConsoleState>,
    headers: HeaderMap,
    body: Result<Json<ChangePasswordBody>, axum::extract::rejection::JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Some(username) = session_user(&state, &headers) else {
        return not_logged_in();
    };
    let Ok(Json(body)) = body else {
        return (
            StatusCode::BAD_REQUEST,
            status_message("fail", "Invalid request: expected new_password"),
        );
    };
    if state.accounts.change_password(&username, &body.new_password) {
        (
            StatusCode::OK,
            status_message("success", "Password changed successfully"),
        )
    } else {
        (
            StatusCode::BAD_REQUEST,
            status_message("fail", "Unable to change password"),
        )
    }
}

fn default_grade() -> u8 {
    1
}

#[derive(Deserialize)]
struct AddUserBody {
    username: String,
    password: String,
    #[serde(default)]
    is_admin: bool,
    #[serde(default = "default_grade")]
    admin_grade: u8,
}

/// POST /api/add_user — create an account directly. Requires a live
/// admin bit on the stored record, not just a session snapshot.
async fn handle_add_user(
    State(state): State<ConsoleState>,
    headers: HeaderMap,
    body: Result<Json<AddUserBody>, axum::extract::rejection::JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Some(username) = session_user(&state, &headers) else {
        return not_logged_in();
    };
    if !state.accounts.user_is_admin(&username) {
        return (
            StatusCode::FORBIDDEN,
            status_message("fail", "Adding users requires administrator access"),
        );
    }
    let Ok(Json(body)) = body else {
        return (
            StatusCode::BAD_REQUEST,
            status_message("fail", "Invalid request: expected username and password"),
        );
    };
    if state
        .accounts
        .create_user(&body.username, &body.password, body.is_admin, body.admin_grade)
    {
        (
            StatusCode::CREATED,
            status_message("success", "User created successfully"),
        )
    } else {
        (
            StatusCode::CONFLICT,
            status_message("fail", "Username already exists"),
        )
    }
}

/// GET /api/status — listener vitals and a host telemetry snapshot.
async fn handle_status(State(state): State<ConsoleState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "server_name": state.server_name,
        "api_port": state.api_stats.port(),
        "connections": state.api_stats.connections(),
        "uptime_secs": state.api_stats.uptime_secs(),
        "host": telemetry::snapshot(),
    }))
}

/// POST /api/activity/{name} — named server activities. Only
/// `shutdown` is wired; unknown names get a defined failure.
async fn handle_activity(
    State(state): State<ConsoleState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    match name.as_str() {
        "shutdown" => {
            let Some(username) = session_user(&state, &headers) else {
                return not_logged_in();
            };
            tracing::warn!(user = %username, "Shutdown requested from the web console");
            let _ = state.shutdown.send(true);
            (
                StatusCode::OK,
                status_message(
                    "success",
                    "Server is shutting down, the connection will be lost",
                ),
            )
        }
        _ => {
            tracing::warn!(activity = %name, "Unknown activity");
            (
                StatusCode::BAD_REQUEST,
                status_message("fail", "Unknown activity"),
            )
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_create_resolve_revoke() {
        let sessions = ConsoleSessions::new();
        let token = sessions.create("alice");
        assert_eq!(sessions.resolve(&token).as_deref(), Some("alice"));

        sessions.revoke(&token);
        assert!(sessions.resolve(&token).is_none());
        assert!(sessions.resolve("made_up_token").is_none());
    }

    #[test]
    fn expired_sessions_stop_resolving() {
        let sessions = ConsoleSessions::with_ttl(Duration::from_millis(0));
        let token = sessions.create("alice");
        std::thread::sleep(Duration::from_millis(5));
        assert!(sessions.resolve(&token).is_none());
    }

    #[test]
    fn tokens_are_unique_per_login() {
        let sessions = ConsoleSessions::new();
        let a = sessions.create("alice");
        let b = sessions.create("alice");
        assert_ne!(a, b);
        assert_eq!(sessions.resolve(&a).as_deref(), Some("alice"));
        assert_eq!(sessions.resolve(&b).as_deref(), Some("alice"));
    }

    #[test]
    fn session_token_is_parsed_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("theme=dark; {SESSION_COOKIE}=abc123; other=1")
                .parse()
                .unwrap(),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));

        let mut empty = HeaderMap::new();
        assert!(session_token(&empty).is_none());
        empty.insert(header::COOKIE, format!("{SESSION_COOKIE}=").parse().unwrap());
        assert!(session_token(&empty).is_none());
    }
}
