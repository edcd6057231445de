//! REST surface: account lifecycle, profile edits, user search, and file
//! uploads. Session state rides in an HttpOnly cookie; the WebSocket
//! endpoint shares it.

use crate::gateway;
use crate::router::{ServerState, now_ms};
use axum::Router;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{AppendHeaders, IntoResponse, Json, Response};
use axum::routing::{get, post};
use banter_auth::password::{hash_password, verify_password};
use banter_auth::username::validate_username;
use banter_proto::SESSION_COOKIE;
use banter_proto::protocol::UserProfile;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::services::ServeDir;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const SESSION_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/me", get(me))
        .route("/api/search_users", get(search_users))
        .route("/api/update_avatar", post(update_avatar))
        .route("/api/update_username", post(update_username))
        .route("/api/upload", post(upload))
        .route("/ws", get(gateway::ws_handler))
        .nest_service("/uploads", ServeDir::new(&state.upload_dir))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct Credentials {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
}

#[derive(Debug, Deserialize)]
struct AvatarUpdate {
    #[serde(rename = "newAvatarUrl")]
    new_avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsernameUpdate {
    username: Option<String>,
}

/// POST /api/register - Create an account and start a session.
async fn register(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<Credentials>,
) -> Response {
    let username = body.username.unwrap_or_default();
    let password = body.password.unwrap_or_default();
    if username.is_empty() || password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "Username and password are required.",
        )
            .into_response();
    }
    if let Err(reason) = validate_username(&username) {
        return (StatusCode::BAD_REQUEST, reason).into_response();
    }

    let password_hash = match hash_password(&password) {
        Ok(hash) => hash,
        Err(err) => return internal_error(err),
    };

    let profile = {
        let mut store = state.store.lock().await;
        if store.username_taken(&username) {
            return (StatusCode::CONFLICT, "User already exists.").into_response();
        }
        match store.create_user(&username, &password_hash) {
            Ok(user) => user.profile(),
            Err(err) => return internal_error(err),
        }
    };

    let token = state.sessions.lock().await.create(&profile.id);
    (
        StatusCode::CREATED,
        AppendHeaders([(header::SET_COOKIE, session_cookie(&token))]),
        Json(profile),
    )
        .into_response()
}

/// POST /api/login - Verify credentials and start a session.
async fn login(State(state): State<Arc<ServerState>>, Json(body): Json<Credentials>) -> Response {
    let username = body.username.unwrap_or_default();
    let password = body.password.unwrap_or_default();
    if username.is_empty() || password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Username or password missing.").into_response();
    }

    let profile = {
        let store = state.store.lock().await;
        let Some(user) = store.user_by_username(&username) else {
            return (StatusCode::UNAUTHORIZED, "Invalid username or password.").into_response();
        };
        if !verify_password(&password, &user.password_hash) {
            return (StatusCode::UNAUTHORIZED, "Invalid username or password.").into_response();
        }
        user.profile()
    };

    let token = state.sessions.lock().await.create(&profile.id);
    (
        AppendHeaders([(header::SET_COOKIE, session_cookie(&token))]),
        Json(profile),
    )
        .into_response()
}

/// POST /api/logout - Revoke the session named by the cookie.
async fn logout(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if let Some(token) = gateway::session_token(&headers) {
        state.sessions.lock().await.revoke(&token);
    }
    (
        AppendHeaders([(header::SET_COOKIE, clear_cookie())]),
        Json(json!({ "message": "Logged out successfully" })),
    )
        .into_response()
}

/// GET /api/me - Profile of the logged-in user.
async fn me(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    let user_id = match require_session(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let store = state.store.lock().await;
    match store.user(&user_id) {
        Some(user) => Json(user.profile()).into_response(),
        None => (StatusCode::NOT_FOUND, "User not found.").into_response(),
    }
}

/// GET /api/search_users - Username prefix search, excluding the caller.
async fn search_users(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Response {
    let user_id = match require_session(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    if params.query.chars().count() < 2 {
        return Json(Vec::<UserProfile>::new()).into_response();
    }
    let store = state.store.lock().await;
    Json(store.search_users(&params.query, &user_id)).into_response()
}

/// POST /api/update_avatar - Point the caller's profile at a new image URL.
async fn update_avatar(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(body): Json<AvatarUpdate>,
) -> Response {
    let user_id = match require_session(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let url = body.new_avatar_url.unwrap_or_default();
    if url.is_empty() {
        return (StatusCode::BAD_REQUEST, "New avatar URL is required.").into_response();
    }

    let mut store = state.store.lock().await;
    if store.user(&user_id).is_none() {
        return (StatusCode::NOT_FOUND, "User not found.").into_response();
    }
    match store.update_avatar(&user_id, &url) {
        Ok(user) => Json(json!({
            "message": "Avatar updated successfully",
            "user": user.profile(),
        }))
        .into_response(),
        Err(err) => internal_error(err),
    }
}

/// POST /api/update_username - Rename the caller, enforcing uniqueness.
async fn update_username(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(body): Json<UsernameUpdate>,
) -> Response {
    let user_id = match require_session(&state, &headers).await {
        Ok(user_id) => user_id,
        Err(resp) => return resp,
    };
    let username = body.username.unwrap_or_default();
    if let Err(reason) = validate_username(&username) {
        return (StatusCode::BAD_REQUEST, reason).into_response();
    }

    let mut store = state.store.lock().await;
    if store.user(&user_id).is_none() {
        return (StatusCode::NOT_FOUND, "User not found.").into_response();
    }
    if let Some(existing) = store.user_by_username(&username)
        && existing.id != user_id
    {
        return (StatusCode::CONFLICT, "Username is already taken.").into_response();
    }
    match store.update_username(&user_id, &username) {
        Ok(user) => Json(json!({
            "message": "Username updated successfully",
            "user": user.profile(),
        }))
        .into_response(),
        Err(err) => internal_error(err),
    }
}

/// POST /api/upload - Store a media file and return its serving URL.
async fn upload(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if let Err(resp) = require_session(&state, &headers).await {
        return resp;
    }

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "upload".to_string());
        let mime = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(err) => return internal_error(err.into()),
        };

        // Timestamp prefix keeps repeated uploads of the same file apart.
        let file_name = format!("{}-{}", now_ms(), sanitize_file_name(&original_name));
        let path = state.upload_dir.join(&file_name);
        if let Err(err) = tokio::fs::write(&path, &data).await {
            return internal_error(err.into());
        }

        return Json(json!({
            "url": format!("/uploads/{file_name}"),
            "type": mime,
            "name": original_name,
        }))
        .into_response();
    }

    (StatusCode::BAD_REQUEST, "No file").into_response()
}

async fn require_session(
    state: &Arc<ServerState>,
    headers: &HeaderMap,
) -> Result<String, Response> {
    let Some(token) = gateway::session_token(headers) else {
        return Err(
            (StatusCode::UNAUTHORIZED, "Unauthorized: Session required.").into_response(),
        );
    };
    let sessions = state.sessions.lock().await;
    match sessions.resolve(&token) {
        Some(user_id) => Ok(user_id.to_string()),
        // The cookie names a dead session; tell the browser to drop it.
        None => Err((
            StatusCode::UNAUTHORIZED,
            AppendHeaders([(header::SET_COOKIE, clear_cookie())]),
            "Unauthorized: Invalid session.",
        )
            .into_response()),
    }
}

fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; HttpOnly; Path=/; Max-Age={SESSION_MAX_AGE_SECS}")
}

fn clear_cookie() -> String {
    format!("{SESSION_COOKIE}=; HttpOnly; Path=/; Max-Age=0")
}

/// Strip any path components and spaces from a client-supplied file name.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.replace(' ', "_")
}

fn internal_error(err: anyhow::Error) -> Response {
    tracing::error!(error = ?err, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.").into_response()
}
