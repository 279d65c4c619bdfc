use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, ProfileResponse, RefreshRequest, RegisterRequest},
        jwt::{AuthUser, JwtKeys},
        password::{hash_password, verify_password},
        repo::User,
        roles::Capability,
    },
    books::dto::BookResponse,
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

/// Create a server-side session record and sign the matching token pair.
async fn issue_session(state: &AppState, user: &User) -> Result<(String, String), AppError> {
    let keys = JwtKeys::from_ref(state);
    let session_id = Uuid::new_v4();
    let expires_at =
        OffsetDateTime::now_utc() + TimeDuration::seconds(keys.refresh_ttl.as_secs() as i64);
    state.sessions.insert(session_id, user.id, expires_at).await;
    let access_token = keys.sign_access(user.id, session_id)?;
    let refresh_token = keys.sign_refresh(user.id, session_id)?;
    Ok((access_token, refresh_token))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    payload.username = payload.username.trim().to_string();
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_username(&payload.username) {
        warn!(username = %payload.username, "invalid username");
        return Err(AppError::Validation(
            "Username must be 3-32 characters of letters, digits, '_', '.' or '-'".into(),
        ));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(AppError::Validation(
            "Password must be at least 8 characters".into(),
        ));
    }
    if state.users.find_by_username(&payload.username).await.is_some() {
        warn!(username = %payload.username, "username already taken");
        return Err(AppError::Conflict("Username already taken"));
    }

    let hash = hash_password(&payload.password)?;
    let user = state
        .users
        .insert(User {
            id: Uuid::new_v4(),
            username: payload.username,
            email: payload.email,
            password_hash: hash,
            role: payload.role,
            created_at: OffsetDateTime::now_utc(),
        })
        .await?;

    let (access_token, refresh_token) = issue_session(&state, &user).await?;

    info!(user_id = %user.id, username = %user.username, role = %user.role, "user registered");
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    payload.username = payload.username.trim().to_string();

    let user = match state.users.find_by_username(&payload.username).await {
        Some(u) => u,
        None => {
            warn!(username = %payload.username, "login unknown username");
            return Err(AppError::Authentication("Invalid credentials"));
        }
    };

    let ok = verify_password(&payload.password, &user.password_hash)?;
    if !ok {
        warn!(username = %payload.username, user_id = %user.id, "login invalid password");
        return Err(AppError::Authentication("Invalid credentials"));
    }

    let (access_token, refresh_token) = issue_session(&state, &user).await?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|_| AppError::Authentication("Invalid or expired token"))?;

    if !state.sessions.is_active(claims.sid).await {
        warn!(user_id = %claims.sub, "refresh for inactive session");
        return Err(AppError::Authentication("Session is no longer active"));
    }
    let user = state.require_user(claims.sub).await?;

    // re-issue the pair against the same session record, extending it
    let expires_at =
        OffsetDateTime::now_utc() + TimeDuration::seconds(keys.refresh_ttl.as_secs() as i64);
    state.sessions.insert(claims.sid, user.id, expires_at).await;
    let access_token = keys.sign_access(user.id, claims.sid)?;
    let refresh_token = keys.sign_refresh(user.id, claims.sid)?;

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
    }))
}

#[instrument(skip(state))]
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    state.sessions.remove(auth.session_id).await;
    info!(user_id = %auth.user_id, "user logged out");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = state.require_user(auth.user_id).await?;
    let uploads: Vec<BookResponse> = if user.role.grants(Capability::Upload) {
        state
            .books
            .search(None, None, Some(user.id))
            .await
            .into_iter()
            .map(BookResponse::from)
            .collect()
    } else {
        Vec::new()
    };
    Ok(Json(ProfileResponse {
        user: user.into(),
        uploads,
    }))
}
