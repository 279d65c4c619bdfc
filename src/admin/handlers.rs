use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::dto::PublicUser,
    auth::jwt::AuthUser,
    auth::roles::Capability,
    books::dto::BookResponse,
    error::AppError,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin", get(dashboard))
        .route("/admin/users/:id", delete(delete_user))
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub users: Vec<PublicUser>,
    pub books: Vec<BookResponse>,
}

#[instrument(skip(state))]
pub async fn dashboard(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<DashboardResponse>, AppError> {
    let caller = state.require_user(auth.user_id).await?;
    caller.role.require(Capability::ManageUsers)?;

    let users = state
        .users
        .list()
        .await
        .into_iter()
        .map(PublicUser::from)
        .collect();
    let books = state
        .books
        .list()
        .await
        .into_iter()
        .map(BookResponse::from)
        .collect();
    Ok(Json(DashboardResponse { users, books }))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let caller = state.require_user(auth.user_id).await?;
    caller.role.require(Capability::ManageUsers)?;

    if user_id == caller.id {
        return Err(AppError::Validation(
            "You cannot delete your own account".into(),
        ));
    }

    let removed = state
        .users
        .remove(user_id)
        .await
        .ok_or(AppError::NotFound("User not found"))?;
    // fail their outstanding tokens closed
    state.sessions.remove_user(user_id).await;

    info!(deleted = %removed.username, caller = %caller.username, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::auth::password::hash_password;
    use crate::auth::repo::User;
    use crate::auth::roles::Role;

    async fn seed_user(state: &AppState, username: &str, role: Role) -> User {
        let user = User {
            id: Uuid::new_v4(),
            username: username.into(),
            email: format!("{username}@example.com"),
            password_hash: hash_password("password123").unwrap(),
            role,
            created_at: OffsetDateTime::now_utc(),
        };
        state.users.insert(user).await.unwrap()
    }

    fn as_auth(user: &User) -> AuthUser {
        AuthUser {
            user_id: user.id,
            session_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn dashboard_is_admin_only() {
        let state = AppState::fake();
        let admin = seed_user(&state, "root", Role::Admin).await;
        let author = seed_user(&state, "alice", Role::Author).await;

        let err = dashboard(State(state.clone()), as_auth(&author))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        let resp = dashboard(State(state), as_auth(&admin)).await.unwrap();
        assert_eq!(resp.0.users.len(), 2);
        assert!(resp.0.books.is_empty());
    }

    #[tokio::test]
    async fn admin_cannot_delete_own_account() {
        let state = AppState::fake();
        let admin = seed_user(&state, "root", Role::Admin).await;

        let err = delete_user(State(state.clone()), as_auth(&admin), Path(admin.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(state.users.get(admin.id).await.is_some());
    }

    #[tokio::test]
    async fn deleting_a_user_destroys_their_sessions() {
        let state = AppState::fake();
        let admin = seed_user(&state, "root", Role::Admin).await;
        let reader = seed_user(&state, "bob", Role::Reader).await;

        let sid = Uuid::new_v4();
        state
            .sessions
            .insert(sid, reader.id, OffsetDateTime::now_utc() + Duration::hours(1))
            .await;

        delete_user(State(state.clone()), as_auth(&admin), Path(reader.id))
            .await
            .unwrap();
        assert!(state.users.get(reader.id).await.is_none());
        assert!(!state.sessions.is_active(sid).await);

        // and a deleted user no longer resolves for request handling
        let err = state.require_user(reader.id).await.unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[tokio::test]
    async fn non_admin_cannot_delete_users() {
        let state = AppState::fake();
        let author = seed_user(&state, "alice", Role::Author).await;
        let reader = seed_user(&state, "bob", Role::Reader).await;

        let err = delete_user(State(state.clone()), as_auth(&author), Path(reader.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
        assert!(state.users.get(reader.id).await.is_some());
    }
}
