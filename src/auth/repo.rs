use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::roles::Role;
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: OffsetDateTime,
}

/// In-memory user store, one lock for the whole map.
#[derive(Default)]
pub struct UserStore {
    inner: RwLock<HashMap<Uuid, User>>,
}

impl UserStore {
    /// Insert a new user. Usernames are unique.
    pub async fn insert(&self, user: User) -> Result<User, AppError> {
        let mut map = self.inner.write().await;
        if map.values().any(|u| u.username == user.username) {
            return Err(AppError::Conflict("Username already taken"));
        }
        map.insert(user.id, user.clone());
        Ok(user)
    }

    pub async fn get(&self, id: Uuid) -> Option<User> {
        self.inner.read().await.get(&id).cloned()
    }

    pub async fn find_by_username(&self, username: &str) -> Option<User> {
        self.inner
            .read()
            .await
            .values()
            .find(|u| u.username == username)
            .cloned()
    }

    pub async fn remove(&self, id: Uuid) -> Option<User> {
        self.inner.write().await.remove(&id)
    }

    /// All users, newest first.
    pub async fn list(&self) -> Vec<User> {
        let mut users: Vec<User> = self.inner.read().await.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        users
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }
}
