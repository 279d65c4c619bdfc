use std::sync::Arc;

use axum::extract::FromRef;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::password::hash_password;
use crate::auth::repo::{User, UserStore};
use crate::auth::roles::Role;
use crate::auth::sessions::SessionStore;
use crate::books::repo::BookStore;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::storage::{LocalStorage, StorageClient};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserStore>,
    pub books: Arc<BookStore>,
    pub sessions: Arc<SessionStore>,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
}

impl FromRef<AppState> for Arc<SessionStore> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let storage =
            Arc::new(LocalStorage::new(config.upload_dir.clone()).await?) as Arc<dyn StorageClient>;

        let state = Self {
            users: Arc::new(UserStore::default()),
            books: Arc::new(BookStore::default()),
            sessions: Arc::new(SessionStore::default()),
            config,
            storage,
        };
        state.seed_users().await?;
        Ok(state)
    }

    /// Resolve the account behind an authenticated request. A deleted user
    /// fails closed even while their token is still valid.
    pub async fn require_user(&self, user_id: Uuid) -> Result<User, AppError> {
        self.users
            .get(user_id)
            .await
            .ok_or(AppError::Authentication("Session user no longer exists"))
    }

    async fn seed_users(&self) -> anyhow::Result<()> {
        if self.users.count().await > 0 {
            return Ok(());
        }
        for (username, email, password, role) in [
            ("admin", "admin@example.com", "admin123", Role::Admin),
            ("author1", "author@example.com", "author123", Role::Author),
            ("reader1", "reader@example.com", "reader123", Role::Reader),
        ] {
            let user = User {
                id: Uuid::new_v4(),
                username: username.into(),
                email: email.into(),
                password_hash: hash_password(password)?,
                role,
                created_at: OffsetDateTime::now_utc(),
            };
            self.users.insert(user).await?;
        }
        tracing::info!("seeded default users (admin, author1, reader1)");
        Ok(())
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with_storage(Arc::new(crate::storage::MemStorage::default()))
    }

    #[cfg(test)]
    pub fn fake_with_storage(storage: Arc<dyn StorageClient>) -> Self {
        use crate::config::SessionConfig;
        use std::path::PathBuf;

        let config = Arc::new(AppConfig {
            session: SessionConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            upload_dir: PathBuf::from("uploads-test"),
            max_upload_bytes: 16 * 1024 * 1024,
        });

        Self {
            users: Arc::new(UserStore::default()),
            books: Arc::new(BookStore::default()),
            sessions: Arc::new(SessionStore::default()),
            config,
            storage,
        }
    }
}
