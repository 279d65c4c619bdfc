use std::collections::HashMap;

use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub expires_at: OffsetDateTime,
}

/// Server-side session records. A signed token is only honored while its
/// session id is present here and unexpired; logout and user deletion
/// remove records, which fails all outstanding tokens closed.
#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<HashMap<Uuid, Session>>,
}

impl SessionStore {
    /// Insert or refresh a session record.
    pub async fn insert(&self, session_id: Uuid, user_id: Uuid, expires_at: OffsetDateTime) {
        self.inner
            .write()
            .await
            .insert(session_id, Session { user_id, expires_at });
    }

    /// True while the session exists and has not expired. Expired records
    /// are dropped on observation.
    pub async fn is_active(&self, session_id: Uuid) -> bool {
        let mut map = self.inner.write().await;
        match map.get(&session_id) {
            Some(s) if s.expires_at > OffsetDateTime::now_utc() => true,
            Some(_) => {
                map.remove(&session_id);
                false
            }
            None => false,
        }
    }

    pub async fn remove(&self, session_id: Uuid) -> bool {
        self.inner.write().await.remove(&session_id).is_some()
    }

    /// Destroy every session belonging to `user_id`.
    pub async fn remove_user(&self, user_id: Uuid) {
        self.inner.write().await.retain(|_, s| s.user_id != user_id);
    }
}
