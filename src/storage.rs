use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;

/// Backing store for uploaded PDF files, keyed by the stored filename
/// recorded in each book entry.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()>;
    /// Returns `None` when no object exists under `key`.
    async fn get_object(&self, key: &str) -> anyhow::Result<Option<Bytes>>;
    /// Deleting a missing object is not an error.
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
}

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub async fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("create upload dir {}", root.display()))?;
        tracing::debug!(dir = %root.display(), "upload directory ready");
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()> {
        // write to a temp name, then rename into place; a readable object
        // under `key` is always complete
        let tmp = self.path_for(&format!("{key}.part"));
        let dst = self.path_for(key);
        tokio::fs::write(&tmp, &body)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &dst)
            .await
            .with_context(|| format!("rename into {}", dst.display()))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> anyhow::Result<Option<Bytes>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read object {key}")),
        }
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("delete object {key}")),
        }
    }
}

/// In-memory storage for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemStorage {
    objects: std::sync::Mutex<std::collections::HashMap<String, Bytes>>,
}

#[cfg(test)]
impl MemStorage {
    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl StorageClient for MemStorage {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> anyhow::Result<Option<Bytes>> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn temp_storage() -> (LocalStorage, PathBuf) {
        let dir = std::env::temp_dir().join(format!("pdfshelf-test-{}", Uuid::new_v4().simple()));
        let storage = LocalStorage::new(dir.clone()).await.expect("create storage");
        (storage, dir)
    }

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let (storage, dir) = temp_storage().await;
        let body = Bytes::from_static(b"%PDF-1.4 test");

        storage.put_object("a.pdf", body.clone()).await.unwrap();
        let read = storage.get_object("a.pdf").await.unwrap();
        assert_eq!(read, Some(body));

        // rename discipline leaves no temp file behind
        assert!(!dir.join("a.pdf.part").exists());

        storage.delete_object("a.pdf").await.unwrap();
        assert_eq!(storage.get_object("a.pdf").await.unwrap(), None);

        tokio::fs::remove_dir_all(dir).await.ok();
    }

    #[tokio::test]
    async fn get_missing_is_none_and_delete_missing_is_ok() {
        let (storage, dir) = temp_storage().await;
        assert_eq!(storage.get_object("ghost.pdf").await.unwrap(), None);
        assert!(storage.delete_object("ghost.pdf").await.is_ok());
        tokio::fs::remove_dir_all(dir).await.ok();
    }
}
