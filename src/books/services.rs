use std::path::Path;

use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::repo::User,
    auth::roles::Capability,
    books::repo::{Book, BookPatch},
    error::AppError,
    state::AppState,
};

pub struct UploadMeta {
    pub title: String,
    pub author: String,
    pub category: String,
    pub description: String,
}

fn is_pdf_upload(file_name: &str, content_type: &str) -> bool {
    let ext_ok = Path::new(file_name)
        .extension()
        .map_or(false, |e| e.eq_ignore_ascii_case("pdf"));
    let ct_ok = matches!(content_type, "application/pdf" | "application/octet-stream");
    ext_ok && ct_ok
}

/// Validate and persist an upload. The file is written before the record
/// becomes visible; a failed record insert removes the orphan file.
pub async fn store_book(
    state: &AppState,
    uploader: &User,
    meta: UploadMeta,
    file_name: &str,
    content_type: &str,
    body: Bytes,
) -> Result<Book, AppError> {
    uploader.role.require(Capability::Upload)?;

    if body.is_empty() {
        return Err(AppError::Validation("No file selected".into()));
    }
    if !is_pdf_upload(file_name, content_type) {
        return Err(AppError::Validation(
            "Invalid file type. Only PDF files are allowed".into(),
        ));
    }
    let max = state.config.max_upload_bytes;
    if body.len() > max {
        return Err(AppError::Validation(format!(
            "File exceeds the maximum upload size of {max} bytes"
        )));
    }
    if meta.title.is_empty() || meta.category.is_empty() {
        return Err(AppError::Validation("Title and category are required".into()));
    }

    let stored_filename = format!("{}.pdf", Uuid::new_v4().simple());
    let size_bytes = body.len() as u64;
    state
        .storage
        .put_object(&stored_filename, body)
        .await
        .map_err(AppError::Storage)?;

    let book = Book {
        id: Uuid::new_v4(),
        title: meta.title,
        author: meta.author,
        category: meta.category,
        description: meta.description,
        stored_filename: stored_filename.clone(),
        size_bytes,
        uploaded_by: uploader.id,
        uploaded_at: OffsetDateTime::now_utc(),
        downloads: 0,
        views: 0,
    };

    match state.books.insert(book).await {
        Ok(book) => {
            info!(book_id = %book.id, uploader = %uploader.username, size_bytes, "book uploaded");
            Ok(book)
        }
        Err(e) => {
            // the file must not outlive a failed record insert
            if let Err(cleanup) = state.storage.delete_object(&stored_filename).await {
                error!(error = %cleanup, key = %stored_filename, "failed to remove orphan upload");
            }
            Err(e)
        }
    }
}

/// Metadata-only edit by the owner or an administrator.
pub async fn edit_book(
    state: &AppState,
    caller: &User,
    book_id: Uuid,
    patch: BookPatch,
) -> Result<Book, AppError> {
    let book = state
        .books
        .get(book_id)
        .await
        .ok_or(AppError::NotFound("Book not found"))?;
    caller.role.require_owned(
        book.uploaded_by == caller.id,
        Capability::EditOwn,
        Capability::EditAny,
    )?;

    if patch.title.as_deref().is_some_and(|t| t.is_empty()) {
        return Err(AppError::Validation("Title cannot be empty".into()));
    }
    if patch.category.as_deref().is_some_and(|c| c.is_empty()) {
        return Err(AppError::Validation("Category cannot be empty".into()));
    }

    let updated = state
        .books
        .update_meta(book_id, patch)
        .await
        .ok_or(AppError::NotFound("Book not found"))?;
    info!(book_id = %updated.id, caller = %caller.username, "book metadata updated");
    Ok(updated)
}

/// Delete a book and its backing file. The file is removed first; a
/// filesystem failure aborts with the record intact, so no partial
/// deletion is ever observable.
pub async fn delete_book(state: &AppState, caller: &User, book_id: Uuid) -> Result<Book, AppError> {
    let book = state
        .books
        .get(book_id)
        .await
        .ok_or(AppError::NotFound("Book not found"))?;
    caller.role.require_owned(
        book.uploaded_by == caller.id,
        Capability::DeleteOwn,
        Capability::DeleteAny,
    )?;

    state
        .storage
        .delete_object(&book.stored_filename)
        .await
        .map_err(AppError::Storage)?;

    let removed = state
        .books
        .remove(book_id)
        .await
        .ok_or(AppError::NotFound("Book not found"))?;
    info!(book_id = %removed.id, caller = %caller.username, "book deleted");
    Ok(removed)
}

async fn load_book_file(state: &AppState, book_id: Uuid) -> Result<(Book, Bytes), AppError> {
    let book = state
        .books
        .get(book_id)
        .await
        .ok_or(AppError::NotFound("Book not found"))?;
    let bytes = state
        .storage
        .get_object(&book.stored_filename)
        .await
        .map_err(AppError::Storage)?
        .ok_or_else(|| {
            warn!(book_id = %book.id, key = %book.stored_filename, "backing file missing");
            AppError::NotFound("File not found on server")
        })?;
    Ok((book, bytes))
}

/// Load the file for an attachment download. The download counter is
/// bumped exactly once, only after the bytes are in hand.
pub async fn download_book_file(
    state: &AppState,
    book_id: Uuid,
) -> Result<(Book, Bytes), AppError> {
    let (mut book, bytes) = load_book_file(state, book_id).await?;
    if let Some(n) = state.books.record_download(book.id).await {
        book.downloads = n;
    }
    Ok((book, bytes))
}

/// Same contract as download, but counts an inline view.
pub async fn read_book_file(state: &AppState, book_id: Uuid) -> Result<(Book, Bytes), AppError> {
    let (mut book, bytes) = load_book_file(state, book_id).await?;
    if let Some(n) = state.books.record_view(book.id).await {
        book.views = n;
    }
    Ok((book, bytes))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::auth::password::hash_password;
    use crate::auth::roles::Role;
    use crate::storage::{MemStorage, StorageClient};

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

    fn meta(title: &str, category: &str) -> UploadMeta {
        UploadMeta {
            title: title.into(),
            author: "Anon".into(),
            category: category.into(),
            description: String::new(),
        }
    }

    fn pdf_body(len: usize) -> Bytes {
        Bytes::from(vec![0u8; len])
    }

    #[tokio::test]
    async fn upload_requires_the_upload_capability() {
        let storage = Arc::new(MemStorage::default());
        let state = AppState::fake_with_storage(storage.clone());
        let reader = seed_user(&state, "bob", Role::Reader).await;

        let err = store_book(
            &state,
            &reader,
            meta("Valid", "Misc"),
            "valid.pdf",
            "application/pdf",
            pdf_body(1024),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Authorization(_)));
        assert_eq!(storage.object_count(), 0);
        assert_eq!(state.books.count().await, 0);
    }

    #[tokio::test]
    async fn upload_rejects_non_pdf_files() {
        let storage = Arc::new(MemStorage::default());
        let state = AppState::fake_with_storage(storage.clone());
        let author = seed_user(&state, "alice", Role::Author).await;

        for (name, ct) in [
            ("notes.txt", "text/plain"),
            ("notes.txt", "application/pdf"),
            ("doc.pdf", "image/png"),
        ] {
            let err = store_book(&state, &author, meta("T", "C"), name, ct, pdf_body(16))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{name} / {ct}");
        }
        assert_eq!(storage.object_count(), 0);
    }

    #[tokio::test]
    async fn oversized_upload_leaves_no_file_behind() {
        let storage = Arc::new(MemStorage::default());
        let state = AppState::fake_with_storage(storage.clone());
        let author = seed_user(&state, "alice", Role::Author).await;

        let too_big = pdf_body(state.config.max_upload_bytes + 1);
        let err = store_book(
            &state,
            &author,
            meta("Huge", "Misc"),
            "huge.pdf",
            "application/pdf",
            too_big,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(storage.object_count(), 0);
        assert_eq!(state.books.count().await, 0);
    }

    #[tokio::test]
    async fn delete_removes_entry_and_file_together() {
        let storage = Arc::new(MemStorage::default());
        let state = AppState::fake_with_storage(storage.clone());
        let author = seed_user(&state, "alice", Role::Author).await;

        let book = store_book(
            &state,
            &author,
            meta("Gone Soon", "Misc"),
            "gone.pdf",
            "application/pdf",
            pdf_body(64),
        )
        .await
        .unwrap();
        assert_eq!(storage.object_count(), 1);

        delete_book(&state, &author, book.id).await.unwrap();
        assert_eq!(storage.object_count(), 0);
        assert!(state.books.get(book.id).await.is_none());
    }

    #[tokio::test]
    async fn failed_file_delete_keeps_the_record() {
        struct FailingDelete(MemStorage);

        #[async_trait]
        impl StorageClient for FailingDelete {
            async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()> {
                self.0.put_object(key, body).await
            }
            async fn get_object(&self, key: &str) -> anyhow::Result<Option<Bytes>> {
                self.0.get_object(key).await
            }
            async fn delete_object(&self, _key: &str) -> anyhow::Result<()> {
                anyhow::bail!("disk failure")
            }
        }

        let state = AppState::fake_with_storage(Arc::new(FailingDelete(MemStorage::default())));
        let author = seed_user(&state, "alice", Role::Author).await;
        let book = store_book(
            &state,
            &author,
            meta("Sticky", "Misc"),
            "sticky.pdf",
            "application/pdf",
            pdf_body(64),
        )
        .await
        .unwrap();

        let err = delete_book(&state, &author, book.id).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        // no partial deletion: the record survives the failed file removal
        assert!(state.books.get(book.id).await.is_some());
    }

    #[tokio::test]
    async fn download_counts_exactly_once_per_success() {
        let storage = Arc::new(MemStorage::default());
        let state = AppState::fake_with_storage(storage.clone());
        let author = seed_user(&state, "alice", Role::Author).await;
        let book = store_book(
            &state,
            &author,
            meta("Counted", "Misc"),
            "counted.pdf",
            "application/pdf",
            pdf_body(64),
        )
        .await
        .unwrap();

        let (after, bytes) = download_book_file(&state, book.id).await.unwrap();
        assert_eq!(after.downloads, 1);
        assert_eq!(bytes.len(), 64);
        let (after, _) = download_book_file(&state, book.id).await.unwrap();
        assert_eq!(after.downloads, 2);

        // views are untouched by downloads
        assert_eq!(state.books.get(book.id).await.unwrap().views, 0);
        let (after, _) = read_book_file(&state, book.id).await.unwrap();
        assert_eq!(after.views, 1);
        assert_eq!(state.books.get(book.id).await.unwrap().downloads, 2);
    }

    #[tokio::test]
    async fn failed_download_does_not_count() {
        let storage = Arc::new(MemStorage::default());
        let state = AppState::fake_with_storage(storage.clone());
        let author = seed_user(&state, "alice", Role::Author).await;
        let book = store_book(
            &state,
            &author,
            meta("Vanishing", "Misc"),
            "vanish.pdf",
            "application/pdf",
            pdf_body(64),
        )
        .await
        .unwrap();

        // simulate a lost backing file
        storage.delete_object(&book.stored_filename).await.unwrap();

        let err = download_book_file(&state, book.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(state.books.get(book.id).await.unwrap().downloads, 0);

        let err = download_book_file(&state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn edit_is_owner_or_admin_only() {
        let state = AppState::fake();
        let author = seed_user(&state, "alice", Role::Author).await;
        let other = seed_user(&state, "mallory", Role::Author).await;
        let admin = seed_user(&state, "root", Role::Admin).await;
        let book = store_book(
            &state,
            &author,
            meta("Editable", "Misc"),
            "edit.pdf",
            "application/pdf",
            pdf_body(64),
        )
        .await
        .unwrap();

        let patch = BookPatch {
            description: Some("Updated".into()),
            ..Default::default()
        };
        let err = edit_book(&state, &other, book.id, patch.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        let updated = edit_book(&state, &admin, book.id, patch).await.unwrap();
        assert_eq!(updated.description, "Updated");

        let err = edit_book(
            &state,
            &author,
            book.id,
            BookPatch {
                title: Some(String::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn author_uploads_reader_downloads_reader_cannot_delete() {
        let storage = Arc::new(MemStorage::default());
        let state = AppState::fake_with_storage(storage.clone());
        let alice = seed_user(&state, "alice", Role::Author).await;
        let bob = seed_user(&state, "bob", Role::Reader).await;

        let book = store_book(
            &state,
            &alice,
            UploadMeta {
                title: "Design Patterns".into(),
                author: "Gamma".into(),
                category: "Programming".into(),
                description: "Classic catalog of object-oriented design".into(),
            },
            "design-patterns.pdf",
            "application/pdf",
            pdf_body(2 * 1024 * 1024),
        )
        .await
        .unwrap();

        let found = state.books.search(Some("design"), None, None).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, book.id);

        let (after, bytes) = download_book_file(&state, book.id).await.unwrap();
        assert_eq!(after.downloads, 1);
        assert_eq!(bytes.len(), 2 * 1024 * 1024);

        let err = delete_book(&state, &bob, book.id).await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
        assert!(state.books.get(book.id).await.is_some());
        assert_eq!(storage.object_count(), 1);
    }
}
