use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    /// Display author of the document, not the uploading account.
    pub author: String,
    pub category: String,
    pub description: String,
    /// Server-generated on-disk name, never derived from user input.
    pub stored_filename: String,
    pub size_bytes: u64,
    pub uploaded_by: Uuid,
    pub uploaded_at: OffsetDateTime,
    pub downloads: u64,
    pub views: u64,
}

/// Metadata-only edit. `None` leaves a field unchanged.
#[derive(Debug, Default, Clone)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

/// In-memory book store, one lock for the whole map.
#[derive(Default)]
pub struct BookStore {
    inner: RwLock<HashMap<Uuid, Book>>,
}

impl BookStore {
    pub async fn insert(&self, book: Book) -> Result<Book, AppError> {
        let mut map = self.inner.write().await;
        if map.contains_key(&book.id) {
            return Err(AppError::Conflict("Book id already exists"));
        }
        map.insert(book.id, book.clone());
        Ok(book)
    }

    pub async fn get(&self, id: Uuid) -> Option<Book> {
        self.inner.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) -> Option<Book> {
        self.inner.write().await.remove(&id)
    }

    pub async fn update_meta(&self, id: Uuid, patch: BookPatch) -> Option<Book> {
        let mut map = self.inner.write().await;
        let book = map.get_mut(&id)?;
        if let Some(title) = patch.title {
            book.title = title;
        }
        if let Some(author) = patch.author {
            book.author = author;
        }
        if let Some(category) = patch.category {
            book.category = category;
        }
        if let Some(description) = patch.description {
            book.description = description;
        }
        Some(book.clone())
    }

    /// Linear-scan filter: case-insensitive substring match on title,
    /// author and description, optional exact category, optional uploader
    /// scope. Results newest first.
    pub async fn search(
        &self,
        query: Option<&str>,
        category: Option<&str>,
        uploaded_by: Option<Uuid>,
    ) -> Vec<Book> {
        let map = self.inner.read().await;
        let query = query.map(str::to_lowercase);
        let mut results: Vec<Book> = map
            .values()
            .filter(|b| uploaded_by.map_or(true, |u| b.uploaded_by == u))
            .filter(|b| category.map_or(true, |c| b.category == c))
            .filter(|b| {
                query.as_deref().map_or(true, |q| {
                    b.title.to_lowercase().contains(q)
                        || b.author.to_lowercase().contains(q)
                        || b.description.to_lowercase().contains(q)
                })
            })
            .cloned()
            .collect();
        results.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        results
    }

    /// All books, newest first.
    pub async fn list(&self) -> Vec<Book> {
        self.search(None, None, None).await
    }

    pub async fn recent(&self, n: usize) -> Vec<Book> {
        let mut books = self.list().await;
        books.truncate(n);
        books
    }

    /// Sorted distinct categories.
    pub async fn categories(&self) -> Vec<String> {
        let map = self.inner.read().await;
        let mut cats: Vec<String> = map
            .values()
            .map(|b| b.category.clone())
            .filter(|c| !c.is_empty())
            .collect();
        cats.sort();
        cats.dedup();
        cats
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Bump the download counter; returns the new value if the book exists.
    pub async fn record_download(&self, id: Uuid) -> Option<u64> {
        let mut map = self.inner.write().await;
        let book = map.get_mut(&id)?;
        book.downloads += 1;
        Some(book.downloads)
    }

    /// Bump the view counter; returns the new value if the book exists.
    pub async fn record_view(&self, id: Uuid) -> Option<u64> {
        let mut map = self.inner.write().await;
        let book = map.get_mut(&id)?;
        book.views += 1;
        Some(book.views)
    }
}
