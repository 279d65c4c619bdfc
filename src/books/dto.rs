use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::books::repo::Book;

/// Public view of a book. The stored filename stays server-side.
#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub category: String,
    pub description: String,
    pub size_bytes: u64,
    pub uploaded_by: Uuid,
    pub uploaded_at: OffsetDateTime,
    pub downloads: u64,
    pub views: u64,
}

impl From<Book> for BookResponse {
    fn from(b: Book) -> Self {
        Self {
            id: b.id,
            title: b.title,
            author: b.author,
            category: b.category,
            description: b.description,
            size_bytes: b.size_bytes,
            uploaded_by: b.uploaded_by,
            uploaded_at: b.uploaded_at,
            downloads: b.downloads,
            views: b.views,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub category: Option<String>,
    /// Restrict results to the caller's own uploads.
    #[serde(default)]
    pub mine: bool,
}

#[derive(Debug, Deserialize)]
pub struct EditBookRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OverviewResponse {
    pub recent_books: Vec<BookResponse>,
    pub total_books: usize,
    pub total_users: usize,
}
