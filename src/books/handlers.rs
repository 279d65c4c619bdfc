use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use bytes::Bytes;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    auth::roles::Capability,
    books::dto::{BookResponse, EditBookRequest, OverviewResponse, SearchParams},
    books::repo::BookPatch,
    books::services::{self, UploadMeta},
    error::AppError,
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/books", get(list_books))
        .route("/books/:id", get(get_book))
        .route("/books/:id/download", get(download_book))
        .route("/books/:id/read", get(read_book))
        .route("/categories", get(list_categories))
        .route("/overview", get(overview))
}

pub fn write_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/books", post(upload_book))
        .route("/books/:id", put(edit_book).delete(delete_book))
        // slack covers the multipart framing around the file itself
        .layer(DefaultBodyLimit::max(max_upload_bytes + 64 * 1024))
}

#[instrument(skip(state))]
pub async fn list_books(
    State(state): State<AppState>,
    caller: Option<AuthUser>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<BookResponse>>, AppError> {
    let uploaded_by = if params.mine {
        let caller = caller.ok_or(AppError::Authentication(
            "Authentication required to filter by own uploads",
        ))?;
        Some(caller.user_id)
    } else {
        None
    };

    let q = params.q.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let category = params
        .category
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let books = state.books.search(q, category, uploaded_by).await;
    Ok(Json(books.into_iter().map(BookResponse::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookResponse>, AppError> {
    let book = state
        .books
        .get(id)
        .await
        .ok_or(AppError::NotFound("Book not found"))?;
    Ok(Json(book.into()))
}

#[instrument(skip(state))]
pub async fn list_categories(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.books.categories().await)
}

#[instrument(skip(state))]
pub async fn overview(State(state): State<AppState>) -> Json<OverviewResponse> {
    let recent_books = state
        .books
        .recent(6)
        .await
        .into_iter()
        .map(BookResponse::from)
        .collect();
    Json(OverviewResponse {
        recent_books,
        total_books: state.books.count().await,
        total_users: state.users.count().await,
    })
}

#[instrument(skip(state, mp))]
pub async fn upload_book(
    State(state): State<AppState>,
    auth: AuthUser,
    mut mp: Multipart,
) -> Result<(StatusCode, HeaderMap, Json<BookResponse>), AppError> {
    let uploader = state.require_user(auth.user_id).await?;

    fn malformed() -> AppError {
        AppError::Validation("Malformed multipart body".into())
    }

    let mut title = String::new();
    let mut author = String::new();
    let mut category = String::new();
    let mut description = String::new();
    let mut file: Option<(String, String, Bytes)> = None;

    while let Some(field) = mp.next_field().await.map_err(|_| malformed())? {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("title") => title = field.text().await.map_err(|_| malformed())?,
            Some("author") => author = field.text().await.map_err(|_| malformed())?,
            Some("category") => category = field.text().await.map_err(|_| malformed())?,
            Some("description") => description = field.text().await.map_err(|_| malformed())?,
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let body = field.bytes().await.map_err(|_| malformed())?;
                file = Some((file_name, content_type, body));
            }
            _ => {}
        }
    }

    let (file_name, content_type, body) =
        file.ok_or_else(|| AppError::Validation("No file selected".into()))?;
    let meta = UploadMeta {
        title: title.trim().to_string(),
        author: author.trim().to_string(),
        category: category.trim().to_string(),
        description: description.trim().to_string(),
    };

    let book = services::store_book(&state, &uploader, meta, &file_name, &content_type, body).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::LOCATION,
        format!("/api/v1/books/{}", book.id).parse().unwrap(),
    );
    Ok((StatusCode::CREATED, headers, Json(book.into())))
}

#[instrument(skip(state, payload))]
pub async fn edit_book(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<EditBookRequest>,
) -> Result<Json<BookResponse>, AppError> {
    let caller = state.require_user(auth.user_id).await?;
    let patch = BookPatch {
        title: payload.title.map(|s| s.trim().to_string()),
        author: payload.author.map(|s| s.trim().to_string()),
        category: payload.category.map(|s| s.trim().to_string()),
        description: payload.description.map(|s| s.trim().to_string()),
    };
    let book = services::edit_book(&state, &caller, id, patch).await?;
    Ok(Json(book.into()))
}

#[instrument(skip(state))]
pub async fn delete_book(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let caller = state.require_user(auth.user_id).await?;
    services::delete_book(&state, &caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn download_book(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<(HeaderMap, Bytes), AppError> {
    let caller = state.require_user(auth.user_id).await?;
    caller.role.require(Capability::Download)?;
    let (book, bytes) = services::download_book_file(&state, id).await?;
    Ok((pdf_headers(&book.title, "attachment"), bytes))
}

#[instrument(skip(state))]
pub async fn read_book(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<(HeaderMap, Bytes), AppError> {
    let caller = state.require_user(auth.user_id).await?;
    caller.role.require(Capability::Download)?;
    let (book, bytes) = services::read_book_file(&state, id).await?;
    Ok((pdf_headers(&book.title, "inline"), bytes))
}

fn pdf_headers(title: &str, disposition: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, "application/pdf".parse().unwrap());
    headers.insert(
        header::CONTENT_DISPOSITION,
        format!("{disposition}; filename=\"{}\"", download_file_name(title))
            .parse()
            .unwrap(),
    );
    headers
}

/// Client-facing file name built from the title; anything outside a safe
/// ASCII subset is replaced so the header value always parses.
fn download_file_name(title: &str) -> String {
    let safe: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe = safe.trim();
    if safe.is_empty() {
        "book.pdf".into()
    } else {
        format!("{safe}.pdf")
    }
}
