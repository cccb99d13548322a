use crate::application::copy::{self, InventoryDependencies};
use crate::domain::commands::AddCopy;
use crate::domain::{BookId, EditionCopyId, EditionId, InvalidId};
use axum::{
    Json,
    extract::{OriginalUri, Path, State},
    http::StatusCode,
};
use chrono::Utc;
use std::sync::Arc;

use super::{
    error::ApiError,
    types::{AddCopyRequest, BookResponse, CopyResponse, EditionResponse},
};

/// 在庫サービスのハンドラー状態
#[derive(Clone)]
pub struct InventoryState {
    pub inventory: InventoryDependencies,
}

fn invalid_id(uri: &OriginalUri) -> impl Fn(InvalidId) -> ApiError + '_ {
    move |e| ApiError::bad_request(e.to_string()).at(uri.path())
}

fn failed(uri: &OriginalUri) -> impl Fn(copy::InventoryApplicationError) -> ApiError + '_ {
    move |e| ApiError::from(e).at(uri.path())
}

/// GET /copies/:id
pub async fn get_copy(
    State(state): State<Arc<InventoryState>>,
    uri: OriginalUri,
    Path(copy_id): Path<i64>,
) -> Result<Json<CopyResponse>, ApiError> {
    let copy_id = EditionCopyId::parse(copy_id).map_err(invalid_id(&uri))?;
    let copy = copy::get_copy(&state.inventory, copy_id).await.map_err(failed(&uri))?;
    Ok(Json(copy.into()))
}

/// POST /copies/:id/borrow
pub async fn borrow_copy(
    State(state): State<Arc<InventoryState>>,
    uri: OriginalUri,
    Path(copy_id): Path<i64>,
) -> Result<Json<CopyResponse>, ApiError> {
    let copy_id = EditionCopyId::parse(copy_id).map_err(invalid_id(&uri))?;
    let copy = copy::borrow_copy(&state.inventory, copy_id).await.map_err(failed(&uri))?;
    Ok(Json(copy.into()))
}

/// POST /copies/:id/return
pub async fn return_copy(
    State(state): State<Arc<InventoryState>>,
    uri: OriginalUri,
    Path(copy_id): Path<i64>,
) -> Result<Json<CopyResponse>, ApiError> {
    let copy_id = EditionCopyId::parse(copy_id).map_err(invalid_id(&uri))?;
    let copy = copy::return_copy(&state.inventory, copy_id).await.map_err(failed(&uri))?;
    Ok(Json(copy.into()))
}

/// POST /copies/:id/mark-lost
///
/// 既に紛失済みの場合は409を返す。
pub async fn mark_copy_lost(
    State(state): State<Arc<InventoryState>>,
    uri: OriginalUri,
    Path(copy_id): Path<i64>,
) -> Result<Json<CopyResponse>, ApiError> {
    let copy_id = EditionCopyId::parse(copy_id).map_err(invalid_id(&uri))?;
    let copy = copy::mark_copy_lost(&state.inventory, copy_id).await.map_err(failed(&uri))?;
    Ok(Json(copy.into()))
}

/// GET /editions/:id
pub async fn get_edition(
    State(state): State<Arc<InventoryState>>,
    uri: OriginalUri,
    Path(edition_id): Path<i64>,
) -> Result<Json<EditionResponse>, ApiError> {
    let edition_id = EditionId::parse(edition_id).map_err(invalid_id(&uri))?;
    let edition = copy::get_edition(&state.inventory, edition_id).await.map_err(failed(&uri))?;
    Ok(Json(edition.into()))
}

/// GET /editions/:id/copies
pub async fn list_edition_copies(
    State(state): State<Arc<InventoryState>>,
    uri: OriginalUri,
    Path(edition_id): Path<i64>,
) -> Result<Json<Vec<CopyResponse>>, ApiError> {
    let edition_id = EditionId::parse(edition_id).map_err(invalid_id(&uri))?;
    let copies = copy::list_copies(&state.inventory, edition_id).await.map_err(failed(&uri))?;
    Ok(Json(copies.into_iter().map(CopyResponse::from).collect()))
}

/// POST /editions/:id/copies - 版にコピーを追加
pub async fn add_edition_copy(
    State(state): State<Arc<InventoryState>>,
    uri: OriginalUri,
    Path(edition_id): Path<i64>,
    Json(req): Json<AddCopyRequest>,
) -> Result<(StatusCode, Json<CopyResponse>), ApiError> {
    let cmd = AddCopy {
        edition_id: EditionId::parse(edition_id).map_err(invalid_id(&uri))?,
        acquired_at: req.acquired_at.unwrap_or_else(Utc::now),
    };

    let copy = copy::add_copy(&state.inventory, cmd).await.map_err(failed(&uri))?;

    Ok((StatusCode::CREATED, Json(copy.into())))
}

/// GET /books/:id
pub async fn get_book(
    State(state): State<Arc<InventoryState>>,
    uri: OriginalUri,
    Path(book_id): Path<i64>,
) -> Result<Json<BookResponse>, ApiError> {
    let book_id = BookId::parse(book_id).map_err(invalid_id(&uri))?;
    let book = copy::get_book(&state.inventory, book_id).await.map_err(failed(&uri))?;
    Ok(Json(book.into()))
}
