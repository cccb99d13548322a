use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use library_loans::adapters::http::member_directory::MemberResponse;
use library_loans::adapters::http::{HttpCatalogClient, HttpMemberDirectory};
use library_loans::api::create_inventory_router;
use library_loans::api::inventory_handlers::InventoryState;
use library_loans::api::types::ErrorResponse;
use library_loans::domain::*;
use library_loans::ports::{CatalogClient, MemberDirectory, PortError};
use std::sync::Arc;
use std::time::Duration;

mod common;

use common::{COPY_ID, TestLibrary};

/// ルーターをローカルのポートで起動し、ベースURLを返す
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// GET /members/:id を提供する会員サービスのスタブ
fn member_service() -> Router {
    Router::new()
        .route(
            "/members/:id",
            get(|Path(id): Path<i64>| async move {
                if id == 7 {
                    Ok(Json(MemberResponse {
                        member_id: 7,
                        first_name: "Paul".to_string(),
                        last_name: "Atreides".to_string(),
                    }))
                } else {
                    Err((
                        StatusCode::NOT_FOUND,
                        Json(ErrorResponse::new(
                            "NOT_FOUND",
                            format!("A member with the id {id} could not be found"),
                            format!("/members/{id}"),
                        )),
                    ))
                }
            }),
        )
        .route(
            "/slow/members/:id",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                StatusCode::OK
            }),
        )
}

#[tokio::test]
async fn test_catalog_client_against_inventory_api() {
    // Arrange
    let library = TestLibrary::new();
    let base_url = serve(create_inventory_router(Arc::new(InventoryState {
        inventory: library.inventory.clone(),
    })))
    .await;
    let client = HttpCatalogClient::new(base_url, Duration::from_secs(5)).unwrap();

    // Act & Assert: 取得
    let copy = client.get_copy(COPY_ID).await.unwrap();
    assert_eq!(copy.barcode.as_str(), "LIB-123");
    assert_eq!(copy.status, CopyStatus::Available);

    let edition = client.get_edition(copy.edition_id).await.unwrap();
    assert_eq!(edition.edition, "First Edition");
    assert_eq!(edition.format, BookFormat::Hardback);

    let book = client.get_book(edition.book_id).await.unwrap();
    assert_eq!(book.title, "Dune");

    // 状態変更
    let borrowed = client.borrow_copy(COPY_ID).await.unwrap();
    assert_eq!(borrowed.status, CopyStatus::Loaned);
    assert_eq!(library.copy_status(COPY_ID), Some(CopyStatus::Loaned));

    let conflict = client.borrow_copy(COPY_ID).await;
    assert!(matches!(conflict, Err(PortError::Conflict(message)) if message == "This edition copy is already on loan."));

    let returned = client.return_copy(COPY_ID).await.unwrap();
    assert_eq!(returned.status, CopyStatus::Available);

    let lost = client.mark_copy_lost(COPY_ID).await.unwrap();
    assert_eq!(lost.status, CopyStatus::Lost);
}

#[tokio::test]
async fn test_catalog_client_maps_not_found() {
    let library = TestLibrary::new();
    let base_url = serve(create_inventory_router(Arc::new(InventoryState {
        inventory: library.inventory.clone(),
    })))
    .await;
    let client = HttpCatalogClient::new(format!("{base_url}/"), Duration::from_secs(5)).unwrap();

    let result = client.get_copy(EditionCopyId::from_raw(999)).await;

    assert!(matches!(
        result,
        Err(PortError::NotFound(message)) if message == "An edition copy with the id 999 could not be found"
    ));
}

#[tokio::test]
async fn test_member_directory_client() {
    let base_url = serve(member_service()).await;
    let directory = HttpMemberDirectory::new(base_url, Duration::from_secs(5)).unwrap();

    let member = directory.get_member(MemberId::from_raw(7)).await.unwrap();
    assert_eq!(member.first_name, "Paul");
    assert_eq!(member.last_name, "Atreides");

    let missing = directory.get_member(MemberId::from_raw(8)).await;
    assert!(matches!(missing, Err(PortError::NotFound(_))));
}

#[tokio::test]
async fn test_member_directory_timeout() {
    let base_url = serve(member_service()).await;
    let directory =
        HttpMemberDirectory::new(format!("{base_url}/slow"), Duration::from_millis(100)).unwrap();

    let result = directory.get_member(MemberId::from_raw(7)).await;

    assert!(matches!(result, Err(PortError::Timeout)));
}

#[tokio::test]
async fn test_unreachable_service_is_transient() {
    // 何も待ち受けていないポート
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpCatalogClient::new(format!("http://{addr}"), Duration::from_secs(1)).unwrap();
    let result = client.get_copy(COPY_ID).await;

    let err = result.unwrap_err();
    assert!(err.is_transient());
}
