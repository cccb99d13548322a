use crate::api::types::{BookResponse, CopyResponse, EditionResponse};
use crate::domain::{Book, BookId, Edition, EditionCopy, EditionCopyId, EditionId};
use crate::ports::{CatalogClient, PortError, Result};
use async_trait::async_trait;
use std::time::Duration;

use super::{build_client, get_json, post_json};

/// 在庫サービスのREST APIを呼ぶCatalogClient
pub struct HttpCatalogClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalogClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> std::result::Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn to_copy(response: CopyResponse) -> Result<EditionCopy> {
    EditionCopy::try_from(response).map_err(PortError::unavailable)
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn get_copy(&self, copy_id: EditionCopyId) -> Result<EditionCopy> {
        let response: CopyResponse =
            get_json(&self.client, self.url(&format!("/copies/{copy_id}"))).await?;
        to_copy(response)
    }

    async fn get_edition(&self, edition_id: EditionId) -> Result<Edition> {
        let response: EditionResponse =
            get_json(&self.client, self.url(&format!("/editions/{edition_id}"))).await?;
        Edition::try_from(response).map_err(PortError::unavailable)
    }

    async fn get_book(&self, book_id: BookId) -> Result<Book> {
        let response: BookResponse =
            get_json(&self.client, self.url(&format!("/books/{book_id}"))).await?;
        Book::try_from(response).map_err(PortError::unavailable)
    }

    async fn borrow_copy(&self, copy_id: EditionCopyId) -> Result<EditionCopy> {
        let response: CopyResponse =
            post_json(&self.client, self.url(&format!("/copies/{copy_id}/borrow"))).await?;
        to_copy(response)
    }

    async fn return_copy(&self, copy_id: EditionCopyId) -> Result<EditionCopy> {
        let response: CopyResponse =
            post_json(&self.client, self.url(&format!("/copies/{copy_id}/return"))).await?;
        to_copy(response)
    }

    async fn mark_copy_lost(&self, copy_id: EditionCopyId) -> Result<EditionCopy> {
        let response: CopyResponse =
            post_json(&self.client, self.url(&format!("/copies/{copy_id}/mark-lost"))).await?;
        to_copy(response)
    }
}
