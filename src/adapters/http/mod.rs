//! reqwestによるリモートサービスのクライアント

pub mod catalog_client;
pub mod member_directory;

pub use catalog_client::HttpCatalogClient;
pub use member_directory::HttpMemberDirectory;

use crate::api::types::ErrorResponse;
use crate::ports::PortError;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// タイムアウト付きのクライアントを作る
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

fn transport_error(err: reqwest::Error) -> PortError {
    if err.is_timeout() {
        PortError::Timeout
    } else {
        PortError::unavailable(err)
    }
}

/// 成功レスポンスをデコードし、エラーレスポンスは構造化ボディから分類する
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, PortError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(transport_error);
    }

    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.message,
        Err(_) => format!("Unexpected response status {status}"),
    };

    Err(match status {
        StatusCode::NOT_FOUND => PortError::NotFound(message),
        StatusCode::CONFLICT => PortError::Conflict(message),
        StatusCode::BAD_REQUEST => PortError::InvalidArgument(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => PortError::Timeout,
        _ => PortError::unavailable(message),
    })
}

/// GETしてデコードする
async fn get_json<T: DeserializeOwned>(client: &reqwest::Client, url: String) -> Result<T, PortError> {
    let response = client.get(&url).send().await.map_err(transport_error)?;
    decode(response).await
}

/// ボディなしでPOSTしてデコードする
async fn post_json<T: DeserializeOwned>(client: &reqwest::Client, url: String) -> Result<T, PortError> {
    let response = client.post(&url).send().await.map_err(transport_error)?;
    decode(response).await
}
