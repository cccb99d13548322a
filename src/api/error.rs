use crate::application::copy::InventoryApplicationError;
use crate::application::loan::LoanApplicationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::types::ErrorResponse;

/// API層のエラー型
///
/// アプリケーション層のエラーをHTTPステータスとエラーコードに変換する。
/// 内部エラーの詳細はログに記録し、クライアントには一般的なメッセージのみを返す。
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error_code: &'static str,
    pub message: String,
    pub path: String,
}

impl ApiError {
    fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error_code,
            message: message.into(),
            path: String::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An unexpected error occurred",
        )
    }

    /// リクエストパスを設定する
    pub fn at(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }
}

impl From<LoanApplicationError> for ApiError {
    fn from(err: LoanApplicationError) -> Self {
        match err {
            // 400 Bad Request - 入力が不正
            LoanApplicationError::InvalidArgument(message) => ApiError::bad_request(message),

            // 404 Not Found - 貸出または参照先リソースが存在しない
            LoanApplicationError::LoanNotFound(_) | LoanApplicationError::ResourceNotFound(_) => {
                ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
            }

            // 409 Conflict - 状態の競合
            LoanApplicationError::CopyUnavailable(_) => ApiError::new(
                StatusCode::CONFLICT,
                "COPY_UNAVAILABLE",
                "The copy of the book requested is unavailable",
            ),
            LoanApplicationError::Conflict(message) => {
                ApiError::new(StatusCode::CONFLICT, "CONFLICT", message)
            }
            LoanApplicationError::InvalidState(message) => {
                ApiError::new(StatusCode::CONFLICT, "INVALID_STATE", message)
            }

            // 503 / 502 - 他サービスの障害
            LoanApplicationError::DownstreamTimeout { .. } => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", err.to_string())
            }
            LoanApplicationError::Downstream { service, ref source } => {
                tracing::error!(service, error = %source, "Downstream service error");
                ApiError::new(StatusCode::BAD_GATEWAY, "DOWNSTREAM_ERROR", err.to_string())
            }

            // 500 Internal Server Error - システム障害
            LoanApplicationError::Repository(ref source) => {
                tracing::error!(error = %source, "Loan repository error");
                ApiError::internal()
            }
        }
    }
}

impl From<InventoryApplicationError> for ApiError {
    fn from(err: InventoryApplicationError) -> Self {
        match err {
            InventoryApplicationError::InvalidArgument(message) => ApiError::bad_request(message),
            InventoryApplicationError::CopyNotFound(_)
            | InventoryApplicationError::EditionNotFound(_)
            | InventoryApplicationError::BookNotFound(_) => {
                ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
            }
            InventoryApplicationError::Transition(_)
            | InventoryApplicationError::ConcurrentModification(_) => {
                ApiError::new(StatusCode::CONFLICT, "CONFLICT", err.to_string())
            }
            InventoryApplicationError::Repository(ref source) => {
                tracing::error!(error = %source, "Inventory repository error");
                ApiError::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse::new(self.error_code, self.message, self.path));
        (self.status, body).into_response()
    }
}
