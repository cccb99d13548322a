use crate::application::loan::{
    ServiceDependencies, create_loan as execute_create_loan, find_loan,
    mark_loan_lost as execute_mark_loan_lost, renew_loan as execute_renew_loan,
    return_loan as execute_return_loan,
};
use crate::domain::commands::{CreateLoan, MarkLoanLost, RenewLoan, ReturnLoan};
use crate::domain::{EditionCopyId, LoanId, MemberId};
use axum::{
    Json,
    extract::{OriginalUri, Path, State},
    http::StatusCode,
};
use chrono::Utc;
use std::sync::Arc;

use super::{
    error::ApiError,
    types::{CreateLoanRequest, LoanResponse},
};

// ============================================================================
// State
// ============================================================================

/// ハンドラー間で共有されるアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub service_deps: ServiceDependencies,
}

fn parse_loan_id(id: i64, uri: &OriginalUri) -> Result<LoanId, ApiError> {
    LoanId::parse(id).map_err(|e| ApiError::bad_request(e.to_string()).at(uri.path()))
}

// ============================================================================
// Command handlers (POST)
// ============================================================================

/// POST /loans - 新しい貸出を作成
///
/// 強制されるビジネスルール:
/// - コピーが存在し、貸出可能であること
/// - 会員が存在すること
pub async fn create_loan(
    State(state): State<Arc<AppState>>,
    uri: OriginalUri,
    Json(req): Json<CreateLoanRequest>,
) -> Result<(StatusCode, Json<LoanResponse>), ApiError> {
    let at = |e: ApiError| e.at(uri.path());

    let cmd = CreateLoan {
        edition_copy_id: EditionCopyId::parse(req.edition_copy_id)
            .map_err(|e| at(ApiError::bad_request(e.to_string())))?,
        member_id: MemberId::parse(req.member_id)
            .map_err(|e| at(ApiError::bad_request(e.to_string())))?,
        loaned_on: Utc::now().date_naive(),
    };

    let loan = execute_create_loan(&state.service_deps, cmd)
        .await
        .map_err(|e| at(e.into()))?;

    Ok((StatusCode::CREATED, Json(LoanResponse::from(loan))))
}

/// POST /loans/:id/renew - 貸出を延長
///
/// 強制されるビジネスルール:
/// - 貸出がBORROWEDまたはRENEWEDであること
/// - 延長回数が上限未満であること
pub async fn renew_loan(
    State(state): State<Arc<AppState>>,
    uri: OriginalUri,
    Path(loan_id): Path<i64>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan_id = parse_loan_id(loan_id, &uri)?;

    let loan = execute_renew_loan(&state.service_deps, RenewLoan { loan_id })
        .await
        .map_err(|e| ApiError::from(e).at(uri.path()))?;

    Ok(Json(LoanResponse::from(loan)))
}

/// POST /loans/:id/return - 貸出を返却
///
/// 延滞中の貸出も返却可能。紛失扱いの貸出は返却できない。
pub async fn return_loan(
    State(state): State<Arc<AppState>>,
    uri: OriginalUri,
    Path(loan_id): Path<i64>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan_id = parse_loan_id(loan_id, &uri)?;

    let cmd = ReturnLoan {
        loan_id,
        returned_on: Utc::now().date_naive(),
    };

    let loan = execute_return_loan(&state.service_deps, cmd)
        .await
        .map_err(|e| ApiError::from(e).at(uri.path()))?;

    Ok(Json(LoanResponse::from(loan)))
}

/// POST /loans/:id/lost - 貸出を紛失扱いにする
pub async fn mark_loan_lost(
    State(state): State<Arc<AppState>>,
    uri: OriginalUri,
    Path(loan_id): Path<i64>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan_id = parse_loan_id(loan_id, &uri)?;

    let cmd = MarkLoanLost {
        loan_id,
        reported_on: Utc::now().date_naive(),
    };

    let loan = execute_mark_loan_lost(&state.service_deps, cmd)
        .await
        .map_err(|e| ApiError::from(e).at(uri.path()))?;

    Ok(Json(LoanResponse::from(loan)))
}

// ============================================================================
// Query handlers (GET)
// ============================================================================

/// GET /loans/:id - 貸出詳細をIDで取得
pub async fn get_loan_by_id(
    State(state): State<Arc<AppState>>,
    uri: OriginalUri,
    Path(loan_id): Path<i64>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan_id = parse_loan_id(loan_id, &uri)?;

    let loan = find_loan(&state.service_deps, loan_id)
        .await
        .map_err(|e| ApiError::from(e).at(uri.path()))?;

    Ok(Json(LoanResponse::from(loan)))
}
