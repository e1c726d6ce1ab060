//! API Response types and error codes
//!
//! - `ApiResponse<T>`: Unified response wrapper
//! - `error_codes`: Standard error code constants
//! - Request / response DTOs

use axum::Json;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::settlement::{PurchaseRecord, SettlementError, SettlementOutcome};

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: payload on success; error details for settlement errors
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response code: 0 for success, non-zero for errors
    #[schema(example = 0)]
    pub code: i32,
    /// Response message
    #[schema(example = "ok")]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>, data: Option<T>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data,
        }
    }
}

pub type ApiError = (StatusCode, Json<ApiResponse<ErrorData>>);
pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

pub fn ok<T>(status: StatusCode, data: T) -> ApiResult<T> {
    Ok((status, Json(ApiResponse::success(data))))
}

pub fn bad_request(msg: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::error(error_codes::INVALID_PARAMETER, msg, None)),
    )
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PurchaseRequest {
    #[schema(example = "7f1c9a52-2f0e-4d3b-9b1a-0c8e5d2f4a61")]
    pub listing_id: Uuid,
    #[schema(example = "3d6f8a10-93b4-4c1e-a7a2-5b9d0e6c2f47")]
    pub buyer_id: Uuid,
}

/// Result of a settle or recheck call
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SettlementData {
    #[schema(example = "01JAB3Q4K6Z5W2N8M7V1C0X9YT")]
    pub purchase_id: String,
    /// SETTLED or PENDING
    #[schema(example = "SETTLED")]
    pub status: String,
}

impl From<SettlementOutcome> for SettlementData {
    fn from(outcome: SettlementOutcome) -> Self {
        Self {
            purchase_id: outcome.purchase_id().to_string(),
            status: outcome.as_str().to_string(),
        }
    }
}

/// Error details. `retryable` tells the storefront whether to offer "try again".
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorData {
    #[schema(example = "SETTLEMENT_IN_PROGRESS")]
    pub error: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PurchaseView {
    pub purchase_id: String,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    #[schema(example = "9.99")]
    pub amount: String,
    #[schema(example = "TRANSFER_REQUESTED")]
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PurchaseRecord> for PurchaseView {
    fn from(r: PurchaseRecord) -> Self {
        Self {
            purchase_id: r.id.to_string(),
            listing_id: r.listing_id.0,
            buyer_id: r.buyer_id.0,
            amount: r.amount.to_string(),
            state: r.state.as_str().to_string(),
            transfer_id: r.transfer_id,
            failure_reason: r.failure_reason,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AccessQuery {
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccessData {
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub has_access: bool,
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
pub mod error_codes {
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const SELF_PURCHASE: i32 = 1002;
    pub const LISTING_UNAVAILABLE: i32 = 1003;
    pub const SETTLEMENT_FAILED: i32 = 1004;

    // Resource errors (4xxx)
    pub const LISTING_NOT_FOUND: i32 = 4001;
    pub const PURCHASE_NOT_FOUND: i32 = 4002;
    pub const SETTLEMENT_IN_PROGRESS: i32 = 4091;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}

fn numeric_code(e: &SettlementError) -> i32 {
    match e {
        SettlementError::SelfPurchase => error_codes::SELF_PURCHASE,
        SettlementError::ListingUnavailable(_) => error_codes::LISTING_UNAVAILABLE,
        SettlementError::ListingNotFound(_) => error_codes::LISTING_NOT_FOUND,
        SettlementError::PurchaseNotFound(_) => error_codes::PURCHASE_NOT_FOUND,
        SettlementError::InProgress { .. } => error_codes::SETTLEMENT_IN_PROGRESS,
        SettlementError::Failed {
            retryable: false, ..
        } => error_codes::SETTLEMENT_FAILED,
        SettlementError::Failed { .. } | SettlementError::Storage(_) => {
            error_codes::SERVICE_UNAVAILABLE
        }
    }
}

impl From<SettlementError> for ApiError {
    fn from(e: SettlementError) -> Self {
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let data = ErrorData {
            error: e.code().to_string(),
            retryable: e.is_retryable(),
            purchase_id: e.purchase_id().map(|id| id.to_string()),
        };
        (
            status,
            Json(ApiResponse::error(numeric_code(&e), e.to_string(), Some(data))),
        )
    }
}
