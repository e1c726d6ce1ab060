//! Purchase settlement and access handlers

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use super::super::state::AppState;
use super::super::types::{
    AccessData, AccessQuery, ApiResult, PurchaseRequest, PurchaseView, SettlementData,
    bad_request, ok,
};
use crate::settlement::{ListingId, PurchaseId, SettlementError, SettlementOutcome, UserId};

fn outcome_status(outcome: &SettlementOutcome) -> StatusCode {
    match outcome {
        SettlementOutcome::Settled { .. } => StatusCode::OK,
        SettlementOutcome::Pending { .. } => StatusCode::ACCEPTED,
    }
}

fn parse_purchase_id(raw: &str) -> Result<PurchaseId, super::super::types::ApiError> {
    raw.parse()
        .map_err(|_| bad_request(format!("Invalid purchase id: {}", raw)))
}

/// Settle a purchase
///
/// POST /api/v1/purchases
///
/// Returns SETTLED (200) or PENDING (202). On PENDING, poll the recheck
/// endpoint with the returned purchase_id.
#[utoipa::path(
    post,
    path = "/api/v1/purchases",
    request_body = PurchaseRequest,
    responses(
        (status = 200, description = "Purchase settled", body = SettlementData),
        (status = 202, description = "Transfer submitted, confirmation pending", body = SettlementData),
        (status = 404, description = "Listing not found"),
        (status = 409, description = "Settlement already in progress for this listing and buyer"),
        (status = 422, description = "Self purchase, listing unavailable or payment rejected"),
        (status = 503, description = "Retryable failure")
    ),
    tag = "Purchase"
)]
pub async fn create_purchase(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PurchaseRequest>,
) -> ApiResult<SettlementData> {
    let listing_id = ListingId(req.listing_id);
    let buyer_id = UserId(req.buyer_id);

    let outcome = state.orchestrator.settle(listing_id, buyer_id).await?;
    tracing::info!(
        purchase_id = %outcome.purchase_id(),
        listing_id = %listing_id,
        status = outcome.as_str(),
        "Purchase request handled"
    );
    ok(outcome_status(&outcome), outcome.into())
}

/// Re-check a pending purchase
///
/// POST /api/v1/purchases/{purchase_id}/recheck
#[utoipa::path(
    post,
    path = "/api/v1/purchases/{purchase_id}/recheck",
    params(("purchase_id" = String, Path, description = "Purchase id returned by settle")),
    responses(
        (status = 200, description = "Purchase settled", body = SettlementData),
        (status = 202, description = "Still pending", body = SettlementData),
        (status = 404, description = "Purchase not found"),
        (status = 422, description = "Purchase failed"),
        (status = 503, description = "Retryable failure")
    ),
    tag = "Purchase"
)]
pub async fn recheck_purchase(
    State(state): State<Arc<AppState>>,
    Path(purchase_id): Path<String>,
) -> ApiResult<SettlementData> {
    let purchase_id = parse_purchase_id(&purchase_id)?;
    let outcome = state.orchestrator.recheck(purchase_id).await?;
    ok(outcome_status(&outcome), outcome.into())
}

/// Get a purchase record
///
/// GET /api/v1/purchases/{purchase_id}
#[utoipa::path(
    get,
    path = "/api/v1/purchases/{purchase_id}",
    params(("purchase_id" = String, Path, description = "Purchase id")),
    responses(
        (status = 200, description = "Purchase record", body = PurchaseView),
        (status = 404, description = "Purchase not found")
    ),
    tag = "Purchase"
)]
pub async fn get_purchase(
    State(state): State<Arc<AppState>>,
    Path(purchase_id): Path<String>,
) -> ApiResult<PurchaseView> {
    let purchase_id = parse_purchase_id(&purchase_id)?;
    let record = state
        .orchestrator
        .ledger()
        .get(purchase_id)
        .await
        .map_err(SettlementError::from)?
        .ok_or(SettlementError::PurchaseNotFound(purchase_id))?;
    ok(StatusCode::OK, record.into())
}

/// Check whether a buyer holds a listing
///
/// GET /api/v1/access?listing_id=..&buyer_id=..
#[utoipa::path(
    get,
    path = "/api/v1/access",
    params(AccessQuery),
    responses(
        (status = 200, description = "Access decision", body = AccessData),
        (status = 503, description = "Ledger unavailable")
    ),
    tag = "Purchase"
)]
pub async fn check_access(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AccessQuery>,
) -> ApiResult<AccessData> {
    let has_access = state
        .access_gate
        .has_access(ListingId(q.listing_id), UserId(q.buyer_id))
        .await?;
    ok(
        StatusCode::OK,
        AccessData {
            listing_id: q.listing_id,
            buyer_id: q.buyer_id,
            has_access,
        },
    )
}
