//! Merchant management handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use cadence_core::db::MerchantSearch;
use cadence_core::events::EventSink;
use cadence_core::models::{Merchant, NewMerchant};
use cadence_core::oracle::MerchantAnalysis;
use cadence_core::resolve::MerchantResolver;

use crate::{AppError, AppState, SuccessResponse, MAX_PAGE_LIMIT};

/// Query params for merchant search
#[derive(Debug, Deserialize)]
pub struct SearchMerchantsQuery {
    pub category: Option<String>,
    pub query: Option<String>,
    pub is_active: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Paginated merchant listing
#[derive(Serialize)]
pub struct MerchantListResponse {
    pub items: Vec<MerchantResponse>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

/// A merchant plus its transaction count
#[derive(Serialize)]
pub struct MerchantResponse {
    #[serde(flatten)]
    pub merchant: Merchant,
    pub transaction_count: i64,
}

/// GET /api/merchants - Search merchants with filters and pagination
pub async fn search_merchants(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchMerchantsQuery>,
) -> Result<Json<MerchantListResponse>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, MAX_PAGE_LIMIT);

    let (merchants, total) = state.db.search_merchants(&MerchantSearch {
        category: query.category,
        query: query.query,
        is_active: query.is_active,
        limit,
        offset: (page - 1) * limit,
    })?;

    let mut items = Vec::with_capacity(merchants.len());
    for merchant in merchants {
        let transaction_count = state.db.count_merchant_transactions(merchant.id)?;
        items.push(MerchantResponse {
            merchant,
            transaction_count,
        });
    }

    let total_pages = (total + limit - 1) / limit;

    Ok(Json(MerchantListResponse {
        items,
        total,
        page,
        limit,
        total_pages,
    }))
}

/// POST /api/merchants - Create a merchant
pub async fn create_merchant(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewMerchant>,
) -> Result<Json<Merchant>, AppError> {
    if body.normalized_name.trim().is_empty() {
        return Err(AppError::bad_request("normalized_name must not be empty"));
    }
    if !(0.0..=1.0).contains(&body.confidence) {
        return Err(AppError::bad_request("confidence must be in [0, 1]"));
    }

    let merchant = state.db.create_merchant(&body)?;

    state
        .events
        .publish(cadence_core::events::Event::MerchantCreated {
            merchant_id: merchant.id,
            normalized_name: merchant.normalized_name.clone(),
            category: merchant.category.clone(),
        });

    Ok(Json(merchant))
}

/// GET /api/merchants/:id - Get a merchant with its transaction count
pub async fn get_merchant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MerchantResponse>, AppError> {
    let merchant = state
        .db
        .get_merchant(id)?
        .ok_or_else(|| AppError::not_found(&format!("Merchant {} not found", id)))?;

    let transaction_count = state.db.count_merchant_transactions(id)?;

    Ok(Json(MerchantResponse {
        merchant,
        transaction_count,
    }))
}

/// POST /api/merchants/:id/deactivate - Soft-delete a merchant
pub async fn deactivate_merchant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .db
        .get_merchant(id)?
        .ok_or_else(|| AppError::not_found(&format!("Merchant {} not found", id)))?;

    state.db.deactivate_merchant(id)?;

    Ok(Json(SuccessResponse { success: true }))
}

/// Request body for normalization
#[derive(Debug, Deserialize)]
pub struct NormalizeRequest {
    pub description: String,
}

/// POST /api/merchants/normalize - Resolve a description without persisting
pub async fn normalize_merchant(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NormalizeRequest>,
) -> Result<Json<MerchantAnalysis>, AppError> {
    if body.description.trim().is_empty() {
        return Err(AppError::bad_request("description must not be empty"));
    }

    let resolver = MerchantResolver::new(&state.db, state.oracle.as_ref());
    let resolution = resolver.resolve(&body.description).await?;

    Ok(Json(resolution.analysis))
}
