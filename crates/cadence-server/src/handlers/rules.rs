//! Merchant override rule handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use cadence_core::db::NewMerchantRule;
use cadence_core::models::MerchantRule;
use cadence_core::resolve::test_rules_against;

use crate::{AppError, AppState, SuccessResponse};

/// GET /api/rules - List all rules in scan order
pub async fn list_rules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MerchantRule>>, AppError> {
    Ok(Json(state.db.list_all_merchant_rules()?))
}

/// POST /api/rules - Create an override rule
pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewMerchantRule>,
) -> Result<Json<MerchantRule>, AppError> {
    let rule = state.db.create_merchant_rule(&body)?;
    Ok(Json(rule))
}

/// DELETE /api/rules/:id - Delete a rule
pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.delete_merchant_rule(id)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Request body for rule testing
#[derive(Debug, Deserialize)]
pub struct TestRulesRequest {
    pub description: String,
}

/// POST /api/rules/test - Test a description against all active rules
pub async fn test_rules(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TestRulesRequest>,
) -> Result<Json<Vec<MerchantRule>>, AppError> {
    if body.description.trim().is_empty() {
        return Err(AppError::bad_request("description must not be empty"));
    }

    Ok(Json(test_rules_against(&state.db, &body.description)?))
}
