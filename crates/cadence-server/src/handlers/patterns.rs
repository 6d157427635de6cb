//! Pattern handlers: detection and lookups

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use cadence_core::detect::PatternDetector;
use cadence_core::ingest::{parse_date, RowError};
use cadence_core::models::{NewTransaction, Pattern};

use crate::{AppError, AppState};

/// Request body for pattern detection
#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub transactions: Vec<DetectTransactionBody>,
}

#[derive(Debug, Deserialize)]
pub struct DetectTransactionBody {
    pub description: String,
    pub amount: f64,
    pub date: String,
}

/// Outcome of a detection run
#[derive(Serialize)]
pub struct DetectResponse {
    pub patterns: Vec<Pattern>,
    pub groups_total: usize,
    pub groups_skipped: usize,
    pub groups_failed: usize,
    pub transactions_dropped: usize,
    pub row_errors: Vec<RowError>,
}

/// POST /api/patterns/detect - Detect and persist patterns for a batch
///
/// Transactions must already map to persisted merchants (directly or via
/// the rule table / cached resolutions); unresolvable ones are dropped and
/// reported in the counts.
pub async fn detect_patterns(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DetectRequest>,
) -> Result<Json<DetectResponse>, AppError> {
    if body.transactions.is_empty() {
        return Err(AppError::bad_request("Empty transaction batch"));
    }

    let mut batch = Vec::with_capacity(body.transactions.len());
    let mut row_errors = Vec::new();

    for (index, tx) in body.transactions.into_iter().enumerate() {
        match parse_date(&tx.date) {
            Ok(date) => batch.push(NewTransaction {
                description: tx.description,
                amount: tx.amount,
                date,
            }),
            Err(e) => row_errors.push(RowError {
                row: index + 1,
                reason: e.to_string(),
            }),
        }
    }

    if batch.is_empty() {
        return Err(AppError::bad_request("No valid transactions in the batch"));
    }

    let detector = PatternDetector::with_oracle_option(&state.db, state.oracle.as_ref())
        .with_events(&state.events);
    let results = detector.detect_and_store(&batch).await?;

    Ok(Json(DetectResponse {
        patterns: results.patterns,
        groups_total: results.groups_total,
        groups_skipped: results.groups_skipped,
        groups_failed: results.groups_failed,
        transactions_dropped: results.transactions_dropped,
        row_errors,
    }))
}

/// GET /api/patterns - List all patterns
pub async fn list_patterns(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Pattern>>, AppError> {
    Ok(Json(state.db.list_patterns()?))
}

/// GET /api/patterns/merchant/:id - List a merchant's patterns
pub async fn get_patterns_by_merchant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Pattern>>, AppError> {
    state
        .db
        .get_merchant(id)?
        .ok_or_else(|| AppError::not_found(&format!("Merchant {} not found", id)))?;

    Ok(Json(state.db.find_patterns_by_merchant(id)?))
}
