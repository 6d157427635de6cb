//! Transaction handlers: create, list, batch upload, batch analysis

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use cadence_core::db::TransactionFilter;
use cadence_core::detect::{ingest_batch, PatternDetector};
use cadence_core::ingest::{parse_batch_csv, parse_date, RowError};
use cadence_core::models::{NewTransaction, Pattern, Transaction};

use crate::{AppError, AppState, MAX_PAGE_LIMIT};

/// Query params for listing transactions
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    pub merchant_id: Option<i64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Paginated transaction listing
#[derive(Serialize)]
pub struct TransactionListResponse {
    pub items: Vec<Transaction>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

fn parse_date_param(value: Option<&str>, name: &str) -> Result<Option<NaiveDate>, AppError> {
    match value {
        Some(s) => parse_date(s)
            .map(Some)
            .map_err(|_| AppError::bad_request(&format!("Invalid {} (use YYYY-MM-DD)", name))),
        None => Ok(None),
    }
}

/// GET /api/transactions - List transactions with filters
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<TransactionListResponse>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(50).clamp(1, MAX_PAGE_LIMIT);

    let (items, total) = state.db.list_transactions(&TransactionFilter {
        merchant_id: query.merchant_id,
        start_date: parse_date_param(query.start_date.as_deref(), "start_date")?,
        end_date: parse_date_param(query.end_date.as_deref(), "end_date")?,
        search: query.search,
        limit,
        offset: (page - 1) * limit,
    })?;

    let total_pages = (total + limit - 1) / limit;

    Ok(Json(TransactionListResponse {
        items,
        total,
        page,
        limit,
        total_pages,
    }))
}

/// GET /api/transactions/:id - Get a single transaction
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Transaction>, AppError> {
    let tx = state
        .db
        .get_transaction(id)?
        .ok_or_else(|| AppError::not_found(&format!("Transaction {} not found", id)))?;

    Ok(Json(tx))
}

/// Request body for creating a transaction
#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub description: String,
    pub amount: f64,
    pub date: String,
}

/// POST /api/transactions - Create one transaction with full normalization
///
/// Resolves the merchant (creating a record if missing), persists the
/// transaction, and publishes the corresponding events.
pub async fn create_transaction(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTransactionRequest>,
) -> Result<Json<Transaction>, AppError> {
    if body.description.trim().is_empty() {
        return Err(AppError::bad_request("description must not be empty"));
    }
    let date = parse_date(&body.date)
        .map_err(|_| AppError::bad_request("Invalid date (use YYYY-MM-DD)"))?;

    let batch = vec![NewTransaction {
        description: body.description.clone(),
        amount: body.amount,
        date,
    }];

    let results = ingest_batch(&state.db, state.oracle.as_ref(), &state.events, &batch).await?;

    if results.inserted == 0 && results.duplicates == 0 {
        return Err(AppError::unavailable(
            "Transaction could not be resolved to a merchant",
        ));
    }

    // Look the row back up by its dedup hash
    let hash = cadence_core::db::import_hash(date, &body.description, body.amount);
    let tx = state
        .db
        .get_transaction_by_hash(&hash)?
        .ok_or_else(|| AppError::not_found("Transaction not found after insert"))?;

    Ok(Json(tx))
}

/// Outcome of a batch upload or analysis
#[derive(Serialize)]
pub struct BatchAnalysisResponse {
    pub processed_count: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub merchants_created: usize,
    pub row_errors: Vec<RowError>,
    pub patterns: Vec<Pattern>,
}

/// POST /api/transactions/upload - Multipart CSV upload, full pipeline
///
/// Parses the CSV, ingests each valid row (merchant resolution + dedup),
/// then runs pattern detection over the batch. Returns partial results:
/// bad rows and unresolvable transactions are reported, not fatal.
pub async fn upload_transactions(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<BatchAnalysisResponse>, AppError> {
    let mut data: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(&format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::bad_request(&format!("Failed to read upload: {}", e)))?;
            data = Some(bytes.to_vec());
        }
    }

    let data = data.ok_or_else(|| AppError::bad_request("Missing 'file' field"))?;

    let parsed = parse_batch_csv(&data)?;
    run_batch(&state, parsed.transactions, parsed.errors).await
}

/// Request body for JSON batch analysis
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub transactions: Vec<NewTransactionBody>,
}

#[derive(Debug, Deserialize)]
pub struct NewTransactionBody {
    pub description: String,
    pub amount: f64,
    pub date: String,
}

/// POST /api/transactions/analyze - JSON batch, full pipeline
pub async fn analyze_transactions(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AnalyzeRequest>,
) -> Result<Json<BatchAnalysisResponse>, AppError> {
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

    run_batch(&state, batch, row_errors).await
}

/// Shared ingest + detect pipeline for batch endpoints
async fn run_batch(
    state: &Arc<AppState>,
    batch: Vec<NewTransaction>,
    row_errors: Vec<RowError>,
) -> Result<Json<BatchAnalysisResponse>, AppError> {
    if batch.is_empty() {
        return Err(AppError::bad_request(
            "No valid transactions in the batch",
        ));
    }

    let ingested = ingest_batch(&state.db, state.oracle.as_ref(), &state.events, &batch).await?;

    let detector = PatternDetector::with_oracle_option(&state.db, state.oracle.as_ref())
        .with_events(&state.events);
    let detection = detector.detect_and_store(&batch).await?;

    Ok(Json(BatchAnalysisResponse {
        processed_count: batch.len(),
        inserted: ingested.inserted,
        duplicates: ingested.duplicates,
        skipped: ingested.skipped,
        merchants_created: ingested.merchants_created,
        row_errors,
        patterns: detection.patterns,
    }))
}
