//! HTTP request handlers organized by domain

pub mod merchants;
pub mod patterns;
pub mod rules;
pub mod transactions;

// Re-export all handlers for use in router
pub use merchants::*;
pub use patterns::*;
pub use rules::*;
pub use transactions::*;

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use cadence_core::oracle::OracleBackend;

use crate::{AppError, AppState};

/// Health report for the service and its oracle
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub oracle: Option<OracleHealth>,
}

#[derive(Serialize)]
pub struct OracleHealth {
    pub host: String,
    pub model: String,
    pub reachable: bool,
}

/// GET /api/health - Service health including oracle reachability
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, AppError> {
    let database = state.db.conn().is_ok();

    let oracle = match &state.oracle {
        Some(client) => Some(OracleHealth {
            host: client.host().to_string(),
            model: client.model().to_string(),
            reachable: client.health_check().await,
        }),
        None => None,
    };

    Ok(Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        database,
        oracle,
    }))
}
