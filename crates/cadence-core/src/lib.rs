//! Cadence Core Library
//!
//! Shared functionality for the Cadence recurring-spend detection service:
//! - Database access and migrations
//! - Merchant override rules and resolution
//! - Pluggable classification-oracle backends (OpenAI-compatible, Ollama)
//! - Interval/cadence analysis and pattern detection
//! - CSV batch ingestion
//! - TTL'd analysis cache
//! - Fire-and-forget event publication

pub mod db;
pub mod detect;
pub mod error;
pub mod events;
pub mod ingest;
pub mod models;
pub mod oracle;
pub mod resolve;

/// Test utilities including a stub oracle HTTP server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use db::Database;
pub use detect::{
    BatchAnalysis, DetectionResults, DetectorConfig, GroupAnalysis, IngestResults, PatternDetector,
};
pub use error::{Error, Result};
pub use events::{BroadcastSink, Event, EventSink, NullSink};
pub use ingest::{parse_batch_csv, ParsedBatch, RowError};
pub use models::{
    Frequency, Merchant, MerchantRule, NewMerchant, NewPattern, NewTransaction, Pattern,
    PatternType, Transaction,
};
pub use oracle::{
    MerchantAnalysis, MockOracle, OllamaBackend, OpenAICompatibleBackend, OracleBackend,
    OracleClient, PatternAssessment,
};
pub use resolve::{MerchantResolver, Resolution, ResolutionSource};
