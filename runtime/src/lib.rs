use std::sync::Arc;

pub mod ai;
pub mod config;
pub mod ingest;
pub mod routes;
pub mod storage;

use ai::DocumentAnalyst;
use config::AppConfig;
use ingest::Ingestor;
use storage::DocumentStore;

/// Shared handles for request handlers and background ingestion.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub ingestor: Arc<Ingestor>,
    /// Absent when no API key is configured.
    pub analyst: Option<Arc<dyn DocumentAnalyst>>,
}
