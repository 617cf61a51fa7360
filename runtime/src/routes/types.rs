use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;

#[derive(Clone, Debug, Serialize, TS)]
#[ts(export)]
pub struct UploadResponse {
    pub document_id: String,
    pub filename: String,
    pub status: String,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, TS)]
#[ts(export)]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
    pub status: String,
    pub uploaded_at: String,
    pub updated_at: String,
    pub extraction_method: Option<String>,
    pub error: Option<String>,
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct DocumentListResponse {
    pub total: usize,
    pub documents: Vec<DocumentSummary>,
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct DocumentInfoResponse {
    pub id: String,
    pub filename: String,
    pub status: String,
    pub uploaded_at: String,
    pub updated_at: String,
    #[ts(type = "Record<string, unknown>")]
    pub metadata: Map<String, Value>,
    pub text_length: usize,
    pub has_structure: bool,
    pub error: Option<String>,
    /// Seconds spent ingesting; absent while processing.
    pub processing_time: Option<f64>,
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct StructureResponse {
    pub document_id: String,
    pub has_structure: bool,
    pub title: Option<String>,
    pub summary: Option<String>,
    #[ts(type = "unknown")]
    pub structure: Option<Value>,
    pub message: Option<String>,
}

#[derive(Clone, Debug, Deserialize, TS)]
#[ts(export)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Clone, Debug, Default, Serialize, TS)]
#[ts(export)]
pub struct UsageResponse {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct QueryResponse {
    pub document_id: String,
    pub response: String,
    pub model: String,
    pub usage: UsageResponse,
    pub used_structure: bool,
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct DeleteResponse {
    pub document_id: String,
    pub message: String,
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
}
