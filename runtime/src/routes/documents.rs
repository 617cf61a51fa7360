use std::{sync::Arc, time::Instant};

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
};
use tracing::{error, info, warn};

use super::types::{
    DeleteResponse, DocumentInfoResponse, DocumentListResponse, DocumentSummary, QueryRequest,
    QueryResponse, StructureResponse, UploadResponse, UsageResponse,
};
use crate::{
    AppState,
    ai::AnalysisRequest,
    ingest::{
        NormalizedDocument, StructureSummary,
        file_kind::{extension_of, sanitize_filename},
    },
    storage::{DocumentRecord, DocumentStatus, fingerprint},
};

type ApiError = (StatusCode, String);

pub fn document_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/upload", post(upload_document))
        .route("/api/documents", get(list_documents))
        .route("/api/document/{id}", get(get_document).delete(delete_document))
        .route("/api/document/{id}/structure", get(get_structure))
        .route("/api/document/{id}/query", post(query_document))
}

fn internal(context: &str, err: anyhow::Error) -> ApiError {
    error!(error = %err, "{context}");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{context}: {err}"))
}

async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_filename: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        (err.status(), format!("invalid multipart payload: {}", err.body_text()))
    })? {
        if field.name() == Some("file") {
            original_filename = field.file_name().map(|name| name.to_string());
            let data = field.bytes().await.map_err(|err| {
                (err.status(), format!("failed to read upload field: {}", err.body_text()))
            })?;
            file_bytes = Some(data.to_vec());
            break;
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "missing file field in multipart payload".to_string(),
        )
    })?;
    let original_filename = original_filename
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "No selected file".to_string()))?;

    let safe_filename = sanitize_filename(&original_filename).map_err(|err| {
        (
            StatusCode::BAD_REQUEST,
            format!("invalid filename '{original_filename}': {err}"),
        )
    })?;

    let allowed = extension_of(&safe_filename)
        .map(|ext| state.config.is_allowed_extension(&ext))
        .unwrap_or(false);
    if !allowed {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "File type not allowed. Allowed types: {}",
                state.config.upload.allowed_extensions.join(", ")
            ),
        ));
    }

    if file_bytes.len() > state.config.upload.max_bytes {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "File exceeds the {} byte upload limit",
                state.config.upload.max_bytes
            ),
        ));
    }

    let digest = fingerprint(&safe_filename, &file_bytes);
    let existing = state
        .store
        .find_by_fingerprint(&digest)
        .await
        .map_err(|err| internal("failed to query document store", err))?;
    if let Some(record) = existing {
        info!(filename = %safe_filename, id = %record.id, "duplicate upload");
        return Ok((
            StatusCode::OK,
            Json(UploadResponse {
                document_id: record.id,
                filename: safe_filename.clone(),
                status: "duplicated".to_string(),
                message: format!(
                    "File '{safe_filename}' already exists in document storage (Status: {}).",
                    record.status
                ),
            }),
        ));
    }

    let record = DocumentRecord::processing(&safe_filename, digest);
    let document_id = record.id.clone();
    state
        .store
        .put(record)
        .await
        .map_err(|err| internal("failed to store document", err))?;
    if let Err(err) = state.store.sync_if_dirty().await {
        warn!(error = %err, "failed to flush document store");
    }

    let background = state.clone();
    let background_id = document_id.clone();
    let background_name = safe_filename.clone();
    tokio::spawn(async move {
        process_upload(background, background_id, background_name, file_bytes).await;
    });

    info!(filename = %safe_filename, id = %document_id, "file uploaded, processing in background");
    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            document_id,
            filename: safe_filename.clone(),
            status: DocumentStatus::Processing.to_string(),
            message: format!("File '{safe_filename}' uploaded. Processing will continue in background."),
        }),
    ))
}

/// Runs ingestion off the async runtime and records the outcome.
pub(crate) async fn process_upload(state: Arc<AppState>, id: String, filename: String, bytes: Vec<u8>) {
    let ingestor = state.ingestor.clone();
    let worker_name = filename.clone();
    let started = Instant::now();
    let outcome =
        tokio::task::spawn_blocking(move || ingestor.ingest(&bytes, &worker_name)).await;
    let elapsed = started.elapsed();

    let mut record = match state.store.get(&id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            info!(%id, "document deleted before processing finished");
            return;
        }
        Err(err) => {
            error!(%id, error = %err, "failed to load document record");
            return;
        }
    };

    match outcome {
        Ok(document) => {
            if let Some(kind) = document.error_kind() {
                warn!(%id, %filename, error = %kind, "document ingested with error");
            } else {
                info!(
                    %id,
                    %filename,
                    chars = document.text().len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "document ingested"
                );
            }
            record.mark_ready(document);
        }
        Err(err) => {
            error!(%id, %filename, error = %err, "ingestion worker failed");
            record.mark_failed(format!("ingestion worker failed: {err}"));
        }
    }
    record.processing_time = Some(elapsed.as_secs_f64());

    match state.store.update_if_present(record).await {
        Ok(true) => {}
        Ok(false) => {
            info!(%id, "document deleted before processing finished");
            return;
        }
        Err(err) => {
            error!(%id, error = %err, "failed to store ingestion result");
            return;
        }
    }
    if let Err(err) = state.store.sync_if_dirty().await {
        warn!(error = %err, "failed to flush document store");
    }
}

async fn load_record(state: &AppState, id: &str) -> Result<DocumentRecord, ApiError> {
    state
        .store
        .get(id)
        .await
        .map_err(|err| internal("failed to load document", err))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Document not found".to_string()))
}

async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DocumentListResponse>, ApiError> {
    let records = state
        .store
        .list()
        .await
        .map_err(|err| internal("failed to load documents", err))?;

    let documents: Vec<DocumentSummary> = records
        .into_iter()
        .map(|record| DocumentSummary {
            extraction_method: record
                .document
                .as_ref()
                .and_then(NormalizedDocument::extraction_method)
                .map(|method| method.to_string()),
            error: record.error.clone().or_else(|| {
                record
                    .document
                    .as_ref()
                    .and_then(NormalizedDocument::error_kind)
                    .map(|kind| kind.to_string())
            }),
            id: record.id,
            filename: record.filename,
            status: record.status.to_string(),
            uploaded_at: record.uploaded_at,
            updated_at: record.updated_at,
        })
        .collect();

    Ok(Json(DocumentListResponse {
        total: documents.len(),
        documents,
    }))
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DocumentInfoResponse>, ApiError> {
    let record = load_record(&state, &id).await?;
    let document = record.document.as_ref();

    Ok(Json(DocumentInfoResponse {
        metadata: document.map(NormalizedDocument::metadata).unwrap_or_default(),
        text_length: document.map(|doc| doc.text().chars().count()).unwrap_or(0),
        has_structure: document.and_then(NormalizedDocument::structure_tree).is_some(),
        error: record.error.clone(),
        processing_time: record.processing_time,
        id: record.id,
        filename: record.filename,
        status: record.status.to_string(),
        uploaded_at: record.uploaded_at,
        updated_at: record.updated_at,
    }))
}

async fn get_structure(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StructureResponse>, ApiError> {
    let record = load_record(&state, &id).await?;

    let Some(tree) = record
        .document
        .as_ref()
        .and_then(NormalizedDocument::structure_tree)
    else {
        return Ok(Json(StructureResponse {
            document_id: record.id,
            has_structure: false,
            title: None,
            summary: None,
            structure: None,
            message: Some("No structure data available for this document".to_string()),
        }));
    };

    let summary = StructureSummary::from_tree(tree);
    let structure = serde_json::to_value(tree)
        .map_err(|err| internal("failed to serialize structure", err.into()))?;

    Ok(Json(StructureResponse {
        document_id: record.id.clone(),
        has_structure: true,
        title: Some(summary.title.clone()),
        summary: Some(summary.render()),
        structure: Some(structure),
        message: None,
    }))
}

async fn query_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    if request.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No query provided".to_string()));
    }
    let analyst = state.analyst.clone().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "LLM analysis is not configured".to_string(),
        )
    })?;

    let record = load_record(&state, &id).await?;
    let document = match (record.status, record.document.as_ref()) {
        (DocumentStatus::Ready, Some(document)) => document,
        (DocumentStatus::Failed, _) => {
            return Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                format!(
                    "Document processing failed: {}",
                    record.error.as_deref().unwrap_or("unknown error")
                ),
            ));
        }
        _ => {
            return Err((
                StatusCode::CONFLICT,
                "Document is still being processed".to_string(),
            ));
        }
    };

    if let Some(kind) = document.error_kind() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Document could not be parsed ({kind}): {}", document.text()),
        ));
    }

    let summary = document.structure_tree().map(StructureSummary::from_tree);
    let analysis = analyst
        .analyze(AnalysisRequest {
            text: document.text(),
            summary: summary.as_ref(),
            query: &request.query,
            tabular: document.is_tabular(),
        })
        .await
        .map_err(|err| {
            error!(%id, error = %err, "document analysis failed");
            (StatusCode::BAD_GATEWAY, format!("analysis failed: {err}"))
        })?;

    Ok(Json(QueryResponse {
        document_id: record.id,
        response: analysis.response,
        model: analysis.model,
        usage: UsageResponse {
            prompt_tokens: analysis.usage.prompt_tokens,
            completion_tokens: analysis.usage.completion_tokens,
            total_tokens: analysis.usage.total_tokens,
        },
        used_structure: analysis.used_structure,
    }))
}

async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let removed = state
        .store
        .delete(&id)
        .await
        .map_err(|err| internal("failed to delete document", err))?;
    if !removed {
        return Err((StatusCode::NOT_FOUND, "Document not found".to_string()));
    }
    if let Err(err) = state.store.sync_if_dirty().await {
        warn!(error = %err, "failed to flush document store");
    }

    info!(%id, "document deleted");
    Ok(Json(DeleteResponse {
        document_id: id,
        message: "Document deleted successfully".to_string(),
    }))
}
