use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Multipart, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use pdf_chat_core::{
    Answer, ChunkPolicy, ChunkPreview, EmbeddingReport, ExtractionReport, FileRecord,
};
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/upload", post(upload_pdf))
        .route("/files", get(list_files))
        .route("/extract/{file_id}", get(extract_text))
        .route("/chunk/{file_id}", get(preview_chunks))
        .route("/embed/{file_id}", post(embed_file).delete(delete_file))
        .route("/query", post(query_file))
        .with_state(state)
}

async fn upload_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileRecord>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::bad_request(format!("malformed multipart body: {error}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::bad_request("file field is missing a filename"))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|error| ApiError::bad_request(format!("could not read upload: {error}")))?;

        info!(file_name, size = bytes.len(), "upload received");
        let record = state.pipeline.upload(&file_name, &bytes).await?;
        return Ok(Json(record));
    }

    Err(ApiError::bad_request("multipart body had no 'file' field"))
}

async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<FileRecord>>, ApiError> {
    let files = state.pipeline.list_files().await?;
    Ok(Json(files))
}

async fn extract_text(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<ExtractionReport>, ApiError> {
    let report = state.pipeline.extract(&file_id).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct ChunkParams {
    chunk_size: Option<usize>,
    overlap: Option<usize>,
}

async fn preview_chunks(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Query(params): Query<ChunkParams>,
) -> Result<Json<ChunkPreview>, ApiError> {
    let policy = match (params.chunk_size, params.overlap) {
        (None, None) => ChunkPolicy::PREVIEW,
        (chunk_size, overlap) => ChunkPolicy::new(
            chunk_size.unwrap_or(ChunkPolicy::PREVIEW.chunk_size),
            overlap.unwrap_or(ChunkPolicy::PREVIEW.overlap),
        )?,
    };

    let preview = state.pipeline.preview_chunks(&file_id, policy).await?;
    Ok(Json(preview))
}

async fn embed_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<EmbeddingReport>, ApiError> {
    let report = state.pipeline.embed_file(&file_id).await?;
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    file_id: String,
}

async fn delete_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.pipeline.delete_file(&file_id).await?;
    Ok(Json(DeleteResponse { file_id }))
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    question: String,
    file_id: String,
}

async fn query_file(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<Answer>, ApiError> {
    info!(file_id = %request.file_id, "query received");
    let answer = state
        .pipeline
        .answer(&request.question, &request.file_id)
        .await?;
    Ok(Json(answer))
}
