use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::auth::RequireActor;
use crate::chunk::{DEFAULT_CHUNK_TOKENS, chunk_markdown};
use crate::server::AppState;
use crate::server::dto::ChunkParams;
use crate::server::response::{ApiError, StoreOptionExt, StoreResultExt};
use crate::types::Scope;

pub async fn get_chunks(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<ChunkParams>,
) -> impl IntoResponse {
    actor.require_scope(Scope::DOCUMENTS_READ)?;

    let doc = state
        .store
        .get_document(&id)
        .api_err("Failed to get document")?
        .or_not_found("Document not found")?;
    if doc.deleted_at.is_some() {
        return Err(ApiError::not_found("Document not found"));
    }

    let content = state
        .store
        .get_current_content(&id)
        .api_err("Failed to read content")?
        .or_not_found("Document content not found")?;

    let max_tokens = params.max_tokens.unwrap_or(DEFAULT_CHUNK_TOKENS);
    let chunks = chunk_markdown(&content, max_tokens);

    Ok::<_, ApiError>(Json(json!({
        "document_id": doc.id,
        "checksum": doc.checksum,
        "chunks": chunks,
    })))
}
