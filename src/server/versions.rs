use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde_json::json;

use crate::audit;
use crate::auth::RequireActor;
use crate::idempotency;
use crate::server::AppState;
use crate::server::documents::idempotency_key;
use crate::server::dto::{DocumentResponse, RollbackRequest, VersionListResponse};
use crate::server::response::{ApiError, StoreOptionExt, StoreResultExt};
use crate::types::Scope;

pub async fn list_versions(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    actor.require_scope(Scope::VERSIONS_READ)?;

    // History outlives a soft delete, so no deleted_at check here.
    state
        .store
        .get_document(&id)
        .api_err("Failed to get document")?
        .or_not_found("Document not found")?;

    let versions = state
        .store
        .list_versions(&id)
        .api_err("Failed to list versions")?;

    Ok::<_, ApiError>(Json(VersionListResponse { versions }))
}

pub async fn rollback(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<RollbackRequest>,
) -> impl IntoResponse {
    actor.require_scope(Scope::DOCUMENTS_WRITE)?;

    let doc = state
        .store
        .get_document(&id)
        .api_err("Failed to get document")?
        .or_not_found("Document not found")?;
    if doc.deleted_at.is_some() {
        return Err(ApiError::not_found("Document not found"));
    }

    let target = state
        .store
        .get_version(&id, req.target_version)
        .api_err("Failed to look up target version")?
        .ok_or_else(|| {
            ApiError::validation(format!(
                "Version {} does not exist for this document",
                req.target_version
            ))
            .with_hint("List versions to find a valid target_version")
        })?;

    let key = idempotency_key(&headers);
    let actor_type = actor.actor_type();
    let actor_id = actor.actor_id().to_string();
    let state2 = state.clone();

    let (status, body) = idempotency::guard(state.store.as_ref(), key, move || async move {
        let content = target
            .content
            .as_deref()
            .ok_or_else(|| ApiError::internal("Version content missing"))?;
        let note = req
            .change_note
            .clone()
            .unwrap_or_else(|| format!("Rollback to version {}", req.target_version));

        // A rollback is a new version carrying the old content, never a
        // pointer change.
        let version = state2
            .store
            .append_version(&id, content, Some(&note), &actor_id)
            .api_err("Failed to append rollback version")?;

        audit::record(
            state2.store.as_ref(),
            actor_type,
            &actor_id,
            "document.rollback",
            "document",
            &id,
            json!({
                "target_version": req.target_version,
                "new_version": version.version_number,
            }),
        );

        let doc = state2
            .store
            .get_document(&id)
            .api_err("Failed to reload document")?
            .or_not_found("Document not found")?;

        let body = serde_json::to_value(DocumentResponse {
            document: doc,
            content: None,
        })
        .map_err(|_| ApiError::internal("Failed to encode response"))?;
        Ok((StatusCode::OK, body))
    })
    .await?;

    Ok::<_, ApiError>((status, Json(body)))
}
