use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::Rng;
use serde_json::json;
use uuid::Uuid;

use crate::audit;
use crate::auth::RequireActor;
use crate::server::AppState;
use crate::server::dto::{CreateShareRequest, DocumentResponse, ResolveShareParams};
use crate::server::response::{ApiError, StoreOptionExt, StoreResultExt};
use crate::types::{Scope, Share};

const SHARE_TOKEN_BYTES: usize = 32;

/// Unguessable URL-safe share token.
fn generate_share_token() -> String {
    let mut bytes = [0u8; SHARE_TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub async fn create_share(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CreateShareRequest>,
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

    let share = Share {
        id: Uuid::new_v4().to_string(),
        document_id: doc.id.clone(),
        token: generate_share_token(),
        access_code: req.access_code.filter(|c| !c.is_empty()),
        created_by: actor.actor_id().to_string(),
        created_at: Utc::now(),
    };

    state
        .store
        .create_share(&share)
        .api_err("Failed to create share")?;

    audit::record(
        state.store.as_ref(),
        actor.actor_type(),
        actor.actor_id(),
        "share.create",
        "share",
        &share.id,
        json!({ "document_id": doc.id }),
    );

    Ok::<_, ApiError>((StatusCode::CREATED, Json(share)))
}

/// Unauthenticated read path: token grants access to one document, gated by
/// the access code when one is set.
pub async fn resolve_share(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Query(params): Query<ResolveShareParams>,
) -> impl IntoResponse {
    let share = state
        .store
        .get_share_by_token(&token)
        .api_err("Failed to resolve share")?
        .or_not_found("Share not found")?;

    if let Some(code) = &share.access_code {
        if params.code.as_deref() != Some(code.as_str()) {
            return Err(ApiError::forbidden("Access code required or incorrect")
                .with_hint("Pass the access code as ?code="));
        }
    }

    let doc = state
        .store
        .get_document(&share.document_id)
        .api_err("Failed to get document")?
        .or_not_found("Share not found")?;
    if doc.deleted_at.is_some() {
        return Err(ApiError::not_found("Share not found"));
    }

    let content = state
        .store
        .get_current_content(&doc.id)
        .api_err("Failed to read content")?;

    Ok::<_, ApiError>(Json(DocumentResponse {
        document: doc,
        content,
    }))
}
