use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::audit;
use crate::auth::{Actor, RequireActor};
use crate::content::{build_file_path, checksum_hex, estimate_tokens, slugify};
use crate::idempotency::{self, IDEMPOTENCY_KEY_HEADER};
use crate::server::AppState;
use crate::server::dto::{
    BatchDeleteRequest, BatchItemOutcome, BatchMoveRequest, CreateDocumentRequest,
    DocumentResponse, GetDocumentParams, ListDocumentsParams, UpdateDocumentRequest,
};
use crate::server::response::{
    ApiError, Paginated, StoreOptionExt, StoreResultExt, clamp_paging,
};
use crate::server::validation::{parse_visibility, validate_tags, validate_title};
use crate::store::{DocumentFilter, DocumentPatch, SortBy, SortOrder};
use crate::types::{Document, Scope, Visibility};

pub fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .filter(|k| !k.is_empty())
}

/// Validates inputs and assembles a fresh Document with its location
/// reference, checksum, and token estimate. Fails on an unknown folder.
fn prepare_document(
    state: &AppState,
    actor: &Actor,
    title: &str,
    content: &str,
    description: Option<String>,
    category: Option<String>,
    tags: Option<Vec<String>>,
    project: Option<String>,
    visibility: Option<String>,
    folder_id: Option<String>,
) -> Result<Document, ApiError> {
    validate_title(title)?;
    let tags = validate_tags(tags.unwrap_or_default())?;
    let visibility =
        parse_visibility(visibility.as_deref())?.unwrap_or(Visibility::Team);

    let dir_chain = match &folder_id {
        Some(folder_id) => {
            state
                .store
                .get_folder(folder_id)
                .api_err("Failed to look up folder")?
                .ok_or_else(|| {
                    ApiError::validation(format!("Unknown folder_id '{folder_id}'"))
                        .with_hint("Create the folder first or omit folder_id")
                })?;
            state
                .store
                .folder_dir_chain(folder_id)
                .api_err("Failed to resolve folder path")?
        }
        None => Vec::new(),
    };

    let slug = slugify(title);
    let now = Utc::now();

    Ok(Document {
        id: Uuid::new_v4().to_string(),
        title: title.to_string(),
        slug: slug.clone(),
        description,
        category,
        tags,
        project,
        visibility,
        folder_id,
        file_path: build_file_path(&dir_chain, &slug),
        latest_version: 1,
        checksum: checksum_hex(content),
        token_count: estimate_tokens(content),
        created_by: actor.actor_id().to_string(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    })
}

pub async fn list_documents(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListDocumentsParams>,
) -> impl IntoResponse {
    actor.require_scope(Scope::DOCUMENTS_READ)?;

    let sort_by = match params.sort_by.as_deref() {
        None => SortBy::default(),
        Some(s) => SortBy::parse(s).ok_or_else(|| {
            ApiError::validation(format!("Unknown sort_by '{s}'"))
                .with_hint("Valid values: title, created_at, updated_at")
        })?,
    };
    let sort_order = match params.sort_order.as_deref() {
        None => SortOrder::default(),
        Some(s) => SortOrder::parse(s).ok_or_else(|| {
            ApiError::validation(format!("Unknown sort_order '{s}'"))
                .with_hint("Valid values: asc, desc")
        })?,
    };
    let (page, page_size) = clamp_paging(params.page, params.page_size);

    let filter = DocumentFilter {
        tag: params.tag,
        project: params.project,
        folder_id: params.folder_id,
        query: params.q,
        sort_by,
        sort_order,
        page,
        page_size,
    };

    let result = state
        .store
        .list_documents(&filter)
        .api_err("Failed to list documents")?;

    Ok::<_, ApiError>(Json(Paginated::new(
        result.documents,
        page,
        page_size,
        result.total,
    )))
}

pub async fn create_document(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateDocumentRequest>,
) -> impl IntoResponse {
    actor.require_scope(Scope::DOCUMENTS_WRITE)?;

    let doc = prepare_document(
        &state,
        &actor,
        &req.title,
        &req.content,
        req.description,
        req.category,
        req.tags,
        req.project,
        req.visibility,
        req.folder_id,
    )?;

    let key = idempotency_key(&headers);
    let actor_type = actor.actor_type();
    let actor_id = actor.actor_id().to_string();
    let state2 = state.clone();

    let (status, body) = idempotency::guard(state.store.as_ref(), key, move || async move {
        state2
            .store
            .create_document(&doc, &req.content, None)
            .api_err("Failed to create document")?;

        audit::record(
            state2.store.as_ref(),
            actor_type,
            &actor_id,
            "document.create",
            "document",
            &doc.id,
            json!({ "title": doc.title, "file_path": doc.file_path }),
        );

        let body = serde_json::to_value(DocumentResponse {
            document: doc,
            content: None,
        })
        .map_err(|_| ApiError::internal("Failed to encode response"))?;
        Ok((StatusCode::CREATED, body))
    })
    .await?;

    Ok::<_, ApiError>((status, Json(body)))
}

pub async fn upload_documents(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> impl IntoResponse {
    actor.require_scope(Scope::DOCUMENTS_WRITE)?;

    let mut files: Vec<(String, String)> = Vec::new();
    let mut category = None;
    let mut tags = None;
    let mut folder_id = None;
    let mut visibility = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .unwrap_or("untitled.md")
                    .to_string();
                let content = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("Unreadable file field: {e}")))?;
                files.push((filename, content));
            }
            "category" => category = Some(read_text_field(field).await?),
            "tags" => {
                let raw = read_text_field(field).await?;
                tags = Some(
                    raw.split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect::<Vec<_>>(),
                );
            }
            "folder_id" => folder_id = Some(read_text_field(field).await?),
            "visibility" => visibility = Some(read_text_field(field).await?),
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(ApiError::validation("No file field in upload")
            .with_hint("Send one or more 'file' parts with markdown content"));
    }

    let mut docs = Vec::new();
    for (filename, content) in files {
        let title = filename
            .strip_suffix(".md")
            .or_else(|| filename.strip_suffix(".markdown"))
            .unwrap_or(&filename)
            .to_string();
        let doc = prepare_document(
            &state,
            &actor,
            &title,
            &content,
            None,
            category.clone(),
            tags.clone(),
            None,
            visibility.clone(),
            folder_id.clone(),
        )?;
        docs.push((doc, content));
    }

    let key = idempotency_key(&headers);
    let actor_type = actor.actor_type();
    let actor_id = actor.actor_id().to_string();
    let state2 = state.clone();

    let (status, body) = idempotency::guard(state.store.as_ref(), key, move || async move {
        let mut created = Vec::new();
        for (doc, content) in docs {
            state2
                .store
                .create_document(&doc, &content, None)
                .api_err("Failed to create document")?;

            audit::record(
                state2.store.as_ref(),
                actor_type,
                &actor_id,
                "document.create",
                "document",
                &doc.id,
                json!({ "title": doc.title, "file_path": doc.file_path }),
            );

            created.push(DocumentResponse {
                document: doc,
                content: None,
            });
        }

        let body = serde_json::to_value(json!({ "data": created }))
            .map_err(|_| ApiError::internal("Failed to encode response"))?;
        Ok((StatusCode::CREATED, body))
    })
    .await?;

    Ok::<_, ApiError>((status, Json(body)))
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::validation(format!("Unreadable form field: {e}")))
}

pub async fn get_document(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<GetDocumentParams>,
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

    // Rendering happens in the presentation layer; include_rendered is
    // accepted at the boundary but this core only serves raw content.
    let content = if params.include_raw == Some(true) {
        state
            .store
            .get_current_content(&id)
            .api_err("Failed to read content")?
    } else {
        None
    };

    let etag = format!("\"{}\"", doc.checksum);
    let body = Json(DocumentResponse {
        document: doc,
        content,
    });

    Ok::<_, ApiError>(([(header::ETAG, etag)], body))
}

pub async fn update_document(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateDocumentRequest>,
) -> impl IntoResponse {
    actor.require_scope(Scope::DOCUMENTS_WRITE)?;

    if let Some(title) = &req.title {
        validate_title(title)?;
    }
    let tags = match req.tags {
        Some(tags) => Some(validate_tags(tags)?),
        None => None,
    };
    let visibility = parse_visibility(req.visibility.as_deref())?;

    let patch = DocumentPatch {
        title: req.title,
        description: req.description,
        category: req.category,
        tags,
        project: req.project,
        visibility,
        folder_id: req.folder_id,
    };

    let key = idempotency_key(&headers);
    let actor_type = actor.actor_type();
    let actor_id = actor.actor_id().to_string();
    let state2 = state.clone();

    let (status, body) = idempotency::guard(state.store.as_ref(), key, move || async move {
        let mut doc = state2
            .store
            .update_document(&id, &patch)
            .api_err("Failed to update document")?;

        let mut metadata = json!({ "title": doc.title });
        if let Some(content) = &req.content {
            let version = state2
                .store
                .append_version(&id, content, req.change_note.as_deref(), &actor_id)
                .api_err("Failed to append version")?;
            metadata["version"] = json!(version.version_number);

            doc = state2
                .store
                .get_document(&id)
                .api_err("Failed to reload document")?
                .or_not_found("Document not found")?;
        }

        audit::record(
            state2.store.as_ref(),
            actor_type,
            &actor_id,
            "document.update",
            "document",
            &id,
            metadata,
        );

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

pub async fn delete_document(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    actor.require_scope(Scope::DOCUMENTS_WRITE)?;

    state
        .store
        .soft_delete_document(&id)
        .api_err("Failed to delete document")?;

    audit::record(
        state.store.as_ref(),
        actor.actor_type(),
        actor.actor_id(),
        "document.delete",
        "document",
        &id,
        json!({}),
    );

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn batch_delete(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchDeleteRequest>,
) -> impl IntoResponse {
    actor.require_scope(Scope::DOCUMENTS_WRITE)?;

    let mut results = Vec::new();
    for id in req.ids {
        match state.store.soft_delete_document(&id) {
            Ok(()) => {
                audit::record(
                    state.store.as_ref(),
                    actor.actor_type(),
                    actor.actor_id(),
                    "document.delete",
                    "document",
                    &id,
                    json!({}),
                );
                results.push(BatchItemOutcome {
                    id,
                    ok: true,
                    error: None,
                });
            }
            Err(e) => results.push(BatchItemOutcome {
                id,
                ok: false,
                error: Some(e.to_string()),
            }),
        }
    }

    Ok::<_, ApiError>(Json(json!({ "results": results })))
}

pub async fn batch_move(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchMoveRequest>,
) -> impl IntoResponse {
    actor.require_scope(Scope::DOCUMENTS_WRITE)?;

    if let Some(folder_id) = &req.folder_id {
        state
            .store
            .get_folder(folder_id)
            .api_err("Failed to look up folder")?
            .ok_or_else(|| ApiError::validation(format!("Unknown folder_id '{folder_id}'")))?;
    }

    let patch = DocumentPatch {
        folder_id: Some(req.folder_id.clone()),
        ..Default::default()
    };

    let mut results = Vec::new();
    for id in req.ids {
        match state.store.update_document(&id, &patch) {
            Ok(doc) => {
                audit::record(
                    state.store.as_ref(),
                    actor.actor_type(),
                    actor.actor_id(),
                    "document.update",
                    "document",
                    &id,
                    json!({ "folder_id": doc.folder_id }),
                );
                results.push(BatchItemOutcome {
                    id,
                    ok: true,
                    error: None,
                });
            }
            Err(e) => results.push(BatchItemOutcome {
                id,
                ok: false,
                error: Some(e.to_string()),
            }),
        }
    }

    Ok::<_, ApiError>(Json(json!({ "results": results })))
}
