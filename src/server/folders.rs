use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use crate::audit;
use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{CreateFolderRequest, DeleteFolderResponse, UpdateFolderRequest};
use crate::server::response::{ApiError, StoreResultExt};
use crate::server::validation::validate_folder_name;
use crate::types::ActorType;

pub async fn list_folders(
    RequireUser(_user): RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let folders = state
        .store
        .list_folders()
        .api_err("Failed to list folders")?;

    Ok::<_, ApiError>(Json(json!({ "data": folders })))
}

pub async fn create_folder(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateFolderRequest>,
) -> impl IntoResponse {
    validate_folder_name(&req.name)?;

    let folder = state
        .store
        .create_folder(&req.name, req.parent_id.as_deref(), &user.id)
        .api_err("Failed to create folder")?;

    audit::record(
        state.store.as_ref(),
        ActorType::User,
        &user.id,
        "folder.create",
        "folder",
        &folder.id,
        json!({ "name": folder.name, "parent_id": folder.parent_id }),
    );

    Ok::<_, ApiError>((StatusCode::CREATED, Json(folder)))
}

pub async fn update_folder(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateFolderRequest>,
) -> impl IntoResponse {
    if let Some(name) = &req.name {
        validate_folder_name(name)?;
    }
    if req.name.is_none() && req.parent_id.is_none() {
        return Err(ApiError::validation("Nothing to update")
            .with_hint("Provide a new name, a new parent_id, or both"));
    }

    let folder = state
        .store
        .move_folder(
            &id,
            req.name.as_deref(),
            req.parent_id.as_ref().map(Option::as_deref),
        )
        .api_err("Failed to update folder")?;

    audit::record(
        state.store.as_ref(),
        ActorType::User,
        &user.id,
        "folder.update",
        "folder",
        &folder.id,
        json!({ "name": folder.name, "parent_id": folder.parent_id }),
    );

    Ok::<_, ApiError>(Json(folder))
}

pub async fn delete_folder(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let folders_removed = state
        .store
        .delete_folder(&id)
        .api_err("Failed to delete folder")?;

    audit::record(
        state.store.as_ref(),
        ActorType::User,
        &user.id,
        "folder.delete",
        "folder",
        &id,
        json!({ "folders_removed": folders_removed }),
    );

    Ok::<_, ApiError>(Json(DeleteFolderResponse { folders_removed }))
}
