use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::audit;
use crate::auth::{RequireAdmin, hash_password};
use crate::server::AppState;
use crate::server::dto::{CreateUserRequest, UpdateUserRequest};
use crate::server::response::{ApiError, StoreOptionExt, StoreResultExt};
use crate::server::validation::{parse_role, validate_password, validate_username};
use crate::types::{ActorType, Role, User};

pub async fn list_users(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let users = state.store.list_users().api_err("Failed to list users")?;
    Ok::<_, ApiError>(Json(json!({ "data": users })))
}

pub async fn create_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> impl IntoResponse {
    validate_username(&req.username)?;
    validate_password(&req.password)?;
    let role = parse_role(req.role.as_deref())?.unwrap_or(Role::Viewer);

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: req.username.clone(),
        password_hash: hash_password(&req.password)
            .map_err(|_| ApiError::internal("Failed to hash password"))?,
        role,
        created_at: now,
        updated_at: now,
    };

    state
        .store
        .create_user(&user)
        .api_err("Failed to create user")?;

    audit::record(
        state.store.as_ref(),
        ActorType::User,
        &admin.id,
        "user.create",
        "user",
        &user.id,
        json!({ "username": user.username, "role": user.role }),
    );

    Ok::<_, ApiError>((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> impl IntoResponse {
    let mut user = state
        .store
        .get_user_by_username(&username)
        .api_err("Failed to look up user")?
        .or_not_found("User not found")?;

    if let Some(role) = parse_role(req.role.as_deref())? {
        // Demoting the last admin would lock everyone out.
        if user.role == Role::Admin && role != Role::Admin {
            let admins = state.store.count_admins().api_err("Failed to count admins")?;
            if admins <= 1 {
                return Err(ApiError::conflict("Cannot demote the last admin"));
            }
        }
        user.role = role;
    }

    if let Some(password) = &req.password {
        validate_password(password)?;
        user.password_hash = hash_password(password)
            .map_err(|_| ApiError::internal("Failed to hash password"))?;
    }

    state
        .store
        .update_user(&user)
        .api_err("Failed to update user")?;

    audit::record(
        state.store.as_ref(),
        ActorType::User,
        &admin.id,
        "user.update",
        "user",
        &user.id,
        json!({ "username": user.username, "role": user.role }),
    );

    Ok::<_, ApiError>(Json(user))
}

pub async fn delete_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    let user = state
        .store
        .get_user_by_username(&username)
        .api_err("Failed to look up user")?
        .or_not_found("User not found")?;

    if user.role == Role::Admin {
        let admins = state.store.count_admins().api_err("Failed to count admins")?;
        if admins <= 1 {
            return Err(ApiError::conflict("Cannot delete the last admin"));
        }
    }

    state
        .store
        .delete_user(&user.id)
        .api_err("Failed to delete user")?;

    audit::record(
        state.store.as_ref(),
        ActorType::User,
        &admin.id,
        "user.delete",
        "user",
        &user.id,
        json!({ "username": user.username }),
    );

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn get_settings(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let settings = state
        .store
        .get_settings()
        .api_err("Failed to read settings")?;

    Ok::<_, ApiError>(Json(serde_json::Value::Object(settings)))
}

pub async fn update_settings(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let values = match body {
        serde_json::Value::Object(map) if !map.is_empty() => map,
        _ => {
            return Err(ApiError::validation("Settings body must be a non-empty object"));
        }
    };

    state
        .store
        .update_settings(&values)
        .api_err("Failed to update settings")?;

    audit::record(
        state.store.as_ref(),
        ActorType::User,
        &admin.id,
        "settings.update",
        "settings",
        "site",
        json!({ "keys": values.keys().collect::<Vec<_>>() }),
    );

    let settings = state
        .store
        .get_settings()
        .api_err("Failed to read settings")?;

    Ok::<_, ApiError>(Json(serde_json::Value::Object(settings)))
}
