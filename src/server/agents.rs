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
use crate::auth::{AgentTokenGenerator, RequireAdmin};
use crate::server::AppState;
use crate::server::dto::{CreateAgentTokenRequest, CreateAgentTokenResponse};
use crate::server::response::{ApiError, StoreResultExt};
use crate::server::validation::parse_scopes;
use crate::types::{ActorType, AgentToken};

pub async fn list_agent_tokens(
    RequireAdmin(_user): RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let tokens = state
        .store
        .list_agent_tokens()
        .api_err("Failed to list agent tokens")?;

    Ok::<_, ApiError>(Json(json!({ "data": tokens })))
}

pub async fn create_agent_token(
    RequireAdmin(user): RequireAdmin,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAgentTokenRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() {
        return Err(ApiError::validation("Token name cannot be empty"));
    }
    let scopes = parse_scopes(&req.scopes)?;
    if let Some(expires_at) = &req.expires_at {
        if expires_at <= &Utc::now() {
            return Err(ApiError::validation("expires_at must be in the future"));
        }
    }

    let generator = AgentTokenGenerator::new();
    let (raw_token, prefix, hash) = generator
        .generate()
        .api_err("Failed to generate credential")?;

    let token = AgentToken {
        id: Uuid::new_v4().to_string(),
        name: req.name.trim().to_string(),
        role: req.role.unwrap_or_else(|| "agent".to_string()),
        scopes,
        token_prefix: prefix,
        token_hash: hash,
        expires_at: req.expires_at,
        created_at: Utc::now(),
        last_used_at: None,
    };

    state
        .store
        .create_agent_token(&token)
        .api_err("Failed to store credential")?;

    audit::record(
        state.store.as_ref(),
        ActorType::User,
        &user.id,
        "agent_token.create",
        "agent_token",
        &token.id,
        json!({ "name": token.name, "scopes": token.scopes.to_strings() }),
    );

    // The raw secret leaves the server exactly once, right here.
    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(CreateAgentTokenResponse {
            token: raw_token,
            metadata: token,
        }),
    ))
}

pub async fn delete_agent_token(
    RequireAdmin(user): RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let deleted = state
        .store
        .delete_agent_token(&id)
        .api_err("Failed to delete agent token")?;

    if !deleted {
        return Err(ApiError::not_found("Agent token not found"));
    }

    audit::record(
        state.store.as_ref(),
        ActorType::User,
        &user.id,
        "agent_token.delete",
        "agent_token",
        &id,
        json!({}),
    );

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
