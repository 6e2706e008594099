use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::audit;
use crate::auth::{RequireUser, SESSION_TTL_DAYS, generate_session_token, hash_session_token,
    verify_password};
use crate::server::AppState;
use crate::server::dto::{LoginRequest, LoginResponse};
use crate::server::response::{ApiError, StoreResultExt};
use crate::types::{ActorType, Session};

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> impl IntoResponse {
    let invalid = || ApiError::unauthorized("Invalid username or password");

    let user = state
        .store
        .get_user_by_username(&req.username)
        .api_err("Failed to look up user")?
        .ok_or_else(invalid)?;

    if !verify_password(&req.password, &user.password_hash)
        .map_err(|_| ApiError::internal("Credential check failed"))?
    {
        return Err(invalid());
    }

    let (raw_token, token_hash) = generate_session_token();
    let now = Utc::now();
    let session = Session {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        token_hash,
        created_at: now,
        expires_at: now + Duration::days(SESSION_TTL_DAYS),
    };

    state
        .store
        .create_session(&session)
        .api_err("Failed to create session")?;

    audit::record(
        state.store.as_ref(),
        ActorType::User,
        &user.id,
        "auth.login",
        "session",
        &session.id,
        json!({ "username": user.username }),
    );

    Ok::<_, ApiError>(Json(LoginResponse {
        token: raw_token,
        user,
    }))
}

pub async fn me(RequireUser(user): RequireUser) -> impl IntoResponse {
    Json(user)
}

pub async fn logout(
    RequireUser(user): RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let raw = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if let Some(session) = state
        .store
        .get_session_by_token_hash(&hash_session_token(raw))
        .api_err("Failed to look up session")?
    {
        state
            .store
            .delete_session(&session.id)
            .api_err("Failed to delete session")?;

        audit::record(
            state.store.as_ref(),
            ActorType::User,
            &user.id,
            "auth.logout",
            "session",
            &session.id,
            json!({}),
        );
    }

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
