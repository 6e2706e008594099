use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::Utc;

use super::session::hash_session_token;
use super::token::{AgentTokenGenerator, parse_agent_token};
use crate::server::AppState;
use crate::server::response::ApiError;
use crate::types::{ActorType, AgentToken, Role, Scope, User};

/// Header carrying machine credentials; humans use `Authorization: Bearer`.
pub const AGENT_TOKEN_HEADER: &str = "x-agent-token";

/// A resolved caller identity: a human session or a machine credential.
pub enum Actor {
    User(User),
    Agent(AgentToken),
}

impl Actor {
    #[must_use]
    pub fn actor_type(&self) -> ActorType {
        match self {
            Actor::User(_) => ActorType::User,
            Actor::Agent(_) => ActorType::Agent,
        }
    }

    #[must_use]
    pub fn actor_id(&self) -> &str {
        match self {
            Actor::User(user) => &user.id,
            Actor::Agent(token) => &token.id,
        }
    }

    /// Users hold every capability; agents only what their credential grants.
    #[must_use]
    pub fn has_scope(&self, required: Scope) -> bool {
        match self {
            Actor::User(_) => true,
            Actor::Agent(token) => token.scopes.has(required),
        }
    }

    pub fn require_scope(&self, required: Scope) -> Result<(), AuthError> {
        if self.has_scope(required) {
            Ok(())
        } else {
            Err(AuthError::MissingScope(required))
        }
    }
}

/// Extractor that accepts either actor variant.
pub struct RequireActor(pub Actor);

/// Extractor that requires a human session.
pub struct RequireUser(pub User);

/// Extractor that requires a human session with the admin role.
pub struct RequireAdmin(pub User);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    MissingScope(Scope),
    AgentNotAllowed,
    NotAdmin,
    InternalError,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingAuth => ApiError::unauthorized("Authentication required")
                .with_hint("Send a session token as 'Authorization: Bearer <token>' or an agent credential in the X-Agent-Token header"),
            AuthError::InvalidScheme => ApiError::unauthorized("Invalid authorization scheme")
                .with_hint("Only the Bearer scheme is supported"),
            AuthError::InvalidToken => ApiError::unauthorized("Invalid credential"),
            AuthError::TokenExpired => ApiError::unauthorized("Credential expired"),
            AuthError::MissingScope(scope) => {
                ApiError::forbidden(format!("Missing required scope '{scope}'"))
                    .with_hint("Issue a new agent token carrying this scope")
            }
            AuthError::AgentNotAllowed => {
                ApiError::forbidden("This operation requires a human session")
            }
            AuthError::NotAdmin => ApiError::forbidden("Admin role required"),
            AuthError::InternalError => ApiError::internal("Internal server error"),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

impl FromRequestParts<Arc<AppState>> for RequireActor {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(raw) = agent_header(parts) {
            let token = validate_agent_token(state, &raw)?;
            return Ok(RequireActor(Actor::Agent(token)));
        }

        let user = validate_session(parts, state)?;
        Ok(RequireActor(Actor::User(user)))
    }
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if agent_header(parts).is_some() {
            return Err(AuthError::AgentNotAllowed);
        }
        let user = validate_session(parts, state)?;
        Ok(RequireUser(user))
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if agent_header(parts).is_some() {
            return Err(AuthError::AgentNotAllowed);
        }
        let user = validate_session(parts, state)?;
        if user.role != Role::Admin {
            return Err(AuthError::NotAdmin);
        }
        Ok(RequireAdmin(user))
    }
}

fn agent_header(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AGENT_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

fn bearer_token(parts: &Parts) -> Result<String, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingAuth)?;

    header
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or(AuthError::InvalidScheme)
}

fn validate_session(parts: &Parts, state: &Arc<AppState>) -> Result<User, AuthError> {
    let raw = bearer_token(parts)?;
    let digest = hash_session_token(&raw);

    let session = state
        .store
        .get_session_by_token_hash(&digest)
        .map_err(|_| AuthError::InternalError)?
        .ok_or(AuthError::InvalidToken)?;

    if session.expires_at < Utc::now() {
        return Err(AuthError::TokenExpired);
    }

    state
        .store
        .get_user(&session.user_id)
        .map_err(|_| AuthError::InternalError)?
        .ok_or(AuthError::InvalidToken)
}

fn validate_agent_token(state: &Arc<AppState>, raw: &str) -> Result<AgentToken, AuthError> {
    let (prefix, _secret) =
        parse_agent_token(raw).map_err(|_| AuthError::InvalidToken)?;

    let token = state
        .store
        .get_agent_token_by_prefix(&prefix)
        .map_err(|_| AuthError::InternalError)?
        .ok_or(AuthError::InvalidToken)?;

    let generator = AgentTokenGenerator::new();
    if !generator
        .verify(raw, &token.token_hash)
        .map_err(|_| AuthError::InternalError)?
    {
        return Err(AuthError::InvalidToken);
    }

    if let Some(expires_at) = &token.expires_at {
        if expires_at < &Utc::now() {
            return Err(AuthError::TokenExpired);
        }
    }

    if let Err(e) = state.store.update_agent_token_last_used(&token.id) {
        tracing::warn!("Failed to update agent token last_used_at: {e}");
    }

    Ok(token)
}
