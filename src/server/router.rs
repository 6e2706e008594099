use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{
    Router,
    routing::{delete, get, post, put},
};

use super::{admin, agents, audit_logs, auth_routes, chunks, documents, folders, search, shares, versions};
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(auth_routes::login))
        .route("/me", get(auth_routes::me))
        .route("/logout", post(auth_routes::logout));

    let api_v1 = Router::new()
        // Documents
        .route("/documents", get(documents::list_documents))
        .route("/documents", post(documents::create_document))
        .route("/documents/upload", post(documents::upload_documents))
        .route("/documents/batch-delete", post(documents::batch_delete))
        .route("/documents/batch-move", post(documents::batch_move))
        .route("/documents/{id}", get(documents::get_document))
        .route("/documents/{id}", put(documents::update_document))
        .route("/documents/{id}", delete(documents::delete_document))
        // Version ledger
        .route("/documents/{id}/versions", get(versions::list_versions))
        .route("/documents/{id}/rollback", post(versions::rollback))
        // Chunking
        .route("/documents/{id}/chunks", get(chunks::get_chunks))
        // Shares
        .route("/documents/{id}/share", post(shares::create_share))
        // Search & taxonomy
        .route("/search", get(search::search))
        .route("/categories", get(search::list_categories))
        .route("/tags", get(search::list_tags))
        // Folders
        .route("/folders", get(folders::list_folders))
        .route("/folders", post(folders::create_folder))
        .route("/folders/{id}", put(folders::update_folder))
        .route("/folders/{id}", delete(folders::delete_folder))
        // Agent credentials
        .route("/agents/tokens", get(agents::list_agent_tokens))
        .route("/agents/tokens", post(agents::create_agent_token))
        .route("/agents/tokens/{id}", delete(agents::delete_agent_token))
        // Audit trail
        .route("/audit-logs", get(audit_logs::list_audit_logs))
        // Admin
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users", post(admin::create_user))
        .route("/admin/users/{username}", put(admin::update_user))
        .route("/admin/users/{username}", delete(admin::delete_user))
        .route("/admin/settings", get(admin::get_settings))
        .route("/admin/settings", put(admin::update_settings));

    Router::new()
        .route("/health", get(health))
        .nest("/api/auth", auth_routes)
        .nest("/api/v1", api_v1)
        .route("/share/{token}", get(shares::resolve_share))
        .layer(DefaultBodyLimit::max(16 * 1024 * 1024))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
