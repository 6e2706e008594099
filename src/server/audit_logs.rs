use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crate::auth::RequireActor;
use crate::server::AppState;
use crate::server::dto::AuditLogParams;
use crate::server::response::{ApiError, Paginated, StoreResultExt, clamp_paging};
use crate::store::AuditFilter;
use crate::types::{ActorType, Scope};

pub async fn list_audit_logs(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditLogParams>,
) -> impl IntoResponse {
    actor.require_scope(Scope::AUDIT_READ)?;

    let actor_type = match params.actor_type.as_deref() {
        None => None,
        Some(s) => Some(ActorType::parse(s).ok_or_else(|| {
            ApiError::validation(format!("Unknown actor_type '{s}'"))
                .with_hint("Valid values: user, agent, system")
        })?),
    };
    let (page, page_size) = clamp_paging(params.page, params.page_size);

    let filter = AuditFilter {
        actor_type,
        action: params.action,
        page,
        page_size,
    };

    let result = state
        .store
        .list_audit_entries(&filter)
        .api_err("Failed to list audit logs")?;

    Ok::<_, ApiError>(Json(Paginated::new(
        result.entries,
        page,
        page_size,
        result.total,
    )))
}
