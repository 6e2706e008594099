use chrono::Utc;
use uuid::Uuid;

use crate::store::Store;
use crate::types::{ActorType, AuditLogEntry};

/// Appends an audit entry, fire-and-forget: a failed write is logged for
/// operational monitoring but never fails the triggering operation.
pub fn record(
    store: &dyn Store,
    actor_type: ActorType,
    actor_id: &str,
    action: &str,
    resource_type: &str,
    resource_id: &str,
    metadata: serde_json::Value,
) {
    let entry = AuditLogEntry {
        id: Uuid::new_v4().to_string(),
        actor_type,
        actor_id: actor_id.to_string(),
        action: action.to_string(),
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        metadata,
        created_at: Utc::now(),
    };

    if let Err(e) = store.append_audit_entry(&entry) {
        tracing::warn!(
            "Failed to write audit entry {} for {}: {e}",
            entry.action,
            entry.resource_id
        );
    }
}
