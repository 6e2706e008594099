use axum::http::StatusCode;
use chrono::Utc;

use crate::server::response::ApiError;
use crate::store::Store;
use crate::types::IdempotencyRecord;

/// HTTP header carrying the caller-chosen idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Runs a mutating operation at most once per key. Without a key the
/// operation executes normally. With one, a stored response is replayed
/// verbatim and the operation (including its audit and version side
/// effects) is skipped; otherwise the operation runs and its response is
/// recorded under the key. The stored response always wins, so a concurrent
/// duplicate converges on one result.
pub async fn guard<F, Fut>(
    store: &dyn Store,
    key: Option<String>,
    op: F,
) -> Result<(StatusCode, serde_json::Value), ApiError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(StatusCode, serde_json::Value), ApiError>>,
{
    let Some(key) = key else {
        return op().await;
    };

    if let Some(record) = store.get_idempotency_record(&key)? {
        return Ok(replay(&record));
    }

    let (status, body) = op().await?;

    let stored = store.put_idempotency_record(&IdempotencyRecord {
        key,
        response_status: status.as_u16(),
        response_body: body.to_string(),
        created_at: Utc::now(),
    })?;

    Ok(replay(&stored))
}

fn replay(record: &IdempotencyRecord) -> (StatusCode, serde_json::Value) {
    let status =
        StatusCode::from_u16(record.response_status).unwrap_or(StatusCode::OK);
    let body = serde_json::from_str(&record.response_body)
        .unwrap_or(serde_json::Value::Null);
    (status, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_guard_without_key_always_executes() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();

        let calls = AtomicU32::new(0);
        for _ in 0..2 {
            let (status, _) = guard(&store, None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok((StatusCode::CREATED, serde_json::json!({"ok": true})))
            })
            .await
            .unwrap();
            assert_eq!(status, StatusCode::CREATED);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_guard_replays_stored_response() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();

        let calls = AtomicU32::new(0);
        let mut responses = Vec::new();
        for _ in 0..3 {
            let result = guard(&store, Some("key-1".to_string()), || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Ok((StatusCode::CREATED, serde_json::json!({"attempt": n})))
            })
            .await
            .unwrap();
            responses.push(result);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(responses.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(responses[0].1, serde_json::json!({"attempt": 0}));
    }

    #[tokio::test]
    async fn test_guard_does_not_store_failures() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();

        let result = guard(&store, Some("key-2".to_string()), || async {
            Err(ApiError::validation("bad input"))
        })
        .await;
        assert!(result.is_err());

        // A retry after a failure executes for real.
        let (status, _) = guard(&store, Some("key-2".to_string()), || async {
            Ok((StatusCode::OK, serde_json::json!({"ok": true})))
        })
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
    }
}
