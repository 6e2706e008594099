use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::auth::RequireActor;
use crate::server::AppState;
use crate::server::dto::{SearchHit, SearchParams};
use crate::server::response::{ApiError, Paginated, StoreResultExt, clamp_paging};
use crate::types::{Document, Scope};

const SNIPPET_RADIUS: usize = 80;

fn count_occurrences(haystack: &str, needle: &str) -> i64 {
    if needle.is_empty() {
        return 0;
    }
    haystack
        .to_lowercase()
        .matches(&needle.to_lowercase())
        .count() as i64
}

/// Title matches outrank description matches outrank body matches.
fn score(doc: &Document, content: &str, query: &str) -> i64 {
    count_occurrences(&doc.title, query) * 3
        + doc
            .description
            .as_deref()
            .map_or(0, |d| count_occurrences(d, query) * 2)
        + count_occurrences(content, query)
}

/// A short window of content around the first match, on char boundaries.
fn snippet(content: &str, query: &str) -> String {
    let lower = content.to_lowercase();
    let hit = lower.find(&query.to_lowercase()).unwrap_or(0);

    let start = content
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= hit.saturating_sub(SNIPPET_RADIUS))
        .last()
        .unwrap_or(0);
    let end = content
        .char_indices()
        .map(|(i, _)| i)
        .find(|&i| i >= (hit + query.len() + SNIPPET_RADIUS).min(content.len()))
        .unwrap_or(content.len());

    let mut out = String::new();
    if start > 0 {
        out.push('…');
    }
    out.push_str(content[start..end].trim());
    if end < content.len() {
        out.push('…');
    }
    out
}

pub async fn search(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    actor.require_scope(Scope::SEARCH_READ)?;

    let query = params.q.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::validation("Search query cannot be empty")
            .with_hint("Pass a non-empty q parameter"));
    }
    let (page, page_size) = clamp_paging(params.page, params.page_size);

    let candidates = state
        .store
        .search_candidates(&query)
        .api_err("Search failed")?;

    let mut hits: Vec<SearchHit> = candidates
        .into_iter()
        .map(|(document, content)| {
            let score = score(&document, &content, &query);
            let snippet = snippet(&content, &query);
            SearchHit {
                document,
                score,
                snippet,
            }
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.document.id.cmp(&b.document.id))
    });

    let total = hits.len() as i64;
    let start = ((page - 1) * page_size) as usize;
    let page_hits: Vec<SearchHit> = hits
        .into_iter()
        .skip(start)
        .take(page_size as usize)
        .collect();

    Ok::<_, ApiError>(Json(Paginated::new(page_hits, page, page_size, total)))
}

pub async fn list_categories(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    actor.require_scope(Scope::DOCUMENTS_READ)?;

    let categories = state
        .store
        .list_categories()
        .api_err("Failed to list categories")?;

    Ok::<_, ApiError>(Json(json!({ "data": categories })))
}

pub async fn list_tags(
    RequireActor(actor): RequireActor,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    actor.require_scope(Scope::DOCUMENTS_READ)?;

    let tags = state.store.list_tags().api_err("Failed to list tags")?;

    Ok::<_, ApiError>(Json(json!({ "data": tags })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_occurrences_case_insensitive() {
        assert_eq!(count_occurrences("Rust and rust and RUST", "rust"), 3);
        assert_eq!(count_occurrences("nothing here", "rust"), 0);
    }

    #[test]
    fn test_snippet_windows_around_match() {
        let content = format!("{}needle{}", "x".repeat(200), "y".repeat(200));
        let s = snippet(&content, "needle");
        assert!(s.contains("needle"));
        assert!(s.starts_with('…'));
        assert!(s.ends_with('…'));
        assert!(s.len() < content.len());
    }

    #[test]
    fn test_snippet_short_content_untouched() {
        assert_eq!(snippet("short body", "body"), "short body");
    }

    #[test]
    fn test_snippet_multibyte_safe() {
        let content = format!("{}needle{}", "é".repeat(100), "ß".repeat(100));
        let s = snippet(&content, "needle");
        assert!(s.contains("needle"));
    }
}
