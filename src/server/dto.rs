use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{AgentToken, Document, DocumentVersion, User};

/// Distinguishes an absent field from an explicit `null` in PATCH-style
/// bodies: missing → `None`, `null` → `Some(None)`, value → `Some(Some(v))`.
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

// --- Auth ---

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

// --- Documents ---

#[derive(Debug, Default, Deserialize)]
pub struct ListDocumentsParams {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDocumentRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub folder_id: Option<Option<String>>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub change_note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GetDocumentParams {
    #[serde(default)]
    pub include_raw: Option<bool>,
    #[serde(default)]
    pub include_rendered: Option<bool>,
}

/// Document plus optionally its raw content.
#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    #[serde(flatten)]
    pub document: Document,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchDeleteRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchMoveRequest {
    pub ids: Vec<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchItemOutcome {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- Versions ---

#[derive(Debug, Serialize)]
pub struct VersionListResponse {
    pub versions: Vec<DocumentVersion>,
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub target_version: i64,
    #[serde(default)]
    pub change_note: Option<String>,
}

// --- Chunks ---

#[derive(Debug, Default, Deserialize)]
pub struct ChunkParams {
    #[serde(default)]
    pub max_tokens: Option<i64>,
}

// --- Search ---

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub document: Document,
    pub score: i64,
    pub snippet: String,
}

// --- Folders ---

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateFolderRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct DeleteFolderResponse {
    pub folders_removed: i64,
}

// --- Agent tokens ---

#[derive(Debug, Deserialize)]
pub struct CreateAgentTokenRequest {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CreateAgentTokenResponse {
    /// Shown exactly once; only a hash is retained server-side.
    pub token: String,
    pub metadata: AgentToken,
}

// --- Audit ---

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogParams {
    #[serde(default)]
    pub actor_type: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

// --- Shares ---

#[derive(Debug, Default, Deserialize)]
pub struct CreateShareRequest {
    #[serde(default)]
    pub access_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveShareParams {
    #[serde(default)]
    pub code: Option<String>,
}

// --- Admin ---

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}
