mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Filters and ordering for document listings. `sort_by`/`sort_order` are
/// validated at the API boundary; the store applies an id tiebreak so
/// pagination is reproducible.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub tag: Option<String>,
    pub project: Option<String>,
    pub folder_id: Option<String>,
    pub query: Option<String>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    Title,
    CreatedAt,
    #[default]
    UpdatedAt,
}

impl SortBy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "title" => Some(Self::Title),
            "created_at" => Some(Self::CreatedAt),
            "updated_at" => Some(Self::UpdatedAt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentPage {
    pub documents: Vec<Document>,
    pub total: i64,
}

/// Metadata fields of an update request. `folder_id` distinguishes "leave
/// unchanged" (None) from "move to root" (Some(None)).
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub project: Option<String>,
    pub visibility: Option<Visibility>,
    pub folder_id: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub actor_type: Option<ActorType>,
    pub action: Option<String>,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone)]
pub struct AuditPage {
    pub entries: Vec<AuditLogEntry>,
    pub total: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TaxonomyCount {
    pub value: String,
    pub count: i64,
}

/// Store defines the database interface. Every read-modify-write cycle is a
/// single method so concurrent mutations cannot interleave.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn list_users(&self) -> Result<Vec<User>>;
    fn update_user(&self, user: &User) -> Result<()>;
    fn delete_user(&self, id: &str) -> Result<bool>;
    fn count_admins(&self) -> Result<i64>;

    // Session operations
    fn create_session(&self, session: &Session) -> Result<()>;
    fn get_session_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>>;
    fn delete_session(&self, id: &str) -> Result<bool>;

    // Document operations
    fn create_document(&self, doc: &Document, content: &str, change_note: Option<&str>)
    -> Result<DocumentVersion>;
    fn get_document(&self, id: &str) -> Result<Option<Document>>;
    fn get_current_content(&self, id: &str) -> Result<Option<String>>;
    fn list_documents(&self, filter: &DocumentFilter) -> Result<DocumentPage>;
    fn update_document(&self, id: &str, patch: &DocumentPatch) -> Result<Document>;
    fn soft_delete_document(&self, id: &str) -> Result<()>;
    fn search_candidates(&self, query: &str) -> Result<Vec<(Document, String)>>;
    fn list_categories(&self) -> Result<Vec<TaxonomyCount>>;
    fn list_tags(&self) -> Result<Vec<TaxonomyCount>>;

    // Version ledger operations
    fn append_version(
        &self,
        document_id: &str,
        content: &str,
        change_note: Option<&str>,
        created_by: &str,
    ) -> Result<DocumentVersion>;
    fn list_versions(&self, document_id: &str) -> Result<Vec<DocumentVersion>>;
    fn get_version(&self, document_id: &str, version_number: i64)
    -> Result<Option<DocumentVersion>>;

    // Folder operations
    fn create_folder(&self, name: &str, parent_id: Option<&str>, created_by: &str)
    -> Result<Folder>;
    fn get_folder(&self, id: &str) -> Result<Option<Folder>>;
    fn list_folders(&self) -> Result<Vec<Folder>>;
    fn move_folder(
        &self,
        id: &str,
        new_name: Option<&str>,
        new_parent: Option<Option<&str>>,
    ) -> Result<Folder>;
    fn delete_folder(&self, id: &str) -> Result<i64>;
    fn folder_dir_chain(&self, id: &str) -> Result<Vec<String>>;

    // Agent token operations
    fn create_agent_token(&self, token: &AgentToken) -> Result<()>;
    fn get_agent_token_by_prefix(&self, prefix: &str) -> Result<Option<AgentToken>>;
    fn list_agent_tokens(&self) -> Result<Vec<AgentToken>>;
    fn delete_agent_token(&self, id: &str) -> Result<bool>;
    fn update_agent_token_last_used(&self, id: &str) -> Result<()>;

    // Audit log operations
    fn append_audit_entry(&self, entry: &AuditLogEntry) -> Result<()>;
    fn list_audit_entries(&self, filter: &AuditFilter) -> Result<AuditPage>;

    // Idempotency operations
    fn get_idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>>;
    fn put_idempotency_record(&self, record: &IdempotencyRecord) -> Result<IdempotencyRecord>;

    // Share operations
    fn create_share(&self, share: &Share) -> Result<()>;
    fn get_share_by_token(&self, token: &str) -> Result<Option<Share>>;

    // Settings operations
    fn get_settings(&self) -> Result<serde_json::Map<String, serde_json::Value>>;
    fn update_settings(&self, values: &serde_json::Map<String, serde_json::Value>) -> Result<()>;

    fn close(&self) -> Result<()>;
}
