pub const SCHEMA: &str = r#"
-- Human accounts
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,      -- argon2id hash with embedded salt
    role TEXT NOT NULL DEFAULT 'viewer',
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Login sessions; the bearer secret is stored only as a sha256 digest
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    token_hash TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT NOT NULL
);

-- Folders organize documents (hierarchical)
CREATE TABLE IF NOT EXISTS folders (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    directory_name TEXT NOT NULL,     -- filesystem-safe, unique among siblings
    parent_id TEXT REFERENCES folders(id) ON DELETE CASCADE,
    created_by TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(parent_id, directory_name)
);

-- Document metadata; current content lives in the newest version row
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    slug TEXT NOT NULL,
    description TEXT,
    category TEXT,
    tags TEXT NOT NULL DEFAULT '[]',  -- JSON array of strings
    project TEXT,
    visibility TEXT NOT NULL DEFAULT 'team',
    folder_id TEXT REFERENCES folders(id) ON DELETE SET NULL,
    file_path TEXT NOT NULL,          -- logical location, rewritten by folder cascades
    latest_version INTEGER NOT NULL DEFAULT 1,
    checksum TEXT NOT NULL,
    token_count INTEGER NOT NULL DEFAULT 0,
    created_by TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),
    deleted_at TEXT                   -- soft delete marker
);

-- Immutable version chain; rows are never updated or deleted
CREATE TABLE IF NOT EXISTS document_versions (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    version_number INTEGER NOT NULL,
    content TEXT NOT NULL,
    change_note TEXT,
    created_by TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    checksum TEXT NOT NULL,

    UNIQUE(document_id, version_number)
);

-- Machine credentials with explicit capability scopes
CREATE TABLE IF NOT EXISTS agent_tokens (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'agent',
    scopes INTEGER NOT NULL DEFAULT 0,
    token_prefix TEXT NOT NULL,       -- public lookup key
    token_hash TEXT NOT NULL,         -- argon2id hash of the full secret
    expires_at TEXT,                  -- NULL = never
    created_at TEXT DEFAULT (datetime('now')),
    last_used_at TEXT
);

-- Append-only audit trail
CREATE TABLE IF NOT EXISTS audit_log (
    id TEXT PRIMARY KEY,
    actor_type TEXT NOT NULL,
    actor_id TEXT NOT NULL,
    action TEXT NOT NULL,             -- dotted verb.noun, e.g. document.update
    resource_type TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT DEFAULT (datetime('now'))
);

-- Stored responses for idempotent writes
CREATE TABLE IF NOT EXISTS idempotency_keys (
    key TEXT PRIMARY KEY,
    response_status INTEGER NOT NULL,
    response_body TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Unauthenticated share links
CREATE TABLE IF NOT EXISTS shares (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    token TEXT NOT NULL UNIQUE,
    access_code TEXT,
    created_by TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

-- Site-wide key/value settings
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Create indexes
CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_token_hash ON sessions(token_hash);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id);
CREATE INDEX IF NOT EXISTS idx_documents_folder ON documents(folder_id);
CREATE INDEX IF NOT EXISTS idx_documents_deleted ON documents(deleted_at);
CREATE INDEX IF NOT EXISTS idx_versions_document ON document_versions(document_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_agent_tokens_prefix ON agent_tokens(token_prefix);
CREATE INDEX IF NOT EXISTS idx_audit_log_created ON audit_log(created_at);
CREATE INDEX IF NOT EXISTS idx_shares_document ON shares(document_id);
"#;
