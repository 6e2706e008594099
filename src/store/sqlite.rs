use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use super::schema::SCHEMA;
use super::{
    AuditFilter, AuditPage, DocumentFilter, DocumentPage, DocumentPatch, SortBy, SortOrder, Store,
    TaxonomyCount,
};
use crate::content::{build_file_path, checksum_hex, estimate_tokens, slugify};
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_tags(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn encode_tags(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

const DOC_COLS: &str = "id, title, slug, description, category, tags, project, visibility, \
     folder_id, file_path, latest_version, checksum, token_count, created_by, created_at, \
     updated_at, deleted_at";

fn map_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        tags: parse_tags(&row.get::<_, String>(5)?),
        project: row.get(6)?,
        visibility: Visibility::parse(&row.get::<_, String>(7)?).unwrap_or(Visibility::Team),
        folder_id: row.get(8)?,
        file_path: row.get(9)?,
        latest_version: row.get(10)?,
        checksum: row.get(11)?,
        token_count: row.get(12)?,
        created_by: row.get(13)?,
        created_at: parse_datetime(&row.get::<_, String>(14)?),
        updated_at: parse_datetime(&row.get::<_, String>(15)?),
        deleted_at: row.get::<_, Option<String>>(16)?.map(|s| parse_datetime(&s)),
    })
}

fn map_folder(row: &Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: row.get(0)?,
        name: row.get(1)?,
        directory_name: row.get(2)?,
        parent_id: row.get(3)?,
        created_by: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        role: Role::parse(&row.get::<_, String>(3)?).unwrap_or(Role::Viewer),
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn map_agent_token(row: &Row<'_>) -> rusqlite::Result<AgentToken> {
    Ok(AgentToken {
        id: row.get(0)?,
        name: row.get(1)?,
        role: row.get(2)?,
        scopes: Scope::from(row.get::<_, i64>(3)?),
        token_prefix: row.get(4)?,
        token_hash: row.get(5)?,
        expires_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        last_used_at: row.get::<_, Option<String>>(8)?.map(|s| parse_datetime(&s)),
    })
}

/// Walks the parent chain of `folder_id` and returns directory names,
/// root first. Errors on a broken chain rather than looping forever.
fn dir_chain(conn: &Connection, folder_id: &str) -> Result<Vec<String>> {
    let mut chain = Vec::new();
    let mut current = Some(folder_id.to_string());
    let mut hops = 0;

    while let Some(id) = current {
        hops += 1;
        if hops > 256 {
            return Err(Error::Config(format!(
                "folder parent chain too deep or cyclic at {id}"
            )));
        }

        let row: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT directory_name, parent_id FROM folders WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((dir, parent)) => {
                chain.push(dir);
                current = parent;
            }
            None => return Err(Error::NotFound),
        }
    }

    chain.reverse();
    Ok(chain)
}

/// Picks a directory name unique among the siblings of `parent_id`,
/// resolving collisions with a numeric suffix. `exclude_id` skips the
/// folder itself when renaming in place.
fn unique_directory_name(
    conn: &Connection,
    parent_id: Option<&str>,
    base: &str,
    exclude_id: Option<&str>,
) -> Result<String> {
    let mut candidate = base.to_string();
    let mut n = 1;

    loop {
        let taken: Option<String> = conn
            .query_row(
                "SELECT id FROM folders WHERE parent_id IS ?1 AND directory_name = ?2",
                params![parent_id, candidate],
                |row| row.get(0),
            )
            .optional()?;

        match taken {
            Some(id) if Some(id.as_str()) != exclude_id => {
                n += 1;
                candidate = format!("{base}-{n}");
            }
            _ => return Ok(candidate),
        }
    }
}

/// Collects `root` and every descendant folder id from the full folder set.
fn subtree_ids(all: &[(String, Option<String>)], root: &str) -> Vec<String> {
    let mut ids = vec![root.to_string()];
    let mut i = 0;
    while i < ids.len() {
        for (id, parent) in all {
            if parent.as_deref() == Some(ids[i].as_str()) && !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        i += 1;
    }
    ids
}

/// Rewrites file_path for every document directly inside any of the given
/// folders, using each folder's current directory chain.
fn rewrite_document_paths(conn: &Connection, folder_ids: &[String]) -> Result<()> {
    for folder_id in folder_ids {
        let chain = dir_chain(conn, folder_id)?;

        let docs: Vec<(String, String)> = {
            let mut stmt =
                conn.prepare("SELECT id, slug FROM documents WHERE folder_id = ?1")?;
            let rows = stmt.query_map(params![folder_id], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        for (doc_id, slug) in docs {
            conn.execute(
                "UPDATE documents SET file_path = ?1, updated_at = ?2 WHERE id = ?3",
                params![
                    build_file_path(&chain, &slug),
                    format_datetime(&Utc::now()),
                    doc_id
                ],
            )?;
        }
    }
    Ok(())
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO users (id, username, password_hash, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id,
                user.username,
                user.password_hash,
                user.role.as_str(),
                format_datetime(&user.created_at),
                format_datetime(&user.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::Conflict(format!(
                    "username '{}' already exists",
                    user.username
                )))
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, username, password_hash, role, created_at, updated_at
             FROM users WHERE id = ?1",
            params![id],
            map_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, username, password_hash, role, created_at, updated_at
             FROM users WHERE username = ?1",
            params![username],
            map_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, role, created_at, updated_at
             FROM users ORDER BY username",
        )?;

        let rows = stmt.query_map([], map_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE users SET password_hash = ?1, role = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                user.password_hash,
                user.role.as_str(),
                format_datetime(&Utc::now()),
                user.id
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn count_admins(&self) -> Result<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE role = 'admin'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // Session operations

    fn create_session(&self, session: &Session) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sessions (id, user_id, token_hash, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id,
                session.user_id,
                session.token_hash,
                format_datetime(&session.created_at),
                format_datetime(&session.expires_at),
            ],
        )?;
        Ok(())
    }

    fn get_session_by_token_hash(&self, token_hash: &str) -> Result<Option<Session>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, user_id, token_hash, created_at, expires_at
             FROM sessions WHERE token_hash = ?1",
            params![token_hash],
            |row| {
                Ok(Session {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    token_hash: row.get(2)?,
                    created_at: parse_datetime(&row.get::<_, String>(3)?),
                    expires_at: parse_datetime(&row.get::<_, String>(4)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_session(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Document operations

    fn create_document(
        &self,
        doc: &Document,
        content: &str,
        change_note: Option<&str>,
    ) -> Result<DocumentVersion> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            &format!("INSERT INTO documents ({DOC_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"),
            params![
                doc.id,
                doc.title,
                doc.slug,
                doc.description,
                doc.category,
                encode_tags(&doc.tags),
                doc.project,
                doc.visibility.as_str(),
                doc.folder_id,
                doc.file_path,
                doc.latest_version,
                doc.checksum,
                doc.token_count,
                doc.created_by,
                format_datetime(&doc.created_at),
                format_datetime(&doc.updated_at),
                doc.deleted_at.as_ref().map(format_datetime),
            ],
        )?;

        let version = DocumentVersion {
            id: Uuid::new_v4().to_string(),
            document_id: doc.id.clone(),
            version_number: 1,
            content: Some(content.to_string()),
            change_note: change_note.map(str::to_string),
            created_by: doc.created_by.clone(),
            created_at: doc.created_at,
            checksum: doc.checksum.clone(),
        };

        tx.execute(
            "INSERT INTO document_versions (id, document_id, version_number, content, change_note, created_by, created_at, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                version.id,
                version.document_id,
                version.version_number,
                content,
                version.change_note,
                version.created_by,
                format_datetime(&version.created_at),
                version.checksum,
            ],
        )?;

        tx.commit()?;
        Ok(version)
    }

    fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {DOC_COLS} FROM documents WHERE id = ?1"),
            params![id],
            map_document,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_current_content(&self, id: &str) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT v.content FROM document_versions v
             JOIN documents d ON d.id = v.document_id AND d.latest_version = v.version_number
             WHERE d.id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_documents(&self, filter: &DocumentFilter) -> Result<DocumentPage> {
        let mut clauses = vec!["deleted_at IS NULL".to_string()];
        let mut args: Vec<String> = Vec::new();

        if let Some(tag) = &filter.tag {
            args.push(format!("%\"{tag}\"%"));
            clauses.push(format!("tags LIKE ?{}", args.len()));
        }
        if let Some(project) = &filter.project {
            args.push(project.clone());
            clauses.push(format!("project = ?{}", args.len()));
        }
        if let Some(folder_id) = &filter.folder_id {
            args.push(folder_id.clone());
            clauses.push(format!("folder_id = ?{}", args.len()));
        }
        if let Some(query) = &filter.query {
            args.push(format!("%{query}%"));
            let n = args.len();
            clauses.push(format!(
                "(title LIKE ?{n} OR COALESCE(description, '') LIKE ?{n} OR slug LIKE ?{n})"
            ));
        }

        let where_sql = clauses.join(" AND ");
        let conn = self.conn();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM documents WHERE {where_sql}"),
            rusqlite::params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let sort_col = match filter.sort_by {
            SortBy::Title => "title",
            SortBy::CreatedAt => "created_at",
            SortBy::UpdatedAt => "updated_at",
        };
        let sort_dir = match filter.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let offset = (filter.page - 1).max(0) * filter.page_size;

        let mut stmt = conn.prepare(&format!(
            "SELECT {DOC_COLS} FROM documents WHERE {where_sql}
             ORDER BY {sort_col} {sort_dir}, id ASC LIMIT {} OFFSET {}",
            filter.page_size, offset
        ))?;

        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), map_document)?;
        let documents = rows.collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(DocumentPage { documents, total })
    }

    fn update_document(&self, id: &str, patch: &DocumentPatch) -> Result<Document> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut doc = tx
            .query_row(
                &format!("SELECT {DOC_COLS} FROM documents WHERE id = ?1"),
                params![id],
                map_document,
            )
            .optional()?
            .ok_or(Error::NotFound)?;

        if doc.deleted_at.is_some() {
            return Err(Error::NotFound);
        }

        if let Some(title) = &patch.title {
            doc.title = title.clone();
        }
        if let Some(description) = &patch.description {
            doc.description = Some(description.clone());
        }
        if let Some(category) = &patch.category {
            doc.category = Some(category.clone());
        }
        if let Some(tags) = &patch.tags {
            doc.tags = tags.clone();
        }
        if let Some(project) = &patch.project {
            doc.project = Some(project.clone());
        }
        if let Some(visibility) = patch.visibility {
            doc.visibility = visibility;
        }
        if let Some(folder_id) = &patch.folder_id {
            if let Some(target) = folder_id {
                let exists: Option<String> = tx
                    .query_row(
                        "SELECT id FROM folders WHERE id = ?1",
                        params![target],
                        |row| row.get(0),
                    )
                    .optional()?;
                if exists.is_none() {
                    return Err(Error::Validation(format!("unknown folder_id '{target}'")));
                }
            }
            doc.folder_id = folder_id.clone();
            let chain = match &doc.folder_id {
                Some(fid) => dir_chain(&tx, fid)?,
                None => Vec::new(),
            };
            doc.file_path = build_file_path(&chain, &doc.slug);
        }

        doc.updated_at = Utc::now();

        tx.execute(
            "UPDATE documents SET title = ?1, description = ?2, category = ?3, tags = ?4,
                 project = ?5, visibility = ?6, folder_id = ?7, file_path = ?8, updated_at = ?9
             WHERE id = ?10",
            params![
                doc.title,
                doc.description,
                doc.category,
                encode_tags(&doc.tags),
                doc.project,
                doc.visibility.as_str(),
                doc.folder_id,
                doc.file_path,
                format_datetime(&doc.updated_at),
                doc.id,
            ],
        )?;

        tx.commit()?;
        Ok(doc)
    }

    fn soft_delete_document(&self, id: &str) -> Result<()> {
        let now = format_datetime(&Utc::now());
        let rows = self.conn().execute(
            "UPDATE documents SET deleted_at = ?1, updated_at = ?1
             WHERE id = ?2 AND deleted_at IS NULL",
            params![now, id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn search_candidates(&self, query: &str) -> Result<Vec<(Document, String)>> {
        let pattern = format!("%{query}%");
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, v.content FROM documents d
             JOIN document_versions v
               ON v.document_id = d.id AND v.version_number = d.latest_version
             WHERE d.deleted_at IS NULL
               AND (d.title LIKE ?1 OR COALESCE(d.description, '') LIKE ?1 OR v.content LIKE ?1)
             ORDER BY d.id",
            DOC_COLS
                .split(", ")
                .map(|c| format!("d.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        ))?;

        let rows = stmt.query_map(params![pattern], |row| {
            Ok((map_document(row)?, row.get::<_, String>(17)?))
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_categories(&self) -> Result<Vec<TaxonomyCount>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*) FROM documents
             WHERE deleted_at IS NULL AND category IS NOT NULL AND category != ''
             GROUP BY category ORDER BY category",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(TaxonomyCount {
                value: row.get(0)?,
                count: row.get(1)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_tags(&self) -> Result<Vec<TaxonomyCount>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT tags FROM documents WHERE deleted_at IS NULL")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for raw in rows {
            for tag in parse_tags(&raw?) {
                *counts.entry(tag).or_insert(0) += 1;
            }
        }

        Ok(counts
            .into_iter()
            .map(|(value, count)| TaxonomyCount { value, count })
            .collect())
    }

    // Version ledger operations

    fn append_version(
        &self,
        document_id: &str,
        content: &str,
        change_note: Option<&str>,
        created_by: &str,
    ) -> Result<DocumentVersion> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let exists: Option<String> = tx
            .query_row(
                "SELECT id FROM documents WHERE id = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(Error::NotFound);
        }

        // Next number comes from the chain itself, not the cached
        // latest_version, so the invariant holds even if they ever diverge.
        let max_version: i64 = tx.query_row(
            "SELECT COALESCE(MAX(version_number), 0) FROM document_versions WHERE document_id = ?1",
            params![document_id],
            |row| row.get(0),
        )?;

        let version = DocumentVersion {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            version_number: max_version + 1,
            content: Some(content.to_string()),
            change_note: change_note.map(str::to_string),
            created_by: created_by.to_string(),
            created_at: Utc::now(),
            checksum: checksum_hex(content),
        };

        tx.execute(
            "INSERT INTO document_versions (id, document_id, version_number, content, change_note, created_by, created_at, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                version.id,
                version.document_id,
                version.version_number,
                content,
                version.change_note,
                version.created_by,
                format_datetime(&version.created_at),
                version.checksum,
            ],
        )?;

        tx.execute(
            "UPDATE documents SET latest_version = ?1, checksum = ?2, token_count = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                version.version_number,
                version.checksum,
                estimate_tokens(content),
                format_datetime(&version.created_at),
                document_id,
            ],
        )?;

        tx.commit()?;
        Ok(version)
    }

    fn list_versions(&self, document_id: &str) -> Result<Vec<DocumentVersion>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, document_id, version_number, change_note, created_by, created_at, checksum
             FROM document_versions WHERE document_id = ?1 ORDER BY version_number",
        )?;

        let rows = stmt.query_map(params![document_id], |row| {
            Ok(DocumentVersion {
                id: row.get(0)?,
                document_id: row.get(1)?,
                version_number: row.get(2)?,
                content: None,
                change_note: row.get(3)?,
                created_by: row.get(4)?,
                created_at: parse_datetime(&row.get::<_, String>(5)?),
                checksum: row.get(6)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn get_version(
        &self,
        document_id: &str,
        version_number: i64,
    ) -> Result<Option<DocumentVersion>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, document_id, version_number, content, change_note, created_by, created_at, checksum
             FROM document_versions WHERE document_id = ?1 AND version_number = ?2",
            params![document_id, version_number],
            |row| {
                Ok(DocumentVersion {
                    id: row.get(0)?,
                    document_id: row.get(1)?,
                    version_number: row.get(2)?,
                    content: Some(row.get(3)?),
                    change_note: row.get(4)?,
                    created_by: row.get(5)?,
                    created_at: parse_datetime(&row.get::<_, String>(6)?),
                    checksum: row.get(7)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    // Folder operations

    fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
        created_by: &str,
    ) -> Result<Folder> {
        let conn = self.conn();

        if let Some(parent) = parent_id {
            let exists: Option<String> = conn
                .query_row(
                    "SELECT id FROM folders WHERE id = ?1",
                    params![parent],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(Error::Validation(format!(
                    "unknown parent folder '{parent}'"
                )));
            }
        }

        let directory_name = unique_directory_name(&conn, parent_id, &slugify(name), None)?;
        let now = Utc::now();
        let folder = Folder {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            directory_name,
            parent_id: parent_id.map(str::to_string),
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            "INSERT INTO folders (id, name, directory_name, parent_id, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                folder.id,
                folder.name,
                folder.directory_name,
                folder.parent_id,
                folder.created_by,
                format_datetime(&folder.created_at),
                format_datetime(&folder.updated_at),
            ],
        )?;

        Ok(folder)
    }

    fn get_folder(&self, id: &str) -> Result<Option<Folder>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, directory_name, parent_id, created_by, created_at, updated_at
             FROM folders WHERE id = ?1",
            params![id],
            map_folder,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_folders(&self) -> Result<Vec<Folder>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, directory_name, parent_id, created_by, created_at, updated_at
             FROM folders ORDER BY name",
        )?;

        let rows = stmt.query_map([], map_folder)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn move_folder(
        &self,
        id: &str,
        new_name: Option<&str>,
        new_parent: Option<Option<&str>>,
    ) -> Result<Folder> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut folder = tx
            .query_row(
                "SELECT id, name, directory_name, parent_id, created_by, created_at, updated_at
                 FROM folders WHERE id = ?1",
                params![id],
                map_folder,
            )
            .optional()?
            .ok_or(Error::NotFound)?;

        if let Some(parent_opt) = new_parent {
            if let Some(parent) = parent_opt {
                if parent == id {
                    return Err(Error::Validation(
                        "folder cannot be its own parent".to_string(),
                    ));
                }

                // Walk up from the target; hitting `id` means a cycle.
                let mut current = Some(parent.to_string());
                while let Some(ancestor) = current {
                    if ancestor == id {
                        return Err(Error::Validation(
                            "cannot move a folder under its own descendant".to_string(),
                        ));
                    }
                    current = tx
                        .query_row(
                            "SELECT parent_id FROM folders WHERE id = ?1",
                            params![ancestor],
                            |row| row.get::<_, Option<String>>(0),
                        )
                        .optional()?
                        .flatten();
                }

                let exists: Option<String> = tx
                    .query_row(
                        "SELECT id FROM folders WHERE id = ?1",
                        params![parent],
                        |row| row.get(0),
                    )
                    .optional()?;
                if exists.is_none() {
                    return Err(Error::Validation(format!(
                        "unknown parent folder '{parent}'"
                    )));
                }
            }
            folder.parent_id = parent_opt.map(str::to_string);
        }

        if let Some(name) = new_name {
            folder.name = name.to_string();
        }

        folder.directory_name = unique_directory_name(
            &tx,
            folder.parent_id.as_deref(),
            &slugify(&folder.name),
            Some(id),
        )?;
        folder.updated_at = Utc::now();

        tx.execute(
            "UPDATE folders SET name = ?1, directory_name = ?2, parent_id = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                folder.name,
                folder.directory_name,
                folder.parent_id,
                format_datetime(&folder.updated_at),
                folder.id,
            ],
        )?;

        // Cascade: every document under the subtree gets its location
        // reference rewritten against the new directory chain.
        let all: Vec<(String, Option<String>)> = {
            let mut stmt = tx.prepare("SELECT id, parent_id FROM folders")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        rewrite_document_paths(&tx, &subtree_ids(&all, id))?;

        tx.commit()?;
        Ok(folder)
    }

    fn delete_folder(&self, id: &str) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let folder = tx
            .query_row(
                "SELECT id, name, directory_name, parent_id, created_by, created_at, updated_at
                 FROM folders WHERE id = ?1",
                params![id],
                map_folder,
            )
            .optional()?
            .ok_or(Error::NotFound)?;

        let all: Vec<(String, Option<String>)> = {
            let mut stmt = tx.prepare("SELECT id, parent_id FROM folders")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        let removed = subtree_ids(&all, id);

        // Relocate every document in the subtree to the deleted folder's
        // former parent before the folder rows go away.
        let placeholders = removed
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let mut args: Vec<Option<String>> = vec![folder.parent_id.clone()];
        args.extend(removed.iter().cloned().map(Some));

        tx.execute(
            &format!("UPDATE documents SET folder_id = ?1 WHERE folder_id IN ({placeholders})"),
            rusqlite::params_from_iter(args.iter()),
        )?;

        match &folder.parent_id {
            Some(parent) => rewrite_document_paths(&tx, std::slice::from_ref(parent))?,
            None => {
                // Relocated to root: rebuild paths from each document's slug.
                let docs: Vec<(String, String)> = {
                    let mut stmt =
                        tx.prepare("SELECT id, slug FROM documents WHERE folder_id IS NULL")?;
                    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                    rows.collect::<std::result::Result<Vec<_>, _>>()?
                };
                for (doc_id, slug) in docs {
                    tx.execute(
                        "UPDATE documents SET file_path = ?1 WHERE id = ?2",
                        params![build_file_path(&[], &slug), doc_id],
                    )?;
                }
            }
        }

        // Deleting the root row cascades to descendants via parent_id.
        tx.execute("DELETE FROM folders WHERE id = ?1", params![id])?;

        tx.commit()?;
        Ok(removed.len() as i64)
    }

    fn folder_dir_chain(&self, id: &str) -> Result<Vec<String>> {
        dir_chain(&self.conn(), id)
    }

    // Agent token operations

    fn create_agent_token(&self, token: &AgentToken) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO agent_tokens (id, name, role, scopes, token_prefix, token_hash, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                token.id,
                token.name,
                token.role,
                i64::from(token.scopes),
                token.token_prefix,
                token.token_hash,
                token.expires_at.as_ref().map(format_datetime),
                format_datetime(&token.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::TokenPrefixCollision)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_agent_token_by_prefix(&self, prefix: &str) -> Result<Option<AgentToken>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, role, scopes, token_prefix, token_hash, expires_at, created_at, last_used_at
             FROM agent_tokens WHERE token_prefix = ?1",
            params![prefix],
            map_agent_token,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_agent_tokens(&self) -> Result<Vec<AgentToken>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, role, scopes, token_prefix, token_hash, expires_at, created_at, last_used_at
             FROM agent_tokens ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map([], map_agent_token)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_agent_token(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM agent_tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn update_agent_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE agent_tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    // Audit log operations

    fn append_audit_entry(&self, entry: &AuditLogEntry) -> Result<()> {
        self.conn().execute(
            "INSERT INTO audit_log (id, actor_type, actor_id, action, resource_type, resource_id, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.actor_type.as_str(),
                entry.actor_id,
                entry.action,
                entry.resource_type,
                entry.resource_id,
                entry.metadata.to_string(),
                format_datetime(&entry.created_at),
            ],
        )?;
        Ok(())
    }

    fn list_audit_entries(&self, filter: &AuditFilter) -> Result<AuditPage> {
        let mut clauses = vec!["1=1".to_string()];
        let mut args: Vec<String> = Vec::new();

        if let Some(actor_type) = filter.actor_type {
            args.push(actor_type.as_str().to_string());
            clauses.push(format!("actor_type = ?{}", args.len()));
        }
        if let Some(action) = &filter.action {
            args.push(action.clone());
            clauses.push(format!("action = ?{}", args.len()));
        }

        let where_sql = clauses.join(" AND ");
        let conn = self.conn();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM audit_log WHERE {where_sql}"),
            rusqlite::params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        let offset = (filter.page - 1).max(0) * filter.page_size;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, actor_type, actor_id, action, resource_type, resource_id, metadata, created_at
             FROM audit_log WHERE {where_sql}
             ORDER BY created_at DESC, id DESC LIMIT {} OFFSET {}",
            filter.page_size, offset
        ))?;

        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
            Ok(AuditLogEntry {
                id: row.get(0)?,
                actor_type: ActorType::parse(&row.get::<_, String>(1)?)
                    .unwrap_or(ActorType::System),
                actor_id: row.get(2)?,
                action: row.get(3)?,
                resource_type: row.get(4)?,
                resource_id: row.get(5)?,
                metadata: serde_json::from_str(&row.get::<_, String>(6)?)
                    .unwrap_or(serde_json::Value::Null),
                created_at: parse_datetime(&row.get::<_, String>(7)?),
            })
        })?;
        let entries = rows.collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(AuditPage { entries, total })
    }

    // Idempotency operations

    fn get_idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT key, response_status, response_body, created_at
             FROM idempotency_keys WHERE key = ?1",
            params![key],
            |row| {
                Ok(IdempotencyRecord {
                    key: row.get(0)?,
                    response_status: row.get::<_, i64>(1)? as u16,
                    response_body: row.get(2)?,
                    created_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn put_idempotency_record(&self, record: &IdempotencyRecord) -> Result<IdempotencyRecord> {
        let conn = self.conn();

        // First writer wins; a concurrent duplicate gets the stored response.
        conn.execute(
            "INSERT INTO idempotency_keys (key, response_status, response_body, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (key) DO NOTHING",
            params![
                record.key,
                record.response_status as i64,
                record.response_body,
                format_datetime(&record.created_at),
            ],
        )?;

        conn.query_row(
            "SELECT key, response_status, response_body, created_at
             FROM idempotency_keys WHERE key = ?1",
            params![record.key],
            |row| {
                Ok(IdempotencyRecord {
                    key: row.get(0)?,
                    response_status: row.get::<_, i64>(1)? as u16,
                    response_body: row.get(2)?,
                    created_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            },
        )
        .map_err(Error::from)
    }

    // Share operations

    fn create_share(&self, share: &Share) -> Result<()> {
        self.conn().execute(
            "INSERT INTO shares (id, document_id, token, access_code, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                share.id,
                share.document_id,
                share.token,
                share.access_code,
                share.created_by,
                format_datetime(&share.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_share_by_token(&self, token: &str) -> Result<Option<Share>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, document_id, token, access_code, created_by, created_at
             FROM shares WHERE token = ?1",
            params![token],
            |row| {
                Ok(Share {
                    id: row.get(0)?,
                    document_id: row.get(1)?,
                    token: row.get(2)?,
                    access_code: row.get(3)?,
                    created_by: row.get(4)?,
                    created_at: parse_datetime(&row.get::<_, String>(5)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    // Settings operations

    fn get_settings(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut map = serde_json::Map::new();
        for row in rows {
            let (key, raw) = row?;
            let value = serde_json::from_str(&raw)
                .unwrap_or(serde_json::Value::String(raw));
            map.insert(key, value);
        }
        Ok(map)
    }

    fn update_settings(&self, values: &serde_json::Map<String, serde_json::Value>) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        for (key, value) in values {
            tx.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value",
                params![key, value.to_string()],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
