use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use thiserror::Error;

use crate::db::{PassRecord, PassStatus};
use crate::model::ContentId;

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Error type for document database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// A stored or supplied document body is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },

    /// A partial update targeted a document that does not exist.
    #[error("Document {id} not found in collection '{collection}'")]
    DocumentNotFound { collection: String, id: ContentId },

    /// Field names are used inside a JSON path and must be plain identifiers.
    #[error("Invalid field name '{0}'")]
    InvalidFieldName(String),
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// Keyed document collections.
///
/// `upsert` replaces a whole document; `partial_update` replaces one top-level
/// field and leaves every other field as it was.
pub trait DocumentStore {
    fn exists(&self, collection: &str, id: &ContentId) -> DbResult<bool>;

    fn get(&self, collection: &str, id: &ContentId) -> DbResult<Option<Value>>;

    /// Insert or fully replace the document `(collection, id)`.
    fn upsert(&self, collection: &str, doc_type: &str, id: &ContentId, body: &Value)
        -> DbResult<()>;

    /// Set a single top-level field on an existing document.
    fn partial_update(
        &self,
        collection: &str,
        id: &ContentId,
        field: &str,
        value: &Value,
    ) -> DbResult<()>;
}

/// A document as listed from a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: ContentId,
    pub doc_type: String,
    pub body: Value,
    pub updated_at: String,
}

/// SQLite-backed document database.
///
/// This is a thin wrapper around `rusqlite::Connection` that is responsible for:
/// - Opening/creating the DB file.
/// - Applying schema migrations.
/// - Providing small, testable helpers for querying and updating documents.
#[derive(Debug)]
pub struct DocumentDb {
    conn: Connection,
}

impl DocumentDb {
    /// Open (or create) a document database at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Open a private in-memory database (used by tests and dry runs).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> DbResult<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// List all documents in a collection (ordered by id).
    pub fn list(&self, collection: &str) -> DbResult<Vec<StoredDocument>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, doc_type, body, updated_at
            FROM documents
            WHERE collection = ?1
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![collection], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, doc_type, body, updated_at) = row?;
            out.push(StoredDocument {
                id: parse_stored_id(&id)?,
                doc_type,
                body: serde_json::from_str(&body)?,
                updated_at,
            });
        }
        Ok(out)
    }

    /// Insert an analysis pass record and return its row id.
    pub fn insert_pass(&self, record: &PassRecord) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO analysis_passes (
                image, status, signatures, forest_present, entries_persisted, entries_failed,
                error, started_at, finished_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.image.as_str(),
                record.status.as_str(),
                record.signatures as i64,
                if record.forest_present { 1 } else { 0 },
                record.entries_persisted as i64,
                record.entries_failed as i64,
                record.error,
                record.started_at,
                record.finished_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// List analysis passes, optionally filtered by image id.
    pub fn list_passes(&self, image: Option<&ContentId>) -> DbResult<Vec<PassRecord>> {
        type RawPass = (String, String, i64, i64, i64, i64, Option<String>, String, String);

        fn map_pass(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPass> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
            ))
        }

        let mut stmt = if image.is_some() {
            self.conn.prepare(
                r#"
                SELECT image, status, signatures, forest_present, entries_persisted,
                       entries_failed, error, started_at, finished_at
                FROM analysis_passes
                WHERE image = ?1
                ORDER BY id
                "#,
            )?
        } else {
            self.conn.prepare(
                r#"
                SELECT image, status, signatures, forest_present, entries_persisted,
                       entries_failed, error, started_at, finished_at
                FROM analysis_passes
                ORDER BY id
                "#,
            )?
        };

        let rows = if let Some(id) = image {
            stmt.query_map(params![id.as_str()], map_pass)?
        } else {
            stmt.query_map([], map_pass)?
        };

        let mut out = Vec::new();
        for row in rows {
            let (image, status, signatures, forest, persisted, failed, error, started, finished) =
                row?;
            out.push(PassRecord {
                image: parse_stored_id(&image)?,
                status: status.parse::<PassStatus>().map_err(|_| {
                    DbError::Sql(rusqlite::Error::InvalidColumnType(
                        1,
                        "status".into(),
                        rusqlite::types::Type::Text,
                    ))
                })?,
                signatures: signatures as usize,
                forest_present: forest != 0,
                entries_persisted: persisted as usize,
                entries_failed: failed as usize,
                error,
                started_at: started,
                finished_at: finished,
            });
        }
        Ok(out)
    }
}

impl DocumentStore for DocumentDb {
    fn exists(&self, collection: &str, id: &ContentId) -> DbResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get(&self, collection: &str, id: &ContentId) -> DbResult<Option<Value>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn upsert(
        &self,
        collection: &str,
        doc_type: &str,
        id: &ContentId,
        body: &Value,
    ) -> DbResult<()> {
        let body = serde_json::to_string(body)?;
        self.conn.execute(
            r#"
            INSERT INTO documents (collection, id, doc_type, body, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(collection, id) DO UPDATE SET
                doc_type   = excluded.doc_type,
                body       = excluded.body,
                updated_at = excluded.updated_at
            "#,
            params![collection, id.as_str(), doc_type, body, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn partial_update(
        &self,
        collection: &str,
        id: &ContentId,
        field: &str,
        value: &Value,
    ) -> DbResult<()> {
        let path = json_field_path(field)?;
        let value = serde_json::to_string(value)?;
        let affected = self.conn.execute(
            r#"
            UPDATE documents
            SET body = json_set(body, ?1, json(?2)), updated_at = ?3
            WHERE collection = ?4 AND id = ?5
            "#,
            params![path, value, Utc::now().to_rfc3339(), collection, id.as_str()],
        )?;
        if affected == 0 {
            return Err(DbError::DocumentNotFound {
                collection: collection.to_string(),
                id: id.clone(),
            });
        }
        Ok(())
    }
}

/// JSON path for a top-level field, restricted to identifier characters.
fn json_field_path(field: &str) -> DbResult<String> {
    let valid = !field.is_empty()
        && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(DbError::InvalidFieldName(field.to_string()));
    }
    Ok(format!("$.\"{field}\""))
}

fn parse_stored_id(raw: &str) -> DbResult<ContentId> {
    raw.parse().map_err(|_| {
        let err = rusqlite::Error::InvalidColumnType(0, "id".into(), rusqlite::types::Type::Text);
        DbError::Sql(err)
    })
}

/// Apply schema migrations to bring the database to the latest version.
///
/// We use `PRAGMA user_version` as the schema version indicator.
///
/// Version map:
/// - 0: no schema
/// - 1: documents table
/// - 2: add analysis_passes table
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    // Reject DBs created with a newer schema than we support.
    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id         TEXT NOT NULL,
                doc_type   TEXT NOT NULL,
                body       TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY(collection, id)
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS analysis_passes (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                image             TEXT NOT NULL,
                status            TEXT NOT NULL,
                signatures        INTEGER NOT NULL DEFAULT 0,
                forest_present    INTEGER NOT NULL DEFAULT 0,
                entries_persisted INTEGER NOT NULL DEFAULT 0,
                entries_failed    INTEGER NOT NULL DEFAULT 0,
                error             TEXT,
                started_at        TEXT NOT NULL,
                finished_at       TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS analysis_passes_image ON analysis_passes(image);

            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
