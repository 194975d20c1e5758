use super::{Backend, DocumentRecord, DocumentRow, ReviewerJoin};
use crate::document::Reviewer;
use crate::error::{DocboardError, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const SELECT_DOCUMENTS: &str = "
    SELECT d.id, d.header, d.type, d.status, d.target, d.limit_value, r.id, r.name
    FROM documents d
    LEFT JOIN reviewers r ON r.id = d.reviewer_id";

const ORDER_NEWEST_FIRST: &str = "ORDER BY d.created_at DESC, d.rowid DESC";

/// Embedded relational backend holding the `documents` and `reviewers` tables.
///
/// Clones share one connection. Trait calls run on tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

/// A joined row before its labels are parsed
struct RawRow {
    id: String,
    header: String,
    doc_type: String,
    status: String,
    target: i64,
    limit_value: i64,
    reviewer_id: Option<String>,
    reviewer_name: Option<String>,
}

impl SqliteBackend {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        initialize_tables(&conn)?;
        Ok(SqliteBackend {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DocboardError::Other("SQLite connection lock poisoned".into()))
    }

    /// Run `f` against this backend on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&SqliteBackend) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| DocboardError::Other(format!("SQLite task failed: {e}")))?
    }

    // ── Reviewers ────────────────────────────────────────────────────

    /// Add a reviewer. Reviewers are read-only to the dashboard, so this is
    /// only used for provisioning.
    pub fn insert_reviewer(&self, name: &str) -> Result<Reviewer> {
        let reviewer = Reviewer {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
        };
        self.conn()?.execute(
            "INSERT INTO reviewers (id, name) VALUES (?1, ?2)",
            params![reviewer.id, reviewer.name],
        )?;
        Ok(reviewer)
    }

    /// Add every name that is not already present. Returns the full set.
    pub fn seed_reviewers(&self, names: &[&str]) -> Result<Vec<Reviewer>> {
        for name in names {
            let exists: Option<String> = self
                .conn()?
                .query_row(
                    "SELECT id FROM reviewers WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                self.insert_reviewer(name)?;
            }
        }
        self.reviewers_sync().map_err(DocboardError::into_query)
    }

    fn reviewers_sync(&self) -> Result<Vec<Reviewer>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name FROM reviewers ORDER BY name, id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Reviewer {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;

        let mut reviewers = Vec::new();
        for row in rows {
            reviewers.push(row?);
        }
        Ok(reviewers)
    }

    // ── Documents ────────────────────────────────────────────────────

    fn select_where(&self, clause: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<DocumentRow>> {
        let conn = self.conn()?;
        let sql = format!("{SELECT_DOCUMENTS} {clause} {ORDER_NEWEST_FIRST}");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(args, |row| {
            Ok(RawRow {
                id: row.get(0)?,
                header: row.get(1)?,
                doc_type: row.get(2)?,
                status: row.get(3)?,
                target: row.get(4)?,
                limit_value: row.get(5)?,
                reviewer_id: row.get(6)?,
                reviewer_name: row.get(7)?,
            })
        })?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?.into_row()?);
        }
        Ok(docs)
    }

    fn insert_sync(&self, record: &DocumentRecord) -> Result<Vec<DocumentRow>> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        self.conn()?.execute(
            "INSERT INTO documents
                (id, header, type, status, target, limit_value, reviewer_id, user_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                record.header,
                record.doc_type.label(),
                record.status.label(),
                record.target,
                record.limit_value,
                record.reviewer_id,
                record.user_id,
                created_at,
            ],
        )?;
        self.select_where("WHERE d.id = ?1", &[&id])
    }

    fn update_sync(&self, id: &str, record: &DocumentRecord) -> Result<Vec<DocumentRow>> {
        let changed = self.conn()?.execute(
            "UPDATE documents
             SET header = ?1, type = ?2, status = ?3, target = ?4, limit_value = ?5, reviewer_id = ?6
             WHERE id = ?7",
            params![
                record.header,
                record.doc_type.label(),
                record.status.label(),
                record.target,
                record.limit_value,
                record.reviewer_id,
                id,
            ],
        )?;
        if changed == 0 {
            return Ok(Vec::new());
        }
        self.select_where("WHERE d.id = ?1", &[&id])
    }

    fn delete_sync(&self, id: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(())
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn select_documents(&self) -> Result<Vec<DocumentRow>> {
        self.blocking(|db| db.select_where("", &[]))
            .await
            .map_err(backend_query_error)
    }

    async fn select_reviewers(&self) -> Result<Vec<Reviewer>> {
        self.blocking(|db| db.reviewers_sync())
            .await
            .map_err(backend_query_error)
    }

    async fn insert_document(&self, record: &DocumentRecord) -> Result<Vec<DocumentRow>> {
        let record = record.clone();
        self.blocking(move |db| db.insert_sync(&record))
            .await
            .map_err(backend_mutation_error)
    }

    async fn update_document(
        &self,
        id: &str,
        record: &DocumentRecord,
    ) -> Result<Vec<DocumentRow>> {
        let id = id.to_string();
        let record = record.clone();
        self.blocking(move |db| db.update_sync(&id, &record))
            .await
            .map_err(backend_mutation_error)
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.blocking(move |db| db.delete_sync(&id))
            .await
            .map_err(backend_mutation_error)
    }
}

impl RawRow {
    fn into_row(self) -> Result<DocumentRow> {
        let reviewer = match (self.reviewer_id, self.reviewer_name) {
            (Some(id), Some(name)) => ReviewerJoin::One(Reviewer { id, name }),
            _ => ReviewerJoin::Missing,
        };
        Ok(DocumentRow {
            id: self.id,
            header: self.header,
            doc_type: self.doc_type.parse()?,
            status: self.status.parse()?,
            target: self.target,
            limit_value: self.limit_value,
            reviewer,
        })
    }
}

/// Surface the SQLite message itself, without our own prefix.
fn backend_query_error(e: DocboardError) -> DocboardError {
    match e {
        DocboardError::Sqlite(inner) => DocboardError::Query(inner.to_string()),
        other => other.into_query(),
    }
}

fn backend_mutation_error(e: DocboardError) -> DocboardError {
    match e {
        DocboardError::Sqlite(inner) => DocboardError::Mutation(inner.to_string()),
        other => other.into_mutation(),
    }
}

fn initialize_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS reviewers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            header TEXT NOT NULL CHECK (length(header) >= 3),
            type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'Not Started',
            target INTEGER NOT NULL DEFAULT 0 CHECK (target >= 0),
            limit_value INTEGER NOT NULL DEFAULT 0 CHECK (limit_value >= 0),
            reviewer_id TEXT REFERENCES reviewers(id) ON DELETE SET NULL,
            user_id TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_documents_created_at ON documents(created_at);
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentStatus, DocumentType};
    use pretty_assertions::assert_eq;

    fn record(header: &str, reviewer_id: Option<&str>) -> DocumentRecord {
        DocumentRecord {
            header: header.to_string(),
            doc_type: DocumentType::Cover,
            status: DocumentStatus::InProcess,
            target: 10,
            limit_value: 20,
            reviewer_id: reviewer_id.map(str::to_string),
            user_id: Some("user-1".into()),
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_joins_reviewer() {
        let db = SqliteBackend::open_in_memory().unwrap();
        let ana = db.insert_reviewer("Ana").unwrap();

        let rows = db.insert_document(&record("Cover page", Some(&ana.id))).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].id.is_empty());
        assert_eq!(rows[0].reviewer, ReviewerJoin::One(ana));
        assert_eq!(rows[0].limit_value, 20);
    }

    #[tokio::test]
    async fn test_select_orders_newest_first() {
        let db = SqliteBackend::open_in_memory().unwrap();
        db.insert_document(&record("First", None)).await.unwrap();
        db.insert_document(&record("Second", None)).await.unwrap();
        db.insert_document(&record("Third", None)).await.unwrap();

        let headers: Vec<String> = db
            .select_documents()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.header)
            .collect();
        assert_eq!(headers, vec!["Third", "Second", "First"]);
    }

    #[tokio::test]
    async fn test_update_clears_reviewer() {
        let db = SqliteBackend::open_in_memory().unwrap();
        let ana = db.insert_reviewer("Ana").unwrap();
        let id = db
            .insert_document(&record("Plan", Some(&ana.id)))
            .await
            .unwrap()[0]
            .id
            .clone();

        let rows = db.update_document(&id, &record("Plan v2", None)).await.unwrap();
        assert_eq!(rows[0].header, "Plan v2");
        assert_eq!(rows[0].reviewer, ReviewerJoin::Missing);
    }

    #[tokio::test]
    async fn test_update_unknown_id_returns_nothing() {
        let db = SqliteBackend::open_in_memory().unwrap();
        let rows = db.update_document("missing", &record("Plan", None)).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_key_rejection_is_mutation_error() {
        let db = SqliteBackend::open_in_memory().unwrap();
        let err = db
            .insert_document(&record("Orphan", Some("no-such-reviewer")))
            .await
            .unwrap_err();
        match err {
            DocboardError::Mutation(msg) => assert!(msg.contains("FOREIGN KEY")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete() {
        let db = SqliteBackend::open_in_memory().unwrap();
        let id = db.insert_document(&record("Gone soon", None)).await.unwrap()[0]
            .id
            .clone();
        db.delete_document(&id).await.unwrap();
        assert!(db.select_documents().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_header_stored_as_entered() {
        let db = SqliteBackend::open_in_memory().unwrap();
        let rows = db.insert_document(&record("  Plan  ", None)).await.unwrap();
        assert_eq!(rows[0].header, "  Plan  ");

        let err = db.insert_document(&record("ab", None)).await.unwrap_err();
        assert!(matches!(err, DocboardError::Mutation(_)));
    }

    #[tokio::test]
    async fn test_busy_connection_does_not_stall_other_tasks() {
        let db = SqliteBackend::open_in_memory().unwrap();
        let held = db.conn().unwrap();

        let reader = {
            let db = db.clone();
            tokio::spawn(async move { db.select_documents().await })
        };
        let other = tokio::spawn(async { "done" });
        assert_eq!(other.await.unwrap(), "done");
        assert!(!reader.is_finished());

        drop(held);
        assert!(reader.await.unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_seed_reviewers_is_idempotent() {
        let db = SqliteBackend::open_in_memory().unwrap();
        db.seed_reviewers(&["Ana", "Ben"]).unwrap();
        let all = db.seed_reviewers(&["Ben", "Cy"]).unwrap();
        let names: Vec<&str> = all.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Ben", "Cy"]);
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("docboard.db");
        {
            let db = SqliteBackend::open(&path).unwrap();
            db.insert_document(&record("Persisted", None)).await.unwrap();
        }
        let db = SqliteBackend::open(&path).unwrap();
        assert_eq!(db.select_documents().await.unwrap().len(), 1);
    }
}
