//! SQLite-backed evidence store
//!
//! Each record is kept as its JSON export document, with the searchable
//! fields duplicated into indexed columns. Mutations run inside an immediate
//! transaction so a second process cannot interleave with them.
//!
//! A `Connection` cannot be shared between threads, so every call, reads
//! included, takes the same mutex. Unlike the in-memory store there are no
//! shared reads: concurrent callers such as `verify_case` are serialised at
//! the database, and only the file hashing between calls runs in parallel.

use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{EvidenceFilter, EvidenceStore, Mutation};
use crate::error::{VaultError, VaultResult};
use crate::Evidence;

/// SQLite database holding evidence records
pub struct SqliteEvidenceStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteEvidenceStore {
    /// Open or create an evidence database at the specified path
    pub fn open(path: impl AsRef<Path>) -> VaultResult<Self> {
        let db_path = path.as_ref().to_path_buf();

        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VaultError::io(parent, e))?;
        }

        let conn = Connection::open(&db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize_schema()?;

        tracing::info!("Opened evidence database {}", store.describe());
        Ok(store)
    }

    /// Private database that disappears with the store
    pub fn open_in_memory() -> VaultResult<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            db_path: None,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn describe(&self) -> String {
        self.db_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string())
    }

    // A panicking mutation never reaches commit, so the database is
    // unaffected by a poisoned guard.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn initialize_schema(&self) -> VaultResult<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS evidence (
                id TEXT PRIMARY KEY,
                case_number TEXT NOT NULL,
                officer_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_modified TEXT NOT NULL,
                record_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_evidence_case
                ON evidence(case_number);

            CREATE INDEX IF NOT EXISTS idx_evidence_officer
                ON evidence(officer_id);

            CREATE INDEX IF NOT EXISTS idx_evidence_status
                ON evidence(status);
            "#,
        )?;
        Ok(())
    }
}

fn decode(json: &str) -> VaultResult<Evidence> {
    Ok(serde_json::from_str(json)?)
}

impl EvidenceStore for SqliteEvidenceStore {
    fn put(&self, evidence: Evidence) -> VaultResult<()> {
        let record_json = serde_json::to_string(&evidence)?;

        let result = self.conn().execute(
            r#"
            INSERT INTO evidence (
                id, case_number, officer_id, status,
                created_at, last_modified, record_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                evidence.id,
                evidence.case_number,
                evidence.officer_id,
                evidence.status.as_str(),
                evidence.created_at.to_rfc3339(),
                evidence.last_modified.to_rfc3339(),
                record_json,
            ],
        );

        match result {
            Ok(_) => {
                tracing::debug!("Stored evidence {}", evidence.id);
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(VaultError::DuplicateId(evidence.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, id: &str) -> VaultResult<Evidence> {
        let json: Option<String> = self
            .conn()
            .query_row(
                "SELECT record_json FROM evidence WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => decode(&json),
            None => Err(VaultError::NotFound(id.to_string())),
        }
    }

    fn mutate(&self, id: &str, mutation: Mutation<'_>) -> VaultResult<Evidence> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let json: Option<String> = tx
            .query_row(
                "SELECT record_json FROM evidence WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let mut working = match json {
            Some(json) => decode(&json)?,
            None => return Err(VaultError::NotFound(id.to_string())),
        };

        // dropping `tx` on error rolls back
        mutation(&mut working)?;
        working.last_modified = Utc::now();

        tx.execute(
            r#"
            UPDATE evidence
            SET status = ?2, last_modified = ?3, record_json = ?4
            WHERE id = ?1
            "#,
            params![
                id,
                working.status.as_str(),
                working.last_modified.to_rfc3339(),
                serde_json::to_string(&working)?,
            ],
        )?;
        tx.commit()?;

        Ok(working)
    }

    fn query(&self, filter: &EvidenceFilter) -> VaultResult<Vec<Evidence>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT record_json FROM evidence
            WHERE (?1 IS NULL OR case_number = ?1)
              AND (?2 IS NULL OR officer_id = ?2)
              AND (?3 IS NULL OR status = ?3)
            "#,
        )?;

        let rows = stmt.query_map(
            params![
                filter.case_number.as_deref(),
                filter.officer_id.as_deref(),
                filter.status.map(|s| s.as_str()),
            ],
            |row| row.get::<_, String>(0),
        )?;

        let mut results = Vec::new();
        for json in rows {
            results.push(decode(&json?)?);
        }
        Ok(results)
    }

    fn len(&self) -> VaultResult<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM evidence", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{evidence, exercise_store_contract};
    use crate::EvidenceStatus;
    use tempfile::TempDir;

    #[test]
    fn test_sqlite_store_contract() {
        let store = SqliteEvidenceStore::open_in_memory().unwrap();
        exercise_store_contract(&store);
    }

    #[test]
    fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("db").join("evidence.db");

        let original = evidence("E1", "C1", "O1");
        {
            let store = SqliteEvidenceStore::open(&db_path).unwrap();
            assert_eq!(store.path(), Some(db_path.as_path()));
            store.put(original.clone()).unwrap();
            store
                .mutate("E1", &mut |ev| {
                    ev.status = EvidenceStatus::Archived;
                    Ok(())
                })
                .unwrap();
        }

        let reopened = SqliteEvidenceStore::open(&db_path).unwrap();
        let loaded = reopened.get("E1").unwrap();
        assert_eq!(loaded.status, EvidenceStatus::Archived);
        assert_eq!(loaded.file_hash, original.file_hash);
        assert_eq!(loaded.chain_of_custody, original.chain_of_custody);
        assert_eq!(
            reopened
                .query(&EvidenceFilter::new("", "", Some(EvidenceStatus::Archived)))
                .unwrap()
                .len(),
            1
        );
    }
}
