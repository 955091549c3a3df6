//! SQLite-based snapshot storage with file blob support
//!
//! Stores small payloads inline in SQLite, large payloads (>64KB) as files.
//! Every write replaces the dataset's row wholesale.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 1;

/// Payloads larger than this are stored as external blobs
const INLINE_THRESHOLD: usize = 64 * 1024; // 64KB

type Result<T> = std::result::Result<T, StoreError>;

/// The current payload of one dataset
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: String,
    pub payload: Value,
    pub checksum: String,
    pub size_bytes: usize,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot metadata without the payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    pub id: String,
    pub checksum: String,
    pub size_bytes: usize,
    pub updated_at: DateTime<Utc>,
}

/// SQLite-backed snapshot storage with file blob support
pub struct SnapshotStore {
    conn: Connection,
    blobs_dir: PathBuf,
}

impl SnapshotStore {
    /// Open or create the store in `data_dir`, or the default XDG data location
    pub fn open(data_dir: Option<&Path>) -> Result<Self> {
        match data_dir {
            Some(dir) => Self::open_at(dir),
            None => {
                let base = dirs::data_dir().ok_or(StoreError::NoHome)?;
                Self::open_at(&base.join("courtside"))
            }
        }
    }

    /// Open the store at a specific directory
    pub fn open_at(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| StoreError::Io(format!("Failed to create data dir: {}", e)))?;

        let db_path = data_dir.join("snapshots.db");
        let blobs_dir = data_dir.join("blobs");
        std::fs::create_dir_all(&blobs_dir)
            .map_err(|e| StoreError::Io(format!("Failed to create blobs dir: {}", e)))?;

        let conn = Connection::open(&db_path)?;

        // Check schema version - nuke if mismatched
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Snapshot schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            Self::nuke(&db_path, &blobs_dir)?;
            return Self::open_at(data_dir);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY NOT NULL,
                payload TEXT,
                blob_path TEXT,
                checksum TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS refresh_metadata (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_refresh INTEGER NOT NULL
            );
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self { conn, blobs_dir })
    }

    /// Current snapshot for a dataset, if one was ever written
    pub fn get(&self, id: &str) -> Result<Option<Snapshot>> {
        let row: Option<(Option<String>, Option<String>, String, i64, i64)> = self
            .conn
            .query_row(
                "SELECT payload, blob_path, checksum, size_bytes, updated_at
                 FROM snapshots WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        let Some((payload, blob_path, checksum, size_bytes, updated_at)) = row else {
            return Ok(None);
        };

        let text = match (payload, blob_path) {
            (Some(text), None) => text,
            (None, Some(blob_path)) => match std::fs::read_to_string(self.blobs_dir.join(&blob_path)) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::warn!("Blob {} is missing, dropping snapshot row", blob_path);
                    // Delete stale entry so the dataset reads as never populated
                    self.conn.execute("DELETE FROM snapshots WHERE id = ?1", [id])?;
                    return Ok(None);
                }
                Err(e) => {
                    return Err(StoreError::Io(format!(
                        "Failed to read blob {}: {}",
                        blob_path, e
                    )));
                }
            },
            _ => {
                return Err(StoreError::Corrupt(
                    id.to_string(),
                    "row has neither inline payload nor blob".to_string(),
                ));
            }
        };

        let payload = serde_json::from_str(&text)
            .map_err(|e| StoreError::Corrupt(id.to_string(), e.to_string()))?;

        Ok(Some(Snapshot {
            id: id.to_string(),
            payload,
            checksum,
            size_bytes: size_bytes as usize,
            updated_at: from_timestamp(updated_at),
        }))
    }

    /// Replace a dataset's snapshot wholesale
    pub fn replace(&self, id: &str, payload: &Value) -> Result<SnapshotInfo> {
        let text = serde_json::to_string(payload)
            .map_err(|e| StoreError::Corrupt(id.to_string(), e.to_string()))?;
        let checksum = format!("{:x}", Sha256::digest(text.as_bytes()));
        let now = Utc::now();

        let previous_blob: Option<String> = self
            .conn
            .query_row("SELECT blob_path FROM snapshots WHERE id = ?1", [id], |r| {
                r.get(0)
            })
            .optional()?
            .flatten();

        if text.len() <= INLINE_THRESHOLD {
            self.conn.execute(
                "INSERT OR REPLACE INTO snapshots
                 (id, payload, blob_path, checksum, size_bytes, updated_at)
                 VALUES (?1, ?2, NULL, ?3, ?4, ?5)",
                params![id, text, checksum, text.len(), now.timestamp()],
            )?;
            if let Some(old) = previous_blob {
                self.remove_blob(&old);
            }
        } else {
            let blob_path = self.write_blob(id, &text)?;
            self.conn.execute(
                "INSERT OR REPLACE INTO snapshots
                 (id, payload, blob_path, checksum, size_bytes, updated_at)
                 VALUES (?1, NULL, ?2, ?3, ?4, ?5)",
                params![id, blob_path, checksum, text.len(), now.timestamp()],
            )?;
        }

        Ok(SnapshotInfo {
            id: id.to_string(),
            checksum,
            size_bytes: text.len(),
            updated_at: from_timestamp(now.timestamp()),
        })
    }

    /// Metadata for every stored snapshot, ordered by id
    pub fn list(&self) -> Result<Vec<SnapshotInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, checksum, size_bytes, updated_at FROM snapshots ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SnapshotInfo {
                id: row.get(0)?,
                checksum: row.get(1)?,
                size_bytes: row.get::<_, i64>(2)? as usize,
                updated_at: from_timestamp(row.get(3)?),
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Timestamp of the last complete refresh
    pub fn get_metadata(&self) -> Result<Option<DateTime<Utc>>> {
        let ts: Option<i64> = self
            .conn
            .query_row(
                "SELECT last_refresh FROM refresh_metadata WHERE id = 1",
                [],
                |r| r.get(0),
            )
            .optional()?;
        Ok(ts.map(from_timestamp))
    }

    /// Record a complete refresh
    pub fn set_metadata(&self, last_refresh: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO refresh_metadata (id, last_refresh) VALUES (1, ?1)",
            [last_refresh.timestamp()],
        )?;
        Ok(())
    }

    /// Write a blob file via a temp file and rename
    fn write_blob(&self, id: &str, text: &str) -> Result<String> {
        let filename = format!("{}.json", id);
        let tmp_path = self.blobs_dir.join(format!("{}.tmp", filename));
        let full_path = self.blobs_dir.join(&filename);

        std::fs::write(&tmp_path, text)
            .map_err(|e| StoreError::Io(format!("Failed to write blob: {}", e)))?;
        std::fs::rename(&tmp_path, &full_path)
            .map_err(|e| StoreError::Io(format!("Failed to move blob into place: {}", e)))?;

        Ok(filename)
    }

    fn remove_blob(&self, blob_path: &str) {
        if let Err(e) = std::fs::remove_file(self.blobs_dir.join(blob_path)) {
            log::warn!("Failed to remove old blob {}: {}", blob_path, e);
        }
    }

    /// Nuke the store (delete DB and all blobs)
    fn nuke(db_path: &Path, blobs_dir: &Path) -> Result<()> {
        if db_path.exists() {
            std::fs::remove_file(db_path)
                .map_err(|e| StoreError::Io(format!("Failed to remove snapshot DB: {}", e)))?;
        }
        if blobs_dir.exists() {
            std::fs::remove_dir_all(blobs_dir)
                .map_err(|e| StoreError::Io(format!("Failed to remove blobs dir: {}", e)))?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn from_timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
