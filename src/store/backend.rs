//! Storage backend trait and SQLite implementation for the object store.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use std::sync::Mutex;

use crate::error::StoreError;

use super::records::Collection;

/// Trait for object store backends.
///
/// Records are opaque byte payloads keyed by `(collection, key)`; an optional
/// sort timestamp backs the per-collection date index.
pub trait StoreBackend: Send + Sync {
  /// Add a record. Fails with [`StoreError::DuplicateKey`] if the key
  /// already exists in the collection.
  fn insert(
    &self,
    collection: Collection,
    key: &str,
    data: &[u8],
    sorted_at: Option<DateTime<Utc>>,
  ) -> Result<(), StoreError>;

  /// Add or replace a record.
  fn upsert(
    &self,
    collection: Collection,
    key: &str,
    data: &[u8],
    sorted_at: Option<DateTime<Utc>>,
  ) -> Result<(), StoreError>;

  /// Delete a record if present. Returns whether a record was deleted;
  /// removing an absent key is not an error.
  fn remove(&self, collection: Collection, key: &str) -> Result<bool, StoreError>;

  /// Get a single record by key, `None` on absence.
  fn get(&self, collection: Collection, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

  /// Get every record in the collection, ordered by sort timestamp where
  /// one was provided.
  fn get_all(&self, collection: Collection) -> Result<Vec<Vec<u8>>, StoreError>;
}

/// SQLite-based object store backend.
pub struct SqliteBackend {
  conn: Mutex<Connection>,
}

/// Schema for the record store. One generic table holds every collection;
/// the timestamp index backs date-ordered listings (added date, watched
/// date).
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL,
    key TEXT NOT NULL,
    data BLOB NOT NULL,
    sorted_at TEXT,
    PRIMARY KEY (collection, key)
);

CREATE INDEX IF NOT EXISTS idx_records_sorted
    ON records(collection, sorted_at);
"#;

impl SqliteBackend {
  /// Open (or create) the store database at the given path.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| StoreError::Unavailable(format!("failed to create store directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      StoreError::Unavailable(format!("failed to open store at {}: {}", path.display(), e))
    })?;

    Self::from_connection(conn)
  }

  /// Open an in-memory store. Used by tests and ephemeral sessions.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    let conn = Connection::open_in_memory()
      .map_err(|e| StoreError::Unavailable(format!("failed to open in-memory store: {}", e)))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self, StoreError> {
    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| StoreError::Unavailable(format!("failed to run store migrations: {}", e)))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Default database path under the platform data directory.
  pub fn default_path() -> Result<std::path::PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StoreError::Unavailable("could not determine data directory".to_string()))?;

    Ok(data_dir.join("moviebox").join("store.db"))
  }

  fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    self
      .conn
      .lock()
      .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
  }
}

impl StoreBackend for SqliteBackend {
  fn insert(
    &self,
    collection: Collection,
    key: &str,
    data: &[u8],
    sorted_at: Option<DateTime<Utc>>,
  ) -> Result<(), StoreError> {
    let conn = self.conn()?;

    let result = conn.execute(
      "INSERT INTO records (collection, key, data, sorted_at) VALUES (?, ?, ?, ?)",
      params![collection.name(), key, data, sorted_at.map(|t| t.to_rfc3339())],
    );

    match result {
      Ok(_) => Ok(()),
      Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
        Err(StoreError::DuplicateKey {
          collection: collection.name(),
          key: key.to_string(),
        })
      }
      Err(e) => Err(e.into()),
    }
  }

  fn upsert(
    &self,
    collection: Collection,
    key: &str,
    data: &[u8],
    sorted_at: Option<DateTime<Utc>>,
  ) -> Result<(), StoreError> {
    let conn = self.conn()?;

    conn.execute(
      "INSERT OR REPLACE INTO records (collection, key, data, sorted_at) VALUES (?, ?, ?, ?)",
      params![collection.name(), key, data, sorted_at.map(|t| t.to_rfc3339())],
    )?;

    Ok(())
  }

  fn remove(&self, collection: Collection, key: &str) -> Result<bool, StoreError> {
    let conn = self.conn()?;

    let deleted = conn.execute(
      "DELETE FROM records WHERE collection = ? AND key = ?",
      params![collection.name(), key],
    )?;

    Ok(deleted > 0)
  }

  fn get(&self, collection: Collection, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let conn = self.conn()?;

    let mut stmt = conn.prepare("SELECT data FROM records WHERE collection = ? AND key = ?")?;

    let data: Option<Vec<u8>> = stmt
      .query_row(params![collection.name(), key], |row| row.get(0))
      .map(Some)
      .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
      })?;

    Ok(data)
  }

  fn get_all(&self, collection: Collection) -> Result<Vec<Vec<u8>>, StoreError> {
    let conn = self.conn()?;

    let mut stmt =
      conn.prepare("SELECT data FROM records WHERE collection = ? ORDER BY sorted_at")?;

    let rows = stmt
      .query_map(params![collection.name()], |row| row.get(0))?
      .collect::<Result<Vec<Vec<u8>>, _>>()?;

    Ok(rows)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn backend() -> SqliteBackend {
    SqliteBackend::open_in_memory().unwrap()
  }

  #[test]
  fn test_insert_then_get_roundtrip() {
    let backend = backend();
    backend
      .insert(Collection::MyList, "42", b"payload", None)
      .unwrap();

    let data = backend.get(Collection::MyList, "42").unwrap();
    assert_eq!(data.as_deref(), Some(&b"payload"[..]));
  }

  #[test]
  fn test_insert_duplicate_key_fails() {
    let backend = backend();
    backend
      .insert(Collection::MyList, "42", b"first", None)
      .unwrap();

    let err = backend
      .insert(Collection::MyList, "42", b"second", None)
      .unwrap_err();
    assert!(matches!(
      err,
      StoreError::DuplicateKey { collection: "my_list", .. }
    ));

    // First write is untouched
    let data = backend.get(Collection::MyList, "42").unwrap();
    assert_eq!(data.as_deref(), Some(&b"first"[..]));
  }

  #[test]
  fn test_same_key_in_different_collections() {
    let backend = backend();
    backend
      .insert(Collection::MyList, "42", b"saved", None)
      .unwrap();
    backend
      .insert(Collection::WatchHistory, "42", b"watched", None)
      .unwrap();

    let saved = backend.get(Collection::MyList, "42").unwrap();
    let watched = backend.get(Collection::WatchHistory, "42").unwrap();
    assert_eq!(saved.as_deref(), Some(&b"saved"[..]));
    assert_eq!(watched.as_deref(), Some(&b"watched"[..]));
  }

  #[test]
  fn test_remove_is_idempotent() {
    let backend = backend();
    backend
      .insert(Collection::MyList, "42", b"payload", None)
      .unwrap();

    assert!(backend.remove(Collection::MyList, "42").unwrap());
    assert!(!backend.remove(Collection::MyList, "42").unwrap());
    assert_eq!(backend.get(Collection::MyList, "42").unwrap(), None);
  }

  #[test]
  fn test_upsert_replaces() {
    let backend = backend();
    backend
      .upsert(Collection::Preferences, "theme", b"\"dark\"", None)
      .unwrap();
    backend
      .upsert(Collection::Preferences, "theme", b"\"light\"", None)
      .unwrap();

    let data = backend.get(Collection::Preferences, "theme").unwrap();
    assert_eq!(data.as_deref(), Some(&b"\"light\""[..]));
  }

  #[test]
  fn test_get_all_ordered_by_sort_timestamp() {
    use chrono::TimeZone;

    let backend = backend();
    let t = |h| Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap();

    backend
      .insert(Collection::MyList, "b", b"second", Some(t(12)))
      .unwrap();
    backend
      .insert(Collection::MyList, "a", b"first", Some(t(9)))
      .unwrap();
    backend
      .insert(Collection::MyList, "c", b"third", Some(t(15)))
      .unwrap();

    let all = backend.get_all(Collection::MyList).unwrap();
    assert_eq!(all, vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]);
  }

  #[test]
  fn test_get_all_counts_distinct_inserts() {
    let backend = backend();
    for i in 0..5 {
      backend
        .insert(Collection::MyList, &i.to_string(), &[i], None)
        .unwrap();
    }

    let all = backend.get_all(Collection::MyList).unwrap();
    assert_eq!(all.len(), 5);
  }
}
