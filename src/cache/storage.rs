//! Response store trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use crate::error::CacheError;

use super::types::{CachedResponse, Request, Response};

/// Trait for persistent response cache backends.
///
/// Entries are keyed by `(generation, request identity)`; at most one entry
/// exists per request key per generation, and `put` overwrites.
pub trait ResponseStore: Send + Sync {
  /// Store a response snapshot for the request in the given generation,
  /// replacing any previous entry for the same request.
  fn put(&self, generation: &str, request: &Request, response: &Response)
    -> Result<(), CacheError>;

  /// Look up the cached response for a request in the given generation.
  fn get(&self, generation: &str, request: &Request) -> Result<Option<CachedResponse>, CacheError>;

  /// Names of every generation that currently holds entries.
  fn generations(&self) -> Result<Vec<String>, CacheError>;

  /// Delete every entry belonging to a generation.
  fn delete_generation(&self, generation: &str) -> Result<(), CacheError>;
}

/// SQLite-based response cache.
pub struct SqliteResponseStore {
  conn: Mutex<Connection>,
}

/// Schema for the response cache. The raw method/URL are stored alongside
/// the hash for inspection; headers are serialized as JSON.
const RESPONSE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS response_cache (
    generation TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers BLOB NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (generation, request_hash)
);

CREATE INDEX IF NOT EXISTS idx_response_cache_generation
    ON response_cache(generation);
"#;

impl SqliteResponseStore {
  /// Open (or create) the response cache at the given path.
  pub fn open(path: &Path) -> Result<Self, CacheError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| CacheError::Unavailable(format!("failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      CacheError::Unavailable(format!("failed to open cache at {}: {}", path.display(), e))
    })?;
    Self::from_connection(conn)
  }

  /// Open an in-memory response cache. Used by tests.
  pub fn open_in_memory() -> Result<Self, CacheError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self, CacheError> {
    conn.execute_batch(RESPONSE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Default cache path under the platform data directory.
  pub fn default_path() -> Result<std::path::PathBuf, CacheError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| CacheError::Unavailable("could not determine data directory".to_string()))?;

    Ok(data_dir.join("moviebox").join("cache.db"))
  }

  fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CacheError> {
    self
      .conn
      .lock()
      .map_err(|e| CacheError::Unavailable(format!("lock poisoned: {}", e)))
  }
}

impl ResponseStore for SqliteResponseStore {
  fn put(
    &self,
    generation: &str,
    request: &Request,
    response: &Response,
  ) -> Result<(), CacheError> {
    let conn = self.conn()?;
    let headers = serde_json::to_vec(&response.headers)?;

    conn.execute(
      "INSERT OR REPLACE INTO response_cache
         (generation, request_hash, method, url, status, headers, body, stored_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
      params![
        generation,
        request.cache_hash(),
        request.method,
        request.url.as_str(),
        response.status,
        headers,
        response.body,
        Utc::now().to_rfc3339(),
      ],
    )?;

    Ok(())
  }

  fn get(
    &self,
    generation: &str,
    request: &Request,
  ) -> Result<Option<CachedResponse>, CacheError> {
    let conn = self.conn()?;

    let mut stmt = conn.prepare(
      "SELECT status, headers, body, stored_at FROM response_cache
       WHERE generation = ? AND request_hash = ?",
    )?;

    let row: Option<(u16, Vec<u8>, Vec<u8>, String)> = stmt
      .query_row(params![generation, request.cache_hash()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .map(Some)
      .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
      })?;

    match row {
      Some((status, headers, body, stored_at)) => {
        let headers: Vec<(String, String)> = serde_json::from_slice(&headers)?;
        let stored_at = parse_stored_at(&stored_at);
        Ok(Some(CachedResponse {
          response: Response {
            status,
            headers,
            body,
          },
          generation: generation.to_string(),
          stored_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn generations(&self) -> Result<Vec<String>, CacheError> {
    let conn = self.conn()?;

    let mut stmt =
      conn.prepare("SELECT DISTINCT generation FROM response_cache ORDER BY generation")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;

    Ok(names)
  }

  fn delete_generation(&self, generation: &str) -> Result<(), CacheError> {
    let conn = self.conn()?;
    conn.execute(
      "DELETE FROM response_cache WHERE generation = ?",
      params![generation],
    )?;
    Ok(())
  }
}

fn parse_stored_at(s: &str) -> DateTime<Utc> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn store() -> SqliteResponseStore {
    SqliteResponseStore::open_in_memory().unwrap()
  }

  fn request(path: &str) -> Request {
    Request::get(
      format!("https://moviebox.example{}", path)
        .parse()
        .unwrap(),
    )
  }

  #[test]
  fn test_put_then_get() {
    let store = store();
    let req = request("/js/main.js");
    let mut resp = Response::new(200, b"console.log('hi')".to_vec());
    resp
      .headers
      .push(("content-type".to_string(), "text/javascript".to_string()));

    store.put("moviebox-v1.0.0", &req, &resp).unwrap();

    let cached = store.get("moviebox-v1.0.0", &req).unwrap().unwrap();
    assert_eq!(cached.response, resp);
    assert_eq!(cached.generation, "moviebox-v1.0.0");
  }

  #[test]
  fn test_get_misses_across_generations() {
    let store = store();
    let req = request("/index.html");
    store
      .put("moviebox-v1.0.0", &req, &Response::new(200, vec![]))
      .unwrap();

    assert!(store.get("moviebox-v2.0.0", &req).unwrap().is_none());
  }

  #[test]
  fn test_put_overwrites_previous_entry() {
    let store = store();
    let req = request("/index.html");

    store
      .put("moviebox-v1.0.0", &req, &Response::new(200, b"old".to_vec()))
      .unwrap();
    store
      .put("moviebox-v1.0.0", &req, &Response::new(200, b"new".to_vec()))
      .unwrap();

    let cached = store.get("moviebox-v1.0.0", &req).unwrap().unwrap();
    assert_eq!(cached.response.body, b"new");
  }

  #[test]
  fn test_delete_generation_removes_only_that_bucket() {
    let store = store();
    let req = request("/index.html");
    store
      .put("moviebox-v1.0.0", &req, &Response::new(200, vec![]))
      .unwrap();
    store
      .put("moviebox-runtime", &req, &Response::new(200, vec![]))
      .unwrap();

    store.delete_generation("moviebox-v1.0.0").unwrap();

    assert!(store.get("moviebox-v1.0.0", &req).unwrap().is_none());
    assert!(store.get("moviebox-runtime", &req).unwrap().is_some());
    assert_eq!(store.generations().unwrap(), vec!["moviebox-runtime"]);
  }
}
