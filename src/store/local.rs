//! The local object store: a lazily opened, key-addressed persistent store
//! organized into independent named collections.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::StoreError;

use super::backend::{SqliteBackend, StoreBackend};
use super::records::{Collection, HistoryEntry, MovieRecord, SavedItem};

/// Handle to the local object store.
///
/// The backend is opened lazily on first use; concurrent callers all resolve
/// against the same backend instance once it is ready. A failed open is
/// sticky: every later operation on this instance fails with
/// [`StoreError::Unavailable`] until a new `ObjectStore` is constructed.
pub struct ObjectStore<B: StoreBackend = SqliteBackend> {
  init: Box<dyn Fn() -> Result<B, StoreError> + Send + Sync>,
  // Err holds the rendered open failure so it can be re-reported.
  backend: OnceCell<Result<Arc<B>, String>>,
}

impl ObjectStore<SqliteBackend> {
  /// Store backed by a SQLite database at the given path.
  pub fn at(path: PathBuf) -> Self {
    Self::with_backend(move || SqliteBackend::open(&path))
  }

  /// Store backed by the default platform data directory.
  pub fn at_default_path() -> Self {
    Self::with_backend(|| SqliteBackend::open(&SqliteBackend::default_path()?))
  }
}

impl<B: StoreBackend> ObjectStore<B> {
  /// Store with a custom backend initializer. The initializer runs at most
  /// once, on first use.
  pub fn with_backend<F>(init: F) -> Self
  where
    F: Fn() -> Result<B, StoreError> + Send + Sync + 'static,
  {
    Self {
      init: Box::new(init),
      backend: OnceCell::new(),
    }
  }

  /// Idempotently establish the store, creating collections and indexes as
  /// needed. Safe to call concurrently; all callers suspend until the store
  /// is ready or initialization fails.
  pub async fn open(&self) -> Result<(), StoreError> {
    self.backend().await.map(|_| ())
  }

  async fn backend(&self) -> Result<Arc<B>, StoreError> {
    let slot = self
      .backend
      .get_or_init(|| async {
        debug!("opening object store");
        (self.init)().map(Arc::new).map_err(|e| e.to_string())
      })
      .await;

    match slot {
      Ok(backend) => Ok(Arc::clone(backend)),
      Err(reason) => Err(StoreError::Unavailable(reason.clone())),
    }
  }

  /// Add a record under `key`. Fails with [`StoreError::DuplicateKey`] if
  /// the key already exists in the collection; the record is visible to
  /// subsequent reads on this instance once the call returns.
  pub async fn insert<T: Serialize>(
    &self,
    collection: Collection,
    key: &str,
    record: &T,
    sorted_at: Option<DateTime<Utc>>,
  ) -> Result<(), StoreError> {
    let backend = self.backend().await?;
    let data = serde_json::to_vec(record)?;
    backend.insert(collection, key, &data, sorted_at)
  }

  /// Delete the record if present. Returns whether a record was removed;
  /// removing an absent key succeeds.
  pub async fn remove(&self, collection: Collection, key: &str) -> Result<bool, StoreError> {
    let backend = self.backend().await?;
    backend.remove(collection, key)
  }

  /// Get a record by key, `None` on absence (never an error for a miss).
  pub async fn get_by_key<T: DeserializeOwned>(
    &self,
    collection: Collection,
    key: &str,
  ) -> Result<Option<T>, StoreError> {
    let backend = self.backend().await?;
    match backend.get(collection, key)? {
      Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
      None => Ok(None),
    }
  }

  /// Every record in the collection, ordered by its sort timestamp where
  /// one was recorded.
  pub async fn get_all<T: DeserializeOwned>(
    &self,
    collection: Collection,
  ) -> Result<Vec<T>, StoreError> {
    let backend = self.backend().await?;
    backend
      .get_all(collection)?
      .iter()
      .map(|data| serde_json::from_slice(data).map_err(StoreError::from))
      .collect()
  }

  // My list --------------------------------------------------------------

  /// Save a movie to the user's list. The record is normalized and stamped
  /// with the add time. Adding an already saved movie fails with
  /// [`StoreError::DuplicateKey`].
  pub async fn add_item(&self, movie: MovieRecord) -> Result<SavedItem, StoreError> {
    let item = SavedItem {
      movie: movie.normalize(),
      added_at: Utc::now(),
    };
    self
      .insert(Collection::MyList, &item.movie.key(), &item, Some(item.added_at))
      .await?;
    info!(id = item.movie.id, title = %item.movie.title, "added to my list");
    Ok(item)
  }

  /// Remove a movie from the list. Returns whether it was present.
  pub async fn remove_item(&self, id: u64) -> Result<bool, StoreError> {
    let removed = self.remove(Collection::MyList, &id.to_string()).await?;
    if removed {
      info!(id, "removed from my list");
    }
    Ok(removed)
  }

  /// The saved list, oldest first.
  pub async fn list_items(&self) -> Result<Vec<SavedItem>, StoreError> {
    self.get_all(Collection::MyList).await
  }

  pub async fn get_item(&self, id: u64) -> Result<Option<SavedItem>, StoreError> {
    self.get_by_key(Collection::MyList, &id.to_string()).await
  }

  pub async fn is_saved(&self, id: u64) -> Result<bool, StoreError> {
    Ok(self.get_item(id).await?.is_some())
  }

  // Watch history --------------------------------------------------------

  /// Record that a movie was watched. Re-watching updates the existing
  /// entry with the new watch time.
  pub async fn record_watched(&self, movie: MovieRecord) -> Result<HistoryEntry, StoreError> {
    let entry = HistoryEntry {
      movie: movie.normalize(),
      watched_at: Utc::now(),
    };
    let backend = self.backend().await?;
    let data = serde_json::to_vec(&entry)?;
    backend.upsert(
      Collection::WatchHistory,
      &entry.movie.key(),
      &data,
      Some(entry.watched_at),
    )?;
    debug!(id = entry.movie.id, "recorded watch");
    Ok(entry)
  }

  /// Watch history, oldest first.
  pub async fn watch_history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
    self.get_all(Collection::WatchHistory).await
  }

  // Preferences ----------------------------------------------------------

  /// Set a preference value, replacing any previous value for the key.
  pub async fn set_preference<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
    let backend = self.backend().await?;
    let data = serde_json::to_vec(value)?;
    backend.upsert(Collection::Preferences, key, &data, None)
  }

  /// Get a preference value, or the caller-supplied default on miss.
  pub async fn get_preference<T: DeserializeOwned>(
    &self,
    key: &str,
    default: T,
  ) -> Result<T, StoreError> {
    match self.get_by_key(Collection::Preferences, key).await? {
      Some(value) => Ok(value),
      None => Ok(default),
    }
  }
}
