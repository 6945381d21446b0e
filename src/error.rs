//! Error types for the store and cache subsystems.
//!
//! The split mirrors the two failure domains: [`StoreError`] for the local
//! object store and [`CacheError`] for the request cache and its lifecycle.

use thiserror::Error;

/// Local object store errors.
#[derive(Debug, Error)]
pub enum StoreError {
  /// Store initialization failed. Fatal for the store instance: every
  /// pending and future operation fails with this until a new instance is
  /// constructed.
  #[error("storage unavailable: {0}")]
  Unavailable(String),

  /// Insert rejected because the key already exists in the collection.
  #[error("duplicate key '{key}' in collection '{collection}'")]
  DuplicateKey { collection: &'static str, key: String },

  /// A lookup that promised presence found nothing.
  #[error("'{key}' not found in collection '{collection}'")]
  NotFound { collection: &'static str, key: String },

  #[error("storage backend error: {0}")]
  Backend(#[from] rusqlite::Error),

  #[error("record serialization error: {0}")]
  Serialize(#[from] serde_json::Error),
}

/// Request cache and lifecycle errors.
#[derive(Debug, Error)]
pub enum CacheError {
  /// The cache database could not be opened.
  #[error("cache unavailable: {0}")]
  Unavailable(String),

  /// The network fetch itself failed (connection refused, DNS, timeout).
  /// Recoverable: strategies fall back to cached entries where possible.
  #[error("network failure for {url}: {reason}")]
  Network { url: String, reason: String },

  /// A manifest URL could not be fetched or stored during install. Fatal
  /// for that cache generation only; the previous generation keeps serving.
  #[error("manifest install failed at {url}: {reason}")]
  ManifestInstall { url: String, reason: String },

  #[error("cache storage error: {0}")]
  Storage(#[from] rusqlite::Error),

  #[error("cached response serialization error: {0}")]
  Serialize(#[from] serde_json::Error),
}
