//! Request cache for offline support.
//!
//! This module provides the interception layer between the pages and the
//! network:
//! - Persists response snapshots in named, versioned cache generations
//! - Routes each request to a cache-first or network-first strategy by a
//!   fixed rule, passing uninvolved cross-origin traffic through untouched
//! - Writes successful responses back to keep the cache warm for offline use

mod controller;
mod storage;
mod types;

pub use controller::CacheController;
pub use storage::{ResponseStore, SqliteResponseStore};
pub use types::{
  static_generation_name, CachedResponse, Generations, Request, RequestMode, Response,
  ServeSource, Served, Strategy,
};
