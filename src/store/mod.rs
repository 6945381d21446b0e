//! Local object store: durable, asynchronous, key-addressed storage for
//! saved items, watch history, and preferences.
//!
//! Collections are independent keyspaces; records become visible to reads on
//! the same store instance as soon as their write completes.

mod backend;
mod local;
mod records;

pub use backend::{SqliteBackend, StoreBackend};
pub use local::ObjectStore;
pub use records::{Collection, HistoryEntry, MovieRecord, SavedItem};
