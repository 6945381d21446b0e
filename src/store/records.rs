//! Record types and collections for the local object store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named collections in the local store. Each is an independent keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
  /// Items the user saved ("my list"), sorted by added date.
  MyList,
  /// Items the user watched, sorted by watched date.
  WatchHistory,
  /// Arbitrary key/value preferences (theme, last page, ...).
  Preferences,
}

impl Collection {
  /// Stable storage name for the collection.
  pub fn name(self) -> &'static str {
    match self {
      Collection::MyList => "my_list",
      Collection::WatchHistory => "watch_history",
      Collection::Preferences => "preferences",
    }
  }
}

/// A normalized movie-like item as rendered by the UI layer.
///
/// Everything beyond id and title is optional; the record is normalized once
/// at the boundary (see [`MovieRecord::normalize`]) so downstream code never
/// has to re-check field shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
  pub id: u64,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub overview: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub poster_path: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub backdrop_path: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub vote_average: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub release_date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub media_type: Option<String>,
}

impl MovieRecord {
  pub fn new(id: u64, title: impl Into<String>) -> Self {
    Self {
      id,
      title: title.into(),
      overview: None,
      poster_path: None,
      backdrop_path: None,
      vote_average: None,
      release_date: None,
      media_type: None,
    }
  }

  /// Normalize field shapes: trim the title, collapse empty optional strings
  /// to `None`, clamp the rating into the 0..=10 scale.
  pub fn normalize(mut self) -> Self {
    self.title = self.title.trim().to_string();
    for field in [
      &mut self.overview,
      &mut self.poster_path,
      &mut self.backdrop_path,
      &mut self.release_date,
      &mut self.media_type,
    ] {
      if field.as_deref().is_some_and(|s| s.trim().is_empty()) {
        *field = None;
      }
    }
    self.vote_average = self.vote_average.map(|v| v.clamp(0.0, 10.0));
    self
  }

  /// Storage key within a collection.
  pub fn key(&self) -> String {
    self.id.to_string()
  }
}

/// A movie saved to the user's list, stamped with when it was added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedItem {
  #[serde(flatten)]
  pub movie: MovieRecord,
  pub added_at: DateTime<Utc>,
}

/// A watch-history entry, stamped with when it was watched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
  #[serde(flatten)]
  pub movie: MovieRecord,
  pub watched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_normalize_trims_and_clamps() {
    let record = MovieRecord {
      overview: Some("   ".to_string()),
      poster_path: Some("/poster.jpg".to_string()),
      vote_average: Some(11.4),
      ..MovieRecord::new(42, "  X  ")
    }
    .normalize();

    assert_eq!(record.title, "X");
    assert_eq!(record.overview, None);
    assert_eq!(record.poster_path.as_deref(), Some("/poster.jpg"));
    assert_eq!(record.vote_average, Some(10.0));
  }

  #[test]
  fn test_saved_item_roundtrip_flattens_movie() {
    let item = SavedItem {
      movie: MovieRecord::new(42, "X"),
      added_at: Utc::now(),
    };
    let json = serde_json::to_value(&item).unwrap();
    assert_eq!(json["id"], 42);
    assert_eq!(json["title"], "X");
    assert!(json.get("addedAt").is_none());
    assert!(json.get("added_at").is_some());

    let back: SavedItem = serde_json::from_value(json).unwrap();
    assert_eq!(back, item);
  }

  #[test]
  fn test_collection_names_are_distinct() {
    assert_ne!(Collection::MyList.name(), Collection::WatchHistory.name());
    assert_ne!(Collection::MyList.name(), Collection::Preferences.name());
  }
}
