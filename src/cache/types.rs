//! Core types for the request cache: request/response snapshots, cache
//! generations, and strategy outcomes.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

/// How a request participates in navigation. Same-origin navigations are
/// routed network-first; other same-origin requests are static assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
  /// A page navigation (document load).
  Navigate,
  /// Any subresource load (script, style, image, API call).
  #[default]
  Resource,
}

/// An outgoing request, identified by method + URL. The identity is treated
/// as opaque: the cache keys on a hash of both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  pub url: Url,
  pub mode: RequestMode,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      mode: RequestMode::Resource,
    }
  }

  pub fn navigate(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      mode: RequestMode::Navigate,
    }
  }

  /// Stable, fixed-length cache key for this request identity.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A response snapshot: status, headers, body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: Vec<u8>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body,
    }
  }

  /// Whether this response is cacheable (2xx).
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// A stored response plus the generation it belongs to.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  pub generation: String,
  pub stored_at: DateTime<Utc>,
}

/// The named cache buckets currently in play: the versioned static
/// generation pinned to the install manifest, and the runtime generation
/// populated opportunistically by network-first traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generations {
  pub static_gen: String,
  pub runtime: String,
}

impl Generations {
  /// Runtime generation name. Fixed across versions; never retired.
  pub const RUNTIME: &'static str = "moviebox-runtime";

  pub fn for_version(version: &str) -> Self {
    Self {
      static_gen: static_generation_name(version),
      runtime: Self::RUNTIME.to_string(),
    }
  }
}

/// Static generation name for a release version, e.g. `moviebox-v1.0.0`.
pub fn static_generation_name(version: &str) -> String {
  format!("moviebox-v{}", version)
}

/// Retrieval strategy selected for a request by the fixed routing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Serve from the static cache, network as fallback.
  CacheFirst,
  /// Go to the network, runtime cache as fallback.
  NetworkFirst,
  /// Not intercepted; forwarded untouched and never cached.
  Passthrough,
}

/// A response served by the controller, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: ServeSource,
}

impl Served {
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: ServeSource::Network,
    }
  }

  pub fn from_cache(response: Response) -> Self {
    Self {
      response,
      source: ServeSource::Cache,
    }
  }

  pub fn offline_fallback(response: Response) -> Self {
    Self {
      response,
      source: ServeSource::OfflineFallback,
    }
  }

  pub fn passthrough(response: Response) -> Self {
    Self {
      response,
      source: ServeSource::Passthrough,
    }
  }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeSource {
  /// Fresh from the network.
  Network,
  /// A cached entry (cache-first hit, or network-first offline fallback).
  Cache,
  /// The designated offline page, served because the network failed and the
  /// request itself had no cached entry.
  OfflineFallback,
  /// Forwarded without interception.
  Passthrough,
}
