//! Request cache controller: per-request routing between cache-first,
//! network-first, and passthrough handling.

use std::future::Future;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};
use url::Url;

use crate::error::CacheError;

use super::storage::ResponseStore;
use super::types::{Generations, Request, RequestMode, Response, Served, Strategy};

/// Intercepts outgoing requests and decides, per request, whether to serve
/// from the persistent cache or go to the network first, writing successful
/// responses back as a side effect.
///
/// The network collaborator is injected per call as a fetcher closure; the
/// controller knows nothing about its shape beyond "a request goes out, a
/// response comes back".
pub struct CacheController<S: ResponseStore> {
  store: Arc<S>,
  origin: Url,
  /// Cross-origin host patterns routed network-first (metadata API, image
  /// host). Matched as domain suffixes.
  network_first_hosts: Vec<String>,
  /// Root-relative path served when a cache-first request fails with no
  /// cached entry.
  offline_fallback: Option<String>,
  /// Shared with the lifecycle manager; promotion of a new static
  /// generation takes effect for the next interception.
  generations: Arc<RwLock<Generations>>,
}

impl<S: ResponseStore> CacheController<S> {
  pub fn new(store: Arc<S>, origin: Url, generations: Arc<RwLock<Generations>>) -> Self {
    Self {
      store,
      origin,
      network_first_hosts: Vec::new(),
      offline_fallback: None,
      generations,
    }
  }

  /// Cross-origin hosts to route network-first instead of passing through.
  pub fn with_network_first_hosts(mut self, hosts: Vec<String>) -> Self {
    self.network_first_hosts = hosts;
    self
  }

  /// Path of the page served when offline with nothing cached for the
  /// request itself.
  pub fn with_offline_fallback(mut self, path: impl Into<String>) -> Self {
    self.offline_fallback = Some(path.into());
    self
  }

  /// The fixed routing rule: cross-origin requests to the designated hosts
  /// go network-first and all other cross-origin requests pass through;
  /// same-origin navigations go network-first; everything else same-origin
  /// is a static asset and goes cache-first.
  pub fn route(&self, request: &Request) -> Strategy {
    if request.url.origin() != self.origin.origin() {
      if self.matches_network_first_host(&request.url) {
        Strategy::NetworkFirst
      } else {
        Strategy::Passthrough
      }
    } else if request.mode == RequestMode::Navigate {
      Strategy::NetworkFirst
    } else {
      Strategy::CacheFirst
    }
  }

  /// Intercept one request: select a strategy and satisfy the request,
  /// reaching the network through `fetch` when the strategy calls for it.
  pub async fn handle<F, Fut>(&self, request: Request, fetch: F) -> Result<Served, CacheError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response, CacheError>>,
  {
    match self.route(&request) {
      Strategy::Passthrough => {
        debug!(url = %request.url, "passthrough");
        fetch().await.map(Served::passthrough)
      }
      Strategy::CacheFirst => self.cache_first(&request, fetch).await,
      Strategy::NetworkFirst => self.network_first(&request, fetch).await,
    }
  }

  /// Cache-first: serve a cached entry without touching the network; on a
  /// miss, fetch and write through 2xx responses; on network failure with
  /// nothing cached, fall back to the offline page if that is cached.
  async fn cache_first<F, Fut>(&self, request: &Request, fetch: F) -> Result<Served, CacheError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response, CacheError>>,
  {
    let generation = self.generations_snapshot().static_gen;

    if let Some(cached) = self.store.get(&generation, request)? {
      debug!(url = %request.url, generation = %generation, "cache-first hit");
      return Ok(Served::from_cache(cached.response));
    }

    match fetch().await {
      Ok(response) => {
        if response.is_success() {
          self.store.put(&generation, request, &response)?;
        }
        Ok(Served::from_network(response))
      }
      Err(err) => {
        warn!(url = %request.url, error = %err, "cache-first fetch failed");
        if let Some(fallback) = self.offline_fallback_request() {
          if let Some(cached) = self.store.get(&generation, &fallback)? {
            return Ok(Served::offline_fallback(cached.response));
          }
        }
        Err(err)
      }
    }
  }

  /// Network-first: fetch, writing 2xx responses through to the runtime
  /// generation; on network failure, serve the stale runtime entry for this
  /// request if one exists.
  async fn network_first<F, Fut>(&self, request: &Request, fetch: F) -> Result<Served, CacheError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response, CacheError>>,
  {
    let runtime = self.generations_snapshot().runtime;

    match fetch().await {
      Ok(response) => {
        if response.is_success() {
          self.store.put(&runtime, request, &response)?;
        }
        Ok(Served::from_network(response))
      }
      Err(err) => {
        warn!(url = %request.url, error = %err, "network-first fetch failed");
        match self.store.get(&runtime, request)? {
          Some(cached) => Ok(Served::from_cache(cached.response)),
          None => Err(err),
        }
      }
    }
  }

  fn matches_network_first_host(&self, url: &Url) -> bool {
    let Some(host) = url.host_str() else {
      return false;
    };
    self
      .network_first_hosts
      .iter()
      .any(|pattern| host == pattern || host.ends_with(&format!(".{}", pattern)))
  }

  fn offline_fallback_request(&self) -> Option<Request> {
    let path = self.offline_fallback.as_deref()?;
    self.origin.join(path).ok().map(Request::get)
  }

  fn generations_snapshot(&self) -> Generations {
    match self.generations.read() {
      Ok(guard) => guard.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }
}
