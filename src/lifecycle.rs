//! Lifecycle manager for cache generations: installs the static generation
//! from the fixed manifest and retires stale generations on activation.

use futures::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tracing::{info, warn};
use url::Url;

use crate::cache::{static_generation_name, Generations, Request, Response, ResponseStore};
use crate::error::CacheError;

/// Lifecycle of a cache generation.
///
/// `Installing -> Installed` completes only after every manifest URL has
/// been fetched and stored; a failed install makes the generation
/// `Redundant` without touching the active one. `Active` generations serve
/// all subsequent interceptions; retired generations become `Redundant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Installing,
  Installed,
  Activating,
  Active,
  Redundant,
}

/// Installs new static generations and promotes them, purging every cache
/// generation that is neither the active static generation nor the runtime
/// generation.
pub struct Lifecycle<S: ResponseStore> {
  store: Arc<S>,
  origin: Url,
  /// Root-relative paths cached verbatim at install time.
  manifest: Vec<String>,
  /// Shared with the cache controller; flipping it claims in-flight pages
  /// immediately.
  generations: Arc<RwLock<Generations>>,
  states: Mutex<HashMap<String, WorkerState>>,
  waiting: Mutex<Option<String>>,
  update_tx: watch::Sender<Option<String>>,
}

impl<S: ResponseStore> Lifecycle<S> {
  pub fn new(
    store: Arc<S>,
    origin: Url,
    manifest: Vec<String>,
    generations: Arc<RwLock<Generations>>,
  ) -> Self {
    let (update_tx, _) = watch::channel(None);
    Self {
      store,
      origin,
      manifest,
      generations,
      states: Mutex::new(HashMap::new()),
      waiting: Mutex::new(None),
      update_tx,
    }
  }

  /// Install the static generation for `version`: fetch every manifest URL
  /// and store the responses, all or nothing. On success the generation is
  /// `Installed` and waits for [`Lifecycle::activate`]; if it differs from
  /// the active generation an update-available signal is raised.
  ///
  /// Any fetch error or non-2xx manifest response aborts the install: the
  /// generation is marked `Redundant`, partial writes are purged, and the
  /// previously active generation keeps serving.
  pub async fn install<F, Fut>(&self, version: &str, fetch: F) -> Result<String, CacheError>
  where
    F: Fn(Request) -> Fut,
    Fut: Future<Output = Result<Response, CacheError>>,
  {
    let name = static_generation_name(version);
    self.set_state(&name, WorkerState::Installing);
    info!(generation = %name, urls = self.manifest.len(), "installing cache generation");

    let mut requests = Vec::with_capacity(self.manifest.len());
    for path in &self.manifest {
      let url = self.origin.join(path).map_err(|e| {
        self.set_state(&name, WorkerState::Redundant);
        CacheError::ManifestInstall {
          url: path.clone(),
          reason: format!("invalid manifest path: {}", e),
        }
      })?;
      requests.push(Request::get(url));
    }

    let results = join_all(requests.iter().map(|r| fetch(r.clone()))).await;

    let mut staged = Vec::with_capacity(requests.len());
    for (request, result) in requests.iter().zip(results) {
      match result {
        Ok(response) if response.is_success() => staged.push((request, response)),
        Ok(response) => {
          warn!(url = %request.url, status = response.status, "manifest fetch not cacheable");
          self.set_state(&name, WorkerState::Redundant);
          return Err(CacheError::ManifestInstall {
            url: request.url.to_string(),
            reason: format!("unexpected status {}", response.status),
          });
        }
        Err(e) => {
          warn!(url = %request.url, error = %e, "manifest fetch failed");
          self.set_state(&name, WorkerState::Redundant);
          return Err(CacheError::ManifestInstall {
            url: request.url.to_string(),
            reason: e.to_string(),
          });
        }
      }
    }

    for (request, response) in &staged {
      if let Err(e) = self.store.put(&name, request, response) {
        // Purge partial writes so the aborted generation holds nothing
        let _ = self.store.delete_generation(&name);
        self.set_state(&name, WorkerState::Redundant);
        return Err(CacheError::ManifestInstall {
          url: request.url.to_string(),
          reason: e.to_string(),
        });
      }
    }

    self.set_state(&name, WorkerState::Installed);
    *lock(&self.waiting) = Some(name.clone());

    if self.active_generation() != name {
      info!(generation = %name, "update available, waiting for activation");
      self.update_tx.send_replace(Some(name.clone()));
    }

    Ok(name)
  }

  /// Promote the waiting generation: claim in-flight pages by flipping the
  /// shared generation handle, then delete every cache generation that is
  /// neither the new static generation nor the runtime generation. A no-op
  /// when nothing is waiting.
  pub fn activate(&self) -> Result<(), CacheError> {
    let Some(name) = lock(&self.waiting).take() else {
      return Ok(());
    };

    self.set_state(&name, WorkerState::Activating);
    info!(generation = %name, "activating cache generation");

    let previous = {
      let mut guard = match self.generations.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
      };
      let previous = guard.static_gen.clone();
      guard.static_gen = name.clone();
      previous
    };

    for generation in self.store.generations()? {
      if generation != name && generation != Generations::RUNTIME {
        info!(generation = %generation, "deleting stale cache generation");
        self.store.delete_generation(&generation)?;
        self.set_state(&generation, WorkerState::Redundant);
      }
    }
    if previous != name {
      self.set_state(&previous, WorkerState::Redundant);
    }

    self.set_state(&name, WorkerState::Active);
    self.update_tx.send_replace(None);
    Ok(())
  }

  /// Manual "activate the new version now" signal, so a waiting generation
  /// is promoted without waiting for all pages to close.
  pub fn skip_waiting(&self) -> Result<(), CacheError> {
    self.activate()
  }

  /// Watch for update-available signals: `Some(generation)` while a newer
  /// generation is installed and waiting, `None` once activated.
  pub fn updates(&self) -> watch::Receiver<Option<String>> {
    self.update_tx.subscribe()
  }

  /// The lifecycle state of a generation, if it has been seen.
  pub fn state_of(&self, generation: &str) -> Option<WorkerState> {
    lock(&self.states).get(generation).copied()
  }

  fn active_generation(&self) -> String {
    match self.generations.read() {
      Ok(guard) => guard.static_gen.clone(),
      Err(poisoned) => poisoned.into_inner().static_gen.clone(),
    }
  }

  fn set_state(&self, generation: &str, state: WorkerState) {
    lock(&self.states).insert(generation.to_string(), state);
  }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  match mutex.lock() {
    Ok(guard) => guard,
    Err(poisoned) => poisoned.into_inner(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteResponseStore;

  const MANIFEST: [&str; 3] = ["/index.html", "/css/main_styles.css", "/js/main.js"];

  fn origin() -> Url {
    "https://moviebox.example/".parse().unwrap()
  }

  fn lifecycle(
    version: &str,
  ) -> (
    Lifecycle<SqliteResponseStore>,
    Arc<SqliteResponseStore>,
    Arc<RwLock<Generations>>,
  ) {
    let store = Arc::new(SqliteResponseStore::open_in_memory().unwrap());
    let generations = Arc::new(RwLock::new(Generations::for_version(version)));
    let lifecycle = Lifecycle::new(
      Arc::clone(&store),
      origin(),
      MANIFEST.iter().map(|s| s.to_string()).collect(),
      Arc::clone(&generations),
    );
    (lifecycle, store, generations)
  }

  /// Fetcher serving every path with a 200 echoing the path.
  async fn ok_fetch(request: Request) -> Result<Response, CacheError> {
    Ok(Response::new(200, request.url.path().as_bytes().to_vec()))
  }

  #[tokio::test]
  async fn test_install_populates_every_manifest_url() {
    let (lifecycle, store, _) = lifecycle("1.0.0");

    let name = lifecycle.install("1.0.0", ok_fetch).await.unwrap();
    assert_eq!(name, "moviebox-v1.0.0");
    assert_eq!(lifecycle.state_of(&name), Some(WorkerState::Installed));

    for path in MANIFEST {
      let request = Request::get(origin().join(path).unwrap());
      let cached = store.get(&name, &request).unwrap().unwrap();
      assert_eq!(cached.response.body, path.as_bytes());
    }
  }

  #[tokio::test]
  async fn test_failed_manifest_fetch_aborts_install() {
    let (lifecycle, store, generations) = lifecycle("1.0.0");

    let result = lifecycle
      .install("2.0.0", |request| async move {
        if request.url.path() == "/js/main.js" {
          Err(CacheError::Network {
            url: request.url.to_string(),
            reason: "connection reset".to_string(),
          })
        } else {
          ok_fetch(request).await
        }
      })
      .await;

    assert!(matches!(result, Err(CacheError::ManifestInstall { .. })));
    assert_eq!(
      lifecycle.state_of("moviebox-v2.0.0"),
      Some(WorkerState::Redundant)
    );
    // Nothing written for the aborted generation; the old one stays active
    assert!(!store
      .generations()
      .unwrap()
      .contains(&"moviebox-v2.0.0".to_string()));
    assert_eq!(generations.read().unwrap().static_gen, "moviebox-v1.0.0");
  }

  #[tokio::test]
  async fn test_non_success_manifest_response_aborts_install() {
    let (lifecycle, store, _) = lifecycle("1.0.0");

    let result = lifecycle
      .install("2.0.0", |request| async move {
        if request.url.path() == "/css/main_styles.css" {
          Ok(Response::new(404, vec![]))
        } else {
          ok_fetch(request).await
        }
      })
      .await;

    assert!(matches!(result, Err(CacheError::ManifestInstall { .. })));
    assert!(store.generations().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_activate_purges_stale_generations_keeps_runtime() {
    let (lifecycle, store, generations) = lifecycle("1.0.0");

    // Old static generation and some runtime traffic
    lifecycle.install("1.0.0", ok_fetch).await.unwrap();
    lifecycle.activate().unwrap();
    let api = Request::get("https://api.tmdb.org/3/movie/popular".parse().unwrap());
    store
      .put(Generations::RUNTIME, &api, &Response::new(200, b"{}".to_vec()))
      .unwrap();

    // New version arrives
    lifecycle.install("2.0.0", ok_fetch).await.unwrap();
    lifecycle.activate().unwrap();

    assert_eq!(generations.read().unwrap().static_gen, "moviebox-v2.0.0");
    let remaining = store.generations().unwrap();
    assert!(remaining.contains(&"moviebox-v2.0.0".to_string()));
    assert!(remaining.contains(&Generations::RUNTIME.to_string()));
    assert!(!remaining.contains(&"moviebox-v1.0.0".to_string()));

    assert_eq!(
      lifecycle.state_of("moviebox-v1.0.0"),
      Some(WorkerState::Redundant)
    );
    assert_eq!(
      lifecycle.state_of("moviebox-v2.0.0"),
      Some(WorkerState::Active)
    );
  }

  #[tokio::test]
  async fn test_update_signal_raised_and_cleared() {
    let (lifecycle, _, _) = lifecycle("1.0.0");
    let updates = lifecycle.updates();

    // Same version as active: no update signal
    lifecycle.install("1.0.0", ok_fetch).await.unwrap();
    assert_eq!(*updates.borrow(), None);

    lifecycle.install("2.0.0", ok_fetch).await.unwrap();
    assert_eq!(updates.borrow().as_deref(), Some("moviebox-v2.0.0"));

    lifecycle.skip_waiting().unwrap();
    assert_eq!(*updates.borrow(), None);
  }

  #[tokio::test]
  async fn test_activate_without_waiting_is_noop() {
    let (lifecycle, _, generations) = lifecycle("1.0.0");
    lifecycle.activate().unwrap();
    assert_eq!(generations.read().unwrap().static_gen, "moviebox-v1.0.0");
  }
}
