mod cache;
mod config;
mod error;
mod lifecycle;
mod net;
mod store;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::info;
use url::Url;

use cache::{CacheController, Generations, Request, ServeSource, SqliteResponseStore};
use config::Config;
use lifecycle::Lifecycle;
use net::HttpFetcher;
use store::{MovieRecord, ObjectStore, SqliteBackend};

#[derive(Parser, Debug)]
#[command(name = "mbx")]
#[command(about = "Offline cache and local storage core for MovieBox")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/moviebox/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Save a movie to my list
  Add {
    id: u64,
    title: String,
    #[arg(long)]
    rating: Option<f64>,
    #[arg(long)]
    year: Option<String>,
    #[arg(long)]
    poster: Option<String>,
  },
  /// Remove a movie from my list
  Remove { id: u64 },
  /// Show my list
  List,
  /// Record a movie as watched
  Watched { id: u64, title: String },
  /// Show watch history
  History,
  /// Get or set a preference
  Pref {
    key: String,
    /// New value (JSON or bare string); omit to read
    value: Option<String>,
  },
  /// Install the static cache generation from the manifest
  Install {
    /// Leave the new generation waiting instead of activating it
    #[arg(long)]
    no_activate: bool,
  },
  /// Promote a waiting cache generation and purge stale ones
  Activate,
  /// Route one request through the cache controller
  Fetch {
    url: Url,
    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,
  },
  /// Show cache generations currently holding entries
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  match args.command {
    Command::Add {
      id,
      title,
      rating,
      year,
      poster,
    } => {
      let store = open_store(&config);
      let movie = MovieRecord {
        vote_average: rating,
        release_date: year,
        poster_path: poster,
        ..MovieRecord::new(id, title)
      };
      let item = store.add_item(movie).await?;
      println!("added {} ({})", item.movie.title, item.movie.id);
    }

    Command::Remove { id } => {
      let store = open_store(&config);
      if store.remove_item(id).await? {
        println!("removed {}", id);
      } else {
        println!("{} was not in my list", id);
      }
    }

    Command::List => {
      let store = open_store(&config);
      let items = store.list_items().await?;
      if items.is_empty() {
        println!("my list is empty");
      }
      for item in items {
        println!(
          "{:>8}  {}  (added {})",
          item.movie.id,
          item.movie.title,
          item.added_at.format("%Y-%m-%d")
        );
      }
    }

    Command::Watched { id, title } => {
      let store = open_store(&config);
      let entry = store.record_watched(MovieRecord::new(id, title)).await?;
      println!("recorded {} as watched", entry.movie.title);
    }

    Command::History => {
      let store = open_store(&config);
      for entry in store.watch_history().await? {
        println!(
          "{:>8}  {}  (watched {})",
          entry.movie.id,
          entry.movie.title,
          entry.watched_at.format("%Y-%m-%d %H:%M")
        );
      }
    }

    Command::Pref { key, value } => {
      let store = open_store(&config);
      match value {
        Some(raw) => {
          // Accept JSON, fall back to a bare string
          let value: serde_json::Value =
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));
          store.set_preference(&key, &value).await?;
          println!("set {}", key);
        }
        None => {
          let value: serde_json::Value = store
            .get_preference(&key, serde_json::Value::Null)
            .await?;
          println!("{}", value);
        }
      }
    }

    Command::Install { no_activate } => {
      let (lifecycle, _) = open_cache(&config)?;
      let fetcher = HttpFetcher::new()?;
      let name = lifecycle
        .install(&config.cache.version, |request| {
          let fetcher = fetcher.clone();
          async move { fetcher.fetch(&request).await }
        })
        .await?;
      println!("installed {}", name);
      if !no_activate {
        lifecycle.activate()?;
        println!("activated {}", name);
      }
    }

    Command::Activate => {
      let (lifecycle, _) = open_cache(&config)?;
      lifecycle.skip_waiting()?;
      println!("activated");
    }

    Command::Fetch { url, navigate } => {
      let (_, controller) = open_cache(&config)?;
      let fetcher = HttpFetcher::new()?;
      let request = if navigate {
        Request::navigate(url)
      } else {
        Request::get(url)
      };
      let fetch = {
        let fetcher = fetcher.clone();
        let request = request.clone();
        move || async move { fetcher.fetch(&request).await }
      };
      let served = controller.handle(request, fetch).await?;
      let source = match served.source {
        ServeSource::Network => "network",
        ServeSource::Cache => "cache",
        ServeSource::OfflineFallback => "offline fallback",
        ServeSource::Passthrough => "passthrough",
      };
      info!(status = served.response.status, source, "request served");
      println!(
        "{} {} bytes via {}",
        served.response.status,
        served.response.body.len(),
        source
      );
    }

    Command::Status => {
      use cache::ResponseStore as _;
      let response_store = open_response_store(&config)?;
      for generation in response_store.generations()? {
        println!("{}", generation);
      }
    }
  }

  Ok(())
}

fn open_store(config: &Config) -> ObjectStore<SqliteBackend> {
  match &config.storage.path {
    Some(path) => ObjectStore::at(path.clone()),
    None => ObjectStore::at_default_path(),
  }
}

fn open_response_store(config: &Config) -> Result<SqliteResponseStore> {
  let store = match &config.cache.path {
    Some(path) => SqliteResponseStore::open(path)?,
    None => SqliteResponseStore::open(&SqliteResponseStore::default_path()?)?,
  };
  Ok(store)
}

fn open_cache(
  config: &Config,
) -> Result<(
  Lifecycle<SqliteResponseStore>,
  CacheController<SqliteResponseStore>,
)> {
  let store = Arc::new(open_response_store(config)?);
  let generations = Arc::new(RwLock::new(Generations::for_version(&config.cache.version)));

  let mut controller = CacheController::new(
    Arc::clone(&store),
    config.origin.clone(),
    Arc::clone(&generations),
  )
  .with_network_first_hosts(config.cache.network_first_hosts.clone());
  if let Some(fallback) = &config.cache.offline_fallback {
    controller = controller.with_offline_fallback(fallback.clone());
  }

  let lifecycle = Lifecycle::new(
    store,
    config.origin.clone(),
    config.cache.manifest.clone(),
    generations,
  );

  Ok((lifecycle, controller))
}
