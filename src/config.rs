use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the app is served from; same-origin requests are eligible for
  /// interception.
  pub origin: Url,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Release version; names the static cache generation.
  pub version: String,
  /// Root-relative paths cached verbatim at install time. Every path must
  /// be fetchable or the install aborts.
  pub manifest: Vec<String>,
  /// Page served when a cache-first request fails with nothing cached.
  pub offline_fallback: Option<String>,
  /// Cross-origin host patterns routed network-first (API and image hosts).
  pub network_first_hosts: Vec<String>,
  /// Response cache database path (defaults under the platform data dir).
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Object store database path (defaults under the platform data dir).
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: "1.0.0".to_string(),
      manifest: [
        "/",
        "/index.html",
        "/main.html",
        "/movies.html",
        "/tvshows.html",
        "/popular.html",
        "/mylist.html",
        "/auth.html",
        "/css/main_styles.css",
        "/js/main.js",
        "/images/ghprofit.ico",
        "/manifest.json",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      offline_fallback: Some("/index.html".to_string()),
      network_first_hosts: vec!["tmdb.org".to_string(), "unsplash.com".to_string()],
      path: None,
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      // Never dereferenced unless a command actually goes to the network
      origin: Url::parse("https://moviebox.example").expect("static origin"),
      cache: CacheConfig::default(),
      storage: StorageConfig::default(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./moviebox.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/moviebox/config.yaml
  ///
  /// Falls back to built-in defaults when no file exists; everything works
  /// without a config file.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("moviebox.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("moviebox").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_full_config() {
    let yaml = r#"
origin: "https://movies.ghprofit.io"
cache:
  version: "2.1.0"
  manifest:
    - "/"
    - "/index.html"
  offline_fallback: "/index.html"
  network_first_hosts:
    - "tmdb.org"
storage:
  path: "/tmp/moviebox/store.db"
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.origin.as_str(), "https://movies.ghprofit.io/");
    assert_eq!(config.cache.version, "2.1.0");
    assert_eq!(config.cache.manifest.len(), 2);
    assert_eq!(
      config.storage.path.as_deref(),
      Some(Path::new("/tmp/moviebox/store.db"))
    );
  }

  #[test]
  fn test_missing_sections_use_defaults() {
    let config: Config = serde_yaml::from_str("origin: \"https://moviebox.example\"\n").unwrap();
    assert_eq!(config.cache.version, "1.0.0");
    assert!(config.cache.manifest.contains(&"/index.html".to_string()));
    assert_eq!(config.cache.offline_fallback.as_deref(), Some("/index.html"));
    assert!(config.storage.path.is_none());
  }
}
