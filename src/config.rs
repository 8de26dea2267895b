use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the worker serves, e.g. "https://eneplus.example"
  pub origin: String,
  /// Current cache generation tag
  pub cache_name: String,
  /// Document served to navigations when offline
  pub offline_url: String,
  /// Assets stored at install time, relative to `origin`
  pub precache: Vec<String>,
  /// Brand name, used as the notification title
  pub brand: String,
  pub sync: SyncConfig,
  pub push: PushConfig,
  /// Where the cache and queue databases live (default: $XDG_DATA_HOME/offcache)
  pub data_dir: Option<PathBuf>,
  /// Default log filter when RUST_LOG is unset
  pub log_level: String,
  /// Also write logs to daily files in this directory
  pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Background-sync tag that triggers submission replay
  pub tag: String,
  /// Endpoint queued contact submissions are POSTed to
  pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PushConfig {
  /// Body used when a push message carries no text
  pub default_body: String,
  pub icon: String,
  pub badge: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080".to_string(),
      cache_name: "eneplus-v1.0.0".to_string(),
      offline_url: "/offline.html".to_string(),
      precache: [
        "/",
        "/o-nama/",
        "/nase-usluge/",
        "/kontakt/",
        "/assets/css/main.css",
        "/assets/js/main.js",
        "/offline.html",
        "/assets/images/hero-image.jpg",
        "/assets/images/about-image.jpg",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      brand: "ENEPLUS".to_string(),
      sync: SyncConfig::default(),
      push: PushConfig::default(),
      data_dir: None,
      log_level: "info".to_string(),
      log_dir: None,
    }
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: "contact-form".to_string(),
      endpoint: "/contact".to_string(),
    }
  }
}

impl Default for PushConfig {
  fn default() -> Self {
    Self {
      default_body: "Nova poruka od ENEPLUS".to_string(),
      icon: "/assets/images/icon-192.png".to_string(),
      badge: "/assets/images/badge-72.png".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file, falling back to built-in defaults.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offcache/config.yaml
  ///
  /// `OFFCACHE_ORIGIN` overrides the configured origin.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(origin) = std::env::var("OFFCACHE_ORIGIN") {
      config.origin = origin;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  fn validate(&self) -> Result<()> {
    let origin = self.origin_url()?;
    if !matches!(origin.scheme(), "http" | "https") {
      return Err(eyre!("Origin must be http or https, got {}", self.origin));
    }
    if self.cache_name.trim().is_empty() {
      return Err(eyre!("cache_name must not be empty"));
    }
    for path in &self.precache {
      self.resolve(path)?;
    }
    self.resolve(&self.offline_url)?;
    self.resolve(&self.sync.endpoint)?;
    Ok(())
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Resolve a site path (or absolute URL) against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(path)
      .map_err(|e| eyre!("Invalid URL '{}': {}", path, e))
  }

  /// Directory holding the databases.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offcache"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_match_site() {
    let config = Config::default();
    assert_eq!(config.cache_name, "eneplus-v1.0.0");
    assert_eq!(config.precache.len(), 9);
    assert!(config.precache.contains(&config.offline_url));
    assert_eq!(config.sync.tag, "contact-form");
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::from_yaml(
      "origin: https://eneplus.example\ncache_name: eneplus-v2\nsync:\n  endpoint: /api/contact\n",
    )
    .unwrap();
    assert_eq!(config.cache_name, "eneplus-v2");
    assert_eq!(config.sync.endpoint, "/api/contact");
    assert_eq!(config.sync.tag, "contact-form");
    assert_eq!(config.offline_url, "/offline.html");
  }

  #[test]
  fn test_resolve_against_origin() {
    let config = Config {
      origin: "https://eneplus.example".to_string(),
      ..Config::default()
    };
    assert_eq!(
      config.resolve("/kontakt/").unwrap().as_str(),
      "https://eneplus.example/kontakt/"
    );
  }

  #[test]
  fn test_origin_env_overrides_file() {
    let path = std::env::temp_dir().join(format!("offcache-test-{}.yaml", std::process::id()));
    std::fs::write(&path, "origin: https://eneplus.example\ncache_name: eneplus-v2\n").unwrap();

    std::env::set_var("OFFCACHE_ORIGIN", "https://staging.eneplus.example");
    let overridden = Config::load(Some(&path));
    std::env::set_var("OFFCACHE_ORIGIN", "ftp://eneplus.example");
    let invalid = Config::load(Some(&path));
    std::env::remove_var("OFFCACHE_ORIGIN");
    let plain = Config::load(Some(&path));
    std::fs::remove_file(&path).unwrap();

    let overridden = overridden.unwrap();
    assert_eq!(overridden.origin, "https://staging.eneplus.example");
    assert_eq!(overridden.cache_name, "eneplus-v2");
    assert!(invalid.is_err());
    assert_eq!(plain.unwrap().origin, "https://eneplus.example");
  }

  #[test]
  fn test_missing_explicit_config_is_an_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/offcache.yaml"))).is_err());
  }

  #[test]
  fn test_rejects_non_http_origin() {
    let config = Config {
      origin: "file:///tmp/site".to_string(),
      ..Config::default()
    };
    assert!(config.validate().is_err());
  }
}
