//! Configuration management for realitytracker using the prefer crate.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::repository::DbContext;
use crate::scrapers::{FetchError, HttpClient, RateLimiter};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "reality.db";

/// Default event backend: the SQLite queue plus an in-process topic.
pub const DEFAULT_EVENT_BACKEND: &str = "database";

pub const DEFAULT_ZONE_PIPELINE_CRON: &str = "0 0 3 * * *";
pub const DEFAULT_REALITYMIX_CRON: &str = "0 0 6 1 * *";
pub const DEFAULT_MF_RENTAL_CRON: &str = "0 0 7 15 1,4,7,10 *";

/// Default ingestion interval for a source, in minutes.
pub fn default_interval_minutes(source: &str) -> u64 {
    match source {
        "sreality" => 30,
        "idnes" => 60,
        _ => 60,
    }
}

/// Resolved per-source scheduling settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub enabled: bool,
    pub interval_minutes: u64,
    /// Cap on listings fetched per portal category.
    pub max_listings: Option<usize>,
}

impl SourceSettings {
    fn defaults_for(source: &str) -> Self {
        Self {
            enabled: true,
            interval_minutes: default_interval_minutes(source),
            max_listings: None,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    pub database_url: Option<String>,
    /// User agent for HTTP requests; "impersonate" picks a browser agent.
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Minimum delay between requests to one domain, in milliseconds.
    pub page_delay_ms: u64,
    /// `database` or a `redis://` URL.
    pub event_backend: String,
    /// Per-source overrides keyed by source id.
    pub sources: BTreeMap<String, SourceSettings>,
    pub zone_pipeline_cron: String,
    pub realitymix_cron: String,
    pub mf_rental_cron: String,
    /// Fixed MF rental layer URL; discovered from the map page when unset.
    pub mf_rental_endpoint: Option<String>,
    pub telegram_bot_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to ~/Documents/reality/ for user data
        // Falls back gracefully: Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reality");

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            user_agent: None,
            request_timeout: 30,
            page_delay_ms: 1500,
            event_backend: DEFAULT_EVENT_BACKEND.to_string(),
            sources: BTreeMap::new(),
            zone_pipeline_cron: DEFAULT_ZONE_PIPELINE_CRON.to_string(),
            realitymix_cron: DEFAULT_REALITYMIX_CRON.to_string(),
            mf_rental_cron: DEFAULT_MF_RENTAL_CRON.to_string(),
            mf_rental_endpoint: None,
            telegram_bot_token: None,
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    /// Get the full path to the database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Check if the database appears to be initialized.
    pub fn database_exists(&self) -> bool {
        self.database_url.is_some() || self.database_path().exists()
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })
    }

    pub fn create_db_context(&self) -> DbContext {
        DbContext::from_url(&self.database_url())
    }

    /// Shared HTTP client with the configured pacing and timeout.
    pub fn http_client(&self) -> Result<HttpClient, FetchError> {
        HttpClient::new(
            Duration::from_secs(self.request_timeout),
            RateLimiter::new(Duration::from_millis(self.page_delay_ms)),
            self.user_agent.as_deref(),
        )
    }

    /// Settings for one source, falling back to defaults.
    pub fn source(&self, id: &str) -> SourceSettings {
        self.sources
            .get(id)
            .cloned()
            .unwrap_or_else(|| SourceSettings::defaults_for(id))
    }
}

/// Per-source section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_listings: Option<usize>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// User agent string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Delay between requests to one domain in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_delay_ms: Option<u64>,
    /// Event queue backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_backend: Option<String>,
    /// Source configurations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: BTreeMap<String, SourceConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_pipeline_cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realitymix_cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mf_rental_cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mf_rental_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_bot_token: Option<String>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers realitytracker config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("realitytracker").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("{}", e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            // No config file found
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, String> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e)),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.page_delay_ms {
            settings.page_delay_ms = delay;
        }
        if let Some(ref backend) = self.event_backend {
            settings.event_backend = backend.clone();
        }
        for (id, source) in &self.sources {
            let mut resolved = SourceSettings::defaults_for(id);
            if let Some(enabled) = source.enabled {
                resolved.enabled = enabled;
            }
            if let Some(minutes) = source.interval_minutes {
                resolved.interval_minutes = minutes;
            }
            resolved.max_listings = source.max_listings;
            settings.sources.insert(id.clone(), resolved);
        }
        if let Some(ref cron) = self.zone_pipeline_cron {
            settings.zone_pipeline_cron = cron.clone();
        }
        if let Some(ref cron) = self.realitymix_cron {
            settings.realitymix_cron = cron.clone();
        }
        if let Some(ref cron) = self.mf_rental_cron {
            settings.mf_rental_cron = cron.clone();
        }
        if let Some(ref endpoint) = self.mf_rental_endpoint {
            settings.mf_rental_endpoint = Some(endpoint.clone());
        }
        if let Some(ref token) = self.telegram_bot_token {
            settings.telegram_bot_token = Some(token.clone());
        }
    }

    /// Compute SHA-256 hash of the serialized config.
    pub fn hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Data directory (--data flag).
    pub data: Option<PathBuf>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    // Priority 1: Explicit --config flag, otherwise auto-discover via prefer
    let config = match options.config_path {
        Some(ref path) => match Config::load_from_path(path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}", e);
                Config::default()
            }
        },
        None => Config::load().await,
    };

    let mut settings = Settings::default();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = if options.use_cwd {
        cwd.clone()
    } else {
        config.base_dir().unwrap_or_else(|| cwd.clone())
    };
    config.apply_to_settings(&mut settings, &base_dir);

    // --data override takes precedence for data_dir
    if let Some(data) = options.data {
        settings.data_dir = if data.is_absolute() {
            data
        } else {
            cwd.join(data)
        };
    }

    // Environment variables take highest precedence
    if let Some(database_url) = env_var("DATABASE_URL") {
        tracing::debug!("Using DATABASE_URL from environment: {}", database_url);
        settings.database_url = Some(database_url);
    }
    if let Some(redis_url) = env_var("REDIS_URL") {
        tracing::debug!("Using REDIS_URL from environment as event backend");
        settings.event_backend = redis_url;
    }
    if let Some(token) = env_var("TELEGRAM_BOT_TOKEN") {
        settings.telegram_bot_token = Some(token);
    }

    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.source("sreality").interval_minutes, 30);
        assert_eq!(settings.source("idnes").interval_minutes, 60);
        assert!(settings.source("idnes").enabled);
        assert_eq!(settings.event_backend, "database");
    }

    #[test]
    fn test_toml_config_applies() {
        let raw = r#"
            data_dir = "state"
            page_delay_ms = 2000
            event_backend = "redis://localhost:6379"

            [sources.idnes]
            enabled = false

            [sources.sreality]
            interval_minutes = 15
            max_listings = 200
        "#;
        let config = Config::parse(raw, Path::new("reality.toml")).unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/srv/reality"));

        assert_eq!(settings.data_dir, PathBuf::from("/srv/reality/state"));
        assert_eq!(settings.page_delay_ms, 2000);
        assert_eq!(settings.event_backend, "redis://localhost:6379");
        assert!(!settings.source("idnes").enabled);
        assert_eq!(settings.source("idnes").interval_minutes, 60);
        assert_eq!(settings.source("sreality").interval_minutes, 15);
        assert_eq!(settings.source("sreality").max_listings, Some(200));
        assert_eq!(settings.realitymix_cron, DEFAULT_REALITYMIX_CRON);
    }

    #[test]
    fn test_yaml_and_json_configs_parse() {
        let yaml = "database: other.db\nmf_rental_endpoint: https://gis.example/arcgis/rest/services/x\n";
        let config = Config::parse(yaml, Path::new("c.yaml")).unwrap();
        assert_eq!(config.database.as_deref(), Some("other.db"));

        let json = r#"{"request_timeout": 10}"#;
        let config = Config::parse(json, Path::new("c.json")).unwrap();
        assert_eq!(config.request_timeout, Some(10));
    }

    #[test]
    fn test_hash_tracks_content() {
        let a = Config::default();
        let mut b = Config::default();
        assert_eq!(a.hash(), b.hash());
        b.page_delay_ms = Some(10);
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }
}
