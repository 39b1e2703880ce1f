/// Engine configuration
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_server")]
    pub server: ServerSettings,

    #[serde(default = "default_cache")]
    pub cache: CacheSettings,

    #[serde(default = "default_remote")]
    pub remote: RemoteSettings,

    #[serde(default = "default_local")]
    pub local: LocalSettings,

    #[serde(default)]
    pub enrichment: EnrichmentSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    /// Base URL of the resolution/metadata REST service
    #[serde(default = "default_server_url")]
    pub url: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default = "default_resolve_timeout_secs")]
    pub resolve_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSettings {
    /// Directory holding the persisted key/value store; memory-only when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_stream_horizon_days")]
    pub stream_horizon_days: i64,

    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,

    #[serde(default = "default_image_horizon_days")]
    pub image_horizon_days: i64,

    #[serde(default = "default_image_capacity")]
    pub image_capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_end_debounce_ms")]
    pub end_debounce_ms: u64,

    #[serde(default = "default_autoplay_retry_ms")]
    pub autoplay_retry_ms: u64,

    /// Seeks closer than this to the reported position are ignored
    #[serde(default = "default_seek_threshold_secs")]
    pub seek_threshold_secs: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalSettings {
    #[serde(default = "default_can_play_timeout_ms")]
    pub can_play_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EnrichmentSettings {
    /// Artists whose imagery is always fetched fresh
    #[serde(default)]
    pub force_refresh_artists: Vec<String>,
}

impl EngineConfig {
    /// Load configuration from an optional TOML file and the environment.
    ///
    /// Environment variables are prefixed with `TANDEM` and use `__` between
    /// sections, e.g. `TANDEM_SERVER__URL`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        if let Some(path) = path {
            settings = settings.add_source(config::File::from(path.to_path_buf()).required(true));
        } else {
            let default_path = PathBuf::from("tandem.toml");
            if default_path.exists() {
                settings = settings.add_source(config::File::from(default_path));
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix("TANDEM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.server.url.starts_with("http://") && !self.server.url.starts_with("https://") {
            return Err(CoreError::config(format!(
                "server.url must start with http:// or https:// (got {:?})",
                self.server.url
            )));
        }

        if self.server.resolve_timeout_secs == 0 {
            return Err(CoreError::config("server.resolve_timeout_secs must be > 0"));
        }

        if self.cache.stream_capacity == 0 || self.cache.image_capacity == 0 {
            return Err(CoreError::config("cache capacities must be > 0"));
        }

        if self.cache.stream_horizon_days <= 0 || self.cache.image_horizon_days <= 0 {
            return Err(CoreError::config("cache horizons must be > 0 days"));
        }

        if self.remote.poll_interval_ms == 0 {
            return Err(CoreError::config("remote.poll_interval_ms must be > 0"));
        }

        if !self.remote.seek_threshold_secs.is_finite() || self.remote.seek_threshold_secs < 0.0 {
            return Err(CoreError::config(
                "remote.seek_threshold_secs must be a non-negative number",
            ));
        }

        Ok(())
    }

    /// Path of the persisted key/value store, if persistence is enabled
    pub fn store_path(&self) -> Option<PathBuf> {
        self.cache
            .data_dir
            .as_ref()
            .map(|dir| dir.join("tandem-store.json"))
    }
}

impl ServerSettings {
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }
}

impl RemoteSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn end_debounce(&self) -> Duration {
        Duration::from_millis(self.end_debounce_ms)
    }

    pub fn autoplay_retry(&self) -> Duration {
        Duration::from_millis(self.autoplay_retry_ms)
    }
}

impl LocalSettings {
    pub fn can_play_timeout(&self) -> Duration {
        Duration::from_millis(self.can_play_timeout_ms)
    }
}

// Default values
fn default_server() -> ServerSettings {
    ServerSettings {
        url: default_server_url(),
        access_token: None,
        resolve_timeout_secs: default_resolve_timeout_secs(),
    }
}

fn default_server_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_resolve_timeout_secs() -> u64 {
    15
}

fn default_cache() -> CacheSettings {
    CacheSettings {
        data_dir: None,
        stream_horizon_days: default_stream_horizon_days(),
        stream_capacity: default_stream_capacity(),
        image_horizon_days: default_image_horizon_days(),
        image_capacity: default_image_capacity(),
    }
}

fn default_stream_horizon_days() -> i64 {
    7
}

fn default_stream_capacity() -> usize {
    100
}

fn default_image_horizon_days() -> i64 {
    3
}

fn default_image_capacity() -> usize {
    50
}

fn default_remote() -> RemoteSettings {
    RemoteSettings {
        poll_interval_ms: default_poll_interval_ms(),
        end_debounce_ms: default_end_debounce_ms(),
        autoplay_retry_ms: default_autoplay_retry_ms(),
        seek_threshold_secs: default_seek_threshold_secs(),
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_end_debounce_ms() -> u64 {
    100
}

fn default_autoplay_retry_ms() -> u64 {
    800
}

fn default_seek_threshold_secs() -> f64 {
    2.0
}

fn default_local() -> LocalSettings {
    LocalSettings {
        can_play_timeout_ms: default_can_play_timeout_ms(),
    }
}

fn default_can_play_timeout_ms() -> u64 {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            cache: default_cache(),
            remote: default_remote(),
            local: default_local(),
            enrichment: EnrichmentSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_engine_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.server.resolve_timeout(), Duration::from_secs(15));
        assert_eq!(config.cache.stream_horizon_days, 7);
        assert_eq!(config.cache.stream_capacity, 100);
        assert_eq!(config.cache.image_horizon_days, 3);
        assert_eq!(config.cache.image_capacity, 50);
        assert_eq!(config.remote.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.remote.end_debounce(), Duration::from_millis(100));
        assert_eq!(config.remote.autoplay_retry(), Duration::from_millis(800));
        assert_eq!(config.remote.seek_threshold_secs, 2.0);
        assert_eq!(config.local.can_play_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
        assert!(config.store_path().is_none());
    }

    #[test]
    fn load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
url = "https://music.example.com"
access_token = "abc"

[cache]
data_dir = "/tmp/tandem"
stream_capacity = 10

[enrichment]
force_refresh_artists = ["Björk"]
"#
        )
        .unwrap();

        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.url, "https://music.example.com");
        assert_eq!(config.server.access_token.as_deref(), Some("abc"));
        assert_eq!(config.cache.stream_capacity, 10);
        assert_eq!(config.cache.image_capacity, 50);
        assert_eq!(
            config.store_path(),
            Some(PathBuf::from("/tmp/tandem/tandem-store.json"))
        );
        assert_eq!(config.enrichment.force_refresh_artists, vec!["Björk"]);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.server.url = "ftp://nope".into();
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));

        let mut config = EngineConfig::default();
        config.server.resolve_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.cache.image_capacity = 0;
        assert!(config.validate().is_err());
    }
}
