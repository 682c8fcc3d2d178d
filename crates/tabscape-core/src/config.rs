use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tabscape_api::{reddit, brainyquote, RetryConfig};
use tabscape_cache::CacheOptions;

/// Main configuration structure
///
/// Loaded once at startup from an explicit path, the default location, or
/// defaults, in that order. Nothing here changes while the caches run.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub images: ImageSourceConfig,
    pub quotes: QuoteSourceConfig,
    pub http: HttpConfig,
}

impl Config {
    /// Load config from `path`, or the default location if none was given
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::config_path()?;
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        toml::from_str(contents)
            .map_err(|e| crate::Error::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Get the config file path
    /// Uses XDG on Linux, Application Support on macOS, AppData on Windows
    pub fn config_path() -> crate::Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| crate::Error::ConfigError("Could not find config directory".into()))?
            .join("tabscape");

        Ok(config_dir.join("config.toml"))
    }

    pub fn validate(&self) -> crate::Result<()> {
        let checks = [
            (self.images.refresh_interval_ms == 0, "images.refresh_interval_ms must be positive"),
            (self.images.listing_limit == 0, "images.listing_limit must be positive"),
            (self.images.download_limit == 0, "images.download_limit must be positive"),
            (self.quotes.refresh_interval_ms == 0, "quotes.refresh_interval_ms must be positive"),
            (self.quotes.max_quotes == 0, "quotes.max_quotes must be positive"),
            (self.http.read_timeout_ms == Some(0), "http.read_timeout_ms must be positive"),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(crate::Error::ConfigError((*message).to_string())),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageSourceConfig {
    /// How often the image cache checks whether it should refresh
    pub refresh_interval_ms: u64,

    /// Refresh once more than this many images were served since the last refresh
    pub hit_threshold: u64,

    /// Subreddit listing endpoint
    pub listing_url: String,

    /// Only images hosted under this prefix are used
    pub image_host: String,

    /// Posts requested per listing
    pub listing_limit: u32,

    /// Images downloaded and kept per refresh
    pub download_limit: usize,
}

impl Default for ImageSourceConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 4 * 60 * 60 * 1000,
            hit_threshold: reddit::DEFAULT_DOWNLOAD_LIMIT as u64,
            listing_url: "https://www.reddit.com/r/EarthPorn.json".to_string(),
            image_host: "https://i.redd.it/".to_string(),
            listing_limit: reddit::DEFAULT_LISTING_LIMIT,
            download_limit: reddit::DEFAULT_DOWNLOAD_LIMIT,
        }
    }
}

impl ImageSourceConfig {
    pub fn cache_options(&self, http: &HttpConfig) -> CacheOptions {
        http.apply(CacheOptions::new(
            "images",
            Duration::from_millis(self.refresh_interval_ms),
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuoteSourceConfig {
    pub refresh_interval_ms: u64,

    pub hit_threshold: u64,

    /// RSS feed with one quote per item
    pub feed_url: String,

    /// Feed items kept per refresh
    pub max_quotes: usize,
}

impl Default for QuoteSourceConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 2 * 60 * 60 * 1000,
            hit_threshold: 10,
            feed_url: "https://feeds.feedburner.com/brainyquote/QUOTEBR".to_string(),
            max_quotes: brainyquote::DEFAULT_MAX_QUOTES,
        }
    }
}

impl QuoteSourceConfig {
    pub fn cache_options(&self, http: &HttpConfig) -> CacheOptions {
        http.apply(CacheOptions::new(
            "quotes",
            Duration::from_millis(self.refresh_interval_ms),
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,

    /// Fail reads on an empty cache after this long. Unset waits for the
    /// next successful refresh, however long that takes.
    pub read_timeout_ms: Option<u64>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_retries: retry.max_retries,
            initial_delay_ms: retry.initial_delay_ms,
            max_delay_ms: retry.max_delay_ms,
            read_timeout_ms: None,
        }
    }
}

impl HttpConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay_ms: self.initial_delay_ms,
            max_delay_ms: self.max_delay_ms,
            ..RetryConfig::default()
        }
    }

    fn apply(&self, options: CacheOptions) -> CacheOptions {
        match self.read_timeout_ms {
            Some(ms) => options.with_read_timeout(Duration::from_millis(ms)),
            None => options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.quotes.refresh_interval_ms, 7_200_000);
        assert_eq!(config.quotes.hit_threshold, 10);
        assert_eq!(config.quotes.max_quotes, 5);
        assert_eq!(config.images.refresh_interval_ms, 14_400_000);
        assert_eq!(config.images.hit_threshold, 10);
        assert_eq!(config.images.listing_limit, 40);
        assert_eq!(config.images.download_limit, 10);
        assert_eq!(config.http.read_timeout_ms, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [quotes]
            refresh_interval_ms = 1000

            [http]
            read_timeout_ms = 5000
            "#,
        )
        .unwrap();

        assert_eq!(config.quotes.refresh_interval_ms, 1000);
        assert_eq!(config.quotes.hit_threshold, 10);
        assert_eq!(config.images, ImageSourceConfig::default());

        let options = config.quotes.cache_options(&config.http);
        assert_eq!(options.name, "quotes");
        assert_eq!(options.refresh_interval, Duration::from_millis(1000));
        assert_eq!(options.read_timeout, Some(Duration::from_millis(5000)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = Config::from_toml("[images]\nrefresh_interval_ms = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("images.refresh_interval_ms"));
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = Config::from_toml("[quotes\nnope").unwrap_err();
        assert!(matches!(err, crate::Error::ConfigError(_)));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        assert!(toml.contains("refresh_interval_ms"));
        assert!(toml.contains("feed_url"));
        assert_eq!(Config::from_toml(&toml).unwrap(), config);
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, crate::Error::IoError(_)));
    }
}
