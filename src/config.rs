//! Configuration management for mangafetch.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config directory.
const APP_NAME: &str = "mangafetch";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTML site (Baozimh) settings.
    pub baozimh: BaozimhConfig,

    /// CDN guessing settings.
    pub brute_force: BruteForceConfig,

    /// JSON API (MangaDex) settings.
    pub mangadex: MangaDexConfig,

    /// Web scraping settings.
    pub scraping: ScrapingConfig,

    /// File paths.
    pub paths: PathsConfig,
}

/// Settings for the HTML site and its app endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaozimhConfig {
    /// Public site root, also sent as Referer.
    pub base_url: String,

    /// Root of the mobile-app host serving unlocked chapter pages.
    pub app_endpoint_base: String,

    /// Referer sent to the app host.
    pub app_referer: String,

    /// Host used to absolutize relative image URLs.
    pub default_cdn: String,

    /// `scomic` root used when guessing image URLs.
    pub brute_force_cdn: String,

    /// A scrape yielding this many images or fewer is treated as
    /// placeholder content. This is a heuristic: genuinely short chapters
    /// also trip it.
    pub placeholder_threshold: usize,

    /// Timeout for public HTML pages in seconds.
    pub page_timeout_sec: u64,

    /// Timeout for the app endpoint in seconds.
    pub app_timeout_sec: u64,

    /// Timeout for each image download in seconds.
    pub image_timeout_sec: u64,
}

impl Default for BaozimhConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.baozimh.com".to_string(),
            app_endpoint_base: "https://appgb3.baozimh.com/baozimhapp".to_string(),
            app_referer: "https://appgb.baozimh.com/".to_string(),
            default_cdn: "https://s2.baozicdn.com".to_string(),
            brute_force_cdn: "https://s2.baozicdn.com/w640/scomic".to_string(),
            placeholder_threshold: 6,
            page_timeout_sec: 10,
            app_timeout_sec: 15,
            image_timeout_sec: 10,
        }
    }
}

impl BaozimhConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_sec)
    }

    pub fn app_timeout(&self) -> Duration {
        Duration::from_secs(self.app_timeout_sec)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_sec)
    }
}

/// Settings for sequential CDN URL guessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BruteForceConfig {
    /// First page index tried (1-based).
    pub start_index: u32,

    /// Last page index tried (inclusive).
    pub end_index: u32,

    /// Stop after this many indices in a row yield nothing.
    pub max_consecutive_failures: u32,

    /// Extensions tried per index, in priority order.
    pub extensions: Vec<String>,
}

impl Default for BruteForceConfig {
    fn default() -> Self {
        Self {
            start_index: 1,
            end_index: 100,
            max_consecutive_failures: 20,
            extensions: [".jpg", ".webp", ".png", ".jpeg"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Settings for the JSON API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MangaDexConfig {
    /// API root.
    pub api_base: String,

    /// Cover upload root.
    pub uploads_base: String,

    /// Page size for chapter listing (the API caps it at 100).
    pub page_limit: u32,

    /// Listing stops once this many chapters have been paged through.
    pub max_offset: u32,

    /// Request timeout in seconds.
    pub timeout_sec: u64,

    /// Default translated-language filter. Empty means all languages.
    pub languages: Vec<String>,
}

impl Default for MangaDexConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.mangadex.org".to_string(),
            uploads_base: "https://uploads.mangadex.org".to_string(),
            page_limit: 100,
            max_offset: 5000,
            timeout_sec: 30,
            languages: Vec::new(),
        }
    }
}

impl MangaDexConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }
}

/// Web scraping configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Enable scraper debug logging.
    pub debug: bool,
}

/// File path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory chapters are downloaded into.
    pub output_directory: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("downloads"),
        }
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bf = &self.brute_force;
        if bf.start_index == 0 {
            return Err(ConfigError::invalid(
                "brute_force.start_index",
                "must be at least 1",
            ));
        }
        if bf.start_index > bf.end_index {
            return Err(ConfigError::invalid(
                "brute_force.end_index",
                "must not be less than start_index",
            ));
        }
        if bf.max_consecutive_failures == 0 {
            return Err(ConfigError::invalid(
                "brute_force.max_consecutive_failures",
                "must be greater than 0",
            ));
        }
        if bf.extensions.is_empty() || bf.extensions.iter().any(|e| !e.starts_with('.')) {
            return Err(ConfigError::invalid(
                "brute_force.extensions",
                "must be a non-empty list of dotted extensions",
            ));
        }

        let site = &self.baozimh;
        for (key, value) in [
            ("baozimh.page_timeout_sec", site.page_timeout_sec),
            ("baozimh.app_timeout_sec", site.app_timeout_sec),
            ("baozimh.image_timeout_sec", site.image_timeout_sec),
            ("mangadex.timeout_sec", self.mangadex.timeout_sec),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(key, "must be greater than 0"));
            }
        }
        for (key, value) in [
            ("baozimh.base_url", &site.base_url),
            ("baozimh.app_endpoint_base", &site.app_endpoint_base),
            ("baozimh.default_cdn", &site.default_cdn),
            ("baozimh.brute_force_cdn", &site.brute_force_cdn),
            ("mangadex.api_base", &self.mangadex.api_base),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(ConfigError::invalid(key, "must be an absolute URL"));
            }
        }

        if !(1..=100).contains(&self.mangadex.page_limit) {
            return Err(ConfigError::invalid(
                "mangadex.page_limit",
                "must be between 1 and 100",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.baozimh.placeholder_threshold, 6);
        assert_eq!(config.brute_force.max_consecutive_failures, 20);
        assert_eq!(config.brute_force.extensions, [".jpg", ".webp", ".png", ".jpeg"]);
        assert_eq!(config.baozimh.app_timeout(), Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.mangadex.page_limit, 100);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[baozimh]\nplaceholder_threshold = 0\n\n[brute_force]\nend_index = 40\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.baozimh.placeholder_threshold, 0);
        assert_eq!(config.brute_force.end_index, 40);
        assert_eq!(config.brute_force.start_index, 1);
        assert_eq!(config.baozimh.base_url, "https://www.baozimh.com");
    }

    #[test]
    fn test_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[baozimh\n").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validation_rejects_bad_range() {
        let mut config = Config::default();
        config.brute_force.start_index = 10;
        config.brute_force.end_index = 5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.brute_force.extensions = vec!["jpg".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.mangadex.page_limit = 500;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.baozimh.default_cdn = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
