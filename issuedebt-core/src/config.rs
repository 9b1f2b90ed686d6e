//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/issuedebt/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/issuedebt/` (~/.config/issuedebt/)
//! - Data (cache, reports): `$XDG_DATA_HOME/issuedebt/` (~/.local/share/issuedebt/)
//! - State/Logs: `$XDG_STATE_HOME/issuedebt/` (~/.local/state/issuedebt/)

use crate::error::{Error, Result};
use crate::report::ReportConfig;
use crate::types::{LabelRules, PriorityScale};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variables checked for the GitHub token, in order.
pub const TOKEN_ENV_VARS: [&str; 2] = ["ISSUEDEBT_GITHUB_TOKEN", "GITHUB_TOKEN"];

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// GitHub issues API settings
    #[serde(default)]
    pub github: GithubConfig,

    /// Priority scale (label → priority, weight, color)
    #[serde(default)]
    pub priorities: PriorityScale,

    /// Rejection / department / category / estimate label rules
    #[serde(default)]
    pub labels: LabelRules,

    /// Report toggles and default filters
    #[serde(default)]
    pub report: ReportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Cache location override
    #[serde(default)]
    pub cache: CacheConfig,
}

/// GitHub issues API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    /// Issues endpoint, e.g. `https://api.github.com/repos/owner/repo/issues`
    pub api_url: Option<String>,

    /// Accept header sent with every request
    #[serde(default = "default_accept")]
    pub accept: String,

    /// Bearer token (can also use env var)
    pub token: Option<String>,

    /// Items per page (max 100)
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Pages requested at most in one fetch
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Max retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            accept: default_accept(),
            token: None,
            per_page: default_per_page(),
            max_pages: default_max_pages(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl GithubConfig {
    /// Token from the config file, else from the environment
    pub fn resolved_token(&self) -> Option<String> {
        self.token.clone().filter(|t| !t.is_empty()).or_else(|| {
            TOKEN_ENV_VARS
                .iter()
                .find_map(|var| std::env::var(var).ok().filter(|t| !t.is_empty()))
        })
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.per_page == 0 || self.per_page > 100 {
            return Err(Error::Config(
                "github.per_page must be between 1 and 100".to_string(),
            ));
        }
        if self.max_pages == 0 {
            return Err(Error::Config(
                "github.max_pages must be at least 1".to_string(),
            ));
        }
        if let Some(url) = &self.api_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(Error::Config(format!(
                    "github.api_url must be an http(s) URL, got {}",
                    url
                )));
            }
        }
        Ok(())
    }
}

fn default_accept() -> String {
    "application/vnd.github+json".to_string()
}

fn default_per_page() -> u32 {
    100
}

fn default_max_pages() -> u32 {
    99
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Cache configuration
#[derive(Debug, Deserialize, Default)]
pub struct CacheConfig {
    /// Snapshot path; defaults to [`Config::cache_path`]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.github.validate()?;
        self.priorities.validate()?;
        self.report.validate()?;
        Ok(())
    }

    /// Cache snapshot path, honoring `[cache] path`
    pub fn resolved_cache_path(&self) -> PathBuf {
        self.cache.path.clone().unwrap_or_else(Self::cache_path)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/issuedebt/config.toml` (~/.config/issuedebt/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("issuedebt").join("config.toml")
    }

    /// Returns the data directory path (cache and reports)
    ///
    /// `$XDG_DATA_HOME/issuedebt/` (~/.local/share/issuedebt/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("issuedebt")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/issuedebt/` (~/.local/state/issuedebt/), holding the
    /// daily `issuedebt.YYYY-MM-DD.log` files
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("issuedebt")
    }

    /// Returns the default cache snapshot path
    ///
    /// `$XDG_DATA_HOME/issuedebt/cache.json`
    pub fn cache_path() -> PathBuf {
        Self::data_dir().join("cache.json")
    }

    /// Returns the default report output directory
    ///
    /// `$XDG_DATA_HOME/issuedebt/reports/`
    pub fn reports_dir() -> PathBuf {
        Self::data_dir().join("reports")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{GranularitySelection, KindFilter};
    use crate::types::Priority;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.github.api_url.is_none());
        assert_eq!(config.github.per_page, 100);
        assert_eq!(config.github.max_pages, 99);
        assert_eq!(config.priorities.weight(Priority::Satanic), 5);
        assert_eq!(config.report.granularity, GranularitySelection::Both);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r##"
[github]
api_url = "https://api.github.com/repos/acme/widgets/issues"
token = "secret"
per_page = 50

[[priorities]]
priority = "LOW"
label = "p3"
weight = 1
color = "#00ff00"

[[priorities]]
priority = "HIGH"
label = "p1"
weight = 4
color = "#ff0000"

[labels]
rejection = ["nope"]
department_prefix = "team/"

[report]
granularity = "week"
per_user = false
exclude_users = ["dependabot[bot]"]
kind = "issues"

[logging]
level = "debug"
"##;
        let config = Config::parse(toml).unwrap();

        assert_eq!(config.github.per_page, 50);
        assert_eq!(config.github.resolved_token().as_deref(), Some("secret"));
        assert_eq!(config.priorities.levels().len(), 2);
        assert_eq!(config.priorities.resolve(&["P1"]), Priority::High);
        assert_eq!(config.priorities.weight(Priority::Satanic), 0);
        assert_eq!(config.labels.rejection, vec!["nope".to_string()]);
        assert_eq!(config.labels.department_prefix.as_deref(), Some("team/"));
        assert_eq!(config.labels.category_prefix.as_deref(), Some("TYPE_"));
        assert_eq!(config.report.granularity, GranularitySelection::Week);
        assert!(!config.report.per_user);
        assert_eq!(config.report.kind, KindFilter::Issues);
        assert_eq!(config.report.exclude_users, vec!["dependabot[bot]"]);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = Config::parse("[github]\nper_page = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let toml = r##"
[[priorities]]
priority = "LOW"
label = "low"
weight = 1
color = "#00ff00"

[[priorities]]
priority = "LOW"
label = "lowest"
weight = 0
color = "#00ff00"
"##;
        assert!(matches!(Config::parse(toml), Err(Error::Config(_))));

        assert!(matches!(
            Config::parse("[github]\napi_url = \"ftp://example.com\"\n"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_cache_path_override() {
        let config = Config::parse("[cache]\npath = \"/tmp/issues.json\"\n").unwrap();
        assert_eq!(
            config.resolved_cache_path(),
            PathBuf::from("/tmp/issues.json")
        );
        assert!(Config::cache_path().ends_with("issuedebt/cache.json"));
    }
}
