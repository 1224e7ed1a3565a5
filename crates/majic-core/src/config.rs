use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Upstream calendar feed
    #[serde(default)]
    pub feed: FeedConfig,

    /// Proxy endpoint listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-side caching agent
    #[serde(default)]
    pub agent: AgentConfig,

    /// Foreground application behaviour
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Upstream iCalendar URL. `{first_date}` and `{last_date}` are replaced
    /// with the request's date window (YYYY-MM-DD).
    pub url_template: String,

    /// Hard timeout for the upstream request, in seconds
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,

    /// Client identity sent upstream
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_feed_timeout() -> u64 {
    8
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (compatible; majic-schedule/0.1)"
        .to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url_template: "https://edtweb.univ-cotedazur.fr/jsp/custom/modules/plannings/anonymous_cal.jsp?resources=64194&projectId=5&calType=ical&firstDate={first_date}&lastDate={last_date}".to_string(),
            timeout_secs: default_feed_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Prefix of every partition tag
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Deployed build identifier; rotating it retires the static/dynamic partitions
    #[serde(default = "default_build")]
    pub build: String,

    /// Request path served from the dynamic partition
    #[serde(default = "default_api_path")]
    pub api_path: String,

    /// Base URL the agent fetches from
    #[serde(default = "default_origin")]
    pub origin: String,

    /// SQLite file backing the partitions (defaults to `<config_dir>/agent_cache.db`)
    #[serde(default)]
    pub cache_path: Option<PathBuf>,

    /// Assets cached at install time
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,
}

fn default_app_name() -> String {
    "majic".to_string()
}

fn default_build() -> String {
    "v3".to_string()
}

fn default_api_path() -> String {
    "/api/calendar".to_string()
}

fn default_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_assets() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/style.css",
        "/script.js",
        "/service-worker.js",
        "/images/icon.png",
        "/manifest.json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            build: default_build(),
            api_path: default_api_path(),
            origin: default_origin(),
            cache_path: None,
            assets: default_assets(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Retries after a failed first load before the foreground gives up (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; grows with each attempt
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,

    /// Window after load during which update prompts are suppressed
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// How long the offline banner stays up
    #[serde(default = "default_offline_display")]
    pub offline_display_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    1000
}

fn default_retry_max_delay() -> u64 {
    8000
}

fn default_debounce() -> u64 {
    5000
}

fn default_offline_display() -> u64 {
    10_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
            debounce_ms: default_debounce(),
            offline_display_ms: default_offline_display(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("majic");

        Self {
            config_dir,
            feed: FeedConfig::default(),
            server: ServerConfig::default(),
            agent: AgentConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        let sample_feed_url = self
            .feed
            .url_template
            .replace("{first_date}", "2025-01-01")
            .replace("{last_date}", "2026-01-01");
        self.validate_url(&sample_feed_url, "feed.url_template", &mut result);

        if !self.feed.url_template.contains("{first_date}")
            || !self.feed.url_template.contains("{last_date}")
        {
            result.add_warning(
                "feed.url_template",
                "No date window placeholders; the same range is requested every time",
            );
        }

        if self.feed.timeout_secs == 0 {
            result.add_error("feed.timeout_secs", "Timeout must be greater than 0");
        } else if self.feed.timeout_secs > 60 {
            result.add_warning("feed.timeout_secs", "Timeout is unusually long (>60s)");
        }

        if self.feed.user_agent.trim().is_empty() {
            result.add_warning("feed.user_agent", "Empty user agent; some upstreams reject it");
        }

        if self.server.port == 0 {
            result.add_error("server.port", "Port cannot be 0");
        }

        self.validate_url(&self.agent.origin, "agent.origin", &mut result);

        if !self.agent.api_path.starts_with('/') {
            result.add_error("agent.api_path", "API path must start with '/'");
        }

        if self.agent.build.trim().is_empty() {
            result.add_error("agent.build", "Build identifier cannot be empty");
        }

        if self.agent.assets.is_empty() {
            result.add_warning("agent.assets", "No assets listed; offline start will not work");
        } else if let Some(bad) = self.agent.assets.iter().find(|a| !a.starts_with('/')) {
            result.add_error("agent.assets", format!("Asset path must start with '/': {}", bad));
        }

        if self.client.max_retries == 0 {
            result.add_warning("client.max_retries", "Failed loads will not be retried");
        } else if self.client.max_retries > 10 {
            result.add_warning("client.max_retries", "More than 10 retries will feel stuck");
        }

        if self.client.retry_base_delay_ms > self.client.retry_max_delay_ms {
            result.add_error(
                "client.retry_base_delay_ms",
                "Base delay cannot exceed the maximum delay",
            );
        }

        if self.client.debounce_ms > 30_000 {
            result.add_warning(
                "client.debounce_ms",
                "Debounce window is more than 30 seconds",
            );
        }

        if self.client.offline_display_ms == 0 {
            result.add_warning(
                "client.offline_display_ms",
                "Offline banner will disappear immediately",
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if url.port() == Some(0) {
                    result.add_error(field_name, "Port cannot be 0");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Path of the agent's partition database
    pub fn agent_cache_path(&self) -> PathBuf {
        self.agent
            .cache_path
            .clone()
            .unwrap_or_else(|| self.config_dir.join("agent_cache.db"))
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("majic");

        Ok(config_dir.join("config.toml"))
    }
}
