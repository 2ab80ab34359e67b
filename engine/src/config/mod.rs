//! Configuration management
//!
//! This module handles loading, validation, and management of the concierge
//! configuration. Configuration is stored in TOML format at
//! ~/.concierge/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: Generative-text service endpoint, model and generation parameters
//! - **retry**: Bounded retry policy for text generation calls
//! - **memory**: Memory document location, recall depth and cache reuse window
//! - **events**: Location and event-data sources
//!
//! # Secrets
//!
//! API keys are never written to the config file. Each section names the
//! environment variable holding its key (`api_key_env`); an unset or empty
//! variable disables an optional event source. The text generation key is
//! required only by commands that run a turn.
//!
//! # Examples
//!
//! ```no_run
//! use concierge_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Model: {}", config.llm.model);
//! # Ok(())
//! # }
//! ```

use sdk::errors::AgentError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    pub core: CoreConfig,

    /// Generative-text service configuration
    pub llm: LLMConfig,

    /// Retry policy for text generation calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Memory store configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Event sources configuration
    #[serde(default)]
    pub events: EventsConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Generative-text service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Base URL for the Gemini API
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// Sampling temperature (0.0-2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per generated response
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Environment variable holding the API key
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
}

/// Bounded retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt, doubled on each further attempt
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for a single backoff
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

/// Memory store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Memory document file name, relative to `core.data_dir` unless absolute
    #[serde(default = "default_memory_file")]
    pub file: PathBuf,

    /// Conversations recalled as planning context
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// Maximum age of a cached task result that may be reused (0 disables reuse)
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age_secs: u64,
}

/// Event sources configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Human-readable location used in prompts
    #[serde(default = "default_location")]
    pub location: String,

    #[serde(default = "default_latitude")]
    pub latitude: f64,

    #[serde(default = "default_longitude")]
    pub longitude: f64,

    /// Search radius in kilometers
    #[serde(default = "default_radius_km")]
    pub radius_km: u32,

    /// IANA timezone used for day/time filters
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Maximum events kept in the catalog
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// HTTP timeout for event sources in seconds
    #[serde(default = "default_events_timeout")]
    pub timeout_secs: u64,

    /// Ticketmaster Discovery settings
    #[serde(default = "default_ticketmaster")]
    pub ticketmaster: SourceConfig,

    /// Eventbrite settings
    #[serde(default = "default_eventbrite")]
    pub eventbrite: SourceConfig,

    /// Google Places text search settings
    #[serde(default = "default_google_places")]
    pub google_places: SourceConfig,

    /// Quebec open data portal settings
    #[serde(default)]
    pub open_data: OpenDataConfig,
}

/// A single event-data source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL for the source API
    pub base_url: String,

    /// Environment variable holding the API key or token
    pub api_key_env: String,
}

/// A keyless CKAN datastore on the Quebec open data portal
///
/// Disabled until a `resource_id` naming an events dataset is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenDataConfig {
    #[serde(default = "default_open_data_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.concierge")
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-1.5-pro".to_string()
}

fn default_temperature() -> f32 {
    0.4
}

fn default_max_output_tokens() -> u32 {
    1024
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_llm_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_memory_file() -> PathBuf {
    PathBuf::from("agent_memory.json")
}

fn default_recall_limit() -> usize {
    3
}

fn default_cache_max_age() -> u64 {
    3_600
}

fn default_location() -> String {
    "Montreal, Canada".to_string()
}

fn default_latitude() -> f64 {
    45.5017
}

fn default_longitude() -> f64 {
    -73.5673
}

fn default_radius_km() -> u32 {
    50
}

fn default_timezone() -> String {
    "America/Montreal".to_string()
}

fn default_max_events() -> usize {
    50
}

fn default_events_timeout() -> u64 {
    15
}

fn default_ticketmaster() -> SourceConfig {
    SourceConfig {
        base_url: "https://app.ticketmaster.com/discovery/v2".to_string(),
        api_key_env: "TICKETMASTER_API_KEY".to_string(),
    }
}

fn default_eventbrite() -> SourceConfig {
    SourceConfig {
        base_url: "https://www.eventbriteapi.com/v3".to_string(),
        api_key_env: "EVENTBRITE_TOKEN".to_string(),
    }
}

fn default_google_places() -> SourceConfig {
    SourceConfig {
        base_url: "https://maps.googleapis.com/maps/api/place".to_string(),
        api_key_env: "GOOGLE_PLACES_API_KEY".to_string(),
    }
}

fn default_open_data_url() -> String {
    "https://www.donneesquebec.ca/recherche/api/3/action".to_string()
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_llm_timeout(),
            api_key_env: default_llm_key_env(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            file: default_memory_file(),
            recall_limit: default_recall_limit(),
            cache_max_age_secs: default_cache_max_age(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            location: default_location(),
            latitude: default_latitude(),
            longitude: default_longitude(),
            radius_km: default_radius_km(),
            timezone: default_timezone(),
            max_events: default_max_events(),
            timeout_secs: default_events_timeout(),
            ticketmaster: default_ticketmaster(),
            eventbrite: default_eventbrite(),
            google_places: default_google_places(),
            open_data: OpenDataConfig::default(),
        }
    }
}

impl Default for OpenDataConfig {
    fn default() -> Self {
        Self {
            base_url: default_open_data_url(),
            resource_id: None,
        }
    }
}

impl LLMConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl OpenDataConfig {
    /// The configured dataset; `None` disables the source
    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

impl SourceConfig {
    /// The source's key from the environment; `None` disables the source
    pub fn api_key(&self) -> Option<String> {
        read_secret(&self.api_key_env)
    }
}

impl Config {
    /// Load configuration from the default location (~/.concierge/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, AgentError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, AgentError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, AgentError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| AgentError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, AgentError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AgentError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| AgentError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| AgentError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.concierge/config.toml)
    fn default_config_path() -> Result<PathBuf, AgentError> {
        let home = dirs::home_dir()
            .ok_or_else(|| AgentError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".concierge").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            llm: LLMConfig::default(),
            retry: RetryConfig::default(),
            memory: MemoryConfig::default(),
            events: EventsConfig::default(),
        }
    }

    /// Full path of the memory document
    pub fn memory_path(&self) -> PathBuf {
        if self.memory.file.is_absolute() {
            self.memory.file.clone()
        } else {
            self.core.data_dir.join(&self.memory.file)
        }
    }

    /// The text generation API key
    ///
    /// # Errors
    ///
    /// Returns `MissingCredential` naming the variable when it is unset.
    pub fn llm_api_key(&self) -> Result<String, AgentError> {
        read_secret(&self.llm.api_key_env)
            .ok_or_else(|| AgentError::MissingCredential(self.llm.api_key_env.clone()))
    }

    /// Configured timezone
    pub fn timezone(&self) -> Result<chrono_tz::Tz, AgentError> {
        self.events
            .timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| AgentError::Config(format!("Unknown timezone '{}'", self.events.timezone)))
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates log level, generation parameters and retry bounds
    /// - Validates the timezone name
    /// - Expands ~ in the data directory and creates it
    fn validate_and_process(&mut self) -> Result<(), AgentError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(AgentError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(AgentError::Config(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.llm.timeout_secs == 0 {
            return Err(AgentError::Config(
                "llm.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(AgentError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(AgentError::Config(
                "retry.max_backoff_ms must be >= retry.initial_backoff_ms".to_string(),
            ));
        }

        self.timezone()?;

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                AgentError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Read a secret from the environment, treating empty values as absent
fn read_secret(env_name: &str) -> Option<String> {
    std::env::var(env_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, AgentError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| AgentError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| AgentError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| AgentError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.llm.model, "gemini-1.5-pro");
        assert_eq!(config.memory.recall_limit, 3);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.events.timezone, "America/Montreal");
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        let expanded = expand_path(&path).unwrap();

        assert_eq!(expanded, path);
    }

    #[test]
    fn test_memory_path_relative_to_data_dir() {
        let mut config = Config::default_config();
        config.core.data_dir = PathBuf::from("/var/lib/concierge");
        assert_eq!(
            config.memory_path(),
            PathBuf::from("/var/lib/concierge/agent_memory.json")
        );

        config.memory.file = PathBuf::from("/tmp/mem.json");
        assert_eq!(config.memory_path(), PathBuf::from("/tmp/mem.json"));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.llm.base_url, deserialized.llm.base_url);
        assert_eq!(
            config.events.ticketmaster.api_key_env,
            deserialized.events.ticketmaster.api_key_env
        );
    }

    #[test]
    fn test_open_data_needs_resource_id() {
        let mut config = OpenDataConfig::default();
        assert_eq!(config.resource_id(), None);

        config.resource_id = Some("  ".to_string());
        assert_eq!(config.resource_id(), None);

        config.resource_id = Some("montreal-events".to_string());
        assert_eq!(config.resource_id(), Some("montreal-events"));
    }

    #[test]
    fn test_timezone_parses() {
        let config = Config::default_config();
        assert_eq!(config.timezone().unwrap(), chrono_tz::America::Montreal);
    }
}
