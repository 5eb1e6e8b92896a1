use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for QueryGraph
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueryGraphConfig {
    /// Strategy thresholds and stage tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Result cache bounds
    #[serde(default)]
    pub cache: ResultCacheConfig,

    /// Graph database connection
    #[serde(default)]
    pub graph: GraphConfig,

    /// LLM used by the external translator adapters
    #[serde(default)]
    pub llm: LLMConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Strategy selection and stage tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Complexity below this selects template-first
    #[serde(default = "default_template_first_below")]
    pub template_first_below: f32,

    /// Complexity below this selects progressive
    #[serde(default = "default_progressive_below")]
    pub progressive_below: f32,

    /// Complexity below this selects hybrid-parallel, otherwise direct-external
    #[serde(default = "default_hybrid_parallel_below")]
    pub hybrid_parallel_below: f32,

    /// NLP results under this confidence are not synthesized
    #[serde(default = "default_min_nlp_confidence")]
    pub min_nlp_confidence: f32,

    /// Retry hint passed to the schema QA chain when the caller gives none
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            template_first_below: default_template_first_below(),
            progressive_below: default_progressive_below(),
            hybrid_parallel_below: default_hybrid_parallel_below(),
            min_nlp_confidence: default_min_nlp_confidence(),
            default_max_retries: default_max_retries(),
        }
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultCacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of cached results (oldest inserted is evicted first)
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_cache_max_entries(),
        }
    }
}

/// Neo4j HTTP endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_graph_url")]
    pub url: String,

    #[serde(default = "default_graph_database")]
    pub database: String,

    #[serde(default = "default_graph_user")]
    pub user: String,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            url: default_graph_url(),
            database: default_graph_database(),
            user: default_graph_user(),
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// LLM configuration for the translator adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Disabled means stages 3 and 4 are unavailable
    #[serde(default)]
    pub enabled: bool,

    /// Display name of the provider ("openai", "lmstudio", "ollama", ...)
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// OpenAI-compatible base URL, including the version segment
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Linear backoff step between schema QA retries
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_llm_provider(),
            base_url: default_llm_base_url(),
            model: None,
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_template_first_below() -> f32 {
    0.3
}
fn default_progressive_below() -> f32 {
    0.6
}
fn default_hybrid_parallel_below() -> f32 {
    0.8
}
fn default_min_nlp_confidence() -> f32 {
    0.3
}
fn default_max_retries() -> u32 {
    2
}
fn default_cache_max_entries() -> usize {
    100
}
fn default_graph_url() -> String {
    "http://localhost:7474".to_string()
}
fn default_graph_database() -> String {
    "neo4j".to_string()
}
fn default_graph_user() -> String {
    "neo4j".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> usize {
    1024
}
fn default_retry_delay_ms() -> u64 {
    500
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with defaults, TOML files and environment overrides
pub struct ConfigManager {
    config: QueryGraphConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.querygraph.toml, then ~/.querygraph/config.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!("Config file: {}", path.display()),
            None => info!("Config file: NONE (using defaults)"),
        }
        info!(
            "Graph endpoint: {} (database {}), LLM adapters: {}",
            config.graph.url,
            config.graph.database,
            if config.llm.enabled {
                "enabled"
            } else {
                "disabled"
            }
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load from an explicit file, still honouring environment overrides
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::apply_env_overrides(Self::read_toml_file(path)?);
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            }
        }
    }

    fn load_config_file() -> Result<(QueryGraphConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".querygraph.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".querygraph").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((QueryGraphConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<QueryGraphConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(mut config: QueryGraphConfig) -> QueryGraphConfig {
        // Graph
        if let Ok(url) = std::env::var("QUERYGRAPH_GRAPH_URL") {
            config.graph.url = url;
        }
        if let Ok(database) = std::env::var("QUERYGRAPH_GRAPH_DATABASE") {
            config.graph.database = database;
        }
        if let Ok(user) = std::env::var("QUERYGRAPH_GRAPH_USER") {
            config.graph.user = user;
        }
        if let Ok(password) = std::env::var("QUERYGRAPH_GRAPH_PASSWORD") {
            config.graph.password = Some(password);
        }

        // LLM
        if let Ok(provider) = std::env::var("QUERYGRAPH_LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(base_url) = std::env::var("QUERYGRAPH_LLM_BASE_URL") {
            config.llm.base_url = base_url;
        }
        if let Ok(model) = std::env::var("QUERYGRAPH_MODEL") {
            config.llm.model = Some(model);
            config.llm.enabled = true; // Enable if model specified
        }
        if let Ok(key) =
            std::env::var("QUERYGRAPH_LLM_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
        {
            config.llm.api_key = Some(key);
        }

        // Pipeline and cache
        if let Ok(entries) = std::env::var("QUERYGRAPH_CACHE_MAX_ENTRIES") {
            if let Ok(n) = entries.parse() {
                config.cache.max_entries = n;
            }
        }
        if let Ok(enabled) = std::env::var("QUERYGRAPH_CACHE_ENABLED") {
            config.cache.enabled = enabled.to_lowercase() == "true" || enabled == "1";
        }
        if let Ok(retries) = std::env::var("QUERYGRAPH_MAX_RETRIES") {
            if let Ok(n) = retries.parse() {
                config.pipeline.default_max_retries = n;
            }
        }

        // Logging
        if let Ok(level) = std::env::var("QUERYGRAPH_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("QUERYGRAPH_LOG_FORMAT") {
            config.logging.format = format;
        }

        config
    }

    /// Validate configuration
    pub fn validate_config(config: &QueryGraphConfig) -> Result<(), ConfigError> {
        let p = &config.pipeline;
        let thresholds = [
            p.template_first_below,
            p.progressive_below,
            p.hybrid_parallel_below,
        ];
        if thresholds.iter().any(|t| *t <= 0.0 || *t > 1.0)
            || !(p.template_first_below < p.progressive_below
                && p.progressive_below < p.hybrid_parallel_below)
        {
            return Err(ConfigError::ValidationError(format!(
                "Strategy thresholds must be strictly increasing within (0, 1], got {:?}",
                thresholds
            )));
        }

        if !(0.0..=1.0).contains(&p.min_nlp_confidence) {
            return Err(ConfigError::ValidationError(format!(
                "min_nlp_confidence must be within [0, 1], got {}",
                p.min_nlp_confidence
            )));
        }

        if config.cache.max_entries == 0 {
            return Err(ConfigError::ValidationError(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "json" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json, compact",
                    other
                )))
            }
        }

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &QueryGraphConfig {
        &self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = QueryGraphConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}
