use crate::pipeline::{ChunkBudget, PipelineSettings};
use crate::summarization::{ApiStyle, OpenAiConfig, RetryPolicy};
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_SERVER_PORT: u16 = 5000;
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docbrief server and CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port.
    pub server_port: u16,
    /// Directory receiving request-scoped upload files.
    pub upload_dir: PathBuf,
    /// Maximum accepted upload body in bytes.
    pub max_upload_bytes: usize,
    /// Credential for the text-generation API.
    pub generation_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible generation API.
    pub generation_base_url: String,
    /// Model identifier passed to the generation API.
    pub generation_model: String,
    /// Endpoint flavour used for generation calls.
    pub generation_api_style: ApiStyle,
    /// Upper bound on generated tokens per call.
    pub generation_max_output_tokens: u32,
    /// Sampling temperature for every call.
    pub generation_temperature: f32,
    /// Per-call timeout.
    pub generation_timeout_secs: u64,
    /// Attempts per chunk, including the first one.
    pub generation_max_attempts: u32,
    /// First retry delay; doubles on every retry.
    pub generation_initial_backoff_ms: u64,
    /// Number of chunks summarized at the same time.
    pub generation_max_concurrency: usize,
    /// Size budget per chunk.
    pub chunk_budget: usize,
    /// Unit in which `chunk_budget` is measured.
    pub chunk_budget_unit: ChunkBudgetUnit,
    /// Emit one heading per summarized slide/page range.
    pub artifact_section_headings: bool,
}

/// Measure used by the chunk budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkBudgetUnit {
    /// Unicode scalar values.
    Characters,
    /// `cl100k_base` tokens.
    Tokens,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server_port: parse_or("SERVER_PORT", DEFAULT_SERVER_PORT)?,
            upload_dir: load_env_optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            generation_api_key: load_env_optional("OPENAI_API_KEY"),
            generation_base_url: load_env_optional("GENERATION_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            generation_model: load_env_optional("GENERATION_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            generation_api_style: load_env_optional("GENERATION_API_STYLE")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("GENERATION_API_STYLE".into()))
                })
                .transpose()?
                .unwrap_or(ApiStyle::Chat),
            generation_max_output_tokens: parse_or("GENERATION_MAX_OUTPUT_TOKENS", 1024)?,
            generation_temperature: parse_or("GENERATION_TEMPERATURE", 0.3)?,
            generation_timeout_secs: parse_or("GENERATION_TIMEOUT_SECS", 60)?,
            generation_max_attempts: parse_or("GENERATION_MAX_ATTEMPTS", 3)?,
            generation_initial_backoff_ms: parse_or("GENERATION_INITIAL_BACKOFF_MS", 500)?,
            generation_max_concurrency: parse_or("GENERATION_MAX_CONCURRENCY", 4)?,
            chunk_budget: nonzero("CHUNK_BUDGET", parse_or("CHUNK_BUDGET", 12_000)?)?,
            chunk_budget_unit: load_env_optional("CHUNK_BUDGET_UNIT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("CHUNK_BUDGET_UNIT".into()))
                })
                .transpose()?
                .unwrap_or(ChunkBudgetUnit::Characters),
            artifact_section_headings: load_env_optional("ARTIFACT_SECTION_HEADINGS")
                .map(|value| parse_flag(&value, "ARTIFACT_SECTION_HEADINGS"))
                .transpose()?
                .unwrap_or(true),
        })
    }

    /// Settings handed to the pipeline at construction time.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        let budget = match self.chunk_budget_unit {
            ChunkBudgetUnit::Characters => ChunkBudget::Characters(self.chunk_budget),
            ChunkBudgetUnit::Tokens => ChunkBudget::Tokens(self.chunk_budget),
        };
        PipelineSettings {
            upload_dir: self.upload_dir.clone(),
            chunk_budget: budget,
            max_output_tokens: self.generation_max_output_tokens,
            temperature: self.generation_temperature,
            retry: RetryPolicy {
                max_attempts: self.generation_max_attempts.max(1),
                initial_backoff: Duration::from_millis(self.generation_initial_backoff_ms),
                ..RetryPolicy::default()
            },
            max_concurrency: self.generation_max_concurrency.max(1),
            section_headings: self.artifact_section_headings,
        }
    }

    /// Connection settings for the OpenAI-compatible generator.
    pub fn generator_config(&self) -> OpenAiConfig {
        OpenAiConfig {
            api_key: self.generation_api_key.clone(),
            base_url: self.generation_base_url.clone(),
            model: self.generation_model.clone(),
            style: self.generation_api_style,
            timeout: Duration::from_secs(self.generation_timeout_secs),
        }
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|value| value.unwrap_or(default))
}

fn nonzero(key: &str, value: usize) -> Result<usize, ConfigError> {
    match value {
        0 => Err(ConfigError::InvalidValue(key.to_string())),
        value => Ok(value),
    }
}

fn parse_flag(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key.to_string())),
    }
}

impl std::str::FromStr for ChunkBudgetUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "characters" | "chars" => Ok(Self::Characters),
            "tokens" => Ok(Self::Tokens),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    log_loaded(&config);
    CONFIG.set(config).expect("Failed to set config");
}

/// Needs an installed subscriber, so tracing must be initialised before [`init_config`].
fn log_loaded(config: &Config) {
    tracing::debug!(
        server_port = config.server_port,
        upload_dir = %config.upload_dir.display(),
        model = %config.generation_model,
        api_style = ?config.generation_api_style,
        chunk_budget = config.chunk_budget,
        chunk_budget_unit = ?config.chunk_budget_unit,
        credential_present = config.generation_api_key.is_some(),
        "Loaded configuration"
    );
}
