use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use toolchat_core::{ChatError, Result};

pub mod credentials;
pub mod env_substitution;

pub use credentials::{load_dotenv, Credentials};
pub use env_substitution::{substitute_env_vars, substitute_in_string};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub mcp: McpSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpSettings {
    #[serde(default = "default_servers_file")]
    pub config_file: PathBuf,
    #[serde(default)]
    pub startup_policy: StartupPolicy,
    #[serde(default)]
    pub retry: RetrySettings,
}

/// What to do when one configured tool server fails to start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupPolicy {
    /// Tear everything down on the first failure.
    #[default]
    FailFast,
    /// Drop the failed server and keep the others.
    BestEffort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

impl AppConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ChatError::ConfigError(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(yaml)
            .map_err(|e| ChatError::ConfigError(format!("Failed to parse YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.llm.model.is_empty() {
            return Err(ChatError::ConfigError("Model cannot be empty".into()));
        }
        if !self.llm.base_url.starts_with("http://") && !self.llm.base_url.starts_with("https://") {
            return Err(ChatError::ConfigError(
                "LLM base_url must start with http:// or https://".into(),
            ));
        }
        if self.llm.temperature < 0.0 || self.llm.temperature > 2.0 {
            return Err(ChatError::ConfigError("Temperature must be between 0.0 and 2.0".into()));
        }
        if self.llm.api_key_env.is_empty() {
            return Err(ChatError::ConfigError("api_key_env cannot be empty".into()));
        }
        if self.mcp.retry.attempts == 0 {
            return Err(ChatError::ConfigError("Retry attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn default_config_path() -> PathBuf {
        let home_dir = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home_dir).join(".toolchat").join("toolchat.yaml")
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            api_key_env: default_api_key_env(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            config_file: default_servers_file(),
            startup_policy: StartupPolicy::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_base_url() -> String { "https://api.groq.com/openai/v1".to_string() }
fn default_model() -> String { "llama3-8b-8192".to_string() }
fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 4096 }
fn default_top_p() -> f32 { 1.0 }
fn default_api_key_env() -> String { "GROQ_API_KEY".to_string() }
fn default_request_timeout() -> u64 { 60 }
fn default_servers_file() -> PathBuf { PathBuf::from("servers_config.json") }
fn default_retry_attempts() -> u32 { 2 }
fn default_retry_delay_ms() -> u64 { 1000 }
