//! API credential lookup and `.env` file loading

use std::env;
use std::path::Path;
use toolchat_core::{ChatError, Result};
use tracing::{debug, info};

/// Variable consulted when the configured one is unset.
pub const FALLBACK_API_KEY_ENV: &str = "LLM_API_KEY";

/// Load `KEY=value` pairs from a dotenv file into the process environment.
///
/// Variables already present in the environment win over the file. A missing
/// file is not an error; the number of variables applied is returned.
pub fn load_dotenv(path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    if !path.exists() {
        debug!("No env file at {}", path.display());
        return Ok(0);
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        ChatError::ConfigError(format!("Failed to read env file {}: {}", path.display(), e))
    })?;

    let mut applied = 0;
    for (key, value) in parse_dotenv(&content) {
        if env::var_os(&key).is_none() {
            env::set_var(&key, value);
            applied += 1;
        }
    }

    info!("Loaded {} variables from {}", applied, path.display());
    Ok(applied)
}

fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim().trim_matches('"').trim_matches('\'');
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    /// Read the API key from `var_name`, falling back to `LLM_API_KEY`.
    pub fn from_env(var_name: &str) -> Result<Self> {
        [var_name, FALLBACK_API_KEY_ENV]
            .iter()
            .find_map(|name| env::var(name).ok().filter(|v| !v.trim().is_empty()))
            .map(Self::new)
            .ok_or_else(|| {
                ChatError::ConfigError(format!(
                    "API key not found: set {} (or {}) in the environment or .env file",
                    var_name, FALLBACK_API_KEY_ENV
                ))
            })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}
