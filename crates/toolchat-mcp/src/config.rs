//! Tool-server configuration
//!
//! Reads the `mcpServers` descriptor (JSON, or YAML by file extension) and
//! turns each entry into launch parameters for a subprocess.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use toolchat_config::substitute_env_vars;
use toolchat_core::{ChatError, Result};
use tracing::info;

use crate::resolve::resolve_command;

/// MCP servers configuration container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    /// Server name to configuration, in declaration order
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: IndexMap<String, ServerConfig>,
}

/// Launch parameters for one stdio tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Command to execute (e.g., "npx", "node", "/path/to/binary")
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Environment overrides merged onto the current process environment
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default)]
    pub disabled: bool,
}

/// Fully resolved parameters handed to a connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Complete child environment (process environment plus overrides)
    pub env: HashMap<String, String>,
}

fn default_timeout() -> u64 {
    30000
}

impl ServerConfig {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: HashMap::new(),
            timeout: default_timeout(),
            disabled: false,
        }
    }

    /// Resolve the command and merge environment overrides.
    pub fn launch_spec(&self) -> Result<LaunchSpec> {
        let program = resolve_command(&self.command)?;

        let mut env: HashMap<String, String> = std::env::vars().collect();
        env.extend(substitute_env_vars(&self.env)?);

        Ok(LaunchSpec {
            program,
            args: self.args.clone(),
            env,
        })
    }
}

impl McpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON file (`.yaml`/`.yml` files are read as YAML)
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading MCP configuration from: {}", path.display());

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ChatError::ConfigError(format!(
                "Failed to read MCP config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );

        if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| {
                ChatError::ConfigError(format!(
                    "Failed to parse MCP config YAML from {}: {}",
                    path.display(),
                    e
                ))
            })
        } else {
            Self::from_json_str(&content).map_err(|e| {
                ChatError::ConfigError(format!("{} ({})", e, path.display()))
            })
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ChatError::ConfigError(format!("Failed to parse MCP config JSON: {}", e)))
    }

    /// Merge another configuration into this one; `other` wins on name clashes
    pub fn merge(&mut self, other: McpConfig) {
        for (name, config) in other.mcp_servers {
            self.mcp_servers.insert(name, config);
        }
    }

    /// Servers not marked disabled, in declaration order
    pub fn enabled_servers(&self) -> IndexMap<String, ServerConfig> {
        self.mcp_servers
            .iter()
            .filter(|(_, config)| !config.disabled)
            .map(|(name, config)| (name.clone(), config.clone()))
            .collect()
    }
}
