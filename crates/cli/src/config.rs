use anyhow::{Context, Result};
use crm_core::config::LlmConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// CLI configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Replaces the default role preamble of the system prompt
    #[serde(default)]
    pub preamble: Option<String>,

    /// Acting user for local runs
    #[serde(default = "default_actor")]
    pub actor_id: String,

    #[serde(default)]
    pub actor_email: Option<String>,

    /// Tenant the local user belongs to
    #[serde(default = "default_tenant")]
    pub tenant_id: String,

    /// Model override (beats ANTHROPIC_MODEL)
    #[serde(default)]
    pub model: Option<String>,

    /// Fallback API key when ANTHROPIC_API_KEY is unset
    #[serde(default)]
    pub api_key: Option<String>,

    /// Client companies preloaded into the in-memory store
    #[serde(default)]
    pub seed_clients: Vec<String>,
}

fn default_actor() -> String {
    "local-user".to_string()
}

fn default_tenant() -> String {
    "local".to_string()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            preamble: None,
            actor_id: default_actor(),
            actor_email: None,
            tenant_id: default_tenant(),
            model: None,
            api_key: None,
            seed_clients: Vec::new(),
        }
    }
}

impl CliConfig {
    /// Return the default config file path: ~/.config/crm-agent/config.toml
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("could not determine user config directory")?
            .join("crm-agent");
        Ok(config_dir.join("config.toml"))
    }

    /// Load config from the given path, or the default path.
    /// Returns default config if the file does not exist.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_config_path()?,
        };

        if !config_path.exists() {
            debug!(?config_path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        debug!(?config_path, "Loading config");
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read config: {}", config_path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("failed to parse config: {}", config_path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Fold CLI and file overrides into the env-derived LLM settings.
    /// Priority: cli_override > config file > environment.
    pub fn apply_llm_overrides(
        &self,
        llm: &mut LlmConfig,
        cli_model: Option<&str>,
        cli_api_key: Option<&str>,
    ) {
        if let Some(model) = cli_model.map(String::from).or_else(|| self.model.clone()) {
            llm.anthropic_model = model;
        }
        if let Some(key) = cli_api_key {
            llm.anthropic_api_key = Some(key.to_string());
        } else if llm.anthropic_api_key.as_deref().map_or(true, str::is_empty) {
            if let Some(key) = &self.api_key {
                llm.anthropic_api_key = Some(key.clone());
            }
        }
    }
}
