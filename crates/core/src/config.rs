use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CRM_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CRM_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            llm: LlmConfig::from_env_profiled(p),
            agent: AgentConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  llm:    model={}, configured={}",
            self.llm.anthropic_model,
            self.llm.is_configured()
        );
        tracing::info!(
            "  agent:  max_tool_rounds={}, tool_execution={:?}",
            self.agent.max_tool_rounds,
            self.agent.tool_execution
        );
    }
}

// ── LLM provider ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub anthropic_base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            anthropic_api_key: profiled_env_opt(p, "ANTHROPIC_API_KEY"),
            anthropic_model: profiled_env_or(p, "ANTHROPIC_MODEL", "claude-sonnet-4-5-20250929"),
            anthropic_base_url: profiled_env_or(
                p,
                "ANTHROPIC_BASE_URL",
                "https://api.anthropic.com",
            ),
            temperature: profiled_env_or(p, "LLM_TEMPERATURE", "0.3")
                .parse()
                .unwrap_or(0.3),
            max_tokens: profiled_env_u32(p, "LLM_MAX_TOKENS", 1500),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.anthropic_api_key.is_some()
    }
}

// ── Agentic loop ──────────────────────────────────────────────

/// Ceiling on tool-executing rounds per conversation request.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;

/// How the tool calls of a single assistant turn are executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolExecutionMode {
    /// One after another, in emission order.
    #[default]
    Sequential,
    /// All at once; results are still submitted as one complete set.
    Concurrent,
}

impl std::str::FromStr for ToolExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(ToolExecutionMode::Sequential),
            "concurrent" | "parallel" => Ok(ToolExecutionMode::Concurrent),
            other => Err(format!("unknown tool execution mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub max_tool_rounds: usize,
    pub tool_execution: ToolExecutionMode,
}

impl AgentConfig {
    fn from_env_profiled(p: &str) -> Self {
        let tool_execution = match profiled_env_opt(p, "AGENT_TOOL_EXECUTION") {
            Some(raw) => raw.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "falling back to sequential tool execution");
                ToolExecutionMode::Sequential
            }),
            None => ToolExecutionMode::Sequential,
        };
        Self {
            max_tool_rounds: profiled_env_usize(p, "AGENT_MAX_TOOL_ROUNDS", DEFAULT_MAX_TOOL_ROUNDS),
            tool_execution,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            tool_execution: ToolExecutionMode::Sequential,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiled_lookup_prefers_prefix() {
        env::set_var("CFGTEST_A_LLM_MAX_TOKENS", "777");
        env::set_var("CFGTEST_A_AGENT_TOOL_EXECUTION", "concurrent");
        let config = Config::for_profile("cfgtest_a");
        assert_eq!(config.profile, "CFGTEST_A");
        assert_eq!(config.llm.max_tokens, 777);
        assert_eq!(config.agent.tool_execution, ToolExecutionMode::Concurrent);
    }

    #[test]
    fn test_bad_values_fall_back_to_defaults() {
        env::set_var("CFGTEST_B_AGENT_MAX_TOOL_ROUNDS", "lots");
        env::set_var("CFGTEST_B_AGENT_TOOL_EXECUTION", "sometimes");
        let config = Config::for_profile("CFGTEST_B");
        assert_eq!(config.agent.max_tool_rounds, DEFAULT_MAX_TOOL_ROUNDS);
        assert_eq!(config.agent.tool_execution, ToolExecutionMode::Sequential);
    }

    #[test]
    fn test_execution_mode_parse() {
        assert_eq!(
            "Parallel".parse::<ToolExecutionMode>().unwrap(),
            ToolExecutionMode::Concurrent
        );
        assert!("other".parse::<ToolExecutionMode>().is_err());
    }

    #[test]
    fn test_profile_label() {
        let config = Config::for_profile("");
        assert_eq!(config.profile_label(), "default");
    }
}
