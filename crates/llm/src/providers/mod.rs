pub mod claude_tool_provider;

use std::sync::Arc;

use crm_core::config::LlmConfig;
use crm_tool_runtime::provider::{LlmError, ToolAwareLlmProvider};

use self::claude_tool_provider::ClaudeToolProvider;

/// Create the tool-aware provider described by config.
pub fn create_tool_provider(
    llm_config: &LlmConfig,
) -> Result<Arc<dyn ToolAwareLlmProvider>, LlmError> {
    let provider = ClaudeToolProvider::from_config(llm_config)?;
    tracing::info!(model = %provider.model(), "using Claude tool provider");
    Ok(Arc::new(provider))
}
