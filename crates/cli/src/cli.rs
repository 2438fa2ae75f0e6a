use clap::Parser;

/// Account-manager agent for the CRM.
///
/// Runs one prompt, or an interactive session, through the tool-calling
/// loop against the configured Claude model and a local in-memory store.
#[derive(Parser, Debug)]
#[command(name = "crm-agent", about = "Tool-calling account-manager agent")]
pub struct CliArgs {
    /// Single prompt to answer; starts an interactive session when omitted
    #[arg(long, short)]
    pub prompt: Option<String>,

    /// Print the answer as it is generated
    #[arg(long)]
    pub stream: bool,

    /// Maximum tool-executing rounds per request (overrides AGENT_MAX_TOOL_ROUNDS)
    #[arg(long)]
    pub max_rounds: Option<usize>,

    /// Path to config file (default: ~/.config/crm-agent/config.toml)
    #[arg(long)]
    pub config: Option<String>,

    /// Acting user id for local runs
    #[arg(long)]
    pub actor: Option<String>,

    /// Tenant (organization) id for local runs
    #[arg(long)]
    pub tenant: Option<String>,

    /// Model name override
    #[arg(long)]
    pub model: Option<String>,

    /// API key (overrides env var and config file)
    #[arg(long)]
    pub api_key: Option<String>,
}
