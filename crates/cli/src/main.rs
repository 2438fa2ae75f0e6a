mod cli;
mod config;
mod turn;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use crm_core::config::{load_dotenv, Config};
use crm_tool_runtime::{
    authorize, register_crm_tools, AgenticLoop, Identity, InMemoryStore, Message,
    StaticActorResolver, SystemPrompt, ToolRegistry,
};

use crate::cli::CliArgs;
use crate::config::CliConfig;

const LOCAL_CREDENTIAL: &str = "local";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();

    let file_config = CliConfig::load(args.config.as_deref())
        .context("failed to load configuration")?;
    let mut config = Config::from_env();
    file_config.apply_llm_overrides(&mut config.llm, args.model.as_deref(), args.api_key.as_deref());
    config.log_summary();

    let provider = crm_llm::create_tool_provider(&config.llm)
        .context("failed to create LLM provider")?;

    // Local runs resolve a fixed identity through the same gate as the app.
    let resolver = StaticActorResolver::new().with_identity(
        LOCAL_CREDENTIAL,
        Identity {
            user_id: args.actor.clone().unwrap_or_else(|| file_config.actor_id.clone()),
            email: file_config.actor_email.clone(),
            tenant_id: Some(args.tenant.clone().unwrap_or_else(|| file_config.tenant_id.clone()))
                .filter(|t| !t.is_empty()),
        },
    );
    let actor = authorize(&resolver, LOCAL_CREDENTIAL)
        .await
        .context("local identity rejected")?;

    let store = Arc::new(InMemoryStore::new());
    for company in &file_config.seed_clients {
        store.add_client(&actor.tenant_id, company, None).await;
    }
    info!(count = file_config.seed_clients.len(), tenant = %actor.tenant_id, "Seeded clients");

    let mut registry = ToolRegistry::new();
    register_crm_tools(&mut registry, store).context("failed to register CRM tools")?;

    let mut agentic_loop = AgenticLoop::with_registry(provider, Arc::new(registry))
        .with_agent_config(&config.agent)
        .with_temperature(config.llm.temperature)
        .with_max_tokens(config.llm.max_tokens);
    if let Some(rounds) = args.max_rounds {
        agentic_loop = agentic_loop.with_max_tool_rounds(rounds);
    }

    let mut system_prompt = SystemPrompt::new()
        .with_capabilities(agentic_loop.registry().describe())
        .with_actor(&actor);
    if let Some(preamble) = &file_config.preamble {
        system_prompt = system_prompt.with_preamble(preamble.clone());
    }
    let system_prompt = system_prompt.build();

    if let Some(prompt) = args.prompt {
        turn::run_turn(
            &agentic_loop,
            vec![Message::user(prompt)],
            &system_prompt,
            &actor,
            args.stream,
        )
        .await?;
        return Ok(());
    }

    eprintln!(
        "crm-agent ({}) as {} in tenant {}. Ctrl-C cancels a request, Ctrl-D exits.",
        config.llm.anthropic_model,
        actor.display_name(),
        actor.tenant_id
    );

    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await.context("failed to read input")? else {
            eprintln!("Goodbye.");
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let mut request = history.clone();
        request.push(Message::user(input));
        match turn::run_turn(&agentic_loop, request, &system_prompt, &actor, args.stream).await {
            Ok(Some(outcome)) => history = outcome.messages,
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "Agentic loop error");
                eprintln!("error: {e:#}");
            }
        }
    }

    Ok(())
}
