//! System prompt assembly.
//!
//! The prompt is built from a role preamble, the tool capability list taken
//! from the registry, the acting user, caller-supplied context sections and
//! the working guidelines. Empty parts are skipped.

use crate::actor::Actor;
use crate::tool::ToolDefinition;

pub const DEFAULT_PREAMBLE: &str = "You are an AI Account Manager assistant for a property \
appraisal management company. You help manage client relationships, track goals, and \
coordinate outreach.";

pub const DEFAULT_GUIDELINES: &str = "Guidelines:
- Be helpful, concise, and action-oriented
- ALWAYS use tools to get accurate, up-to-date information. NEVER assume or invent data
- When the user asks about cards, use getAllCards to check the current state first
- When asked about contacts, use searchContacts to find individual people
- When asked about clients or companies, use searchClients to find organizations
- To add a contact, FIRST use searchClients to get the client id, THEN call createContact with it
- If the client doesn't exist, tell the user instead of creating placeholder cards
- When creating cards, provide clear rationales
- Never claim to have checked something without actually calling a tool";

/// Builder for the system prompt of one conversation.
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    preamble: String,
    capabilities: Vec<ToolDefinition>,
    actor: Option<Actor>,
    sections: Vec<(String, String)>,
    guidelines: String,
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self {
            preamble: DEFAULT_PREAMBLE.to_string(),
            capabilities: Vec::new(),
            actor: None,
            sections: Vec::new(),
            guidelines: DEFAULT_GUIDELINES.to_string(),
        }
    }
}

impl SystemPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    /// Advertise these tools, typically `registry.describe()`.
    pub fn with_capabilities(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.capabilities = tools;
        self
    }

    pub fn with_actor(mut self, actor: &Actor) -> Self {
        self.actor = Some(actor.clone());
        self
    }

    /// Add a titled context block (task details, card under review, ...).
    pub fn with_section(mut self, title: impl Into<String>, body: impl Into<String>) -> Self {
        self.sections.push((title.into(), body.into()));
        self
    }

    pub fn with_guidelines(mut self, guidelines: impl Into<String>) -> Self {
        self.guidelines = guidelines.into();
        self
    }

    pub fn build(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        push_non_empty(&mut parts, self.preamble.trim().to_string());

        if !self.capabilities.is_empty() {
            let lines: Vec<String> = self
                .capabilities
                .iter()
                .map(|t| format!("- {} ({})", first_line(&t.description), t.name))
                .collect();
            parts.push(format!("Your capabilities:\n{}", lines.join("\n")));
        }

        if let Some(actor) = &self.actor {
            parts.push(format!(
                "Current context:\n- User: {}\n- Organization ID: {}",
                actor.display_name(),
                actor.tenant_id
            ));
        }

        for (title, body) in &self.sections {
            let body = body.trim();
            if body.is_empty() {
                continue;
            }
            parts.push(format!("{}:\n{}", title.trim(), body));
        }

        push_non_empty(&mut parts, self.guidelines.trim().to_string());

        parts.join("\n\n")
    }
}

fn push_non_empty(parts: &mut Vec<String>, part: String) {
    if !part.is_empty() {
        parts.push(part);
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("").trim_end_matches('.')
}
