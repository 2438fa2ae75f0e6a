//! The uniform tool-execution boundary.
//!
//! Whatever happens inside a tool (bad input, store failure, even a panic)
//! comes back out as a [`ToolOutcome`]. Nothing is raised past this point.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::actor::Actor;
use crate::registry::ToolRegistry;
use crate::tool::{ToolContext, ToolOutcome};

/// Executes a named tool for an actor and reports the outcome as data.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, name: &str, input: Value, actor: &Actor) -> ToolOutcome;
}

/// Dispatches to the tools of a [`ToolRegistry`], validating each input
/// against the tool's declared schema first.
pub struct RegistryExecutor {
    registry: Arc<ToolRegistry>,
}

impl RegistryExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ToolExecutor for RegistryExecutor {
    async fn execute(&self, name: &str, input: Value, actor: &Actor) -> ToolOutcome {
        let (Some(tool), Some(definition)) = (self.registry.get(name), self.registry.definition(name))
        else {
            warn!(tool = %name, "unknown tool requested");
            return ToolOutcome::failed(format!("Unknown tool: {name}"));
        };

        if let Err(reason) = validate_input(&definition.input_schema, &input) {
            debug!(tool = %name, %reason, "tool input rejected by schema");
            return ToolOutcome::failed(reason);
        }

        let context = ToolContext {
            actor: actor.clone(),
        };
        match AssertUnwindSafe(tool.execute(input, &context))
            .catch_unwind()
            .await
        {
            Ok(Ok(output)) => ToolOutcome::succeeded(output),
            Ok(Err(e)) => {
                info!(tool = %name, error = %e, "tool reported failure");
                ToolOutcome::failed(e.to_string())
            }
            Err(_) => {
                error!(tool = %name, "tool panicked");
                ToolOutcome::failed(format!("Tool '{name}' crashed"))
            }
        }
    }
}

/// Shallow schema check: the input is an object carrying every `required`
/// property, and declared primitive property types match.
pub fn validate_input(schema: &Value, input: &Value) -> Result<(), String> {
    let Some(obj) = input.as_object() else {
        return Err("invalid tool input: expected a JSON object".to_string());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if obj.get(key).map_or(true, Value::is_null) {
                return Err(format!("invalid tool input: missing required field '{key}'"));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(Value::as_object) {
        for (key, value) in obj {
            let Some(expected) = props
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            let ok = match expected {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "integer" => value.is_i64() || value.is_u64(),
                "boolean" => value.is_boolean(),
                "object" => value.is_object(),
                "array" => value.is_array(),
                _ => true,
            };
            if !ok && !value.is_null() {
                return Err(format!(
                    "invalid tool input: field '{key}' must be of type {expected}"
                ));
            }
        }
    }
    Ok(())
}
