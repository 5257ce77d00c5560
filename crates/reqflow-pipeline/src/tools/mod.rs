//! Pipeline stages exposed as tools for a conversational driver.
//!
//! A driver picks tools in any order; each call reads and writes the session's
//! [`SessionArtifacts`] so later stages can reuse earlier outputs.

mod builtin;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use reqflow_llm::ToolDefinition;
use reqflow_types::{ReqflowError, Stage};

use crate::events::PipelineEvent;
use crate::orchestrator::Orchestrator;
use crate::session::SessionArtifacts;

pub use builtin::{
    AnalyzeTool, ClearTool, GenerateDiagramTool, HelpTool, IdentifyTool, IngestTool,
    PrioritizeTool, SearchContextTool, StoreContextTool, ValidateTool,
};

/// What a tool may touch while executing.
pub struct ToolContext<'a> {
    pub orchestrator: &'a Orchestrator,
    pub artifacts: &'a mut SessionArtifacts,
}

/// Trait for tools that can be invoked by a conversational driver.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Returns the `{success, message, ...}` payload on success.
    async fn execute(
        &self,
        arguments: Value,
        ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ReqflowError>;
}

/// Registry that holds named tools and provides lookup.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// The full stage tool set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(IngestTool);
        registry.register(AnalyzeTool);
        registry.register(IdentifyTool);
        registry.register(PrioritizeTool);
        registry.register(ValidateTool);
        registry.register(GenerateDiagramTool);
        registry.register(StoreContextTool);
        registry.register(SearchContextTool);
        registry.register(HelpTool);
        registry.register(ClearTool);
        registry
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let def = tool.definition();
        self.tools.insert(def.name, Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Definitions sorted by name so prompts are stable across runs.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Runs `name` and folds any failure into an `{error}` payload. Unknown
    /// names are reported, never ignored.
    pub async fn dispatch(&self, name: &str, arguments: Value, ctx: &mut ToolContext<'_>) -> Value {
        let outcome = match self.get(name) {
            Some(tool) => tool.execute(arguments, ctx).await,
            None => Err(ReqflowError::UnknownTool(name.to_string())),
        };

        let success = outcome.is_ok();
        ctx.orchestrator.events().emit(PipelineEvent::ToolInvoked {
            tool: name.to_string(),
            success,
        });

        match outcome {
            Ok(value) => {
                tracing::debug!(tool = name, "Tool completed");
                value
            }
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "Tool failed");
                json!({ "error": e.to_string() })
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

/// `{success: true, message}` merged with the fields of `data`.
pub(crate) fn success(message: impl Into<String>, data: Value) -> Value {
    let mut out = json!({ "success": true, "message": message.into() });
    if let (Some(map), Value::Object(extra)) = (out.as_object_mut(), data) {
        map.extend(extra);
    }
    out
}

pub(crate) fn str_arg<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Deserializes an optional field, attributing bad shapes to `stage`.
pub(crate) fn parse_arg<T: DeserializeOwned>(
    arguments: &Value,
    key: &str,
    stage: Stage,
) -> Result<Option<T>, ReqflowError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| ReqflowError::invalid_input(stage, format!("'{key}' is malformed: {e}"))),
    }
}
