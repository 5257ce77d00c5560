use async_trait::async_trait;
use serde_json::{json, Value};

use reqflow_analysis as analysis;
use reqflow_llm::ToolDefinition;
use reqflow_types::{AnalysisOutput, ReqflowError, Requirement, Stage, Story};

use super::{parse_arg, str_arg, success, Tool, ToolContext};
use crate::orchestrator::Orchestrator;

const DEFAULT_SEARCH_K: usize = 3;

fn definition(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}

fn no_parameters() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn cached_stories(ctx: &ToolContext<'_>, stage: Stage) -> Result<Vec<Story>, ReqflowError> {
    ctx.artifacts
        .stories
        .clone()
        .ok_or_else(|| ReqflowError::invalid_input(stage, "no stories yet, run ingest first"))
}

fn cached_requirements(ctx: &ToolContext<'_>, stage: Stage) -> Result<Vec<Requirement>, ReqflowError> {
    ctx.artifacts
        .requirements
        .clone()
        .ok_or_else(|| ReqflowError::invalid_input(stage, "no requirements yet, run identify first"))
}

// ---------------------------------------------------------------------------
// ingest
// ---------------------------------------------------------------------------

pub struct IngestTool;

#[async_trait]
impl Tool for IngestTool {
    fn definition(&self) -> ToolDefinition {
        definition(
            "ingest",
            "Collect raw requirement text: split into chunks, normalize, and extract user stories.",
            json!({
                "type": "object",
                "required": ["text"],
                "properties": {
                    "text": {
                        "type": "string",
                        "description": "Raw requirements text, e.g. 'Story: ...' blocks"
                    }
                }
            }),
        )
    }

    async fn execute(&self, arguments: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ReqflowError> {
        let text = str_arg(&arguments, "text")
            .ok_or_else(|| ReqflowError::invalid_input(Stage::Ingest, "text is required"))?;

        let (chunks, stories) = ctx.orchestrator.collect(text);
        let message = format!("Extracted {} stories from {} chunks", stories.len(), chunks.len());
        let data = json!({ "chunks": chunks.len(), "stories": stories });
        ctx.artifacts.set_stories(stories);
        Ok(success(message, data))
    }
}

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

pub struct AnalyzeTool;

#[async_trait]
impl Tool for AnalyzeTool {
    fn definition(&self) -> ToolDefinition {
        definition(
            "analyze",
            "Detect ambiguity, missing acceptance criteria, conflicts and unverifiable wording in the session's stories.",
            json!({
                "type": "object",
                "properties": {
                    "stories": {
                        "type": "array",
                        "description": "Stories to analyze instead of the ones from the last ingest",
                        "items": { "type": "object" }
                    }
                }
            }),
        )
    }

    async fn execute(&self, arguments: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ReqflowError> {
        if let Some(stories) = parse_arg::<Vec<Story>>(&arguments, "stories", Stage::Analyze)? {
            ctx.artifacts.set_stories(stories);
        }
        let stories = cached_stories(ctx, Stage::Analyze)?;

        let report = ctx.orchestrator.analyze(&stories).await?;
        let message = format!(
            "Found {} issues across {} stories",
            report.summary.total_issues, report.summary.total_stories
        );
        let data = json!({
            "summary": report.summary,
            "issues": report.analysis.issues,
            "suggestions": report.analysis.suggestions,
        });
        ctx.artifacts.analysis = Some(report);
        Ok(success(message, data))
    }
}

// ---------------------------------------------------------------------------
// identify
// ---------------------------------------------------------------------------

pub struct IdentifyTool;

#[async_trait]
impl Tool for IdentifyTool {
    fn definition(&self) -> ToolDefinition {
        definition(
            "identify",
            "Turn the session's stories into requirements, carrying over any analysis.",
            no_parameters(),
        )
    }

    async fn execute(&self, _arguments: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ReqflowError> {
        let stories = cached_stories(ctx, Stage::IdentifyRequirements)?;
        let requirements = ctx
            .orchestrator
            .identify(&stories, ctx.artifacts.analysis.as_ref());

        let message = format!("Identified {} requirements", requirements.len());
        let data = json!({ "requirements": requirements });
        ctx.artifacts.requirements = Some(requirements);
        ctx.artifacts.diagram = None;
        ctx.artifacts.report = None;
        Ok(success(message, data))
    }
}

// ---------------------------------------------------------------------------
// prioritize
// ---------------------------------------------------------------------------

pub struct PrioritizeTool;

#[async_trait]
impl Tool for PrioritizeTool {
    fn definition(&self) -> ToolDefinition {
        definition(
            "prioritize",
            "Score the session's requirements and rank them, 1 being most important.",
            no_parameters(),
        )
    }

    async fn execute(&self, _arguments: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ReqflowError> {
        let requirements = cached_requirements(ctx, Stage::Prioritize)?;
        let prioritized = ctx.orchestrator.prioritize(&requirements);

        let message = match prioritized.first() {
            Some(top) => format!(
                "Prioritized {} requirements; top is {} ({})",
                prioritized.len(),
                top.id,
                top.title
            ),
            None => "No requirements to prioritize".to_string(),
        };
        let data = json!({ "requirements": prioritized });
        ctx.artifacts.requirements = Some(prioritized);
        Ok(success(message, data))
    }
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

pub struct ValidateTool;

#[async_trait]
impl Tool for ValidateTool {
    fn definition(&self) -> ToolDefinition {
        definition(
            "validate",
            "Check the session's requirements for missing id, title or priority.",
            no_parameters(),
        )
    }

    async fn execute(&self, _arguments: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ReqflowError> {
        let requirements = cached_requirements(ctx, Stage::Validate)?;
        let errors = ctx.orchestrator.validate(&requirements);

        let message = if errors.is_empty() {
            format!("All {} requirements are valid", requirements.len())
        } else {
            format!("Found {} validation problems", errors.len())
        };
        Ok(success(message, json!({ "valid": errors.is_empty(), "errors": errors })))
    }
}

// ---------------------------------------------------------------------------
// generate_diagram
// ---------------------------------------------------------------------------

pub struct GenerateDiagramTool;

#[async_trait]
impl Tool for GenerateDiagramTool {
    fn definition(&self) -> ToolDefinition {
        definition(
            "generate_diagram",
            "Render the requirements report and a mermaid context diagram.",
            json!({
                "type": "object",
                "properties": {
                    "edges": {
                        "type": "array",
                        "description": "Optional dependency edges as [from_id, to_id] pairs",
                        "items": {
                            "type": "array",
                            "items": { "type": "string" }
                        }
                    }
                }
            }),
        )
    }

    async fn execute(&self, arguments: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ReqflowError> {
        let edges = parse_arg::<Vec<(String, String)>>(&arguments, "edges", Stage::BuildReport)?
            .unwrap_or_default();
        let requirements = cached_requirements(ctx, Stage::BuildReport)?;

        let output = ctx
            .artifacts
            .analysis
            .as_ref()
            .map(|a| a.analysis.clone())
            .unwrap_or_else(AnalysisOutput::default);
        let report = ctx.orchestrator.build_report(&requirements, &output);
        let diagram = if edges.is_empty() {
            report.mermaid.clone()
        } else {
            analysis::mermaid_diagram(&requirements, &edges)
        };

        let data = json!({ "diagram": diagram, "markdown": report.markdown });
        ctx.artifacts.diagram = Some(diagram);
        ctx.artifacts.report = Some(report);
        Ok(success(
            format!("Generated diagram for {} requirements", requirements.len()),
            data,
        ))
    }
}

// ---------------------------------------------------------------------------
// store_context / search_context
// ---------------------------------------------------------------------------

pub struct StoreContextTool;

#[async_trait]
impl Tool for StoreContextTool {
    fn definition(&self) -> ToolDefinition {
        definition(
            "store_context",
            "Remember a piece of project context for later semantic search.",
            json!({
                "type": "object",
                "required": ["text"],
                "properties": {
                    "text": { "type": "string", "description": "Text to remember" }
                }
            }),
        )
    }

    async fn execute(&self, arguments: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ReqflowError> {
        let text = str_arg(&arguments, "text")
            .ok_or_else(|| ReqflowError::invalid_input(Stage::Ingest, "text is required"))?;

        let embedding = embed_or_empty(ctx.orchestrator, text).await;
        if !ctx.artifacts.context.add(text, embedding) {
            return Ok(json!({
                "success": false,
                "message": "Embedding unavailable, context not stored",
            }));
        }
        Ok(success(
            "Context stored",
            json!({ "stored": ctx.artifacts.context.len() }),
        ))
    }
}

/// A failing embedder reads as "no embedding": storing and searching are
/// skipped instead of failing the tool call.
async fn embed_or_empty(orchestrator: &Orchestrator, text: &str) -> Vec<f32> {
    match orchestrator.capabilities().embedder.embed(text).await {
        Ok(embedding) => embedding,
        Err(e) => {
            tracing::warn!(error = %e, "Embedding failed, context operation skipped");
            Vec::new()
        }
    }
}

pub struct SearchContextTool;

#[async_trait]
impl Tool for SearchContextTool {
    fn definition(&self) -> ToolDefinition {
        definition(
            "search_context",
            "Find previously stored context most similar to a query.",
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": { "type": "string", "description": "What to look for" },
                    "k": { "type": "integer", "description": "Maximum hits", "default": DEFAULT_SEARCH_K }
                }
            }),
        )
    }

    async fn execute(&self, arguments: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ReqflowError> {
        let query = str_arg(&arguments, "query")
            .ok_or_else(|| ReqflowError::invalid_input(Stage::Ingest, "query is required"))?;
        let k = arguments
            .get("k")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_SEARCH_K);

        let embedding = embed_or_empty(ctx.orchestrator, query).await;
        let hits = ctx.artifacts.context.search(&embedding, k);
        Ok(success(
            format!("Found {} matching snippets", hits.len()),
            json!({ "hits": hits }),
        ))
    }
}

// ---------------------------------------------------------------------------
// help / clear
// ---------------------------------------------------------------------------

pub struct HelpTool;

#[async_trait]
impl Tool for HelpTool {
    fn definition(&self) -> ToolDefinition {
        definition("help", "Explain the available analysis steps.", no_parameters())
    }

    async fn execute(&self, _arguments: Value, _ctx: &mut ToolContext<'_>) -> Result<Value, ReqflowError> {
        Ok(success(
            "Steps: ingest -> analyze -> identify -> prioritize -> validate -> generate_diagram. \
             Use store_context and search_context to keep project notes, clear to start over.",
            json!({}),
        ))
    }
}

pub struct ClearTool;

#[async_trait]
impl Tool for ClearTool {
    fn definition(&self) -> ToolDefinition {
        definition(
            "clear",
            "Forget the session's stories, analysis, requirements and report.",
            no_parameters(),
        )
    }

    async fn execute(&self, _arguments: Value, ctx: &mut ToolContext<'_>) -> Result<Value, ReqflowError> {
        ctx.artifacts.clear();
        Ok(success("Session cleared", json!({})))
    }
}
