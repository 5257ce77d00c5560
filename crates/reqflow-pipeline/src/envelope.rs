//! `{id, method, params}` → `{id, response | error}` request handling.
//!
//! Every stage operation is reachable by method name. Unknown methods are
//! answered with an explicit error, never dropped.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use reqflow_analysis as analysis;
use reqflow_types::{AnalysisOutput, Chunk, ReqflowError, Requirement, Stage, Story, StoryAnalysisReport};

use crate::orchestrator::{Orchestrator, PipelineInput};
use crate::tools::parse_arg;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure context for whole-pipeline runs: `{stage, partial}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl RpcResponse {
    pub fn ok(id: Value, response: Value) -> Self {
        Self {
            id,
            response: Some(response),
            error: None,
            details: None,
        }
    }

    pub fn err(id: Value, error: impl Into<String>) -> Self {
        Self {
            id,
            response: None,
            error: Some(error.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Answers one request. Errors are folded into the envelope.
pub async fn handle_request(orchestrator: &Orchestrator, request: RpcRequest) -> RpcResponse {
    if request.method == "run_pipeline" {
        return run_pipeline_request(orchestrator, request).await;
    }
    match dispatch_method(orchestrator, &request.method, &request.params).await {
        Ok(response) => RpcResponse::ok(request.id, response),
        Err(e) => {
            tracing::warn!(method = %request.method, error = %e, "Request failed");
            RpcResponse::err(request.id, e.to_string())
        }
    }
}

/// Whole-pipeline runs keep the failing stage and whatever finished before it.
async fn run_pipeline_request(orchestrator: &Orchestrator, request: RpcRequest) -> RpcResponse {
    let params = match request.params {
        Value::Null => json!({}),
        params => params,
    };
    let input: PipelineInput = match serde_json::from_value(params) {
        Ok(input) => input,
        Err(e) => {
            let error = ReqflowError::invalid_input(Stage::Ingest, e.to_string());
            return RpcResponse::err(request.id, error.to_string())
                .with_details(json!({ "stage": Stage::Ingest.as_str(), "partial": {} }));
        }
    };
    match orchestrator.run_pipeline(input).await {
        Ok(result) => RpcResponse::ok(request.id, json!({ "ok": true, "result": result })),
        Err(failure) => {
            tracing::warn!(stage = %failure.stage, error = %failure.error, "Pipeline request failed");
            let partial = serde_json::to_value(&failure.partial).unwrap_or(Value::Null);
            RpcResponse::err(request.id, failure.describe())
                .with_details(json!({ "stage": failure.stage.as_str(), "partial": partial }))
        }
    }
}

/// Parses and answers one line of newline-delimited JSON.
pub async fn handle_line(orchestrator: &Orchestrator, line: &str) -> RpcResponse {
    match serde_json::from_str::<RpcRequest>(line) {
        Ok(request) => handle_request(orchestrator, request).await,
        Err(_) => RpcResponse::err(Value::Null, "invalid json"),
    }
}

/// Runs a single stage operation by name.
pub async fn dispatch_method(
    orchestrator: &Orchestrator,
    method: &str,
    params: &Value,
) -> Result<Value, ReqflowError> {
    tracing::debug!(method, "Dispatching request");

    match method {
        "ingest" | "ingest_raw" => {
            let items: Vec<String> = required(params, "items", Stage::Ingest)?;
            Ok(json!({ "ok": true, "chunks": orchestrator.ingest(&items) }))
        }
        "normalize" => {
            let chunks = chunks_param(params, Stage::Normalize)?;
            let one_line = params
                .get("one_line")
                .and_then(Value::as_bool)
                .unwrap_or(orchestrator.config().one_line_normalize);
            let normalized = analysis::normalize(&chunks, one_line);
            Ok(json!({ "ok": true, "chunks": normalized }))
        }
        "extract_stories" => {
            let chunks = chunks_param(params, Stage::ExtractStories)?;
            Ok(json!({ "ok": true, "stories": orchestrator.extract_stories(&chunks) }))
        }
        "analyze" | "analyze_stories" => {
            let stories: Vec<Story> = required(params, "stories", Stage::Analyze)?;
            let report = orchestrator.analyze(&stories).await?;
            Ok(json!({
                "ok": true,
                "stories": report.stories,
                "analysis": {
                    "issues": report.analysis.issues,
                    "suggestions": report.analysis.suggestions,
                    "summary": report.summary,
                },
            }))
        }
        "analyze_text" | "analyze_requirement" => {
            let chunks = chunks_param(params, Stage::Analyze)?;
            let result = orchestrator.engine().analyze_text_chunks(&chunks);
            Ok(json!({ "ok": true, "result": result }))
        }
        "suggest_improvements" => {
            let stories: Vec<Story> = required(params, "stories", Stage::Analyze)?;
            let generator = orchestrator.capabilities().generator.as_ref();
            let suggestions = analysis::suggest_improvements(generator, &stories).await;
            Ok(json!({ "ok": true, "result": { "suggestions": suggestions } }))
        }
        "identify_requirements" => {
            let stage = Stage::IdentifyRequirements;
            let stories = parse_arg::<Vec<Story>>(params, "stories", stage)?.unwrap_or_default();
            let requirements = if stories.is_empty() {
                let chunks = parse_arg::<Vec<Chunk>>(params, "chunks", stage)?.unwrap_or_default();
                analysis::identify_from_chunks(&chunks)
            } else {
                let analyzed = parse_arg::<StoryAnalysisReport>(params, "analysis", stage)?;
                if use_llm(params) {
                    orchestrator.identify_augmented(&stories, analyzed.as_ref()).await
                } else {
                    orchestrator.identify(&stories, analyzed.as_ref())
                }
            };
            Ok(json!({ "ok": true, "requirements": requirements }))
        }
        "prioritize" => {
            let requirements: Vec<Requirement> = required(params, "requirements", Stage::Prioritize)?;
            Ok(json!({ "ok": true, "requirements": orchestrator.prioritize(&requirements) }))
        }
        "identify_business_goals" => {
            let requirements: Vec<Requirement> =
                required(params, "requirements", Stage::IdentifyRequirements)?;
            Ok(json!({ "ok": true, "goals": analysis::identify_business_goals(&requirements) }))
        }
        "validate_requirements" => {
            let requirements = params.get("requirements").cloned().unwrap_or_else(|| json!([]));
            let issues = analysis::validate_requirements_value(&requirements);
            Ok(json!({ "ok": true, "issues": issues }))
        }
        "validate_report" => {
            let count = params
                .get("requirements")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            let report = params.get("report").filter(|r| !r.is_null());
            let issues = analysis::validate_report(report, count);
            Ok(json!({ "ok": true, "issues": issues }))
        }
        "llm_check" => {
            let text = params.get("text").and_then(Value::as_str).unwrap_or_default();
            let instruction = params.get("instruction").and_then(Value::as_str);
            let generator = orchestrator.capabilities().generator.as_ref();
            let result = analysis::llm_check(generator, text, instruction).await;
            Ok(json!({ "ok": true, "result": result }))
        }
        "generate_report" => {
            let requirements: Vec<Requirement> = required(params, "requirements", Stage::BuildReport)?;
            Ok(json!({ "ok": true, "report": analysis::generate_report(&requirements) }))
        }
        "markdown_table" => {
            let requirements: Vec<Requirement> = required(params, "requirements", Stage::BuildReport)?;
            Ok(json!({ "ok": true, "markdown": analysis::markdown_table(&requirements) }))
        }
        "mermaid_diagram" => {
            let requirements: Vec<Requirement> = required(params, "requirements", Stage::BuildReport)?;
            let edges = parse_arg::<Vec<(String, String)>>(params, "edges", Stage::BuildReport)?
                .unwrap_or_default();
            Ok(json!({ "ok": true, "mermaid": analysis::mermaid_diagram(&requirements, &edges) }))
        }
        "build_report" | "build_final_report" => {
            let stage = Stage::BuildReport;
            let requirements = match parse_arg::<Vec<Requirement>>(params, "requirements", stage)? {
                Some(reqs) => reqs,
                None => required(params, "core_requirements", stage)?,
            };
            let output = parse_arg::<AnalysisOutput>(params, "analyzer_output", stage)?
                .unwrap_or_default();
            let report = if use_llm(params) {
                orchestrator.build_report_augmented(&requirements, &output).await
            } else {
                orchestrator.build_report(&requirements, &output)
            };
            Ok(json!({
                "ok": true,
                "final_report_markdown": report.markdown,
                "final_report_csv": report.csv,
                "final_report_mermaid": report.mermaid,
            }))
        }
        "run_pipeline" => {
            let input: PipelineInput = serde_json::from_value(params.clone())
                .map_err(|e| ReqflowError::invalid_input(Stage::Ingest, e.to_string()))?;
            let result = orchestrator
                .run_pipeline(input)
                .await
                .map_err(|failure| failure.into_error())?;
            Ok(json!({ "ok": true, "result": result }))
        }
        other => Err(ReqflowError::UnknownMethod(other.to_string())),
    }
}

fn required<T: DeserializeOwned>(params: &Value, key: &str, stage: Stage) -> Result<T, ReqflowError> {
    parse_arg(params, key, stage)?
        .ok_or_else(|| ReqflowError::invalid_input(stage, format!("'{key}' is required")))
}

fn use_llm(params: &Value) -> bool {
    params.get("use_llm").and_then(Value::as_bool).unwrap_or(false)
}

/// Chunks given either as `{id, text}` objects or as bare strings.
fn chunks_param(params: &Value, stage: Stage) -> Result<Vec<Chunk>, ReqflowError> {
    let items = params
        .get("chunks")
        .and_then(Value::as_array)
        .ok_or_else(|| ReqflowError::invalid_input(stage, "'chunks' must be a list"))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::String(text) => Ok(Chunk::new(format!("chunk-{}", i + 1), text.clone())),
            other => serde_json::from_value(other.clone()).map_err(|e| {
                ReqflowError::invalid_input(stage, format!("chunk {} is malformed: {e}", i + 1))
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn call(method: &str, params: Value) -> Result<Value, ReqflowError> {
        let orch = Orchestrator::offline().unwrap();
        dispatch_method(&orch, method, &params).await
    }

    #[tokio::test]
    async fn unknown_method_is_an_error() {
        let orch = Orchestrator::offline().unwrap();
        let resp = handle_request(
            &orch,
            RpcRequest {
                id: json!("x1"),
                method: "frobnicate".into(),
                params: json!({}),
            },
        )
        .await;
        assert_eq!(resp.id, json!("x1"));
        assert_eq!(resp.error.as_deref(), Some("unknown method frobnicate"));
        assert!(resp.response.is_none());
    }

    #[tokio::test]
    async fn invalid_json_line_is_answered() {
        let orch = Orchestrator::offline().unwrap();
        let resp = handle_line(&orch, "{not json").await;
        assert_eq!(resp.error.as_deref(), Some("invalid json"));
    }

    #[tokio::test]
    async fn ingest_numbers_chunks() {
        let out = call("ingest_raw", json!({ "items": ["a", "b"] })).await.unwrap();
        assert_eq!(out["chunks"][1], json!({ "id": "chunk-2", "text": "b" }));
    }

    #[tokio::test]
    async fn missing_required_field_is_input_error() {
        let err = call("prioritize", json!({})).await.unwrap_err();
        assert!(matches!(err, ReqflowError::InvalidInput { stage: Stage::Prioritize, .. }));
        assert_eq!(err.http_status(), 400);
    }

    #[tokio::test]
    async fn analyze_text_accepts_bare_strings() {
        let out = call("analyze_requirement", json!({ "chunks": ["The page must load fast."] }))
            .await
            .unwrap();
        let issues = out["result"]["issues"].as_array().unwrap();
        assert!(issues.iter().any(|i| i["type"] == "ambiguity"));
        assert!(issues.iter().any(|i| i["type"] == "unverifiable"));
    }

    #[tokio::test]
    async fn identify_falls_back_to_chunks() {
        let out = call(
            "identify_requirements",
            json!({ "chunks": [{ "id": "chunk-1", "text": "Login page\nUsers sign in with email" }] }),
        )
        .await
        .unwrap();
        assert_eq!(out["requirements"][0]["title"], "Login page");
        assert_eq!(out["requirements"][0]["description"], "Users sign in with email");
    }

    #[tokio::test]
    async fn validate_report_checks_count() {
        let out = call(
            "validate_report",
            json!({ "report": { "count": 1 }, "requirements": [{}, {}] }),
        )
        .await
        .unwrap();
        assert_eq!(
            out["issues"],
            json!(["report.count (1) does not match requirements length (2)"])
        );

        let out = call("validate_report", json!({ "requirements": [] })).await.unwrap();
        assert_eq!(out["issues"], json!(["no report provided"]));
    }

    #[tokio::test]
    async fn validate_requirements_rejects_non_list() {
        let out = call("validate_requirements", json!({ "requirements": "R1" }))
            .await
            .unwrap();
        assert_eq!(out["issues"], json!(["requirements must be a list"]));
    }

    #[tokio::test]
    async fn llm_check_without_capability() {
        let out = call("llm_check", json!({ "text": "anything" })).await.unwrap();
        assert_eq!(out["result"], json!({ "ok": false, "note": "LLM not available" }));
    }

    #[tokio::test]
    async fn mermaid_diagram_with_edges() {
        let out = call(
            "mermaid_diagram",
            json!({
                "requirements": [{ "id": "R1", "title": "A" }, { "id": "R2", "title": "B" }],
                "edges": [["R1", "R2"]],
            }),
        )
        .await
        .unwrap();
        assert_eq!(
            out["mermaid"],
            "graph TD\n    R1[\"A\"]\n    R2[\"B\"]\n    R1 --> R2"
        );
    }

    #[tokio::test]
    async fn run_pipeline_without_input_fails_at_ingest() {
        let err = call("run_pipeline", json!({ "project_id": "p" })).await.unwrap_err();
        assert!(matches!(err, ReqflowError::InvalidInput { stage: Stage::Ingest, .. }));
    }

    #[tokio::test]
    async fn build_final_report_accepts_core_requirements() {
        let out = call(
            "build_final_report",
            json!({ "core_requirements": [{ "id": "R1", "title": "Export", "priority": 1 }] }),
        )
        .await
        .unwrap();
        assert!(out["final_report_csv"]
            .as_str()
            .unwrap()
            .starts_with("req_id,title,priority,score,issues_count"));
        assert!(out["final_report_mermaid"].as_str().unwrap().contains(":::clean"));
    }
}
