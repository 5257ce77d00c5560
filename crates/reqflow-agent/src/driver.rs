//! LLM tool-calling loop over the pipeline's stage tools.
//!
//! Each user turn is sent with the tool definitions; tool calls are executed
//! against the session artifacts and their results fed back until the model
//! answers in plain text or the round budget runs out.

use std::sync::Arc;
use std::time::Duration;

use reqflow_llm::{ContentPart, LlmClient, Message, Request, Role, ToolCallResult};
use reqflow_pipeline::{ToolContext, ToolRegistry};
use reqflow_types::ReqflowError;

const MAX_TOOL_OUTPUT_LEN: usize = 20_000;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a Requirements Engineering Assistant. \
Help the user analyze and write better requirements. \
Use the tools to ingest text, analyze stories, identify and prioritize requirements, \
validate them and generate a context diagram. \
Pipeline: Collector -> Analyzer -> Requirement -> Validator -> Reporter -> Context Diagram";

pub struct ToolDriver {
    client: Arc<LlmClient>,
    tools: ToolRegistry,
    system_prompt: String,
    max_tool_rounds: usize,
    request_timeout: Duration,
    history: Vec<Message>,
}

impl ToolDriver {
    pub fn new(client: Arc<LlmClient>, tools: ToolRegistry, max_tool_rounds: usize) -> Self {
        Self {
            client,
            tools,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tool_rounds,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            history: Vec::new(),
        }
    }

    /// Upper bound for each model round trip.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Processes one user message. Fails with `IterationLimitReached` when the
    /// model is still calling tools after the last allowed round.
    pub async fn process_input(
        &mut self,
        user_input: &str,
        ctx: &mut ToolContext<'_>,
    ) -> Result<String, ReqflowError> {
        self.history.push(Message::user(user_input));

        for round in 0..self.max_tool_rounds {
            let request = self.build_request();
            let response = tokio::time::timeout(self.request_timeout, self.client.complete(&request))
                .await
                .map_err(|_| ReqflowError::RequestTimeout {
                    provider: "llm".into(),
                    timeout_ms: self.request_timeout.as_millis() as u64,
                })??;

            tracing::info!(
                round,
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                finish_reason = ?response.finish_reason,
                tool_calls = response.tool_calls.len(),
                "LLM response received"
            );

            self.history
                .push(assistant_message(&response.text, &response.tool_calls));

            if response.tool_calls.is_empty() {
                return Ok(response.text);
            }

            for tc in &response.tool_calls {
                tracing::debug!(tool = %tc.name, id = %tc.id, "Executing tool call");
                let output = self.tools.dispatch(&tc.name, tc.arguments.clone(), ctx).await;
                let is_error = output.get("error").is_some();
                self.history.push(Message::tool_result(
                    &tc.id,
                    &tc.name,
                    truncate(output.to_string()),
                    is_error,
                ));
            }
        }

        tracing::warn!(max_rounds = self.max_tool_rounds, "Tool round limit reached");
        Err(ReqflowError::IterationLimitReached {
            iterations: self.max_tool_rounds,
        })
    }

    fn build_request(&self) -> Request {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        if !self.system_prompt.is_empty() {
            messages.push(Message::system(&self.system_prompt));
        }
        messages.extend(self.history.iter().cloned());

        Request {
            messages,
            tools: self.tools.definitions(),
            ..Default::default()
        }
    }
}

fn assistant_message(text: &str, tool_calls: &[ToolCallResult]) -> Message {
    let mut parts = Vec::with_capacity(tool_calls.len() + 1);
    if !text.is_empty() {
        parts.push(ContentPart::Text {
            text: text.to_string(),
        });
    }
    for tc in tool_calls {
        parts.push(ContentPart::ToolCall {
            id: tc.id.clone(),
            name: tc.name.clone(),
            arguments: tc.arguments.clone(),
        });
    }
    Message {
        role: Role::Assistant,
        content: parts,
        tool_call_id: None,
    }
}

fn truncate(output: String) -> String {
    if output.chars().count() <= MAX_TOOL_OUTPUT_LEN {
        return output;
    }
    let mut truncated: String = output.chars().take(MAX_TOOL_OUTPUT_LEN).collect();
    truncated.push_str("\n[output truncated]");
    truncated
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use reqflow_llm::{FinishReason, ProviderAdapter, Response, Usage};
    use reqflow_pipeline::{Orchestrator, SessionArtifacts};

    use super::*;

    /// Returns responses from a pre-configured sequence and records requests.
    pub(crate) struct SequenceMockProvider {
        responses: Mutex<VecDeque<Response>>,
        pub(crate) requests: Arc<Mutex<Vec<Request>>>,
    }

    impl SequenceMockProvider {
        pub(crate) fn new(responses: Vec<Response>) -> Self {
            Self {
                responses: Mutex::new(VecDeque::from(responses)),
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for SequenceMockProvider {
        async fn complete(&self, request: &Request) -> Result<Response, ReqflowError> {
            self.requests.lock().unwrap().push(request.clone());
            let next = self.responses.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| text_response("No more responses")))
        }

        fn name(&self) -> &str {
            "mock"
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }

        fn supports_tools(&self) -> bool {
            true
        }
    }

    pub(crate) fn text_response(text: &str) -> Response {
        Response {
            id: "resp".into(),
            text: text.into(),
            tool_calls: vec![],
            usage: Usage::default(),
            model: "mock-model".into(),
            finish_reason: FinishReason::EndTurn,
        }
    }

    pub(crate) fn tool_response(name: &str, arguments: serde_json::Value) -> Response {
        Response {
            id: "resp".into(),
            text: String::new(),
            tool_calls: vec![ToolCallResult {
                id: format!("call-{name}"),
                name: name.into(),
                arguments,
            }],
            usage: Usage::default(),
            model: "mock-model".into(),
            finish_reason: FinishReason::ToolUse,
        }
    }

    pub(crate) fn client_with(provider: SequenceMockProvider) -> Arc<LlmClient> {
        let mut client = LlmClient::new();
        client.register_provider(provider);
        Arc::new(client)
    }

    #[tokio::test]
    async fn plain_answer_ends_the_turn() {
        let client = client_with(SequenceMockProvider::new(vec![text_response("Hello!")]));
        let mut driver = ToolDriver::new(client, ToolRegistry::with_defaults(), 10);
        let orch = Orchestrator::offline().unwrap();
        let mut artifacts = SessionArtifacts::default();
        let mut ctx = ToolContext {
            orchestrator: &orch,
            artifacts: &mut artifacts,
        };

        let reply = driver.process_input("hi", &mut ctx).await.unwrap();
        assert_eq!(reply, "Hello!");
        assert_eq!(driver.history().len(), 2);
    }

    #[tokio::test]
    async fn tool_calls_run_against_session_artifacts() {
        let provider = SequenceMockProvider::new(vec![
            tool_response("ingest", json!({ "text": "Story: Login\nUsers sign in." })),
            tool_response("identify", json!({})),
            text_response("Identified 1 requirement."),
        ]);
        let requests = provider.requests.clone();
        let mut driver = ToolDriver::new(client_with(provider), ToolRegistry::with_defaults(), 10);
        let orch = Orchestrator::offline().unwrap();
        let mut artifacts = SessionArtifacts::default();
        let mut ctx = ToolContext {
            orchestrator: &orch,
            artifacts: &mut artifacts,
        };

        let reply = driver.process_input("analyze my story", &mut ctx).await.unwrap();
        assert_eq!(reply, "Identified 1 requirement.");
        assert_eq!(artifacts.requirements.as_ref().map(Vec::len), Some(1));

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].tools.len(), 10);
        assert_eq!(requests[0].messages[0].role, Role::System);
        // system, user, assistant(call), tool result
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].messages[3].role, Role::Tool);
    }

    #[tokio::test]
    async fn unknown_tool_is_fed_back_as_error() {
        let provider = SequenceMockProvider::new(vec![
            tool_response("deploy", json!({})),
            text_response("Sorry, I cannot deploy."),
        ]);
        let mut driver = ToolDriver::new(client_with(provider), ToolRegistry::with_defaults(), 10);
        let orch = Orchestrator::offline().unwrap();
        let mut artifacts = SessionArtifacts::default();
        let mut ctx = ToolContext {
            orchestrator: &orch,
            artifacts: &mut artifacts,
        };

        driver.process_input("deploy it", &mut ctx).await.unwrap();
        match &driver.history()[2].content[0] {
            ContentPart::ToolResult { content, is_error, .. } => {
                assert!(is_error);
                assert!(content.contains("unknown tool: deploy"));
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn runaway_tool_chain_hits_the_limit() {
        let responses = (0..5).map(|_| tool_response("help", json!({}))).collect();
        let mut driver = ToolDriver::new(
            client_with(SequenceMockProvider::new(responses)),
            ToolRegistry::with_defaults(),
            3,
        );
        let orch = Orchestrator::offline().unwrap();
        let mut artifacts = SessionArtifacts::default();
        let mut ctx = ToolContext {
            orchestrator: &orch,
            artifacts: &mut artifacts,
        };

        let err = driver.process_input("loop", &mut ctx).await.unwrap_err();
        assert!(matches!(err, ReqflowError::IterationLimitReached { iterations: 3 }));
    }

    struct StalledProvider;

    #[async_trait]
    impl ProviderAdapter for StalledProvider {
        async fn complete(&self, _request: &Request) -> Result<Response, ReqflowError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(text_response("too late"))
        }

        fn name(&self) -> &str {
            "stalled"
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }

        fn supports_tools(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn stalled_model_times_out() {
        let mut client = LlmClient::new();
        client.register_provider(StalledProvider);
        let mut driver = ToolDriver::new(Arc::new(client), ToolRegistry::with_defaults(), 10)
            .with_request_timeout(Duration::from_millis(50));
        let orch = Orchestrator::offline().unwrap();
        let mut artifacts = SessionArtifacts::default();
        let mut ctx = ToolContext {
            orchestrator: &orch,
            artifacts: &mut artifacts,
        };

        let started = std::time::Instant::now();
        let err = driver.process_input("hello?", &mut ctx).await.unwrap_err();
        assert!(matches!(err, ReqflowError::RequestTimeout { timeout_ms: 50, .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn long_tool_output_is_truncated() {
        let out = truncate("x".repeat(MAX_TOOL_OUTPUT_LEN + 10));
        assert!(out.ends_with("[output truncated]"));
    }
}
