use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use reqflow_pipeline::{Orchestrator, PipelineInput, SessionHandle, ToolContext};
use reqflow_types::{PipelineResult, ReqflowError};

use crate::commands::{looks_like_requirement, Command, HELP_TEXT};
use crate::driver::ToolDriver;
use crate::store::{ConversationStore, MessageRole, NewMessage, PIPELINE_RESULT_MESSAGE, TEXT_MESSAGE};

const SUMMARY_PREVIEW_CHARS: usize = 500;

const FALLBACK_REPLY: &str =
    "I am the Requirements Assistant. Enter requirements to analyze them, or type /help for instructions.";

/// `Idle → Collecting → Analyzing → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Collecting,
    Analyzing,
}

/// One chat participant's view of the assistant.
pub struct ConversationAgent {
    session_id: String,
    orchestrator: Orchestrator,
    store: Arc<dyn ConversationStore>,
    artifacts: SessionHandle,
    driver: Option<ToolDriver>,
    conversation_id: Option<i64>,
    collected: Vec<String>,
    state: AgentState,
}

impl ConversationAgent {
    pub fn new(
        session_id: impl Into<String>,
        orchestrator: Orchestrator,
        store: Arc<dyn ConversationStore>,
        artifacts: SessionHandle,
    ) -> Self {
        let session_id = session_id.into();
        tracing::info!(session_id = %session_id, "Conversation agent created");
        Self {
            session_id,
            orchestrator,
            store,
            artifacts,
            driver: None,
            conversation_id: None,
            collected: Vec::new(),
            state: AgentState::Idle,
        }
    }

    /// Routes free-form chat through an LLM with the stage tools.
    pub fn with_driver(mut self, driver: ToolDriver) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Continues an existing stored conversation instead of opening a new one.
    pub fn with_conversation(mut self, conversation_id: i64) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn collected(&self) -> &[String] {
        &self.collected
    }

    pub fn conversation_id(&self) -> Option<i64> {
        self.conversation_id
    }

    /// Answers one user message. Persistence failures are logged, never
    /// surfaced to the user.
    pub async fn handle_message(&mut self, message: &str) -> String {
        self.ensure_conversation().await;
        self.persist(MessageRole::User, message, TEXT_MESSAGE).await;

        let reply = self.respond(message.trim()).await;

        self.persist(MessageRole::Assistant, &reply, TEXT_MESSAGE).await;
        reply
    }

    async fn respond(&mut self, text: &str) -> String {
        match Command::parse(text) {
            Some(Command::Ping) => return "pong".to_string(),
            Some(Command::Help) => return HELP_TEXT.to_string(),
            Some(Command::Clear) => {
                self.collected.clear();
                self.state = AgentState::Idle;
                self.artifacts.lock().await.clear();
                if let Some(driver) = self.driver.as_mut() {
                    driver.reset();
                }
                return "Requirements cleared.".to_string();
            }
            Some(Command::Analyze) => {
                if self.collected.is_empty() {
                    return "No requirements yet. Enter some requirements first.".to_string();
                }
                return self.run_pipeline().await;
            }
            Some(Command::Collect) => {
                self.state = AgentState::Collecting;
                self.collected.clear();
                return "Collecting requirements. Enter them one per message and type /done when finished."
                    .to_string();
            }
            Some(Command::Done) if self.state == AgentState::Collecting => {
                self.state = AgentState::Idle;
                if self.collected.is_empty() {
                    return "No requirements collected.".to_string();
                }
                return self.run_pipeline().await;
            }
            Some(Command::Done) | None => {}
        }

        if self.state == AgentState::Collecting || looks_like_requirement(text) {
            self.collected.push(text.to_string());
            return format!(
                "Saved requirement #{}. Type /analyze to run the analysis.",
                self.collected.len()
            );
        }

        self.converse(text).await
    }

    async fn converse(&mut self, text: &str) -> String {
        let Some(driver) = self.driver.as_mut() else {
            return FALLBACK_REPLY.to_string();
        };

        let mut artifacts = self.artifacts.lock().await;
        let mut ctx = ToolContext {
            orchestrator: &self.orchestrator,
            artifacts: &mut artifacts,
        };
        match driver.process_input(text, &mut ctx).await {
            Ok(reply) => reply,
            Err(ReqflowError::IterationLimitReached { iterations }) => format!(
                "I stopped after {iterations} tool steps without a final answer. Try a more specific request."
            ),
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "LLM turn failed");
                format!("LLM error: {e}")
            }
        }
    }

    // -- pipeline ----------------------------------------------------------

    async fn run_pipeline(&mut self) -> String {
        self.state = AgentState::Analyzing;
        let submitted = self.collected.len();
        let raw_text = self.collected.join("\n\n");
        let project_id = self.project_id();

        let outcome = self
            .orchestrator
            .run_pipeline(PipelineInput::from_text(raw_text, project_id.clone()))
            .await;
        self.state = AgentState::Idle;

        match outcome {
            Ok(result) => {
                self.remember(&result).await;
                self.save_result(&project_id, &result).await;
                format_result(submitted, &result, self.conversation_id)
            }
            Err(failure) => {
                tracing::warn!(session_id = %self.session_id, stage = %failure.stage, "Pipeline failed");
                format!("Pipeline failed: {}", failure.describe())
            }
        }
    }

    /// Makes the run's outputs available to later tool calls.
    async fn remember(&self, result: &PipelineResult) {
        let mut artifacts = self.artifacts.lock().await;
        artifacts.set_stories(result.stories.clone());
        artifacts.requirements = Some(result.prioritized.clone());
        artifacts.diagram = Some(result.report.mermaid.clone());
        artifacts.report = Some(result.report.clone());
    }

    async fn save_result(&self, project_id: &str, result: &PipelineResult) {
        let Some(conversation_id) = self.conversation_id else {
            return;
        };

        let record = json!({
            "type": PIPELINE_RESULT_MESSAGE,
            "project_id": project_id,
            "result": result,
        });
        self.persist(MessageRole::System, &record.to_string(), PIPELINE_RESULT_MESSAGE)
            .await;

        let summary = match serde_json::to_string(result) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Could not serialize pipeline summary");
                return;
            }
        };
        let embedding = match self
            .orchestrator
            .capabilities()
            .embedder
            .embed(&result.report.markdown)
            .await
        {
            Ok(v) if !v.is_empty() => Some(v),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Summary embedding skipped");
                None
            }
        };
        if let Err(e) = self
            .store
            .update_conversation_summary(conversation_id, &summary, embedding)
            .await
        {
            tracing::warn!(conversation_id, error = %e, "Failed to update conversation summary");
        }
    }

    // -- persistence -------------------------------------------------------

    async fn ensure_conversation(&mut self) {
        if self.conversation_id.is_some() {
            return;
        }
        let name = format!("Requirements {}", Utc::now().format("%Y-%m-%d %H:%M"));
        match self.store.create_conversation(&name).await {
            Ok(conversation) => {
                tracing::debug!(conversation_id = conversation.id, "Conversation opened");
                self.conversation_id = Some(conversation.id);
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "Failed to create conversation");
            }
        }
    }

    async fn persist(&self, role: MessageRole, content: &str, message_type: &str) {
        let Some(conversation_id) = self.conversation_id else {
            return;
        };
        let message = NewMessage {
            conversation_id,
            role,
            content: content.to_string(),
            message_type: message_type.to_string(),
        };
        if let Err(e) = self.store.create_message(message).await {
            tracing::warn!(conversation_id, role = role.as_str(), error = %e, "Failed to save message");
        }
    }

    fn project_id(&self) -> String {
        match self.conversation_id {
            Some(id) => format!("project_{id}"),
            None => format!("project_{}", self.session_id),
        }
    }
}

fn format_result(submitted: usize, result: &PipelineResult, conversation_id: Option<i64>) -> String {
    let preview: String = result
        .report
        .markdown
        .chars()
        .take(SUMMARY_PREVIEW_CHARS)
        .collect();

    let mut lines = vec![
        "Analysis pipeline complete.".to_string(),
        String::new(),
        "Results:".to_string(),
        format!("- {submitted} requirement entries submitted"),
        format!("- {} stories extracted", result.stories.len()),
        format!("- {} requirements identified", result.prioritized.len()),
        format!("- {} issues found", result.analysis.issues.len()),
    ];
    if !result.validation.is_empty() {
        lines.push(format!("- {} validation findings", result.validation.len()));
    }
    lines.extend([
        String::new(),
        "Context diagram:".to_string(),
        "```mermaid".to_string(),
        result.report.mermaid.clone(),
        "```".to_string(),
        String::new(),
        "Executive summary:".to_string(),
        format!("{preview}..."),
    ]);
    if let Some(id) = conversation_id {
        lines.push(String::new());
        lines.push(format!("Saved to conversation #{id}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::Value;

    use reqflow_pipeline::SessionRegistry;

    use super::*;
    use crate::driver::tests::{client_with, text_response, tool_response, SequenceMockProvider};
    use crate::store::{Conversation, InMemoryStore, StoreStats, StoredMessage};
    use reqflow_pipeline::ToolRegistry;

    fn agent(store: Arc<dyn ConversationStore>) -> ConversationAgent {
        let registry = SessionRegistry::new();
        let (id, handle) = registry.create();
        ConversationAgent::new(id, Orchestrator::offline().unwrap(), store, handle)
    }

    /// Fails every call.
    struct BrokenStore;

    #[async_trait]
    impl ConversationStore for BrokenStore {
        async fn create_conversation(&self, _name: &str) -> Result<Conversation, ReqflowError> {
            Err(ReqflowError::Persistence("down".into()))
        }
        async fn get_conversation(&self, _id: i64) -> Result<Option<Conversation>, ReqflowError> {
            Err(ReqflowError::Persistence("down".into()))
        }
        async fn create_message(&self, _m: NewMessage) -> Result<StoredMessage, ReqflowError> {
            Err(ReqflowError::Persistence("down".into()))
        }
        async fn list_messages(&self, _id: i64) -> Result<Vec<StoredMessage>, ReqflowError> {
            Err(ReqflowError::Persistence("down".into()))
        }
        async fn update_conversation_summary(
            &self,
            _id: i64,
            _summary: &str,
            _embedding: Option<Vec<f32>>,
        ) -> Result<(), ReqflowError> {
            Err(ReqflowError::Persistence("down".into()))
        }
        async fn stats(&self) -> Result<StoreStats, ReqflowError> {
            Err(ReqflowError::Persistence("down".into()))
        }
    }

    #[tokio::test]
    async fn ping_and_help() {
        let mut agent = agent(Arc::new(InMemoryStore::new()));
        assert_eq!(agent.handle_message("ping").await, "pong");
        assert!(agent.handle_message("/help").await.contains("/collect"));
    }

    #[tokio::test]
    async fn requirement_like_text_is_collected() {
        let mut agent = agent(Arc::new(InMemoryStore::new()));
        let reply = agent.handle_message("Story: Export\nAs a user I want CSV").await;
        assert_eq!(reply, "Saved requirement #1. Type /analyze to run the analysis.");
        assert_eq!(agent.collected().len(), 1);

        let reply = agent.handle_message("what's the weather?").await;
        assert_eq!(reply, FALLBACK_REPLY);
        assert_eq!(agent.collected().len(), 1);
    }

    #[tokio::test]
    async fn collecting_accepts_anything_until_done() {
        let store = Arc::new(InMemoryStore::new());
        let mut agent = agent(store.clone());

        agent.handle_message("/collect").await;
        assert_eq!(agent.state(), AgentState::Collecting);
        agent.handle_message("Story: Export Report").await;
        agent.handle_message("As a user, I want to export data soon.").await;
        assert_eq!(agent.collected().len(), 2);

        let reply = agent.handle_message("/done").await;
        assert_eq!(agent.state(), AgentState::Idle);
        assert!(reply.starts_with("Analysis pipeline complete."), "{reply}");
        assert!(reply.contains("- 1 stories extracted"));
        assert!(reply.contains("```mermaid\ngraph TD"));
        assert!(reply.contains("Saved to conversation #1"));

        let messages = store.list_messages(1).await.unwrap();
        let result = messages
            .iter()
            .find(|m| m.message_type == PIPELINE_RESULT_MESSAGE)
            .unwrap();
        assert_eq!(result.role, MessageRole::System);
        let body: Value = serde_json::from_str(&result.content).unwrap();
        assert_eq!(body["type"], "pipeline_result");
        assert_eq!(body["project_id"], "project_1");

        let conversation = store.get_conversation(1).await.unwrap().unwrap();
        let summary: PipelineResult = serde_json::from_str(conversation.summary.as_deref().unwrap()).unwrap();
        assert_eq!(summary.stories.len(), 1);
        assert!(conversation.embedding.is_none());
    }

    #[tokio::test]
    async fn done_outside_collecting_is_ordinary_text() {
        let mut agent = agent(Arc::new(InMemoryStore::new()));
        assert_eq!(agent.handle_message("/done").await, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn analyze_without_requirements() {
        let mut agent = agent(Arc::new(InMemoryStore::new()));
        assert_eq!(
            agent.handle_message("/analyze").await,
            "No requirements yet. Enter some requirements first."
        );
    }

    #[tokio::test]
    async fn analysis_results_are_cached_for_tools() {
        let mut agent = agent(Arc::new(InMemoryStore::new()));
        agent.handle_message("Story: Login\nUsers must sign in.").await;
        agent.handle_message("/analyze").await;

        let artifacts = agent.artifacts.lock().await;
        assert_eq!(artifacts.requirements.as_ref().map(Vec::len), Some(1));
        assert!(artifacts.diagram.is_some());
    }

    #[tokio::test]
    async fn clear_resets_collection() {
        let mut agent = agent(Arc::new(InMemoryStore::new()));
        agent.handle_message("/collect").await;
        agent.handle_message("The system shall log out idle users").await;
        assert_eq!(agent.handle_message("/clear").await, "Requirements cleared.");
        assert!(agent.collected().is_empty());
        assert_eq!(agent.state(), AgentState::Idle);
    }

    #[tokio::test]
    async fn persistence_failures_do_not_break_the_chat() {
        let mut agent = agent(Arc::new(BrokenStore));
        assert_eq!(agent.handle_message("ping").await, "pong");
        assert!(agent.conversation_id().is_none());

        agent.handle_message("Story: A\nAs a user I want B").await;
        let reply = agent.handle_message("/analyze").await;
        assert!(reply.starts_with("Analysis pipeline complete."));
        assert!(!reply.contains("Saved to conversation"));
    }

    #[tokio::test]
    async fn free_text_goes_to_the_driver() {
        let provider = SequenceMockProvider::new(vec![
            tool_response("help", serde_json::json!({})),
            text_response("Start by pasting your stories."),
        ]);
        let driver = ToolDriver::new(client_with(provider), ToolRegistry::with_defaults(), 10);
        let mut agent = agent(Arc::new(InMemoryStore::new())).with_driver(driver);

        let reply = agent.handle_message("how do I begin?").await;
        assert_eq!(reply, "Start by pasting your stories.");
    }
}
