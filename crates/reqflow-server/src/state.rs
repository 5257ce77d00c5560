//! Shared server state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;

use reqflow_agent::{ConversationAgent, ConversationStore, ToolDriver};
use reqflow_llm::LlmClient;
use reqflow_pipeline::{Orchestrator, SessionRegistry, ToolRegistry};

use crate::message::WsMessage;

/// Outbound queues of the live chat sockets, keyed by session id.
#[derive(Default)]
pub struct ConnectionRegistry {
    senders: Mutex<HashMap<String, UnboundedSender<WsMessage>>>,
    total: AtomicU64,
}

impl ConnectionRegistry {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, UnboundedSender<WsMessage>>> {
        self.senders.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, session_id: &str, sender: UnboundedSender<WsMessage>) {
        self.lock().insert(session_id.to_string(), sender);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unregister(&self, session_id: &str) {
        self.lock().remove(session_id);
    }

    pub fn active(&self) -> usize {
        self.lock().len()
    }

    /// Connections accepted since start, including closed ones.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Queues `message` on every live socket; returns how many accepted it.
    pub fn broadcast(&self, message: &WsMessage) -> usize {
        let mut senders = self.lock();
        senders.retain(|_, tx| !tx.is_closed());
        senders
            .values()
            .filter(|tx| tx.send(message.clone()).is_ok())
            .count()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub store: Arc<dyn ConversationStore>,
    pub sessions: Arc<SessionRegistry>,
    pub connections: Arc<ConnectionRegistry>,
    /// When set, free-form chat goes through the tool-calling loop.
    pub llm: Option<Arc<LlmClient>>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            orchestrator,
            store,
            sessions: Arc::new(SessionRegistry::new()),
            connections: Arc::new(ConnectionRegistry::default()),
            llm: None,
        }
    }

    pub fn with_llm(mut self, client: Arc<LlmClient>) -> Self {
        self.llm = Some(client);
        self
    }

    /// Opens a fresh session and an agent bound to it.
    pub fn new_agent(&self) -> ConversationAgent {
        let (session_id, artifacts) = self.sessions.create();
        let agent = ConversationAgent::new(
            session_id,
            self.orchestrator.clone(),
            self.store.clone(),
            artifacts,
        );
        match &self.llm {
            Some(client) => {
                let config = self.orchestrator.config();
                agent.with_driver(
                    ToolDriver::new(
                        client.clone(),
                        ToolRegistry::with_defaults(),
                        config.max_tool_iterations,
                    )
                    .with_request_timeout(config.llm_timeout),
                )
            }
            None => agent,
        }
    }
}
