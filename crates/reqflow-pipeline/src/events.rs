//! Pipeline event system for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! observers such as tests and loggers can follow stage progress without
//! coupling to the orchestrator.

use serde::{Deserialize, Serialize};

use reqflow_types::Stage;

/// Events emitted during pipeline runs and tool dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    PipelineStarted {
        project_id: String,
    },
    PipelineCompleted {
        project_id: String,
        stories: usize,
        requirements: usize,
        duration_ms: u64,
    },
    PipelineFailed {
        project_id: String,
        stage: Stage,
        error: String,
    },
    StageStarted {
        stage: Stage,
    },
    StageCompleted {
        stage: Stage,
        items: usize,
        duration_ms: u64,
    },
    StageFailed {
        stage: Stage,
        error: String,
    },
    ToolInvoked {
        tool: String,
        success: bool,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Sends to all current subscribers. Dropped when nobody listens.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
