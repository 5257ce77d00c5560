//! Per-session artifact cache and the registry that hands sessions out.
//!
//! Each session's artifacts sit behind their own async mutex, so calls within
//! one session are serialized while different sessions never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use reqflow_types::{Report, Requirement, Story, StoryAnalysisReport};

// ---------------------------------------------------------------------------
// ContextStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContextEntry {
    text: String,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextHit {
    pub text: String,
    pub score: f32,
}

/// Embedded snippets searchable by cosine similarity.
#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    entries: Vec<ContextEntry>,
}

impl ContextStore {
    /// Stores `text` with its embedding. Empty embeddings are rejected.
    pub fn add(&mut self, text: impl Into<String>, embedding: Vec<f32>) -> bool {
        if embedding.is_empty() {
            return false;
        }
        self.entries.push(ContextEntry {
            text: text.into(),
            embedding,
        });
        true
    }

    /// Top `k` entries by similarity to `query`. An empty query vector skips
    /// the search.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ContextHit> {
        if query.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<ContextHit> = self
            .entries
            .iter()
            .filter(|e| e.embedding.len() == query.len())
            .map(|e| ContextHit {
                text: e.text.clone(),
                score: cosine_similarity(&e.embedding, query),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        hits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

// ---------------------------------------------------------------------------
// SessionArtifacts
// ---------------------------------------------------------------------------

/// The latest output of each stage invoked in this session.
#[derive(Debug, Clone, Default)]
pub struct SessionArtifacts {
    pub stories: Option<Vec<Story>>,
    pub analysis: Option<StoryAnalysisReport>,
    pub requirements: Option<Vec<Requirement>>,
    pub diagram: Option<String>,
    pub report: Option<Report>,
    pub context: ContextStore,
}

impl SessionArtifacts {
    /// New stories invalidate everything derived from the old ones.
    pub fn set_stories(&mut self, stories: Vec<Story>) {
        self.stories = Some(stories);
        self.analysis = None;
        self.requirements = None;
        self.diagram = None;
        self.report = None;
    }

    /// Drops stage outputs. Stored context survives.
    pub fn clear(&mut self) {
        let context = std::mem::take(&mut self.context);
        *self = Self {
            context,
            ..Default::default()
        };
    }
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

pub type SessionHandle = Arc<tokio::sync::Mutex<SessionArtifacts>>;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh session and returns its id.
    pub fn create(&self) -> (String, SessionHandle) {
        let id = uuid::Uuid::new_v4().to_string();
        let handle = self.get_or_create(&id);
        (id, handle)
    }

    pub fn get_or_create(&self, session_id: &str) -> SessionHandle {
        let mut sessions = self.lock();
        sessions
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.lock().get(session_id).cloned()
    }

    pub fn remove(&self, session_id: &str) -> bool {
        self.lock().remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionHandle>> {
        // A poisoned map is still structurally valid.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}
