use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chunk / Story
// ---------------------------------------------------------------------------

/// A unit of ingested raw text, before story extraction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
}

impl Chunk {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// A user-story-like requirement candidate.
///
/// Every field is always a string once extraction completes; only `id` is
/// guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Story {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: String,
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Ambiguity,
    MissingAcceptanceCriteria,
    Conflict,
    Unverifiable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

/// A detected defect in a story, or in a pair of stories for conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub description: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stories: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub in_acceptance_criteria: bool,
}

impl Issue {
    pub fn new(kind: IssueKind, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            severity,
            story_id: None,
            keyword: None,
            matched: None,
            suggestion: None,
            stories: Vec::new(),
            in_acceptance_criteria: false,
        }
    }

    /// True if this issue belongs to `story_id`, either directly or as one
    /// side of a conflict.
    pub fn concerns(&self, story_id: &str) -> bool {
        self.story_id.as_deref() == Some(story_id) || self.stories.iter().any(|s| s == story_id)
    }
}

// ---------------------------------------------------------------------------
// Suggestions and analysis
// ---------------------------------------------------------------------------

/// An improvement suggestion produced by the optional LLM pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

/// Analysis attached to a single story, and later to the requirement derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemAnalysis {
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    #[serde(default)]
    pub has_acceptance_criteria: bool,
    #[serde(default)]
    pub conflicts: Vec<Issue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_stories: usize,
    pub stories_with_issues: usize,
    pub total_issues: usize,
    pub has_suggestions: bool,
}

/// Output of the analyze stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub issues: Vec<Issue>,
    pub suggestions: Vec<Suggestion>,
}

/// Analysis output plus the stories enriched with their own slice of it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoryAnalysisReport {
    pub stories: Vec<AnalyzedStory>,
    pub analysis: AnalysisOutput,
    pub summary: AnalysisSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedStory {
    #[serde(flatten)]
    pub story: Story,
    pub analysis: ItemAnalysis,
}

// ---------------------------------------------------------------------------
// Requirement
// ---------------------------------------------------------------------------

/// A synthesized, scorable, prioritizable unit derived from a story.
///
/// `score` and `priority` are assigned only by the prioritize stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Requirement {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ItemAnalysis>,
}

impl Requirement {
    pub fn issue_count(&self) -> usize {
        self.analysis.as_ref().map_or(0, |a| a.issues.len())
    }

    pub fn issues(&self) -> &[Issue] {
        self.analysis.as_ref().map_or(&[], |a| a.issues.as_slice())
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        self.analysis
            .as_ref()
            .map_or(&[], |a| a.suggestions.as_slice())
    }
}

// ---------------------------------------------------------------------------
// Report / PipelineResult
// ---------------------------------------------------------------------------

/// Final rendered artifacts of one run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Report {
    pub markdown: String,
    pub csv: String,
    pub mermaid: String,
}

/// Immutable snapshot of one complete pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineResult {
    pub project_id: String,
    pub chunks: usize,
    pub stories: Vec<Story>,
    pub analysis: AnalysisOutput,
    pub requirements: Vec<Requirement>,
    pub prioritized: Vec<Requirement>,
    #[serde(default)]
    pub validation: Vec<String>,
    pub report: Report,
}
