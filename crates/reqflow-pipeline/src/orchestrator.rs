//! Linear pipeline: ingest → normalize → extract → analyze → identify →
//! prioritize → validate → report.
//!
//! Stages run strictly in sequence. The first failing stage stops the run and
//! the failure carries every output computed before it.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use reqflow_analysis::{self as analysis, StoryExtractor, TextAnalysisEngine};
use reqflow_llm::Capabilities;
use reqflow_types::{
    AnalysisOutput, Chunk, PipelineResult, Report, ReqflowError, Requirement, Stage, Story,
    StoryAnalysisReport,
};

use crate::config::ReqflowConfig;
use crate::events::{EventEmitter, PipelineEvent};

// ---------------------------------------------------------------------------
// Input / failure types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineInput {
    #[serde(default)]
    pub raw_text: Option<String>,
    #[serde(default)]
    pub stories: Option<Vec<Story>>,
    #[serde(default = "default_project_id")]
    pub project_id: String,
}

fn default_project_id() -> String {
    "default".into()
}

impl PipelineInput {
    pub fn from_text(raw_text: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            raw_text: Some(raw_text.into()),
            stories: None,
            project_id: project_id.into(),
        }
    }

    pub fn from_stories(stories: Vec<Story>, project_id: impl Into<String>) -> Self {
        Self {
            raw_text: None,
            stories: Some(stories),
            project_id: project_id.into(),
        }
    }
}

/// Outputs that were complete when a run stopped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stories: Option<Vec<Story>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Vec<Requirement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prioritized: Option<Vec<Requirement>>,
}

#[derive(Debug, thiserror::Error)]
#[error("stage '{stage}' failed: {error}")]
pub struct PipelineFailure {
    pub stage: Stage,
    #[source]
    pub error: ReqflowError,
    pub partial: PartialResult,
}

impl PipelineFailure {
    /// Stage-attributed message for people, mentioning what was already done.
    pub fn describe(&self) -> String {
        let label = stage_label(self.stage);
        match &self.partial.stories {
            Some(stories) => format!(
                "{} {} extracted, but {label} failed: {}",
                stories.len(),
                if stories.len() == 1 { "story" } else { "stories" },
                self.error
            ),
            None => format!("Pipeline failed during {label}: {}", self.error),
        }
    }

    /// Input errors pass through, anything else becomes a stage failure.
    pub fn into_error(self) -> ReqflowError {
        match self.error {
            e @ ReqflowError::InvalidInput { .. } => e,
            other => ReqflowError::StageFailed {
                stage: self.stage,
                message: other.to_string(),
            },
        }
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Ingest => "ingestion",
        Stage::Normalize => "normalization",
        Stage::ExtractStories => "story extraction",
        Stage::Analyze => "analysis",
        Stage::IdentifyRequirements => "requirement identification",
        Stage::Prioritize => "prioritization",
        Stage::Validate => "validation",
        Stage::BuildReport => "report generation",
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Owns the stage implementations and runs them. Holds no per-run state, so
/// one instance serves any number of concurrent sessions.
#[derive(Clone)]
pub struct Orchestrator {
    config: ReqflowConfig,
    engine: Arc<TextAnalysisEngine>,
    extractor: StoryExtractor,
    capabilities: Capabilities,
    events: EventEmitter,
}

impl Orchestrator {
    /// Loads the configured rules and bounds every capability call by the
    /// configured timeout.
    pub fn new(config: ReqflowConfig, capabilities: Capabilities) -> Result<Self, ReqflowError> {
        let engine = config.build_engine()?;
        let capabilities = capabilities.with_timeout(config.llm_timeout);
        Ok(Self {
            extractor: StoryExtractor::default().with_title_max_len(config.title_max_len),
            engine: Arc::new(engine),
            capabilities,
            events: EventEmitter::default(),
            config,
        })
    }

    /// Rule-based only, baseline rules, no LLM.
    pub fn offline() -> Result<Self, ReqflowError> {
        Self::new(ReqflowConfig::default(), Capabilities::none())
    }

    pub fn config(&self) -> &ReqflowConfig {
        &self.config
    }

    pub fn engine(&self) -> &TextAnalysisEngine {
        &self.engine
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    // -- individual stages -------------------------------------------------

    pub fn ingest<S: AsRef<str>>(&self, items: &[S]) -> Vec<Chunk> {
        analysis::ingest(items)
    }

    pub fn normalize(&self, chunks: &[Chunk]) -> Vec<Chunk> {
        analysis::normalize(chunks, self.config.one_line_normalize)
    }

    pub fn extract_stories(&self, chunks: &[Chunk]) -> Vec<Story> {
        self.extractor.extract(chunks)
    }

    /// Ingest, normalize and extract in one go.
    pub fn collect(&self, raw_text: &str) -> (Vec<Chunk>, Vec<Story>) {
        let chunks = self.normalize(&self.ingest(&[raw_text]));
        let stories = self.extract_stories(&chunks);
        (chunks, stories)
    }

    /// Rule-based analysis, plus LLM suggestions when enabled and available.
    pub async fn analyze(&self, stories: &[Story]) -> Result<StoryAnalysisReport, ReqflowError> {
        if let Some(pos) = stories.iter().position(|s| s.id.trim().is_empty()) {
            return Err(ReqflowError::invalid_input(
                Stage::Analyze,
                format!("story at position {} has an empty id", pos + 1),
            ));
        }

        let output = if self.config.use_llm_suggestions && self.capabilities.llm_available() {
            self.engine
                .analyze_stories_augmented(stories, self.capabilities.generator.as_ref())
                .await
        } else {
            self.engine.analyze_stories(stories)
        };
        Ok(analysis::enrich(stories, output))
    }

    /// Requirements from stories, inheriting per-story analysis when given.
    pub fn identify(&self, stories: &[Story], analyzed: Option<&StoryAnalysisReport>) -> Vec<Requirement> {
        let requirements = analysis::identify(stories);
        match analyzed {
            Some(report) => analysis::attach_analysis(requirements, &report.stories),
            None => requirements,
        }
    }

    pub fn prioritize(&self, requirements: &[Requirement]) -> Vec<Requirement> {
        analysis::prioritize(requirements)
    }

    pub fn validate(&self, requirements: &[Requirement]) -> Vec<String> {
        analysis::validate_requirements(requirements)
    }

    /// LLM-synthesized requirements. Per-story analysis is attached only when
    /// the synthesis kept one requirement per story.
    pub async fn identify_augmented(
        &self,
        stories: &[Story],
        analyzed: Option<&StoryAnalysisReport>,
    ) -> Vec<Requirement> {
        let requirements = analysis::identify_augmented(self.capabilities.generator.as_ref(), stories).await;
        match analyzed {
            Some(report) if report.stories.len() == requirements.len() => {
                analysis::attach_analysis(requirements, &report.stories)
            }
            _ => requirements,
        }
    }

    pub fn build_report(&self, requirements: &[Requirement], output: &AnalysisOutput) -> Report {
        analysis::build(requirements, output)
    }

    pub async fn build_report_augmented(&self, requirements: &[Requirement], output: &AnalysisOutput) -> Report {
        analysis::build_augmented(self.capabilities.generator.as_ref(), requirements, output).await
    }

    // -- linear pipeline ---------------------------------------------------

    /// Runs every stage in order. Raw text is only collected when no stories
    /// are supplied.
    pub async fn run_pipeline(&self, input: PipelineInput) -> Result<PipelineResult, PipelineFailure> {
        let started = Instant::now();
        let project_id = input.project_id.clone();
        tracing::info!(project_id = %project_id, "pipeline started");
        self.events.emit(PipelineEvent::PipelineStarted {
            project_id: project_id.clone(),
        });

        let mut run = Run {
            events: &self.events,
            project_id: &project_id,
            partial: PartialResult::default(),
        };

        let (chunk_count, stories) = match (input.stories, input.raw_text) {
            (Some(stories), _) => (0, stories),
            (None, Some(raw_text)) => {
                let raw = run.stage(Stage::Ingest, Vec::len, || Ok(self.ingest(&[raw_text])))?;
                let chunks = run.stage(Stage::Normalize, Vec::len, || Ok(self.normalize(&raw)))?;
                run.partial.chunks = Some(chunks.len());
                let stories = run.stage(Stage::ExtractStories, Vec::len, || {
                    Ok(self.extract_stories(&chunks))
                })?;
                (chunks.len(), stories)
            }
            (None, None) => {
                return Err(run.fail(
                    Stage::Ingest,
                    ReqflowError::invalid_input(
                        Stage::Ingest,
                        "either raw_text or stories is required",
                    ),
                ))
            }
        };
        run.partial.stories = Some(stories.clone());

        let t = run.start(Stage::Analyze);
        let analyzed = match self.analyze(&stories).await {
            Ok(report) => report,
            Err(e) => return Err(run.fail(Stage::Analyze, e)),
        };
        run.complete(Stage::Analyze, analyzed.analysis.issues.len(), t);
        run.partial.analysis = Some(analyzed.analysis.clone());

        let requirements = run.stage(Stage::IdentifyRequirements, Vec::len, || {
            Ok(self.identify(&stories, Some(&analyzed)))
        })?;
        run.partial.requirements = Some(requirements.clone());

        let prioritized = run.stage(Stage::Prioritize, Vec::len, || {
            Ok(self.prioritize(&requirements))
        })?;
        run.partial.prioritized = Some(prioritized.clone());

        let validation = run.stage(Stage::Validate, Vec::len, || Ok(self.validate(&prioritized)))?;
        if !validation.is_empty() {
            tracing::warn!(findings = validation.len(), "validation reported findings");
        }

        let report = run.stage(Stage::BuildReport, |r: &Report| r.csv.lines().count(), || {
            Ok(self.build_report(&prioritized, &analyzed.analysis))
        })?;

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            project_id = %project_id,
            stories = stories.len(),
            requirements = prioritized.len(),
            duration_ms,
            "pipeline completed"
        );
        self.events.emit(PipelineEvent::PipelineCompleted {
            project_id: project_id.clone(),
            stories: stories.len(),
            requirements: prioritized.len(),
            duration_ms,
        });

        Ok(PipelineResult {
            project_id,
            chunks: chunk_count,
            stories,
            analysis: analyzed.analysis,
            requirements,
            prioritized,
            validation,
            report,
        })
    }
}

/// Bookkeeping for one run: events, timing and the partial result.
struct Run<'a> {
    events: &'a EventEmitter,
    project_id: &'a str,
    partial: PartialResult,
}

impl Run<'_> {
    fn start(&self, stage: Stage) -> Instant {
        tracing::debug!(stage = %stage, agent = stage.agent(), "stage started");
        self.events.emit(PipelineEvent::StageStarted { stage });
        Instant::now()
    }

    fn complete(&self, stage: Stage, items: usize, started: Instant) {
        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(stage = %stage, items, duration_ms, "stage completed");
        self.events.emit(PipelineEvent::StageCompleted {
            stage,
            items,
            duration_ms,
        });
    }

    fn fail(&mut self, stage: Stage, error: ReqflowError) -> PipelineFailure {
        tracing::error!(stage = %stage, error = %error, "stage failed");
        self.events.emit(PipelineEvent::StageFailed {
            stage,
            error: error.to_string(),
        });
        self.events.emit(PipelineEvent::PipelineFailed {
            project_id: self.project_id.to_string(),
            stage,
            error: error.to_string(),
        });
        PipelineFailure {
            stage,
            error,
            partial: std::mem::take(&mut self.partial),
        }
    }

    fn stage<T>(
        &mut self,
        stage: Stage,
        count: impl Fn(&T) -> usize,
        f: impl FnOnce() -> Result<T, ReqflowError>,
    ) -> Result<T, PipelineFailure> {
        let t = self.start(stage);
        match f() {
            Ok(value) => {
                self.complete(stage, count(&value), t);
                Ok(value)
            }
            Err(e) => Err(self.fail(stage, e)),
        }
    }
}
