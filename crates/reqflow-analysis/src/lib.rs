//! Pure analysis stages of the reqflow pipeline.
//!
//! Every stage here is a deterministic transformation over values from
//! `reqflow-types`. The only optional I/O is LLM-backed suggestion, synthesis,
//! report summary and content checking. Each degrades to the rule-based or
//! empty result when no capability is present or the call fails.

pub mod analyzer;
pub mod collector;
pub mod extractor;
pub mod report;
pub mod rules;
pub mod suggest;
pub mod synthesizer;
pub mod validator;

pub use analyzer::{enrich, ChunkAnalysis, TextAnalysisEngine};
pub use collector::{ingest, normalize, normalize_text};
pub use extractor::{extract_stories, StoryExtractor};
pub use report::{
    build, build_augmented, generate_report, markdown_table, mermaid_diagram, RequirementsReport,
};
pub use rules::{AmbiguousTerm, ConflictRule, RuleSet};
pub use suggest::{llm_check, suggest_improvements, LlmCheck};
pub use synthesizer::{
    attach_analysis, identify, identify_augmented, identify_business_goals, identify_from_chunks,
    prioritize, score,
};
pub use validator::{validate_report, validate_requirements, validate_requirements_value};
