//! Optional LLM-backed suggestions and content checks.
//!
//! Both entry points treat any capability error as "no result": they log and
//! return an empty or negative value instead of failing the caller.

use serde::{Deserialize, Serialize};

use reqflow_llm::TextGenerator;
use reqflow_types::{Story, Suggestion};

const SUGGEST_SYSTEM: &str = "You are a requirements engineer assistant.";

const SUGGEST_PROMPT: &str = r#"Analyze these user stories and provide concrete suggestions to improve them. For each story, identify:
1. Ambiguity issues
2. Missing testable acceptance criteria
3. Potential conflicts with other stories
4. Specific improvement suggestions

Return your analysis in JSON format like this:
{
  "story_analyses": [
    {
      "story_id": "...",
      "title": "...",
      "suggestions": [
        {"type": "improvement", "description": "Add specific acceptance criteria: 'CSV report should download within 3 seconds'"}
      ]
    }
  ]
}

Stories to analyze:
"#;

const DEFAULT_CHECK_INSTRUCTION: &str =
    "Please validate the following content for clarity and completeness:";

pub const LLM_SUGGESTIONS_KIND: &str = "llm_suggestions";

// ---------------------------------------------------------------------------
// Suggestions
// ---------------------------------------------------------------------------

/// Asks the generator for improvement suggestions and normalizes the reply.
pub async fn suggest_improvements(generator: &dyn TextGenerator, stories: &[Story]) -> Vec<Suggestion> {
    if !generator.is_available() || stories.is_empty() {
        return Vec::new();
    }

    let mut prompt = SUGGEST_PROMPT.to_string();
    for s in stories {
        prompt.push_str(&format!(
            "- Id: {}. Title: {}. Description: {}. Acceptance: {}.\n",
            s.id, s.title, s.description, s.acceptance_criteria
        ));
    }

    match generator.generate(&prompt, Some(SUGGEST_SYSTEM)).await {
        Ok(reply) => {
            let suggestions = parse_suggestions(&reply);
            tracing::debug!(count = suggestions.len(), "LLM suggestions received");
            suggestions
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM suggestions unavailable, continuing without");
            Vec::new()
        }
    }
}

#[derive(Deserialize)]
struct SuggestionReply {
    story_analyses: Vec<StoryAnalysisReply>,
}

#[derive(Deserialize)]
struct StoryAnalysisReply {
    #[serde(default)]
    story_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    suggestions: Vec<SuggestionItemReply>,
}

#[derive(Deserialize)]
struct SuggestionItemReply {
    #[serde(rename = "type", default = "improvement")]
    kind: String,
    #[serde(default, alias = "content")]
    description: String,
}

fn improvement() -> String {
    "improvement".into()
}

/// Structured `story_analyses` replies are flattened into one suggestion per
/// entry. Anything else becomes a single `llm_suggestions` entry.
fn parse_suggestions(reply: &str) -> Vec<Suggestion> {
    let body = strip_code_fence(reply);
    if body.is_empty() {
        return Vec::new();
    }

    if let Ok(parsed) = serde_json::from_str::<SuggestionReply>(body) {
        return parsed
            .story_analyses
            .into_iter()
            .flat_map(|analysis| {
                let story_id = analysis.story_id;
                let title = analysis.title;
                analysis
                    .suggestions
                    .into_iter()
                    .filter(|s| !s.description.trim().is_empty())
                    .map(move |s| Suggestion {
                        story_id: story_id.clone(),
                        title: title.clone(),
                        kind: s.kind,
                        description: s.description,
                    })
            })
            .collect();
    }

    vec![Suggestion {
        story_id: None,
        title: None,
        kind: LLM_SUGGESTIONS_KIND.into(),
        description: body.to_string(),
    }]
}

pub(crate) fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

// ---------------------------------------------------------------------------
// Content check
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmCheck {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Free-form LLM review of `text`.
pub async fn llm_check(
    generator: &dyn TextGenerator,
    text: &str,
    instruction: Option<&str>,
) -> LlmCheck {
    if !generator.is_available() {
        return LlmCheck {
            ok: false,
            result: None,
            note: Some("LLM not available".into()),
            error: None,
        };
    }

    let instruction = instruction.unwrap_or(DEFAULT_CHECK_INSTRUCTION);
    let prompt = format!("{instruction}\n\nContent:\n{text}");
    match generator.generate(&prompt, None).await {
        Ok(result) => LlmCheck {
            ok: true,
            result: Some(result),
            note: None,
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "LLM content check failed");
            LlmCheck {
                ok: false,
                result: None,
                note: None,
                error: Some(e.to_string()),
            }
        }
    }
}
