//! Requirement identification, scoring and ranking.

use serde::Deserialize;

use reqflow_llm::TextGenerator;
use reqflow_types::{AnalyzedStory, Chunk, Requirement, Story};

use crate::extractor::{truncate_chars, DEFAULT_TITLE_MAX_LEN};
use crate::suggest::strip_code_fence;

const GOAL_SNIPPET_LEN: usize = 120;
const GOAL_MARKERS: [&str; 3] = ["business", "goal", "objective"];

const SYNTHESIZE_SYSTEM: &str = "You are a requirements engineer assistant.";

const SYNTHESIZE_PROMPT: &str = r#"Synthesize the core requirements behind these user stories. Merge duplicates and drop noise.

Return JSON only, like this:
{
  "requirements": [
    {"title": "...", "description": "...", "acceptance_criteria": "..."}
  ]
}

User stories:
"#;

const MUST_WORDS: [&str; 4] = ["critical", "must", "required", "essential"];
const SHOULD_WORDS: [&str; 3] = ["should", "recommended", "prefer"];
const OPTIONAL_WORDS: [&str; 3] = ["optional", "nice to have", "could"];

/// One requirement per story, ids `R1..Rn` independent of the story ids.
pub fn identify(stories: &[Story]) -> Vec<Requirement> {
    stories
        .iter()
        .enumerate()
        .map(|(i, s)| Requirement {
            id: format!("R{}", i + 1),
            title: truncate_chars(&s.title, DEFAULT_TITLE_MAX_LEN),
            description: s.description.clone(),
            acceptance_criteria: s.acceptance_criteria.clone(),
            ..Default::default()
        })
        .collect()
}

/// Asks the generator to synthesize core requirements from the stories. Any
/// generator error, unparseable reply or empty result falls back to
/// [`identify`].
pub async fn identify_augmented(generator: &dyn TextGenerator, stories: &[Story]) -> Vec<Requirement> {
    if !generator.is_available() || stories.is_empty() {
        return identify(stories);
    }

    let mut prompt = SYNTHESIZE_PROMPT.to_string();
    for s in stories {
        prompt.push_str(&format!(
            "- Id: {}. Title: {}. Description: {}. Acceptance: {}.\n",
            s.id, s.title, s.description, s.acceptance_criteria
        ));
    }

    let reply = match generator.generate(&prompt, Some(SYNTHESIZE_SYSTEM)).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, "LLM synthesis unavailable, using rule-based requirements");
            return identify(stories);
        }
    };

    let synthesized = parse_synthesized(&reply);
    if synthesized.is_empty() {
        tracing::warn!("LLM synthesis reply unusable, using rule-based requirements");
        return identify(stories);
    }
    tracing::debug!(count = synthesized.len(), "LLM requirements synthesized");
    synthesized
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SynthesisReply {
    Wrapped { requirements: Vec<SynthesizedItem> },
    Bare(Vec<SynthesizedItem>),
}

#[derive(Deserialize)]
struct SynthesizedItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    acceptance_criteria: String,
}

fn parse_synthesized(reply: &str) -> Vec<Requirement> {
    let items = match serde_json::from_str::<SynthesisReply>(strip_code_fence(reply)) {
        Ok(SynthesisReply::Wrapped { requirements }) => requirements,
        Ok(SynthesisReply::Bare(items)) => items,
        Err(_) => return Vec::new(),
    };
    items
        .into_iter()
        .filter(|item| !item.title.trim().is_empty() || !item.description.trim().is_empty())
        .enumerate()
        .map(|(i, item)| Requirement {
            id: format!("R{}", i + 1),
            title: truncate_chars(item.title.trim(), DEFAULT_TITLE_MAX_LEN),
            description: item.description,
            acceptance_criteria: item.acceptance_criteria,
            ..Default::default()
        })
        .collect()
}

/// One requirement per chunk: the first non-empty line is the title and the
/// remaining lines, joined by spaces, the description.
pub fn identify_from_chunks(chunks: &[Chunk]) -> Vec<Requirement> {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let lines: Vec<&str> = c
                .text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect();
            let title = truncate_chars(lines.first().copied().unwrap_or(c.text.as_str()), DEFAULT_TITLE_MAX_LEN);
            let description = if lines.len() > 1 {
                lines[1..].join(" ")
            } else {
                c.text.clone()
            };
            Requirement {
                id: format!("R{}", i + 1),
                title,
                description,
                ..Default::default()
            }
        })
        .collect()
}

/// Gives each requirement the analysis of the story at the same position.
pub fn attach_analysis(requirements: Vec<Requirement>, analyzed: &[AnalyzedStory]) -> Vec<Requirement> {
    requirements
        .into_iter()
        .zip(analyzed.iter().map(Some).chain(std::iter::repeat(None)))
        .map(|(mut req, story)| {
            if let Some(story) = story {
                req.analysis = Some(story.analysis.clone());
            }
            req
        })
        .collect()
}

/// Keyword-weighted priority score. Keyword classes are additive.
pub fn score(req: &Requirement) -> i64 {
    let desc = req.description.to_lowercase();
    let title = req.title.to_lowercase();
    let contains_any = |words: &[&str]| words.iter().any(|w| desc.contains(w));

    let mut s = (desc.chars().count() / 50).min(5) as i64;
    if contains_any(&MUST_WORDS) {
        s += 10;
    }
    if contains_any(&SHOULD_WORDS) {
        s += 3;
    }
    if contains_any(&OPTIONAL_WORDS) {
        s -= 2;
    }
    if !req.acceptance_criteria.is_empty() {
        s += 2;
    }
    if title.contains("urgent") {
        s += 5;
    }
    s
}

/// Scores every requirement and ranks them by descending score. Priorities
/// are dense `1..N`; ties keep input order.
pub fn prioritize(requirements: &[Requirement]) -> Vec<Requirement> {
    let mut ranked: Vec<Requirement> = requirements
        .iter()
        .cloned()
        .map(|mut r| {
            r.score = Some(score(&r));
            r
        })
        .collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    for (i, r) in ranked.iter_mut().enumerate() {
        r.priority = Some(i as u32 + 1);
    }
    ranked
}

/// Distinct snippets of requirements that mention business goals, in
/// first-seen order.
pub fn identify_business_goals(requirements: &[Requirement]) -> Vec<String> {
    let mut goals: Vec<String> = Vec::new();
    for r in requirements {
        let text = format!("{} {}", r.description, r.title);
        let lowered = text.to_lowercase();
        if !GOAL_MARKERS.iter().any(|m| lowered.contains(m)) {
            continue;
        }
        let snippet = truncate_chars(&text, GOAL_SNIPPET_LEN);
        if !goals.contains(&snippet) {
            goals.push(snippet);
        }
    }
    goals
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reqflow_llm::NullCapability;
    use reqflow_types::{ItemAnalysis, ReqflowError};

    struct FixedGenerator(&'static str);

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _p: &str, _s: Option<&str>) -> Result<String, ReqflowError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(&self, _p: &str, _s: Option<&str>) -> Result<String, ReqflowError> {
            Err(ReqflowError::ProviderError {
                provider: "mock".into(),
                status: 503,
                message: "overloaded".into(),
                retryable: true,
            })
        }
    }

    fn two_stories() -> Vec<Story> {
        vec![
            Story {
                id: "S1".into(),
                title: "Login".into(),
                description: "Users sign in".into(),
                acceptance_criteria: String::new(),
            },
            Story {
                id: "S2".into(),
                title: "Export".into(),
                description: "Users export CSV".into(),
                acceptance_criteria: "Downloads".into(),
            },
        ]
    }

    fn req(title: &str, description: &str, criteria: &str) -> Requirement {
        Requirement {
            id: String::new(),
            title: title.into(),
            description: description.into(),
            acceptance_criteria: criteria.into(),
            ..Default::default()
        }
    }

    #[test]
    fn identify_assigns_fresh_ids() {
        let stories = vec![
            Story {
                id: "S9".into(),
                title: "Story: A".into(),
                description: "d".into(),
                acceptance_criteria: "c".into(),
            },
            Story::default(),
        ];
        let reqs = identify(&stories);
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].id, "R1");
        assert_eq!(reqs[0].title, "Story: A");
        assert_eq!(reqs[0].acceptance_criteria, "c");
        assert_eq!(reqs[1].id, "R2");
        assert!(reqs[0].score.is_none() && reqs[0].priority.is_none());
    }

    #[test]
    fn identify_from_chunks_splits_title() {
        let reqs = identify_from_chunks(&[
            Chunk::new("chunk-1", "\n Login page \n users sign in\n with email "),
            Chunk::new("chunk-2", "single line"),
        ]);
        assert_eq!(reqs[0].title, "Login page");
        assert_eq!(reqs[0].description, "users sign in with email");
        assert_eq!(reqs[1].title, "single line");
        assert_eq!(reqs[1].description, "single line");
    }

    #[test]
    fn score_example_with_criteria_only() {
        let description = "As a user, I want to export data soon.";
        let r = req("Story: Export Report", description, "CSV downloadable");
        assert_eq!(score(&r), (description.len() as i64 / 50).min(5) + 2);
        assert_eq!(score(&r), 2);
    }

    #[test]
    fn score_keyword_classes_are_additive() {
        let r = req(
            "URGENT fix",
            "It must work, should be logged, and could be optional.",
            "",
        );
        assert_eq!(score(&r), 1 + 10 + 3 - 2 + 5);
    }

    #[test]
    fn score_caps_length_contribution() {
        let r = req("", &"x".repeat(1000), "");
        assert_eq!(score(&r), 5);
        assert_eq!(score(&Requirement::default()), 0);
    }

    #[test]
    fn prioritize_ranks_and_is_stable() {
        let reqs = vec![
            req("a", "plain", ""),
            req("b", "this is critical", ""),
            req("c", "plain too", ""),
            req("d", "also plain", "yes"),
        ];
        let ranked = prioritize(&reqs);
        let titles: Vec<_> = ranked.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "d", "a", "c"]);
        let priorities: Vec<_> = ranked.iter().map(|r| r.priority.unwrap()).collect();
        assert_eq!(priorities, vec![1, 2, 3, 4]);
        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn prioritize_empty_is_empty() {
        assert!(prioritize(&[]).is_empty());
    }

    #[test]
    fn prioritize_does_not_touch_input() {
        let reqs = vec![req("a", "must", "")];
        let _ = prioritize(&reqs);
        assert!(reqs[0].score.is_none());
    }

    #[test]
    fn attach_analysis_is_positional() {
        let analyzed = vec![AnalyzedStory {
            story: Story::default(),
            analysis: ItemAnalysis {
                has_acceptance_criteria: true,
                ..Default::default()
            },
        }];
        let reqs = attach_analysis(vec![req("a", "", ""), req("b", "", "")], &analyzed);
        assert!(reqs[0].analysis.as_ref().unwrap().has_acceptance_criteria);
        assert!(reqs[1].analysis.is_none());
    }

    #[test]
    fn business_goals_are_unique() {
        let reqs = vec![
            req("Revenue", "Business goal: grow sales", ""),
            req("Revenue", "Business goal: grow sales", ""),
            req("Login", "users sign in", ""),
            req("KPI", "Track the quarterly OBJECTIVE", ""),
        ];
        let goals = identify_business_goals(&reqs);
        assert_eq!(
            goals,
            vec![
                "Business goal: grow sales Revenue".to_string(),
                "Track the quarterly OBJECTIVE KPI".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn synthesized_requirements_replace_rule_based() {
        let generator = FixedGenerator(
            r#"```json
{"requirements": [
  {"title": "Account access", "description": "Sign in and export", "acceptance_criteria": "Works"},
  {"title": "  ", "description": ""}
]}
```"#,
        );
        let reqs = identify_augmented(&generator, &two_stories()).await;
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].id, "R1");
        assert_eq!(reqs[0].title, "Account access");
        assert_eq!(reqs[0].acceptance_criteria, "Works");
    }

    #[tokio::test]
    async fn bare_array_reply_is_accepted() {
        let generator = FixedGenerator(r#"[{"title": "A"}, {"title": "B"}]"#);
        let reqs = identify_augmented(&generator, &two_stories()).await;
        let ids: Vec<_> = reqs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["R1", "R2"]);
    }

    #[tokio::test]
    async fn synthesis_degrades_to_rule_based() {
        let stories = two_stories();
        let expected = identify(&stories);
        assert_eq!(identify_augmented(&FailingGenerator, &stories).await, expected);
        assert_eq!(identify_augmented(&NullCapability, &stories).await, expected);
        assert_eq!(identify_augmented(&FixedGenerator("not json"), &stories).await, expected);
        assert_eq!(
            identify_augmented(&FixedGenerator(r#"{"requirements": []}"#), &stories).await,
            expected
        );
    }
}
