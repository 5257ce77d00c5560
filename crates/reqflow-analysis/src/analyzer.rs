//! Rule-based issue detection over stories and raw chunks.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use reqflow_llm::TextGenerator;
use reqflow_types::{
    AnalysisOutput, AnalysisSummary, AnalyzedStory, Chunk, Issue, IssueKind, ItemAnalysis,
    ReqflowError, Severity, Story, StoryAnalysisReport, Stage,
};

use crate::rules::RuleSet;
use crate::suggest::suggest_improvements;

const CHUNK_SUMMARY_CHARS: usize = 800;

// ---------------------------------------------------------------------------
// TextAnalysisEngine
// ---------------------------------------------------------------------------

/// Table-driven detector for ambiguity, missing criteria, conflicts and
/// unverifiable claims. Holds no state beyond its compiled rules.
#[derive(Debug, Clone)]
pub struct TextAnalysisEngine {
    rules: RuleSet,
    unverifiable: Vec<Regex>,
}

impl TextAnalysisEngine {
    pub fn new(rules: RuleSet) -> Result<Self, ReqflowError> {
        let unverifiable = rules
            .unverifiable_patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        ReqflowError::invalid_input(
                            Stage::Analyze,
                            format!("invalid unverifiable pattern '{p}': {e}"),
                        )
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rules,
            unverifiable,
        })
    }

    pub fn baseline() -> Result<Self, ReqflowError> {
        Self::new(RuleSet::baseline())
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// One medium issue per dictionary keyword found as a case-insensitive
    /// substring, in dictionary order.
    pub fn detect_ambiguous_terms(&self, text: &str) -> Vec<Issue> {
        let lowered = text.to_lowercase();
        self.rules
            .ambiguous_terms
            .iter()
            .filter(|term| lowered.contains(&term.keyword))
            .map(|term| {
                let mut issue = Issue::new(
                    IssueKind::Ambiguity,
                    Severity::Medium,
                    format!("Found ambiguous term '{}'", term.keyword),
                );
                issue.keyword = Some(term.keyword.clone());
                issue.suggestion = Some(term.suggestion.clone());
                issue
            })
            .collect()
    }

    pub fn detect_missing_acceptance_criteria(&self, stories: &[Story]) -> Vec<Issue> {
        stories
            .iter()
            .filter(|s| s.acceptance_criteria.is_empty())
            .map(|s| {
                let title = if s.title.is_empty() {
                    "(no title)"
                } else {
                    s.title.as_str()
                };
                let mut issue = Issue::new(
                    IssueKind::MissingAcceptanceCriteria,
                    Severity::High,
                    format!("User story '{title}' is missing acceptance criteria."),
                );
                issue.story_id = Some(if s.id.is_empty() {
                    s.title.clone()
                } else {
                    s.id.clone()
                });
                issue
            })
            .collect()
    }

    /// Pairwise scan over descriptions. Every rule is checked in both
    /// directions for each unordered pair.
    pub fn detect_conflicts(&self, stories: &[Story]) -> Vec<Issue> {
        let lowered: Vec<String> = stories
            .iter()
            .map(|s| s.description.to_lowercase())
            .collect();

        let mut issues = Vec::new();
        for i in 0..stories.len() {
            for j in (i + 1)..stories.len() {
                for rule in &self.rules.conflicts {
                    if !rule.matches(&lowered[i], &lowered[j]) {
                        continue;
                    }
                    let mut issue = Issue::new(
                        IssueKind::Conflict,
                        Severity::High,
                        rule.describe(&stories[i].title, &stories[j].title),
                    );
                    issue.stories = vec![stories[i].id.clone(), stories[j].id.clone()];
                    issues.push(issue);
                }
            }
        }
        issues
    }

    /// One medium issue per regex match, pattern order then position order.
    pub fn detect_unverifiable(&self, text: &str) -> Vec<Issue> {
        self.unverifiable
            .iter()
            .flat_map(|re| re.find_iter(text))
            .map(|m| {
                let mut issue = Issue::new(
                    IssueKind::Unverifiable,
                    Severity::Medium,
                    self.rules.unverifiable_description.clone(),
                );
                issue.matched = Some(m.as_str().to_string());
                issue
            })
            .collect()
    }

    /// Runs every rule-based check. Set-wide checks come first, then the
    /// per-story checks tagged with the originating story id.
    pub fn analyze_stories(&self, stories: &[Story]) -> AnalysisOutput {
        let mut issues = self.detect_missing_acceptance_criteria(stories);
        issues.extend(self.detect_conflicts(stories));

        for story in stories {
            let story_id = Some(story.id.clone());

            issues.extend(
                self.detect_ambiguous_terms(&story.description)
                    .into_iter()
                    .map(|mut issue| {
                        issue.story_id = story_id.clone();
                        issue
                    }),
            );

            issues.extend(
                self.detect_ambiguous_terms(&story.acceptance_criteria)
                    .into_iter()
                    .map(|mut issue| {
                        issue.story_id = story_id.clone();
                        issue.in_acceptance_criteria = true;
                        issue
                    }),
            );

            let combined = format!("{}\n{}", story.description, story.acceptance_criteria);
            issues.extend(self.detect_unverifiable(&combined).into_iter().map(|mut issue| {
                issue.story_id = story_id.clone();
                issue
            }));
        }

        tracing::debug!(
            stories = stories.len(),
            issues = issues.len(),
            "rule-based analysis complete"
        );

        AnalysisOutput {
            issues,
            suggestions: Vec::new(),
        }
    }

    /// Rule-based analysis plus LLM suggestions. Capability failures leave
    /// `suggestions` empty.
    pub async fn analyze_stories_augmented(
        &self,
        stories: &[Story],
        generator: &dyn TextGenerator,
    ) -> AnalysisOutput {
        let mut output = self.analyze_stories(stories);
        output.suggestions = suggest_improvements(generator, stories).await;
        output
    }

    /// Ambiguity and unverifiable checks over the joined chunk text.
    pub fn analyze_text_chunks(&self, chunks: &[Chunk]) -> ChunkAnalysis {
        let all_text = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut issues = self.detect_ambiguous_terms(&all_text);
        issues.extend(self.detect_unverifiable(&all_text));

        ChunkAnalysis {
            summary: all_text.chars().take(CHUNK_SUMMARY_CHARS).collect(),
            issues,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkAnalysis {
    pub summary: String,
    pub issues: Vec<Issue>,
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// Attaches each story's share of `output` to it and computes the summary.
/// Suggestions not tied to a story are shared by every story.
pub fn enrich(stories: &[Story], output: AnalysisOutput) -> StoryAnalysisReport {
    let analyzed: Vec<AnalyzedStory> = stories
        .iter()
        .map(|story| AnalyzedStory {
            story: story.clone(),
            analysis: ItemAnalysis {
                issues: output
                    .issues
                    .iter()
                    .filter(|i| i.story_id.as_deref() == Some(story.id.as_str()))
                    .cloned()
                    .collect(),
                suggestions: output
                    .suggestions
                    .iter()
                    .filter(|s| s.story_id.as_deref().map_or(true, |id| id == story.id))
                    .cloned()
                    .collect(),
                has_acceptance_criteria: !story.acceptance_criteria.is_empty(),
                conflicts: output
                    .issues
                    .iter()
                    .filter(|i| i.kind == IssueKind::Conflict && i.stories.contains(&story.id))
                    .cloned()
                    .collect(),
            },
        })
        .collect();

    let summary = AnalysisSummary {
        total_stories: stories.len(),
        stories_with_issues: analyzed
            .iter()
            .filter(|s| !s.analysis.issues.is_empty())
            .count(),
        total_issues: output.issues.len(),
        has_suggestions: !output.suggestions.is_empty(),
    };

    StoryAnalysisReport {
        stories: analyzed,
        analysis: output,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqflow_llm::NullCapability;

    fn engine() -> TextAnalysisEngine {
        TextAnalysisEngine::baseline().unwrap()
    }

    fn story(id: &str, title: &str, description: &str, criteria: &str) -> Story {
        Story {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            acceptance_criteria: criteria.into(),
        }
    }

    #[test]
    fn ambiguous_term_soon_is_medium() {
        let issues = engine().detect_ambiguous_terms("I want to export data soon.");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::Ambiguity);
        assert_eq!(issues[0].keyword.as_deref(), Some("soon"));
        assert_eq!(issues[0].severity, Severity::Medium);
        assert_eq!(issues[0].description, "Found ambiguous term 'soon'");
        assert!(issues[0].suggestion.as_deref().unwrap().contains("timeframe"));
    }

    #[test]
    fn ambiguous_terms_are_case_insensitive_and_ordered() {
        let issues = engine().detect_ambiguous_terms("A SECURE and Fast UI");
        let keywords: Vec<_> = issues.iter().filter_map(|i| i.keyword.as_deref()).collect();
        assert_eq!(keywords, vec!["fast", "secure"]);
    }

    #[test]
    fn whitespace_criteria_count_as_present() {
        let stories = vec![story("S1", "A", "desc", "  \n")];
        assert!(engine().detect_missing_acceptance_criteria(&stories).is_empty());
        let enriched = enrich(&stories, engine().analyze_stories(&stories));
        assert!(enriched.stories[0].analysis.has_acceptance_criteria);
    }

    #[test]
    fn missing_criteria_is_high() {
        let stories = vec![story("S1", "A", "desc", ""), story("S2", "B", "desc", "ok")];
        let issues = engine().detect_missing_acceptance_criteria(&stories);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::High);
        assert_eq!(issues[0].story_id.as_deref(), Some("S1"));
        assert_eq!(
            issues[0].description,
            "User story 'A' is missing acceptance criteria."
        );
    }

    #[test]
    fn role_conflict_in_either_order() {
        let admin = story("S1", "Admin", "Only admin can delete records", "x");
        let open = story("S2", "Open", "Everyone can delete records", "x");

        for stories in [vec![admin.clone(), open.clone()], vec![open, admin]] {
            let issues = engine().detect_conflicts(&stories);
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].severity, Severity::High);
            assert!(issues[0].concerns("S1"));
            assert!(issues[0].concerns("S2"));
        }
    }

    #[test]
    fn negation_conflict_detected() {
        let stories = vec![
            story("S1", "A", "The system must not store passwords", "x"),
            story("S2", "B", "The system must store audit logs", "x"),
        ];
        let issues = engine().detect_conflicts(&stories);
        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[0].description,
            "Contradictory constraint detected between stories 'A' and 'B'."
        );
    }

    #[test]
    fn unverifiable_matches_word_boundaries() {
        let issues = engine().detect_unverifiable("A fast, User-Friendly and realtime app; breakfast");
        let matches: Vec<_> = issues.iter().filter_map(|i| i.matched.as_deref()).collect();
        assert_eq!(matches, vec!["fast", "realtime", "User-Friendly"]);
    }

    #[test]
    fn analyze_stories_orders_and_tags_issues() {
        let stories = vec![
            story("S1", "Export", "I want to export data soon.", "Loads fast"),
            story("S2", "Import", "Import CSV", ""),
        ];
        let output = engine().analyze_stories(&stories);
        assert!(output.suggestions.is_empty());

        let kinds: Vec<_> = output.issues.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                IssueKind::MissingAcceptanceCriteria,
                IssueKind::Ambiguity,
                IssueKind::Ambiguity,
                IssueKind::Unverifiable,
            ]
        );
        let in_criteria = &output.issues[2];
        assert_eq!(in_criteria.keyword.as_deref(), Some("fast"));
        assert!(in_criteria.in_acceptance_criteria);
        assert_eq!(output.issues[3].story_id.as_deref(), Some("S1"));
    }

    #[test]
    fn analyze_stories_is_deterministic() {
        let stories = vec![story("S1", "A", "Everyone must see it quickly", "")];
        let e = engine();
        assert_eq!(e.analyze_stories(&stories), e.analyze_stories(&stories));
    }

    #[tokio::test]
    async fn augmented_without_llm_has_no_suggestions() {
        let stories = vec![story("S1", "A", "soon", "")];
        let output = engine()
            .analyze_stories_augmented(&stories, &NullCapability)
            .await;
        assert!(output.suggestions.is_empty());
        assert_eq!(output.issues.len(), 2);
    }

    #[test]
    fn chunk_analysis_summarizes() {
        let chunks = vec![Chunk::new("chunk-1", "x".repeat(900) + " scalable")];
        let result = engine().analyze_text_chunks(&chunks);
        assert_eq!(result.summary.chars().count(), CHUNK_SUMMARY_CHARS);
        assert_eq!(result.issues.len(), 2);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let mut rules = RuleSet::baseline();
        rules.unverifiable_patterns.push("(unclosed".into());
        assert!(TextAnalysisEngine::new(rules).is_err());
    }

    #[test]
    fn enrich_splits_issues_per_story() {
        let stories = vec![
            story("S1", "Admin", "Only admin can edit", ""),
            story("S2", "Open", "Everyone can edit soon", "done"),
        ];
        let output = engine().analyze_stories(&stories);
        let report = enrich(&stories, output);

        assert_eq!(report.summary.total_stories, 2);
        assert_eq!(report.summary.total_issues, 3);
        assert_eq!(report.summary.stories_with_issues, 2);
        assert!(!report.summary.has_suggestions);

        let s1 = &report.stories[0].analysis;
        assert!(!s1.has_acceptance_criteria);
        assert_eq!(s1.issues.len(), 1);
        assert_eq!(s1.conflicts.len(), 1);

        let s2 = &report.stories[1].analysis;
        assert!(s2.has_acceptance_criteria);
        assert_eq!(s2.issues[0].keyword.as_deref(), Some("soon"));
        assert_eq!(s2.conflicts.len(), 1);
    }
}
