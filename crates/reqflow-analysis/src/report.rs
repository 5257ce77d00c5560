//! Final report artifacts: markdown, CSV and a mermaid context diagram.

use serde::{Deserialize, Serialize};

use reqflow_llm::TextGenerator;
use reqflow_types::{AnalysisOutput, Issue, IssueKind, Report, Requirement, Severity, Suggestion};

const CSV_HEADER: &str = "req_id,title,priority,score,issues_count,has_acceptance_criteria,description";

const REPORT_SYSTEM: &str = "You are a requirements engineer writing for project stakeholders.";

const REPORT_PROMPT: &str = "Write a short executive summary in markdown for this requirements analysis. \
Cover overall quality, the most important risks and the next steps. Do not repeat the tables.";

pub const AI_SUMMARY_HEADING: &str = "## AI Summary";

// ---------------------------------------------------------------------------
// Final report
// ---------------------------------------------------------------------------

/// Builds all three artifacts. An empty requirement list yields well-formed
/// artifacts with no rows.
pub fn build(requirements: &[Requirement], analysis: &AnalysisOutput) -> Report {
    Report {
        markdown: render_markdown(requirements, analysis),
        csv: render_csv(requirements),
        mermaid: render_mermaid(requirements),
    }
}

/// [`build`] plus an LLM-written summary section appended to the markdown.
/// Without a usable reply the rule-based report is returned unchanged.
pub async fn build_augmented(
    generator: &dyn TextGenerator,
    requirements: &[Requirement],
    analysis: &AnalysisOutput,
) -> Report {
    let mut report = build(requirements, analysis);
    if !generator.is_available() {
        return report;
    }

    let payload = match (serde_json::to_string(requirements), serde_json::to_string(analysis)) {
        (Ok(reqs), Ok(analysis)) => format!("Requirements:\n{reqs}\n\nAnalyzer output:\n{analysis}"),
        _ => return report,
    };
    let prompt = format!("{REPORT_PROMPT}\n\n{payload}");

    match generator.generate(&prompt, Some(REPORT_SYSTEM)).await {
        Ok(content) if !content.trim().is_empty() => {
            report.markdown.push_str(&format!("\n\n{AI_SUMMARY_HEADING}\n\n{}\n", content.trim()));
        }
        Ok(_) => tracing::warn!("LLM report summary was empty, keeping rule-based report"),
        Err(e) => tracing::warn!(error = %e, "LLM report summary unavailable, keeping rule-based report"),
    }
    report
}

pub fn render_markdown(requirements: &[Requirement], analysis: &AnalysisOutput) -> String {
    let with_issues = requirements.iter().filter(|r| r.issue_count() > 0).count();
    let total_issues: usize = requirements.iter().map(Requirement::issue_count).sum();
    let conflicts = analysis
        .issues
        .iter()
        .filter(|i| i.kind == IssueKind::Conflict)
        .count();

    let mut md: Vec<String> = vec![
        "# Requirements Analysis Report".into(),
        "\n## Executive Summary\n".into(),
        format!("- Total Requirements: {}", requirements.len()),
        format!("- Requirements with Issues: {with_issues}"),
        format!("- Total Issues Found: {total_issues}"),
        format!("- Conflicts Detected: {conflicts}\n"),
        "\n## Requirements Overview".into(),
        "\n| ID | Title | Priority | Issues | Acceptance Criteria |".into(),
        "|---|---|---|---|---|".into(),
    ];

    for r in requirements {
        let criteria = if r.acceptance_criteria.is_empty() {
            "✗"
        } else {
            "✓"
        };
        md.push(format!(
            "| {} | {} | {} | {} | {} |",
            r.id,
            r.title,
            opt(r.priority),
            r.issue_count(),
            criteria
        ));
    }

    md.push("\n## Detailed Analysis\n".into());
    for r in requirements {
        md.push(format!("### {} ({})", r.title, r.id));
        md.push("\n**Description:**".into());
        md.push(r.description.clone());
        md.push("\n**Acceptance Criteria:**".into());
        md.push(if r.acceptance_criteria.is_empty() {
            "None specified".into()
        } else {
            r.acceptance_criteria.clone()
        });

        if !r.issues().is_empty() {
            md.push("\n**Issues Found:**".into());
            for issue in r.issues() {
                md.push(format!(
                    "- [{}] {}",
                    issue.severity.as_str().to_uppercase(),
                    issue.description
                ));
                if let Some(suggestion) = &issue.suggestion {
                    md.push(format!("  - Suggestion: {suggestion}"));
                }
            }
        }

        if !r.suggestions().is_empty() {
            md.push("\n**Improvement Suggestions:**".into());
            for s in r.suggestions() {
                md.push(format!("- {}", s.description));
            }
        }

        md.push("\n---\n".into());
    }

    md.join("\n")
}

pub fn render_csv(requirements: &[Requirement]) -> String {
    let mut lines = vec![CSV_HEADER.to_string()];
    for r in requirements {
        lines.push(format!(
            "{},{},{},{},{},{},{}",
            r.id,
            csv_quote(&r.title),
            opt(r.priority),
            opt(r.score),
            r.issue_count(),
            if r.acceptance_criteria.is_empty() {
                "no"
            } else {
                "yes"
            },
            csv_quote(&r.description)
        ));
    }
    lines.join("\n")
}

/// Context diagram with one node per requirement, styled by whether it
/// carries issues.
pub fn render_mermaid(requirements: &[Requirement]) -> String {
    let mut lines = vec!["graph TD".to_string()];
    for r in requirements {
        let title = mermaid_label(&r.title);
        match r.issue_count() {
            0 => lines.push(format!("    {}[\"{title}\"]:::clean", r.id)),
            n => lines.push(format!(
                "    {}[\"{title}<br/>({n} issues)\"]:::hasIssues",
                r.id
            )),
        }
    }
    lines.push("    classDef hasIssues fill:#ff9999".into());
    lines.push("    classDef clean fill:#99ff99".into());
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn markdown_table(requirements: &[Requirement]) -> String {
    let mut lines = vec![
        "| id | title | priority |".to_string(),
        "|---|---|---|".to_string(),
    ];
    for r in requirements {
        lines.push(format!("| {} | {} | {} |", r.id, r.title, opt(r.priority)));
    }
    lines.join("\n")
}

/// Plain dependency graph with caller-supplied `(from, to)` edges.
pub fn mermaid_diagram(requirements: &[Requirement], edges: &[(String, String)]) -> String {
    let mut lines = vec!["graph TD".to_string()];
    for r in requirements {
        lines.push(format!("    {}[\"{}\"]", r.id, mermaid_label(&r.title)));
    }
    for (from, to) in edges {
        lines.push(format!("    {from} --> {to}"));
    }
    lines.join("\n")
}

fn csv_quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn mermaid_label(text: &str) -> String {
    text.replace('"', "#quot;")
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Structured report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    fn record(&mut self, severity: Severity) {
        match severity {
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    fn add(&mut self, other: &SeverityCounts) {
        self.high += other.high;
        self.medium += other.medium;
        self.low += other.low;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetrics {
    pub has_acceptance_criteria: bool,
    pub issue_count: usize,
    pub suggestion_count: usize,
    pub severity_counts: SeverityCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportItemAnalysis {
    pub issues: Vec<Issue>,
    pub suggestions: Vec<Suggestion>,
    pub metrics: ItemMetrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: Option<u32>,
    pub acceptance_criteria: String,
    pub score: Option<i64>,
    pub analysis: ReportItemAnalysis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_requirements: usize,
    pub requirements_with_issues: usize,
    pub total_issues: usize,
    pub total_suggestions: usize,
    pub severity_distribution: SeverityCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementsReport {
    pub count: usize,
    pub items: Vec<ReportItem>,
    pub summary: ReportSummary,
}

/// Per-requirement metrics plus totals. `count` is what report validation
/// checks against the requirement list.
pub fn generate_report(requirements: &[Requirement]) -> RequirementsReport {
    let items: Vec<ReportItem> = requirements
        .iter()
        .map(|r| {
            let mut severity_counts = SeverityCounts::default();
            for issue in r.issues() {
                severity_counts.record(issue.severity);
            }
            ReportItem {
                id: r.id.clone(),
                title: r.title.clone(),
                description: r.description.clone(),
                priority: r.priority,
                acceptance_criteria: r.acceptance_criteria.clone(),
                score: r.score,
                analysis: ReportItemAnalysis {
                    issues: r.issues().to_vec(),
                    suggestions: r.suggestions().to_vec(),
                    metrics: ItemMetrics {
                        has_acceptance_criteria: !r.acceptance_criteria.is_empty(),
                        issue_count: r.issue_count(),
                        suggestion_count: r.suggestions().len(),
                        severity_counts,
                    },
                },
            }
        })
        .collect();

    let mut severity_distribution = SeverityCounts::default();
    for item in &items {
        severity_distribution.add(&item.analysis.metrics.severity_counts);
    }

    let summary = ReportSummary {
        total_requirements: requirements.len(),
        requirements_with_issues: items
            .iter()
            .filter(|i| i.analysis.metrics.issue_count > 0)
            .count(),
        total_issues: items.iter().map(|i| i.analysis.metrics.issue_count).sum(),
        total_suggestions: items
            .iter()
            .map(|i| i.analysis.metrics.suggestion_count)
            .sum(),
        severity_distribution,
    };

    RequirementsReport {
        count: requirements.len(),
        items,
        summary,
    }
}
