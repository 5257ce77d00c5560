//! Rule dictionaries driving the text analysis engine.
//!
//! The baseline mirrors the documented heuristics. A rule file in JSON can
//! replace any of the three tables; omitted tables keep their baseline.

use std::path::Path;

use serde::{Deserialize, Serialize};

use reqflow_types::{ReqflowError, Stage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousTerm {
    pub keyword: String,
    pub suggestion: String,
}

/// A pairwise contradiction: one story mentions `left`, another mentions
/// `right`. `description` may reference the two titles as `{a}` and `{b}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRule {
    pub name: String,
    pub left: String,
    pub right: String,
    pub description: String,
}

impl ConflictRule {
    fn new(name: &str, left: &str, right: &str, description: &str) -> Self {
        Self {
            name: name.into(),
            left: left.into(),
            right: right.into(),
            description: description.into(),
        }
    }

    /// Symmetric over the pair of lower-cased descriptions.
    pub fn matches(&self, a: &str, b: &str) -> bool {
        (a.contains(&self.left) && b.contains(&self.right))
            || (b.contains(&self.left) && a.contains(&self.right))
    }

    pub fn describe(&self, title_a: &str, title_b: &str) -> String {
        self.description
            .replace("{a}", title_a)
            .replace("{b}", title_b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub ambiguous_terms: Vec<AmbiguousTerm>,
    pub conflicts: Vec<ConflictRule>,
    pub unverifiable_patterns: Vec<String>,
    pub unverifiable_description: String,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::baseline()
    }
}

impl RuleSet {
    pub fn baseline() -> Self {
        let terms = [
            ("soon", "Specify an exact timeframe (e.g., 'within 24 hours', 'by next sprint')"),
            ("appropriate", "Define specific criteria for what is considered appropriate"),
            ("fast", "Set measurable performance targets (e.g., 'under 2 seconds', 'within 500ms')"),
            ("quickly", "Define exact speed requirements (e.g., 'within 3 seconds')"),
            ("as needed", "Specify exact conditions when the action should occur"),
            ("user friendly", "List specific usability requirements (e.g., 'completes task in 3 clicks')"),
            ("responsive", "Set specific performance thresholds (e.g., 'loads in under 1 second')"),
            ("real time", "Define maximum acceptable delay (e.g., 'updates within 100ms')"),
            ("scalable", "Specify exact scale requirements (e.g., 'handles 1000 concurrent users')"),
            ("efficient", "Define measurable efficiency criteria"),
            ("flexible", "List specific customization options or adaptation scenarios"),
            ("intuitive", "Define specific usability metrics or success criteria"),
            ("seamless", "Specify exact integration requirements or success metrics"),
            ("simple", "Define specific ease-of-use criteria"),
            ("dynamic", "Specify exact behavior changes and triggers"),
            ("secure", "List specific security requirements and standards to meet"),
        ];

        Self {
            ambiguous_terms: terms
                .iter()
                .map(|(k, s)| AmbiguousTerm {
                    keyword: (*k).into(),
                    suggestion: (*s).into(),
                })
                .collect(),
            conflicts: vec![
                ConflictRule::new(
                    "role_access",
                    "only admin",
                    "everyone",
                    "Possible role access conflict between story '{a}' and '{b}'.",
                ),
                ConflictRule::new(
                    "negation",
                    "must not",
                    "must",
                    "Contradictory constraint detected between stories '{a}' and '{b}'.",
                ),
            ],
            unverifiable_patterns: vec![
                r"\bfast\b".into(),
                r"\bscalable\b".into(),
                r"\brealtime\b".into(),
                r"\buser[- ]friendly\b".into(),
            ],
            unverifiable_description: "Requirement uses an unverifiable adjective; prefer measurable criteria (e.g., latency < 200ms).".into(),
        }
    }

    /// Loads a rule file. Keywords and phrases are lower-cased on load since
    /// matching runs against lower-cased text.
    pub fn from_json_file(path: &Path) -> Result<Self, ReqflowError> {
        let raw = std::fs::read_to_string(path)?;
        let mut rules: RuleSet = serde_json::from_str(&raw).map_err(|e| {
            ReqflowError::invalid_input(
                Stage::Analyze,
                format!("invalid rule file {}: {e}", path.display()),
            )
        })?;
        for term in &mut rules.ambiguous_terms {
            term.keyword = term.keyword.to_lowercase();
        }
        for rule in &mut rules.conflicts {
            rule.left = rule.left.to_lowercase();
            rule.right = rule.right.to_lowercase();
        }
        tracing::info!(
            path = %path.display(),
            ambiguous = rules.ambiguous_terms.len(),
            conflicts = rules.conflicts.len(),
            unverifiable = rules.unverifiable_patterns.len(),
            "loaded analysis rules"
        );
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn baseline_has_documented_tables() {
        let rules = RuleSet::baseline();
        assert_eq!(rules.ambiguous_terms.len(), 16);
        assert_eq!(rules.ambiguous_terms[0].keyword, "soon");
        assert_eq!(rules.conflicts.len(), 2);
        assert_eq!(rules.unverifiable_patterns.len(), 4);
    }

    #[test]
    fn conflict_rule_is_symmetric() {
        let rule = &RuleSet::baseline().conflicts[0];
        assert!(rule.matches("only admin may delete", "everyone can view"));
        assert!(rule.matches("everyone can view", "only admin may delete"));
        assert!(!rule.matches("admins may delete", "everyone can view"));
    }

    #[test]
    fn conflict_description_substitutes_titles() {
        let rule = &RuleSet::baseline().conflicts[1];
        assert_eq!(
            rule.describe("A", "B"),
            "Contradictory constraint detected between stories 'A' and 'B'."
        );
    }

    #[test]
    fn rule_file_overrides_only_given_tables() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"ambiguous_terms": [{{"keyword": "Shortly", "suggestion": "Give a date"}}]}}"#
        )
        .unwrap();

        let rules = RuleSet::from_json_file(file.path()).unwrap();
        assert_eq!(rules.ambiguous_terms.len(), 1);
        assert_eq!(rules.ambiguous_terms[0].keyword, "shortly");
        assert_eq!(rules.conflicts, RuleSet::baseline().conflicts);
    }

    #[test]
    fn malformed_rule_file_is_input_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = RuleSet::from_json_file(file.path()).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Analyze));
    }

    #[test]
    fn missing_rule_file_is_io_error() {
        let err = RuleSet::from_json_file(Path::new("/nonexistent/rules.json")).unwrap_err();
        assert!(matches!(err, ReqflowError::Io(_)));
    }
}
