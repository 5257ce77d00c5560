use std::path::PathBuf;
use std::time::Duration;

use reqflow_analysis::{RuleSet, TextAnalysisEngine};
use reqflow_types::ReqflowError;

/// Runtime knobs for the pipeline and conversational driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ReqflowConfig {
    /// Ask the text generator for improvement suggestions during analysis.
    pub use_llm_suggestions: bool,
    /// Upper bound for any single LLM or embedding call.
    pub llm_timeout: Duration,
    /// Tool-calling rounds allowed per conversational turn.
    pub max_tool_iterations: usize,
    pub title_max_len: usize,
    /// Flatten chunks to one line during normalization.
    pub one_line_normalize: bool,
    /// JSON rule file replacing the baseline dictionaries.
    pub rules_path: Option<PathBuf>,
}

impl Default for ReqflowConfig {
    fn default() -> Self {
        Self {
            use_llm_suggestions: true,
            llm_timeout: Duration::from_secs(8),
            max_tool_iterations: 10,
            title_max_len: reqflow_analysis::extractor::DEFAULT_TITLE_MAX_LEN,
            one_line_normalize: false,
            rules_path: None,
        }
    }
}

impl ReqflowConfig {
    /// Defaults overridden by `REQFLOW_USE_LLM`, `REQFLOW_LLM_TIMEOUT_SECS`,
    /// `REQFLOW_MAX_TOOL_ITERATIONS` and `REQFLOW_RULES`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("REQFLOW_USE_LLM") {
            config.use_llm_suggestions = matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(secs) = lookup("REQFLOW_LLM_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            config.llm_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = lookup("REQFLOW_MAX_TOOL_ITERATIONS").and_then(|v| v.trim().parse().ok()) {
            config.max_tool_iterations = n;
        }
        if let Some(path) = lookup("REQFLOW_RULES").filter(|p| !p.trim().is_empty()) {
            config.rules_path = Some(PathBuf::from(path));
        }

        config
    }

    /// The configured rule set, or the baseline when no file is set.
    pub fn load_rules(&self) -> Result<RuleSet, ReqflowError> {
        match &self.rules_path {
            Some(path) => RuleSet::from_json_file(path),
            None => Ok(RuleSet::baseline()),
        }
    }

    pub fn build_engine(&self) -> Result<TextAnalysisEngine, ReqflowError> {
        TextAnalysisEngine::new(self.load_rules()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ReqflowConfig::default();
        assert!(config.use_llm_suggestions);
        assert_eq!(config.llm_timeout, Duration::from_secs(8));
        assert_eq!(config.max_tool_iterations, 10);
        assert_eq!(config.title_max_len, 80);
        assert!(config.rules_path.is_none());
    }

    #[test]
    fn env_overrides() {
        let config = ReqflowConfig::from_lookup(lookup(&[
            ("REQFLOW_USE_LLM", "false"),
            ("REQFLOW_LLM_TIMEOUT_SECS", "5"),
            ("REQFLOW_MAX_TOOL_ITERATIONS", "3"),
            ("REQFLOW_RULES", "/etc/reqflow/rules.json"),
        ]));
        assert!(!config.use_llm_suggestions);
        assert_eq!(config.llm_timeout, Duration::from_secs(5));
        assert_eq!(config.max_tool_iterations, 3);
        assert_eq!(
            config.rules_path.as_deref(),
            Some(std::path::Path::new("/etc/reqflow/rules.json"))
        );
    }

    #[test]
    fn unparsable_values_keep_defaults() {
        let config = ReqflowConfig::from_lookup(lookup(&[
            ("REQFLOW_LLM_TIMEOUT_SECS", "soon"),
            ("REQFLOW_MAX_TOOL_ITERATIONS", "-1"),
        ]));
        assert_eq!(config, ReqflowConfig::default());
    }

    #[test]
    fn baseline_engine_without_rules_file() {
        let engine = ReqflowConfig::default().build_engine().unwrap();
        assert_eq!(engine.rules().ambiguous_terms.len(), 16);
    }

    #[test]
    fn rules_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, r#"{"unverifiable_patterns": ["\\bblazing\\b"]}"#).unwrap();

        let config = ReqflowConfig {
            rules_path: Some(path),
            ..Default::default()
        };
        let engine = config.build_engine().unwrap();
        assert_eq!(engine.detect_unverifiable("a blazing UI").len(), 1);
        assert!(engine.detect_unverifiable("a fast UI").is_empty());
    }
}
