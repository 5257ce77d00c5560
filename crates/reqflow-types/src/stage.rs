use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One step of the ingest → report chain. Used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Normalize,
    ExtractStories,
    Analyze,
    IdentifyRequirements,
    Prioritize,
    Validate,
    BuildReport,
}

impl Stage {
    /// All stages in linear pipeline order.
    pub const ALL: [Stage; 8] = [
        Stage::Ingest,
        Stage::Normalize,
        Stage::ExtractStories,
        Stage::Analyze,
        Stage::IdentifyRequirements,
        Stage::Prioritize,
        Stage::Validate,
        Stage::BuildReport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Normalize => "normalize",
            Stage::ExtractStories => "extract_stories",
            Stage::Analyze => "analyze",
            Stage::IdentifyRequirements => "identify_requirements",
            Stage::Prioritize => "prioritize",
            Stage::Validate => "validate",
            Stage::BuildReport => "build_report",
        }
    }

    /// The agent that owns this stage in the collector → reporter chain.
    pub fn agent(&self) -> &'static str {
        match self {
            Stage::Ingest | Stage::Normalize | Stage::ExtractStories => "collector",
            Stage::Analyze => "analyzer",
            Stage::IdentifyRequirements | Stage::Prioritize => "requirement",
            Stage::Validate => "validator",
            Stage::BuildReport => "reporter",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage '{s}'"))
    }
}
