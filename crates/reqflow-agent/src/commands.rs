//! Chat commands and requirement detection.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Help,
    Clear,
    Collect,
    Done,
    Analyze,
}

impl Command {
    /// `ping` must be the whole message; slash commands match by prefix.
    pub fn parse(text: &str) -> Option<Self> {
        let lower = text.trim().to_lowercase();
        if lower == "ping" {
            return Some(Command::Ping);
        }
        [
            ("/help", Command::Help),
            ("/clear", Command::Clear),
            ("/collect", Command::Collect),
            ("/done", Command::Done),
            ("/analyze", Command::Analyze),
        ]
        .into_iter()
        .find(|(prefix, _)| lower.starts_with(prefix))
        .map(|(_, command)| command)
    }
}

const REQUIREMENT_MARKERS: [&str; 12] = [
    "story:",
    "as a ",
    "as an ",
    "given ",
    "when ",
    "then ",
    "acceptance criteria:",
    "requirement:",
    "the system shall",
    "the system must",
    "the user can",
    "the user should",
];

pub fn looks_like_requirement(text: &str) -> bool {
    let lower = text.to_lowercase();
    REQUIREMENT_MARKERS.iter().any(|m| lower.contains(m))
}

pub const HELP_TEXT: &str = "\
Requirements Engineering Assistant

Enter requirements as:
- Story: [Title]
- As a [role], I want [feature]
- Given [context] When [action] Then [result]

Commands:
- /collect - start collecting requirements
- /analyze - analyze collected requirements
- /done - stop collecting and analyze
- /clear - forget collected requirements
- /help - show this help

Pipeline:
Collector -> Analyzer -> Requirement -> Validator -> Reporter -> Diagram";
