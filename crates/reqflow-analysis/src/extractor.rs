//! Marker-based segmentation of normalized text into stories.

use reqflow_types::{Chunk, Story};

pub const DEFAULT_TITLE_MAX_LEN: usize = 80;

const BULLETS: [&str; 3] = ["- ", "* ", "• "];

/// Splits chunk text into stories.
///
/// A line starting with the title marker (case-insensitive) opens a new story
/// and becomes its title. A line starting with the criteria marker switches the
/// current story into criteria mode, after which every non-empty line (with a
/// leading bullet stripped) is an acceptance criterion. Everything else goes
/// into the description. Text before the first title marker is ignored.
#[derive(Debug, Clone)]
pub struct StoryExtractor {
    title_marker: String,
    criteria_marker: String,
    title_max_len: usize,
}

impl Default for StoryExtractor {
    fn default() -> Self {
        Self {
            title_marker: "story:".into(),
            criteria_marker: "acceptance criteria".into(),
            title_max_len: DEFAULT_TITLE_MAX_LEN,
        }
    }
}

impl StoryExtractor {
    pub fn with_title_max_len(mut self, len: usize) -> Self {
        self.title_max_len = len;
        self
    }

    pub fn extract(&self, chunks: &[Chunk]) -> Vec<Story> {
        let text = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let mut stories = Vec::new();
        let mut current: Option<Draft> = None;

        for raw in text.lines() {
            let line = raw.trim();

            if strip_prefix_ci(line, &self.title_marker).is_some() {
                if let Some(draft) = current.take() {
                    stories.push(draft.finish(stories.len() + 1));
                }
                current = Some(Draft::new(truncate_chars(line, self.title_max_len)));
                continue;
            }

            let Some(draft) = current.as_mut() else {
                continue;
            };

            if let Some(rest) = strip_prefix_ci(line, &self.criteria_marker) {
                draft.in_criteria = true;
                let inline = rest.trim_start_matches(':').trim();
                if !inline.is_empty() {
                    draft.criteria.push(inline.to_string());
                }
                continue;
            }

            if line.is_empty() {
                continue;
            }

            if draft.in_criteria {
                draft.criteria.push(strip_bullet(line).to_string());
            } else {
                draft.description.push(line.to_string());
            }
        }

        if let Some(draft) = current {
            stories.push(draft.finish(stories.len() + 1));
        }

        tracing::debug!(stories = stories.len(), "extracted stories");
        stories
    }
}

/// Extracts stories with the default markers.
pub fn extract_stories(chunks: &[Chunk]) -> Vec<Story> {
    StoryExtractor::default().extract(chunks)
}

struct Draft {
    title: String,
    description: Vec<String>,
    criteria: Vec<String>,
    in_criteria: bool,
}

impl Draft {
    fn new(title: String) -> Self {
        Self {
            title,
            description: Vec::new(),
            criteria: Vec::new(),
            in_criteria: false,
        }
    }

    fn finish(self, index: usize) -> Story {
        Story {
            id: format!("S{index}"),
            title: self.title,
            description: self.description.join("\n"),
            acceptance_criteria: self.criteria.join("\n"),
        }
    }
}

fn strip_prefix_ci<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let head = line.get(..marker.len())?;
    if head.eq_ignore_ascii_case(marker) {
        line.get(marker.len()..)
    } else {
        None
    }
}

fn strip_bullet(line: &str) -> &str {
    BULLETS
        .iter()
        .find_map(|b| line.strip_prefix(b))
        .map(str::trim)
        .unwrap_or(line)
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
