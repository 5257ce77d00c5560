//! Ingestion and normalization of raw input text.

use reqflow_types::Chunk;

/// Wraps each raw item as a chunk with ids `chunk-1..n`.
pub fn ingest<S: AsRef<str>>(items: &[S]) -> Vec<Chunk> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| Chunk::new(format!("chunk-{}", i + 1), item.as_ref()))
        .collect()
}

/// Normalizes every chunk's text, keeping ids.
pub fn normalize(chunks: &[Chunk], one_line: bool) -> Vec<Chunk> {
    chunks
        .iter()
        .map(|c| Chunk::new(c.id.clone(), normalize_text(&c.text, one_line)))
        .collect()
}

/// Trims every line, collapses inner whitespace runs to one space and runs of
/// blank lines to a single blank line. In one-line mode the non-empty lines
/// are joined with spaces.
///
/// Idempotent: `normalize_text(normalize_text(t)) == normalize_text(t)`.
pub fn normalize_text(text: &str, one_line: bool) -> String {
    let lines = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "));

    if one_line {
        return lines
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
    }

    let mut out: Vec<String> = Vec::new();
    for line in lines {
        if line.is_empty() && out.last().map_or(true, |prev| prev.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_assigns_sequential_ids() {
        let chunks = ingest(&["first", "second"]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "chunk-1");
        assert_eq!(chunks[1].id, "chunk-2");
        assert_eq!(chunks[1].text, "second");
    }

    #[test]
    fn ingest_empty_is_empty() {
        let items: [&str; 0] = [];
        assert!(ingest(&items).is_empty());
    }

    #[test]
    fn normalize_trims_and_collapses() {
        let text = "\n\n  Story:   Export   Report \r\n\n\n\tAs a user,  I want it.  \n\n";
        assert_eq!(
            normalize_text(text, false),
            "Story: Export Report\n\nAs a user, I want it."
        );
    }

    #[test]
    fn normalize_one_line_flattens() {
        let text = "Story: A\nAs a user\n\n- item";
        assert_eq!(normalize_text(text, true), "Story: A As a user - item");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "  a  b \n\n\n c ",
            "Story: X\nAcceptance Criteria:\n - one\n\n\n- two\n",
            "",
            "\n\n\n",
            "single",
        ];
        for sample in samples {
            for one_line in [false, true] {
                let once = normalize_text(sample, one_line);
                assert_eq!(normalize_text(&once, one_line), once, "input {sample:?}");
            }
        }
    }

    #[test]
    fn normalize_keeps_chunk_ids() {
        let chunks = normalize(&[Chunk::new("chunk-7", "  hi  ")], false);
        assert_eq!(chunks[0], Chunk::new("chunk-7", "hi"));
    }
}
