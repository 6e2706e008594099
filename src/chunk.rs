use serde::Serialize;

use crate::content::estimate_tokens;

pub const MIN_CHUNK_TOKENS: i64 = 128;
pub const MAX_CHUNK_TOKENS: i64 = 4096;
pub const DEFAULT_CHUNK_TOKENS: i64 = 1024;

/// A contiguous, token-bounded slice of a document body tagged with the
/// heading context it falls under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub heading_path: Vec<String>,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    pub token_estimate: i64,
}

/// Splits a markdown body into chunks of at most `max_tokens` estimated
/// tokens, tracking ATX heading context. Chunks are contiguous and
/// non-overlapping; concatenating their texts reproduces the body exactly.
/// A single line over budget becomes its own oversized chunk; lines are
/// never split. `max_tokens` is clamped to [MIN_CHUNK_TOKENS,
/// MAX_CHUNK_TOKENS].
#[must_use]
pub fn chunk_markdown(body: &str, max_tokens: i64) -> Vec<Chunk> {
    let max_tokens = max_tokens.clamp(MIN_CHUNK_TOKENS, MAX_CHUNK_TOKENS);

    let mut chunks = Vec::new();
    let mut heading_stack: Vec<String> = Vec::new();

    let mut current = String::new();
    let mut current_chars: usize = 0;
    let mut current_path: Vec<String> = Vec::new();
    let mut start_line = 1;
    let mut line_no = 0;

    for line in body.split_inclusive('\n') {
        line_no += 1;
        let line_chars = line.chars().count();

        if !current.is_empty()
            && ((current_chars + line_chars).div_ceil(4)) as i64 > max_tokens
        {
            let token_estimate = estimate_tokens(&current);
            chunks.push(Chunk {
                heading_path: current_path.clone(),
                start_line,
                end_line: line_no - 1,
                text: std::mem::take(&mut current),
                token_estimate,
            });
            current_chars = 0;
            start_line = line_no;
        }

        if let Some((level, title)) = parse_atx_heading(line) {
            heading_stack.truncate(level - 1);
            heading_stack.push(title);
        }

        if current.is_empty() {
            current_path = heading_stack.clone();
            start_line = line_no;
        }

        current.push_str(line);
        current_chars += line_chars;
    }

    if !current.is_empty() {
        let token_estimate = estimate_tokens(&current);
        chunks.push(Chunk {
            heading_path: current_path,
            start_line,
            end_line: line_no,
            text: current,
            token_estimate,
        });
    }

    chunks
}

/// Recognizes an ATX heading line: up to three leading spaces, one to six
/// `#` characters, then a space/tab or end of line. Returns (level, title).
fn parse_atx_heading(line: &str) -> Option<(usize, String)> {
    let line = line.trim_end_matches(['\n', '\r']);
    let stripped = line.strip_prefix("   ")
        .or_else(|| line.strip_prefix("  "))
        .or_else(|| line.strip_prefix(' '))
        .unwrap_or(line);

    let level = stripped.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }

    let rest = &stripped[level..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }

    // Trailing closing hashes are decoration, not title text.
    let title = rest.trim().trim_end_matches('#').trim_end();
    Some((level, title.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concat(chunks: &[Chunk]) -> String {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn test_concatenation_reproduces_body() {
        let body = "# One\n\nalpha beta gamma\n\n## Two\n\ndelta epsilon\nno trailing newline";
        let chunks = chunk_markdown(body, MIN_CHUNK_TOKENS);
        assert_eq!(concat(&chunks), body);
    }

    #[test]
    fn test_empty_body_yields_no_chunks() {
        assert!(chunk_markdown("", 512).is_empty());
    }

    #[test]
    fn test_single_small_body_is_one_chunk() {
        let body = "just a line\n";
        let chunks = chunk_markdown(body, 512);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 1);
        assert_eq!(chunks[0].text, body);
    }

    #[test]
    fn test_budget_splits_chunks() {
        // Each line is exactly 128 tokens (512 chars), budget fits one.
        let line = "x".repeat(511) + "\n";
        let body = line.repeat(4);
        let chunks = chunk_markdown(&body, MIN_CHUNK_TOKENS);
        assert_eq!(chunks.len(), 4);
        for c in &chunks {
            assert!(c.token_estimate <= MIN_CHUNK_TOKENS);
        }
        assert_eq!(concat(&chunks), body);
    }

    #[test]
    fn test_oversized_line_is_own_chunk() {
        let huge = "y".repeat(10_000);
        let body = format!("small\n{huge}\nsmall again\n");
        let chunks = chunk_markdown(&body, MIN_CHUNK_TOKENS);
        assert_eq!(concat(&chunks), body);

        let oversized: Vec<_> = chunks
            .iter()
            .filter(|c| c.token_estimate > MIN_CHUNK_TOKENS)
            .collect();
        assert_eq!(oversized.len(), 1);
        assert_eq!(oversized[0].text, format!("{huge}\n"));
        assert_eq!(oversized[0].start_line, oversized[0].end_line);
    }

    #[test]
    fn test_heading_path_tracking() {
        let filler = "z".repeat(600);
        let body = format!("# Top\n{filler}\n## Sub\n{filler}\n# Next\n{filler}\n");
        let chunks = chunk_markdown(&body, MIN_CHUNK_TOKENS);

        assert_eq!(chunks[0].heading_path, vec!["Top".to_string()]);
        let sub = chunks
            .iter()
            .find(|c| c.text.starts_with("## Sub"))
            .unwrap();
        assert_eq!(
            sub.heading_path,
            vec!["Top".to_string(), "Sub".to_string()]
        );
        let next = chunks
            .iter()
            .find(|c| c.text.starts_with("# Next"))
            .unwrap();
        assert_eq!(next.heading_path, vec!["Next".to_string()]);
    }

    #[test]
    fn test_single_chunk_takes_leading_heading_path() {
        let body = "# A\n## B\n### C\n# D\ntail\n";
        let chunks = chunk_markdown(body, 512);
        // Everything fits in one chunk; its path is the context at the start.
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].heading_path, vec!["A".to_string()]);
    }

    #[test]
    fn test_max_tokens_is_clamped() {
        let line = "w".repeat(2048) + "\n";
        let body = line.repeat(3);
        // Caller asks for an absurdly low budget; clamp keeps 128.
        let low = chunk_markdown(&body, 1);
        assert_eq!(low, chunk_markdown(&body, MIN_CHUNK_TOKENS));
        // And an absurdly high one collapses to the max.
        let high = chunk_markdown(&body, 1_000_000);
        assert_eq!(high, chunk_markdown(&body, MAX_CHUNK_TOKENS));
    }

    #[test]
    fn test_parse_atx_heading() {
        assert_eq!(parse_atx_heading("# Title\n"), Some((1, "Title".into())));
        assert_eq!(parse_atx_heading("### Deep ##\n"), Some((3, "Deep".into())));
        assert_eq!(parse_atx_heading("  ## Indented\n"), Some((2, "Indented".into())));
        assert_eq!(parse_atx_heading("####### Seven\n"), None);
        assert_eq!(parse_atx_heading("#NoSpace\n"), None);
        assert_eq!(parse_atx_heading("plain text\n"), None);
        assert_eq!(parse_atx_heading("##\n"), Some((2, String::new())));
    }
}
