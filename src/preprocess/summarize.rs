use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use super::chunker::{Chunk, PARAGRAPH_SEPARATOR};
use crate::llm::{CompletionBackend, LlmError, collect_tokens};

/// Prefix marking a summary that is the whole, undivided backend response.
pub const FALLBACK_MARKER: &str = "(fallback)";

static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(\d+)[.)]\s*(.+)$").unwrap());

/// Whether a batch was decomposed per section or degraded to one shared summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    Parsed,
    Fallback,
}

/// Result of parsing one batch response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// At least one numbered line matched; one slot per chunk, `None` where nothing matched.
    Parsed(Vec<Option<String>>),
    /// Nothing matched; the trimmed response applies to every chunk.
    FallbackWhole { response: String, chunk_count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryResult {
    pub chunk_index: usize,
    pub summary: Option<String>,
}

impl SummaryOutcome {
    pub fn kind(&self) -> SummaryKind {
        match self {
            SummaryOutcome::Parsed(_) => SummaryKind::Parsed,
            SummaryOutcome::FallbackWhole { .. } => SummaryKind::Fallback,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SummaryOutcome::Parsed(slots) => slots.len(),
            SummaryOutcome::FallbackWhole { chunk_count, .. } => *chunk_count,
        }
    }

    pub fn summary_for(&self, index: usize) -> Option<String> {
        match self {
            SummaryOutcome::Parsed(slots) => slots.get(index).cloned().flatten(),
            SummaryOutcome::FallbackWhole {
                response,
                chunk_count,
            } => (index < *chunk_count).then(|| format!("{FALLBACK_MARKER} {response}")),
        }
    }

    pub fn into_results(self) -> Vec<SummaryResult> {
        (0..self.len())
            .map(|chunk_index| SummaryResult {
                chunk_index,
                summary: self.summary_for(chunk_index),
            })
            .collect()
    }
}

/// Build the single prompt that asks for one numbered summary line per section.
pub fn build_batch_prompt(instruction: &str, chunks: &[Chunk]) -> String {
    let sections = chunks
        .iter()
        .enumerate()
        .map(|(position, chunk)| format!("[Section {}]\n{}", position + 1, chunk.text))
        .collect::<Vec<_>>()
        .join(PARAGRAPH_SEPARATOR);

    format!("{}\n\n{}", instruction.trim_end(), sections)
}

/// Split a numbered-list response back into per-section summaries.
///
/// Numbers are 1-based; numbers outside `1..=expected` are ignored and repeated numbers
/// overwrite earlier ones.
pub fn parse_numbered_summaries(response: &str, expected: usize) -> SummaryOutcome {
    let response = response.trim();
    let mut slots: Vec<Option<String>> = vec![None; expected];
    let mut matched = false;

    for captures in NUMBERED_LINE.captures_iter(response) {
        matched = true;
        let Ok(number) = captures[1].parse::<usize>() else {
            continue;
        };
        if number == 0 || number > expected {
            continue;
        }
        let summary = captures[2].trim();
        slots[number - 1] = (!summary.is_empty()).then(|| summary.to_string());
    }

    if matched {
        SummaryOutcome::Parsed(slots)
    } else {
        SummaryOutcome::FallbackWhole {
            response: response.to_string(),
            chunk_count: expected,
        }
    }
}

/// Summarizes a batch of chunks with a single streamed completion.
pub struct BatchSummarizer<'a, B> {
    backend: &'a B,
    instruction: &'a str,
}

impl<'a, B: CompletionBackend> BatchSummarizer<'a, B> {
    pub fn new(backend: &'a B, instruction: &'a str) -> Self {
        Self {
            backend,
            instruction,
        }
    }

    pub async fn summarize(&self, chunks: &[Chunk]) -> Result<SummaryOutcome, LlmError> {
        if chunks.is_empty() {
            return Ok(SummaryOutcome::Parsed(Vec::new()));
        }

        let prompt = build_batch_prompt(self.instruction, chunks);
        let tokens = self.backend.stream_completion(&prompt).await?;
        let response = collect_tokens(tokens).await?;

        let outcome = parse_numbered_summaries(&response, chunks.len());
        match outcome.kind() {
            SummaryKind::Parsed => info!(sections = chunks.len(), "batch summary parsed"),
            SummaryKind::Fallback => warn!(
                sections = chunks.len(),
                "batch summary had no numbered lines, using whole response"
            ),
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                index,
                text: text.to_string(),
            })
            .collect()
    }

    fn summaries(outcome: &SummaryOutcome) -> Vec<Option<String>> {
        (0..outcome.len()).map(|i| outcome.summary_for(i)).collect()
    }

    #[test]
    fn full_parse_fills_every_slot() {
        let outcome = parse_numbered_summaries("1. A\n2. B\n3. C", 3);
        assert_eq!(outcome.kind(), SummaryKind::Parsed);
        assert_eq!(
            summaries(&outcome),
            vec![Some("A".into()), Some("B".into()), Some("C".into())]
        );
    }

    #[test]
    fn partial_parse_leaves_gaps_empty() {
        let outcome = parse_numbered_summaries("2. B", 3);
        assert_eq!(outcome, SummaryOutcome::Parsed(vec![None, Some("B".into()), None]));
    }

    #[test]
    fn prose_falls_back_to_every_slot() {
        let outcome = parse_numbered_summaries("just some prose", 3);
        assert_eq!(outcome.kind(), SummaryKind::Fallback);
        let expected = Some("(fallback) just some prose".to_string());
        assert_eq!(summaries(&outcome), vec![expected.clone(), expected.clone(), expected]);
    }

    #[test]
    fn accepts_parenthesis_indentation_and_surrounding_prose() {
        let response = "Here are the summaries:\n  1) First part.\n\t2.Second part.  \nThanks!";
        let outcome = parse_numbered_summaries(response, 2);
        assert_eq!(
            summaries(&outcome),
            vec![Some("First part.".into()), Some("Second part.".into())]
        );
    }

    #[test]
    fn out_of_range_ignored_and_duplicates_last_write_wins() {
        let outcome = parse_numbered_summaries("0. zero\n1. first\n4. four\n1. again", 2);
        assert_eq!(outcome, SummaryOutcome::Parsed(vec![Some("again".into()), None]));
    }

    #[test]
    fn only_out_of_range_matches_do_not_trigger_fallback() {
        let outcome = parse_numbered_summaries("7. seven", 2);
        assert_eq!(outcome, SummaryOutcome::Parsed(vec![None, None]));
    }

    #[test]
    fn results_keep_chunk_order() {
        let results = parse_numbered_summaries("2. B\n1. A", 2).into_results();
        assert_eq!(results[0].chunk_index, 0);
        assert_eq!(results[0].summary.as_deref(), Some("A"));
        assert_eq!(results[1].chunk_index, 1);
        assert_eq!(results[1].summary.as_deref(), Some("B"));
    }

    #[test]
    fn prompt_labels_each_section() {
        let prompt = build_batch_prompt("Summarize:", &chunks(&["alpha", "beta"]));
        assert_eq!(prompt, "Summarize:\n\n[Section 1]\nalpha\n\n[Section 2]\nbeta");
    }

    #[tokio::test]
    async fn summarize_drives_the_backend_once() {
        let backend = ScriptedBackend::new(&["1. Al", "pha\n", "2. Be", "ta"]);
        let summarizer = BatchSummarizer::new(&backend, "Summarize:");

        let outcome = summarizer.summarize(&chunks(&["a", "b"])).await.unwrap();

        assert_eq!(
            summaries(&outcome),
            vec![Some("Alpha".into()), Some("Beta".into())]
        );
        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("[Section 2]\nb"));
    }

    #[tokio::test]
    async fn summarize_skips_backend_for_empty_batch() {
        let backend = ScriptedBackend::new(&["1. x"]);
        let outcome = BatchSummarizer::new(&backend, "Summarize:")
            .summarize(&[])
            .await
            .unwrap();
        assert_eq!(outcome.len(), 0);
        assert!(backend.prompts().is_empty());
    }
}
