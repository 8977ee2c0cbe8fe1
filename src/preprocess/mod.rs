//! Document preprocessing: whitespace normalization, paragraph chunking and batched
//! summarization of the leading chunks.

mod chunker;
mod normalize;
mod summarize;

use serde::Serialize;

use crate::llm::{CompletionBackend, LlmError};

pub use chunker::{Chunk, PARAGRAPH_SEPARATOR, chunk_text};
pub use normalize::normalize_pages;
pub use summarize::{BatchSummarizer, SummaryKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessOptions {
    pub summarize: bool,
    pub max_chars: usize,
    pub max_chunks: usize,
}

/// A chunk together with whatever summary the backend produced for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedChunk {
    pub chunk_index: usize,
    pub chunk_text: String,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreprocessedDocument {
    pub chunks: Vec<ProcessedChunk>,
    /// `None` when summarization was not requested.
    pub summary_kind: Option<SummaryKind>,
}

impl PreprocessedDocument {
    /// Bullet list of the available summaries, one blank line apart.
    pub fn digest(&self) -> String {
        self.chunks
            .iter()
            .filter_map(|chunk| chunk.summary.as_deref())
            .filter(|summary| !summary.is_empty())
            .map(|summary| format!("• {summary}"))
            .collect::<Vec<_>>()
            .join(PARAGRAPH_SEPARATOR)
    }
}

/// Normalize and chunk `pages`, keep the first `max_chunks` chunks and, if asked, summarize them.
pub async fn preprocess<B: CompletionBackend>(
    pages: &[String],
    options: PreprocessOptions,
    summarizer: &BatchSummarizer<'_, B>,
) -> Result<PreprocessedDocument, LlmError> {
    let text = normalize_pages(pages);
    let mut chunks = chunk_text(&text, options.max_chars);
    chunks.truncate(options.max_chunks);

    if !options.summarize {
        return Ok(PreprocessedDocument {
            chunks: chunks.into_iter().map(|chunk| join(chunk, None)).collect(),
            summary_kind: None,
        });
    }

    let outcome = summarizer.summarize(&chunks).await?;
    let summary_kind = Some(outcome.kind());
    let chunks = chunks
        .into_iter()
        .zip(outcome.into_results())
        .map(|(chunk, result)| {
            debug_assert_eq!(chunk.index, result.chunk_index);
            join(chunk, result.summary)
        })
        .collect();

    Ok(PreprocessedDocument {
        chunks,
        summary_kind,
    })
}

fn join(chunk: Chunk, summary: Option<String>) -> ProcessedChunk {
    ProcessedChunk {
        chunk_index: chunk.index,
        chunk_text: chunk.text,
        summary,
    }
}
