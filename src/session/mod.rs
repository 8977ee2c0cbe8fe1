mod guard;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::preprocess::{PARAGRAPH_SEPARATOR, PreprocessedDocument, ProcessedChunk, SummaryKind};

pub use guard::{InFlight, InFlightPermit, OperationKind};

/// Context used for chat when neither summaries nor raw text can be produced.
pub const NO_CONTEXT_SENTINEL: &str = "No context available due to an error.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenDocument {
    pub id: Uuid,
    pub display_name: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub opened_at: DateTime<Utc>,
}

impl OpenDocument {
    pub fn new(id: Uuid, display_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            path: path.into(),
            opened_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("result for generation {stale} discarded, session is at generation {current}")]
pub struct StaleResult {
    pub stale: u64,
    pub current: u64,
}

#[derive(Debug, Default)]
struct SessionState {
    generation: u64,
    document: Option<OpenDocument>,
    processed: PreprocessedDocument,
}

/// Point-in-time copy of the session, safe to hand to other tasks.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub document: Option<OpenDocument>,
    pub chunks: Vec<ProcessedChunk>,
    pub summary_kind: Option<SummaryKind>,
}

/// Shared handle to the current document and its processed chunks.
///
/// Each opened document starts a new generation. Workers remember the generation they
/// started under and their results are only stored if it is still current.
#[derive(Clone, Default)]
pub struct Session {
    state: Arc<RwLock<SessionState>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current document, clearing processed chunks. Returns the new generation.
    pub async fn open_document(&self, document: OpenDocument) -> u64 {
        let mut state = self.state.write().await;
        state.generation += 1;
        info!(
            document_id = %document.id,
            generation = state.generation,
            name = %document.display_name,
            "document opened"
        );
        state.document = Some(document);
        state.processed = PreprocessedDocument::default();
        state.generation
    }

    pub async fn current_document(&self) -> Option<(u64, OpenDocument)> {
        let state = self.state.read().await;
        state
            .document
            .clone()
            .map(|document| (state.generation, document))
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        SessionSnapshot {
            generation: state.generation,
            document: state.document.clone(),
            chunks: state.processed.chunks.clone(),
            summary_kind: state.processed.summary_kind,
        }
    }

    /// Store `processed` if `generation` is still current.
    pub async fn commit(
        &self,
        generation: u64,
        processed: PreprocessedDocument,
    ) -> Result<(), StaleResult> {
        let mut state = self.state.write().await;
        if state.generation != generation {
            warn!(
                stale = generation,
                current = state.generation,
                "discarding result for a document that is no longer open"
            );
            return Err(StaleResult {
                stale: generation,
                current: state.generation,
            });
        }
        state.processed = processed;
        Ok(())
    }

    /// Assemble the context block used to answer a chat question.
    ///
    /// Prefers the stored summaries. Without processed chunks it falls back to the first
    /// `limit` characters of the document's raw text, and to [`NO_CONTEXT_SENTINEL`] when
    /// there is no document or extraction fails.
    pub async fn chat_context<E>(&self, limit: usize, extract: E) -> String
    where
        E: FnOnce(&Path) -> Result<Vec<String>> + Send + 'static,
    {
        let (chunks, document) = {
            let state = self.state.read().await;
            (state.processed.chunks.clone(), state.document.clone())
        };

        if !chunks.is_empty() {
            return chunks
                .iter()
                .filter_map(|chunk| chunk.summary.as_deref())
                .filter(|summary| !summary.is_empty())
                .collect::<Vec<_>>()
                .join(PARAGRAPH_SEPARATOR);
        }

        let Some(document) = document else {
            warn!("chat requested without an open document");
            return NO_CONTEXT_SENTINEL.to_string();
        };

        let path = document.path.clone();
        let extracted = tokio::task::spawn_blocking(move || extract(&path))
            .await
            .unwrap_or_else(|err| Err(anyhow::anyhow!(err)));

        match extracted {
            Ok(pages) => pages
                .join(PARAGRAPH_SEPARATOR)
                .chars()
                .take(limit)
                .collect(),
            Err(err) => {
                warn!(?err, document_id = %document.id, "context fallback extraction failed");
                NO_CONTEXT_SENTINEL.to_string()
            }
        }
    }
}
