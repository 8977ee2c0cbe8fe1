use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::preprocess::{PreprocessedDocument, ProcessedChunk, SummaryKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    /// Finished, but the document changed meanwhile so the result was not stored.
    Discarded,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Discarded => "discarded",
        }
    }
}

impl Serialize for JobStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Progress and result of one summarization job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub document_id: Uuid,
    pub generation: u64,
    pub status: JobStatus,
    pub status_detail: Option<String>,
    pub error_message: Option<String>,
    pub summary_kind: Option<SummaryKind>,
    pub digest: Option<String>,
    pub chunks: Vec<ProcessedChunk>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn pending(job_id: Uuid, document_id: Uuid, generation: u64) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            document_id,
            generation,
            status: JobStatus::Pending,
            status_detail: None,
            error_message: None,
            summary_kind: None,
            digest: None,
            chunks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// In-memory registry of summarization jobs for the lifetime of the process.
#[derive(Clone, Default)]
pub struct JobBoard {
    jobs: Arc<RwLock<HashMap<Uuid, JobRecord>>>,
}

impl JobBoard {
    pub async fn insert(&self, record: JobRecord) {
        self.jobs.write().await.insert(record.job_id, record);
    }

    pub async fn get(&self, job_id: Uuid) -> Option<JobRecord> {
        self.jobs.read().await.get(&job_id).cloned()
    }

    pub async fn set_status(&self, job_id: Uuid, status: JobStatus, detail: Option<&str>) {
        self.update(job_id, |record| {
            record.status = status;
            record.status_detail = detail.map(str::to_string);
        })
        .await;
    }

    pub async fn fail(&self, job_id: Uuid, error_message: String) {
        self.update(job_id, |record| {
            record.status = JobStatus::Failed;
            record.status_detail = Some("Summarization failed.".to_string());
            record.error_message = Some(error_message);
        })
        .await;
    }

    pub async fn complete(&self, job_id: Uuid, status: JobStatus, document: PreprocessedDocument) {
        self.update(job_id, |record| {
            record.status = status;
            record.status_detail = None;
            record.summary_kind = document.summary_kind;
            record.digest = Some(document.digest());
            record.chunks = document.chunks;
        })
        .await;
    }

    async fn update<F>(&self, job_id: Uuid, apply: F)
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.jobs.write().await;
        if let Some(record) = jobs.get_mut(&job_id) {
            apply(record);
            record.updated_at = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn updates_touch_only_the_target_job() {
        let board = JobBoard::default();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        board.insert(JobRecord::pending(a, Uuid::new_v4(), 1)).await;
        board.insert(JobRecord::pending(b, Uuid::new_v4(), 1)).await;

        board.fail(a, "backend closed the connection".into()).await;

        let failed = board.get(a).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(
            failed.error_message.as_deref(),
            Some("backend closed the connection")
        );
        assert_eq!(board.get(b).await.unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn completion_records_digest_and_kind() {
        let board = JobBoard::default();
        let job = Uuid::new_v4();
        board.insert(JobRecord::pending(job, Uuid::new_v4(), 3)).await;

        let document = PreprocessedDocument {
            chunks: vec![ProcessedChunk {
                chunk_index: 0,
                chunk_text: "text".into(),
                summary: Some("(fallback) all of it".into()),
            }],
            summary_kind: Some(SummaryKind::Fallback),
        };
        board.complete(job, JobStatus::Completed, document).await;

        let record = board.get(job).await.unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.summary_kind, Some(SummaryKind::Fallback));
        assert_eq!(record.digest.as_deref(), Some("• (fallback) all of it"));
        assert_eq!(
            serde_json::to_value(&record).unwrap()["status"],
            serde_json::json!("completed")
        );
    }
}
