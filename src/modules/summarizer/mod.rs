use anyhow::{Context, Result, bail};
use axum::{
    Json, Router,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    routing::{get, post},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    extract::extract_pages,
    preprocess::{BatchSummarizer, PreprocessOptions, preprocess},
    session::{InFlightPermit, OpenDocument, OperationKind},
    tasks::{TaskHandle, TaskOutcome, spawn_task},
    web::{
        ApiError, AppState, JobSubmission, json_error,
        status::{JobBoard, JobRecord, JobStatus},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/summarize", post(start_summary))
        .route("/api/summarize/jobs/:id", get(job_status))
}

async fn start_summary(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<JobSubmission>), ApiError> {
    let Some((generation, document)) = state.session().current_document().await else {
        return Err(json_error(
            StatusCode::BAD_REQUEST,
            "Open a document before asking for a summary.",
        ));
    };
    let Some(permit) = state
        .in_flight()
        .try_acquire(OperationKind::Summarize, document.id)
    else {
        return Err(json_error(
            StatusCode::CONFLICT,
            "A summary for this document is already being generated.",
        ));
    };

    let job_id = Uuid::new_v4();
    state
        .jobs()
        .insert(JobRecord::pending(job_id, document.id, generation))
        .await;
    info!(%job_id, document_id = %document.id, generation, "summary job queued");

    let handle = spawn_task(
        "summarize",
        run_summary(state.clone(), job_id, generation, document, permit),
    );
    state.track_summary(handle.abort_handle());
    tokio::spawn(record_outcome(state.jobs().clone(), job_id, handle));

    Ok((
        StatusCode::ACCEPTED,
        Json(JobSubmission::new(
            job_id,
            format!("/api/summarize/jobs/{job_id}"),
        )),
    ))
}

async fn job_status(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<Uuid>,
) -> Result<Json<JobRecord>, ApiError> {
    state
        .jobs()
        .get(job_id)
        .await
        .map(Json)
        .ok_or_else(|| json_error(StatusCode::NOT_FOUND, "Job not found."))
}

async fn run_summary(
    state: AppState,
    job_id: Uuid,
    generation: u64,
    document: OpenDocument,
    _permit: InFlightPermit,
) -> Result<JobStatus> {
    let jobs = state.jobs();
    jobs.set_status(job_id, JobStatus::Processing, Some("Extracting text."))
        .await;

    let path = document.path.clone();
    let pages = tokio::task::spawn_blocking(move || extract_pages(&path))
        .await
        .context("text extraction task failed")??;
    if pages.iter().all(|page| page.trim().is_empty()) {
        bail!("No extractable text found in {}", document.display_name);
    }

    jobs.set_status(job_id, JobStatus::Processing, Some("Summarizing sections."))
        .await;
    let settings = state.settings();
    let options = PreprocessOptions {
        summarize: true,
        max_chars: settings.limits.summary_max_chars,
        max_chunks: settings.limits.summary_max_chunks,
    };
    let backend = state.llm_client();
    let summarizer = BatchSummarizer::new(&backend, &settings.prompts.batch_summary);
    let processed = preprocess(&pages, options, &summarizer)
        .await
        .context("summarization request failed")?;
    info!(
        %job_id,
        chunks = processed.chunks.len(),
        kind = ?processed.summary_kind,
        "document summarized"
    );

    let status = match state.session().commit(generation, processed.clone()).await {
        Ok(()) => JobStatus::Completed,
        Err(stale) => {
            warn!(%job_id, %stale, "summary finished after the document changed");
            JobStatus::Discarded
        }
    };
    jobs.complete(job_id, status, processed).await;
    Ok(status)
}

async fn record_outcome(jobs: JobBoard, job_id: Uuid, handle: TaskHandle<JobStatus>) {
    match handle.outcome().await {
        TaskOutcome::Completed(status) => {
            info!(%job_id, status = status.as_str(), "summary job finished");
        }
        TaskOutcome::Failed(message) => jobs.fail(job_id, message).await,
        TaskOutcome::Cancelled => {
            jobs.set_status(
                job_id,
                JobStatus::Cancelled,
                Some("Cancelled because another document was opened."),
            )
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::test_support::{
        dead_backend, fake_backend, open_text_document, test_state, wait_until,
    };
    use crate::preprocess::SummaryKind;
    use axum::{body::Body, http::Request};
    use tempfile::tempdir;
    use tower::ServiceExt;

    const TWO_SECTION_TEXT: &str = "Cells divide by mitosis.\u{c}Meiosis produces gametes.";

    fn post_summarize() -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/summarize")
            .body(Body::empty())
            .unwrap()
    }

    async fn wait_for_status(state: &AppState, job_id: Uuid, status: JobStatus) -> JobRecord {
        let jobs = state.jobs().clone();
        wait_until(|| {
            let jobs = jobs.clone();
            async move { jobs.get(job_id).await.map(|r| r.status) == Some(status) }
        })
        .await;
        state.jobs().get(job_id).await.unwrap()
    }

    #[tokio::test]
    async fn summary_is_stored_in_the_session() {
        let dir = tempdir().unwrap();
        let backend =
            fake_backend("{\"response\":\"1. Mitosis.\"}\n{\"response\":\"\\n2. Meiosis.\"}\n").await;
        let state = test_state(dir.path(), &backend);
        let document = open_text_document(&state, "bio.txt", TWO_SECTION_TEXT).await;
        let permit = state
            .in_flight()
            .try_acquire(OperationKind::Summarize, document.id)
            .unwrap();

        let job_id = Uuid::new_v4();
        state.jobs().insert(JobRecord::pending(job_id, document.id, 1)).await;
        let status = run_summary(state.clone(), job_id, 1, document, permit)
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Completed);

        let record = state.jobs().get(job_id).await.unwrap();
        assert_eq!(record.summary_kind, Some(SummaryKind::Parsed));
        assert_eq!(record.digest.as_deref(), Some("• Mitosis.\n\n• Meiosis."));
        let snapshot = state.session().snapshot().await;
        assert_eq!(snapshot.chunks.len(), 2);
        assert_eq!(snapshot.chunks[1].summary.as_deref(), Some("Meiosis."));
    }

    #[tokio::test]
    async fn result_for_a_replaced_document_is_discarded() {
        let dir = tempdir().unwrap();
        let backend = fake_backend("{\"response\":\"Cells do things.\"}\n").await;
        let state = test_state(dir.path(), &backend);
        let first = open_text_document(&state, "a.txt", TWO_SECTION_TEXT).await;
        let permit = state
            .in_flight()
            .try_acquire(OperationKind::Summarize, first.id)
            .unwrap();
        open_text_document(&state, "b.txt", "Another document.").await;

        let job_id = Uuid::new_v4();
        state.jobs().insert(JobRecord::pending(job_id, first.id, 1)).await;
        let status = run_summary(state.clone(), job_id, 1, first, permit)
            .await
            .unwrap();

        assert_eq!(status, JobStatus::Discarded);
        assert!(state.session().snapshot().await.chunks.is_empty());
        let record = state.jobs().get(job_id).await.unwrap();
        assert_eq!(record.summary_kind, Some(SummaryKind::Fallback));
    }

    #[tokio::test]
    async fn second_request_conflicts_while_first_runs() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path(), "http://127.0.0.1:9");
        let document = open_text_document(&state, "a.txt", TWO_SECTION_TEXT).await;
        let _running = state
            .in_flight()
            .try_acquire(OperationKind::Summarize, document.id)
            .unwrap();

        let response = router()
            .with_state(state)
            .oneshot(post_summarize())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn request_without_document_is_rejected() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path(), "http://127.0.0.1:9");
        let response = router()
            .with_state(state)
            .oneshot(post_summarize())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unreachable_backend_fails_the_job() {
        let dir = tempdir().unwrap();
        let backend = dead_backend().await;
        let state = test_state(dir.path(), &backend);
        let document = open_text_document(&state, "a.txt", TWO_SECTION_TEXT).await;

        let response = router()
            .with_state(state.clone())
            .oneshot(post_summarize())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let submission: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let job_id: Uuid = submission["job_id"].as_str().unwrap().parse().unwrap();

        let record = wait_for_status(&state, job_id, JobStatus::Failed).await;
        assert!(record.error_message.unwrap().contains("summarization request failed"));
        wait_until(|| async {
            !state
                .in_flight()
                .is_busy(OperationKind::Summarize, document.id)
        })
        .await;
    }

    #[tokio::test]
    async fn empty_document_fails_with_a_clear_message() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path(), "http://127.0.0.1:9");
        let document = open_text_document(&state, "blank.txt", "  \n\n ").await;
        let permit = state
            .in_flight()
            .try_acquire(OperationKind::Summarize, document.id)
            .unwrap();

        let err = run_summary(state.clone(), Uuid::new_v4(), 1, document, permit)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No extractable text found"));
    }
}
