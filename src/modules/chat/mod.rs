use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use futures::StreamExt;
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    extract::extract_pages,
    llm::{CompletionBackend, LlmError},
    session::OperationKind,
    web::{ApiError, AppState, json_error},
};

pub const BACKEND_UNAVAILABLE_MESSAGE: &str =
    "Ollama is not running. Please start Ollama to use StudyBuddy's AI assistant.";

pub fn router() -> Router<AppState> {
    Router::new().route("/api/chat", post(ask))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    question: String,
}

async fn ask(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "Please enter a question."));
    }

    let llm = state.llm_client();
    if !llm.is_backend_available().await {
        warn!(base_url = %llm.base_url(), "chat refused, backend unavailable");
        return Err(json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            BACKEND_UNAVAILABLE_MESSAGE,
        ));
    }

    // Questions asked before any document is opened share the nil key.
    let resource = state
        .session()
        .current_document()
        .await
        .map(|(_, document)| document.id)
        .unwrap_or_else(Uuid::nil);
    let Some(permit) = state.in_flight().try_acquire(OperationKind::Chat, resource) else {
        return Err(json_error(
            StatusCode::CONFLICT,
            "Still answering the previous question.",
        ));
    };

    let context = state
        .session()
        .chat_context(state.settings().limits.chat_context_chars, extract_pages)
        .await;
    let prompt = state.settings().prompts.render_chat(&context, question);
    info!(
        document_id = %resource,
        context_chars = context.chars().count(),
        "answering chat question"
    );

    let tokens = llm
        .stream_completion(&prompt)
        .await
        .map_err(|err| match err {
            LlmError::Unreachable { .. } => {
                json_error(StatusCode::SERVICE_UNAVAILABLE, BACKEND_UNAVAILABLE_MESSAGE)
            }
            other => {
                error!(err = %other, "chat completion failed to start");
                json_error(StatusCode::BAD_GATEWAY, other.to_string())
            }
        })?;

    // The permit travels with the body so the slot stays busy until streaming ends.
    let body = tokens.map(move |token| {
        let _streaming = &permit;
        if let Err(err) = &token {
            warn!(%err, "chat stream interrupted");
        }
        token
    });

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::test_support::{dead_backend, fake_backend, open_text_document, test_state};
    use axum::{body::to_bytes, http::Request};
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn chat_request(question: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "question": question }).to_string(),
            ))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path(), "http://127.0.0.1:9");
        let response = router()
            .with_state(state)
            .oneshot(chat_request("   "))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unavailable_backend_returns_user_visible_message() {
        let dir = tempdir().unwrap();
        let backend = dead_backend().await;
        let state = test_state(dir.path(), &backend);

        let response = router()
            .with_state(state)
            .oneshot(chat_request("What is mitosis?"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(body_text(response).await.contains("Ollama is not running"));
    }

    #[tokio::test]
    async fn answer_is_streamed_as_plain_text() {
        let dir = tempdir().unwrap();
        let backend = fake_backend(
            "{\"response\":\"Cells \"}\n{\"response\":\"split.\"}\n{\"done\":true}\n",
        )
        .await;
        let state = test_state(dir.path(), &backend);
        let document = open_text_document(&state, "bio.txt", "Cells divide by mitosis.").await;

        let response = router()
            .with_state(state.clone())
            .oneshot(chat_request("What is mitosis?"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "Cells split.");
        assert!(!state.in_flight().is_busy(OperationKind::Chat, document.id));
    }

    #[tokio::test]
    async fn concurrent_question_for_same_document_conflicts() {
        let dir = tempdir().unwrap();
        let backend = fake_backend("{\"response\":\"ok\"}\n").await;
        let state = test_state(dir.path(), &backend);
        let document = open_text_document(&state, "bio.txt", "Cells divide.").await;
        let _streaming = state
            .in_flight()
            .try_acquire(OperationKind::Chat, document.id)
            .unwrap();

        let response = router()
            .with_state(state)
            .oneshot(chat_request("Again?"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
