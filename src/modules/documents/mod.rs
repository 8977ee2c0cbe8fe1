use std::{io::ErrorKind, path::Path};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    extract::SUPPORTED_EXTENSIONS,
    modules::viewer::request_render,
    session::{OpenDocument, SessionSnapshot},
    web::{ApiError, AppState, internal_error, json_error, save_single_file},
};

const UPLOAD_FIELD: &str = "file";

/// `upload_max_bytes` replaces axum's default request body limit on the upload route.
pub fn router(upload_max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/api/documents",
            post(open_document).layer(DefaultBodyLimit::max(upload_max_bytes)),
        )
        .route("/api/session", get(session_snapshot))
}

#[derive(Debug, Serialize)]
struct DocumentOpened {
    document: OpenDocument,
    generation: u64,
}

async fn open_document(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<DocumentOpened>, ApiError> {
    let storage_root = state.settings().storage_root.clone();
    tokio::fs::create_dir_all(&storage_root)
        .await
        .map_err(|err| internal_error("create storage root", err.into()))?;

    let document_id = Uuid::new_v4();
    let document_dir = storage_root.join(document_id.to_string());
    let saved = match save_single_file(multipart, &document_dir, UPLOAD_FIELD, SUPPORTED_EXTENSIONS)
        .await
    {
        Ok(saved) => saved,
        Err(err) => {
            let _ = tokio::fs::remove_dir_all(&document_dir).await;
            return Err(json_error(err.status(), err.message()));
        }
    };
    info!(
        %document_id,
        name = %saved.original_name,
        bytes = saved.file_size,
        "document uploaded"
    );

    let previous = state.session().current_document().await;
    state.cancel_active_summary();

    let document = OpenDocument::new(document_id, saved.original_name, saved.stored_path);
    let generation = state.session().open_document(document.clone()).await;
    state.viewer().write().await.reset_for(document_id);
    request_render(&state, document.clone());

    if let Some((_, old)) = previous {
        remove_document_directory(&storage_root, old.id).await;
    }

    Ok(Json(DocumentOpened {
        document,
        generation,
    }))
}

async fn session_snapshot(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session().snapshot().await)
}

/// Delete a closed document's upload directory. Returns false if it could not be removed.
async fn remove_document_directory(root: &Path, document_id: Uuid) -> bool {
    let path = root.join(document_id.to_string());
    match tokio::fs::remove_dir_all(&path).await {
        Ok(_) => true,
        Err(err) if err.kind() == ErrorKind::NotFound => true,
        Err(err) => {
            warn!(?err, path = %path.display(), "failed to remove document directory");
            false
        }
    }
}
