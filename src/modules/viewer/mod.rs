use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    extract::extract_pages,
    session::{InFlightPermit, OpenDocument, OperationKind},
    tasks::{TaskOutcome, spawn_task},
    web::{AppState, escape_html},
};

pub const DEFAULT_ZOOM: f32 = 1.0;
pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 3.0;
const ZOOM_STEP: f32 = 0.1;

/// What the document pane currently shows.
#[derive(Debug, Clone)]
pub struct ViewerState {
    pub zoom: f32,
    pub document_id: Option<Uuid>,
    /// Zoom level the current `pages` were rendered at.
    pub rendered_zoom: Option<f32>,
    pub pages: Vec<String>,
    pub error: Option<String>,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self {
            zoom: DEFAULT_ZOOM,
            document_id: None,
            rendered_zoom: None,
            pages: Vec::new(),
            error: None,
        }
    }
}

impl ViewerState {
    /// Forget the previous document's pages, keeping the zoom level.
    pub fn reset_for(&mut self, document_id: Uuid) {
        self.document_id = Some(document_id);
        self.rendered_zoom = None;
        self.pages.clear();
        self.error = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoomDirection {
    In,
    Out,
}

/// Move `current` one step in `direction`, clamped to the supported range.
pub fn step_zoom(current: f32, direction: ZoomDirection) -> f32 {
    let delta = match direction {
        ZoomDirection::In => ZOOM_STEP,
        ZoomDirection::Out => -ZOOM_STEP,
    };
    let next = (current + delta).clamp(MIN_ZOOM, MAX_ZOOM);
    (next * 10.0).round() / 10.0
}

/// HTML fragment for one page of extracted text.
pub fn render_page(text: &str, zoom: f32) -> String {
    let percent = (zoom * 100.0).round() as u32;
    let body = escape_html(text.trim()).replace('\n', "<br>");
    format!(r#"<article class="page" style="font-size: {percent}%">{body}</article>"#)
}

/// Render `document` in the background unless a render for it is already running.
pub fn request_render(state: &AppState, document: OpenDocument) {
    let Some(permit) = state
        .in_flight()
        .try_acquire(OperationKind::Render, document.id)
    else {
        debug!(document_id = %document.id, "render already in flight, request dropped");
        return;
    };

    let document_id = document.id;
    let handle = spawn_task("render", render_document(state.clone(), document, permit));

    let viewer = state.viewer().clone();
    tokio::spawn(async move {
        if let TaskOutcome::Failed(message) = handle.outcome().await {
            warn!(%document_id, %message, "render failed");
            let mut viewer = viewer.write().await;
            if viewer.document_id == Some(document_id) {
                viewer.error = Some(message);
            }
        }
    });
}

async fn render_document(
    state: AppState,
    document: OpenDocument,
    _permit: InFlightPermit,
) -> anyhow::Result<()> {
    let zoom = state.viewer().read().await.zoom;
    let path = document.path.clone();
    let pages = tokio::task::spawn_blocking(move || extract_pages(&path))
        .await
        .context("page extraction task failed")??;
    let fragments: Vec<String> = pages.iter().map(|page| render_page(page, zoom)).collect();

    let current = state
        .session()
        .current_document()
        .await
        .map(|(_, open)| open.id);
    if current != Some(document.id) {
        info!(document_id = %document.id, "discarding render of a document that is no longer open");
        return Ok(());
    }

    let mut viewer = state.viewer().write().await;
    viewer.document_id = Some(document.id);
    viewer.rendered_zoom = Some(zoom);
    viewer.pages = fragments;
    viewer.error = None;
    info!(document_id = %document.id, pages = viewer.pages.len(), zoom, "document rendered");
    Ok(())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/viewer", get(viewer_status))
        .route("/api/viewer/zoom", post(change_zoom))
}

#[derive(Debug, Serialize)]
struct ViewerResponse {
    zoom: f32,
    rendered_zoom: Option<f32>,
    rendering: bool,
    document_id: Option<Uuid>,
    pages: Vec<String>,
    error: Option<String>,
}

async fn viewer_status(State(state): State<AppState>) -> Json<ViewerResponse> {
    Json(viewer_response(&state).await)
}

#[derive(Debug, Deserialize)]
struct ZoomRequest {
    direction: ZoomDirection,
}

async fn change_zoom(
    State(state): State<AppState>,
    Json(request): Json<ZoomRequest>,
) -> Json<ViewerResponse> {
    let zoom = {
        let mut viewer = state.viewer().write().await;
        viewer.zoom = step_zoom(viewer.zoom, request.direction);
        viewer.zoom
    };
    debug!(zoom, "zoom changed");

    if let Some((_, document)) = state.session().current_document().await {
        request_render(&state, document);
    }

    Json(viewer_response(&state).await)
}

async fn viewer_response(state: &AppState) -> ViewerResponse {
    let viewer = state.viewer().read().await.clone();
    let rendering = viewer
        .document_id
        .is_some_and(|id| state.in_flight().is_busy(OperationKind::Render, id));
    ViewerResponse {
        zoom: viewer.zoom,
        rendered_zoom: viewer.rendered_zoom,
        rendering,
        document_id: viewer.document_id,
        pages: viewer.pages,
        error: viewer.error,
    }
}
