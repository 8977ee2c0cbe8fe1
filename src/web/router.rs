use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
};

use crate::{
    modules,
    web::{AppState, templates},
};

pub fn build_router(state: AppState) -> Router {
    let upload_max_bytes = state.settings().upload_max_bytes;
    Router::new()
        .route("/", get(index_page))
        .route("/healthz", get(healthz))
        .merge(modules::documents::router(upload_max_bytes))
        .merge(modules::viewer::router())
        .merge(modules::summarizer::router())
        .merge(modules::chat::router())
        .with_state(state)
}

async fn index_page() -> Html<String> {
    Html(templates::render_index_page())
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
