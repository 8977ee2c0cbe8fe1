mod config;
mod extract;
mod llm;
mod modules;
mod preprocess;
mod session;
mod tasks;
mod web;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::{config::Settings, web::AppState};

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_tracing();

    if let Err(err) = app_main().await {
        error!(?err, "application error");
        std::process::exit(1);
    }
}

async fn app_main() -> Result<()> {
    let settings = Settings::from_env().context("invalid configuration")?;
    tokio::fs::create_dir_all(&settings.storage_root)
        .await
        .with_context(|| {
            format!(
                "failed to create storage root at {}",
                settings.storage_root.display()
            )
        })?;

    let port = settings.port;
    let state = AppState::new(settings);

    let llm = state.llm_client();
    if llm.is_backend_available().await {
        info!(base_url = %llm.base_url(), model = %llm.model(), "completion backend reachable");
    } else {
        warn!(
            base_url = %llm.base_url(),
            "completion backend not reachable; chat will be refused until it starts"
        );
    }

    let app = web::router::build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!(%addr, "listening");

    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
