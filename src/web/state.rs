use std::sync::{Arc, Mutex};

use tokio::{sync::RwLock, task::AbortHandle};
use tracing::info;

use crate::{
    config::Settings,
    llm::OllamaClient,
    modules::viewer::ViewerState,
    session::{InFlight, Session},
    web::status::JobBoard,
};

#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    llm: OllamaClient,
    session: Session,
    in_flight: InFlight,
    jobs: JobBoard,
    viewer: Arc<RwLock<ViewerState>>,
    summary_task: Arc<Mutex<Option<AbortHandle>>>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let llm = OllamaClient::new(&settings.backend);
        Self {
            settings: Arc::new(settings),
            llm,
            session: Session::new(),
            in_flight: InFlight::new(),
            jobs: JobBoard::default(),
            viewer: Arc::new(RwLock::new(ViewerState::default())),
            summary_task: Arc::new(Mutex::new(None)),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn llm_client(&self) -> OllamaClient {
        self.llm.clone()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    pub fn jobs(&self) -> &JobBoard {
        &self.jobs
    }

    pub fn viewer(&self) -> &Arc<RwLock<ViewerState>> {
        &self.viewer
    }

    /// Remember the running summarization so a newly opened document can cancel it.
    pub fn track_summary(&self, handle: AbortHandle) {
        let mut slot = self
            .summary_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(handle);
    }

    pub fn cancel_active_summary(&self) {
        let previous = self
            .summary_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = previous {
            if !handle.is_finished() {
                info!("cancelling summarization of the previous document");
                handle.abort();
            }
        }
    }
}
