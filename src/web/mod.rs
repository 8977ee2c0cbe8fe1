pub mod responses;
pub mod router;
pub mod state;
pub mod status;
pub mod templates;
pub mod uploads;

pub use responses::{ApiError, JobSubmission, internal_error, json_error};
pub use state::AppState;
pub use templates::escape_html;
pub use uploads::save_single_file;
