use std::path::{Path, PathBuf};

use axum::{
    extract::{Multipart, multipart::MultipartError},
    http::StatusCode,
};
use tokio::{fs::File, io::AsyncWriteExt};

/// Result type used by the upload helpers.
pub type UploadResult<T> = Result<T, UploadError>;

/// Error returned when validating or persisting an uploaded file.
#[derive(Debug)]
pub struct UploadError {
    status: StatusCode,
    message: String,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Keeps the status axum assigns, so an oversized body stays a 413.
    fn from_multipart(context: &str, err: MultipartError) -> Self {
        Self {
            status: err.status(),
            message: format!("{context}: {}", err.body_text()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UploadError {}

/// Metadata describing a stored upload on disk.
#[derive(Debug, Clone)]
pub struct SavedFile {
    pub original_name: String,
    pub stored_path: PathBuf,
    pub file_size: u64,
}

/// Persist the first file found in `field_name` into `dest_dir`.
///
/// Other fields are ignored. The caller owns `dest_dir` and removes it on error.
pub async fn save_single_file(
    mut multipart: Multipart,
    dest_dir: &Path,
    field_name: &str,
    allowed_extensions: &[&str],
) -> UploadResult<SavedFile> {
    tokio::fs::create_dir_all(dest_dir)
        .await
        .map_err(|err| UploadError::new(format!("Unable to create upload directory: {err}")))?;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| UploadError::from_multipart("Failed to parse upload form", err))?
    {
        if field.name() != Some(field_name) {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        let extension = extension_of(&file_name);
        if !allowed_extensions.contains(&extension.as_str()) {
            return Err(UploadError::new(format!(
                "Unsupported file type `{extension}`; expected one of: {}",
                allowed_extensions.join(", ")
            )));
        }

        let stored_path = dest_dir.join(stored_name(&file_name, &extension));
        let mut file = File::create(&stored_path)
            .await
            .map_err(|err| UploadError::new(format!("Failed to save file: {err}")))?;

        let mut total_bytes: u64 = 0;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|err| UploadError::from_multipart("Failed to read upload data", err))?
        {
            total_bytes += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|err| UploadError::new(format!("Failed to write file: {err}")))?;
        }
        file.flush()
            .await
            .map_err(|err| UploadError::new(format!("Failed to flush file: {err}")))?;

        if total_bytes == 0 {
            return Err(UploadError::new("The uploaded file is empty."));
        }

        return Ok(SavedFile {
            original_name: file_name,
            stored_path,
            file_size: total_bytes,
        });
    }

    Err(UploadError::new(format!(
        "No file was provided in field `{field_name}`."
    )))
}

fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

fn stored_name(original: &str, extension: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(original);
    let sanitized = sanitize_filename::sanitize(base);
    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        format!("document.{extension}")
    } else {
        sanitized.to_string()
    }
}
