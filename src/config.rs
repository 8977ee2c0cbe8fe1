use std::{env, fmt::Display, path::PathBuf, str::FromStr, sync::LazyLock, time::Duration};

use anyhow::{Result, anyhow};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "mistral";
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_SUMMARY_MAX_CHARS: usize = 750;
const DEFAULT_SUMMARY_MAX_CHUNKS: usize = 3;
const DEFAULT_CHAT_CONTEXT_CHARS: usize = 3000;
const DEFAULT_STORAGE_ROOT: &str = "storage/documents";
const DEFAULT_UPLOAD_MAX_BYTES: usize = 50 * 1024 * 1024;

/// Placeholder replaced by the user's question in the chat template.
pub const QUESTION_PLACEHOLDER: &str = "{{QUESTION}}";
/// Placeholder replaced by the assembled document context in the chat template.
pub const CONTEXT_PLACEHOLDER: &str = "{{CONTEXT}}";

static CHAT_SLOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(CONTEXT|QUESTION)\}\}").unwrap());

/// Runtime settings resolved once at startup.
#[derive(Clone, Debug)]
pub struct Settings {
    pub port: u16,
    pub backend: BackendSettings,
    pub limits: PipelineLimits,
    pub storage_root: PathBuf,
    /// Largest accepted document upload, in bytes.
    pub upload_max_bytes: usize,
    pub prompts: Prompts,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendSettings {
    pub base_url: String,
    pub model: String,
    pub probe_timeout: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineLimits {
    pub summary_max_chars: usize,
    pub summary_max_chunks: usize,
    pub chat_context_chars: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Prompts {
    pub batch_summary: String,
    pub chat: String,
}

impl Default for Prompts {
    fn default() -> Self {
        default_prompts()
    }
}

impl Prompts {
    /// Fill both slots in one pass; substituted text is never scanned for placeholders again.
    pub fn render_chat(&self, context: &str, question: &str) -> String {
        CHAT_SLOT
            .replace_all(&self.chat, |caps: &Captures| match &caps[0] {
                CONTEXT_PLACEHOLDER => context,
                _ => question,
            })
            .into_owned()
    }
}

impl Settings {
    /// Build settings from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup, falling back to defaults for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let base_url = lookup("OLLAMA_BASE_URL")
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_OLLAMA_BASE_URL.to_string());
        let model = lookup("OLLAMA_MODEL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string());
        let probe_timeout_secs =
            parse_or(&lookup, "OLLAMA_PROBE_TIMEOUT_SECS", DEFAULT_PROBE_TIMEOUT_SECS)?;

        let limits = PipelineLimits {
            summary_max_chars: parse_positive(&lookup, "SUMMARY_MAX_CHARS", DEFAULT_SUMMARY_MAX_CHARS)?,
            summary_max_chunks: parse_positive(
                &lookup,
                "SUMMARY_MAX_CHUNKS",
                DEFAULT_SUMMARY_MAX_CHUNKS,
            )?,
            chat_context_chars: parse_positive(
                &lookup,
                "CHAT_CONTEXT_CHARS",
                DEFAULT_CHAT_CONTEXT_CHARS,
            )?,
        };

        let storage_root = lookup("STORAGE_ROOT")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT));
        let upload_max_bytes =
            parse_positive(&lookup, "UPLOAD_MAX_BYTES", DEFAULT_UPLOAD_MAX_BYTES)?;

        Ok(Self {
            port,
            backend: BackendSettings {
                base_url,
                model,
                probe_timeout: Duration::from_secs(probe_timeout_secs),
            },
            limits,
            storage_root,
            upload_max_bytes,
            prompts: Prompts::default(),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|err| anyhow!("invalid value for {key} ({raw:?}): {err}")),
        _ => Ok(default),
    }
}

fn parse_positive<F>(lookup: &F, key: &str, default: usize) -> Result<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, key, default)?;
    if value == 0 {
        return Err(anyhow!("{key} must be greater than zero"));
    }
    Ok(value)
}

fn default_prompts() -> Prompts {
    Prompts {
        batch_summary: "Summarize each section below in 1-2 sentences. Return your answers numbered, one per section:".to_string(),
        chat: format!(
            "Answer this question using the following context:\n\n{CONTEXT_PLACEHOLDER}\n\nQuestion: {QUESTION_PLACEHOLDER}"
        ),
    }
}
