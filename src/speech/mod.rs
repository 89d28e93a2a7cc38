use std::{path::Path, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

pub mod command;
pub mod loopback;

pub use command::{CommandSpeech, CommandSpeechConfig};
pub use loopback::LoopbackSpeech;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {}ms", .after.as_millis())]
    Timeout { program: String, after: Duration },

    #[error("'{program}' failed with status {status}: {detail}")]
    Failed {
        program: String,
        status: String,
        detail: String,
    },

    #[error("invalid speech configuration: {0}")]
    InvalidConfig(String),
}

/// Text to speech. Writes an audio artifact at `output`.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), SpeechError>;
}

/// Speech to text. Returns a lowercase transcript.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<String, SpeechError>;
}

pub(crate) async fn ensure_parent(path: &Path) -> Result<(), SpeechError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

pub(crate) fn normalize_transcript(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
