use std::path::Path;

use async_trait::async_trait;

use super::{ensure_parent, normalize_transcript, SpeechError, Synthesizer, Transcriber};

/// Lossless stand-in for a real speech channel: the "audio" file holds the
/// text itself and transcription reads it back.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackSpeech;

impl LoopbackSpeech {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Synthesizer for LoopbackSpeech {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), SpeechError> {
        ensure_parent(output).await?;
        tokio::fs::write(output, text.as_bytes()).await?;
        Ok(())
    }
}

#[async_trait]
impl Transcriber for LoopbackSpeech {
    async fn transcribe(&self, audio: &Path) -> Result<String, SpeechError> {
        let text = tokio::fs::read_to_string(audio).await?;
        Ok(normalize_transcript(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("nested").join("user_1.wav");
        let speech = LoopbackSpeech::new();

        speech
            .synthesize("My Card Ending 1234 was charged twice", &wav)
            .await
            .unwrap();
        assert!(wav.exists());

        let text = speech.transcribe(&wav).await.unwrap();
        assert_eq!(text, "my card ending 1234 was charged twice");
    }

    #[tokio::test]
    async fn missing_audio_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let error = LoopbackSpeech::new()
            .transcribe(&dir.path().join("absent.wav"))
            .await
            .unwrap_err();
        assert!(matches!(error, SpeechError::Io(_)));
    }
}
