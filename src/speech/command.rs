use std::{path::Path, process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{ensure_parent, normalize_transcript, SpeechError, Synthesizer, Transcriber};

const MAX_DETAIL_CHARS: usize = 512;

/// External programs used for speech, with `{placeholder}` arguments.
///
/// Synthesis arguments may use `{text}` and `{output}`; transcription
/// arguments may use `{input}` and `{model}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpeechConfig {
    pub tts_program: String,
    pub tts_args: Vec<String>,
    pub asr_program: String,
    pub asr_args: Vec<String>,
    pub model: String,
    pub timeout: Duration,
}

impl CommandSpeechConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            tts_program: "espeak-ng".to_string(),
            tts_args: vec!["-w".into(), "{output}".into(), "{text}".into()],
            asr_program: "whisper-cli".to_string(),
            asr_args: vec![
                "-m".into(),
                "models/ggml-{model}.bin".into(),
                "-nt".into(),
                "-f".into(),
                "{input}".into(),
            ],
            model: model.into(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_tts<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tts_program = program.into();
        self.tts_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_asr<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.asr_program = program.into();
        self.asr_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for CommandSpeechConfig {
    fn default() -> Self {
        Self::new("tiny")
    }
}

/// Speech backed by local command-line TTS and ASR tools.
#[derive(Debug, Clone)]
pub struct CommandSpeech {
    config: CommandSpeechConfig,
}

impl CommandSpeech {
    pub fn new(config: CommandSpeechConfig) -> Result<Self, SpeechError> {
        if config.tts_program.trim().is_empty() || config.asr_program.trim().is_empty() {
            return Err(SpeechError::InvalidConfig(
                "speech programs must not be empty".to_string(),
            ));
        }
        if config.timeout.is_zero() {
            return Err(SpeechError::InvalidConfig(
                "speech timeout must be greater than 0ms".to_string(),
            ));
        }
        Ok(Self { config })
    }

    async fn run(&self, program: &str, args: Vec<String>) -> Result<String, SpeechError> {
        debug!(program, ?args, "running speech command");

        let mut command = Command::new(program);
        command.kill_on_drop(true);
        command.args(&args);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let child = command.spawn().map_err(|source| SpeechError::Spawn {
            program: program.to_string(),
            source,
        })?;

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| SpeechError::Timeout {
                program: program.to_string(),
                after: self.config.timeout,
            })??;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let status = output
                .status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SpeechError::Failed {
                program: program.to_string(),
                status,
                detail: summarize(&stderr, &stdout),
            });
        }

        Ok(stdout)
    }
}

fn substitute(args: &[String], bindings: &[(&str, &str)]) -> Vec<String> {
    args.iter().map(|arg| substitute_one(arg, bindings)).collect()
}

/// Single left-to-right pass; substituted values are never rescanned.
fn substitute_one(arg: &str, bindings: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let bound = tail.find('}').and_then(|end| {
            let key = &tail[..end];
            bindings
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (end, *value))
        });
        match bound {
            Some((end, value)) => {
                out.push_str(value);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

fn summarize(stderr: &str, stdout: &str) -> String {
    let detail = if stderr.trim().is_empty() { stdout } else { stderr };
    let detail = detail.trim();
    if detail.is_empty() {
        return "no output".to_string();
    }
    detail.chars().take(MAX_DETAIL_CHARS).collect()
}

#[async_trait]
impl Synthesizer for CommandSpeech {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), SpeechError> {
        ensure_parent(output).await?;
        let output = output.to_string_lossy();
        let args = substitute(
            &self.config.tts_args,
            &[("text", text), ("output", output.as_ref())],
        );
        self.run(&self.config.tts_program, args).await?;
        Ok(())
    }
}

#[async_trait]
impl Transcriber for CommandSpeech {
    async fn transcribe(&self, audio: &Path) -> Result<String, SpeechError> {
        let input = audio.to_string_lossy();
        let args = substitute(
            &self.config.asr_args,
            &[("input", input.as_ref()), ("model", self.config.model.as_str())],
        );
        let stdout = self.run(&self.config.asr_program, args).await?;
        Ok(normalize_transcript(&stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_substituted() {
        let args = vec!["-m".to_string(), "ggml-{model}.bin".to_string(), "{input}".to_string()];
        let out = substitute(&args, &[("input", "a.wav"), ("model", "tiny")]);
        assert_eq!(out, ["-m", "ggml-tiny.bin", "a.wav"]);
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        let args = vec!["{text}".to_string(), "{output}".to_string(), "{unknown} {{text}}".to_string()];
        let out = substitute(&args, &[("text", "say {output} now"), ("output", "/tmp/a.wav")]);
        assert_eq!(out, ["say {output} now", "/tmp/a.wav", "{unknown} {say {output} now}"]);
    }

    #[test]
    fn rejects_zero_timeout() {
        let config = CommandSpeechConfig::default().with_timeout(Duration::ZERO);
        assert!(matches!(
            CommandSpeech::new(config),
            Err(SpeechError::InvalidConfig(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_shell_backed_speech() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("bot_1.wav");
        let config = CommandSpeechConfig::new("tiny")
            .with_tts("sh", ["-c", "printf '%s' \"$1\" > \"$2\"", "sh", "{text}", "{output}"])
            .with_asr("cat", ["{input}"]);
        let speech = CommandSpeech::new(config).unwrap();

        speech.synthesize("Order 12,345 Please", &wav).await.unwrap();
        assert_eq!(speech.transcribe(&wav).await.unwrap(), "order 12,345 please");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reports_non_zero_exit() {
        let config = CommandSpeechConfig::new("tiny")
            .with_asr("sh", ["-c", "echo 'model not found' >&2; exit 3"]);
        let error = CommandSpeech::new(config)
            .unwrap()
            .transcribe(Path::new("ignored.wav"))
            .await
            .unwrap_err();
        match error {
            SpeechError::Failed { status, detail, .. } => {
                assert_eq!(status, "3");
                assert_eq!(detail, "model not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn times_out_slow_commands() {
        let config = CommandSpeechConfig::new("tiny")
            .with_asr("sleep", ["5"])
            .with_timeout(Duration::from_millis(50));
        let error = CommandSpeech::new(config)
            .unwrap()
            .transcribe(Path::new("ignored.wav"))
            .await
            .unwrap_err();
        assert!(matches!(error, SpeechError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let config = CommandSpeechConfig::new("tiny").with_asr("voxeval-no-such-asr-binary", ["{input}"]);
        let error = CommandSpeech::new(config)
            .unwrap()
            .transcribe(Path::new("ignored.wav"))
            .await
            .unwrap_err();
        assert!(matches!(error, SpeechError::Spawn { .. }));
    }
}
