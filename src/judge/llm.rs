use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::{rules::check_expectation, Judge};
use crate::scenario::Expectation;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2";

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model service not ready (status {0})")]
    NotReady(StatusCode),

    #[error("could not find a verdict in model output: {0}")]
    NoVerdict(String),
}

/// Connection settings for an Ollama-compatible generation service.
#[derive(Debug, Clone)]
pub struct LlmJudgeConfig {
    pub base_url: String,
    pub model: String,
    pub debug: bool,
    pub probe_timeout: Duration,
    pub request_timeout: Duration,
}

impl LlmJudgeConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            debug: false,
            probe_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Reads `OLLAMA_BASE_URL`, `OLLAMA_MODEL` and `DEBUG_LLM_EVALUATION`.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let debug = std::env::var("DEBUG_LLM_EVALUATION")
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self::new(base_url, model).with_debug(debug)
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for LlmJudgeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_MODEL)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Verdict {
    pub pass: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequestBody<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'static str,
    options: SamplingOptions,
}

#[derive(Debug, Serialize)]
struct SamplingOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponseBody {
    #[serde(default)]
    response: String,
}

/// Model-backed judge that silently degrades to the rule judge.
#[derive(Debug, Clone)]
pub struct LlmJudge {
    client: Client,
    config: LlmJudgeConfig,
}

impl LlmJudge {
    pub fn new(config: LlmJudgeConfig) -> Result<Self, JudgeError> {
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LlmJudgeConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn probe(&self) -> Result<(), JudgeError> {
        let response = self
            .client
            .get(self.endpoint("api/tags"))
            .timeout(self.config.probe_timeout)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(JudgeError::NotReady(status)),
        }
    }

    async fn generate(&self, prompt: String) -> Result<String, JudgeError> {
        let body = GenerateRequestBody {
            model: &self.config.model,
            prompt,
            stream: false,
            format: "json",
            options: SamplingOptions {
                temperature: 0.0,
                top_p: 0.0,
            },
        };

        let response = self
            .client
            .post(self.endpoint("api/generate"))
            .timeout(self.config.request_timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: GenerateResponseBody = response.json().await?;
        Ok(parsed.response.trim().to_string())
    }

    /// Asks the model for a verdict without any fallback.
    pub async fn evaluate(
        &self,
        utterance: &str,
        expectation: &Expectation,
    ) -> Result<Verdict, JudgeError> {
        self.probe().await?;
        let output = self.generate(build_prompt(utterance, expectation)).await?;
        parse_verdict(&output).ok_or(JudgeError::NoVerdict(output))
    }
}

#[async_trait]
impl Judge for LlmJudge {
    async fn judge(&self, utterance: &str, expectation: &Expectation) -> bool {
        if expectation.is_empty() {
            return true;
        }

        match self.evaluate(utterance, expectation).await {
            Ok(verdict) => {
                if self.config.debug {
                    info!(
                        pass = verdict.pass,
                        reason = verdict.reason.as_deref().unwrap_or("N/A"),
                        "model evaluation"
                    );
                }
                verdict.pass
            }
            Err(error) => {
                warn!(%error, "model evaluation failed, falling back to rule-based judge");
                let pass = check_expectation(utterance, expectation);
                if self.config.debug {
                    info!(pass, "fallback evaluation");
                }
                pass
            }
        }
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

pub fn build_prompt(utterance: &str, expectation: &Expectation) -> String {
    let expectation = serde_json::to_string_pretty(expectation.as_map())
        .unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are grading one reply from a customer-service voice bot.

BOT REPLY: "{utterance}"
EXPECTATION: {expectation}

Grading rules:
- "contains": the reply passes if the phrase occurs anywhere in it, ignoring case.
- "contains_any": the reply passes if at least one listed phrase occurs anywhere in it, ignoring case.
- If "contains" is present, judge by it alone.
- Compare text only; do not reward paraphrases.

Examples:
- ["order number"] vs "Could you provide your order number?" -> pass
- ["initiated the return"] vs "I have initiated the return for that order" -> pass
- ["refund processed"] vs "Your refund has been processed" -> fail

Answer with a single JSON object and nothing else:
{{"pass": true or false, "reason": "one short sentence"}}"#
    )
}

/// Pulls a verdict out of free-form model output.
///
/// Tries the span from the first `{` to the last `}` as JSON, then a plain
/// text search for a `"pass"` literal. `None` means no verdict was found.
pub fn parse_verdict(output: &str) -> Option<Verdict> {
    if let Some(span) = json_span(output) {
        if let Ok(verdict) = serde_json::from_str::<Verdict>(span) {
            return Some(verdict);
        }
    }

    let lowered = output.to_lowercase();
    let textual = |pass: bool| Verdict {
        pass,
        reason: Some("Extracted from response text".to_string()),
    };
    if lowered.contains("\"pass\": true") || lowered.contains("\"pass\":true") {
        Some(textual(true))
    } else if lowered.contains("\"pass\": false") || lowered.contains("\"pass\":false") {
        Some(textual(false))
    } else {
        None
    }
}

fn json_span(output: &str) -> Option<&str> {
    let start = output.find('{')?;
    let end = output.rfind('}')?;
    (end > start).then(|| &output[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_json() {
        let verdict = parse_verdict(r#"{"pass": true, "reason": "mentions refund"}"#).unwrap();
        assert!(verdict.pass);
        assert_eq!(verdict.reason.as_deref(), Some("mentions refund"));
    }

    #[test]
    fn parses_json_wrapped_in_prose() {
        let verdict =
            parse_verdict("Sure! Here is my grading:\n{\"pass\": false}\nHope that helps.").unwrap();
        assert!(!verdict.pass);
        assert_eq!(verdict.reason, None);
    }

    #[test]
    fn falls_back_to_textual_match() {
        // trailing garbage breaks the JSON span
        let verdict = parse_verdict(r#"{"pass":true, "reason": "ok"} and {oops}"#).unwrap();
        assert!(verdict.pass);
        assert_eq!(verdict.reason.as_deref(), Some("Extracted from response text"));

        let verdict = parse_verdict(r#"result "PASS": FALSE because"#).unwrap();
        assert!(!verdict.pass);
    }

    #[test]
    fn missing_verdict_is_none() {
        assert_eq!(parse_verdict("I think it is fine."), None);
        assert_eq!(parse_verdict(r#"{"reason": "no pass field"}"#), None);
        assert_eq!(parse_verdict(r#"{"pass": "yes"}"#), None);
        assert_eq!(parse_verdict("} backwards {"), None);
        assert_eq!(parse_verdict(""), None);
    }

    #[test]
    fn prompt_embeds_inputs() {
        let prompt = build_prompt("Could you share your order number?", &Expectation::contains("order number"));
        assert!(prompt.contains("BOT REPLY: \"Could you share your order number?\""));
        assert!(prompt.contains("\"contains\": \"order number\""));
        assert!(prompt.contains("{\"pass\": true or false"));
    }

    #[test]
    fn config_defaults() {
        let config = LlmJudgeConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.model, "llama3.2");
        assert!(!config.debug);
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn empty_expectation_skips_the_service() {
        let judge = LlmJudge::new(LlmJudgeConfig::new("http://127.0.0.1:9", "unused")).unwrap();
        assert!(judge.judge("anything", &Expectation::new()).await);
    }
}
