use async_trait::async_trait;

use crate::scenario::Expectation;

pub mod llm;
pub mod rules;

pub use llm::{parse_verdict, JudgeError, LlmJudge, LlmJudgeConfig, Verdict};
pub use rules::{check_expectation, RuleJudge};

/// Decides whether a bot utterance satisfies a step's expectation.
///
/// Implementations never fail: any internal problem must resolve to a verdict.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, utterance: &str, expectation: &Expectation) -> bool;

    fn name(&self) -> &'static str;
}
