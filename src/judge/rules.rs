use async_trait::async_trait;
use serde_json::Value;

use super::Judge;
use crate::scenario::{Expectation, CONTAINS, CONTAINS_ANY};

/// Case-insensitive substring rules.
///
/// `contains` is checked before `contains_any`, so when both keys are present
/// only `contains` decides. An expectation with neither key fails.
pub fn check_expectation(utterance: &str, expectation: &Expectation) -> bool {
    if expectation.is_empty() {
        return true;
    }

    let utterance = utterance.to_lowercase();
    let mentions = |phrase: &str| utterance.contains(&phrase.to_lowercase());

    if let Some(phrase) = expectation.get(CONTAINS) {
        return phrase.as_str().map_or(false, mentions);
    }

    if let Some(phrases) = expectation.get(CONTAINS_ANY) {
        return match phrases {
            Value::Array(phrases) => phrases.iter().filter_map(Value::as_str).any(mentions),
            _ => false,
        };
    }

    false
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleJudge;

impl RuleJudge {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Judge for RuleJudge {
    async fn judge(&self, utterance: &str, expectation: &Expectation) -> bool {
        check_expectation(utterance, expectation)
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}
