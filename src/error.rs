use thiserror::Error;

use crate::{scenario::ScenarioError, speech::SpeechError, tools::ToolError};

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error("speech error in scenario {scenario} turn {turn}: {source}")]
    Speech {
        scenario: String,
        turn: usize,
        #[source]
        source: SpeechError,
    },

    #[error("scenario id '{0}' appears more than once in the run")]
    DuplicateScenario(String),

    #[error("tool setup failed: {0}")]
    Tools(#[from] ToolError),
}

impl SimulationError {
    pub(crate) fn speech(scenario: &str, turn: usize, source: SpeechError) -> Self {
        Self::Speech {
            scenario: scenario.to_string(),
            turn,
            source,
        }
    }
}
