use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures_util::{stream, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    error::SimulationError,
    judge::Judge,
    scenario::{load_scenarios, Expectation, Scenario},
    speech::{Synthesizer, Transcriber},
    tools::{
        Action, ExtractSlotsArgs, Facts, GenerateResponseArgs, PolicyDecisionArgs, Reply,
        ToolRegistry,
    },
};

/// One simulated exchange: scripted user line in, bot reply out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnRecord {
    pub turn: usize,
    pub user_text: String,
    pub user_asr: String,
    pub bot_text: String,
    pub action: Action,
    /// Facts as they stood after this turn.
    pub slots: Facts,
    pub pass: bool,
    pub expectation: Expectation,
    pub user_wav: PathBuf,
    pub bot_wav: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioResult {
    pub scenario_id: String,
    pub goal: String,
    pub scenario_pass: bool,
    pub steps_expected: usize,
    pub steps_passed: usize,
    pub transcript: Vec<TurnRecord>,
}

impl ScenarioResult {
    /// Only turns that carried an expectation count, on either side.
    pub fn from_transcript(scenario: &Scenario, transcript: Vec<TurnRecord>) -> Self {
        let steps_expected = scenario.expected_steps();
        let steps_passed = transcript
            .iter()
            .filter(|record| record.pass && !record.expectation.is_empty())
            .count();

        Self {
            scenario_id: scenario.id.clone(),
            goal: scenario.goal.clone(),
            scenario_pass: steps_passed == steps_expected,
            steps_expected,
            steps_passed,
            transcript,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub audio_dir: PathBuf,
    pub concurrency: usize,
}

impl SimulatorConfig {
    pub fn new(audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            audio_dir: audio_dir.into(),
            concurrency: 1,
        }
    }

    /// Upper bound on scenarios in flight; values below 1 are treated as 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self::new("out/audio")
    }
}

pub struct Simulator {
    synthesizer: Arc<dyn Synthesizer>,
    transcriber: Arc<dyn Transcriber>,
    judge: Arc<dyn Judge>,
    tools: ToolRegistry,
    config: SimulatorConfig,
}

impl Simulator {
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        transcriber: Arc<dyn Transcriber>,
        judge: Arc<dyn Judge>,
        config: SimulatorConfig,
    ) -> Result<Self, SimulationError> {
        Ok(Self {
            synthesizer,
            transcriber,
            judge,
            tools: ToolRegistry::standard()?,
            config,
        })
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    fn audio_path(&self, scenario: &Scenario, speaker: &str, turn: usize) -> PathBuf {
        self.config
            .audio_dir
            .join(&scenario.id)
            .join(format!("{speaker}_{turn}.wav"))
    }

    /// Plays every step of `scenario` in order.
    ///
    /// Tool failures degrade to safe defaults and never end the run; only a
    /// speech backend failure does.
    pub async fn run_scenario(&self, scenario: &Scenario) -> Result<ScenarioResult, SimulationError> {
        let tools = self.tools.clone();
        let mut facts = Facts::new();
        let mut transcript = Vec::with_capacity(scenario.steps.len());

        info!(scenario = %scenario.id, goal = %scenario.goal, judge = self.judge.name(), "running scenario");

        for (index, step) in scenario.steps.iter().enumerate() {
            let turn = index + 1;
            let speech_error = |error| SimulationError::speech(&scenario.id, turn, error);

            let user_text = step.user_text().to_string();
            let user_wav = self.audio_path(scenario, "user", turn);
            self.synthesizer
                .synthesize(&user_text, &user_wav)
                .await
                .map_err(speech_error)?;
            let user_asr = self
                .transcriber
                .transcribe(&user_wav)
                .await
                .map_err(speech_error)?;

            let extracted = tools.extract_slots(&ExtractSlotsArgs {
                user_input: user_asr.clone(),
                current_slots: facts.clone(),
            });
            if !extracted.success {
                warn!(scenario = %scenario.id, turn, error = ?extracted.error, "slot extraction failed");
            }
            facts = extracted.payload;

            let decision = tools.policy_decision(&PolicyDecisionArgs {
                goal: scenario.goal.clone(),
                user_input: user_asr.clone(),
                available_slots: facts.clone(),
            });
            let action = if decision.success {
                decision.payload
            } else {
                warn!(scenario = %scenario.id, turn, error = ?decision.error, "policy decision failed");
                Action::AskClarify
            };

            let generated = tools.generate_response(&GenerateResponseArgs {
                action,
                slots: facts.clone(),
            });
            let reply = if generated.success {
                generated.payload
            } else {
                warn!(scenario = %scenario.id, turn, error = ?generated.error, "response generation failed");
                Reply::apology()
            };

            let bot_wav = self.audio_path(scenario, "bot", turn);
            self.synthesizer
                .synthesize(&reply.utterance, &bot_wav)
                .await
                .map_err(speech_error)?;

            let pass = match step.expectation() {
                Some(expectation) => self.judge.judge(&reply.utterance, expectation).await,
                None => true,
            };

            debug!(scenario = %scenario.id, turn, action = %reply.action, pass, "turn complete");

            transcript.push(TurnRecord {
                turn,
                user_text,
                user_asr,
                bot_text: reply.utterance,
                action: reply.action,
                slots: facts.clone(),
                pass,
                expectation: step.expectation().cloned().unwrap_or_default(),
                user_wav,
                bot_wav,
            });
        }

        let result = ScenarioResult::from_transcript(scenario, transcript);
        info!(
            scenario = %result.scenario_id,
            passed = result.steps_passed,
            expected = result.steps_expected,
            pass = result.scenario_pass,
            "scenario finished"
        );
        Ok(result)
    }

    /// Runs scenarios independently, up to `concurrency` at a time. Results
    /// keep the input order. Ids must be unique within the run.
    pub async fn run_all(&self, scenarios: &[Scenario]) -> Result<Vec<ScenarioResult>, SimulationError> {
        let mut seen = HashSet::new();
        if let Some(duplicate) = scenarios.iter().find(|scenario| !seen.insert(scenario.id.as_str())) {
            return Err(SimulationError::DuplicateScenario(duplicate.id.clone()));
        }

        stream::iter(scenarios.iter().map(|scenario| self.run_scenario(scenario)))
            .buffered(self.config.concurrency.max(1))
            .try_collect()
            .await
    }

    pub async fn run_directory(&self, dir: &Path) -> Result<Vec<ScenarioResult>, SimulationError> {
        let scenarios = load_scenarios(dir)?;
        info!(dir = %dir.display(), count = scenarios.len(), "loaded scenarios");
        self.run_all(&scenarios).await
    }
}
