//! Turn-based voice agent simulation for acceptance testing.
//!
//! A [`Scenario`] scripts the user side of a conversation. The [`Simulator`]
//! speaks each line, transcribes it back, runs the recovered text through the
//! decision tools in [`tools`] and grades every bot reply with a [`Judge`].

pub mod error;
pub mod judge;
pub mod report;
pub mod scenario;
pub mod simulator;
pub mod speech;
pub mod tools;

pub use error::SimulationError;
pub use judge::{Judge, LlmJudge, LlmJudgeConfig, RuleJudge, Verdict};
pub use report::{write_json_results, write_markdown_report, RunSummary};
pub use scenario::{load_scenario, load_scenarios, Expectation, Scenario, Step};
pub use simulator::{ScenarioResult, Simulator, SimulatorConfig, TurnRecord};
pub use speech::{
    CommandSpeech, CommandSpeechConfig, LoopbackSpeech, SpeechError, Synthesizer, Transcriber,
};
pub use tools::{Action, Facts, ToolCall, ToolName, ToolRegistry, ToolResult};
