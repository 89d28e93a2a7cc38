use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::simulator::ScenarioResult;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub generated_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn from_results(results: &[ScenarioResult]) -> Self {
        Self {
            total: results.len(),
            passed: results.iter().filter(|result| result.scenario_pass).count(),
            generated_at: Utc::now(),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: RunSummary,
    results: &'a [ScenarioResult],
}

fn write_file(path: &Path, contents: &str) -> Result<(), ReportError> {
    let io_error = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
    }
    fs::write(path, contents).map_err(io_error)
}

fn status_icon(pass: bool) -> &'static str {
    if pass {
        "✅"
    } else {
        "❌"
    }
}

pub fn render_markdown(results: &[ScenarioResult]) -> String {
    let mut out = String::new();

    // `write!` into a String cannot fail
    let _ = writeln!(out, "# Hybrid Voice Eval Report\n");
    let _ = writeln!(out, "## Summary\n");
    let _ = writeln!(out, "| Scenario | Result | Steps Passed |");
    let _ = writeln!(out, "|----------|--------|--------------|");
    for result in results {
        let status = if result.scenario_pass { "✅ PASS" } else { "❌ FAIL" };
        let _ = writeln!(
            out,
            "| {} | {} | {}/{} |",
            result.scenario_id, status, result.steps_passed, result.steps_expected
        );
    }
    out.push('\n');

    for result in results {
        let _ = writeln!(out, "## {}: {}\n", result.scenario_id, result.goal);

        for turn in &result.transcript {
            let user_wav = turn.user_wav.display();
            let bot_wav = turn.bot_wav.display();

            let _ = writeln!(out, "### Turn {} {}\n", turn.turn, status_icon(turn.pass));
            let _ = writeln!(out, "**User Text:** {}\n", turn.user_text);
            let _ = writeln!(out, "**User ASR:** {}\n", turn.user_asr);
            let _ = writeln!(out, "**Bot Text:** {}\n", turn.bot_text);
            let _ = writeln!(out, "**Action:** {}\n", turn.action);
            let _ = writeln!(out, "**Audio Files:**");
            let _ = writeln!(out, "- User: [{user_wav}]({user_wav})");
            let _ = writeln!(out, "- Bot: [{bot_wav}]({bot_wav})\n");

            if !turn.expectation.is_empty() {
                let expected = serde_json::to_string(&turn.expectation).unwrap_or_default();
                let _ = writeln!(out, "**Expected:** {expected}\n");
            }

            let _ = writeln!(out, "---\n");
        }
    }

    out
}

pub fn write_markdown_report(results: &[ScenarioResult], path: &Path) -> Result<(), ReportError> {
    write_file(path, &render_markdown(results))
}

pub fn write_json_results(results: &[ScenarioResult], path: &Path) -> Result<(), ReportError> {
    let report = JsonReport {
        summary: RunSummary::from_results(results),
        results,
    };
    write_file(path, &serde_json::to_string_pretty(&report)?)
}
