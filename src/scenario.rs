use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const CONTAINS: &str = "contains";
pub const CONTAINS_ANY: &str = "contains_any";

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("scenario file {0} missing required 'id' field")]
    MissingId(PathBuf),
    #[error("scenario id '{id}' in {second} is already used by {first}")]
    DuplicateId {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },
}

/// A scripted, linear conversation with per-step expectations on the bot reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scenario {
    pub id: String,
    pub goal: String,
    pub steps: Vec<Step>,
    /// Carried through from the file; the simulator does not interpret it.
    pub acceptance: Map<String, Value>,
}

impl Scenario {
    pub fn new(id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            goal: goal.into(),
            steps: Vec::new(),
            acceptance: Map::new(),
        }
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Number of steps whose expectation is present and non-empty.
    pub fn expected_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.expectation().is_some())
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_expect: Option<Expectation>,
}

impl Step {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            user: Some(text.into()),
            bot_expect: None,
        }
    }

    pub fn expecting(mut self, expectation: Expectation) -> Self {
        self.bot_expect = Some(expectation);
        self
    }

    pub fn user_text(&self) -> &str {
        self.user.as_deref().unwrap_or_default()
    }

    /// An empty mapping counts as no expectation at all.
    pub fn expectation(&self) -> Option<&Expectation> {
        self.bot_expect
            .as_ref()
            .filter(|expectation| !expectation.is_empty())
    }
}

/// Acceptance condition on a single bot utterance.
///
/// Kept as a raw mapping so unrecognised shapes survive loading and are
/// judged (and fail) at evaluation time instead of at parse time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expectation(Map<String, Value>);

impl Expectation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(phrase: impl Into<String>) -> Self {
        Self::new().with(CONTAINS, Value::String(phrase.into()))
    }

    pub fn contains_any<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let phrases = phrases
            .into_iter()
            .map(|phrase| Value::String(phrase.into()))
            .collect();
        Self::new().with(CONTAINS_ANY, Value::Array(phrases))
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Expectation {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    goal: Option<String>,
    #[serde(default)]
    steps: Option<Vec<Step>>,
    #[serde(default)]
    acceptance: Option<Map<String, Value>>,
}

/// Parses a scenario document. `path` is only used for error reporting.
pub fn parse_scenario(source: &str, path: &Path) -> Result<Scenario, ScenarioError> {
    let file: ScenarioFile = serde_yaml::from_str(source).map_err(|source| ScenarioError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let id = file
        .id
        .ok_or_else(|| ScenarioError::MissingId(path.to_path_buf()))?;

    Ok(Scenario {
        id,
        goal: file.goal.unwrap_or_default(),
        steps: file.steps.unwrap_or_default(),
        acceptance: file.acceptance.unwrap_or_default(),
    })
}

pub fn load_scenario(path: &Path) -> Result<Scenario, ScenarioError> {
    let source = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_scenario(&source, path)
}

/// Loads every `*.yaml` / `*.yml` file in `dir`, ordered by file name.
pub fn load_scenarios(dir: &Path) -> Result<Vec<Scenario>, ScenarioError> {
    let io_error = |source| ScenarioError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext == "yaml" || ext == "yml");
        if is_yaml && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let scenarios = paths
        .iter()
        .map(|path| load_scenario(path))
        .collect::<Result<Vec<_>, _>>()?;

    // audio artifacts are keyed by id
    let mut seen: HashMap<&str, &Path> = HashMap::new();
    for (scenario, path) in scenarios.iter().zip(&paths) {
        if let Some(first) = seen.insert(scenario.id.as_str(), path.as_path()) {
            return Err(ScenarioError::DuplicateId {
                id: scenario.id.clone(),
                first: first.to_path_buf(),
                second: path.clone(),
            });
        }
    }

    Ok(scenarios)
}
