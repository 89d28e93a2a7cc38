use std::fmt;

use schemars::{gen::SchemaGenerator, schema::Schema, JsonSchema};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{Facts, CARD_INFO, ORDER_NUMBER};

pub const GOAL_CHANGE_ADDRESS: &str = "Change shipping address";
pub const GOAL_RETURN_ITEM: &str = "Return a damaged item";
pub const GOAL_DUPLICATE_REFUND: &str = "Request refund for duplicate charge";

/// Next bot move. Tokens outside the known vocabulary are kept verbatim in
/// `Unknown` so they can still be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    ConfirmAddressChange,
    AskOrderNumber,
    ConfirmReturn,
    ProcessRefund,
    AskCardInfo,
    AskClarify,
    Unknown(String),
}

impl Action {
    pub const KNOWN: [Action; 6] = [
        Action::ConfirmAddressChange,
        Action::AskOrderNumber,
        Action::ConfirmReturn,
        Action::ProcessRefund,
        Action::AskCardInfo,
        Action::AskClarify,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Action::ConfirmAddressChange => "CONFIRM_ADDRESS_CHANGE",
            Action::AskOrderNumber => "ASK_ORDER_NUMBER",
            Action::ConfirmReturn => "CONFIRM_RETURN",
            Action::ProcessRefund => "PROCESS_REFUND",
            Action::AskCardInfo => "ASK_CARD_INFO",
            Action::AskClarify => "ASK_CLARIFY",
            Action::Unknown(token) => token,
        }
    }

    pub fn from_token(token: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|action| action.as_str() == token)
            .unwrap_or_else(|| Action::Unknown(token.to_string()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Action {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        Ok(Action::from_token(&token))
    }
}

impl JsonSchema for Action {
    fn schema_name() -> String {
        "Action".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        String::json_schema(gen)
    }
}

struct GoalRule {
    goal: &'static str,
    requires: &'static str,
    satisfied: Action,
    missing: Action,
}

const GOAL_RULES: [GoalRule; 3] = [
    GoalRule {
        goal: GOAL_CHANGE_ADDRESS,
        requires: ORDER_NUMBER,
        satisfied: Action::ConfirmAddressChange,
        missing: Action::AskOrderNumber,
    },
    GoalRule {
        goal: GOAL_RETURN_ITEM,
        requires: ORDER_NUMBER,
        satisfied: Action::ConfirmReturn,
        missing: Action::AskOrderNumber,
    },
    GoalRule {
        goal: GOAL_DUPLICATE_REFUND,
        requires: CARD_INFO,
        satisfied: Action::ProcessRefund,
        missing: Action::AskCardInfo,
    },
];

/// Goals match exactly; anything unrecognised asks the user to clarify.
pub fn decide(goal: &str, facts: &Facts) -> Action {
    match GOAL_RULES.iter().find(|rule| rule.goal == goal) {
        Some(rule) if facts.contains_key(rule.requires) => rule.satisfied.clone(),
        Some(rule) => rule.missing.clone(),
        None => Action::AskClarify,
    }
}
