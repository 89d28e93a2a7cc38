use std::fmt;

use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;

use super::{Action, Facts, ToolError, CARD_INFO, ORDER_NUMBER};

pub const APOLOGY: &str = "I'm sorry, I encountered an error. Could you please try again?";
pub const UNKNOWN_ACTION_REPLY: &str = "I'm not sure how to help with that.";

const ORDER_PLACEHOLDER: &str = "that order";
const CARD_PLACEHOLDER: &str = "your card";

const STANDARD_TEMPLATES: [(Action, &str); 6] = [
    (
        Action::ConfirmAddressChange,
        "Thank you! I have updated your shipping address for order {{order_number}}. \
         The change has been confirmed.",
    ),
    (
        Action::ConfirmReturn,
        "Thank you! I have initiated the return for order {{order_number}}. \
         I've emailed you a return label and you should receive it shortly.",
    ),
    (
        Action::ProcessRefund,
        "Thank you! I have processed your refund for the duplicate charge ending in {{card_info}}. \
         You should see the credit within 3-5 business days.",
    ),
    (
        Action::AskOrderNumber,
        "I can help you with that. Could you please provide your order number?",
    ),
    (
        Action::AskCardInfo,
        "I can help you with that. Could you please provide the last four digits of your card?",
    ),
    (
        Action::AskClarify,
        "I'm not sure I understand. Could you please clarify what you'd like help with?",
    ),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub action: Action,
    pub utterance: String,
}

impl Reply {
    pub fn new(action: Action, utterance: impl Into<String>) -> Self {
        Self {
            action,
            utterance: utterance.into(),
        }
    }

    pub fn apology() -> Self {
        Self::new(Action::AskClarify, APOLOGY)
    }
}

/// Utterance templates keyed by action token.
///
/// Templates see `order_number` and `card_info` (with spoken placeholders when
/// the fact is unknown) plus the raw fact map under `facts`.
#[derive(Clone)]
pub struct ResponseTemplates {
    registry: Handlebars<'static>,
}

impl fmt::Debug for ResponseTemplates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<&String> = self.registry.get_templates().keys().collect();
        actions.sort();
        f.debug_struct("ResponseTemplates")
            .field("actions", &actions)
            .finish()
    }
}

impl ResponseTemplates {
    pub fn standard() -> Result<Self, ToolError> {
        Self::from_table(STANDARD_TEMPLATES)
    }

    pub fn from_table<I, S>(table: I) -> Result<Self, ToolError>
    where
        I: IntoIterator<Item = (Action, S)>,
        S: AsRef<str>,
    {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        for (action, template) in table {
            registry.register_template_string(action.as_str(), template.as_ref())?;
        }
        Ok(Self { registry })
    }

    pub fn render(&self, action: &Action, facts: &Facts) -> Result<String, ToolError> {
        if !self.registry.has_template(action.as_str()) {
            return Ok(UNKNOWN_ACTION_REPLY.to_string());
        }

        let context = json!({
            "order_number": facts.get(ORDER_NUMBER).map_or(ORDER_PLACEHOLDER, String::as_str),
            "card_info": facts.get(CARD_INFO).map_or(CARD_PLACEHOLDER, String::as_str),
            "facts": facts,
        });

        Ok(self.registry.render(action.as_str(), &context)?)
    }
}
