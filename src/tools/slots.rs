use once_cell::sync::Lazy;
use regex::Regex;

use super::{Facts, ToolError, CARD_INFO, ORDER_NUMBER};

// Most specific first; the first pattern that matches wins.
const ORDER_PATTERNS: [&str; 6] = [
    r"order\s+(\d+(?:,\d{3})*-\d+)",        // order 123-456, order 12,345-7
    r"order\s+(\d{1,3}(?:,\d{3})+)\b",      // order 12,345
    r"order\s+(\d+)",                       // order 12345
    r"order\s+#\s*(\d+)",                   // order #12345
    r"order\s+number\s+is\s+(\d+)",         // order number is 12345
    r"my\s+order\s+number\s+is\s+(\d+)",
];

const CARD_PATTERNS: [&str; 2] = [
    r"card\s+ending\s+(\d{1,3}(?:,\d{3})+)\b", // card ending 1,234
    r"card\s+ending\s+(\d{4})",                // card ending 1234
];

static ORDER_MATCHERS: Lazy<Result<Vec<Regex>, regex::Error>> =
    Lazy::new(|| compile(&ORDER_PATTERNS));
static CARD_MATCHERS: Lazy<Result<Vec<Regex>, regex::Error>> =
    Lazy::new(|| compile(&CARD_PATTERNS));

fn compile(patterns: &[&str]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|pattern| Regex::new(pattern)).collect()
}

fn matchers(cell: &'static Lazy<Result<Vec<Regex>, regex::Error>>) -> Result<&'static [Regex], ToolError> {
    match Lazy::force(cell) {
        Ok(matchers) => Ok(matchers.as_slice()),
        Err(error) => Err(ToolError::Pattern(error.clone())),
    }
}

fn first_capture(matchers: &[Regex], text: &str) -> Option<String> {
    matchers.iter().find_map(|matcher| {
        matcher
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|digits| digits.as_str().replace(',', ""))
    })
}

/// Merges facts recognised in `user_input` into a copy of `current`.
///
/// A slot is only touched when its keyword ("order", "card ending") appears
/// in this turn's text; otherwise the previous value is kept.
pub fn extract_slots(user_input: &str, current: &Facts) -> Result<Facts, ToolError> {
    let text = user_input.to_lowercase();
    let mut facts = current.clone();

    if text.contains("order") {
        if let Some(number) = first_capture(matchers(&ORDER_MATCHERS)?, &text) {
            facts.insert(ORDER_NUMBER.to_string(), number);
        }
    }

    if text.contains("card ending") {
        if let Some(digits) = first_capture(matchers(&CARD_MATCHERS)?, &text) {
            facts.insert(CARD_INFO.to_string(), digits);
        }
    }

    Ok(facts)
}
