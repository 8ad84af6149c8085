//! Extraction of JSON payloads from free-form model replies.

use limp_core::AgentError;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::LazyLock;

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fence pattern is valid")
});

/// Locate the JSON object in `text`: a fenced block if present, otherwise
/// the span from the first `{` to the last `}`.
pub fn extract_object(text: &str) -> Result<Value, AgentError> {
    if let Some(caps) = FENCE.captures(text) {
        if let Some(m) = caps.get(1) {
            if let Ok(v) = serde_json::from_str(m.as_str()) {
                return Ok(v);
            }
        }
    }
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e > s => serde_json::from_str(&text[s..=e])
            .map_err(|err| AgentError::MalformedResponse(format!("invalid JSON: {err}"))),
        _ => Err(AgentError::MalformedResponse(format!(
            "no JSON object in reply: {}",
            truncate(text, 80)
        ))),
    }
}

pub fn extract<T: DeserializeOwned>(text: &str) -> Result<T, AgentError> {
    let value = extract_object(text)?;
    serde_json::from_value(value)
        .map_err(|err| AgentError::MalformedResponse(format!("unexpected shape: {err}")))
}

/// Read a chip amount that may come back as a number or as text like
/// `"$12,500"` or `"1.2M"`.
pub fn amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' ' | '€' | '£'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let (digits, multiplier) = match cleaned.chars().last() {
        Some('k') | Some('K') => (&cleaned[..cleaned.len() - 1], 1_000.0),
        Some('m') | Some('M') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };
    digits.parse::<f64>().ok().map(|v| v * multiplier)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_block_is_preferred() {
        let text = "Here you go:\n```json\n{\"pot\": 300}\n```\nok {not json}";
        assert_eq!(extract_object(text).unwrap(), json!({"pot": 300}));
    }

    #[test]
    fn bare_object_is_found() {
        let text = "The answer is {\"community_cards\": 3} as requested.";
        assert_eq!(extract_object(text).unwrap()["community_cards"], 3);
    }

    #[test]
    fn missing_object_is_malformed() {
        assert!(matches!(
            extract_object("no json here"),
            Err(AgentError::MalformedResponse(_))
        ));
    }

    #[test]
    fn amounts_accept_broadcast_formats() {
        assert_eq!(parse_amount("$12,500"), Some(12_500.0));
        assert_eq!(parse_amount("1.2M"), Some(1_200_000.0));
        assert_eq!(parse_amount("850k"), Some(850_000.0));
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(amount(&json!(42)), Some(42.0));
        assert_eq!(amount(&json!(null)), None);
    }
}
