//! Defensive parsing of model output.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::SelectorError;

/// One entry of the model's answer, as loosely as the model tends to write it.
///
/// A field of an unexpected type reads as absent instead of failing the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawSelection {
    #[serde(default, alias = "company_id", deserialize_with = "lenient_text")]
    pub id: Option<String>,
    #[serde(default, alias = "company", deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, alias = "match_score", deserialize_with = "lenient_score")]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_reasons")]
    pub reasons: Vec<String>,
}

/// A string, or a number rendered as one.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

/// A number, or a string holding one (`"0.9"`, `" 85 "`).
fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|score| score.is_finite()))
}

/// An array of strings, or a single string.
fn lenient_reasons<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) if !text.trim().is_empty() => vec![text],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// Removes a surrounding Markdown code fence (with or without a language tag).
pub fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest
            .strip_prefix("json")
            .or_else(|| rest.strip_prefix("JSON"))
            .unwrap_or(rest);
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// The first balanced `[...]` or `{...}` span. Brackets inside JSON strings are
/// not counted.
pub fn first_balanced_span(text: &str) -> Result<&str, SelectorError> {
    let start = text.find(['[', '{']).ok_or(SelectorError::NoJson)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Ok(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    Err(SelectorError::Unbalanced { start })
}

/// Parses a completion into raw selections.
///
/// Accepts a bare array, an object wrapping one array field (`{"selections": [...]}`),
/// or a single selection object.
pub fn parse_selections(raw: &str) -> Result<Vec<RawSelection>, SelectorError> {
    let span = first_balanced_span(strip_fences(raw))?;
    let value: Value = serde_json::from_str(span)?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => {
            let mut arrays = map.values().filter_map(|v| v.as_array());
            match (arrays.next(), arrays.next()) {
                (Some(only), None) => only.clone(),
                _ => vec![Value::Object(map)],
            }
        }
        other => {
            return Err(SelectorError::InvalidJson(format!(
                "expected array or object, got {other}"
            )));
        }
    };

    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(SelectorError::from))
        .collect()
}
