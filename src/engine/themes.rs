//! Decoding and normalising theme output produced by the language model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// A cross-document theme with the documents that support it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeRecord {
    /// Short theme title.
    pub theme: String,
    /// One or two sentence summary.
    pub summary: String,
    /// Sorted, de-duplicated source keys drawn from the analysed documents.
    pub supporting_docs: Vec<String>,
}

/// Model output that could not be decoded into themes.
#[derive(Debug, Error)]
#[error("Could not parse themes from model output: {reason}")]
pub struct ThemeParseError {
    reason: String,
}

#[derive(Debug, Deserialize)]
struct RawTheme {
    #[serde(default)]
    theme: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    supporting_docs: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ThemeEnvelope {
    themes: Vec<RawTheme>,
}

/// Decode a structured (schema-validated) response.
pub(crate) fn parse_structured(
    output: &str,
    known_keys: &HashSet<&str>,
) -> Result<Vec<ThemeRecord>, ThemeParseError> {
    let envelope: ThemeEnvelope =
        serde_json::from_str(strip_code_fence(output)).map_err(|error| ThemeParseError {
            reason: error.to_string(),
        })?;
    Ok(normalize(envelope.themes, known_keys))
}

/// Best-effort decode of free-form output.
///
/// Accepts the first JSON array of theme objects or `{"themes": [...]}` object found anywhere
/// in the text.
pub(crate) fn parse_free_form(
    output: &str,
    known_keys: &HashSet<&str>,
) -> Result<Vec<ThemeRecord>, ThemeParseError> {
    let text = strip_code_fence(output);
    for (start, _) in text.match_indices(['[', '{']) {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        let Some(Ok(value)) = values.next() else {
            continue;
        };
        if let Some(themes) = themes_from_value(value) {
            return Ok(normalize(themes, known_keys));
        }
    }
    Err(ThemeParseError {
        reason: "no theme list found".into(),
    })
}

fn themes_from_value(value: Value) -> Option<Vec<RawTheme>> {
    match value {
        Value::Array(_) => serde_json::from_value::<Vec<RawTheme>>(value).ok(),
        Value::Object(ref map) if map.contains_key("themes") => {
            serde_json::from_value::<ThemeEnvelope>(value)
                .ok()
                .map(|envelope| envelope.themes)
        }
        _ => None,
    }
}

fn normalize(themes: Vec<RawTheme>, known_keys: &HashSet<&str>) -> Vec<ThemeRecord> {
    themes
        .into_iter()
        .filter_map(|raw| {
            let theme = raw.theme.trim().to_string();
            if theme.is_empty() {
                return None;
            }
            let supporting_docs: BTreeSet<String> = raw
                .supporting_docs
                .iter()
                .filter_map(Value::as_str)
                .map(|doc| doc.trim().trim_start_matches("source:").trim())
                .filter(|doc| known_keys.contains(doc))
                .map(str::to_string)
                .collect();
            Some(ThemeRecord {
                theme,
                summary: raw.summary.trim().to_string(),
                supporting_docs: supporting_docs.into_iter().collect(),
            })
        })
        .collect()
}

fn strip_code_fence(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
