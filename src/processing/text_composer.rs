//! Composition of record fields into a single embedding input
//!
//! Fields are emitted in a fixed priority order so that when the embedding
//! model truncates long inputs, the least important content is what gets cut.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Alternate labels placed ahead of the description
pub const LEADING_ALT_LABELS: usize = 5;

/// Character budget for the skills part of a taxonomy entry
pub const SKILLS_CHAR_LIMIT: usize = 1500;

/// Skills as they arrive from upstream, resolved once at load time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SkillsField {
    #[default]
    Absent,
    /// A stringified list such as `"['Communication', 'Planning']"`
    Text(String),
    List(Vec<String>),
}

impl SkillsField {
    /// Resolve an arbitrary JSON value into a skills field.
    pub fn from_value(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => SkillsField::Absent,
            Some(Value::String(s)) => SkillsField::Text(s),
            Some(Value::Array(items)) => SkillsField::List(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            Some(other) => SkillsField::Text(other.to_string()),
        }
    }

    /// Text contributed to a composed string, `None` when absent.
    ///
    /// An empty list renders as `""`, which still takes part in the join.
    pub fn render(&self) -> Option<String> {
        match self {
            SkillsField::Absent => None,
            SkillsField::List(items) => Some(items.join(", ")),
            SkillsField::Text(raw) => Some(clean_stringified_list(raw)),
        }
    }
}

/// Strip the outer brackets and every quote character. No further parsing.
pub fn clean_stringified_list(raw: &str) -> String {
    raw.trim_matches(|c| c == '[' || c == ']')
        .replace('\'', "")
        .replace('"', "")
}

/// Split alternate labels on newlines when any are present, otherwise on commas.
pub fn split_alt_labels(raw: &str) -> Vec<String> {
    let separator = if raw.contains('\n') { '\n' } else { ',' };
    raw.split(separator)
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}

/// Truncate to at most `limit` characters, ignoring word boundaries.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Fields of a taxonomy occupation that feed its composed text
#[derive(Debug, Clone, Copy)]
pub struct TaxonomyFields<'a> {
    pub label: Option<&'a str>,
    pub alt_labels: Option<&'a str>,
    pub description: Option<&'a str>,
    pub skills: &'a SkillsField,
}

/// Fields of an extracted occupation that feed its composed text
#[derive(Debug, Clone, Copy)]
pub struct OccupationFields<'a> {
    pub occupation: Option<&'a str>,
    pub activity: Option<&'a str>,
    pub skills: &'a SkillsField,
}

fn present(field: Option<&str>) -> Option<&str> {
    field.filter(|value| !value.is_empty())
}

/// Compose a taxonomy entry: label, first alt labels, description,
/// truncated skills, remaining alt labels.
pub fn compose_taxonomy_text(fields: &TaxonomyFields<'_>) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(label) = present(fields.label) {
        parts.push(label.to_string());
    }

    let alt_labels = present(fields.alt_labels).map(split_alt_labels).unwrap_or_default();
    let split_at = alt_labels.len().min(LEADING_ALT_LABELS);
    let (leading, trailing) = alt_labels.split_at(split_at);

    if !leading.is_empty() {
        parts.push(leading.join(" "));
    }

    if let Some(description) = present(fields.description) {
        parts.push(description.to_string());
    }

    if let Some(skills) = fields.skills.render() {
        parts.push(truncate_chars(&skills, SKILLS_CHAR_LIMIT).to_string());
    }

    if !trailing.is_empty() {
        parts.push(trailing.join(" "));
    }

    parts.join(" ")
}

/// Compose an extracted occupation: label, activity, skills.
pub fn compose_occupation_text(fields: &OccupationFields<'_>) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(occupation) = present(fields.occupation) {
        parts.push(occupation.to_string());
    }
    if let Some(activity) = present(fields.activity) {
        parts.push(activity.to_string());
    }
    if let Some(skills) = fields.skills.render() {
        parts.push(skills);
    }

    parts.join(" ")
}
