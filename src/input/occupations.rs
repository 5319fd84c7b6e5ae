//! Loader for the per-section occupation extraction files

use crate::error::{Pad2EscoError, Result};
use crate::processing::text_composer::{compose_occupation_text, OccupationFields, SkillsField};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

const OCCUPATIONS_SUFFIX: &str = "_occupations.json";

/// One occupation mention extracted from a PAD section.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedOccupation {
    pub project_id: String,
    pub section_id: String,
    /// Zero-padded position in load order, unique within a project
    pub record_id: String,
    pub occupation_label: Option<String>,
    pub activity_description: Option<String>,
    pub skills_needed: SkillsField,
    pub source_quote: Option<String>,
    pub composed_text: String,
}

#[derive(Debug, Deserialize)]
struct ExtractionFile {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    section_id: Option<Value>,
    #[serde(default)]
    extractions: Option<Vec<RawExtraction>>,
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    identified_occupation: Option<String>,
    #[serde(default, alias = "activity_description_in_pad")]
    activity_description: Option<String>,
    #[serde(default, alias = "skills_needed_for_activity")]
    skills_needed: Option<Value>,
    #[serde(default)]
    source_material_quote: Option<String>,
}

/// Format a load-order index the way record ids are written everywhere
pub fn format_record_id(index: usize) -> String {
    format!("{:03}", index)
}

/// Extraction files for `project_id`, sorted by file name.
pub fn project_files(dir: &Path, project_id: &str) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let prefix = format!("{}_", project_id);
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if name.starts_with(&prefix) && name.ends_with(OCCUPATIONS_SUFFIX) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// `{project}_{section}_occupations.json` → section id
fn section_from_file_name(path: &Path, project_id: &str) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix(project_id))
        .and_then(|n| n.strip_prefix('_'))
        .and_then(|n| n.strip_suffix(OCCUPATIONS_SUFFIX))
        .unwrap_or_default()
        .to_string()
}

fn value_to_id(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Load every extraction recorded for a project, assigning record ids in
/// file-then-array order. Files whose `extractions` is missing or null are
/// skipped.
pub fn load_project_occupations(dir: &Path, project_id: &str) -> Result<Vec<ExtractedOccupation>> {
    let files = project_files(dir, project_id)?;
    if files.is_empty() {
        return Err(Pad2EscoError::MissingInput(format!(
            "No occupation JSON files found for project {} in {}",
            project_id,
            dir.display()
        )));
    }

    let mut occupations = Vec::new();
    for path in &files {
        let content = std::fs::read_to_string(path)?;
        let file: ExtractionFile = serde_json::from_str(&content)?;

        let extractions = match file.extractions {
            Some(extractions) => extractions,
            None => {
                warn!("No extractions in {}; skipping", path.display());
                continue;
            }
        };

        let file_project = file.project_id.unwrap_or_else(|| project_id.to_string());
        let section_id = file
            .section_id
            .filter(|v| !v.is_null())
            .map(value_to_id)
            .unwrap_or_else(|| section_from_file_name(path, project_id));
        debug!("{}: {} extractions", path.display(), extractions.len());

        for raw in extractions {
            let skills_needed = SkillsField::from_value(raw.skills_needed);
            let composed_text = compose_occupation_text(&OccupationFields {
                occupation: raw.identified_occupation.as_deref(),
                activity: raw.activity_description.as_deref(),
                skills: &skills_needed,
            });

            occupations.push(ExtractedOccupation {
                project_id: file_project.clone(),
                section_id: section_id.clone(),
                record_id: format_record_id(occupations.len()),
                occupation_label: raw.identified_occupation,
                activity_description: raw.activity_description,
                skills_needed,
                source_quote: raw.source_material_quote,
                composed_text,
            });
        }
    }

    if occupations.is_empty() {
        return Err(Pad2EscoError::MissingInput(format!(
            "No occupation extractions recorded for project {} in {}",
            project_id,
            dir.display()
        )));
    }

    info!(
        "Loaded {} occupation extractions for project {} from {} files",
        occupations.len(),
        project_id,
        files.len()
    );
    Ok(occupations)
}
