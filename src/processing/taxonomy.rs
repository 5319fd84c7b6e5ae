//! ESCO taxonomy preparation
//!
//! Flattens the raw occupation and skill-relation tables into one row per
//! occupation and persists the snapshot that matching reads. Row order of the
//! snapshot is the row order of the embedding matrix built from it.

use crate::error::{Pad2EscoError, Result};
use crate::input::esco_tables::{
    read_occupations, read_skill_relations, RawOccupation, SkillRelation, OCCUPATIONS_FILE,
    SKILL_RELATIONS_FILE,
};
use crate::output::atomic::write_atomically;
use crate::processing::text_composer::{compose_taxonomy_text, SkillsField, TaxonomyFields};
use log::info;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub const TAXONOMY_COLUMNS: [&str; 5] = ["id", "uri", "label", "description", "composed_text"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    pub id: String,
    pub uri: String,
    pub label: String,
    pub description: Option<String>,
    pub composed_text: String,
}

/// Prepared taxonomy in snapshot order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxonomyTable {
    pub entries: Vec<TaxonomyEntry>,
}

/// Final path segment of a concept URI
pub fn id_from_uri(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

impl TaxonomyTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TaxonomyEntry> {
        self.entries.get(index)
    }

    pub fn composed_texts(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.composed_text.clone()).collect()
    }

    /// SHA-256 over the composed-text column, in row order.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in &self.entries {
            hasher.update(entry.composed_text.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// Load a prepared snapshot.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Pad2EscoError::MissingInput(format!(
                "Taxonomy CSV not found: {}. Run `pad2esco prepare` first to prepare ESCO data",
                path.display()
            )));
        }

        let mut reader = csv::Reader::from_path(path)?;
        let mut entries = Vec::new();
        for record in reader.deserialize() {
            entries.push(record?);
        }
        info!("Loaded {} taxonomy entries from {}", entries.len(), path.display());
        Ok(Self { entries })
    }

    /// Replace the snapshot at `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomically(path, |file| {
            let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
            writer.write_record(TAXONOMY_COLUMNS)?;
            for entry in &self.entries {
                writer.serialize(entry)?;
            }
            writer.flush()?;
            Ok(())
        })?;
        info!("Saved {} taxonomy entries to {}", self.entries.len(), path.display());
        Ok(())
    }
}

/// Flatten raw tables into one entry per occupation URI.
///
/// Scalar fields come from the first row seen for a URI; skill labels of the
/// essential skill/competence relations are collected in relation order.
/// Every occupation carries a skills list, empty when nothing was retained.
pub fn build_taxonomy(occupations: &[RawOccupation], relations: &[SkillRelation]) -> TaxonomyTable {
    let retained: Vec<&SkillRelation> = relations.iter().filter(|r| r.is_essential_competence()).collect();
    info!(
        "Filtered to {} essential skill/competence relations (from {} total)",
        retained.len(),
        relations.len()
    );

    let mut skills_by_uri: HashMap<&str, Vec<String>> = HashMap::new();
    for relation in retained {
        let skills = skills_by_uri.entry(relation.occupation_uri.as_str()).or_default();
        if let Some(label) = &relation.skill_label {
            skills.push(label.clone());
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut entries = Vec::with_capacity(occupations.len());

    for occupation in occupations {
        let uri = occupation.concept_uri.as_str();
        if !seen.insert(uri) {
            continue;
        }

        let skills = SkillsField::List(skills_by_uri.get(uri).cloned().unwrap_or_default());

        let composed_text = compose_taxonomy_text(&TaxonomyFields {
            label: occupation.preferred_label.as_deref(),
            alt_labels: occupation.alt_labels.as_deref(),
            description: occupation.description.as_deref(),
            skills: &skills,
        });

        entries.push(TaxonomyEntry {
            id: id_from_uri(uri).to_string(),
            uri: uri.to_string(),
            label: occupation.preferred_label.clone().unwrap_or_default(),
            description: occupation.description.clone(),
            composed_text,
        });
    }

    info!("Flattened to {} unique occupations", entries.len());
    TaxonomyTable { entries }
}

/// Read both raw tables from `esco_dir`, flatten them and persist the
/// snapshot to `output_csv`. Nothing is written unless both tables load.
pub fn prepare_taxonomy(esco_dir: &Path, output_csv: &Path) -> Result<TaxonomyTable> {
    let occupations_path = esco_dir.join(OCCUPATIONS_FILE);
    let relations_path = esco_dir.join(SKILL_RELATIONS_FILE);

    let occupations = read_occupations(&occupations_path)?;
    let relations = read_skill_relations(&relations_path)?;

    let table = build_taxonomy(&occupations, &relations);
    table.save(output_csv)?;
    Ok(table)
}
