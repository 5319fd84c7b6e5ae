//! Readers for the raw ESCO occupation and skill-relation tables

use crate::error::{Pad2EscoError, Result};
use log::info;
use serde::Deserialize;
use std::path::Path;

pub const OCCUPATIONS_FILE: &str = "occupations_en.csv";
pub const SKILL_RELATIONS_FILE: &str = "occupationSkillRelations_en.csv";

/// One row of the ESCO occupations table. Empty cells read as `None`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawOccupation {
    #[serde(rename = "conceptUri")]
    pub concept_uri: String,
    #[serde(rename = "preferredLabel", default)]
    pub preferred_label: Option<String>,
    #[serde(rename = "altLabels", default)]
    pub alt_labels: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Link between an occupation and a skill.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SkillRelation {
    #[serde(rename = "occupationUri")]
    pub occupation_uri: String,
    #[serde(rename = "skillLabel", default)]
    pub skill_label: Option<String>,
    #[serde(rename = "relationType", default)]
    pub relation_type: Option<String>,
    #[serde(rename = "skillType", default)]
    pub skill_type: Option<String>,
}

impl SkillRelation {
    /// Only essential skill/competence relations feed the composed text
    pub fn is_essential_competence(&self) -> bool {
        self.relation_type.as_deref() == Some("essential")
            && self.skill_type.as_deref() == Some("skill/competence")
    }
}

fn require(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        return Err(Pad2EscoError::MissingInput(format!(
            "ESCO {} file not found: {}",
            what,
            path.display()
        )));
    }
    Ok(())
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

pub fn read_occupations(path: &Path) -> Result<Vec<RawOccupation>> {
    require(path, "occupations")?;
    let rows: Vec<RawOccupation> = read_rows(path)?;
    info!("Loaded {} ESCO occupations from {}", rows.len(), path.display());
    Ok(rows)
}

pub fn read_skill_relations(path: &Path) -> Result<Vec<SkillRelation>> {
    require(path, "skill relations")?;
    let rows: Vec<SkillRelation> = read_rows(path)?;
    info!("Loaded {} skill relations from {}", rows.len(), path.display());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_occupations_ignores_extra_columns() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(OCCUPATIONS_FILE);
        std::fs::write(
            &path,
            "conceptType,conceptUri,iscoGroup,preferredLabel,altLabels,description\n\
             Occupation,http://data.europa.eu/esco/occupation/abc,2512,Software developer,\"coder\nprogrammer\",Writes code\n\
             Occupation,http://data.europa.eu/esco/occupation/def,2341,Teacher,,\n",
        )
        .unwrap();

        let rows = read_occupations(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].alt_labels.as_deref(), Some("coder\nprogrammer"));
        assert_eq!(rows[1].preferred_label.as_deref(), Some("Teacher"));
        assert!(rows[1].alt_labels.is_none());
        assert!(rows[1].description.is_none());
    }

    #[test]
    fn test_missing_table_is_missing_input() {
        let temp_dir = TempDir::new().unwrap();
        let result = read_skill_relations(&temp_dir.path().join(SKILL_RELATIONS_FILE));
        assert!(matches!(result, Err(Pad2EscoError::MissingInput(_))));
    }

    #[test]
    fn test_essential_competence_filter() {
        let relation = |relation_type: &str, skill_type: &str| SkillRelation {
            occupation_uri: "u".to_string(),
            skill_label: Some("s".to_string()),
            relation_type: Some(relation_type.to_string()),
            skill_type: Some(skill_type.to_string()),
        };

        assert!(relation("essential", "skill/competence").is_essential_competence());
        assert!(!relation("optional", "skill/competence").is_essential_competence());
        assert!(!relation("essential", "knowledge").is_essential_competence());
    }
}
