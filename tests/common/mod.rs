//! Shared fixtures for integration tests

#![allow(dead_code)]

use pad2esco::config::Config;
use pad2esco::processing::embeddings::TextEmbedder;
use pad2esco::Result;
use serde_json::Value;
use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

const DIMENSIONS: usize = 512;

/// Deterministic bag-of-words embedder. The framing prefix (everything up to
/// the first ": ") is ignored so queries and passages share one space.
pub struct BagOfWordsEmbedder {
    model_id: String,
    pub calls: Cell<usize>,
}

impl BagOfWordsEmbedder {
    pub fn new() -> Self {
        Self::named("bag-of-words")
    }

    pub fn named(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            calls: Cell::new(0),
        }
    }
}

impl TextEmbedder for BagOfWordsEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.set(self.calls.get() + 1);
        Ok(texts
            .iter()
            .map(|text| {
                let body = text.split_once(": ").map(|(_, rest)| rest).unwrap_or(text);
                let mut vector = vec![0.0f32; DIMENSIONS];
                for word in body
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| !w.is_empty())
                {
                    let mut hasher = DefaultHasher::new();
                    word.to_lowercase().hash(&mut hasher);
                    vector[(hasher.finish() % DIMENSIONS as u64) as usize] += 1.0;
                }
                vector
            })
            .collect())
    }
}

/// Config with every path inside `root`
pub fn config_in(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths.esco_dir = root.join("bronze").join("esco");
    config.paths.pad_occupations_dir = root.join("silver").join("occupations_skills_json");
    config.paths.taxonomy_csv = root.join("silver").join("esco_occupations_prepared.csv");
    config.paths.embeddings_file = root.join("silver").join("embeddings").join("esco_embeddings.safetensors");
    config.paths.output_dir = root.join("silver");
    config.models.models_dir = root.join("models");
    config
}

pub const DEVELOPER_URI: &str = "http://data.europa.eu/esco/occupation/dev-001";
pub const TEACHER_URI: &str = "http://data.europa.eu/esco/occupation/teach-002";
pub const NURSE_URI: &str = "http://data.europa.eu/esco/occupation/nurse-003";

/// Three-occupation ESCO extract: software developer, teacher, nurse
pub fn write_esco_tables(config: &Config) {
    let dir = &config.paths.esco_dir;
    std::fs::create_dir_all(dir).unwrap();

    let occupations = format!(
        "conceptType,conceptUri,preferredLabel,altLabels,description\n\
         Occupation,{},Software developer,\"programmer\ncoder\",Writes and maintains software code\n\
         Occupation,{},Teacher,,\n\
         Occupation,{},Nurse,,Cares for patients in hospitals\n",
        DEVELOPER_URI, TEACHER_URI, NURSE_URI
    );
    std::fs::write(dir.join("occupations_en.csv"), occupations).unwrap();

    let relations = format!(
        "occupationUri,relationType,skillType,skillUri,skillLabel\n\
         {},essential,skill/competence,http://data.europa.eu/esco/skill/s1,use programming languages\n\
         {},optional,skill/competence,http://data.europa.eu/esco/skill/s2,write documentation\n\
         {},essential,knowledge,http://data.europa.eu/esco/skill/s3,anatomy\n",
        DEVELOPER_URI, DEVELOPER_URI, NURSE_URI
    );
    std::fs::write(dir.join("occupationSkillRelations_en.csv"), relations).unwrap();
}

/// Append one more occupation to the ESCO extract
pub fn add_esco_occupation(config: &Config, uri: &str, label: &str) {
    let path = config.paths.esco_dir.join("occupations_en.csv");
    let mut content = std::fs::read_to_string(&path).unwrap();
    content.push_str(&format!("Occupation,{},{},,\n", uri, label));
    std::fs::write(path, content).unwrap();
}

/// Write `{project}_{section}_occupations.json`
pub fn write_extractions(config: &Config, project_id: &str, section_id: &str, extractions: Value) {
    let dir = &config.paths.pad_occupations_dir;
    std::fs::create_dir_all(dir).unwrap();
    let file = serde_json::json!({
        "project_id": project_id,
        "section_id": section_id,
        "extractions": extractions,
    });
    std::fs::write(
        dir.join(format!("{}_{}_occupations.json", project_id, section_id)),
        serde_json::to_string_pretty(&file).unwrap(),
    )
    .unwrap();
}

/// Sorted file names in `dir`
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
