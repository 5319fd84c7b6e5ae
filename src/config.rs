//! Configuration management for the PAD to ESCO matcher

use crate::error::{Pad2EscoError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub models: ModelConfig,
    pub processing: ProcessingConfig,
    pub matching: MatchingConfig,
}

/// Locations of pipeline artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the raw ESCO tables
    pub esco_dir: PathBuf,
    /// Directory holding `{project}_{section}_occupations.json` extraction files
    pub pad_occupations_dir: PathBuf,
    /// Prepared taxonomy snapshot
    pub taxonomy_csv: PathBuf,
    /// Cached taxonomy embeddings
    pub embeddings_file: PathBuf,
    /// Root for `esco_matching_csv/` and `esco_matching_json/`
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub models_dir: PathBuf,
    pub default_embedding_model: String,
    pub available_models: Vec<AvailableModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableModel {
    pub name: String,
    pub repo_id: String,
    pub size_mb: u64,
    pub dimensions: u32,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub top_k: usize,
    pub chunk_size: usize,
    pub json_candidates: usize,
    pub save_diagnostics: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");
        let models_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pad2esco")
            .join("models");

        Self {
            paths: PathsConfig {
                esco_dir: data_dir.join("bronze").join("esco"),
                pad_occupations_dir: data_dir.join("silver").join("occupations_skills_json"),
                taxonomy_csv: data_dir.join("silver").join("esco_occupations_prepared.csv"),
                embeddings_file: data_dir
                    .join("silver")
                    .join("embeddings")
                    .join("esco_embeddings.safetensors"),
                output_dir: data_dir.join("silver"),
            },
            models: ModelConfig {
                models_dir,
                default_embedding_model: "potion-base-8M".to_string(),
                available_models: vec![
                    AvailableModel {
                        name: "potion-base-8M".to_string(),
                        repo_id: "minishlab/potion-base-8M".to_string(),
                        size_mb: 33,
                        dimensions: 256,
                        description: "Compact Model2Vec embeddings, good quality/size balance".to_string(),
                    },
                    AvailableModel {
                        name: "m2v-base".to_string(),
                        repo_id: "minishlab/M2V_base_output".to_string(),
                        size_mb: 90,
                        dimensions: 256,
                        description: "Model2Vec base embeddings model".to_string(),
                    },
                    AvailableModel {
                        name: "m2v-large".to_string(),
                        repo_id: "minishlab/M2V_large_output".to_string(),
                        size_mb: 250,
                        dimensions: 512,
                        description: "High-capacity Model2Vec embeddings model".to_string(),
                    },
                ],
            },
            processing: ProcessingConfig { batch_size: 64 },
            matching: MatchingConfig {
                top_k: 20,
                chunk_size: 75,
                json_candidates: 10,
                save_diagnostics: true,
            },
        }
    }
}

impl Config {
    /// Load from the default location, writing defaults on first use
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| Pad2EscoError::Configuration(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Pad2EscoError::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("pad2esco")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        if self.matching.top_k == 0 {
            return Err(Pad2EscoError::Configuration("matching.top_k must be at least 1".to_string()));
        }
        if self.matching.chunk_size == 0 {
            return Err(Pad2EscoError::Configuration("matching.chunk_size must be at least 1".to_string()));
        }
        if self.processing.batch_size == 0 {
            return Err(Pad2EscoError::Configuration("processing.batch_size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn models_dir(&self) -> &PathBuf {
        &self.models.models_dir
    }

    pub fn get_model_by_name(&self, name: &str) -> Option<&AvailableModel> {
        self.models.available_models.iter().find(|m| m.name == name)
    }
}
