//! Embedding model management for downloading and locating Model2Vec models

use crate::config::AvailableModel;
use crate::error::{Pad2EscoError, Result};
use hf_hub::api::tokio::Api;
use log::{info, warn};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;

const REQUIRED_FILES: [&str; 2] = ["model.safetensors", "tokenizer.json"];
const OPTIONAL_FILES: [&str; 2] = ["config.json", "README.md"];

/// Where a model will be loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    /// Identity recorded in the embedding cache fingerprint
    pub model_id: String,
    /// Local directory, or a hub repo id for the loader to fetch
    pub location: PathBuf,
}

/// Manager for embedding models - handles download, caching, and selection
pub struct EmbeddingModelManager {
    models_dir: PathBuf,
    available_models: BTreeMap<String, AvailableModel>,
    downloaded_models: HashSet<String>,
    api: Api,
}

impl EmbeddingModelManager {
    pub async fn new(models_dir: PathBuf, available: &[AvailableModel]) -> Result<Self> {
        if !models_dir.exists() {
            fs::create_dir_all(&models_dir).await.map_err(|e| {
                Pad2EscoError::ModelError(format!("Failed to create models directory: {}", e))
            })?;
        }

        let api = Api::new()
            .map_err(|e| Pad2EscoError::ModelError(format!("Failed to initialize HF API: {}", e)))?;

        let mut manager = Self {
            models_dir,
            available_models: available.iter().map(|m| (m.name.clone(), m.clone())).collect(),
            downloaded_models: HashSet::new(),
            api,
        };
        manager.scan_downloaded_models().await?;
        Ok(manager)
    }

    async fn scan_downloaded_models(&mut self) -> Result<()> {
        let mut entries = fs::read_dir(&self.models_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() && is_model_directory(&entry.path()).await {
                self.downloaded_models
                    .insert(entry.file_name().to_string_lossy().to_string());
            }
        }
        Ok(())
    }

    /// Download a known model from the Hugging Face Hub into `models_dir/<name>`.
    pub async fn download_model(&mut self, model_id: &str, force: bool) -> Result<PathBuf> {
        let name = self
            .resolve_model_id(model_id)
            .ok_or_else(|| Pad2EscoError::ModelError(format!("Unknown embedding model: {}", model_id)))?;
        let model_dir = self.models_dir.join(&name);

        if self.downloaded_models.contains(&name) && !force {
            return Ok(model_dir);
        }

        let repo_id = match self.available_models.get(&name) {
            Some(info) => {
                info!("Downloading embedding model {} ({} MB) from {}", name, info.size_mb, info.repo_id);
                info.repo_id.clone()
            }
            None => return Err(Pad2EscoError::ModelError(format!("Unknown embedding model: {}", name))),
        };

        fs::create_dir_all(&model_dir).await?;
        let repo = self.api.repo(hf_hub::Repo::model(repo_id));

        for file in REQUIRED_FILES {
            let cached = repo.get(file).await.map_err(|e| {
                Pad2EscoError::ModelError(format!("Failed to download required file {}: {}", file, e))
            })?;
            fs::copy(&cached, model_dir.join(file)).await?;
            info!("Downloaded {}", file);
        }
        for file in OPTIONAL_FILES {
            match repo.get(file).await {
                Ok(cached) => {
                    fs::copy(&cached, model_dir.join(file)).await?;
                    info!("Downloaded {}", file);
                }
                Err(e) => warn!("Optional file {} not found: {}", file, e),
            }
        }

        self.downloaded_models.insert(name.clone());
        info!("Embedding model {} stored in {}", name, model_dir.display());
        Ok(model_dir)
    }

    pub fn get_model_path(&self, model_id: &str) -> Option<PathBuf> {
        if self.downloaded_models.contains(model_id) {
            Some(self.models_dir.join(model_id))
        } else {
            None
        }
    }

    pub async fn ensure_model_available(&mut self, model_id: &str) -> Result<PathBuf> {
        if let Some(path) = self.get_model_path(model_id) {
            return Ok(path);
        }
        self.download_model(model_id, false).await
    }

    /// Available models, ordered by name
    pub fn list_available_models(&self) -> Vec<&AvailableModel> {
        self.available_models.values().collect()
    }

    pub fn list_downloaded_models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.downloaded_models.iter().cloned().collect();
        models.sort();
        models
    }

    pub fn get_model_info(&self, model_id: &str) -> Option<&AvailableModel> {
        self.available_models.get(model_id)
    }

    pub fn is_model_downloaded(&self, model_id: &str) -> bool {
        self.downloaded_models.contains(model_id)
    }

    /// Resolve a configured name, a repo id, or a case-insensitive name.
    pub fn resolve_model_id(&self, input: &str) -> Option<String> {
        if self.available_models.contains_key(input) {
            return Some(input.to_string());
        }
        if let Some(info) = self.available_models.values().find(|m| m.repo_id == input) {
            return Some(info.name.clone());
        }
        let lower = input.to_lowercase();
        self.available_models
            .values()
            .find(|m| m.name.to_lowercase() == lower)
            .map(|m| m.name.clone())
    }

    /// Decide where `input` loads from without touching the network.
    ///
    /// Known models resolve to their downloaded directory, or to their hub
    /// repo id when not downloaded yet. An existing directory is used as is.
    /// Anything else is passed through as a hub repo id.
    pub fn resolve_source(&self, input: &str) -> ModelSource {
        if let Some(name) = self.resolve_model_id(input) {
            let location = match (self.get_model_path(&name), self.available_models.get(&name)) {
                (Some(path), _) => path,
                (None, Some(info)) => PathBuf::from(&info.repo_id),
                (None, None) => PathBuf::from(&name),
            };
            return ModelSource { model_id: name, location };
        }

        let path = PathBuf::from(input);
        let model_id = if path.is_dir() {
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| input.to_string())
        } else {
            input.to_string()
        };
        ModelSource { model_id, location: path }
    }
}

/// A model directory holds the weights and the tokenizer
async fn is_model_directory(path: &Path) -> bool {
    for file in REQUIRED_FILES {
        if fs::metadata(path.join(file)).await.is_err() {
            return false;
        }
    }
    true
}
