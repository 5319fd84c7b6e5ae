//! Preparation and match-and-serialize runs over configured paths

use crate::config::{Config, PathsConfig};
use crate::error::Result;
use crate::input::occupations::load_project_occupations;
use crate::output::serializer::{OutputLayout, ResultSerializer, ResultsTable, SerializeOptions};
use crate::processing::embeddings::{CacheFingerprint, EmbeddingCache, EmbeddingMatrix, TextEmbedder, PASSAGE_PREFIX};
use crate::processing::matcher::Matcher;
use crate::processing::taxonomy::{prepare_taxonomy, TaxonomyTable};
use log::info;

/// Taxonomy snapshot and the embedding matrix that indexes it
#[derive(Debug, Clone)]
pub struct PreparedTaxonomy {
    pub table: TaxonomyTable,
    pub embeddings: EmbeddingMatrix,
}

/// Parameters of one project's matching run
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub project_id: String,
    pub top_k: usize,
    pub chunk_size: usize,
    pub json_candidates: usize,
    pub save_diagnostics: bool,
    pub overwrite: bool,
}

impl MatchRequest {
    /// Request with the configured defaults
    pub fn from_config(project_id: &str, config: &Config) -> Self {
        Self {
            project_id: project_id.to_string(),
            top_k: config.matching.top_k,
            chunk_size: config.matching.chunk_size,
            json_candidates: config.matching.json_candidates,
            save_diagnostics: config.matching.save_diagnostics,
            overwrite: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Results already on disk, returned without matching
    Existing(ResultsTable),
    /// Freshly matched and written
    Computed(ResultsTable),
}

impl MatchOutcome {
    pub fn table(&self) -> &ResultsTable {
        match self {
            MatchOutcome::Existing(table) | MatchOutcome::Computed(table) => table,
        }
    }

    pub fn was_computed(&self) -> bool {
        matches!(self, MatchOutcome::Computed(_))
    }
}

pub struct Pipeline {
    paths: PathsConfig,
    batch_size: usize,
    show_progress: bool,
    serializer: ResultSerializer,
}

impl Pipeline {
    pub fn new(config: &Config) -> Self {
        Self {
            paths: config.paths.clone(),
            batch_size: config.processing.batch_size,
            show_progress: false,
            serializer: ResultSerializer::new(OutputLayout::new(config.paths.output_dir.clone())),
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn layout(&self) -> &OutputLayout {
        self.serializer.layout()
    }

    /// Flatten the raw ESCO tables and make sure the embedding cache matches
    /// the new snapshot, recomputing it when stale or when asked to.
    pub fn prepare(&self, embedder: &dyn TextEmbedder, recompute_embeddings: bool) -> Result<PreparedTaxonomy> {
        let table = prepare_taxonomy(&self.paths.esco_dir, &self.paths.taxonomy_csv)?;

        let cache = EmbeddingCache::new(embedder, self.batch_size).with_progress(self.show_progress);
        let fingerprint = CacheFingerprint::new(table.len(), table.content_hash(), embedder.model_id());
        let embeddings = cache.load_or_compute(
            &self.paths.embeddings_file,
            &table.composed_texts(),
            PASSAGE_PREFIX,
            &fingerprint,
            recompute_embeddings,
        )?;

        info!(
            "ESCO embeddings ready: shape=({}, {})",
            embeddings.rows(),
            embeddings.dim()
        );
        Ok(PreparedTaxonomy { table, embeddings })
    }

    /// Match one project and write its outputs.
    ///
    /// When the project's CSV exists and `overwrite` is false, its content is
    /// returned as is and `load_embedder` is never called. With `overwrite`,
    /// the CSV and JSON chunks of the project are deleted before anything is
    /// recomputed.
    pub fn match_project<E, F>(&self, request: &MatchRequest, load_embedder: F) -> Result<MatchOutcome>
    where
        E: TextEmbedder,
        F: FnOnce() -> Result<E>,
    {
        let project_id = request.project_id.as_str();
        let csv_path = self.layout().csv_path(project_id);

        if csv_path.exists() && !request.overwrite {
            info!(
                "Output already exists: {}. Use --overwrite to force re-matching",
                csv_path.display()
            );
            return Ok(MatchOutcome::Existing(ResultsTable::read(&csv_path)?));
        }
        if request.overwrite {
            self.serializer.clear_project(project_id)?;
        }

        let taxonomy = TaxonomyTable::load(&self.paths.taxonomy_csv)?;
        let stored = EmbeddingCache::load(&self.paths.embeddings_file)?;
        let queries = load_project_occupations(&self.paths.pad_occupations_dir, project_id)?;

        let embedder = load_embedder()?;
        let fingerprint = CacheFingerprint::new(taxonomy.len(), taxonomy.content_hash(), embedder.model_id());
        let reference = stored.validate(&self.paths.embeddings_file, &fingerprint)?;

        let cache = EmbeddingCache::new(&embedder, self.batch_size).with_progress(self.show_progress);
        let results = Matcher::new(&cache).match_occupations(queries, &taxonomy, &reference, request.top_k)?;

        let options = SerializeOptions {
            top_k: request.top_k.min(taxonomy.len()),
            chunk_size: request.chunk_size,
            json_candidates: request.json_candidates,
            save_diagnostics: request.save_diagnostics,
        };
        let table = self.serializer.write_all(project_id, &results, &options)?;
        Ok(MatchOutcome::Computed(table))
    }
}
