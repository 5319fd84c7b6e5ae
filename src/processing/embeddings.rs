//! Embedding generation and the on-disk taxonomy embedding cache

use crate::error::{Pad2EscoError, Result};
use crate::output::atomic::write_bytes_atomically;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use model2vec_rs::model::StaticModel;
use ndarray::{Array2, ArrayView1};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

/// Framing prefix for taxonomy documents
pub const PASSAGE_PREFIX: &str = "passage: ";
/// Framing prefix for extracted-occupation queries
pub const QUERY_PREFIX: &str = "query: ";

const EMBEDDINGS_TENSOR: &str = "embeddings";
const META_ROWS: &str = "rows";
const META_CONTENT_HASH: &str = "content_sha256";
const META_MODEL: &str = "model_id";
const META_CREATED_AT: &str = "created_at";

/// A text embedding model. Implementations must be deterministic for a
/// given model identity; taxonomy and queries must use the same one.
pub trait TextEmbedder {
    fn model_id(&self) -> &str;

    /// One vector per input text, in input order.
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Model2Vec static embeddings
pub struct StaticEmbedder {
    model: StaticModel,
    model_id: String,
}

impl StaticEmbedder {
    /// Load from a local model directory or a Hugging Face repo id.
    pub fn load(model_id: &str, source: &Path) -> Result<Self> {
        let start_time = Instant::now();
        info!("Loading Model2Vec embedding model from: {}", source.display());

        let model = StaticModel::from_pretrained(source, None, Some(true), None)
            .map_err(|e| Pad2EscoError::ModelError(format!("Failed to load model {}: {}", model_id, e)))?;

        info!("Model loaded in {:.2?}", start_time.elapsed());
        Ok(Self {
            model,
            model_id: model_id.to_string(),
        })
    }
}

impl TextEmbedder for StaticEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.model.encode(texts);
        if vectors.len() != texts.len() {
            return Err(Pad2EscoError::Embedding(format!(
                "model returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

/// Row-major matrix of L2-normalized embeddings
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    vectors: Array2<f32>,
}

impl EmbeddingMatrix {
    pub fn from_array(vectors: Array2<f32>) -> Self {
        Self { vectors }
    }

    /// Build from per-text vectors; every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let n_rows = rows.len();
        let dim = rows.first().map(Vec::len).unwrap_or(0);

        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != dim) {
            return Err(Pad2EscoError::Embedding(format!(
                "row {} has dimension {}, expected {}",
                i,
                row.len(),
                dim
            )));
        }

        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        Ok(Self {
            vectors: Array2::from_shape_vec((n_rows, dim), flat)?,
        })
    }

    /// Scale each row to unit length. All-zero rows stay zero.
    pub fn normalized(mut self) -> Self {
        for mut row in self.vectors.rows_mut() {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row.mapv_inplace(|v| v / norm);
            }
        }
        self
    }

    pub fn rows(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f32> {
        self.vectors.row(index)
    }

    /// Dense `self · referenceᵀ`; cosine similarity for normalized rows.
    pub fn similarities(&self, reference: &EmbeddingMatrix) -> Result<Array2<f32>> {
        if self.rows() == 0 || reference.rows() == 0 {
            return Ok(Array2::zeros((self.rows(), reference.rows())));
        }
        if self.dim() != reference.dim() {
            return Err(Pad2EscoError::Embedding(format!(
                "Embedding dimensions don't match: {} vs {}",
                self.dim(),
                reference.dim()
            )));
        }
        Ok(self.vectors.dot(&reference.vectors.t()))
    }
}

/// Identity of the data a cached matrix was computed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFingerprint {
    pub rows: usize,
    pub content_hash: String,
    pub model_id: String,
}

impl CacheFingerprint {
    pub fn new(rows: usize, content_hash: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            rows,
            content_hash: content_hash.into(),
            model_id: model_id.into(),
        }
    }

    /// Human-readable list of the fields where `self` (stored) and `expected` disagree
    pub fn differences(&self, expected: &CacheFingerprint) -> Vec<String> {
        let mut differences = Vec::new();
        if self.rows != expected.rows {
            differences.push(format!("rows: cached {}, taxonomy {}", self.rows, expected.rows));
        }
        if self.content_hash != expected.content_hash {
            differences.push(format!(
                "composed text hash: cached {}, taxonomy {}",
                short_hash(&self.content_hash),
                short_hash(&expected.content_hash)
            ));
        }
        if self.model_id != expected.model_id {
            differences.push(format!("model: cached {}, requested {}", self.model_id, expected.model_id));
        }
        differences
    }

    fn to_metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert(META_ROWS.to_string(), self.rows.to_string());
        metadata.insert(META_CONTENT_HASH.to_string(), self.content_hash.clone());
        metadata.insert(META_MODEL.to_string(), self.model_id.clone());
        metadata.insert(META_CREATED_AT.to_string(), chrono::Utc::now().to_rfc3339());
        metadata
    }

    fn from_metadata(metadata: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            rows: metadata.get(META_ROWS)?.parse().ok()?,
            content_hash: metadata.get(META_CONTENT_HASH)?.clone(),
            model_id: metadata.get(META_MODEL)?.clone(),
        })
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

/// Matrix read back from disk together with the fingerprint stored beside it
#[derive(Debug, Clone)]
pub struct StoredEmbeddings {
    pub matrix: EmbeddingMatrix,
    pub fingerprint: Option<CacheFingerprint>,
    pub created_at: Option<String>,
}

impl StoredEmbeddings {
    /// Accept the matrix only if it was built from the expected taxonomy and model.
    pub fn validate(self, path: &Path, expected: &CacheFingerprint) -> Result<EmbeddingMatrix> {
        let found = match self.fingerprint {
            Some(found) => found,
            None => {
                return Err(Pad2EscoError::StaleEmbeddings(format!(
                    "{} carries no fingerprint. Rerun `pad2esco prepare --overwrite-embeddings`",
                    path.display()
                )))
            }
        };

        let mut differences = found.differences(expected);
        if self.matrix.rows() != expected.rows {
            differences.push(format!(
                "matrix has {} rows, taxonomy has {}",
                self.matrix.rows(),
                expected.rows
            ));
        }
        if differences.is_empty() {
            return Ok(self.matrix);
        }

        Err(Pad2EscoError::StaleEmbeddings(format!(
            "{} does not match the current taxonomy ({}). Rerun `pad2esco prepare --overwrite-embeddings`",
            path.display(),
            differences.join("; ")
        )))
    }
}

/// Batched encoder plus the persisted taxonomy matrix
pub struct EmbeddingCache<'a> {
    embedder: &'a dyn TextEmbedder,
    batch_size: usize,
    show_progress: bool,
}

impl<'a> EmbeddingCache<'a> {
    pub fn new(embedder: &'a dyn TextEmbedder, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    /// Encode `prefix + text` for every text, in fixed-size batches, and
    /// L2-normalize the rows. Output order follows input order.
    pub fn embed(&self, texts: &[String], prefix: &str) -> Result<EmbeddingMatrix> {
        let start_time = Instant::now();
        let progress = self.progress_bar(texts.len());
        let mut rows = Vec::with_capacity(texts.len());

        for (batch_idx, batch) in texts.chunks(self.batch_size).enumerate() {
            let framed: Vec<String> = batch.iter().map(|text| format!("{}{}", prefix, text)).collect();
            let vectors = self.embedder.encode(&framed)?;
            if vectors.len() != framed.len() {
                return Err(Pad2EscoError::Embedding(format!(
                    "batch {} returned {} vectors for {} texts",
                    batch_idx,
                    vectors.len(),
                    framed.len()
                )));
            }
            debug!("Encoded batch {} ({} texts)", batch_idx, framed.len());
            rows.extend(vectors);
            progress.inc(batch.len() as u64);
        }
        progress.finish_and_clear();

        let matrix = EmbeddingMatrix::from_rows(rows)?.normalized();
        info!(
            "Encoded {} texts with {} in {:.2?}: shape=({}, {})",
            texts.len(),
            self.embedder.model_id(),
            start_time.elapsed(),
            matrix.rows(),
            matrix.dim()
        );
        Ok(matrix)
    }

    /// Return the cached matrix at `path` when its fingerprint matches,
    /// otherwise encode everything and replace the cache.
    pub fn load_or_compute(
        &self,
        path: &Path,
        texts: &[String],
        prefix: &str,
        fingerprint: &CacheFingerprint,
        recompute: bool,
    ) -> Result<EmbeddingMatrix> {
        if path.exists() && !recompute {
            let stored = Self::load(path)?;
            if stored.fingerprint.as_ref() == Some(fingerprint) && stored.matrix.rows() == fingerprint.rows {
                info!("Loaded cached embeddings from {}", path.display());
                return Ok(stored.matrix);
            }
            warn!(
                "Cached embeddings at {} do not match the current taxonomy or model; recomputing",
                path.display()
            );
        } else if recompute && path.exists() {
            warn!("Overwriting existing embeddings at {}", path.display());
        } else {
            info!("No cached embeddings found at {}; encoding", path.display());
        }

        let matrix = self.embed(texts, prefix)?;
        Self::save(path, &matrix, fingerprint)?;
        Ok(matrix)
    }

    /// Persist the full matrix as a single safetensors file.
    pub fn save(path: &Path, matrix: &EmbeddingMatrix, fingerprint: &CacheFingerprint) -> Result<()> {
        let bytes: Vec<u8> = matrix.vectors.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = TensorView::new(Dtype::F32, vec![matrix.rows(), matrix.dim()], &bytes)?;
        let serialized = safetensors::serialize([(EMBEDDINGS_TENSOR, view)], &Some(fingerprint.to_metadata()))?;

        write_bytes_atomically(path, &serialized)?;
        info!(
            "Saved embeddings to {}: shape=({}, {}), size={:.2} MB",
            path.display(),
            matrix.rows(),
            matrix.dim(),
            serialized.len() as f64 / 1024.0 / 1024.0
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<StoredEmbeddings> {
        if !path.exists() {
            return Err(Pad2EscoError::MissingInput(format!(
                "Embeddings not found: {}. Run `pad2esco prepare` first to generate embeddings",
                path.display()
            )));
        }

        let bytes = std::fs::read(path)?;
        let (_, header) = SafeTensors::read_metadata(&bytes)?;
        let metadata = header.metadata().clone().unwrap_or_default();

        let tensors = SafeTensors::deserialize(&bytes)?;
        let tensor = tensors.tensor(EMBEDDINGS_TENSOR)?;
        let [rows, cols]: [usize; 2] = tensor
            .shape()
            .try_into()
            .map_err(|_| Pad2EscoError::Embedding("embedding tensor is not 2-D".to_string()))?;

        let floats: Vec<f32> = match tensor.dtype() {
            Dtype::F32 => tensor
                .data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            Dtype::F64 => tensor
                .data()
                .chunks_exact(8)
                .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
                .collect(),
            other => {
                return Err(Pad2EscoError::Embedding(format!(
                    "unsupported embedding dtype: {:?}",
                    other
                )))
            }
        };

        let matrix = EmbeddingMatrix::from_array(Array2::from_shape_vec((rows, cols), floats)?);
        debug!("Read embeddings {}: shape=({}, {})", path.display(), rows, cols);

        Ok(StoredEmbeddings {
            matrix,
            fingerprint: CacheFingerprint::from_metadata(&metadata),
            created_at: metadata.get(META_CREATED_AT).cloned(),
        })
    }

    /// Load for matching: the stored fingerprint must equal `expected`.
    pub fn load_validated(path: &Path, expected: &CacheFingerprint) -> Result<EmbeddingMatrix> {
        Self::load(path)?.validate(path, expected)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress = ProgressBar::new(len as u64);
        let style = ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} texts")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        progress.set_style(style);
        progress
    }
}
