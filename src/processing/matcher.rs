//! Top-k semantic matching of extracted occupations against the taxonomy

use crate::error::{Pad2EscoError, Result};
use crate::input::occupations::ExtractedOccupation;
use crate::processing::embeddings::{EmbeddingCache, EmbeddingMatrix, QUERY_PREFIX};
use crate::processing::taxonomy::TaxonomyTable;
use log::{info, warn};
use ndarray::{Array2, ArrayView1};
use serde::Serialize;
use std::time::Instant;

/// A ranked taxonomy entry proposed for one query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    /// 1-based
    pub rank: usize,
    pub id: String,
    pub uri: String,
    pub label: String,
    pub description: Option<String>,
    /// Full-precision cosine similarity
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub occupation: ExtractedOccupation,
    /// Ordered by rank; scores never increase
    pub candidates: Vec<MatchCandidate>,
}

/// Column indices of the `k` highest scores, best first.
///
/// Equal scores keep ascending column order (the sort is stable); callers
/// should not rely on any particular order among exact ties.
pub fn top_k(scores: ArrayView1<'_, f32>, k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(k);
    ranked
}

/// Apply [`top_k`] to every query row.
pub fn rank_rows(scores: &Array2<f32>, k: usize) -> Vec<Vec<(usize, f32)>> {
    scores.rows().into_iter().map(|row| top_k(row, k)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

pub fn score_stats(scores: &Array2<f32>) -> Option<ScoreStats> {
    if scores.is_empty() {
        return None;
    }
    let (min, max, sum) = scores.iter().fold((f32::INFINITY, f32::NEG_INFINITY, 0.0f64), |(lo, hi, sum), &s| {
        (lo.min(s), hi.max(s), sum + s as f64)
    });
    Some(ScoreStats {
        min,
        max,
        mean: (sum / scores.len() as f64) as f32,
    })
}

/// Matches queries against a prepared taxonomy using the embedder behind
/// `cache`, which must be the model the reference matrix was built with.
pub struct Matcher<'c, 'e> {
    cache: &'c EmbeddingCache<'e>,
}

impl<'c, 'e> Matcher<'c, 'e> {
    pub fn new(cache: &'c EmbeddingCache<'e>) -> Self {
        Self { cache }
    }

    /// Rank the `k` nearest taxonomy entries for every query, in query order.
    pub fn match_occupations(
        &self,
        queries: Vec<ExtractedOccupation>,
        taxonomy: &TaxonomyTable,
        reference: &EmbeddingMatrix,
        k: usize,
    ) -> Result<Vec<MatchResult>> {
        if k == 0 {
            return Err(Pad2EscoError::InvalidInput("top_k must be at least 1".to_string()));
        }
        if taxonomy.len() != reference.rows() {
            return Err(Pad2EscoError::StaleEmbeddings(format!(
                "taxonomy has {} rows but the embedding matrix has {}",
                taxonomy.len(),
                reference.rows()
            )));
        }

        let effective_k = k.min(taxonomy.len());
        if effective_k < k {
            warn!("top_k={} exceeds taxonomy size {}; returning {} matches", k, taxonomy.len(), effective_k);
        }

        let start_time = Instant::now();
        let texts: Vec<String> = queries.iter().map(|q| q.composed_text.clone()).collect();
        info!("Encoding {} occupation queries", texts.len());
        let query_matrix = self.cache.embed(&texts, QUERY_PREFIX)?;

        let scores = query_matrix.similarities(reference)?;
        if let Some(stats) = score_stats(&scores) {
            info!(
                "Computed similarity matrix {:?}: range [{:.4}, {:.4}], mean={:.4}",
                scores.dim(),
                stats.min,
                stats.max,
                stats.mean
            );
        }

        let ranked = rank_rows(&scores, effective_k);
        let mut results = Vec::with_capacity(queries.len());

        for (occupation, row) in queries.into_iter().zip(ranked) {
            let mut candidates = Vec::with_capacity(row.len());
            for (position, (column, score)) in row.into_iter().enumerate() {
                let entry = taxonomy.get(column).ok_or_else(|| {
                    Pad2EscoError::Processing(format!("similarity column {} has no taxonomy row", column))
                })?;
                candidates.push(MatchCandidate {
                    rank: position + 1,
                    id: entry.id.clone(),
                    uri: entry.uri.clone(),
                    label: entry.label.clone(),
                    description: entry.description.clone(),
                    score,
                });
            }
            results.push(MatchResult { occupation, candidates });
        }

        info!(
            "Found top {} matches for {} occupations in {:.2?}",
            effective_k,
            results.len(),
            start_time.elapsed()
        );
        Ok(results)
    }
}
