//! Persistence of match results: full CSV, diagnostics CSV and JSON chunks

use crate::error::{Pad2EscoError, Result};
use crate::output::atomic::write_atomically;
use crate::processing::matcher::MatchResult;
use crate::processing::text_composer::SkillsField;
use log::{debug, info};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const CSV_DIR: &str = "esco_matching_csv";
pub const JSON_DIR: &str = "esco_matching_json";
pub const DIAGNOSTICS_DIR: &str = "diagnostics";
const CHUNK_SUFFIX: &str = "_matches.json";

pub const QUERY_COLUMNS: [&str; 8] = [
    "project_id",
    "section_id",
    "record_id",
    "identified_occupation",
    "activity_description",
    "skills_needed",
    "source_material_quote",
    "composed_text",
];

const MATCH_FIELDS: [&str; 5] = ["id", "uri", "label", "description", "score"];

/// Where a project's outputs live under the output root
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn csv_path(&self, project_id: &str) -> PathBuf {
        self.root.join(CSV_DIR).join(format!("{}_esco_matches.csv", project_id))
    }

    pub fn diagnostics_path(&self, project_id: &str) -> PathBuf {
        self.root
            .join(CSV_DIR)
            .join(DIAGNOSTICS_DIR)
            .join(format!("{}_esco_matches_diagnostics.csv", project_id))
    }

    pub fn json_dir(&self) -> PathBuf {
        self.root.join(JSON_DIR)
    }
}

/// `match_{rank}_{field}` for ranks 1..=k
pub fn match_columns(k: usize) -> Vec<String> {
    (1..=k)
        .flat_map(|rank| MATCH_FIELDS.iter().map(move |field| format!("match_{}_{}", rank, field)))
        .collect()
}

/// Round to two decimals for JSON output.
pub fn round_score(score: f32) -> f64 {
    (score as f64 * 100.0).round() / 100.0
}

pub fn chunk_file_name(project_id: &str, start: usize, end: usize) -> String {
    format!("{}_{:03}-{:03}{}", project_id, start, end, CHUNK_SUFFIX)
}

fn is_chunk_file_of(name: &str, project_id: &str) -> bool {
    let range = name
        .strip_prefix(project_id)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix(CHUNK_SUFFIX));

    match range.and_then(|r| r.split_once('-')) {
        Some((start, end)) => {
            let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
            digits(start) && digits(end)
        }
        None => false,
    }
}

fn skills_cell(skills: &SkillsField) -> String {
    match skills {
        SkillsField::Absent => String::new(),
        SkillsField::Text(raw) => raw.clone(),
        SkillsField::List(items) => serde_json::to_string(items).unwrap_or_default(),
    }
}

/// Tabular form of the results, identical whether freshly computed or read
/// back from an earlier run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResultsTable {
    /// One row per query with `5 × k` match columns; missing ranks stay empty.
    pub fn from_results(results: &[MatchResult], k: usize) -> Self {
        let mut headers: Vec<String> = QUERY_COLUMNS.iter().map(|c| c.to_string()).collect();
        headers.extend(match_columns(k));

        let rows = results
            .iter()
            .map(|result| {
                let occ = &result.occupation;
                let mut row = vec![
                    occ.project_id.clone(),
                    occ.section_id.clone(),
                    occ.record_id.clone(),
                    occ.occupation_label.clone().unwrap_or_default(),
                    occ.activity_description.clone().unwrap_or_default(),
                    skills_cell(&occ.skills_needed),
                    occ.source_quote.clone().unwrap_or_default(),
                    occ.composed_text.clone(),
                ];
                for rank in 0..k {
                    match result.candidates.get(rank) {
                        Some(candidate) => row.extend([
                            candidate.id.clone(),
                            candidate.uri.clone(),
                            candidate.label.clone(),
                            candidate.description.clone().unwrap_or_default(),
                            candidate.score.to_string(),
                        ]),
                        None => row.extend(std::iter::repeat(String::new()).take(MATCH_FIELDS.len())),
                    }
                }
                row
            })
            .collect();

        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Keep only `columns`, in the given order.
    pub fn project(&self, columns: &[String]) -> Result<Self> {
        let indices = columns
            .iter()
            .map(|name| {
                self.column(name)
                    .ok_or_else(|| Pad2EscoError::Processing(format!("results have no column {}", name)))
            })
            .collect::<Result<Vec<usize>>>()?;

        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row.get(i).cloned().unwrap_or_default()).collect())
            .collect();

        Ok(Self {
            headers: columns.to_vec(),
            rows,
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomically(path, |file| {
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(&self.headers)?;
            for row in &self.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
            Ok(())
        })
    }
}

/// Columns of the diagnostics CSV for `k` ranks
pub fn diagnostics_columns(k: usize) -> Vec<String> {
    let mut columns = vec!["identified_occupation".to_string(), "source_material_quote".to_string()];
    columns.extend((1..=k).map(|rank| format!("match_{}_label", rank)));
    columns
}

#[derive(Debug, Serialize)]
struct JsonCandidate<'a> {
    rank: usize,
    esco_id: &'a str,
    label: &'a str,
    description: Option<&'a str>,
    similarity_score: f64,
}

#[derive(Debug, Serialize)]
struct JsonRecord<'a> {
    record_id: &'a str,
    pad_occupation: Option<&'a str>,
    pad_activity: &'a str,
    pad_quote: &'a str,
    esco_candidates: Vec<JsonCandidate<'a>>,
}

impl<'a> JsonRecord<'a> {
    fn from_result(result: &'a MatchResult, max_candidates: usize) -> Self {
        let occ = &result.occupation;
        Self {
            record_id: &occ.record_id,
            pad_occupation: occ.occupation_label.as_deref(),
            pad_activity: occ.activity_description.as_deref().unwrap_or(""),
            pad_quote: occ.source_quote.as_deref().unwrap_or(""),
            esco_candidates: result
                .candidates
                .iter()
                .take(max_candidates)
                .map(|c| JsonCandidate {
                    rank: c.rank,
                    esco_id: &c.id,
                    label: &c.label,
                    description: c.description.as_deref(),
                    similarity_score: round_score(c.score),
                })
                .collect(),
        }
    }
}

/// Delete every JSON chunk previously written for `project_id`.
pub fn remove_json_chunks(json_dir: &Path, project_id: &str) -> Result<usize> {
    if !json_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(json_dir)? {
        let path = entry?.path();
        let is_chunk = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| is_chunk_file_of(n, project_id))
            .unwrap_or(false);
        if is_chunk {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    if removed > 0 {
        info!("Deleted {} existing JSON chunk file(s) for {}", removed, project_id);
    }
    Ok(removed)
}

/// Write results as JSON arrays of at most `chunk_size` records, each record
/// carrying at most `max_candidates` ranks. Earlier chunks for the project
/// are removed first.
pub fn write_json_chunks(
    json_dir: &Path,
    project_id: &str,
    results: &[MatchResult],
    chunk_size: usize,
    max_candidates: usize,
) -> Result<Vec<PathBuf>> {
    if chunk_size == 0 {
        return Err(Pad2EscoError::InvalidInput("chunk_size must be at least 1".to_string()));
    }
    std::fs::create_dir_all(json_dir)?;
    remove_json_chunks(json_dir, project_id)?;

    let num_chunks = results.len().div_ceil(chunk_size);
    info!(
        "Splitting {} records into {} chunk(s) of up to {} records",
        results.len(),
        num_chunks,
        chunk_size
    );

    let mut written = Vec::with_capacity(num_chunks);
    for (i, chunk) in results.chunks(chunk_size).enumerate() {
        let start = i * chunk_size;
        let end = start + chunk.len() - 1;
        let path = json_dir.join(chunk_file_name(project_id, start, end));

        let records: Vec<JsonRecord<'_>> = chunk
            .iter()
            .map(|result| JsonRecord::from_result(result, max_candidates))
            .collect();

        write_atomically(&path, |file| {
            serde_json::to_writer_pretty(&mut *file, &records)?;
            Ok(())
        })?;
        debug!("Saved chunk {}/{}: {} ({} records)", i + 1, num_chunks, path.display(), chunk.len());
        written.push(path);
    }

    info!("Saved {} JSON file(s) to {}", written.len(), json_dir.display());
    Ok(written)
}

/// Options for [`ResultSerializer::write_all`]
#[derive(Debug, Clone)]
pub struct SerializeOptions {
    pub top_k: usize,
    pub chunk_size: usize,
    pub json_candidates: usize,
    pub save_diagnostics: bool,
}

/// Writes the three result artifacts for one project.
pub struct ResultSerializer {
    layout: OutputLayout,
}

impl ResultSerializer {
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn write_all(&self, project_id: &str, results: &[MatchResult], options: &SerializeOptions) -> Result<ResultsTable> {
        let table = ResultsTable::from_results(results, options.top_k);

        let csv_path = self.layout.csv_path(project_id);
        table.write(&csv_path)?;
        info!("Saved CSV results to {}", csv_path.display());

        if options.save_diagnostics {
            let diagnostics = table.project(&diagnostics_columns(options.top_k))?;
            let diag_path = self.layout.diagnostics_path(project_id);
            diagnostics.write(&diag_path)?;
            info!("Saved diagnostics to {}", diag_path.display());
        }

        write_json_chunks(
            &self.layout.json_dir(),
            project_id,
            results,
            options.chunk_size,
            options.json_candidates,
        )?;

        Ok(table)
    }

    /// Remove the full CSV, the diagnostics CSV and all JSON chunks of a project.
    pub fn clear_project(&self, project_id: &str) -> Result<()> {
        let csv_path = self.layout.csv_path(project_id);
        if csv_path.exists() {
            std::fs::remove_file(&csv_path)?;
            info!("Deleted existing CSV: {}", csv_path.display());
        }
        let diag_path = self.layout.diagnostics_path(project_id);
        if diag_path.exists() {
            std::fs::remove_file(&diag_path)?;
            info!("Deleted existing diagnostics: {}", diag_path.display());
        }
        remove_json_chunks(&self.layout.json_dir(), project_id)?;
        Ok(())
    }
}
