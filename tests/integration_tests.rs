//! Integration tests for the PAD to ESCO matcher

mod common;

use approx::assert_relative_eq;
use common::*;
use pad2esco::error::Pad2EscoError;
use pad2esco::output::serializer::{JSON_DIR, QUERY_COLUMNS};
use pad2esco::processing::embeddings::EmbeddingCache;
use pad2esco::processing::pipeline::{MatchOutcome, MatchRequest, Pipeline};
use pad2esco::processing::taxonomy::{prepare_taxonomy, TaxonomyTable};
use serde_json::{json, Value};
use tempfile::TempDir;

fn request(project_id: &str, top_k: usize) -> MatchRequest {
    MatchRequest {
        project_id: project_id.to_string(),
        top_k,
        chunk_size: 75,
        json_candidates: 10,
        save_diagnostics: true,
        overwrite: false,
    }
}

#[test]
fn test_prepare_builds_snapshot_and_aligned_embeddings() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    write_esco_tables(&config);
    let embedder = BagOfWordsEmbedder::new();

    let prepared = Pipeline::new(&config).prepare(&embedder, false).unwrap();

    assert_eq!(prepared.table.len(), 3);
    assert_eq!(prepared.embeddings.rows(), prepared.table.len());

    let snapshot = TaxonomyTable::load(&config.paths.taxonomy_csv).unwrap();
    assert_eq!(snapshot, prepared.table);
    assert_eq!(snapshot.get(0).unwrap().id, "dev-001");
    assert_eq!(
        snapshot.get(0).unwrap().composed_text,
        "Software developer programmer coder Writes and maintains software code use programming languages"
    );
    assert_eq!(snapshot.get(1).unwrap().composed_text, "Teacher ");

    let stored = EmbeddingCache::load(&config.paths.embeddings_file).unwrap();
    assert_eq!(stored.matrix.rows(), 3);
}

#[test]
fn test_prepare_reuses_cache_on_second_run() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    write_esco_tables(&config);
    let embedder = BagOfWordsEmbedder::new();
    let pipeline = Pipeline::new(&config);

    let first = pipeline.prepare(&embedder, false).unwrap();
    let calls_after_first = embedder.calls.get();
    let second = pipeline.prepare(&embedder, false).unwrap();

    assert_eq!(embedder.calls.get(), calls_after_first);
    assert_eq!(first.embeddings, second.embeddings);

    pipeline.prepare(&embedder, true).unwrap();
    assert!(embedder.calls.get() > calls_after_first);
}

#[test]
fn test_match_ranks_exact_label_first() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    write_esco_tables(&config);
    write_extractions(&config, "P100", "01", json!([{ "identified_occupation": "Teacher" }]));

    let pipeline = Pipeline::new(&config);
    pipeline.prepare(&BagOfWordsEmbedder::new(), false).unwrap();
    let outcome = pipeline
        .match_project(&request("P100", 2), || Ok(BagOfWordsEmbedder::new()))
        .unwrap();

    assert!(outcome.was_computed());
    let table = outcome.table();
    assert_eq!(table.len(), 1);
    assert_eq!(table.headers.len(), QUERY_COLUMNS.len() + 2 * 5);

    let row = &table.rows[0];
    let cell = |name: &str| row[table.column(name).unwrap()].clone();
    assert_eq!(cell("record_id"), "000");
    assert_eq!(cell("match_1_label"), "Teacher");
    assert_eq!(cell("match_1_uri"), TEACHER_URI);
    assert_relative_eq!(cell("match_1_score").parse::<f32>().unwrap(), 1.0, epsilon = 1e-5);
    assert!(cell("match_2_score").parse::<f32>().unwrap() <= cell("match_1_score").parse::<f32>().unwrap());

    let diagnostics = pipeline.layout().diagnostics_path("P100");
    let diag = std::fs::read_to_string(diagnostics).unwrap();
    assert!(diag.starts_with("identified_occupation,source_material_quote,match_1_label,match_2_label"));

    let chunk = temp_dir
        .path()
        .join("silver")
        .join(JSON_DIR)
        .join("P100_000-000_matches.json");
    let records: Value = serde_json::from_str(&std::fs::read_to_string(chunk).unwrap()).unwrap();
    assert_eq!(records[0]["record_id"], "000");
    assert_eq!(records[0]["pad_occupation"], "Teacher");
    assert_eq!(records[0]["esco_candidates"][0]["esco_id"], "teach-002");
    assert_eq!(records[0]["esco_candidates"][0]["similarity_score"], 1.0);
    assert_eq!(records[0]["esco_candidates"].as_array().unwrap().len(), 2);
}

#[test]
fn test_top_k_larger_than_taxonomy_is_clamped() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    write_esco_tables(&config);
    write_extractions(&config, "P101", "01", json!([{ "identified_occupation": "Nurse" }]));

    let pipeline = Pipeline::new(&config);
    pipeline.prepare(&BagOfWordsEmbedder::new(), false).unwrap();
    let outcome = pipeline
        .match_project(&request("P101", 20), || Ok(BagOfWordsEmbedder::new()))
        .unwrap();

    let table = outcome.table();
    assert_eq!(table.headers.len(), QUERY_COLUMNS.len() + 3 * 5);
    assert!(table.column("match_4_label").is_none());
}

#[test]
fn test_second_run_returns_existing_results_without_model() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    write_esco_tables(&config);
    write_extractions(
        &config,
        "P200",
        "01",
        json!([
            { "identified_occupation": "Teacher", "source_material_quote": "teachers, \"trained\"\nin rural schools" },
            { "identified_occupation": "Nurse", "skills_needed": ["triage", "vaccination"] }
        ]),
    );

    let pipeline = Pipeline::new(&config);
    pipeline.prepare(&BagOfWordsEmbedder::new(), false).unwrap();
    let first = pipeline
        .match_project(&request("P200", 2), || Ok(BagOfWordsEmbedder::new()))
        .unwrap();
    let csv_path = pipeline.layout().csv_path("P200");
    let bytes_before = std::fs::read(&csv_path).unwrap();

    let second = pipeline
        .match_project(&request("P200", 2), || -> pad2esco::Result<BagOfWordsEmbedder> {
            panic!("model must not be loaded for existing results")
        })
        .unwrap();

    match second {
        MatchOutcome::Existing(ref table) => assert_eq!(table, first.table()),
        MatchOutcome::Computed(_) => panic!("expected existing results"),
    }
    assert_eq!(std::fs::read(&csv_path).unwrap(), bytes_before);
}

#[test]
fn test_overwrite_leaves_no_stale_chunks() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    write_esco_tables(&config);
    write_extractions(
        &config,
        "P300",
        "01",
        json!([
            { "identified_occupation": "Teacher" },
            { "identified_occupation": "Nurse" },
            { "identified_occupation": "Software developer" }
        ]),
    );
    write_extractions(&config, "P301", "01", json!([{ "identified_occupation": "Nurse" }]));

    let pipeline = Pipeline::new(&config);
    pipeline.prepare(&BagOfWordsEmbedder::new(), false).unwrap();

    let mut req = request("P300", 1);
    req.chunk_size = 1;
    pipeline.match_project(&req, || Ok(BagOfWordsEmbedder::new())).unwrap();
    pipeline
        .match_project(&request("P301", 1), || Ok(BagOfWordsEmbedder::new()))
        .unwrap();

    let json_dir = pipeline.layout().json_dir();
    assert_eq!(
        file_names(&json_dir),
        vec![
            "P300_000-000_matches.json",
            "P300_001-001_matches.json",
            "P300_002-002_matches.json",
            "P301_000-000_matches.json",
        ]
    );

    write_extractions(&config, "P300", "01", json!([{ "identified_occupation": "Teacher" }]));
    req.overwrite = true;
    let outcome = pipeline.match_project(&req, || Ok(BagOfWordsEmbedder::new())).unwrap();

    assert!(outcome.was_computed());
    assert_eq!(outcome.table().len(), 1);
    assert_eq!(
        file_names(&json_dir),
        vec!["P300_000-000_matches.json", "P301_000-000_matches.json"]
    );
}

#[test]
fn test_chunking_splits_records() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    write_esco_tables(&config);
    let extractions: Vec<Value> = (0..5).map(|i| json!({ "identified_occupation": format!("Teacher {}", i) })).collect();
    write_extractions(&config, "P400", "01", Value::Array(extractions));

    let pipeline = Pipeline::new(&config);
    pipeline.prepare(&BagOfWordsEmbedder::new(), false).unwrap();
    let mut req = request("P400", 2);
    req.chunk_size = 2;
    req.json_candidates = 1;
    pipeline.match_project(&req, || Ok(BagOfWordsEmbedder::new())).unwrap();

    let json_dir = pipeline.layout().json_dir();
    assert_eq!(
        file_names(&json_dir),
        vec![
            "P400_000-001_matches.json",
            "P400_002-003_matches.json",
            "P400_004-004_matches.json",
        ]
    );
    let last: Value =
        serde_json::from_str(&std::fs::read_to_string(json_dir.join("P400_004-004_matches.json")).unwrap()).unwrap();
    assert_eq!(last[0]["record_id"], "004");
    assert_eq!(last[0]["esco_candidates"].as_array().unwrap().len(), 1);
}

#[test]
fn test_missing_inputs_are_reported() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    let pipeline = Pipeline::new(&config);

    let prepared = pipeline.prepare(&BagOfWordsEmbedder::new(), false);
    assert!(matches!(prepared, Err(Pad2EscoError::MissingInput(_))));
    assert!(!config.paths.taxonomy_csv.exists());

    write_esco_tables(&config);
    prepare_taxonomy(&config.paths.esco_dir, &config.paths.taxonomy_csv).unwrap();
    write_extractions(&config, "P500", "01", json!([{ "identified_occupation": "Teacher" }]));
    let no_embeddings = pipeline.match_project(&request("P500", 2), || Ok(BagOfWordsEmbedder::new()));
    assert!(matches!(no_embeddings, Err(Pad2EscoError::MissingInput(_))));

    pipeline.prepare(&BagOfWordsEmbedder::new(), false).unwrap();
    let no_project = pipeline.match_project(&request("P404", 2), || Ok(BagOfWordsEmbedder::new()));
    assert!(matches!(no_project, Err(Pad2EscoError::MissingInput(_))));
    assert!(!pipeline.layout().csv_path("P404").exists());
}

#[test]
fn test_stale_embeddings_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = config_in(temp_dir.path());
    write_esco_tables(&config);
    write_extractions(&config, "P600", "01", json!([{ "identified_occupation": "Teacher" }]));

    let pipeline = Pipeline::new(&config);
    pipeline.prepare(&BagOfWordsEmbedder::new(), false).unwrap();

    let other_model = pipeline.match_project(&request("P600", 2), || Ok(BagOfWordsEmbedder::named("other-model")));
    assert!(matches!(other_model, Err(Pad2EscoError::StaleEmbeddings(_))));

    add_esco_occupation(&config, "http://data.europa.eu/esco/occupation/cook-004", "Cook");
    prepare_taxonomy(&config.paths.esco_dir, &config.paths.taxonomy_csv).unwrap();
    let grown_taxonomy = pipeline.match_project(&request("P600", 2), || Ok(BagOfWordsEmbedder::new()));
    assert!(matches!(grown_taxonomy, Err(Pad2EscoError::StaleEmbeddings(_))));
    assert!(!pipeline.layout().csv_path("P600").exists());

    let prepared = pipeline.prepare(&BagOfWordsEmbedder::new(), false).unwrap();
    assert_eq!(prepared.embeddings.rows(), 4);
    assert!(pipeline
        .match_project(&request("P600", 2), || Ok(BagOfWordsEmbedder::new()))
        .is_ok());
}
