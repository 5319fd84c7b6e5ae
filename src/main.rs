//! pad2esco: match occupations from project appraisal documents to ESCO

use clap::Parser;
use colored::Colorize;
use log::{error, info};
use pad2esco::cli::{self, Cli, Commands, ConfigAction, ModelAction};
use pad2esco::config::Config;
use pad2esco::error::{Pad2EscoError, Result};
use pad2esco::processing::embedding_manager::{EmbeddingModelManager, ModelSource};
use pad2esco::processing::embeddings::StaticEmbedder;
use pad2esco::processing::pipeline::{MatchOutcome, MatchRequest, Pipeline};
use std::path::PathBuf;
use std::process;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);
    let config = match Config::load_from(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command, config, config_path).await {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

async fn run_command(command: Commands, config: Config, config_path: PathBuf) -> Result<()> {
    match command {
        Commands::Prepare {
            overwrite_embeddings,
            model,
        } => {
            let model = model.unwrap_or_else(|| config.models.default_embedding_model.clone());
            let mut manager =
                EmbeddingModelManager::new(config.models_dir().clone(), &config.models.available_models).await?;

            let source = match manager.resolve_model_id(&model) {
                Some(name) => ModelSource {
                    location: manager.ensure_model_available(&name).await?,
                    model_id: name,
                },
                None => manager.resolve_source(&model),
            };

            println!("{} Preparing ESCO taxonomy with {}", "🚀".bold(), source.model_id.cyan());
            let embedder = StaticEmbedder::load(&source.model_id, &source.location)?;
            let prepared = Pipeline::new(&config)
                .with_progress(true)
                .prepare(&embedder, overwrite_embeddings)?;

            println!("{}", "✅ Taxonomy prepared".green().bold());
            println!("  • Occupations: {}", prepared.table.len());
            println!(
                "  • Embeddings: ({}, {})",
                prepared.embeddings.rows(),
                prepared.embeddings.dim()
            );
            println!("  • Snapshot: {}", config.paths.taxonomy_csv.display());
            println!("  • Cache: {}", config.paths.embeddings_file.display());
        }

        Commands::Match {
            project_id,
            model,
            top_k,
            chunk_size,
            no_diagnostics,
            overwrite,
        } => {
            let top_k = cli::validate_positive("top-k", top_k).map_err(Pad2EscoError::InvalidInput)?;
            let chunk_size = cli::validate_positive("chunk-size", chunk_size).map_err(Pad2EscoError::InvalidInput)?;

            let mut request = MatchRequest::from_config(&project_id, &config);
            request.top_k = top_k.unwrap_or(request.top_k);
            request.chunk_size = chunk_size.unwrap_or(request.chunk_size);
            request.save_diagnostics = request.save_diagnostics && !no_diagnostics;
            request.overwrite = overwrite;

            let model = model.unwrap_or_else(|| config.models.default_embedding_model.clone());
            let manager =
                EmbeddingModelManager::new(config.models_dir().clone(), &config.models.available_models).await?;
            let source = manager.resolve_source(&model);

            info!("Matching project {} with {}", project_id, source.model_id);
            let pipeline = Pipeline::new(&config).with_progress(true);
            let outcome = pipeline.match_project(&request, || {
                StaticEmbedder::load(&source.model_id, &source.location)
            })?;

            let csv_path = pipeline.layout().csv_path(&project_id);
            match &outcome {
                MatchOutcome::Existing(table) => {
                    println!(
                        "{} Results for {} already exist ({} records)",
                        "ℹ️ ".yellow(),
                        project_id.cyan(),
                        table.len()
                    );
                    println!("💡 Use --overwrite to force re-matching");
                }
                MatchOutcome::Computed(table) => {
                    println!(
                        "{} Matched {} occupations for {}",
                        "✅".green(),
                        table.len(),
                        project_id.cyan()
                    );
                    println!("  • Top-k: {}", request.top_k);
                    println!("  • JSON chunks: {}", pipeline.layout().json_dir().display());
                    if request.save_diagnostics {
                        println!(
                            "  • Diagnostics: {}",
                            pipeline.layout().diagnostics_path(&project_id).display()
                        );
                    }
                }
            }
            println!("  • CSV: {}", csv_path.display());
        }

        Commands::Models { action } => {
            let mut manager =
                EmbeddingModelManager::new(config.models_dir().clone(), &config.models.available_models).await?;

            match action {
                ModelAction::List => {
                    println!("📚 Available Embedding Models\n");
                    for model in manager.list_available_models() {
                        let status = if manager.is_model_downloaded(&model.name) {
                            "Downloaded".green()
                        } else {
                            "Available".yellow()
                        };
                        let marker = if model.name == config.models.default_embedding_model {
                            " (default)"
                        } else {
                            ""
                        };
                        println!(
                            "  • {}{} ({}) - {} MB, {} dims [{}]",
                            model.name.bold(),
                            marker,
                            model.repo_id,
                            model.size_mb,
                            model.dimensions,
                            status
                        );
                        println!("    {}", model.description);
                    }
                    let downloaded = manager.list_downloaded_models();
                    if downloaded.is_empty() {
                        println!("\n💡 No models downloaded yet. Get started with:");
                        println!("   pad2esco models download {}", config.models.default_embedding_model);
                    } else {
                        println!("\n✅ Downloaded: {}", downloaded.join(", "));
                    }
                    println!("📁 Models directory: {}", config.models_dir().display());
                }

                ModelAction::Download { model, force } => {
                    println!("⬇️  Downloading model: {}", model.cyan());
                    if let Some(name) = manager.resolve_model_id(&model) {
                        if let Some(info) = manager.get_model_info(&name) {
                            println!("📁 Repository: {} ({} MB)", info.repo_id, info.size_mb);
                        }
                    }
                    let path = manager.download_model(&model, force).await?;
                    println!("{} Model stored in {}", "✅".green(), path.display());
                }
            }
        }

        Commands::Config { action } => match action {
            Some(ConfigAction::Show) | None => {
                println!("⚙️  Current Configuration\n");
                println!("{}", "Paths:".bold());
                println!("  ESCO tables: {}", config.paths.esco_dir.display());
                println!("  Occupation extractions: {}", config.paths.pad_occupations_dir.display());
                println!("  Taxonomy snapshot: {}", config.paths.taxonomy_csv.display());
                println!("  Embeddings: {}", config.paths.embeddings_file.display());
                println!("  Output: {}", config.paths.output_dir.display());
                println!("{}", "\nModels:".bold());
                println!("  Directory: {}", config.models_dir().display());
                match config.get_model_by_name(&config.models.default_embedding_model) {
                    Some(model) => println!(
                        "  Default embedding model: {} ({}, {} dims)",
                        model.name, model.repo_id, model.dimensions
                    ),
                    None => println!(
                        "  Default embedding model: {} (not in available_models)",
                        config.models.default_embedding_model
                    ),
                }
                println!("{}", "\nMatching:".bold());
                println!("  Batch size: {}", config.processing.batch_size);
                println!("  Top-k: {}", config.matching.top_k);
                println!("  Chunk size: {}", config.matching.chunk_size);
                println!("  JSON candidates: {}", config.matching.json_candidates);
                println!("  Diagnostics: {}", config.matching.save_diagnostics);
            }

            Some(ConfigAction::Reset) => {
                Config::default().save_to(&config_path)?;
                println!("{} Configuration reset: {}", "✅".green(), config_path.display());
            }

            Some(ConfigAction::Path) => {
                println!("{}", config_path.display());
            }
        },
    }

    Ok(())
}
