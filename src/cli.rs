//! CLI interface for the PAD to ESCO matcher

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pad2esco")]
#[command(about = "Match occupations extracted from project appraisal documents to the ESCO taxonomy")]
#[command(long_about = "Prepare an embedded ESCO occupation taxonomy and rank the closest ESCO occupations \
for every occupation extracted from a World Bank project appraisal document")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the taxonomy snapshot and its embedding cache
    Prepare {
        /// Recompute embeddings even if a matching cache exists
        #[arg(long)]
        overwrite_embeddings: bool,

        /// Embedding model name, repo id, or local directory
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Match one project's extracted occupations against the taxonomy
    Match {
        /// Project identifier, e.g. P075941
        project_id: String,

        /// Embedding model; must be the one used by `prepare`
        #[arg(short, long)]
        model: Option<String>,

        /// Number of candidates per occupation
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Records per JSON chunk file
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Skip the diagnostics CSV
        #[arg(long)]
        no_diagnostics: bool,

        /// Recompute and replace existing results
        #[arg(long)]
        overwrite: bool,
    },

    /// Model management commands
    Models {
        #[command(subcommand)]
        action: ModelAction,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum ModelAction {
    /// List available embedding models
    List,

    /// Download an embedding model
    Download {
        /// Model name or HuggingFace repo ID
        model: String,

        /// Force re-download if model exists
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Reset configuration to defaults
    Reset,

    /// Print the configuration file location
    Path,
}

/// Reject zero for count-like options
pub fn validate_positive(name: &str, value: Option<usize>) -> Result<Option<usize>, String> {
    match value {
        Some(0) => Err(format!("--{} must be at least 1", name)),
        other => Ok(other),
    }
}
