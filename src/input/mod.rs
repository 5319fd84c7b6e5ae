//! Input loading module
//! Reads the raw ESCO tables and the per-project occupation extractions

pub mod esco_tables;
pub mod occupations;

pub use occupations::{load_project_occupations, ExtractedOccupation};
