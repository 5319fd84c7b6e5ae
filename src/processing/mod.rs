//! Taxonomy preparation, embedding, and matching

pub mod text_composer;
pub mod taxonomy;
pub mod embeddings;
pub mod embedding_manager;
pub mod matcher;
pub mod pipeline;
