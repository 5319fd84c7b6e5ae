//! Result files and atomic writes

pub mod atomic;
pub mod serializer;

pub use serializer::{OutputLayout, ResultSerializer, ResultsTable};
