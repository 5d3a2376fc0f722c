//! Incremental ingestion of subscription-list extracts into a processed
//! history, and normalization of that history into one canonical table.

pub mod config;
pub mod error;
pub mod export;
pub mod history;
pub mod intake;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod table;

#[cfg(test)]
mod test_support;

pub use config::{ColumnMapping, ColumnPair, PipelineConfig};
pub use error::PipelineError;
pub use merge::{IncrementalMerger, MergeReport};
pub use normalize::{CleanSummary, SchemaNormalizer};
pub use pipeline::{run, RunSummary};
