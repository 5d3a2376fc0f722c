// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Every failure the ingestion and normalization pipeline can report.
///
/// Directory-level and history-schema errors abort a run before anything is
/// written. The per-file variants (see [`PipelineError::is_per_file`]) are
/// isolated by the merger: the offending extract is excluded and the run
/// carries on with the rest.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("raw directory not found: {}", .path.display())]
    RawDirectoryMissing { path: PathBuf },

    #[error("no *.{extension} files found in {}", .path.display())]
    NoRawFiles { path: PathBuf, extension: String },

    #[error("date not found in {filename}")]
    DateNotFound { filename: String },

    #[error("date token `{token}` in {filename} is not a calendar date")]
    InvalidDate { filename: String, token: String },

    #[error("processed history {} is malformed: {reason}", .path.display())]
    MalformedProcessedHistory { path: PathBuf, reason: String },

    #[error("processed history not found: {}", .path.display())]
    ProcessedHistoryMissing { path: PathBuf },

    #[error("could not read raw file {}: {reason}", .path.display())]
    UnreadableRawFile { path: PathBuf, reason: String },

    #[error("failed to write {}: {reason}", .path.display())]
    WriteFailure { path: PathBuf, reason: String },

    #[error("processed history {} is locked by another run", .path.display())]
    HistoryLocked { path: PathBuf },

    #[error("invalid column mapping: {0}")]
    InvalidColumnMapping(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// True for failures confined to a single raw extract.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            PipelineError::DateNotFound { .. }
                | PipelineError::InvalidDate { .. }
                | PipelineError::UnreadableRawFile { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
