// src/history/mod.rs

use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::table::{cell, read_csv, string_column};

pub mod lock;

pub use lock::HistoryLock;

/// Date format of the extraction-date column.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// The cumulative processed-history table, as found on disk at load time.
#[derive(Debug)]
pub struct ProcessedHistory {
    path: PathBuf,
    table: Option<RecordBatch>,
    dates: BTreeSet<NaiveDate>,
}

impl ProcessedHistory {
    /// Loads the history at `path`. A missing file is an empty history.
    pub fn load(path: &Path, date_column: &str) -> Result<Self> {
        if !path.exists() {
            info!("No processed file exists yet. All data files are new.");
            return Ok(Self {
                path: path.to_path_buf(),
                table: None,
                dates: BTreeSet::new(),
            });
        }

        let table = read_csv(path).map_err(|e| PipelineError::MalformedProcessedHistory {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        })?;
        let dates = collect_dates(path, &table, date_column)?;

        info!(
            rows = table.num_rows(),
            columns = table.num_columns(),
            "Data is already processed for {} dates: {}",
            dates.len(),
            format_dates(&dates)
        );
        Ok(Self {
            path: path.to_path_buf(),
            table: Some(table),
            dates,
        })
    }

    /// Loads the history at `path`, failing if it has never been written.
    pub fn require(path: &Path, date_column: &str) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::ProcessedHistoryMissing {
                path: path.to_path_buf(),
            });
        }
        Self::load(path, date_column)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.table.is_some()
    }

    pub fn known_dates(&self) -> &BTreeSet<NaiveDate> {
        &self.dates
    }

    pub fn table(&self) -> Option<&RecordBatch> {
        self.table.as_ref()
    }

    pub fn into_table(self) -> Option<RecordBatch> {
        self.table
    }

    pub fn num_rows(&self) -> usize {
        self.table.as_ref().map_or(0, RecordBatch::num_rows)
    }

    pub fn num_columns(&self) -> usize {
        self.table.as_ref().map_or(0, RecordBatch::num_columns)
    }
}

/// The distinct extraction dates already recorded at `path`.
pub fn load_processed_dates(path: &Path, date_column: &str) -> Result<BTreeSet<NaiveDate>> {
    Ok(ProcessedHistory::load(path, date_column)?.dates)
}

fn collect_dates(path: &Path, table: &RecordBatch, date_column: &str) -> Result<BTreeSet<NaiveDate>> {
    let malformed = |reason: String| PipelineError::MalformedProcessedHistory {
        path: path.to_path_buf(),
        reason,
    };

    let col = string_column(table, date_column).ok_or_else(|| {
        malformed(format!("Processed file must contain {} column", date_column))
    })?;

    let mut dates = BTreeSet::new();
    for row in 0..table.num_rows() {
        let raw = cell(col, row)
            .ok_or_else(|| malformed(format!("row {} has no {}", row + 1, date_column)))?;
        let date = NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| {
            malformed(format!("row {} has unparseable {} `{}`", row + 1, date_column, raw))
        })?;
        dates.insert(date);
    }
    Ok(dates)
}

pub(crate) fn format_dates<'a>(dates: impl IntoIterator<Item = &'a NaiveDate>) -> String {
    dates
        .into_iter()
        .map(|d| d.format(DATE_FORMAT).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
