// src/merge.rs

use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use serde::Serialize;
use std::{collections::BTreeSet, path::Path};
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::history::{format_dates, HistoryLock, ProcessedHistory, DATE_FORMAT};
use crate::intake::{extract_date, loader_for, scan_raw_dir, ExtractEncoding, RawLoader};
use crate::table::{union_concat, with_leading_column, write_csv_atomic};

/// A raw extract whose date was new and whose rows were appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbsorbedFile {
    pub file: String,
    pub date: NaiveDate,
    pub rows: usize,
    pub encoding: ExtractEncoding,
}

/// A raw extract left unread because its date is already in the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub date: NaiveDate,
}

/// A raw extract that failed and was left out of this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedFile {
    pub file: String,
    pub reason: String,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub absorbed: Vec<AbsorbedFile>,
    pub skipped: Vec<SkippedFile>,
    pub excluded: Vec<ExcludedFile>,
    /// Rows appended by this run.
    pub new_rows: usize,
    /// Shape of the history after this run.
    pub history_rows: usize,
    pub history_columns: usize,
    /// Whether the history file was rewritten.
    pub written: bool,
}

impl MergeReport {
    pub fn absorbed_dates(&self) -> BTreeSet<NaiveDate> {
        self.absorbed.iter().map(|a| a.date).collect()
    }

    fn log(&self) {
        if !self.skipped.is_empty() {
            let names: Vec<&str> = self.skipped.iter().map(|s| s.file.as_str()).collect();
            info!("Skipped already processed files: {:?}", names);
        }
        for x in &self.excluded {
            warn!(file = %x.file, "excluded: {}", x.reason);
        }
        if !self.absorbed.is_empty() {
            info!("Absorbed new dates: {}", format_dates(&self.absorbed_dates()));
        }
        info!(
            absorbed = self.absorbed.len(),
            skipped = self.skipped.len(),
            excluded = self.excluded.len(),
            new_rows = self.new_rows,
            history_rows = self.history_rows,
            history_columns = self.history_columns,
            "ingest finished"
        );
    }
}

enum FileOutcome {
    Skipped(NaiveDate),
    Absorbed {
        date: NaiveDate,
        batch: RecordBatch,
        encoding: ExtractEncoding,
    },
}

/// Appends every not-yet-seen raw extract to the processed history.
pub struct IncrementalMerger<'a> {
    config: &'a PipelineConfig,
    loader: Box<dyn RawLoader>,
}

impl<'a> IncrementalMerger<'a> {
    pub fn new(config: &'a PipelineConfig) -> Result<Self> {
        let loader = loader_for(&config.raw_extension)?;
        Ok(Self { config, loader })
    }

    pub fn with_loader(config: &'a PipelineConfig, loader: Box<dyn RawLoader>) -> Self {
        Self { config, loader }
    }

    /// Runs one read-merge-write cycle against the configured history.
    ///
    /// Directory, lock, and history-schema failures abort before anything is
    /// written. Failures of individual files are recorded in the report.
    #[tracing::instrument(level = "info", skip(self), fields(raw = %self.config.raw_dir.display()))]
    pub fn run(&self) -> Result<MergeReport> {
        let cfg = self.config;

        // 1) exclusive access for the whole read-merge-write
        let _lock = HistoryLock::acquire(&cfg.lock_path())?;

        // 2) discover raw files
        let raw_files = scan_raw_dir(&cfg.raw_dir, &cfg.raw_extension)?;

        // 3) load history to skip processed dates
        let history = ProcessedHistory::load(&cfg.history_path, &cfg.date_column)?;
        let mut known: BTreeSet<NaiveDate> = history.known_dates().clone();

        // 4) absorb each new file, isolating failures
        let mut report = MergeReport::default();
        let mut new_batches: Vec<RecordBatch> = Vec::new();
        for path in &raw_files {
            let name = file_name(path);
            match self.absorb_file(path, &name, &known) {
                Ok(FileOutcome::Skipped(date)) => {
                    info!(file = %name, date = %date, "already processed; skipping");
                    report.skipped.push(SkippedFile { file: name, date });
                }
                Ok(FileOutcome::Absorbed {
                    date,
                    batch,
                    encoding,
                }) => {
                    info!(file = %name, date = %date, rows = batch.num_rows(), %encoding, "loaded new extract");
                    known.insert(date);
                    report.absorbed.push(AbsorbedFile {
                        file: name,
                        date,
                        rows: batch.num_rows(),
                        encoding,
                    });
                    report.new_rows += batch.num_rows();
                    new_batches.push(batch);
                }
                Err(e) => {
                    error!("Error processing file {} : {}", name, e);
                    report.excluded.push(ExcludedFile {
                        file: name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // 5) nothing new: leave the history as it is
        if new_batches.is_empty() {
            info!("No new data found. All data files were previously processed");
            report.history_rows = history.num_rows();
            report.history_columns = history.num_columns();
            report.log();
            return Ok(report);
        }

        // 6) history ++ new block, then replace the file
        let write_failure = |e: anyhow::Error| PipelineError::WriteFailure {
            path: cfg.history_path.clone(),
            reason: format!("{:#}", e),
        };
        let combined_new = union_concat(&new_batches).map_err(write_failure)?;
        let final_table = match history.into_table() {
            Some(existing) => union_concat(&[existing, combined_new]).map_err(write_failure)?,
            None => combined_new,
        };
        write_csv_atomic(&cfg.history_path, &final_table).map_err(write_failure)?;
        info!("Processed data saved to {}", cfg.history_path.display());

        report.written = true;
        report.history_rows = final_table.num_rows();
        report.history_columns = final_table.num_columns();
        report.log();
        Ok(report)
    }

    fn absorb_file(
        &self,
        path: &Path,
        name: &str,
        known: &BTreeSet<NaiveDate>,
    ) -> Result<FileOutcome> {
        let date = extract_date(name)?;
        if known.contains(&date) {
            return Ok(FileOutcome::Skipped(date));
        }

        let unreadable = |reason: String| PipelineError::UnreadableRawFile {
            path: path.to_path_buf(),
            reason,
        };

        let batch = self
            .loader
            .load(path)
            .map_err(|e| unreadable(format!("{:#}", e)))?;
        if batch.num_rows() == 0 {
            return Err(unreadable("extract has no data rows".into()));
        }
        let encoding = ExtractEncoding::detect(&batch.schema(), &self.config.columns);
        if encoding == ExtractEncoding::Unknown {
            warn!(file = %name, "no legacy or canonical columns found in extract");
        }

        let date_text = date.format(DATE_FORMAT).to_string();
        let batch = with_leading_column(&batch, &self.config.date_column, &date_text)
            .map_err(|e| unreadable(format!("{:#}", e)))?;

        Ok(FileOutcome::Absorbed {
            date,
            batch,
            encoding,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
