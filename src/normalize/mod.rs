// src/normalize/mod.rs
//
// Folds the legacy numeric columns ("0".."14") of the processed history into
// the canonical named columns and writes the clean 16-column table.

use arrow::{
    array::{ArrayRef, StringArray},
    record_batch::RecordBatch,
};
use chrono::NaiveDate;
use std::{path::Path, sync::Arc};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::export::write_clean_parquet;
use crate::history::{ProcessedHistory, DATE_FORMAT};
use crate::table::{cell, string_column, utf8_schema, write_csv_atomic};

pub mod record;
pub mod summary;

pub use record::{CanonicalColumns, SourceRow, SubscriptionRecord};
pub use summary::{CleanSummary, ColumnCoverage};

/// History rows mapped into the canonical schema.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub records: Vec<SubscriptionRecord>,
    pub legacy_rows: usize,
    pub named_rows: usize,
    pub dropped_empty_rows: usize,
}

pub struct SchemaNormalizer<'a> {
    config: &'a PipelineConfig,
}

impl<'a> SchemaNormalizer<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Reads the processed history, writes the clean table, and summarizes it.
    #[tracing::instrument(level = "info", skip(self), fields(history = %self.config.history_path.display()))]
    pub fn run(&self) -> Result<CleanSummary> {
        let cfg = self.config;
        info!("Starting column standardization...");

        let history = ProcessedHistory::require(&cfg.history_path, &cfg.date_column)?;
        let table = history
            .into_table()
            .ok_or_else(|| PipelineError::ProcessedHistoryMissing {
                path: cfg.history_path.clone(),
            })?;
        info!(
            "Loaded {} rows and {} columns",
            table.num_rows(),
            table.num_columns()
        );

        let normalized = self.normalize(&table, &cfg.history_path)?;
        info!("Rows with numbered columns: {}", normalized.legacy_rows);
        info!("Rows with named columns: {}", normalized.named_rows);
        if normalized.dropped_empty_rows > 0 {
            info!("Dropped {} rows with no business data", normalized.dropped_empty_rows);
        }

        let clean = self.to_batch(&normalized.records)?;
        let write_failure = |path: &Path, e: anyhow::Error| PipelineError::WriteFailure {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        };
        write_csv_atomic(&cfg.clean_path, &clean).map_err(|e| write_failure(&cfg.clean_path, e))?;
        info!("Clean data saved to {}", cfg.clean_path.display());

        if let Some(pq) = &cfg.parquet_path {
            write_clean_parquet(pq, &clean, &cfg.date_column).map_err(|e| write_failure(pq, e))?;
            info!("Clean data exported to {}", pq.display());
        }

        let summary = CleanSummary::compute(
            &normalized.records,
            &cfg.columns,
            &cfg.date_column,
            normalized.legacy_rows,
            normalized.named_rows,
            normalized.dropped_empty_rows,
        );
        summary.log();
        Ok(summary)
    }

    /// Coalesces every history row into the canonical schema.
    ///
    /// Rows with no value in any business column are dropped.
    pub fn normalize(&self, table: &RecordBatch, source: &Path) -> Result<Normalized> {
        let cfg = self.config;
        let malformed = |reason: String| PipelineError::MalformedProcessedHistory {
            path: source.to_path_buf(),
            reason,
        };

        let dates = string_column(table, &cfg.date_column).ok_or_else(|| {
            malformed(format!("Processed file must contain {} column", cfg.date_column))
        })?;
        let columns = CanonicalColumns::resolve(table, &cfg.columns);
        if !columns.has_legacy() {
            debug!("history carries no legacy numeric columns");
        }

        let mut out = Normalized::default();
        for i in 0..table.num_rows() {
            let raw_date = cell(dates, i)
                .ok_or_else(|| malformed(format!("row {} has no {}", i + 1, cfg.date_column)))?;
            let extract_date = NaiveDate::parse_from_str(raw_date.trim(), DATE_FORMAT)
                .map_err(|_| malformed(format!("row {} has unparseable date `{}`", i + 1, raw_date)))?;

            let row = columns.row(i);
            let legacy = row.is_legacy();
            let record = SubscriptionRecord {
                extract_date,
                fields: row.into_fields(),
            };
            if record.is_blank() {
                out.dropped_empty_rows += 1;
                continue;
            }
            if legacy {
                out.legacy_rows += 1;
            } else {
                out.named_rows += 1;
            }
            out.records.push(record);
        }
        Ok(out)
    }

    /// Lays records out as the clean table: date column, then mapping order.
    pub fn to_batch(&self, records: &[SubscriptionRecord]) -> Result<RecordBatch> {
        let cfg = self.config;
        let mut headers: Vec<&str> = Vec::with_capacity(cfg.columns.len() + 1);
        headers.push(&cfg.date_column);
        headers.extend(cfg.columns.names());

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(headers.len());
        columns.push(Arc::new(
            records
                .iter()
                .map(|r| Some(r.extract_date.format(DATE_FORMAT).to_string()))
                .collect::<StringArray>(),
        ));
        for i in 0..cfg.columns.len() {
            columns.push(Arc::new(
                records
                    .iter()
                    .map(|r| r.fields.get(i).cloned().flatten())
                    .collect::<StringArray>(),
            ));
        }

        RecordBatch::try_new(utf8_schema(&headers), columns).map_err(|e| {
            PipelineError::WriteFailure {
                path: cfg.clean_path.clone(),
                reason: e.to_string(),
            }
        })
    }
}
