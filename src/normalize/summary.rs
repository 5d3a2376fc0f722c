use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::config::ColumnMapping;

use super::record::SubscriptionRecord;

/// Non-null coverage of one clean column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnCoverage {
    pub name: String,
    pub non_null: usize,
    pub percent: f64,
}

/// Observational statistics about the clean canonical table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanSummary {
    pub rows: usize,
    pub columns: usize,
    pub legacy_rows: usize,
    pub named_rows: usize,
    pub dropped_empty_rows: usize,
    pub coverage: Vec<ColumnCoverage>,
    pub rows_per_date: BTreeMap<NaiveDate, usize>,
}

impl CleanSummary {
    pub fn compute(
        records: &[SubscriptionRecord],
        mapping: &ColumnMapping,
        date_column: &str,
        legacy_rows: usize,
        named_rows: usize,
        dropped_empty_rows: usize,
    ) -> Self {
        let rows = records.len();
        let pct = |n: usize| {
            if rows == 0 {
                0.0
            } else {
                n as f64 / rows as f64 * 100.0
            }
        };

        let mut coverage = Vec::with_capacity(mapping.len() + 1);
        coverage.push(ColumnCoverage {
            name: date_column.to_string(),
            non_null: rows,
            percent: pct(rows),
        });
        for (i, name) in mapping.names().enumerate() {
            let non_null = records
                .iter()
                .filter(|r| r.fields.get(i).map_or(false, Option::is_some))
                .count();
            coverage.push(ColumnCoverage {
                name: name.to_string(),
                non_null,
                percent: pct(non_null),
            });
        }

        let mut rows_per_date = BTreeMap::new();
        for r in records {
            *rows_per_date.entry(r.extract_date).or_insert(0) += 1;
        }

        Self {
            rows,
            columns: mapping.len() + 1,
            legacy_rows,
            named_rows,
            dropped_empty_rows,
            coverage,
            rows_per_date,
        }
    }

    pub fn log(&self) {
        info!(
            rows = self.rows,
            columns = self.columns,
            legacy_rows = self.legacy_rows,
            named_rows = self.named_rows,
            dropped_empty_rows = self.dropped_empty_rows,
            "data cleaning summary"
        );
        for (i, c) in self.coverage.iter().enumerate() {
            info!(
                "{:2}. {:25} - {} non-null values ({:.1}%)",
                i + 1,
                c.name,
                c.non_null,
                c.percent
            );
        }
        for (date, n) in &self.rows_per_date {
            info!(date = %date, rows = n, "rows by extract date");
        }
    }
}
