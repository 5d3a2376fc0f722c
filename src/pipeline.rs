// src/pipeline.rs

use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::merge::{IncrementalMerger, MergeReport};
use crate::normalize::{CleanSummary, SchemaNormalizer};

/// What one end-to-end run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub merge: MergeReport,
    /// `None` when there is still no history to normalize.
    pub clean: Option<CleanSummary>,
}

/// Ingests new raw extracts, then rebuilds the clean canonical table.
pub fn run(config: &PipelineConfig) -> Result<RunSummary> {
    config.validate()?;

    let merge = IncrementalMerger::new(config)?.run()?;

    let clean = if config.history_path.exists() {
        Some(SchemaNormalizer::new(config).run()?)
    } else {
        info!("no processed history yet; skipping normalization");
        None
    };

    Ok(RunSummary { merge, clean })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{cell, read_csv, string_column};
    use crate::test_support::{init_test_logging, write_extract, write_text, TestRoot};
    use chrono::NaiveDate;

    #[test]
    fn two_runs_over_mixed_generations() -> anyhow::Result<()> {
        init_test_logging();
        let root = TestRoot::new()?;
        let legacy_headers: Vec<String> = (0..15).map(|i| i.to_string()).collect();
        let legacy_refs: Vec<&str> = legacy_headers.iter().map(String::as_str).collect();
        write_extract(&root.raw(), "sublist1.21.24.csv", &legacy_refs, 5)?;
        write_extract(&root.raw(), "sublist1.28.24.csv", &["Publication", "AccoutID", "City"], 4)?;

        let first = run(&root.config)?;
        assert_eq!(first.merge.history_rows, 9);
        let clean = first.clean.expect("clean summary");
        assert_eq!(clean.rows, 9);
        assert_eq!(clean.legacy_rows, 5);
        assert_eq!(clean.named_rows, 4);
        let d1 = NaiveDate::from_ymd_opt(2024, 1, 21).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 1, 28).unwrap();
        assert_eq!(clean.rows_per_date.get(&d1), Some(&5));
        assert_eq!(clean.rows_per_date.get(&d2), Some(&4));

        let table = read_csv(&root.config.clean_path)?;
        assert_eq!(table.num_columns(), 16);
        let city = string_column(&table, "City").unwrap();
        // legacy "7" column feeds City
        assert_eq!(cell(city, 0), Some("7-0"));
        assert_eq!(cell(city, 5), Some("City-0"));

        let second = run(&root.config)?;
        assert_eq!(second.merge.new_rows, 0);
        assert!(!second.merge.written);
        assert_eq!(second.clean.map(|c| c.rows), Some(9));
        Ok(())
    }

    #[test]
    fn existing_history_only_takes_the_new_date() -> anyhow::Result<()> {
        let root = TestRoot::new()?;
        let dir = root.config.history_path.parent().unwrap().to_path_buf();
        write_text(
            &dir,
            "processed_data.csv",
            "date_of_extract,Publication,City\n2024-01-21,Sun Journal,Lewiston\n2024-01-21,Sun Journal,Auburn\n",
        )?;
        write_extract(&root.raw(), "sublist1.21.24.csv", &["Publication", "City"], 5)?;
        write_extract(&root.raw(), "sublist1.28.24.csv", &["Publication", "City"], 4)?;

        let summary = run(&root.config)?;
        assert_eq!(summary.merge.skipped.len(), 1);
        assert_eq!(summary.merge.skipped[0].file, "sublist1.21.24.csv");
        assert_eq!(summary.merge.absorbed.len(), 1);
        assert_eq!(summary.merge.history_rows, 2 + 4);
        Ok(())
    }

    #[test]
    fn nothing_ingestible_leaves_no_artifacts() -> anyhow::Result<()> {
        let root = TestRoot::new()?;
        write_extract(&root.raw(), "sublist_undated.csv", &["City"], 3)?;
        let summary = run(&root.config)?;
        assert_eq!(summary.merge.excluded.len(), 1);
        assert!(summary.clean.is_none());
        assert!(!root.config.history_path.exists());
        assert!(!root.config.clean_path.exists());
        Ok(())
    }
}
