use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{ArrayRef, StringArray},
    record_batch::RecordBatch,
};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{NaiveDateTime, NaiveTime};
use std::{path::Path, sync::Arc};
use tracing::debug;

use crate::error::{PipelineError, Result as PipelineResult};
use crate::table::{read_csv, utf8_schema};

/// Loads one raw extract into an all-Utf8 table, header row first.
pub trait RawLoader {
    fn load(&self, path: &Path) -> Result<RecordBatch>;
}

/// Reads the first worksheet of an `.xlsx`/`.xls`/`.ods` workbook.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpreadsheetLoader;

/// Reads a headed `.csv` extract.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvLoader;

/// Picks the loader for a configured raw-file extension.
pub fn loader_for(extension: &str) -> PipelineResult<Box<dyn RawLoader>> {
    match extension.to_ascii_lowercase().as_str() {
        "xlsx" | "xlsm" | "xls" | "ods" => Ok(Box::new(SpreadsheetLoader)),
        "csv" => Ok(Box::new(CsvLoader)),
        other => Err(PipelineError::Config(format!(
            "no loader for raw extension `{}`",
            other
        ))),
    }
}

impl RawLoader for CsvLoader {
    fn load(&self, path: &Path) -> Result<RecordBatch> {
        read_csv(path)
    }
}

impl RawLoader for SpreadsheetLoader {
    fn load(&self, path: &Path) -> Result<RecordBatch> {
        let mut workbook = open_workbook_auto(path)
            .with_context(|| format!("opening workbook {}", path.display()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| anyhow!("{} has no worksheets", path.display()))?
            .with_context(|| format!("reading first worksheet of {}", path.display()))?;

        let mut rows = range.rows();
        let header_row = rows
            .next()
            .ok_or_else(|| anyhow!("first worksheet of {} is empty", path.display()))?;
        let headers: Vec<String> = header_row
            .iter()
            .map(|c| render_cell(c).unwrap_or_default())
            .collect();

        let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
        let mut blank = 0usize;
        for row in rows {
            if is_blank_row(row) {
                blank += 1;
                continue;
            }
            for (i, col) in columns.iter_mut().enumerate() {
                col.push(row.get(i).and_then(render_cell));
            }
        }
        if blank > 0 {
            debug!(path = %path.display(), blank, "dropped blank worksheet rows");
        }

        let arrays: Vec<ArrayRef> = columns
            .into_iter()
            .map(|c| Arc::new(StringArray::from(c)) as ArrayRef)
            .collect();
        RecordBatch::try_new(utf8_schema(&headers), arrays)
            .with_context(|| format!("building table for {}", path.display()))
    }
}

/// Renders a worksheet cell the way it should appear in the CSV history.
///
/// Whole floats drop their fraction (`12345.0` → `12345`), so numeric legacy
/// headers come out as `0`..`14`.
pub fn render_cell(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(s.clone()),
        Data::Float(f) => Some(render_float(*f)),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
        Data::DateTime(dt) => Some(
            dt.as_datetime()
                .map(render_datetime)
                .unwrap_or_else(|| render_float(dt.as_f64())),
        ),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::Error(_) => None,
    }
}

/// True when no cell in `row` renders to a value.
fn is_blank_row(row: &[Data]) -> bool {
    row.iter().all(|c| render_cell(c).is_none())
}

fn render_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

fn render_datetime(dt: NaiveDateTime) -> String {
    if dt.time() == NaiveTime::MIN {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{cell, string_column};
    use calamine::CellErrorType;
    use rust_xlsxwriter::Workbook;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn renders_numbers_like_the_history_expects() {
        assert_eq!(render_cell(&Data::Float(0.0)).as_deref(), Some("0"));
        assert_eq!(render_cell(&Data::Float(14.0)).as_deref(), Some("14"));
        assert_eq!(render_cell(&Data::Float(1234567.0)).as_deref(), Some("1234567"));
        assert_eq!(render_cell(&Data::Float(12.5)).as_deref(), Some("12.5"));
        assert_eq!(render_cell(&Data::Int(42)).as_deref(), Some("42"));
    }

    #[test]
    fn renders_text_bools_and_blanks() {
        assert_eq!(render_cell(&Data::Empty), None);
        assert_eq!(render_cell(&Data::String(String::new())), None);
        assert_eq!(
            render_cell(&Data::String("Sun Journal".into())).as_deref(),
            Some("Sun Journal")
        );
        assert_eq!(render_cell(&Data::Bool(true)).as_deref(), Some("True"));
        assert_eq!(render_cell(&Data::Error(CellErrorType::NA)), None);
        assert_eq!(
            render_cell(&Data::DateTimeIso("2024-01-21T00:00:00".into())).as_deref(),
            Some("2024-01-21T00:00:00")
        );
    }

    #[test]
    fn rows_that_render_empty_are_blank() {
        assert!(is_blank_row(&[Data::Empty, Data::Empty]));
        assert!(is_blank_row(&[
            Data::String(String::new()),
            Data::Error(CellErrorType::Ref),
            Data::Empty,
        ]));
        assert!(!is_blank_row(&[Data::Empty, Data::Float(0.0)]));
    }

    #[test]
    fn datetimes_drop_midnight() {
        let midnight = NaiveDateTime::parse_from_str("2023-05-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let later = NaiveDateTime::parse_from_str("2023-05-01 07:30:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(render_datetime(midnight), "2023-05-01");
        assert_eq!(render_datetime(later), "2023-05-01 07:30:00");
    }

    #[test]
    fn loader_selection_by_extension() {
        assert!(loader_for("xlsx").is_ok());
        assert!(loader_for("XLSX").is_ok());
        assert!(loader_for("csv").is_ok());
        assert!(matches!(loader_for("pdf"), Err(PipelineError::Config(_))));
    }

    #[test]
    fn reads_a_legacy_workbook() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("sublist1.21.24.xlsx");
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        // headers 0, 1, <blank>, 3 stored as numbers
        for col in [0u16, 1, 3] {
            sheet.write_number(0, col, f64::from(col))?;
        }
        sheet.write_string(1, 0, "Sun Journal")?;
        sheet.write_number(1, 1, 4240.0)?;
        sheet.write_string(1, 2, "note")?;
        sheet.write_number(1, 3, 12.5)?;
        // row 2 left blank
        sheet.write_string(3, 0, "Press Herald")?;
        sheet.write_number(3, 1, 4101.0)?;
        sheet.write_boolean(3, 3, true)?;
        workbook.save(&path)?;

        let batch = SpreadsheetLoader.load(&path)?;
        let names: Vec<_> = batch.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec!["0", "1", "Unnamed: 2", "3"]);
        assert_eq!(batch.num_rows(), 2);

        let zip = string_column(&batch, "1").unwrap();
        assert_eq!(cell(zip, 0), Some("4240"));
        assert_eq!(cell(zip, 1), Some("4101"));
        let note = string_column(&batch, "Unnamed: 2").unwrap();
        assert_eq!(cell(note, 0), Some("note"));
        assert_eq!(cell(note, 1), None);
        let last = string_column(&batch, "3").unwrap();
        assert_eq!(cell(last, 0), Some("12.5"));
        assert_eq!(cell(last, 1), Some("True"));
        Ok(())
    }

    #[test]
    fn spreadsheet_loader_rejects_non_workbooks() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("sublist1.21.24.xlsx");
        fs::write(&path, "not a zip archive")?;
        assert!(SpreadsheetLoader.load(&path).is_err());
        Ok(())
    }
}
