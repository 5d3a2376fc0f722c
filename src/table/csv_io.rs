use anyhow::{bail, Context, Result};
use arrow::{
    compute::concat_batches,
    csv::{ReaderBuilder, WriterBuilder},
    record_batch::RecordBatch,
};
use std::{fs::File, path::Path};
use tracing::debug;

use super::{utf8_schema, write_atomic};

const BATCH_SIZE: usize = 8192;

/// Reads a headed CSV file into a single all-Utf8 batch.
///
/// Short records are padded with nulls; empty fields are read as null.
pub fn read_csv(path: &Path) -> Result<RecordBatch> {
    // 1) header row via the csv crate, so every column is read as text
    let headers: Vec<String> = {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("opening {}", path.display()))?;
        rdr.headers()
            .with_context(|| format!("reading header of {}", path.display()))?
            .iter()
            .map(str::to_string)
            .collect()
    };
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        bail!("{} has no header row", path.display());
    }
    let schema = utf8_schema(&headers);

    // 2) body via the arrow reader
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .with_truncated_rows(true)
        .with_batch_size(BATCH_SIZE)
        .build(file)
        .with_context(|| format!("building CSV reader for {}", path.display()))?;

    let batches = reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("parsing {}", path.display()))?;
    let batch = concat_batches(&schema, &batches)
        .with_context(|| format!("assembling {}", path.display()))?;

    debug!(
        path = %path.display(),
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        "read csv"
    );
    Ok(batch)
}

/// Writes `batch` with a header row, replacing `path` atomically.
pub fn write_csv_atomic(path: &Path, batch: &RecordBatch) -> Result<()> {
    write_atomic(path, |out| {
        let mut writer = WriterBuilder::new().with_header(true).build(out);
        writer
            .write(batch)
            .with_context(|| format!("encoding CSV for {}", path.display()))?;
        Ok(())
    })?;
    debug!(
        path = %path.display(),
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        "wrote csv"
    );
    Ok(())
}
