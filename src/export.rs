// src/export.rs

use anyhow::{Context, Result};
use arrow::{
    array::ArrayRef,
    compute::cast,
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{path::Path, sync::Arc};
use tracing::debug;

use crate::table::write_atomic;

/// Writes the clean table as Parquet, with the extraction date typed as `Date32`.
pub fn write_clean_parquet(path: &Path, clean: &RecordBatch, date_column: &str) -> Result<()> {
    let schema = clean.schema();
    let mut fields: Vec<Field> = Vec::with_capacity(schema.fields().len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for (field, col) in schema.fields().iter().zip(clean.columns()) {
        if field.name() == date_column {
            let dates = cast(col, &DataType::Date32)
                .with_context(|| format!("casting `{}` to dates", date_column))?;
            fields.push(Field::new(field.name(), DataType::Date32, true));
            columns.push(dates);
        } else {
            fields.push(field.as_ref().clone());
            columns.push(col.clone());
        }
    }
    let typed_schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(typed_schema.clone(), columns)
        .context("building typed batch for parquet")?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    write_atomic(path, |out| {
        let mut writer = ArrowWriter::try_new(out, typed_schema, Some(props))
            .context("creating Arrow writer for clean export")?;
        writer.write(&batch).context("writing clean batch")?;
        writer.close().context("closing clean writer")?;
        Ok(())
    })?;

    debug!(path = %path.display(), rows = batch.num_rows(), "wrote parquet");
    Ok(())
}
