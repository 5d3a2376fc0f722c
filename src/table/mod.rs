// src/table/mod.rs
//
// Tables are Arrow `RecordBatch`es whose columns are all nullable Utf8.
// An empty cell is a null.

use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::{new_null_array, Array, ArrayRef, StringArray},
    compute::{cast, concat_batches},
    datatypes::{DataType, Field, FieldRef, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use std::{
    collections::HashSet,
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
    sync::Arc,
};

pub mod csv_io;

pub use csv_io::{read_csv, write_csv_atomic};

/// Builds an all-Utf8 schema. A blank header at position `i` is named
/// `Unnamed: i`; repeated names get `.1`, `.2`, … suffixes.
pub fn utf8_schema<S: AsRef<str>>(headers: &[S]) -> SchemaRef {
    let mut seen: HashSet<String> = HashSet::new();
    let mut fields: Vec<Field> = Vec::with_capacity(headers.len());
    for (i, h) in headers.iter().enumerate() {
        let base = match h.as_ref().trim() {
            "" => format!("Unnamed: {}", i),
            name => name.to_string(),
        };
        let mut name = base.clone();
        let mut n = 0;
        while !seen.insert(name.clone()) {
            n += 1;
            name = format!("{}.{}", base, n);
        }
        fields.push(Field::new(name, DataType::Utf8, true));
    }
    Arc::new(Schema::new(fields))
}

/// Returns the Utf8 column called `name`, if present.
pub fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
}

/// The value at `row`, treating null and empty strings alike as absent.
pub fn cell(arr: &StringArray, row: usize) -> Option<&str> {
    if arr.is_null(row) {
        return None;
    }
    let v = arr.value(row);
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

/// Returns a copy of `batch` with a constant `name = value` column in front.
pub fn with_leading_column(batch: &RecordBatch, name: &str, value: &str) -> Result<RecordBatch> {
    if batch.schema().column_with_name(name).is_some() {
        bail!("table already has a `{}` column", name);
    }

    let mut fields: Vec<FieldRef> = Vec::with_capacity(batch.num_columns() + 1);
    fields.push(Arc::new(Field::new(name, DataType::Utf8, true)));
    fields.extend(batch.schema().fields().iter().cloned());

    let leading: ArrayRef = Arc::new(StringArray::from(vec![value; batch.num_rows()]));
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns() + 1);
    columns.push(leading);
    columns.extend(batch.columns().iter().cloned());

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .with_context(|| format!("prepending `{}` column", name))
}

/// Stacks `batches` vertically under the union of their column names.
///
/// Columns keep first-seen order; a batch lacking a column contributes nulls.
pub fn union_concat(batches: &[RecordBatch]) -> Result<RecordBatch> {
    if batches.is_empty() {
        bail!("nothing to concatenate");
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut fields: Vec<Field> = Vec::new();
    for b in batches {
        for f in b.schema().fields() {
            if seen.insert(f.name().clone()) {
                fields.push(Field::new(f.name(), DataType::Utf8, true));
            }
        }
    }
    let schema = Arc::new(Schema::new(fields));

    let aligned = batches
        .iter()
        .map(|b| align_to(b, &schema))
        .collect::<Result<Vec<_>>>()?;

    concat_batches(&schema, &aligned).context("concatenating aligned batches")
}

/// Reorders and pads `batch` so it has exactly the columns of `schema`.
fn align_to(batch: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch> {
    let rows = batch.num_rows();
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let col = match batch.column_by_name(field.name()) {
            Some(c) if c.data_type() == &DataType::Utf8 => c.clone(),
            Some(c) => cast(c, &DataType::Utf8)
                .with_context(|| format!("casting `{}` to text", field.name()))?,
            None => new_null_array(&DataType::Utf8, rows),
        };
        columns.push(col);
    }
    RecordBatch::try_new(schema.clone(), columns).context("aligning batch to union schema")
}

/// Writes through `write` into a temp file beside `path`, then renames it over `path`.
///
/// Nothing at `path` changes unless every step succeeds; the temp file is
/// removed on failure.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<()>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("{} has no file name", path.display()))?;
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("creating temp file in {}", parent.display()))?;

    {
        let mut buf = BufWriter::new(tmp.as_file_mut());
        write(&mut buf)?;
        buf.flush().context("flushing temp file")?;
    }
    tmp.as_file().sync_all().context("syncing temp file")?;

    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("renaming temp file to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(headers: &[&str], rows: &[&[Option<&str>]]) -> RecordBatch {
        let schema = utf8_schema(headers);
        let columns: Vec<ArrayRef> = (0..headers.len())
            .map(|i| {
                Arc::new(rows.iter().map(|r| r[i]).collect::<StringArray>()) as ArrayRef
            })
            .collect();
        RecordBatch::try_new(schema, columns).unwrap()
    }

    #[test]
    fn duplicate_headers_get_suffixes() {
        let schema = utf8_schema(&["City", "City", " Zip ", "City"]);
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec!["City", "City.1", "Zip", "City.2"]);
    }

    #[test]
    fn blank_headers_are_named_by_position() {
        let schema = utf8_schema(&["0", "", "2", " ", ""]);
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec!["0", "Unnamed: 1", "2", "Unnamed: 3", "Unnamed: 4"]);
    }

    #[test]
    fn leading_column_is_constant_and_first() {
        let b = batch(&["0", "7"], &[&[Some("Sun Journal"), Some("Lewiston")], &[None, None]]);
        let out = with_leading_column(&b, "date_of_extract", "2024-01-21").unwrap();
        assert_eq!(out.schema().field(0).name(), "date_of_extract");
        assert_eq!(out.num_columns(), 3);
        let d = string_column(&out, "date_of_extract").unwrap();
        assert_eq!(d.value(0), "2024-01-21");
        assert_eq!(d.value(1), "2024-01-21");
        assert!(with_leading_column(&out, "date_of_extract", "x").is_err());
    }

    #[test]
    fn union_concat_pads_missing_columns() {
        let legacy = batch(&["date_of_extract", "0", "7"], &[&[Some("2024-01-21"), Some("Sun Journal"), Some("Lewiston")]]);
        let named = batch(
            &["date_of_extract", "Publication", "City"],
            &[
                &[Some("2024-01-28"), Some("Portland Press"), Some("Portland")],
                &[Some("2024-01-28"), Some("Kennebec Journal"), None],
            ],
        );
        let out = union_concat(&[legacy, named]).unwrap();
        assert_eq!(out.num_rows(), 3);
        let names: Vec<_> = out.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, vec!["date_of_extract", "0", "7", "Publication", "City"]);

        let zero = string_column(&out, "0").unwrap();
        assert_eq!(cell(zero, 0), Some("Sun Journal"));
        assert_eq!(cell(zero, 1), None);
        let city = string_column(&out, "City").unwrap();
        assert_eq!(cell(city, 0), None);
        assert_eq!(cell(city, 1), Some("Portland"));
        assert_eq!(cell(city, 2), None);
    }

    #[test]
    fn union_concat_rejects_empty_input() {
        assert!(union_concat(&[]).is_err());
    }

    #[test]
    fn failed_atomic_write_leaves_target_untouched() -> Result<()> {
        let tmp = tempfile::TempDir::new()?;
        let target = tmp.path().join("out.csv");
        fs::write(&target, "old")?;

        let res = write_atomic(&target, |w| {
            w.write_all(b"partial")?;
            bail!("boom")
        });
        assert!(res.is_err());
        assert_eq!(fs::read_to_string(&target)?, "old");
        let leftovers = fs::read_dir(tmp.path())?.count();
        assert_eq!(leftovers, 1);

        write_atomic(&target, |w| {
            w.write_all(b"new")?;
            Ok(())
        })?;
        assert_eq!(fs::read_to_string(&target)?, "new");
        Ok(())
    }
}
