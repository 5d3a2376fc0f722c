// Shared fixtures for unit tests.

use anyhow::Result;
use std::{
    fs,
    path::{Path, PathBuf},
};
use rust_xlsxwriter::Workbook;
use tempfile::TempDir;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::PipelineConfig;

pub fn init_test_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,subledger=debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// A throwaway data root with an empty `raw/` directory and CSV intake.
pub struct TestRoot {
    _dir: TempDir,
    pub config: PipelineConfig,
}

impl TestRoot {
    pub fn new() -> Result<Self> {
        Self::with_extension("csv")
    }

    pub fn with_extension(extension: &str) -> Result<Self> {
        let dir = TempDir::new()?;
        let mut config = PipelineConfig::with_root(dir.path());
        config.raw_extension = extension.into();
        fs::create_dir_all(&config.raw_dir)?;
        Ok(Self { _dir: dir, config })
    }

    pub fn raw(&self) -> PathBuf {
        self.config.raw_dir.clone()
    }
}

/// Writes a CSV extract whose cell at (row r, header h) reads `h-r`.
pub fn write_extract(dir: &Path, name: &str, headers: &[&str], rows: usize) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut w = csv::Writer::from_path(&path)?;
    w.write_record(headers)?;
    for r in 0..rows {
        w.write_record(headers.iter().map(|h| format!("{}-{}", h, r)))?;
    }
    w.flush()?;
    Ok(path)
}

/// Writes an `.xlsx` extract shaped like [`write_extract`]. Headers that
/// parse as numbers are stored as numeric cells, as legacy exports do.
pub fn write_workbook(dir: &Path, name: &str, headers: &[&str], rows: usize) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (c, h) in headers.iter().enumerate() {
        let col = u16::try_from(c)?;
        match h.parse::<f64>() {
            Ok(n) => sheet.write_number(0, col, n)?,
            Err(_) => sheet.write_string(0, col, *h)?,
        };
        for r in 0..rows {
            sheet.write_string(u32::try_from(r + 1)?, col, format!("{}-{}", h, r))?;
        }
    }
    workbook.save(&path)?;
    Ok(path)
}

/// Writes raw CSV text (header line included) to `dir/name`.
pub fn write_text(dir: &Path, name: &str, text: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, text)?;
    Ok(path)
}
