// src/config.rs

use serde::Deserialize;
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use crate::error::{PipelineError, Result};

/// Identifier → canonical name pairs used by the legacy (numeric header) extracts.
const DEFAULT_COLUMNS: [(&str, &str); 15] = [
    ("0", "Publication"),
    ("1", "AccoutID"),
    ("2", "Status"),
    ("3", "Bill Method"),
    ("4", "Dist ID"),
    ("5", "Route ID"),
    ("6", "Day pattern"),
    ("7", "City"),
    ("8", "State"),
    ("9", "Zip"),
    ("10", "Rate Code"),
    ("11", "LastStartDate"),
    ("12", "OriginalStartDate"),
    ("13", "OccupantID"),
    ("14", "RouteType ID"),
];

/// One legacy identifier and the canonical field it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnPair {
    pub id: String,
    pub name: String,
}

/// Ordered bijection between legacy identifiers and canonical field names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pairs: Vec<ColumnPair>,
}

impl ColumnMapping {
    pub fn new(pairs: Vec<ColumnPair>) -> Result<Self> {
        if pairs.is_empty() {
            return Err(PipelineError::InvalidColumnMapping(
                "mapping has no columns".into(),
            ));
        }
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for p in &pairs {
            if !ids.insert(p.id.as_str()) {
                return Err(PipelineError::InvalidColumnMapping(format!(
                    "identifier `{}` mapped twice",
                    p.id
                )));
            }
            if !names.insert(p.name.as_str()) {
                return Err(PipelineError::InvalidColumnMapping(format!(
                    "name `{}` mapped twice",
                    p.name
                )));
            }
            if ids.contains(p.name.as_str()) || names.contains(p.id.as_str()) {
                return Err(PipelineError::InvalidColumnMapping(format!(
                    "`{}` is used both as identifier and name",
                    if ids.contains(p.name.as_str()) { &p.name } else { &p.id }
                )));
            }
        }
        Ok(Self { pairs })
    }

    pub fn pairs(&self) -> &[ColumnPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|p| p.id.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|p| p.name.as_str())
    }
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            pairs: DEFAULT_COLUMNS
                .iter()
                .map(|(id, name)| ColumnPair {
                    id: (*id).to_string(),
                    name: (*name).to_string(),
                })
                .collect(),
        }
    }
}

/// Paths and schema settings shared by every pipeline component.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub raw_dir: PathBuf,
    pub raw_extension: String,
    pub history_path: PathBuf,
    pub clean_path: PathBuf,
    pub parquet_path: Option<PathBuf>,
    pub date_column: String,
    pub columns: ColumnMapping,
}

/// On-disk shape of the TOML config; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    data_root: Option<PathBuf>,
    raw_dir: Option<PathBuf>,
    raw_extension: Option<String>,
    history_path: Option<PathBuf>,
    clean_path: Option<PathBuf>,
    parquet_path: Option<PathBuf>,
    date_column: Option<String>,
    columns: Option<Vec<ColumnPair>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_root("data")
    }
}

impl PipelineConfig {
    /// Lay out the standard `raw/` + `processed/` tree under `root`.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let processed = root.join("processed");
        Self {
            raw_dir: root.join("raw"),
            raw_extension: "xlsx".into(),
            history_path: processed.join("processed_data.csv"),
            clean_path: processed.join("clean_data.csv"),
            parquet_path: None,
            date_column: "date_of_extract".into(),
            columns: ColumnMapping::default(),
        }
    }

    /// Parse a TOML document; keys that are absent keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;

        let mut cfg = match &file.data_root {
            Some(root) => Self::with_root(root),
            None => Self::default(),
        };
        if let Some(p) = file.raw_dir {
            cfg.raw_dir = p;
        }
        if let Some(ext) = file.raw_extension {
            cfg.raw_extension = ext.trim_start_matches('.').to_string();
        }
        if let Some(p) = file.history_path {
            cfg.history_path = p;
        }
        if let Some(p) = file.clean_path {
            cfg.clean_path = p;
        }
        cfg.parquet_path = file.parquet_path;
        if let Some(c) = file.date_column {
            cfg.date_column = c;
        }
        if let Some(cols) = file.columns {
            cfg.columns = ColumnMapping::new(cols)?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.raw_extension.is_empty() {
            return Err(PipelineError::Config("raw_extension is empty".into()));
        }
        if self.date_column.is_empty() {
            return Err(PipelineError::Config("date_column is empty".into()));
        }
        if self.columns.names().any(|n| n == self.date_column)
            || self.columns.ids().any(|n| n == self.date_column)
        {
            return Err(PipelineError::Config(format!(
                "date_column `{}` collides with a business column",
                self.date_column
            )));
        }
        Ok(())
    }

    /// Lock file guarding the processed history against concurrent runs.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .history_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.history_path.with_file_name(name)
    }
}
