use arrow::datatypes::Schema;
use serde::Serialize;
use std::{collections::HashSet, fmt};

use crate::config::ColumnMapping;

/// Which column-naming generation a raw extract was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractEncoding {
    /// Positional identifiers `0`..`14` as headers.
    Legacy,
    /// Descriptive canonical names as headers.
    Named,
    /// Both kinds of header in one file.
    Mixed,
    /// Neither kind; the normalizer will find nothing to map.
    Unknown,
}

impl ExtractEncoding {
    pub fn detect(schema: &Schema, mapping: &ColumnMapping) -> Self {
        let headers: HashSet<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        let legacy = mapping.ids().any(|id| headers.contains(id));
        let named = mapping.names().any(|n| headers.contains(n));
        match (legacy, named) {
            (true, false) => ExtractEncoding::Legacy,
            (false, true) => ExtractEncoding::Named,
            (true, true) => ExtractEncoding::Mixed,
            (false, false) => ExtractEncoding::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractEncoding::Legacy => "legacy",
            ExtractEncoding::Named => "named",
            ExtractEncoding::Mixed => "mixed",
            ExtractEncoding::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ExtractEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
