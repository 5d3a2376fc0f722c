use arrow::{array::StringArray, record_batch::RecordBatch};
use chrono::NaiveDate;

use crate::config::ColumnMapping;
use crate::table::{cell, string_column};

/// One history row, tagged by the encoding that carries its data.
///
/// Both variants line their values up with the mapping order. A legacy row
/// may still hold named values for fields its numeric columns leave empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRow<'a> {
    Legacy {
        legacy: Vec<Option<&'a str>>,
        named: Vec<Option<&'a str>>,
    },
    Named(Vec<Option<&'a str>>),
}

impl<'a> SourceRow<'a> {
    /// Legacy as soon as any numeric-identifier cell is filled.
    pub fn classify(legacy: Vec<Option<&'a str>>, named: Vec<Option<&'a str>>) -> Self {
        if legacy.iter().any(Option::is_some) {
            SourceRow::Legacy { legacy, named }
        } else {
            SourceRow::Named(named)
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, SourceRow::Legacy { .. })
    }

    /// Canonical field values; a filled legacy cell wins over the named one.
    pub fn into_fields(self) -> Vec<Option<String>> {
        match self {
            SourceRow::Legacy { legacy, named } => legacy
                .into_iter()
                .zip(named)
                .map(|(l, n)| l.or(n).map(str::to_string))
                .collect(),
            SourceRow::Named(named) => named
                .into_iter()
                .map(|n| n.map(str::to_string))
                .collect(),
        }
    }
}

/// A subscription row in the canonical schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub extract_date: NaiveDate,
    /// Values in mapping order.
    pub fields: Vec<Option<String>>,
}

impl SubscriptionRecord {
    /// True when every business field is empty.
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(Option::is_none)
    }

    pub fn field<'s>(&'s self, mapping: &ColumnMapping, name: &str) -> Option<&'s str> {
        let idx = mapping.names().position(|n| n == name)?;
        self.fields.get(idx)?.as_deref()
    }
}

/// The legacy and named columns of a history table, resolved once.
pub struct CanonicalColumns<'a> {
    legacy: Vec<Option<&'a StringArray>>,
    named: Vec<Option<&'a StringArray>>,
}

impl<'a> CanonicalColumns<'a> {
    pub fn resolve(table: &'a RecordBatch, mapping: &ColumnMapping) -> Self {
        Self {
            legacy: mapping.ids().map(|id| string_column(table, id)).collect(),
            named: mapping.names().map(|n| string_column(table, n)).collect(),
        }
    }

    pub fn has_legacy(&self) -> bool {
        self.legacy.iter().any(Option::is_some)
    }

    pub fn row(&self, i: usize) -> SourceRow<'a> {
        let pick = |cols: &[Option<&'a StringArray>]| -> Vec<Option<&'a str>> {
            cols.iter().map(|c| c.and_then(|a| cell(a, i))).collect()
        };
        SourceRow::classify(pick(&self.legacy), pick(&self.named))
    }
}
