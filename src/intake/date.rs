use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{PipelineError, Result};

/// `m.d.yy` with one- or two-digit month and day, e.g. `sublist1.21.24.xlsx`.
static DATE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\.(\d{1,2})\.(\d{2})").expect("static date regex"));

/// Extracts the extraction date embedded in a raw extract's filename.
///
/// The first `m.d.yy` token wins and the two-digit year is read as `20yy`.
/// A filename without a token fails with [`PipelineError::DateNotFound`];
/// a token that is not a real day (`2.30.24`) fails with
/// [`PipelineError::InvalidDate`].
pub fn extract_date(filename: &str) -> Result<NaiveDate> {
    let caps = DATE_TOKEN
        .captures(filename)
        .ok_or_else(|| PipelineError::DateNotFound {
            filename: filename.to_string(),
        })?;

    let invalid = || PipelineError::InvalidDate {
        filename: filename.to_string(),
        token: caps[0].to_string(),
    };

    let month: u32 = caps[1].parse().map_err(|_| invalid())?;
    let day: u32 = caps[2].parse().map_err(|_| invalid())?;
    let yy: i32 = caps[3].parse().map_err(|_| invalid())?;

    NaiveDate::from_ymd_opt(2000 + yy, month, day).ok_or_else(invalid)
}
