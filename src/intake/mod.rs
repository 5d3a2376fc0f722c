// src/intake/mod.rs
//
// Everything that touches the raw intake directory: listing extracts,
// reading the extraction date out of their names, and loading their rows.

pub mod date;
pub mod encoding;
pub mod load;
pub mod scan;

pub use date::extract_date;
pub use encoding::ExtractEncoding;
pub use load::{loader_for, CsvLoader, RawLoader, SpreadsheetLoader};
pub use scan::scan_raw_dir;
