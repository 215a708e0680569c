//! DAX reference extraction
//!
//! This crate handles:
//! - Stripping comments and string literal contents from DAX text
//! - Extracting measure, column and table references by pattern scanning
//! - The model-wide measure name -> defining table lookup
//!
//! DAX is scanned, never evaluated. Every function here is total: empty or
//! malformed input yields empty reference lists.

pub mod clean;
pub mod extractor;
pub mod index;

pub use clean::clean;
pub use extractor::{DaxReferenceExtractor, DaxReferences, TABLE_FUNCTIONS};
pub use index::MeasureIndex;
