//! Search for ChronoFHIR.
//!
//! The engine is a full scan over the current version of every chain of a
//! type. `_id` is the only filtering parameter; result-shaping parameters
//! (`_count`, `_summary`) are extracted, `_format` and `_sort` are
//! accepted and ignored, and anything else is reported back as
//! unsupported without narrowing the result.

mod engine;
mod error;
mod params;

pub use engine::{SearchEngine, SearchOutcome};
pub use error::SearchError;
pub use params::{SearchParameters, parse_query, sanitize_id};
