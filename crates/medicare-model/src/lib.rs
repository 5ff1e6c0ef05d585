//! Core types for Medicare claims cohort extraction.
//!
//! This crate carries the vocabulary shared by every other crate in the
//! workspace: dataset families and their column roles, the validated
//! extraction configuration, code specifications with rename maps, the
//! pipeline option bags, and the error taxonomy.

pub mod codes;
pub mod config;
pub mod error;
pub mod family;
pub mod options;

pub use codes::{CodeSpec, RenameMap, RenameSpec, ensure_distinct_labels};
pub use config::{ExtractConfig, JoinMode, MAX_YEAR, MIN_YEAR, SamplePercent, YearMode};
pub use error::{ExtractError, Result};
pub use family::{
    CodeFamily, DataFamily, ID_SCHEME_BOUNDARY, SEARCHABLE_FAMILIES, patient_id_column,
};
pub use options::{CohortOptions, KeepColumn, SearchOptions};
