use std::path::PathBuf;

use thiserror::Error;

/// Error type shared by the extraction pipelines.
///
/// Validation variants are raised before any data is read; `SchemaMismatch`
/// signals that loaded data does not carry a column the pipeline depends on,
/// which points at a source/layout problem rather than a caller mistake.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid sample percent `{value}`: allowed values are {allowed:?}")]
    InvalidPercent {
        value: String,
        allowed: &'static [&'static str],
    },

    #[error("invalid year selection: {message}")]
    InvalidYears { message: String },

    #[error("unsupported join mode `{value}`: allowed values are {allowed:?}")]
    UnsupportedJoin {
        value: String,
        allowed: &'static [&'static str],
    },

    #[error("unsupported dataset family `{value}`: allowed values are {allowed:?}")]
    UnsupportedFamily {
        value: String,
        allowed: &'static [&'static str],
    },

    #[error("could not resolve {field} value `{value}`")]
    UnresolvedValue { field: &'static str, value: String },

    #[error("ambiguous {field} value `{value}`: matches {matches:?}")]
    AmbiguousValue {
        field: &'static str,
        value: String,
        matches: Vec<String>,
    },

    #[error("invalid code specification: {message}")]
    InvalidCodes { message: String },

    #[error("invalid options: {message}")]
    InvalidOptions { message: String },

    #[error(
        "expected column `{column}` missing from {family} data for year {year}; \
         loaded data does not match the expected source layout"
    )]
    SchemaMismatch {
        column: String,
        family: String,
        year: u16,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Polars(#[from] polars::prelude::PolarsError),
}

impl ExtractError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn schema_mismatch(column: impl Into<String>, family: impl Into<String>, year: u16) -> Self {
        Self::SchemaMismatch {
            column: column.into(),
            family: family.into(),
            year,
        }
    }
}

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractError>;
