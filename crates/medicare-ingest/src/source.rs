//! The columnar source abstraction the pipelines read through.

use std::collections::BTreeMap;
use std::io;

use polars::prelude::{DataFrame, IntoLazy, JoinArgs, JoinType, Series, col};

use medicare_model::{DataFamily, ExtractError, Result, SamplePercent};

/// Restrict a read to rows whose identifier appears in `ids`.
#[derive(Debug, Clone)]
pub struct IdFilter {
    /// Identifier column to filter on.
    pub column: String,
    /// Identifier values to keep.
    pub ids: Series,
}

/// One column-restricted read of a dataset.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub percent: SamplePercent,
    pub year: u16,
    pub family: DataFamily,
    /// Columns to load; everything else is never materialized.
    pub columns: Vec<String>,
    /// Optional identifier pre-filter, applied per partition.
    pub id_filter: Option<IdFilter>,
}

impl ReadRequest {
    pub fn new(
        percent: SamplePercent,
        year: u16,
        family: DataFamily,
        columns: impl Into<Vec<String>>,
    ) -> Self {
        Self {
            percent,
            year,
            family,
            columns: columns.into(),
            id_filter: None,
        }
    }

    pub fn with_id_filter(mut self, column: impl Into<String>, ids: Series) -> Self {
        self.id_filter = Some(IdFilter {
            column: column.into(),
            ids,
        });
        self
    }
}

/// A source of columnar beneficiary and claim data.
///
/// Implementations expose column names without reading data, and hand out
/// partition frames restricted to the requested columns. Partitions are
/// processed independently downstream, so their granularity is an
/// implementation detail.
pub trait ClaimSource {
    /// Column names available for a dataset, without reading any rows.
    fn column_names(
        &self,
        percent: SamplePercent,
        year: u16,
        family: DataFamily,
    ) -> Result<Vec<String>>;

    /// Read the dataset as a sequence of partition frames.
    fn partitions(&self, request: &ReadRequest) -> Result<Vec<DataFrame>>;
}

/// Drop rows whose identifier is not in the filter set.
pub fn apply_id_filter(frame: DataFrame, filter: &IdFilter) -> Result<DataFrame> {
    let ids = DataFrame::new(vec![
        filter.ids.clone().with_name(filter.column.as_str().into()).into(),
    ])?;
    let filtered = frame
        .lazy()
        .join(
            ids.lazy(),
            [col(filter.column.as_str())],
            [col(filter.column.as_str())],
            JoinArgs::new(JoinType::Semi),
        )
        .collect()?;
    Ok(filtered)
}

fn missing_dataset(percent: SamplePercent, year: u16, family: DataFamily) -> ExtractError {
    ExtractError::io(
        format!("{}pct/{family}_{year}", percent.tag()),
        io::Error::from(io::ErrorKind::NotFound),
    )
}

/// In-memory source backed by pre-built frames, used by tests and examples.
///
/// The sample percent is not part of the key: a memory source models exactly
/// one extract of the data.
#[derive(Debug, Default)]
pub struct MemorySource {
    datasets: BTreeMap<(u16, DataFamily), Vec<DataFrame>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset as a single partition.
    pub fn with_frame(self, year: u16, family: DataFamily, frame: DataFrame) -> Self {
        self.with_partitions(year, family, vec![frame])
    }

    /// Register a dataset split into explicit partitions.
    pub fn with_partitions(
        mut self,
        year: u16,
        family: DataFamily,
        frames: Vec<DataFrame>,
    ) -> Self {
        self.datasets.insert((year, family), frames);
        self
    }

    fn dataset(
        &self,
        percent: SamplePercent,
        year: u16,
        family: DataFamily,
    ) -> Result<&Vec<DataFrame>> {
        self.datasets
            .get(&(year, family))
            .ok_or_else(|| missing_dataset(percent, year, family))
    }
}

impl ClaimSource for MemorySource {
    fn column_names(
        &self,
        percent: SamplePercent,
        year: u16,
        family: DataFamily,
    ) -> Result<Vec<String>> {
        let frames = self.dataset(percent, year, family)?;
        let first = frames
            .first()
            .ok_or_else(|| missing_dataset(percent, year, family))?;
        Ok(first
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect())
    }

    fn partitions(&self, request: &ReadRequest) -> Result<Vec<DataFrame>> {
        let frames = self.dataset(request.percent, request.year, request.family)?;
        let mut out = Vec::with_capacity(frames.len());
        for frame in frames {
            let mut frame = frame.select(request.columns.iter().cloned())?;
            if let Some(filter) = &request.id_filter {
                frame = apply_id_filter(frame, filter)?;
            }
            out.push(frame);
        }
        Ok(out)
    }
}
