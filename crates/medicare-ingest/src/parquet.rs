//! Parquet-backed claim source.
//!
//! Datasets live under `<root>/<pct>pct/` as either a single
//! `<family>_<year>.parquet` file or a `<family>_<year>/` directory of part
//! files; each part file becomes one partition. Column names come from the
//! parquet metadata, so listing them never reads row data.

use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::{
    DataFrame, LazyFrame, ParquetReader, PlPath, ScanArgsParquet, SerReader, col,
};
use tracing::debug;

use medicare_model::{DataFamily, ExtractError, Result, SamplePercent};

use crate::source::{ClaimSource, ReadRequest, apply_id_filter};

/// How partition frames are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanEngine {
    /// Scan lazily and collect with projection pushdown.
    #[default]
    Lazy,
    /// Read each file eagerly, then project.
    Eager,
}

/// Claim source over a directory tree of parquet extracts.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    root: PathBuf,
    engine: ScanEngine,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            engine: ScanEngine::default(),
        }
    }

    pub fn with_engine(mut self, engine: ScanEngine) -> Self {
        self.engine = engine;
        self
    }

    fn dataset_stem(&self, percent: SamplePercent, year: u16, family: DataFamily) -> PathBuf {
        self.root
            .join(format!("{}pct", percent.tag()))
            .join(format!("{family}_{year}"))
    }

    /// Part files for a dataset, in name order.
    fn partition_paths(
        &self,
        percent: SamplePercent,
        year: u16,
        family: DataFamily,
    ) -> Result<Vec<PathBuf>> {
        let stem = self.dataset_stem(percent, year, family);
        let single = stem.with_extension("parquet");
        if single.is_file() {
            return Ok(vec![single]);
        }
        if stem.is_dir() {
            let mut parts: Vec<PathBuf> = fs::read_dir(&stem)
                .map_err(|e| ExtractError::io(&stem, e))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.extension().is_some_and(|ext| ext == "parquet"))
                .collect();
            parts.sort();
            if !parts.is_empty() {
                return Ok(parts);
            }
        }
        Err(ExtractError::io(
            single,
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ))
    }

    fn scan(path: &Path) -> Result<LazyFrame> {
        let path_str = path.to_string_lossy();
        let frame = LazyFrame::scan_parquet(PlPath::new(&path_str), ScanArgsParquet::default())?;
        Ok(frame)
    }

    fn read_partition(&self, path: &Path, columns: &[String]) -> Result<DataFrame> {
        match self.engine {
            ScanEngine::Lazy => {
                let selection: Vec<_> = columns.iter().map(|name| col(name.as_str())).collect();
                let frame = Self::scan(path)?.select(selection).collect()?;
                Ok(frame)
            }
            ScanEngine::Eager => {
                let file = fs::File::open(path).map_err(|e| ExtractError::io(path, e))?;
                let frame = ParquetReader::new(file).finish()?;
                Ok(frame.select(columns.iter().cloned())?)
            }
        }
    }
}

impl ClaimSource for ParquetStore {
    fn column_names(
        &self,
        percent: SamplePercent,
        year: u16,
        family: DataFamily,
    ) -> Result<Vec<String>> {
        let paths = self.partition_paths(percent, year, family)?;
        let schema = Self::scan(&paths[0])?.collect_schema()?;
        Ok(schema.iter_names().map(|name| name.to_string()).collect())
    }

    fn partitions(&self, request: &ReadRequest) -> Result<Vec<DataFrame>> {
        let paths = self.partition_paths(request.percent, request.year, request.family)?;
        debug!(
            family = %request.family,
            year = request.year,
            partitions = paths.len(),
            columns = request.columns.len(),
            "reading parquet dataset"
        );
        let mut out = Vec::with_capacity(paths.len());
        for path in &paths {
            let mut frame = self.read_partition(path, &request.columns)?;
            if let Some(filter) = &request.id_filter {
                frame = apply_id_filter(frame, filter)?;
            }
            out.push(frame);
        }
        Ok(out)
    }
}
