//! Columnar source access for the extraction pipelines.

pub mod parquet;
pub mod source;

pub use parquet::{ParquetStore, ScanEngine};
pub use source::{ClaimSource, IdFilter, MemorySource, ReadRequest, apply_id_filter};
