//! The extraction orchestrator and the cohort pipeline.

use chrono::Datelike;
use polars::prelude::DataFrame;
use tracing::{debug, info, warn};

use medicare_ingest::{ClaimSource, ReadRequest};
use medicare_model::{
    CohortOptions, DataFamily, ExtractConfig, ExtractError, KeepColumn, Result, YearMode,
};
use medicare_transform::demographic::{ResolvedFilters, apply_demographic_filters};
use medicare_transform::frame_utils::{concat_rows, date_values};
use medicare_transform::month_window::boundary_masks;
use medicare_transform::reshape::{
    YearTable, boundary_row_filter, collapse_constants, drop_enrollment_columns,
    presence_row_filter, reshape_long, union_years,
};
use medicare_transform::select_cohort_columns;

use crate::accounting::DropAccounting;
use crate::search::ClaimMatches;

/// A built cohort: one row per (patient, year) plus its drop accounting.
#[derive(Debug)]
pub struct Cohort {
    pub frame: DataFrame,
    pub drops: DropAccounting,
}

/// Orchestrates the two pipelines against one configured extraction.
///
/// The latest cohort and claim results are retained for chaining (a code
/// search reads the cohort as a patient filter), but they are never mutated
/// in place; each pipeline invocation rebuilds its result from scratch.
pub struct Extract<S> {
    pub(crate) config: ExtractConfig,
    pub(crate) source: S,
    pub(crate) cohort: Option<Cohort>,
    pub(crate) claims: Option<ClaimMatches>,
}

impl<S: ClaimSource> Extract<S> {
    pub fn new(config: ExtractConfig, source: S) -> Self {
        Self {
            config,
            source,
            cohort: None,
            claims: None,
        }
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cohort(&self) -> Option<&Cohort> {
        self.cohort.as_ref()
    }

    pub fn claims(&self) -> Option<&ClaimMatches> {
        self.claims.as_ref()
    }

    /// Build the cohort table for the configured years.
    ///
    /// Filters resolve and validate before any data is read; the returned
    /// table has one row per (patient, year) keyed by `bene_id`, with a
    /// `cohort_match` flag and per-filter drop accounting.
    pub fn build_cohort(&mut self, options: &CohortOptions) -> Result<&Cohort> {
        let mut options = options.clone();
        swap_age_keep(&mut options, self.config.years().len());
        let filters = ResolvedFilters::resolve(&options)?;

        let percent = self.config.percent();
        let year_mode = self.config.year_mode();
        let years: Vec<u16> = self.config.years().to_vec();

        let mut drops = DropAccounting::new();
        let mut tables = Vec::with_capacity(years.len());
        for &year in &years {
            let available = self
                .source
                .column_names(percent, year, DataFamily::Bsfab)?;
            let columns = select_cohort_columns(&available, year, &options, year_mode)?;
            let request =
                ReadRequest::new(percent, year, DataFamily::Bsfab, columns.load.clone());
            let frame = concat_rows(self.source.partitions(&request)?)?;
            debug!(year, rows = frame.height(), "loaded beneficiary summary");

            let outcome = apply_demographic_filters(
                frame,
                year,
                &columns,
                &filters,
                &options.keep_columns,
                year_mode,
            )?;
            for drop in &outcome.drops {
                drops.record(year, drop.stage, drop.fraction);
            }
            tables.push(YearTable {
                year,
                frame: outcome.frame,
            });
        }

        let merged = union_years(&tables, "bene_id")?;
        let merged = collapse_constants(merged, &years)?;

        let filtered = if year_mode == YearMode::Age && options.has_enrollment_filter() {
            let mut current = merged;
            for (prefix, stage, allowed) in [
                ("buyin", "buyin", &filters.buyin_values),
                ("hmoind", "hmo", &filters.hmo_values),
            ] {
                let Some(allowed) = allowed else { continue };
                let dob_months = birth_months(&current, years[0])?;
                let masks = boundary_masks(&current, prefix, &years, &dob_months, allowed)?;
                for (year, mask) in &masks {
                    let matched = mask.iter().filter(|m| **m).count();
                    let fraction = if mask.is_empty() {
                        0.0
                    } else {
                        1.0 - matched as f64 / mask.len() as f64
                    };
                    drops.record(*year, stage, fraction);
                }
                current = boundary_row_filter(&current, &masks)?;
            }
            drop_enrollment_columns(current, &["buyin", "hmoind"], &years, &options.keep_columns)?
        } else {
            presence_row_filter(&merged, &years, options.join)?
        };

        let frame = reshape_long(&filtered, &years, "bene_id")?;
        info!(rows = frame.height(), years = years.len(), "cohort built");
        Ok(self.cohort.insert(Cohort { frame, drops }))
    }
}

/// The age column cannot survive a multi-year reshape (it varies per year
/// and is consumed by the age filter); carry the birth date instead.
fn swap_age_keep(options: &mut CohortOptions, year_count: usize) {
    if year_count < 2 {
        return;
    }
    let age_at = options
        .keep_columns
        .iter()
        .position(|keep| matches!(keep, KeepColumn::Literal(text) if text == "age"));
    if let Some(at) = age_at {
        warn!("cannot keep the age column across years; keeping bene_dob instead");
        options.keep_columns.remove(at);
        options.keep_columns.push(KeepColumn::literal("bene_dob"));
    }
}

/// Birth months from the collapsed `bene_dob` column.
pub(crate) fn birth_months(frame: &DataFrame, year: u16) -> Result<Vec<Option<u32>>> {
    let column = frame.column("bene_dob").map_err(|_| {
        ExtractError::schema_mismatch("bene_dob", DataFamily::Bsfab.as_str(), year)
    })?;
    Ok(date_values(column)?
        .into_iter()
        .map(|date| date.map(|d| d.month()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_keep_swaps_to_birth_date_across_years() {
        let mut options =
            CohortOptions::new().with_keep_columns(vec![KeepColumn::literal("age")]);
        swap_age_keep(&mut options, 2);
        assert!(
            options
                .keep_columns
                .iter()
                .any(|k| matches!(k, KeepColumn::Literal(t) if t == "bene_dob"))
        );
        assert!(
            !options
                .keep_columns
                .iter()
                .any(|k| matches!(k, KeepColumn::Literal(t) if t == "age"))
        );

        // A single-year extraction can keep the age column as-is.
        let mut single =
            CohortOptions::new().with_keep_columns(vec![KeepColumn::literal("age")]);
        swap_age_keep(&mut single, 1);
        assert!(
            single
                .keep_columns
                .iter()
                .any(|k| matches!(k, KeepColumn::Literal(t) if t == "age"))
        );
    }
}
