//! Sequential demographic filtering of a single year's beneficiary table.
//!
//! Stages run in a fixed order (gender, age, race, buy-in, HMO) and each
//! one is a no-op when its parameter is absent. Every stage records the
//! fraction of rows it removed, measured against the row count left by the
//! previous stage.

use std::collections::HashSet;

use polars::prelude::DataFrame;

use medicare_codebook::{resolve_gender, resolve_races};
use medicare_model::{CohortOptions, DataFamily, ExtractError, KeepColumn, Result, YearMode};

use crate::columns::CohortColumns;
use crate::frame_utils::{filter_rows, int_values, string_values};
use crate::month_window::all_in_allowed_mask;

/// Filter values resolved once, before any data is read.
#[derive(Debug, Clone)]
pub struct ResolvedFilters {
    pub gender: Option<String>,
    pub ages: Option<Vec<i64>>,
    pub races: Option<Vec<String>>,
    pub race_column: &'static str,
    pub buyin_values: Option<Vec<String>>,
    pub hmo_values: Option<Vec<String>>,
}

impl ResolvedFilters {
    /// Resolve free-text gender and race values against the codebook.
    pub fn resolve(options: &CohortOptions) -> Result<Self> {
        let gender = options
            .gender
            .as_deref()
            .map(resolve_gender)
            .transpose()?;
        let races = options
            .races
            .as_ref()
            .map(|values| resolve_races(values.iter().map(String::as_str), options.rti_race))
            .transpose()?;
        Ok(Self {
            gender,
            ages: options.ages.clone(),
            races,
            race_column: options.race_column(),
            buyin_values: options.buyin_values.clone(),
            hmo_values: options.hmo_values.clone(),
        })
    }
}

/// One stage's drop record.
#[derive(Debug, Clone, PartialEq)]
pub struct StageDrop {
    pub stage: &'static str,
    pub fraction: f64,
}

/// A filtered year table plus its drop records.
#[derive(Debug)]
pub struct FilterOutcome {
    pub frame: DataFrame,
    pub drops: Vec<StageDrop>,
}

fn keep_column(keeps: &[KeepColumn], name: &str) -> bool {
    keeps.iter().any(|keep| match keep {
        KeepColumn::Literal(text) => name == text,
        KeepColumn::Pattern(regex) => regex.is_match(name),
    })
}

fn drop_fraction(before: usize, after: usize) -> f64 {
    if before == 0 {
        0.0
    } else {
        1.0 - (after as f64 / before as f64)
    }
}

fn require_column<'a>(
    frame: &'a DataFrame,
    name: &str,
    year: u16,
) -> Result<&'a polars::prelude::Column> {
    frame
        .column(name)
        .map_err(|_| ExtractError::schema_mismatch(name, DataFamily::Bsfab.as_str(), year))
}

fn drop_consumed(frame: &DataFrame, consumed: &[String], keeps: &[KeepColumn]) -> Result<DataFrame> {
    let consumed: HashSet<&str> = consumed
        .iter()
        .map(String::as_str)
        .filter(|name| !keep_column(keeps, name))
        .collect();
    if consumed.is_empty() {
        return Ok(frame.clone());
    }
    let remaining: Vec<String> = frame
        .get_column_names()
        .into_iter()
        .map(ToString::to_string)
        .filter(|name| !consumed.contains(name.as_str()))
        .collect();
    Ok(frame.select(remaining)?)
}

/// Apply the demographic stages to one year's beneficiary table.
///
/// In age mode the buy-in and HMO stages are skipped here: monthly
/// enrollment is judged across calendar-year boundaries after the years are
/// merged, by the month-window aligner.
pub fn apply_demographic_filters(
    frame: DataFrame,
    year: u16,
    columns: &CohortColumns,
    filters: &ResolvedFilters,
    keeps: &[KeepColumn],
    year_mode: YearMode,
) -> Result<FilterOutcome> {
    let mut frame = frame;
    let mut drops = Vec::new();
    let mut rows = frame.height();

    if let Some(gender) = &filters.gender {
        let sex = require_column(&frame, "sex", year)?;
        let values = string_values(sex)?;
        let mask: Vec<bool> = values
            .iter()
            .map(|v| v.as_deref() == Some(gender.as_str()))
            .collect();
        frame = filter_rows(&frame, &mask)?;
        frame = drop_consumed(&frame, &["sex".to_string()], keeps)?;
        drops.push(StageDrop {
            stage: "gender",
            fraction: drop_fraction(rows, frame.height()),
        });
        rows = frame.height();
    }

    if let Some(ages) = &filters.ages {
        let age = require_column(&frame, "age", year)?;
        let values = int_values(age)?;
        let allowed: HashSet<i64> = ages.iter().copied().collect();
        let mask: Vec<bool> = values
            .iter()
            .map(|v| v.is_some_and(|age| allowed.contains(&age)))
            .collect();
        frame = filter_rows(&frame, &mask)?;
        frame = drop_consumed(&frame, &["age".to_string()], keeps)?;
        drops.push(StageDrop {
            stage: "age",
            fraction: drop_fraction(rows, frame.height()),
        });
        rows = frame.height();
    }

    if let Some(races) = &filters.races {
        let race = require_column(&frame, filters.race_column, year)?;
        let values = string_values(race)?;
        let allowed: HashSet<&str> = races.iter().map(String::as_str).collect();
        let mask: Vec<bool> = values
            .iter()
            .map(|v| v.as_deref().is_some_and(|race| allowed.contains(race)))
            .collect();
        frame = filter_rows(&frame, &mask)?;
        frame = drop_consumed(&frame, &[filters.race_column.to_string()], keeps)?;
        drops.push(StageDrop {
            stage: "race",
            fraction: drop_fraction(rows, frame.height()),
        });
        rows = frame.height();
    }

    if year_mode == YearMode::Calendar {
        if let Some(allowed) = &filters.buyin_values {
            let mask = all_in_allowed_mask(&frame, &columns.buyin, allowed)?;
            frame = filter_rows(&frame, &mask)?;
            frame = drop_consumed(&frame, &columns.buyin, keeps)?;
            drops.push(StageDrop {
                stage: "buyin",
                fraction: drop_fraction(rows, frame.height()),
            });
            rows = frame.height();
        }

        if let Some(allowed) = &filters.hmo_values {
            let mask = all_in_allowed_mask(&frame, &columns.hmo, allowed)?;
            frame = filter_rows(&frame, &mask)?;
            frame = drop_consumed(&frame, &columns.hmo, keeps)?;
            drops.push(StageDrop {
                stage: "hmo",
                fraction: drop_fraction(rows, frame.height()),
            });
        }
    }

    Ok(FilterOutcome { frame, drops })
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::{NamedFrom, Series};

    fn bsfab() -> (DataFrame, CohortColumns) {
        let frame = DataFrame::new(vec![
            Series::new("bene_id".into(), vec!["a", "b", "c", "d"]).into(),
            Series::new("sex".into(), vec!["2", "2", "1", "2"]).into(),
            Series::new("age".into(), vec![70i64, 90, 71, 72]).into(),
            Series::new("race".into(), vec!["1", "1", "1", "2"]).into(),
            Series::new("buyin01".into(), vec!["3", "3", "3", "3"]).into(),
            Series::new("buyin02".into(), vec!["3", "0", "3", "3"]).into(),
        ])
        .unwrap();
        let columns = CohortColumns {
            load: frame
                .get_column_names()
                .into_iter()
                .map(ToString::to_string)
                .collect(),
            id: "bene_id".to_string(),
            buyin: vec!["buyin01".to_string(), "buyin02".to_string()],
            hmo: Vec::new(),
        };
        (frame, columns)
    }

    fn resolved(options: &CohortOptions) -> ResolvedFilters {
        ResolvedFilters::resolve(options).unwrap()
    }

    #[test]
    fn stages_run_in_sequence_and_record_drops() {
        let (frame, columns) = bsfab();
        let options = CohortOptions::new()
            .with_gender("female")
            .with_ages(70..=80)
            .with_races(vec!["white"])
            .with_buyin_values(vec!["3"]);
        let outcome = apply_demographic_filters(
            frame,
            2008,
            &columns,
            &resolved(&options),
            &[],
            YearMode::Calendar,
        )
        .unwrap();

        // a: passes everything; b: age 90 out; c: male; d: race 2.
        assert_eq!(outcome.frame.height(), 1);
        let stages: Vec<&str> = outcome.drops.iter().map(|d| d.stage).collect();
        assert_eq!(stages, vec!["gender", "age", "race", "buyin"]);
        // gender removes 1 of 4, age removes 1 of 3, race 1 of 2, buyin 0 of 1.
        assert!((outcome.drops[0].fraction - 0.25).abs() < 1e-12);
        assert!((outcome.drops[1].fraction - 1.0 / 3.0).abs() < 1e-12);
        assert!((outcome.drops[2].fraction - 0.5).abs() < 1e-12);
        assert!(outcome.drops[3].fraction.abs() < 1e-12);
        // Consumed columns are gone.
        assert!(outcome.frame.column("sex").is_err());
        assert!(outcome.frame.column("buyin01").is_err());
    }

    #[test]
    fn drop_product_reproduces_final_row_count() {
        let (frame, columns) = bsfab();
        let initial = frame.height() as f64;
        let options = CohortOptions::new()
            .with_gender("F")
            .with_ages(vec![70, 71, 72])
            .with_buyin_values(vec!["3"]);
        let outcome = apply_demographic_filters(
            frame,
            2008,
            &columns,
            &resolved(&options),
            &[],
            YearMode::Calendar,
        )
        .unwrap();
        let product: f64 = outcome
            .drops
            .iter()
            .map(|d| 1.0 - d.fraction)
            .product::<f64>()
            * initial;
        assert!((product - outcome.frame.height() as f64).abs() < 1e-9);
    }

    #[test]
    fn kept_columns_survive_their_filter() {
        let (frame, columns) = bsfab();
        let options = CohortOptions::new().with_gender("female");
        let keeps = vec![KeepColumn::literal("sex")];
        let outcome = apply_demographic_filters(
            frame,
            2008,
            &columns,
            &resolved(&options),
            &keeps,
            YearMode::Calendar,
        )
        .unwrap();
        assert!(outcome.frame.column("sex").is_ok());
    }

    #[test]
    fn missing_filter_column_is_a_schema_mismatch() {
        let frame = DataFrame::new(vec![
            Series::new("bene_id".into(), vec!["a"]).into(),
        ])
        .unwrap();
        let columns = CohortColumns {
            load: vec!["bene_id".to_string()],
            id: "bene_id".to_string(),
            buyin: Vec::new(),
            hmo: Vec::new(),
        };
        let options = CohortOptions::new().with_gender("female");
        let err = apply_demographic_filters(
            frame,
            2008,
            &columns,
            &resolved(&options),
            &[],
            YearMode::Calendar,
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::SchemaMismatch { .. }));
    }

    #[test]
    fn age_mode_defers_enrollment_filters() {
        let (frame, columns) = bsfab();
        let options = CohortOptions::new().with_buyin_values(vec!["3"]);
        let outcome = apply_demographic_filters(
            frame,
            2008,
            &columns,
            &resolved(&options),
            &[],
            YearMode::Age,
        )
        .unwrap();
        assert_eq!(outcome.frame.height(), 4);
        assert!(outcome.drops.is_empty());
        // The monthly columns stay for the post-merge aligner.
        assert!(outcome.frame.column("buyin02").is_ok());
    }
}
