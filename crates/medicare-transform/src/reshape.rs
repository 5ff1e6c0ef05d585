//! Merging per-year beneficiary tables and reshaping them to long format.
//!
//! The merge is always a value-preserving union: every patient seen in any
//! year appears once in the merged wide frame, with a boolean `in_YYYY`
//! presence flag per year. The requested join mode is then applied as a row
//! filter over those flags, never as an actual join, so no year's values are
//! lost before the filter runs.

use std::collections::{BTreeMap, HashSet};

use polars::prelude::{
    Column, DataFrame, DataType, Expr, IntoLazy, JoinArgs, JoinCoalesce, JoinType, LazyFrame,
    NamedFrom, Series, SortMultipleOptions, coalesce, col, lit,
};

use medicare_model::{JoinMode, KeepColumn, Result};

use crate::frame_utils::{bool_column, concat_rows, dedup_first, filter_rows};

/// One filtered year table, with plain (un-suffixed) column names.
#[derive(Debug)]
pub struct YearTable {
    pub year: u16,
    pub frame: DataFrame,
}

/// Columns whose value is constant for a patient across years; collapsed to
/// a single column by first non-missing value in year order.
pub const CONSTANT_STUBS: &[&str] = &["ehic", "bene_dob", "death_dt", "sex", "race", "rti_race_cd"];

fn presence_column(year: u16) -> String {
    format!("in_{year}")
}

/// Rename every non-id column to `name_year` and add the presence flag.
pub fn suffix_year(frame: &DataFrame, year: u16, id: &str) -> Result<DataFrame> {
    let mut frame = frame.clone();
    let names: Vec<String> = frame
        .get_column_names()
        .into_iter()
        .map(ToString::to_string)
        .collect();
    for name in names {
        if name != id {
            frame.rename(&name, format!("{name}_{year}").into())?;
        }
    }
    frame.with_column(bool_column(&presence_column(year), vec![true; frame.height()]))?;
    Ok(frame)
}

/// Union-join the year tables on the identifier column.
pub fn union_years(tables: &[YearTable], id: &str) -> Result<DataFrame> {
    let mut merged: Option<LazyFrame> = None;
    for table in tables {
        let suffixed = suffix_year(&table.frame, table.year, id)?.lazy();
        merged = Some(match merged {
            None => suffixed,
            Some(acc) => acc.join(
                suffixed,
                [col(id)],
                [col(id)],
                JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
            ),
        });
    }
    let Some(merged) = merged else {
        return Ok(DataFrame::default());
    };
    let fills: Vec<Expr> = tables
        .iter()
        .map(|t| col(presence_column(t.year).as_str()).fill_null(lit(false)))
        .collect();
    Ok(merged.with_columns(fills).collect()?)
}

fn presence_flags(frame: &DataFrame, years: &[u16]) -> Result<Vec<Vec<bool>>> {
    let mut flags = Vec::with_capacity(years.len());
    for year in years {
        let column = frame.column(&presence_column(*year))?;
        flags.push(column.bool()?.into_iter().map(|v| v.unwrap_or(false)).collect());
    }
    Ok(flags)
}

/// Apply the requested join mode as a row filter over the presence flags.
pub fn presence_row_filter(frame: &DataFrame, years: &[u16], join: JoinMode) -> Result<DataFrame> {
    let flags = presence_flags(frame, years)?;
    let rows = frame.height();
    let mut mask = Vec::with_capacity(rows);
    for row in 0..rows {
        let keep = match join {
            JoinMode::Inner => flags.iter().all(|year| year[row]),
            JoinMode::Outer => flags.iter().any(|year| year[row]),
            JoinMode::Left => flags[0][row],
            JoinMode::Right => flags[flags.len() - 1][row],
            // Historic policy: outer across all years except the last,
            // which joins left.
            JoinMode::Default => {
                if flags.len() == 1 {
                    flags[0][row]
                } else {
                    flags[..flags.len() - 1].iter().any(|year| year[row])
                }
            }
        };
        mask.push(keep);
    }
    filter_rows(frame, &mask)
}

/// Keep rows matching every year-boundary mask (age-mode row filter).
pub fn boundary_row_filter(frame: &DataFrame, masks: &[(u16, Vec<bool>)]) -> Result<DataFrame> {
    let rows = frame.height();
    let mut keep = vec![true; rows];
    for (_, mask) in masks {
        for row in 0..rows {
            keep[row] = keep[row] && mask[row];
        }
    }
    filter_rows(frame, &keep)
}

/// Collapse per-year copies of constant columns into one column each, taking
/// the first non-missing value in year order.
pub fn collapse_constants(frame: DataFrame, years: &[u16]) -> Result<DataFrame> {
    let names: HashSet<String> = frame
        .get_column_names()
        .into_iter()
        .map(ToString::to_string)
        .collect();
    let mut lazy = frame.lazy();
    let mut dropped: HashSet<String> = HashSet::new();
    for stub in CONSTANT_STUBS {
        let variants: Vec<String> = years
            .iter()
            .map(|year| format!("{stub}_{year}"))
            .filter(|name| names.contains(name))
            .collect();
        if variants.is_empty() {
            continue;
        }
        let exprs: Vec<Expr> = variants.iter().map(|name| col(name.as_str())).collect();
        lazy = lazy.with_column(coalesce(&exprs).alias(*stub));
        dropped.extend(variants);
    }
    let collapsed = lazy.collect()?;
    let keep: Vec<String> = collapsed
        .get_column_names()
        .into_iter()
        .map(ToString::to_string)
        .filter(|name| !dropped.contains(name))
        .collect();
    Ok(collapsed.select(keep)?)
}

/// Drop year-suffixed monthly enrollment columns once the aligner has
/// consumed them, unless the caller asked to keep them.
pub fn drop_enrollment_columns(
    frame: DataFrame,
    prefixes: &[&str],
    years: &[u16],
    keeps: &[KeepColumn],
) -> Result<DataFrame> {
    let year_tags: Vec<String> = years.iter().map(|y| format!("_{y}")).collect();
    let keep: Vec<String> = frame
        .get_column_names()
        .into_iter()
        .map(ToString::to_string)
        .filter(|name| {
            let Some(tag_at) = year_tags.iter().find_map(|tag| name.strip_suffix(tag.as_str()))
            else {
                return true;
            };
            let base = tag_at;
            let is_enrollment = prefixes.iter().any(|prefix| {
                base.strip_prefix(prefix)
                    .is_some_and(|rest| rest.len() == 2 && rest.bytes().all(|b| b.is_ascii_digit()))
            });
            if !is_enrollment {
                return true;
            }
            keeps.iter().any(|k| match k {
                KeepColumn::Literal(text) => base == text,
                KeepColumn::Pattern(regex) => regex.is_match(base),
            })
        })
        .collect();
    Ok(frame.select(keep)?)
}

/// Reshape the merged wide frame into one row per (patient, year).
///
/// Year-suffixed columns become plain columns; constant columns are carried
/// onto every year row. The per-year presence flags become a single
/// `cohort_match` boolean. Duplicate (patient, year) keys keep their first
/// occurrence.
pub fn reshape_long(frame: &DataFrame, years: &[u16], id: &str) -> Result<DataFrame> {
    let year_set: HashSet<String> = years.iter().map(|y| y.to_string()).collect();
    let split = |name: &str| -> Option<(String, u16)> {
        let (stub, year) = name.rsplit_once('_')?;
        if stub.is_empty() || !year_set.contains(year) {
            return None;
        }
        Some((stub.to_string(), year.parse().ok()?))
    };

    let mut stub_order: Vec<String> = Vec::new();
    let mut stub_dtypes: BTreeMap<String, DataType> = BTreeMap::new();
    let mut constants: Vec<String> = Vec::new();
    for column in frame.get_columns() {
        let name = column.name().to_string();
        if name == id {
            continue;
        }
        match split(&name) {
            Some((stub, _)) => {
                if !stub_dtypes.contains_key(&stub) {
                    stub_order.push(stub.clone());
                    stub_dtypes.insert(stub, column.dtype().clone());
                }
            }
            None => constants.push(name),
        }
    }

    let height = frame.height();
    let mut parts = Vec::with_capacity(years.len());
    for &year in years {
        let mut columns: Vec<Column> = Vec::with_capacity(2 + constants.len() + stub_order.len());
        columns.push(frame.column(id)?.clone());
        columns.push(Series::new("year".into(), vec![i32::from(year); height]).into());
        for name in &constants {
            columns.push(frame.column(name)?.clone());
        }
        for stub in &stub_order {
            let suffixed = format!("{stub}_{year}");
            match frame.column(&suffixed) {
                Ok(column) => columns.push(column.clone().with_name(stub.as_str().into())),
                Err(_) => columns.push(
                    Series::full_null(stub.as_str().into(), height, &stub_dtypes[stub]).into(),
                ),
            }
        }
        parts.push(DataFrame::new(columns)?);
    }

    let mut long = concat_rows(parts)?;
    if long.column("in").is_ok() {
        long.rename("in", "cohort_match".into())?;
    }
    let long = dedup_first(&long, &[id, "year"])?;
    Ok(long.sort([id, "year"], SortMultipleOptions::default())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_utils::{int_values, string_values};

    fn year_table(year: u16, ids: &[&str], ages: &[i64]) -> YearTable {
        YearTable {
            year,
            frame: DataFrame::new(vec![
                Series::new("bene_id".into(), ids.to_vec()).into(),
                Series::new("age".into(), ages.to_vec()).into(),
            ])
            .unwrap(),
        }
    }

    #[test]
    fn union_keeps_every_patient_with_presence_flags() {
        let tables = vec![
            year_table(2008, &["a", "b"], &[70, 71]),
            year_table(2009, &["b", "c"], &[72, 73]),
        ];
        let merged = union_years(&tables, "bene_id").unwrap();
        assert_eq!(merged.height(), 3);

        let inner = presence_row_filter(&merged, &[2008, 2009], JoinMode::Inner).unwrap();
        assert_eq!(inner.height(), 1);
        let outer = presence_row_filter(&merged, &[2008, 2009], JoinMode::Outer).unwrap();
        assert_eq!(outer.height(), 3);
        let left = presence_row_filter(&merged, &[2008, 2009], JoinMode::Left).unwrap();
        assert_eq!(left.height(), 2);
        let right = presence_row_filter(&merged, &[2008, 2009], JoinMode::Right).unwrap();
        assert_eq!(right.height(), 2);
        // Default with two years keeps the first year's patients.
        let default = presence_row_filter(&merged, &[2008, 2009], JoinMode::Default).unwrap();
        assert_eq!(default.height(), 2);
    }

    #[test]
    fn long_reshape_round_trips_per_year_values() {
        let tables = vec![
            year_table(2008, &["a", "b"], &[70, 71]),
            year_table(2009, &["a", "b"], &[71, 72]),
        ];
        let merged = union_years(&tables, "bene_id").unwrap();
        let long = reshape_long(&merged, &[2008, 2009], "bene_id").unwrap();
        assert_eq!(long.height(), 4);

        // Reading the long frame back per (patient, year) reproduces the
        // original wide values.
        let ids = string_values(long.column("bene_id").unwrap()).unwrap();
        let years = int_values(long.column("year").unwrap()).unwrap();
        let ages = int_values(long.column("age").unwrap()).unwrap();
        let mut seen = std::collections::BTreeMap::new();
        for row in 0..long.height() {
            seen.insert(
                (ids[row].clone().unwrap(), years[row].unwrap()),
                ages[row].unwrap(),
            );
        }
        assert_eq!(seen[&("a".to_string(), 2008)], 70);
        assert_eq!(seen[&("a".to_string(), 2009)], 71);
        assert_eq!(seen[&("b".to_string(), 2008)], 71);
        assert_eq!(seen[&("b".to_string(), 2009)], 72);
    }

    #[test]
    fn presence_flags_become_cohort_match() {
        let tables = vec![
            year_table(2008, &["a", "b"], &[70, 71]),
            year_table(2009, &["b"], &[72]),
        ];
        let merged = union_years(&tables, "bene_id").unwrap();
        let long = reshape_long(&merged, &[2008, 2009], "bene_id").unwrap();
        let mut matches = std::collections::BTreeMap::new();
        let ids = string_values(long.column("bene_id").unwrap()).unwrap();
        let years = int_values(long.column("year").unwrap()).unwrap();
        let flags = long.column("cohort_match").unwrap().bool().unwrap();
        for row in 0..long.height() {
            matches.insert(
                (ids[row].clone().unwrap(), years[row].unwrap()),
                flags.get(row).unwrap_or(false),
            );
        }
        assert!(matches[&("a".to_string(), 2008)]);
        assert!(!matches[&("a".to_string(), 2009)]);
        assert!(matches[&("b".to_string(), 2008)]);
        assert!(matches[&("b".to_string(), 2009)]);
    }

    #[test]
    fn constants_collapse_to_first_non_missing() {
        let tables = vec![
            YearTable {
                year: 2005,
                frame: DataFrame::new(vec![
                    Series::new("bene_id".into(), vec!["a", "b"]).into(),
                    Series::new("ehic".into(), vec![Some("e1"), Some("e2")]).into(),
                ])
                .unwrap(),
            },
            YearTable {
                year: 2006,
                frame: DataFrame::new(vec![
                    Series::new("bene_id".into(), vec!["a", "c"]).into(),
                    Series::new("ehic".into(), vec![None::<&str>, Some("e3")]).into(),
                ])
                .unwrap(),
            },
        ];
        let merged = union_years(&tables, "bene_id").unwrap();
        let collapsed = collapse_constants(merged, &[2005, 2006]).unwrap();
        assert!(collapsed.column("ehic_2005").is_err());
        let by_id: std::collections::BTreeMap<String, Option<String>> = {
            let ids = string_values(collapsed.column("bene_id").unwrap()).unwrap();
            let ehic = string_values(collapsed.column("ehic").unwrap()).unwrap();
            ids.into_iter()
                .map(|id| id.unwrap())
                .zip(ehic)
                .collect()
        };
        assert_eq!(by_id["a"], Some("e1".to_string()));
        assert_eq!(by_id["b"], Some("e2".to_string()));
        assert_eq!(by_id["c"], Some("e3".to_string()));
    }

    #[test]
    fn enrollment_columns_drop_after_alignment() {
        let frame = DataFrame::new(vec![
            Series::new("bene_id".into(), vec!["a"]).into(),
            Series::new("buyin01_2008".into(), vec!["3"]).into(),
            Series::new("hmoind12_2009".into(), vec!["0"]).into(),
            Series::new("age_2008".into(), vec![70i64]).into(),
        ])
        .unwrap();
        let out =
            drop_enrollment_columns(frame, &["buyin", "hmoind"], &[2008, 2009], &[]).unwrap();
        assert_eq!(
            out.get_column_names()
                .into_iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            vec!["bene_id".to_string(), "age_2008".to_string()]
        );
    }
}
