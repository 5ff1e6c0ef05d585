//! Month-window tests over the 12 monthly indicator columns.
//!
//! Calendar mode asks one question per patient-year: are all twelve monthly
//! values in the allowed set. Age mode splits the question at each patient's
//! birth month into two half-year tests, "older" (birth month through
//! December) and "younger" (January through birth month), and combines the
//! older half of one year with the younger half of the next to decide a
//! year-boundary match.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use polars::prelude::DataFrame;

use medicare_model::Result;

use crate::frame_utils::string_values;

/// Project a birth date into `year`, applying the leap-day rule: February 29
/// becomes March 1 in non-leap years. Returns `None` only for years outside
/// the calendar's range.
pub fn project_birthday(dob: NaiveDate, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, dob.month(), dob.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1))
}

/// Per-row test that every listed column's value is in the allowed set.
///
/// A null cell fails the test; a column list that matches nothing is
/// vacuously true, mirroring the behavior of filtering on no columns.
pub fn all_in_allowed_mask(
    frame: &DataFrame,
    columns: &[String],
    allowed: &[String],
) -> Result<Vec<bool>> {
    let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
    let mut mask = vec![true; frame.height()];
    for name in columns {
        let values = string_values(frame.column(name)?)?;
        for (row, value) in values.iter().enumerate() {
            if !value.as_deref().is_some_and(|v| allowed.contains(v)) {
                mask[row] = false;
            }
        }
    }
    Ok(mask)
}

fn month_column(prefix: &str, month: u32, year: u16) -> String {
    format!("{prefix}{month:02}_{year}")
}

/// Per-month pass/fail for one year's indicator family on a merged frame.
///
/// `ok[month - 1][row]` is true when the month's value is allowed. Months
/// whose column is absent are `None` and skipped by the half-year tests.
fn month_ok(
    frame: &DataFrame,
    prefix: &str,
    year: u16,
    allowed: &HashSet<&str>,
) -> Result<Vec<Option<Vec<bool>>>> {
    let mut months = Vec::with_capacity(12);
    for month in 1..=12u32 {
        let name = month_column(prefix, month, year);
        match frame.column(&name) {
            Err(_) => months.push(None),
            Ok(column) => {
                let values = string_values(column)?;
                months.push(Some(
                    values
                        .iter()
                        .map(|v| v.as_deref().is_some_and(|v| allowed.contains(v)))
                        .collect(),
                ));
            }
        }
    }
    Ok(months)
}

/// The two half-year tests for one year of a merged, year-suffixed frame.
///
/// For each row, `older` is true when every month from the birth month
/// through December is allowed, `younger` when every month from January
/// through the birth month is. Rows without a birth month fail both.
pub fn half_year_masks(
    frame: &DataFrame,
    prefix: &str,
    year: u16,
    dob_months: &[Option<u32>],
    allowed: &[String],
) -> Result<(Vec<bool>, Vec<bool>)> {
    let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
    let months = month_ok(frame, prefix, year, &allowed)?;

    let rows = frame.height();
    let mut older = vec![false; rows];
    let mut younger = vec![false; rows];
    for row in 0..rows {
        let Some(dob_month) = dob_months[row] else {
            continue;
        };
        older[row] = (dob_month..=12).all(|month| {
            months[(month - 1) as usize]
                .as_ref()
                .is_none_or(|ok| ok[row])
        });
        younger[row] = (1..=dob_month).all(|month| {
            months[(month - 1) as usize]
                .as_ref()
                .is_none_or(|ok| ok[row])
        });
    }
    Ok((older, younger))
}

/// Year-boundary match flags for an age-mode extraction.
///
/// For each adjacent pair (Y, Y+1) of the requested years, a row matches
/// when the older half of Y and the younger half of Y+1 both hold. The
/// result has one mask per boundary, keyed by the earlier year.
pub fn boundary_masks(
    frame: &DataFrame,
    prefix: &str,
    years: &[u16],
    dob_months: &[Option<u32>],
    allowed: &[String],
) -> Result<Vec<(u16, Vec<bool>)>> {
    let mut masks = Vec::new();
    for pair in years.windows(2) {
        let (older, _) = half_year_masks(frame, prefix, pair[0], dob_months, allowed)?;
        let (_, younger) = half_year_masks(frame, prefix, pair[1], dob_months, allowed)?;
        let combined: Vec<bool> = older
            .iter()
            .zip(&younger)
            .map(|(o, y)| *o && *y)
            .collect();
        masks.push((pair[0], combined));
    }
    Ok(masks)
}
