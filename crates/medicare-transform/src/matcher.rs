//! Scanning claim partitions for code matches.
//!
//! Each partition moves through a fixed sequence: loaded → filtered by
//! patient id → age-window tagged → matched → renamed → re-indexed. The
//! stages are independent per partition, so partitions can be processed in
//! any order and concatenated.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use polars::prelude::{DataFrame, NamedFrom, Series};

use medicare_model::{CodeFamily, CodeSpec, Result};

use crate::columns::ClaimColumns;
use crate::frame_utils::{bool_column, date_values, filter_rows, semi_join, string_values};
use crate::month_window::project_birthday;

/// What to match in one claim partition.
#[derive(Debug)]
pub struct MatchRequest<'a> {
    pub columns: &'a ClaimColumns,
    pub codes: &'a BTreeMap<CodeFamily, Vec<CodeSpec>>,
    pub collapse: bool,
    /// Canonical label → output column name, for non-collapsed output.
    pub rename: &'a BTreeMap<String, String>,
    pub year: u16,
}

/// Age-mode context for one (family, year) scan.
#[derive(Debug)]
pub struct AgeWindow<'a> {
    pub is_first_year: bool,
    pub is_last_year: bool,
    /// Patient id (in the claim year's scheme) → birth date.
    pub birth_dates: &'a BTreeMap<String, NaiveDate>,
}

fn code_columns<'a>(columns: &'a ClaimColumns, family: CodeFamily) -> &'a [String] {
    match family {
        CodeFamily::Hcpcs => &columns.hcpcs,
        CodeFamily::Diagnosis => &columns.diagnosis,
        CodeFamily::Procedure => &columns.procedure,
    }
}

/// Whether each claim falls on or after the patient's birthday in the claim
/// year. `None` when the claim date or birth date is unknown; such rows stay
/// in their calendar year.
fn older_flags(
    frame: &DataFrame,
    columns: &ClaimColumns,
    year: u16,
    birth_dates: &BTreeMap<String, NaiveDate>,
) -> Result<Vec<Option<bool>>> {
    let Some(date_column) = &columns.date else {
        return Ok(vec![None; frame.height()]);
    };
    let dates = date_values(frame.column(date_column)?)?;
    let ids = string_values(frame.column(&columns.id)?)?;
    let mut flags = Vec::with_capacity(frame.height());
    for row in 0..frame.height() {
        let flag = match (&ids[row], dates[row]) {
            (Some(id), Some(date)) => birth_dates
                .get(id)
                .and_then(|dob| project_birthday(*dob, i32::from(year)))
                .map(|birthday| date >= birthday),
            _ => None,
        };
        flags.push(flag);
    }
    Ok(flags)
}

fn match_mask(values: &[Vec<Option<String>>], code: &CodeSpec, rows: usize) -> Vec<bool> {
    let mut mask = vec![false; rows];
    for column in values {
        for (row, value) in column.iter().enumerate() {
            if !mask[row]
                && let Some(value) = value
                && code.matches(value)
            {
                mask[row] = true;
            }
        }
    }
    mask
}

/// Run one claim partition through the matching sequence.
///
/// The output keeps every surviving claim row, matched or not, with the
/// patient identifier first, a `year` column (realigned in age mode), the
/// requested keep columns, and the match indicator column(s). Code-bearing
/// columns are consumed by the scan and dropped from the output.
pub fn match_partition(
    frame: DataFrame,
    request: &MatchRequest<'_>,
    patient_ids: Option<&Series>,
    age: Option<&AgeWindow<'_>>,
) -> Result<DataFrame> {
    let columns = request.columns;

    // filtered by patient id
    let mut frame = match patient_ids {
        Some(ids) => semi_join(frame, &columns.id, ids)?,
        None => frame,
    };

    // age-window tagged
    let mut older = None;
    if let Some(age) = age {
        let mut flags = older_flags(&frame, columns, request.year, age.birth_dates)?;
        if age.is_first_year {
            let keep: Vec<bool> = flags.iter().map(|f| *f != Some(false)).collect();
            frame = filter_rows(&frame, &keep)?;
            flags = flags.into_iter().filter(|f| *f != Some(false)).collect();
        }
        if age.is_last_year {
            let keep: Vec<bool> = flags.iter().map(|f| *f != Some(true)).collect();
            frame = filter_rows(&frame, &keep)?;
            flags = flags.into_iter().filter(|f| *f != Some(true)).collect();
        }
        older = Some(flags);
    }

    // matched
    let rows = frame.height();
    let mut consumed: Vec<String> = Vec::new();
    let mut per_code: Vec<String> = Vec::new();
    let mut collapsed = vec![false; rows];
    for (family, codes) in request.codes {
        let code_cols = code_columns(columns, *family);
        if code_cols.is_empty() {
            continue;
        }
        let mut values = Vec::with_capacity(code_cols.len());
        for name in code_cols {
            values.push(string_values(frame.column(name)?)?);
        }
        for code in codes {
            let mask = match_mask(&values, code, rows);
            if request.collapse {
                for (row, hit) in mask.iter().enumerate() {
                    collapsed[row] = collapsed[row] || *hit;
                }
            } else {
                let label = code.canonical_label().to_string();
                frame.with_column(bool_column(&label, mask))?;
                per_code.push(label);
            }
        }
        consumed.extend(code_cols.iter().cloned());
    }

    let searched = !request.codes.is_empty();
    if searched {
        if request.collapse {
            frame.with_column(bool_column("match", collapsed))?;
        } else {
            let mut any = vec![false; rows];
            for label in &per_code {
                let flags = frame.column(label)?.bool()?;
                for row in 0..rows {
                    any[row] = any[row] || flags.get(row).unwrap_or(false);
                }
            }
            frame.with_column(bool_column("match", any))?;
        }
    }

    // renamed
    if !request.collapse {
        for label in &per_code {
            if let Some(new_name) = request.rename.get(label) {
                frame.rename(label, new_name.as_str().into())?;
            }
        }
    }

    // re-indexed: id first, year column (realigned in age mode), code
    // columns dropped.
    let years: Vec<i32> = match &older {
        Some(flags) => flags
            .iter()
            .map(|f| {
                if *f == Some(false) {
                    i32::from(request.year) - 1
                } else {
                    i32::from(request.year)
                }
            })
            .collect(),
        None => vec![i32::from(request.year); rows],
    };
    frame.with_column(Series::new("year".into(), years))?;

    let mut order: Vec<String> = vec![columns.id.clone()];
    for name in frame.get_column_names() {
        let name = name.to_string();
        if name != columns.id && !consumed.contains(&name) {
            order.push(name);
        }
    }
    Ok(frame.select(order)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_utils::int_values;

    fn claim_columns(date: Option<&str>) -> ClaimColumns {
        ClaimColumns {
            load: Vec::new(),
            id: "bene_id".to_string(),
            claim_id: vec!["clm_id".to_string()],
            date: date.map(ToString::to_string),
            hcpcs: Vec::new(),
            diagnosis: vec!["icd_dgns_cd1".to_string(), "icd_dgns_cd2".to_string()],
            procedure: Vec::new(),
        }
    }

    fn claims() -> DataFrame {
        DataFrame::new(vec![
            Series::new("bene_id".into(), vec!["a", "b", "c"]).into(),
            Series::new("clm_id".into(), vec!["c1", "c2", "c3"]).into(),
            Series::new("icd_dgns_cd1".into(), vec![Some("41001"), Some("2500"), None]).into(),
            Series::new("icd_dgns_cd2".into(), vec![None, Some("48011"), Some("41092")]).into(),
        ])
        .unwrap()
    }

    fn diagnosis_codes(sources: &[&str]) -> BTreeMap<CodeFamily, Vec<CodeSpec>> {
        let mut codes = BTreeMap::new();
        codes.insert(
            CodeFamily::Diagnosis,
            sources
                .iter()
                .map(|s| CodeSpec::pattern(s).unwrap())
                .collect(),
        );
        codes
    }

    #[test]
    fn per_code_columns_and_derived_match() {
        let columns = claim_columns(None);
        let codes = diagnosis_codes(&["^410", "^480"]);
        let rename = BTreeMap::new();
        let request = MatchRequest {
            columns: &columns,
            codes: &codes,
            collapse: false,
            rename: &rename,
            year: 2008,
        };
        let out = match_partition(claims(), &request, None, None).unwrap();

        let ami = out.column("^410").unwrap().bool().unwrap();
        let pneumonia = out.column("^480").unwrap().bool().unwrap();
        let matched = out.column("match").unwrap().bool().unwrap();
        assert_eq!(ami.get(0), Some(true));
        assert_eq!(ami.get(1), Some(false));
        assert_eq!(ami.get(2), Some(true)); // second diagnosis column
        assert_eq!(pneumonia.get(1), Some(true));
        assert_eq!(matched.get(0), Some(true));
        assert_eq!(matched.get(1), Some(true));
        assert_eq!(matched.get(2), Some(true));
        // Code-bearing columns are consumed.
        assert!(out.column("icd_dgns_cd1").is_err());
        // Identifier leads the output.
        assert_eq!(out.get_column_names()[0].as_str(), "bene_id");
    }

    #[test]
    fn collapse_equals_or_of_per_code_columns() {
        let columns = claim_columns(None);
        let codes = diagnosis_codes(&["^410", "^480"]);
        let rename = BTreeMap::new();
        let collapsed = match_partition(
            claims(),
            &MatchRequest {
                columns: &columns,
                codes: &codes,
                collapse: true,
                rename: &rename,
                year: 2008,
            },
            None,
            None,
        )
        .unwrap();
        let expanded = match_partition(
            claims(),
            &MatchRequest {
                columns: &columns,
                codes: &codes,
                collapse: false,
                rename: &rename,
                year: 2008,
            },
            None,
            None,
        )
        .unwrap();

        let collapsed_match = collapsed.column("match").unwrap().bool().unwrap();
        let expanded_match = expanded.column("match").unwrap().bool().unwrap();
        for row in 0..claims().height() {
            assert_eq!(collapsed_match.get(row), expanded_match.get(row));
        }
        // Collapsed output carries no per-code columns.
        assert!(collapsed.column("^410").is_err());
    }

    #[test]
    fn literal_codes_require_exact_cells() {
        let columns = claim_columns(None);
        let mut codes = BTreeMap::new();
        codes.insert(CodeFamily::Diagnosis, vec![CodeSpec::literal("2500")]);
        let rename = BTreeMap::new();
        let out = match_partition(
            claims(),
            &MatchRequest {
                columns: &columns,
                codes: &codes,
                collapse: true,
                rename: &rename,
                year: 2008,
            },
            None,
            None,
        )
        .unwrap();
        let matched = out.column("match").unwrap().bool().unwrap();
        assert_eq!(matched.get(0), Some(false));
        assert_eq!(matched.get(1), Some(true));
        assert_eq!(matched.get(2), Some(false));
    }

    #[test]
    fn rename_applies_to_per_code_columns() {
        let columns = claim_columns(None);
        let codes = diagnosis_codes(&["^410", "^480"]);
        let mut rename = BTreeMap::new();
        rename.insert("^410".to_string(), "ami".to_string());
        rename.insert("^480".to_string(), "pneumonia".to_string());
        let out = match_partition(
            claims(),
            &MatchRequest {
                columns: &columns,
                codes: &codes,
                collapse: false,
                rename: &rename,
                year: 2008,
            },
            None,
            None,
        )
        .unwrap();
        assert!(out.column("ami").is_ok());
        assert!(out.column("pneumonia").is_ok());
        assert!(out.column("^410").is_err());
    }

    #[test]
    fn patient_filter_restricts_rows_before_matching() {
        let columns = claim_columns(None);
        let codes = diagnosis_codes(&["^410"]);
        let rename = BTreeMap::new();
        let ids = Series::new("bene_id".into(), vec!["a"]);
        let out = match_partition(
            claims(),
            &MatchRequest {
                columns: &columns,
                codes: &codes,
                collapse: true,
                rename: &rename,
                year: 2008,
            },
            Some(&ids),
            None,
        )
        .unwrap();
        assert_eq!(out.height(), 1);
    }

    fn aged_claims() -> DataFrame {
        DataFrame::new(vec![
            Series::new("bene_id".into(), vec!["a", "a", "b"]).into(),
            Series::new("clm_id".into(), vec!["c1", "c2", "c3"]).into(),
            Series::new(
                "from_dt".into(),
                vec!["2008-03-01", "2008-09-01", "2008-01-15"],
            )
            .into(),
            Series::new("icd_dgns_cd1".into(), vec!["41001", "41001", "41001"]).into(),
            Series::new("icd_dgns_cd2".into(), vec![None::<&str>, None, None]).into(),
        ])
        .unwrap()
    }

    fn birth_dates() -> BTreeMap<String, NaiveDate> {
        let mut map = BTreeMap::new();
        map.insert(
            "a".to_string(),
            NaiveDate::from_ymd_opt(1936, 6, 15).unwrap(),
        );
        map.insert(
            "b".to_string(),
            NaiveDate::from_ymd_opt(1940, 2, 1).unwrap(),
        );
        map
    }

    #[test]
    fn interior_year_realigns_pre_birthday_claims() {
        let columns = claim_columns(Some("from_dt"));
        let codes = diagnosis_codes(&["^410"]);
        let rename = BTreeMap::new();
        let dates = birth_dates();
        let age = AgeWindow {
            is_first_year: false,
            is_last_year: false,
            birth_dates: &dates,
        };
        let out = match_partition(
            aged_claims(),
            &MatchRequest {
                columns: &columns,
                codes: &codes,
                collapse: true,
                rename: &rename,
                year: 2008,
            },
            None,
            Some(&age),
        )
        .unwrap();
        let years = int_values(out.column("year").unwrap()).unwrap();
        // a's March claim predates the June birthday and b's January claim
        // predates the February birthday: both belong to the previous age
        // year. a's September claim stays in 2008.
        assert_eq!(years, vec![Some(2007), Some(2008), Some(2007)]);
    }

    #[test]
    fn edge_years_discard_out_of_window_claims() {
        let columns = claim_columns(Some("from_dt"));
        let codes = diagnosis_codes(&["^410"]);
        let rename = BTreeMap::new();
        let dates = birth_dates();

        let first = AgeWindow {
            is_first_year: true,
            is_last_year: false,
            birth_dates: &dates,
        };
        let out = match_partition(
            aged_claims(),
            &MatchRequest {
                columns: &columns,
                codes: &codes,
                collapse: true,
                rename: &rename,
                year: 2008,
            },
            None,
            Some(&first),
        )
        .unwrap();
        // Both pre-birthday claims precede the first age year.
        assert_eq!(out.height(), 1);

        let last = AgeWindow {
            is_first_year: false,
            is_last_year: true,
            birth_dates: &dates,
        };
        let out = match_partition(
            aged_claims(),
            &MatchRequest {
                columns: &columns,
                codes: &codes,
                collapse: true,
                rename: &rename,
                year: 2008,
            },
            None,
            Some(&last),
        )
        .unwrap();
        // Post-birthday claims fall past the last requested age year; the
        // surviving pre-birthday rows belong to the previous calendar year.
        assert_eq!(out.height(), 2);
        let years = int_values(out.column("year").unwrap()).unwrap();
        assert_eq!(years, vec![Some(2007), Some(2007)]);
    }
}
