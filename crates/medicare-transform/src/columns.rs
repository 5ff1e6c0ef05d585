//! Column selection against a dataset's available column names.
//!
//! Role columns are matched whole-name (the per-family patterns carry their
//! own anchors); caller-supplied keep patterns match by containment. A keep
//! entry that matches nothing is a soft warning, never an error: the data
//! simply does not carry that column for the year.

use regex::Regex;
use tracing::warn;

use medicare_model::{
    CohortOptions, DataFamily, KeepColumn, Result, SearchOptions, YearMode, patient_id_column,
};

/// Resolved beneficiary-summary columns for one year.
#[derive(Debug, Clone)]
pub struct CohortColumns {
    /// All columns to load, in file order.
    pub load: Vec<String>,
    /// Index column; always the `bene_id` scheme in the beneficiary summary.
    pub id: String,
    /// Monthly buy-in indicator columns present.
    pub buyin: Vec<String>,
    /// Monthly HMO indicator columns present.
    pub hmo: Vec<String>,
}

/// Resolved claim-table columns for one (family, year).
#[derive(Debug, Clone)]
pub struct ClaimColumns {
    pub load: Vec<String>,
    /// Patient identifier column for the year's scheme.
    pub id: String,
    /// Claim identifier column(s), resolved per family.
    pub claim_id: Vec<String>,
    /// Claim service date column, loaded only in age mode.
    pub date: Option<String>,
    pub hcpcs: Vec<String>,
    pub diagnosis: Vec<String>,
    pub procedure: Vec<String>,
}

fn keep_matches(keep: &KeepColumn, name: &str) -> bool {
    match keep {
        KeepColumn::Literal(text) => name == text,
        KeepColumn::Pattern(regex) => regex.is_match(name),
    }
}

/// Warn about keep entries that resolved to nothing.
fn warn_unmatched_keeps(keeps: &[KeepColumn], available: &[String], dataset: &str, year: u16) {
    for keep in keeps {
        if !available.iter().any(|name| keep_matches(keep, name)) {
            warn!(
                dataset,
                year,
                keep = keep.canonical_label(),
                "keep column matched nothing in the loaded data"
            );
        }
    }
}

/// Resolve the beneficiary-summary columns needed for a cohort request.
pub fn select_cohort_columns(
    available: &[String],
    year: u16,
    options: &CohortOptions,
    year_mode: YearMode,
) -> Result<CohortColumns> {
    let id = "bene_id".to_string();
    if !available.iter().any(|name| *name == id) {
        return Err(medicare_model::ExtractError::schema_mismatch(
            id,
            DataFamily::Bsfab.as_str(),
            year,
        ));
    }

    let month_buyin = Regex::new(r"^buyin\d{2}$").expect("static pattern");
    let month_hmo = Regex::new(r"^hmoind\d{2}$").expect("static pattern");

    let wants_dob = year_mode == YearMode::Age;
    let race_column = options.race_column();

    let mut load = Vec::new();
    let mut buyin = Vec::new();
    let mut hmo = Vec::new();
    for name in available {
        let is_role = name == "bene_id"
            || name == "ehic"
            || (options.gender.is_some() && name == "sex")
            || (options.ages.is_some() && name == "age")
            || (options.races.is_some() && name == race_column)
            || (options.buyin_values.is_some() && month_buyin.is_match(name))
            || (options.hmo_values.is_some() && month_hmo.is_match(name))
            || (wants_dob && name == "bene_dob");
        let is_kept = options.keep_columns.iter().any(|keep| keep_matches(keep, name));
        if !(is_role || is_kept) {
            continue;
        }
        load.push(name.clone());
        if options.buyin_values.is_some() && month_buyin.is_match(name) {
            buyin.push(name.clone());
        }
        if options.hmo_values.is_some() && month_hmo.is_match(name) {
            hmo.push(name.clone());
        }
    }

    warn_unmatched_keeps(
        &options.keep_columns,
        available,
        DataFamily::Bsfab.as_str(),
        year,
    );

    Ok(CohortColumns {
        load,
        id,
        buyin,
        hmo,
    })
}

/// Resolve claim-table columns for one (family, year) of a code search.
pub fn select_claim_columns(
    available: &[String],
    year: u16,
    family: DataFamily,
    options: &SearchOptions,
    year_mode: YearMode,
) -> Result<ClaimColumns> {
    let id = patient_id_column(year).to_string();
    if !available.iter().any(|name| *name == id) {
        return Err(medicare_model::ExtractError::schema_mismatch(
            id,
            family.as_str(),
            year,
        ));
    }

    let claim_id_re = Regex::new(family.claim_id_pattern()).expect("static pattern");
    let hcpcs_re = Regex::new(family.hcpcs_pattern()).expect("static pattern");
    let diagnosis_re = Regex::new(family.diagnosis_pattern()).expect("static pattern");
    let procedure_re = Regex::new(family.procedure_pattern()).expect("static pattern");

    let wants_hcpcs = !options.hcpcs.is_empty() && family.carries_hcpcs();
    let wants_diagnosis = !options.diagnosis.is_empty() && family.carries_diagnosis();
    let wants_procedure = !options.procedure.is_empty() && family.carries_procedure();
    let date_column = (year_mode == YearMode::Age).then(|| family.claim_date_column().to_string());
    let keeps = options
        .keep_columns
        .get(&family)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut load = Vec::new();
    let mut claim_id = Vec::new();
    let mut hcpcs = Vec::new();
    let mut diagnosis = Vec::new();
    let mut procedure = Vec::new();
    let mut date = None;
    for name in available {
        // Numbered diagnosis columns past the cap are excluded from the load
        // set entirely: never scanned, never returned.
        if wants_diagnosis
            && let Some(captures) = diagnosis_re.captures(name)
            && let Some(max) = options.diagnosis_max_cols
        {
            let ordinal = captures
                .get(1)
                .map(|m| m.as_str())
                .filter(|s| !s.is_empty())
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(1);
            if ordinal > max {
                continue;
            }
        }

        let mut is_role = false;
        if name == "bene_id" || name == "ehic" {
            is_role = true;
        }
        if claim_id_re.is_match(name) {
            is_role = true;
            claim_id.push(name.clone());
        }
        if wants_hcpcs && hcpcs_re.is_match(name) {
            is_role = true;
            hcpcs.push(name.clone());
        }
        if wants_diagnosis && diagnosis_re.is_match(name) {
            is_role = true;
            diagnosis.push(name.clone());
        }
        if wants_procedure && procedure_re.is_match(name) {
            is_role = true;
            procedure.push(name.clone());
        }
        if date_column.as_deref() == Some(name.as_str()) {
            is_role = true;
            date = Some(name.clone());
        }
        let is_kept = keeps.iter().any(|keep| keep_matches(keep, name));
        if is_role || is_kept {
            load.push(name.clone());
        }
    }

    warn_unmatched_keeps(keeps, available, family.as_str(), year);
    if wants_hcpcs && hcpcs.is_empty() {
        warn!(family = family.as_str(), year, "no HCPCS columns found to scan");
    }
    if wants_diagnosis && diagnosis.is_empty() {
        warn!(family = family.as_str(), year, "no diagnosis columns found to scan");
    }
    if wants_procedure && procedure.is_empty() {
        warn!(family = family.as_str(), year, "no procedure columns found to scan");
    }
    if let Some(expected) = &date_column
        && date.is_none()
    {
        return Err(medicare_model::ExtractError::schema_mismatch(
            expected.clone(),
            family.as_str(),
            year,
        ));
    }

    Ok(ClaimColumns {
        load,
        id,
        claim_id,
        date,
        hcpcs,
        diagnosis,
        procedure,
    })
}
