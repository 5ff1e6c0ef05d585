//! Coded-value labels for the beneficiary summary fields.
//!
//! The demographic filter accepts free-text values ("female", "asian") and
//! resolves them here against the documented value labels of the beneficiary
//! summary file. Only the fields the filter consumes are carried; the tables
//! are embedded because they are tiny and fixed by the source documentation.

use medicare_model::{DataFamily, ExtractError, Result};

/// One documented field: its human label and coded-value labels.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub label: &'static str,
    pub values: &'static [(&'static str, &'static str)],
}

const SEX: Field = Field {
    name: "sex",
    label: "Beneficiary sex",
    values: &[("0", "Unknown"), ("1", "Male"), ("2", "Female")],
};

const RACE: Field = Field {
    name: "race",
    label: "Beneficiary race",
    values: &[
        ("0", "Unknown"),
        ("1", "White"),
        ("2", "Black"),
        ("3", "Other"),
        ("4", "Asian"),
        ("5", "Hispanic"),
        ("6", "North American Native"),
    ],
};

const RTI_RACE: Field = Field {
    name: "rti_race_cd",
    label: "Research Triangle Institute race code",
    values: &[
        ("0", "Unknown"),
        ("1", "Non-Hispanic White"),
        ("2", "Black"),
        ("3", "Other"),
        ("4", "Asian/Pacific Islander"),
        ("5", "Hispanic"),
        ("6", "American Indian/Alaska Native"),
    ],
};

/// Look up a documented field for a dataset family.
pub fn field(family: DataFamily, name: &str) -> Option<&'static Field> {
    if family != DataFamily::Bsfab {
        return None;
    }
    match name {
        "sex" => Some(&SEX),
        "race" => Some(&RACE),
        "rti_race_cd" => Some(&RTI_RACE),
        _ => None,
    }
}

/// Resolve a gender argument to its canonical code.
///
/// Accepts a numeric code, a full label, or a first-letter abbreviation,
/// case-insensitively.
pub fn resolve_gender(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if let Ok(code) = trimmed.parse::<i64>() {
        return Ok(code.to_string());
    }
    let lowered = trimmed.to_lowercase();
    for (code, label) in SEX.values {
        let label = label.to_lowercase();
        if lowered == label || (lowered.len() == 1 && label.starts_with(&lowered)) {
            return Ok((*code).to_string());
        }
    }
    Err(ExtractError::UnresolvedValue {
        field: "gender",
        value: value.to_string(),
    })
}

/// Resolve one race argument to its canonical code.
///
/// Numeric input is taken as a code. Free text is matched case-insensitively
/// as a substring of the value labels and must match exactly one label.
pub fn resolve_race(value: &str, rti_race: bool) -> Result<String> {
    let field = if rti_race { &RTI_RACE } else { &RACE };
    let trimmed = value.trim();
    if let Ok(code) = trimmed.parse::<i64>() {
        return Ok(code.to_string());
    }
    let lowered = trimmed.to_lowercase();
    let matches: Vec<(&str, &str)> = field
        .values
        .iter()
        .filter(|(_, label)| label.to_lowercase().contains(&lowered))
        .copied()
        .collect();
    match matches.as_slice() {
        [(code, _)] => Ok((*code).to_string()),
        [] => Err(ExtractError::UnresolvedValue {
            field: field.name,
            value: value.to_string(),
        }),
        many => Err(ExtractError::AmbiguousValue {
            field: field.name,
            value: value.to_string(),
            matches: many.iter().map(|(_, label)| (*label).to_string()).collect(),
        }),
    }
}

/// Resolve a collection of race arguments, preserving order.
pub fn resolve_races<'a>(
    values: impl IntoIterator<Item = &'a str>,
    rti_race: bool,
) -> Result<Vec<String>> {
    values
        .into_iter()
        .map(|value| resolve_race(value, rti_race))
        .collect()
}
