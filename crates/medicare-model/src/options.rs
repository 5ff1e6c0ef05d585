//! Option bags for the two public pipelines.
//!
//! Both structs follow the builder convention: `Default` plus chained
//! `with_*` setters, with cross-field validation gathered in one `validate`
//! call that runs before any data is read.

use std::collections::BTreeMap;

use crate::codes::{CodeSpec, RenameMap, ensure_distinct_labels};
use crate::config::{ExtractConfig, JoinMode};
use crate::error::{ExtractError, Result};
use crate::family::{CodeFamily, DataFamily, ID_SCHEME_BOUNDARY, SEARCHABLE_FAMILIES};

/// A column the caller wants carried through to the output.
///
/// Literal names must match a column exactly; patterns are tested by
/// containment against each available column name.
pub type KeepColumn = CodeSpec;

/// Options for cohort construction.
#[derive(Debug, Clone, Default)]
pub struct CohortOptions {
    /// Gender to keep: a canonical code or a free-text label ("F", "female").
    pub gender: Option<String>,
    /// Exact ages to keep.
    pub ages: Option<Vec<i64>>,
    /// Races to keep: canonical codes or free-text label fragments.
    pub races: Option<Vec<String>>,
    /// Filter on the Research Triangle Institute race code instead of the
    /// standard race code.
    pub rti_race: bool,
    /// Allowed monthly buy-in indicator values.
    pub buyin_values: Option<Vec<String>>,
    /// Allowed monthly HMO indicator values.
    pub hmo_values: Option<Vec<String>>,
    /// How the per-year tables are combined.
    pub join: JoinMode,
    /// Extra columns to keep in the output.
    pub keep_columns: Vec<KeepColumn>,
}

impl CohortOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    pub fn with_ages(mut self, ages: impl IntoIterator<Item = i64>) -> Self {
        self.ages = Some(ages.into_iter().collect());
        self
    }

    pub fn with_races(mut self, races: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.races = Some(races.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_rti_race(mut self, rti_race: bool) -> Self {
        self.rti_race = rti_race;
        self
    }

    pub fn with_buyin_values(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.buyin_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_hmo_values(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.hmo_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_join(mut self, join: JoinMode) -> Self {
        self.join = join;
        self
    }

    pub fn with_keep_columns(mut self, keep: impl Into<Vec<KeepColumn>>) -> Self {
        self.keep_columns = keep.into();
        self
    }

    /// The race column this request filters on.
    pub fn race_column(&self) -> &'static str {
        if self.rti_race { "rti_race_cd" } else { "race" }
    }

    /// True when any monthly enrollment-indicator filter was requested.
    pub fn has_enrollment_filter(&self) -> bool {
        self.buyin_values.is_some() || self.hmo_values.is_some()
    }
}

/// Options for claim code search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Claim families to scan.
    pub families: Vec<DataFamily>,
    /// HCPCS codes to look for.
    pub hcpcs: Vec<CodeSpec>,
    /// ICD-9 diagnosis codes to look for.
    pub diagnosis: Vec<CodeSpec>,
    /// Only scan the first N numbered diagnosis columns.
    pub diagnosis_max_cols: Option<usize>,
    /// ICD-9 procedure codes to look for.
    pub procedure: Vec<CodeSpec>,
    /// Extra columns to keep, per family.
    pub keep_columns: BTreeMap<DataFamily, Vec<KeepColumn>>,
    /// Collapse all codes into a single `match` column.
    pub collapse_codes: bool,
    /// Output column names for the per-code indicators.
    pub rename: RenameMap,
    /// Bridge legacy-scheme years onto `bene_id`. Defaults to true; opting
    /// out is only valid when no post-boundary years are requested.
    pub reconcile_ids: bool,
    /// Restrict claims to patients present in the previously built cohort.
    pub filter_by_cohort: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            families: Vec::new(),
            hcpcs: Vec::new(),
            diagnosis: Vec::new(),
            diagnosis_max_cols: None,
            procedure: Vec::new(),
            keep_columns: BTreeMap::new(),
            collapse_codes: true,
            rename: RenameMap::new(),
            reconcile_ids: true,
            filter_by_cohort: true,
        }
    }
}

impl SearchOptions {
    pub fn new(families: impl Into<Vec<DataFamily>>) -> Self {
        Self {
            families: families.into(),
            ..Self::default()
        }
    }

    pub fn with_hcpcs(mut self, codes: impl Into<Vec<CodeSpec>>) -> Self {
        self.hcpcs = codes.into();
        self
    }

    pub fn with_diagnosis(mut self, codes: impl Into<Vec<CodeSpec>>) -> Self {
        self.diagnosis = codes.into();
        self
    }

    pub fn with_diagnosis_max_cols(mut self, max: usize) -> Self {
        self.diagnosis_max_cols = Some(max);
        self
    }

    pub fn with_procedure(mut self, codes: impl Into<Vec<CodeSpec>>) -> Self {
        self.procedure = codes.into();
        self
    }

    pub fn with_keep_columns(mut self, family: DataFamily, keep: impl Into<Vec<KeepColumn>>) -> Self {
        self.keep_columns.insert(family, keep.into());
        self
    }

    pub fn with_collapse_codes(mut self, collapse: bool) -> Self {
        self.collapse_codes = collapse;
        self
    }

    pub fn with_rename(mut self, rename: RenameMap) -> Self {
        self.rename = rename;
        self
    }

    pub fn with_reconcile_ids(mut self, reconcile: bool) -> Self {
        self.reconcile_ids = reconcile;
        self
    }

    pub fn with_filter_by_cohort(mut self, filter: bool) -> Self {
        self.filter_by_cohort = filter;
        self
    }

    /// Codes per code family, for rename resolution and matching.
    pub fn codes_by_family(&self) -> BTreeMap<CodeFamily, Vec<CodeSpec>> {
        let mut map = BTreeMap::new();
        if !self.hcpcs.is_empty() {
            map.insert(CodeFamily::Hcpcs, self.hcpcs.clone());
        }
        if !self.diagnosis.is_empty() {
            map.insert(CodeFamily::Diagnosis, self.diagnosis.clone());
        }
        if !self.procedure.is_empty() {
            map.insert(CodeFamily::Procedure, self.procedure.clone());
        }
        map
    }

    pub fn has_codes(&self) -> bool {
        !self.hcpcs.is_empty() || !self.diagnosis.is_empty() || !self.procedure.is_empty()
    }

    /// Fail-fast validation of every cross-field rule, run before any read.
    ///
    /// Returns the resolved canonical-label → output-name map.
    pub fn validate(&self, config: &ExtractConfig) -> Result<BTreeMap<String, String>> {
        if self.families.is_empty() {
            return Err(ExtractError::InvalidOptions {
                message: "at least one dataset family is required".to_string(),
            });
        }
        for family in &self.families {
            if !family.is_searchable() {
                return Err(ExtractError::UnsupportedFamily {
                    value: family.as_str().to_string(),
                    allowed: SEARCHABLE_FAMILIES,
                });
            }
        }

        if self.collapse_codes && !self.rename.is_empty() {
            return Err(ExtractError::InvalidOptions {
                message: "rename is not allowed when collapse_codes is set".to_string(),
            });
        }
        if self.diagnosis_max_cols.is_some() && self.diagnosis.is_empty() {
            return Err(ExtractError::InvalidOptions {
                message: "diagnosis_max_cols is not allowed without diagnosis codes".to_string(),
            });
        }
        if !self.reconcile_ids && config.years().iter().any(|&y| y >= ID_SCHEME_BOUNDARY) {
            return Err(ExtractError::InvalidOptions {
                message: format!(
                    "identifier reconciliation can only be disabled when no year is {ID_SCHEME_BOUNDARY} \
                     or later"
                ),
            });
        }

        if !self.collapse_codes {
            let all: Vec<&CodeSpec> = self
                .hcpcs
                .iter()
                .chain(&self.diagnosis)
                .chain(&self.procedure)
                .collect();
            ensure_distinct_labels(all, "the requested code set")?;
        }

        self.rename.resolve(&self.codes_by_family())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SamplePercent, YearMode};

    fn config(years: Vec<u16>) -> ExtractConfig {
        ExtractConfig::new(SamplePercent::P01, years, YearMode::Calendar).unwrap()
    }

    #[test]
    fn rejects_non_searchable_family() {
        let options = SearchOptions::new(vec![DataFamily::Bsfab]);
        assert!(options.validate(&config(vec![2008])).is_err());
    }

    #[test]
    fn rejects_rename_with_collapse() {
        let options = SearchOptions::new(vec![DataFamily::Med])
            .with_diagnosis(vec![CodeSpec::pattern("^410").unwrap()])
            .with_rename(RenameMap::new().aligned(CodeFamily::Diagnosis, vec!["ami".to_string()]));
        assert!(options.validate(&config(vec![2008])).is_err());
    }

    #[test]
    fn rejects_max_cols_without_diagnosis() {
        let options = SearchOptions::new(vec![DataFamily::Med]).with_diagnosis_max_cols(2);
        assert!(options.validate(&config(vec![2008])).is_err());
    }

    #[test]
    fn rejects_duplicate_codes_without_collapse() {
        let options = SearchOptions::new(vec![DataFamily::Med])
            .with_diagnosis(vec![CodeSpec::literal("4100"), CodeSpec::literal("4100")])
            .with_collapse_codes(false);
        assert!(options.validate(&config(vec![2008])).is_err());

        // The same duplicates are fine when collapsing.
        let collapsed = SearchOptions::new(vec![DataFamily::Med])
            .with_diagnosis(vec![CodeSpec::literal("4100"), CodeSpec::literal("4100")]);
        assert!(collapsed.validate(&config(vec![2008])).is_ok());
    }

    #[test]
    fn rejects_unreconciled_post_boundary_years() {
        let options = SearchOptions::new(vec![DataFamily::Med]).with_reconcile_ids(false);
        assert!(options.validate(&config(vec![2005, 2006])).is_err());
        assert!(options.validate(&config(vec![2004, 2005])).is_ok());
    }
}
