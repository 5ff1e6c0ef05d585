//! Dataset families and their column roles.
//!
//! A "family" names one of the claim-level or beneficiary-summary source
//! datasets. The column names that carry a given role (claim identifier,
//! claim date, diagnosis codes) differ per family, so every role lookup
//! goes through this module instead of hard-coding names at call sites.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// First year in which beneficiaries are keyed by `bene_id`. Earlier data
/// is keyed by the legacy `ehic` identifier.
pub const ID_SCHEME_BOUNDARY: u16 = 2006;

/// Patient identifier column for a given data year.
pub fn patient_id_column(year: u16) -> &'static str {
    if year < ID_SCHEME_BOUNDARY { "ehic" } else { "bene_id" }
}

/// A source dataset family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DataFamily {
    /// Carrier claims.
    Carc,
    /// Carrier line items.
    Carl,
    /// Denominator file.
    Den,
    /// Inpatient claims.
    Ipc,
    /// Inpatient revenue-center records.
    Ipr,
    /// MedPAR hospital stays.
    Med,
    /// Outpatient claims.
    Opc,
    /// Outpatient revenue-center records.
    Opr,
    /// Beneficiary summary, part A/B segment.
    Bsfab,
    /// Beneficiary summary, chronic conditions segment.
    Bsfcc,
    /// Beneficiary summary, cost & use segment.
    Bsfcu,
    /// Beneficiary summary, part D segment.
    Bsfd,
}

/// Families that may be searched for claim codes.
pub const SEARCHABLE_FAMILIES: &[&str] = &["carc", "carl", "ipc", "ipr", "med", "opc", "opr"];

impl DataFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFamily::Carc => "carc",
            DataFamily::Carl => "carl",
            DataFamily::Den => "den",
            DataFamily::Ipc => "ipc",
            DataFamily::Ipr => "ipr",
            DataFamily::Med => "med",
            DataFamily::Opc => "opc",
            DataFamily::Opr => "opr",
            DataFamily::Bsfab => "bsfab",
            DataFamily::Bsfcc => "bsfcc",
            DataFamily::Bsfcu => "bsfcu",
            DataFamily::Bsfd => "bsfd",
        }
    }

    /// True for claim-level families that `search_codes` accepts.
    pub fn is_searchable(&self) -> bool {
        matches!(
            self,
            DataFamily::Carc
                | DataFamily::Carl
                | DataFamily::Ipc
                | DataFamily::Ipr
                | DataFamily::Med
                | DataFamily::Opc
                | DataFamily::Opr
        )
    }

    /// HCPCS procedure codes live in the line-item families only.
    pub fn carries_hcpcs(&self) -> bool {
        matches!(self, DataFamily::Carl | DataFamily::Ipr | DataFamily::Opr)
    }

    /// Diagnosis code columns are present on claim headers and carrier lines.
    pub fn carries_diagnosis(&self) -> bool {
        matches!(
            self,
            DataFamily::Carc
                | DataFamily::Carl
                | DataFamily::Ipc
                | DataFamily::Med
                | DataFamily::Opc
        )
    }

    /// ICD-9 procedure code columns are present on institutional claims.
    pub fn carries_procedure(&self) -> bool {
        matches!(self, DataFamily::Ipc | DataFamily::Med | DataFamily::Opc)
    }

    /// Anchored pattern matching this family's claim identifier column.
    pub fn claim_id_pattern(&self) -> &'static str {
        match self {
            DataFamily::Med => r"^medparid$",
            _ => r"^clm_id$|^claimindex$",
        }
    }

    /// Anchored pattern matching this family's diagnosis code columns. The
    /// first capture group holds the column's ordinal, where numbered.
    pub fn diagnosis_pattern(&self) -> &'static str {
        match self {
            DataFamily::Carl => r"^icd_dgns_cd(\d*)$",
            DataFamily::Med => r"^dgnscd(\d+)$",
            _ => r"^icd_dgns_cd(\d+)$",
        }
    }

    pub fn hcpcs_pattern(&self) -> &'static str {
        r"^hcpcs_cd$"
    }

    pub fn procedure_pattern(&self) -> &'static str {
        r"^icd_prcdr_cd\d+$"
    }

    /// Column holding the claim's service date, used only in age-year mode.
    pub fn claim_date_column(&self) -> &'static str {
        match self {
            DataFamily::Med => "admsndt",
            _ => "from_dt",
        }
    }
}

impl fmt::Display for DataFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "carc" => Ok(DataFamily::Carc),
            "carl" => Ok(DataFamily::Carl),
            "den" => Ok(DataFamily::Den),
            "ipc" => Ok(DataFamily::Ipc),
            "ipr" => Ok(DataFamily::Ipr),
            "med" => Ok(DataFamily::Med),
            "opc" => Ok(DataFamily::Opc),
            "opr" => Ok(DataFamily::Opr),
            "bsfab" => Ok(DataFamily::Bsfab),
            "bsfcc" => Ok(DataFamily::Bsfcc),
            "bsfcu" => Ok(DataFamily::Bsfcu),
            "bsfd" => Ok(DataFamily::Bsfd),
            _ => Err(format!("Unknown dataset family: {s}")),
        }
    }
}

/// The three claim code families a search may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CodeFamily {
    Hcpcs,
    Diagnosis,
    Procedure,
}

impl CodeFamily {
    /// Canonical tag, matching the argument names of the original tooling.
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeFamily::Hcpcs => "hcpcs",
            CodeFamily::Diagnosis => "icd9_dx",
            CodeFamily::Procedure => "icd9_sg",
        }
    }

    /// Whether `family` carries code columns for this code family.
    pub fn applies_to(&self, family: DataFamily) -> bool {
        match self {
            CodeFamily::Hcpcs => family.carries_hcpcs(),
            CodeFamily::Diagnosis => family.carries_diagnosis(),
            CodeFamily::Procedure => family.carries_procedure(),
        }
    }
}

impl fmt::Display for CodeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_round_trip() {
        for tag in SEARCHABLE_FAMILIES {
            let family: DataFamily = tag.parse().unwrap();
            assert_eq!(family.as_str(), *tag);
            assert!(family.is_searchable());
        }
        assert!(!DataFamily::Bsfab.is_searchable());
        assert!("bogus".parse::<DataFamily>().is_err());
    }

    #[test]
    fn code_capabilities_follow_family() {
        assert!(DataFamily::Carl.carries_hcpcs());
        assert!(!DataFamily::Carc.carries_hcpcs());
        assert!(DataFamily::Med.carries_diagnosis());
        assert!(!DataFamily::Ipr.carries_diagnosis());
        assert!(DataFamily::Opc.carries_procedure());
        assert!(!DataFamily::Carl.carries_procedure());
    }

    #[test]
    fn id_column_switches_at_boundary() {
        assert_eq!(patient_id_column(2005), "ehic");
        assert_eq!(patient_id_column(2006), "bene_id");
    }
}
