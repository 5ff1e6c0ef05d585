//! Construction-time configuration for an extraction instance.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};
use crate::family::ID_SCHEME_BOUNDARY;

/// Earliest year of source data.
pub const MIN_YEAR: u16 = 2001;
/// Latest year of source data.
pub const MAX_YEAR: u16 = 2015;

const PERCENT_TAGS: &[&str] = &["0001", "01", "05", "20", "100"];
const JOIN_TAGS: &[&str] = &["default", "left", "inner", "outer", "right"];

/// Sample fraction of the source data; only the fixed set published with the
/// source files exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SamplePercent {
    /// 0.01% sample.
    P0001,
    /// 1% sample.
    P01,
    /// 5% sample.
    P05,
    /// 20% sample.
    P20,
    /// Full file.
    P100,
}

impl SamplePercent {
    /// Canonical tag as used in source file names.
    pub fn tag(&self) -> &'static str {
        match self {
            SamplePercent::P0001 => "0001",
            SamplePercent::P01 => "01",
            SamplePercent::P05 => "05",
            SamplePercent::P20 => "20",
            SamplePercent::P100 => "100",
        }
    }

    /// Resolve a numeric percent (0.01, 1, 5, 20, 100).
    pub fn from_fraction(value: f64) -> Result<Self> {
        match value {
            v if v == 0.01 => Ok(SamplePercent::P0001),
            v if v == 1.0 => Ok(SamplePercent::P01),
            v if v == 5.0 => Ok(SamplePercent::P05),
            v if v == 20.0 => Ok(SamplePercent::P20),
            v if v == 100.0 => Ok(SamplePercent::P100),
            _ => Err(ExtractError::InvalidPercent {
                value: value.to_string(),
                allowed: PERCENT_TAGS,
            }),
        }
    }
}

impl fmt::Display for SamplePercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for SamplePercent {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "0001" => Ok(SamplePercent::P0001),
            "01" | "1" => Ok(SamplePercent::P01),
            "05" | "5" => Ok(SamplePercent::P05),
            "20" => Ok(SamplePercent::P20),
            "100" => Ok(SamplePercent::P100),
            other => Err(ExtractError::InvalidPercent {
                value: other.to_string(),
                allowed: PERCENT_TAGS,
            }),
        }
    }
}

/// Time frame the requested years are interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum YearMode {
    /// Jan 1 – Dec 31 of each requested year.
    #[default]
    Calendar,
    /// Birthday-to-birthday years, anchored per patient.
    Age,
}

impl FromStr for YearMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "calendar" => Ok(YearMode::Calendar),
            "age" => Ok(YearMode::Age),
            other => Err(format!("Unknown year mode: {other}")),
        }
    }
}

/// How the per-year beneficiary tables are combined.
///
/// Every mode is applied as a row filter over per-year presence flags after
/// a value-preserving union of all years. `Default` reproduces the historic
/// policy of the original tooling: outer semantics across all years except
/// the last, which joins left; a patient is retained when present in
/// any year before the last. That asymmetry is deliberate, documented
/// behavior, not an oversight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JoinMode {
    #[default]
    Default,
    /// Present in every requested year.
    Inner,
    /// Present in any requested year.
    Outer,
    /// Present in the first requested year.
    Left,
    /// Present in the last requested year.
    Right,
}

impl JoinMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinMode::Default => "default",
            JoinMode::Inner => "inner",
            JoinMode::Outer => "outer",
            JoinMode::Left => "left",
            JoinMode::Right => "right",
        }
    }
}

impl FromStr for JoinMode {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(JoinMode::Default),
            "inner" => Ok(JoinMode::Inner),
            "outer" => Ok(JoinMode::Outer),
            "left" => Ok(JoinMode::Left),
            "right" => Ok(JoinMode::Right),
            other => Err(ExtractError::UnsupportedJoin {
                value: other.to_string(),
                allowed: JOIN_TAGS,
            }),
        }
    }
}

/// Validated per-instance configuration: sample, years and time frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractConfig {
    percent: SamplePercent,
    years: Vec<u16>,
    year_mode: YearMode,
}

impl ExtractConfig {
    /// Build a validated configuration.
    ///
    /// Years are deduplicated and sorted ascending. Age mode needs at least
    /// two years and a gap-free sequence, since each age year spans two
    /// adjacent calendar years.
    pub fn new(percent: SamplePercent, years: impl Into<Vec<u16>>, year_mode: YearMode) -> Result<Self> {
        let mut years: Vec<u16> = years.into();
        years.sort_unstable();
        years.dedup();

        if years.is_empty() {
            return Err(ExtractError::InvalidYears {
                message: "at least one year is required".to_string(),
            });
        }
        if let Some(&year) = years.iter().find(|y| !(MIN_YEAR..=MAX_YEAR).contains(y)) {
            return Err(ExtractError::InvalidYears {
                message: format!("year {year} is outside the available range {MIN_YEAR}-{MAX_YEAR}"),
            });
        }
        if year_mode == YearMode::Age {
            if years.len() < 2 {
                return Err(ExtractError::InvalidYears {
                    message: "age mode requires at least two years".to_string(),
                });
            }
            if years.windows(2).any(|w| w[1] != w[0] + 1) {
                return Err(ExtractError::InvalidYears {
                    message: format!("age mode requires contiguous years, got {years:?}"),
                });
            }
        }

        Ok(Self {
            percent,
            years,
            year_mode,
        })
    }

    pub fn percent(&self) -> SamplePercent {
        self.percent
    }

    pub fn years(&self) -> &[u16] {
        &self.years
    }

    pub fn year_mode(&self) -> YearMode {
        self.year_mode
    }

    pub fn first_year(&self) -> u16 {
        self.years[0]
    }

    pub fn last_year(&self) -> u16 {
        self.years[self.years.len() - 1]
    }

    /// Requested years keyed by the legacy identifier scheme.
    pub fn ehic_years(&self) -> impl Iterator<Item = u16> + '_ {
        self.years.iter().copied().filter(|&y| y < ID_SCHEME_BOUNDARY)
    }

    /// Requested years keyed by `bene_id`.
    pub fn bene_id_years(&self) -> impl Iterator<Item = u16> + '_ {
        self.years.iter().copied().filter(|&y| y >= ID_SCHEME_BOUNDARY)
    }

    /// True when the year range spans both identifier schemes.
    pub fn spans_id_boundary(&self) -> bool {
        self.first_year() < ID_SCHEME_BOUNDARY && self.last_year() >= ID_SCHEME_BOUNDARY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_resolution() {
        assert_eq!(SamplePercent::from_fraction(0.01).unwrap(), SamplePercent::P0001);
        assert_eq!(SamplePercent::from_fraction(20.0).unwrap(), SamplePercent::P20);
        assert!(SamplePercent::from_fraction(2.0).is_err());
        assert_eq!("01".parse::<SamplePercent>().unwrap(), SamplePercent::P01);
        assert_eq!(SamplePercent::P0001.tag(), "0001");
    }

    #[test]
    fn age_mode_needs_two_contiguous_years() {
        assert!(ExtractConfig::new(SamplePercent::P01, vec![2008], YearMode::Age).is_err());
        assert!(ExtractConfig::new(SamplePercent::P01, vec![2008, 2010], YearMode::Age).is_err());
        let config =
            ExtractConfig::new(SamplePercent::P01, vec![2009, 2008], YearMode::Age).unwrap();
        assert_eq!(config.years(), &[2008, 2009]);
    }

    #[test]
    fn years_outside_range_rejected() {
        assert!(ExtractConfig::new(SamplePercent::P01, vec![1999], YearMode::Calendar).is_err());
        assert!(ExtractConfig::new(SamplePercent::P01, vec![2016], YearMode::Calendar).is_err());
        assert!(ExtractConfig::new(SamplePercent::P01, Vec::new(), YearMode::Calendar).is_err());
    }

    #[test]
    fn scheme_partition() {
        let config =
            ExtractConfig::new(SamplePercent::P01, vec![2004, 2005, 2006], YearMode::Calendar)
                .unwrap();
        assert!(config.spans_id_boundary());
        assert_eq!(config.ehic_years().collect::<Vec<_>>(), vec![2004, 2005]);
        assert_eq!(config.bene_id_years().collect::<Vec<_>>(), vec![2006]);
    }
}
