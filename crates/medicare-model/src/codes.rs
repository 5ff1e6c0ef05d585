//! Code specifications and rename maps.
//!
//! A code to search for is either a literal string, compared for exact cell
//! equality, or a compiled pattern, tested by containment. Everything
//! downstream identifies a specification by its canonical label (the
//! literal text or the pattern source), so deduplication and renaming never
//! depend on object identity.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

use crate::error::{ExtractError, Result};
use crate::family::CodeFamily;

/// A single code specification.
#[derive(Debug, Clone)]
pub enum CodeSpec {
    /// Exact match against a cell value.
    Literal(String),
    /// Containment match against a cell value.
    Pattern(Regex),
}

impl CodeSpec {
    pub fn literal(text: impl Into<String>) -> Self {
        CodeSpec::Literal(text.into())
    }

    /// Compile `source` into a pattern specification.
    pub fn pattern(source: &str) -> Result<Self> {
        let regex = Regex::new(source).map_err(|e| ExtractError::InvalidCodes {
            message: format!("invalid code pattern `{source}`: {e}"),
        })?;
        Ok(CodeSpec::Pattern(regex))
    }

    /// The label used for deduplication, rename lookup and output columns.
    pub fn canonical_label(&self) -> &str {
        match self {
            CodeSpec::Literal(text) => text,
            CodeSpec::Pattern(regex) => regex.as_str(),
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, CodeSpec::Pattern(_))
    }

    /// Test one cell value against this specification.
    pub fn matches(&self, cell: &str) -> bool {
        match self {
            CodeSpec::Literal(text) => cell == text,
            CodeSpec::Pattern(regex) => regex.is_match(cell),
        }
    }
}

impl PartialEq for CodeSpec {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_label() == other.canonical_label()
    }
}

impl Eq for CodeSpec {}

/// Reject sets of specifications whose canonical labels collide.
///
/// `context` names the option being validated in the error message.
pub fn ensure_distinct_labels<'a>(
    specs: impl IntoIterator<Item = &'a CodeSpec>,
    context: &str,
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for spec in specs {
        let label = spec.canonical_label();
        if !seen.insert(label.to_string()) {
            return Err(ExtractError::InvalidCodes {
                message: format!("duplicate code `{label}` in {context}; codes must be distinct"),
            });
        }
    }
    Ok(())
}

/// Requested new column names for one code family.
#[derive(Debug, Clone)]
pub enum RenameSpec {
    /// One name per code, aligned with the order the codes were given in.
    Aligned(Vec<String>),
    /// Canonical label to new name.
    ByLabel(BTreeMap<String, String>),
}

/// Per-family rename requests for non-collapsed searches.
#[derive(Debug, Clone, Default)]
pub struct RenameMap {
    families: BTreeMap<CodeFamily, RenameSpec>,
}

impl RenameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, family: CodeFamily, spec: RenameSpec) -> Self {
        self.families.insert(family, spec);
        self
    }

    /// One name per code, in the order the codes were supplied.
    pub fn aligned(self, family: CodeFamily, names: impl Into<Vec<String>>) -> Self {
        self.set(family, RenameSpec::Aligned(names.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Resolve the requests into a flat canonical-label → new-name map.
    ///
    /// Aligned lists must match the length of the family's code list, and
    /// explicit labels must name codes actually being searched for.
    pub fn resolve(&self, codes: &BTreeMap<CodeFamily, Vec<CodeSpec>>) -> Result<BTreeMap<String, String>> {
        let mut resolved = BTreeMap::new();
        for (family, spec) in &self.families {
            let family_codes = codes.get(family).map(Vec::as_slice).unwrap_or_default();
            match spec {
                RenameSpec::Aligned(names) => {
                    if names.len() != family_codes.len() {
                        return Err(ExtractError::InvalidOptions {
                            message: format!(
                                "rename list for {family} has {} names but {} codes were given",
                                names.len(),
                                family_codes.len()
                            ),
                        });
                    }
                    for (code, name) in family_codes.iter().zip(names) {
                        resolved.insert(code.canonical_label().to_string(), name.clone());
                    }
                }
                RenameSpec::ByLabel(map) => {
                    for (label, name) in map {
                        if !family_codes.iter().any(|c| c.canonical_label() == label) {
                            return Err(ExtractError::InvalidOptions {
                                message: format!(
                                    "rename for {family} references `{label}`, which is not among \
                                     the codes being searched"
                                ),
                            });
                        }
                        resolved.insert(label.clone(), name.clone());
                    }
                }
            }
        }
        Ok(resolved)
    }
}
