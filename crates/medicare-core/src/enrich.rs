//! Writing claim match flags back onto a cohort table.
//!
//! Matching never touches the cohort; carrying match indicators onto it is
//! this explicit, separate step. Existing indicator columns are OR-ed with
//! the new matches, so repeated searches accumulate.

use std::collections::HashSet;

use polars::prelude::DataFrame;

use medicare_model::Result;
use medicare_transform::frame_utils::{bool_column, string_values};

/// Copy boolean claim indicators onto the cohort, keyed by `bene_id`.
///
/// `indicators` names the claim-table columns to propagate: `match` for a
/// collapsed search, or the (possibly renamed) per-code columns otherwise.
/// A cohort patient gets `true` when any of their claims carries `true`.
pub fn apply_matches(
    cohort: &DataFrame,
    claims: &DataFrame,
    indicators: &[String],
) -> Result<DataFrame> {
    let claim_ids = string_values(claims.column("bene_id")?)?;
    let cohort_ids = string_values(cohort.column("bene_id")?)?;

    let mut out = cohort.clone();
    for name in indicators {
        let flags = claims.column(name)?.bool()?;
        let mut matched: HashSet<&str> = HashSet::new();
        for row in 0..claims.height() {
            if flags.get(row).unwrap_or(false)
                && let Some(id) = &claim_ids[row]
            {
                matched.insert(id.as_str());
            }
        }

        let existing: Vec<bool> = match out.column(name) {
            Ok(column) => column
                .bool()?
                .into_iter()
                .map(|v| v.unwrap_or(false))
                .collect(),
            Err(_) => vec![false; out.height()],
        };
        let values: Vec<bool> = cohort_ids
            .iter()
            .zip(existing)
            .map(|(id, prior)| {
                prior || id.as_deref().is_some_and(|id| matched.contains(id))
            })
            .collect();
        out.with_column(bool_column(name, values))?;
    }
    Ok(out)
}
