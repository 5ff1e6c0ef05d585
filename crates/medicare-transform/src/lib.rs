//! Cohort filtering, year reshaping and claim code matching.
//!
//! The modules here are the algorithmic core of the extraction pipelines:
//! column selection, demographic filtering with drop accounting, month
//! window alignment (calendar and birthday-anchored), multi-year merging
//! with the wide→long reshape, identifier reconciliation across the 2006
//! scheme change, and claim code matching.

pub mod columns;
pub mod demographic;
pub mod frame_utils;
pub mod identity;
pub mod matcher;
pub mod month_window;
pub mod reshape;

pub use columns::{ClaimColumns, CohortColumns, select_claim_columns, select_cohort_columns};
pub use demographic::{FilterOutcome, ResolvedFilters, StageDrop, apply_demographic_filters};
pub use identity::{Crosswalk, unify_claims};
pub use matcher::{AgeWindow, MatchRequest, match_partition};
pub use month_window::{
    all_in_allowed_mask, boundary_masks, half_year_masks, project_birthday,
};
pub use reshape::{
    CONSTANT_STUBS, YearTable, boundary_row_filter, collapse_constants, drop_enrollment_columns,
    presence_row_filter, reshape_long, suffix_year, union_years,
};
