//! Cohort and claim-search pipelines over columnar Medicare extracts.
//!
//! [`Extract`] owns a validated configuration and a claim source, and
//! exposes the two public pipelines: [`Extract::build_cohort`] and
//! [`Extract::search_codes`]. Results are explicit objects; the orchestrator
//! retains the latest of each so a search can filter against the cohort.

pub mod accounting;
pub mod cohort;
pub mod enrich;
pub mod search;

pub use accounting::DropAccounting;
pub use cohort::{Cohort, Extract};
pub use enrich::apply_matches;
pub use search::ClaimMatches;
