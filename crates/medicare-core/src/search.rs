//! The claim code-search pipeline.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use polars::prelude::{DataFrame, Series};
use tracing::{debug, info};

use medicare_ingest::{ClaimSource, ReadRequest};
use medicare_model::{
    DataFamily, ExtractError, ID_SCHEME_BOUNDARY, Result, SearchOptions, YearMode,
};
use medicare_transform::frame_utils::{concat_rows, date_values, string_values};
use medicare_transform::identity::{Crosswalk, unify_claims};
use medicare_transform::matcher::{AgeWindow, MatchRequest, match_partition};
use medicare_transform::select_claim_columns;

use crate::cohort::Extract;

/// Matched claim tables, one per searched dataset family.
#[derive(Debug, Default)]
pub struct ClaimMatches {
    tables: BTreeMap<DataFamily, DataFrame>,
}

impl ClaimMatches {
    pub fn table(&self, family: DataFamily) -> Option<&DataFrame> {
        self.tables.get(&family)
    }

    pub fn tables(&self) -> impl Iterator<Item = (DataFamily, &DataFrame)> {
        self.tables.iter().map(|(family, frame)| (*family, frame))
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Birth dates keyed by each identifier scheme, for age-mode claim tagging.
struct BirthDates {
    bene_id: BTreeMap<String, NaiveDate>,
    ehic: BTreeMap<String, NaiveDate>,
}

fn id_series(frame: &DataFrame, name: &str) -> Result<Option<Series>> {
    match frame.column(name) {
        Ok(column) => Ok(Some(column.as_materialized_series().clone().drop_nulls())),
        Err(_) => Ok(None),
    }
}

fn birth_date_map(frame: &DataFrame, id: &str) -> Result<BTreeMap<String, NaiveDate>> {
    let mut map = BTreeMap::new();
    let Ok(id_column) = frame.column(id) else {
        return Ok(map);
    };
    let ids = string_values(id_column)?;
    let dates = date_values(frame.column("bene_dob")?)?;
    for row in 0..frame.height() {
        if let (Some(id), Some(date)) = (&ids[row], dates[row]) {
            map.entry(id.clone()).or_insert(date);
        }
    }
    Ok(map)
}

impl<S: ClaimSource> Extract<S> {
    /// Search the configured years of the requested claim families for the
    /// given codes.
    ///
    /// All option validation happens before any data is read. When a cohort
    /// has been built and `filter_by_cohort` is set, claims are restricted
    /// to its patients; the cohort itself is only read, never modified.
    pub fn search_codes(&mut self, options: &SearchOptions) -> Result<&ClaimMatches> {
        let rename = options.validate(&self.config)?;
        let codes = options.codes_by_family();
        let percent = self.config.percent();
        let year_mode = self.config.year_mode();
        let years: Vec<u16> = self.config.years().to_vec();
        let first_year = self.config.first_year();
        let last_year = self.config.last_year();

        let cohort_frame = self.cohort.as_ref().map(|c| &c.frame);
        let (bene_ids, ehic_ids) = match cohort_frame {
            Some(frame) if options.filter_by_cohort => {
                (id_series(frame, "bene_id")?, id_series(frame, "ehic")?)
            }
            _ => (None, None),
        };

        let birth_dates = if year_mode == YearMode::Age {
            let frame = cohort_frame.ok_or_else(|| ExtractError::InvalidOptions {
                message: "age-mode code search requires a previously built cohort".to_string(),
            })?;
            if frame.column("bene_dob").is_err() {
                return Err(ExtractError::InvalidOptions {
                    message: "age-mode code search requires the cohort to carry bene_dob"
                        .to_string(),
                });
            }
            Some(BirthDates {
                bene_id: birth_date_map(frame, "bene_id")?,
                ehic: birth_date_map(frame, "ehic")?,
            })
        } else {
            None
        };

        let needs_crosswalk = options.reconcile_ids && first_year < ID_SCHEME_BOUNDARY;
        let crosswalk = if needs_crosswalk {
            Some(self.load_crosswalk()?)
        } else {
            None
        };

        let mut tables = BTreeMap::new();
        for &family in &options.families {
            // Code families the dataset cannot carry are silently skipped
            // for it; a family left with no applicable codes is extracted
            // without match columns.
            let family_codes: BTreeMap<_, _> = codes
                .iter()
                .filter(|(code_family, _)| code_family.applies_to(family))
                .map(|(code_family, specs)| (*code_family, specs.clone()))
                .collect();
            let mut ehic_frames = Vec::new();
            let mut bene_id_frames = Vec::new();
            for &year in &years {
                let available = self.source.column_names(percent, year, family)?;
                let columns =
                    select_claim_columns(&available, year, family, options, year_mode)?;
                let scheme_ids = if year < ID_SCHEME_BOUNDARY {
                    &ehic_ids
                } else {
                    &bene_ids
                };

                let mut request =
                    ReadRequest::new(percent, year, family, columns.load.clone());
                if let Some(ids) = scheme_ids {
                    request = request.with_id_filter(columns.id.clone(), ids.clone());
                }

                let match_request = MatchRequest {
                    columns: &columns,
                    codes: &family_codes,
                    collapse: options.collapse_codes,
                    rename: &rename,
                    year,
                };
                let age_window = birth_dates.as_ref().map(|dates| AgeWindow {
                    is_first_year: year == first_year,
                    is_last_year: year == last_year,
                    birth_dates: if year < ID_SCHEME_BOUNDARY {
                        &dates.ehic
                    } else {
                        &dates.bene_id
                    },
                });

                let mut parts = Vec::new();
                for partition in self.source.partitions(&request)? {
                    parts.push(match_partition(
                        partition,
                        &match_request,
                        scheme_ids.as_ref(),
                        age_window.as_ref(),
                    )?);
                }
                let year_frame = concat_rows(parts)?;
                debug!(family = %family, year, rows = year_frame.height(), "claims scanned");
                if year < ID_SCHEME_BOUNDARY {
                    ehic_frames.push(year_frame);
                } else {
                    bene_id_frames.push(year_frame);
                }
            }
            let table = unify_claims(ehic_frames, bene_id_frames, crosswalk.as_ref())?;
            info!(family = %family, rows = table.height(), "claim table assembled");
            tables.insert(family, table);
        }

        Ok(self.claims.insert(ClaimMatches { tables }))
    }

    /// Crosswalk from the built cohort when it carries both schemes,
    /// otherwise loaded fresh from each legacy year's beneficiary summary.
    fn load_crosswalk(&self) -> Result<Crosswalk> {
        if let Some(cohort) = &self.cohort
            && let Some(crosswalk) = Crosswalk::from_table(&cohort.frame)?
            && !crosswalk.is_empty()
        {
            return Ok(crosswalk);
        }
        let percent = self.config.percent();
        let mut frames = Vec::new();
        for year in self.config.ehic_years() {
            let request = ReadRequest::new(
                percent,
                year,
                DataFamily::Bsfab,
                vec!["ehic".to_string(), "bene_id".to_string()],
            );
            frames.extend(self.source.partitions(&request)?);
        }
        Crosswalk::from_frames(frames)
    }
}
