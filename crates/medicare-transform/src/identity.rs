//! Bridging the pre-2006 and post-2006 patient identifier schemes.
//!
//! Claims before the boundary year are keyed by `ehic`; later claims by
//! `bene_id`. When a requested year range spans the boundary, the legacy
//! rows are translated onto `bene_id` through a crosswalk so one identifier
//! space keys the combined output.

use polars::prelude::{DataFrame, IntoLazy, JoinArgs, JoinType, col};

use medicare_model::Result;

use crate::frame_utils::{concat_rows, dedup_first};

/// An `ehic` → `bene_id` crosswalk.
#[derive(Debug, Clone)]
pub struct Crosswalk {
    frame: DataFrame,
}

impl Crosswalk {
    /// Build a crosswalk from any frame carrying `ehic` and `bene_id`
    /// columns, typically the already-built cohort table.
    ///
    /// Returns `None` when either column is missing.
    pub fn from_table(table: &DataFrame) -> Result<Option<Self>> {
        if table.column("ehic").is_err() || table.column("bene_id").is_err() {
            return Ok(None);
        }
        Self::build(table).map(Some)
    }

    /// Build a crosswalk from per-year beneficiary extracts of `ehic` and
    /// `bene_id`.
    pub fn from_frames(frames: Vec<DataFrame>) -> Result<Self> {
        let stacked = concat_rows(frames)?;
        Self::build(&stacked)
    }

    fn build(table: &DataFrame) -> Result<Self> {
        let pairs = table
            .select(["ehic", "bene_id"])?
            .lazy()
            .filter(col("ehic").is_not_null().and(col("bene_id").is_not_null()))
            .collect()?;
        let frame = dedup_first(&pairs, &["ehic"])?;
        Ok(Self { frame })
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Attach `bene_id` to a legacy-keyed claim frame by joining on `ehic`.
    /// Rows without a crosswalk entry keep a null `bene_id`.
    pub fn attach_bene_id(&self, claims: DataFrame) -> Result<DataFrame> {
        let joined = claims
            .lazy()
            .join(
                self.frame.clone().lazy(),
                [col("ehic")],
                [col("ehic")],
                JoinArgs::new(JoinType::Left),
            )
            .collect()?;
        Ok(joined)
    }
}

/// Combine legacy-keyed and `bene_id`-keyed claim frames into one table.
///
/// With a crosswalk, legacy frames are translated first; without one (the
/// opt-out path, valid only when no post-boundary years were requested) the
/// legacy key is left as-is. Frames are stacked with a column union so the
/// `ehic` column survives on translated rows.
pub fn unify_claims(
    ehic_frames: Vec<DataFrame>,
    bene_id_frames: Vec<DataFrame>,
    crosswalk: Option<&Crosswalk>,
) -> Result<DataFrame> {
    let mut frames = Vec::with_capacity(ehic_frames.len() + bene_id_frames.len());
    for frame in ehic_frames {
        match crosswalk {
            Some(crosswalk) => frames.push(crosswalk.attach_bene_id(frame)?),
            None => frames.push(frame),
        }
    }
    frames.extend(bene_id_frames);
    concat_rows(frames)
}
