//! Revision retention policy.
//!
//! Remote stores keep every revision of a note file forever unless told
//! otherwise. This module decides which revisions of one file remain
//! retrievable: a dense recent window, thinning to daily then weekly
//! samples with age, plus explicitly flagged checkpoints.
//!
//! The policy is a pure function over a newest-first revision listing; the
//! engine fetches the listing and acts on the resulting plan.

use chrono::{DateTime, Utc};
use notesync_model::NoteVersion;
use std::collections::HashSet;

/// Hard ceiling on kept revisions per note.
pub const MAX_KEPT: usize = 100;
/// Newest revisions kept unconditionally.
pub const RECENT_KEPT: usize = 10;
/// Daily samples kept from the middle of the listing.
pub const DAILY_KEPT: usize = 10;
/// Weekly samples kept from the tail of the listing.
pub const WEEKLY_KEPT: usize = 10;
/// Checkpoint revisions kept on top of the chronological samples.
pub const CHECKPOINT_KEPT: usize = 5;

/// First listing position sampled daily (everything before is kept whole).
const DAILY_WINDOW_START: usize = RECENT_KEPT;
/// First listing position sampled weekly.
const WEEKLY_WINDOW_START: usize = 50;

/// The outcome of applying the retention policy to one file's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Revisions that remain retrievable, in keep order.
    pub keep: Vec<NoteVersion>,
    /// Revisions eligible for remote pruning, newest first.
    pub prune: Vec<NoteVersion>,
}

impl RetentionPlan {
    /// Builds a plan from a newest-first revision listing.
    ///
    /// Keep rules, applied in order, deduplicated by revision ID:
    /// 1. The [`RECENT_KEPT`] newest revisions.
    /// 2. From positions 10..50, the first revision seen per calendar day,
    ///    up to [`DAILY_KEPT`].
    /// 3. From position 50 on, the first revision seen per elapsed week
    ///    (whole weeks before `now`), up to [`WEEKLY_KEPT`].
    /// 4. Any checkpoint-flagged revision not already kept, newest first,
    ///    up to [`CHECKPOINT_KEPT`].
    /// 5. The result is truncated to [`MAX_KEPT`] in assembly order.
    pub fn build(revisions: &[NoteVersion], now: DateTime<Utc>) -> Self {
        let mut keep: Vec<NoteVersion> = Vec::new();
        let mut kept_ids: HashSet<&str> = HashSet::new();

        for revision in revisions.iter().take(RECENT_KEPT) {
            if kept_ids.insert(&revision.id) {
                keep.push(revision.clone());
            }
        }

        let mut seen_days = HashSet::new();
        let mut daily = 0usize;
        for revision in revisions
            .iter()
            .skip(DAILY_WINDOW_START)
            .take(WEEKLY_WINDOW_START - DAILY_WINDOW_START)
        {
            if daily == DAILY_KEPT {
                break;
            }
            let day = revision.modified_time.date_naive();
            if seen_days.insert(day) && kept_ids.insert(&revision.id) {
                keep.push(revision.clone());
                daily += 1;
            }
        }

        let mut seen_weeks = HashSet::new();
        let mut weekly = 0usize;
        for revision in revisions.iter().skip(WEEKLY_WINDOW_START) {
            if weekly == WEEKLY_KEPT {
                break;
            }
            let age_weeks = (now - revision.modified_time).num_days() / 7;
            if seen_weeks.insert(age_weeks) && kept_ids.insert(&revision.id) {
                keep.push(revision.clone());
                weekly += 1;
            }
        }

        let mut checkpoints = 0usize;
        for revision in revisions.iter().filter(|r| r.is_checkpoint) {
            if checkpoints == CHECKPOINT_KEPT {
                break;
            }
            if kept_ids.insert(&revision.id) {
                keep.push(revision.clone());
                checkpoints += 1;
            }
        }

        keep.truncate(MAX_KEPT);

        let final_ids: HashSet<&str> = keep.iter().map(|r| r.id.as_str()).collect();
        let prune = revisions
            .iter()
            .filter(|r| !final_ids.contains(r.id.as_str()))
            .cloned()
            .collect();

        Self { keep, prune }
    }

    /// Returns true if the plan keeps the given revision ID.
    pub fn keeps(&self, revision_id: &str) -> bool {
        self.keep.iter().any(|r| r.id == revision_id)
    }
}
