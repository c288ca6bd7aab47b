//! Offset planning.
//!
//! Offsets are computed by folding a [`RenumberState`] over the surveyed
//! shards in their merge order. Nothing here touches a database, so the plan
//! for a given shard order is fully determined before the first rewrite.

use super::survey::ShardSurvey;
use std::path::PathBuf;

/// Whether oversized parents are split into synthetic groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    Disabled,
    Enabled { threshold: u64 },
}

impl Grouping {
    /// Grouping is global: one shard over the threshold turns it on for every shard.
    pub fn decide(surveys: &[ShardSurvey], threshold: u64) -> Self {
        if surveys.iter().any(|s| s.max_children() > threshold) {
            Grouping::Enabled { threshold }
        } else {
            Grouping::Disabled
        }
    }

    pub fn is_enabled(self) -> bool {
        matches!(self, Grouping::Enabled { .. })
    }
}

/// Offsets applied to one shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOffset {
    pub shard: PathBuf,
    /// Key given to the shard's lowest parent; the rest follow densely.
    pub parent_base: i64,
    /// First group id, when grouping is enabled.
    pub group_base: Option<i64>,
    /// Added to every non-null child key.
    pub child_key_offset: i64,
    /// Added to every non-null identifier of each object type.
    pub child_offsets: Vec<i64>,
}

/// Running totals carried from one shard to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenumberState {
    pub next_parent: i64,
    pub next_group: i64,
    pub child_key_offset: i64,
    pub child_offsets: Vec<i64>,
}

impl RenumberState {
    pub fn new(object_types: usize) -> Self {
        Self {
            next_parent: 1,
            next_group: 1,
            child_key_offset: 0,
            child_offsets: vec![0; object_types],
        }
    }

    /// Offsets for `survey` and the state the next shard starts from.
    pub fn advance(self, survey: &ShardSurvey, grouping: Grouping) -> (MergeOffset, Self) {
        let group_base = match grouping {
            Grouping::Enabled { .. } => Some(self.next_group),
            Grouping::Disabled => None,
        };
        let offset = MergeOffset {
            shard: survey.shard.clone(),
            parent_base: self.next_parent,
            group_base,
            child_key_offset: self.child_key_offset,
            child_offsets: self.child_offsets.clone(),
        };

        let groups = match grouping {
            Grouping::Enabled { threshold } => survey.group_count(threshold) as i64,
            Grouping::Disabled => 0,
        };
        let child_offsets = self
            .child_offsets
            .iter()
            .zip(survey.type_counts.iter())
            .map(|(offset, count)| offset + *count as i64)
            .collect();

        let next = Self {
            next_parent: self.next_parent + survey.parent_count() as i64,
            next_group: self.next_group + groups,
            child_key_offset: self.child_key_offset + survey.child_keys as i64,
            child_offsets,
        };
        (offset, next)
    }
}

/// Offsets for every shard, in order, plus the final running totals.
pub fn plan_offsets(
    surveys: &[ShardSurvey],
    grouping: Grouping,
    object_types: usize,
) -> (Vec<MergeOffset>, RenumberState) {
    surveys.iter().fold(
        (Vec::with_capacity(surveys.len()), RenumberState::new(object_types)),
        |(mut offsets, state), survey| {
            let (offset, next) = state.advance(survey, grouping);
            offsets.push(offset);
            (offsets, next)
        },
    )
}
