//! Renumbering & grouping engine.
//!
//! Runs in three passes over the compatible shards, always in merge order:
//! a read-only survey of every shard, a pure offset plan folded over the
//! surveys, and a per-shard transactional rewrite.

pub mod apply;
pub mod grouping;
pub mod plan;
pub mod survey;

pub use apply::ShardRewrite;
pub use grouping::{GroupLayout, layout_groups};
pub use plan::{Grouping, MergeOffset, RenumberState, plan_offsets};
pub use survey::ShardSurvey;

use crate::connection::{self, config::MergeConfig};
use crate::core::{Result, TableSignature};
use std::path::PathBuf;
use tracing::{info, info_span};

/// Outcome of renumbering every compatible shard.
#[derive(Debug, Clone)]
pub struct RenumberSummary {
    pub grouping: Grouping,
    pub offsets: Vec<MergeOffset>,
    pub totals: RenumberState,
    pub rewrites: Vec<ShardRewrite>,
}

impl RenumberSummary {
    /// Parent keys allocated across all shards.
    pub fn parent_keys_allocated(&self) -> i64 {
        match self.grouping {
            Grouping::Enabled { .. } => self.totals.next_group - 1,
            Grouping::Disabled => self.totals.next_parent - 1,
        }
    }
}

pub struct RenumberEngine<'a> {
    config: &'a MergeConfig,
    template: &'a TableSignature,
}

impl<'a> RenumberEngine<'a> {
    pub fn new(config: &'a MergeConfig, template: &'a TableSignature) -> Self {
        Self { config, template }
    }

    /// Survey every shard; the first failing shard aborts the run.
    pub fn survey(&self, shards: &[PathBuf]) -> Result<Vec<ShardSurvey>> {
        shards
            .iter()
            .map(|shard| {
                let conn = connection::open_read_only(shard, self.config)?;
                survey::survey_shard(&conn, shard, self.config)
            })
            .collect()
    }

    /// Survey, plan and rewrite `shards` in the given order.
    pub fn run(&self, shards: &[PathBuf]) -> Result<RenumberSummary> {
        let span = info_span!("renumber", shards = shards.len());
        let _guard = span.enter();

        let surveys = self.survey(shards)?;
        let grouping = Grouping::decide(&surveys, self.config.group_threshold);
        if grouping.is_enabled() {
            info!(
                threshold = self.config.group_threshold,
                "a parent exceeds the child threshold, grouping every shard"
            );
        }

        let (offsets, totals) = plan_offsets(&surveys, grouping, self.config.object_types.len());

        let mut rewrites = Vec::with_capacity(surveys.len());
        for (index, (survey, offset)) in surveys.iter().zip(offsets.iter()).enumerate() {
            let mut conn = connection::open(&survey.shard, self.config)?;
            let rewrite =
                apply::rewrite_shard(&mut conn, self.template, survey, offset, grouping, self.config)?;
            info!(
                shard = %survey.shard.display(),
                position = index + 1,
                of = surveys.len(),
                parent_base = offset.parent_base,
                groups = rewrite.groups,
                "renumbered shard"
            );
            rewrites.push(rewrite);
        }

        Ok(RenumberSummary {
            grouping,
            offsets,
            totals,
            rewrites,
        })
    }
}
