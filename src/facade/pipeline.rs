use crate::connection::{self, config::MergeConfig};
use crate::core::{MergeError, Result};
use crate::finalizer::ConstraintFinalizer;
use crate::merge::BlockMergeEngine;
use crate::renumber::RenumberEngine;
use crate::result::MergeReport;
use crate::validator::{SchemaValidator, ShardVerdict};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn};

/// Template plus the shards merged into it, in merge order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSet {
    template: PathBuf,
    shards: Vec<PathBuf>,
}

impl ShardSet {
    /// The first path is the template.
    pub fn new(paths: Vec<PathBuf>) -> Result<Self> {
        let mut paths = paths.into_iter();
        let template = paths.next().ok_or(MergeError::NoMergeableShards)?;
        Ok(Self::with_template(template, paths))
    }

    /// `template` is removed from `shards` wherever it appears; duplicates
    /// keep their first position.
    pub fn with_template(template: PathBuf, shards: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut seen = HashSet::from([template.clone()]);
        let shards = shards
            .into_iter()
            .filter(|shard| seen.insert(shard.clone()))
            .collect();
        Self { template, shards }
    }

    /// Read shard paths from a list file: one per line, blank lines and
    /// `#` comments ignored. Relative paths resolve against the list's directory.
    pub fn read_list(path: &Path) -> Result<Vec<PathBuf>> {
        let content = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or(Path::new(""));
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| {
                let entry = PathBuf::from(line);
                if entry.is_absolute() { entry } else { base.join(entry) }
            })
            .collect())
    }

    pub fn template(&self) -> &Path {
        &self.template
    }

    /// Shards other than the template.
    pub fn shards(&self) -> &[PathBuf] {
        &self.shards
    }

    /// Template first, then every shard.
    pub fn all(&self) -> Vec<PathBuf> {
        std::iter::once(self.template.clone())
            .chain(self.shards.iter().cloned())
            .collect()
    }

    /// Number of files, template included.
    pub fn file_count(&self) -> usize {
        self.shards.len() + 1
    }
}

/// Validate, renumber, merge and finalize a set of shards into the template.
pub struct MergePipeline {
    config: MergeConfig,
}

impl MergePipeline {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Classify every shard without writing anything.
    pub fn validate_only(&self, set: &ShardSet) -> Result<Vec<ShardVerdict>> {
        let span = info_span!("validate", shards = set.file_count());
        let _guard = span.enter();

        self.config.validate()?;
        let validator = SchemaValidator::from_template(set.template(), &self.config)?;
        Ok(set
            .all()
            .iter()
            .map(|shard| validator.validate(shard, &self.config))
            .collect())
    }

    /// Run the whole merge. The template file becomes the merged database.
    ///
    /// Excluded shards are never written to. A shard that fails to attach or
    /// copy is recorded in the report and the run continues; everything else
    /// aborts.
    pub fn run(&self, set: &ShardSet) -> Result<MergeReport> {
        let span = info_span!("merge", output = %set.template().display());
        let _guard = span.enter();

        let config = &self.config;
        config.validate()?;
        let validator = SchemaValidator::from_template(set.template(), config)?;
        let template = validator.template();

        let verdicts: Vec<ShardVerdict> = set
            .all()
            .iter()
            .map(|shard| validator.validate(shard, config))
            .collect();
        let mergeable: Vec<PathBuf> = verdicts
            .iter()
            .filter(|v| v.is_mergeable())
            .map(|v| v.shard.clone())
            .collect();
        let exclusions: Vec<MergeError> = verdicts.iter().filter_map(ShardVerdict::exclusion).collect();

        // The template always matches itself; at least one other shard must.
        if mergeable.len() < 2 {
            warn!(candidates = set.shards().len(), "no shard besides the template is mergeable");
            return Err(MergeError::NoMergeableShards);
        }
        info!(
            mergeable = mergeable.len(),
            excluded = exclusions.len(),
            "validation finished"
        );

        let mut report = MergeReport::new(set.template().to_path_buf(), verdicts);
        report.issues = exclusions;

        let renumbered = RenumberEngine::new(config, template).run(&mergeable)?;
        report.grouping = renumbered.grouping;
        report.parent_keys_allocated = renumbered.parent_keys_allocated();
        report.final_offsets = renumbered.totals.child_offsets.clone();

        let outcome = BlockMergeEngine::new(config, template).merge_into(set.template(), &mergeable[1..])?;
        report.blocks = outcome.blocks;
        report.merged = std::iter::once(set.template().to_path_buf())
            .chain(outcome.merged)
            .collect();
        report.discarded = outcome.discarded;
        report.issues.extend(outcome.issues);

        if config.finalize {
            ConstraintFinalizer::new(config).run(set.template())?;
            report.finalized = true;
        }
        if config.vacuum {
            let conn = connection::open(set.template(), config)?;
            conn.execute_batch("VACUUM")?;
            report.vacuumed = true;
        }

        info!(
            merged = report.merged_count(),
            issues = report.issues.len(),
            clean = report.is_clean(),
            "merge finished"
        );
        Ok(report)
    }
}
