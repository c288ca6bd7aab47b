use super::ShardArgs;
use anyhow::{Context, Result};
use shardmerge::{ConstraintFinalizer, MergePipeline, MergeReport};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

pub fn merge(shards: &ShardArgs, discard: bool, no_finalize: bool, no_vacuum: bool) -> Result<ExitCode> {
    let config = shards
        .merge_config()?
        .discard_merged(discard)
        .finalize(!no_finalize)
        .vacuum(!no_vacuum);
    let set = shards.shard_set()?;
    info!(shards = set.file_count(), template = %set.template().display(), "starting merge");

    let report = MergePipeline::new(config)
        .run(&set)
        .with_context(|| format!("merge into {} failed", set.template().display()))?;
    println!("{report}");

    if report.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(issues = report.issues.len(), "merge finished with failures");
        Ok(ExitCode::FAILURE)
    }
}

pub fn validate(shards: &ShardArgs) -> Result<ExitCode> {
    let set = shards.shard_set()?;
    let verdicts = MergePipeline::new(shards.merge_config()?)
        .validate_only(&set)
        .context("validation failed")?;
    let report = MergeReport::new(set.template().to_path_buf(), verdicts);
    println!("{}", report.verdict_table());

    let excluded = report.excluded().count();
    println!("\n{} of {} shard(s) mergeable", report.verdicts.len() - excluded, report.verdicts.len());
    Ok(ExitCode::SUCCESS)
}

pub fn finalize(database: &Path, config: Option<&PathBuf>) -> Result<ExitCode> {
    let config = super::load_config(config)?;
    config.validate()?;
    ConstraintFinalizer::new(&config)
        .run(database)
        .with_context(|| format!("failed to finalize {}", database.display()))?;
    println!("declared keys on {}", database.display());
    Ok(ExitCode::SUCCESS)
}
