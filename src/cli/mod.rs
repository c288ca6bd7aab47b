pub mod commands;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use shardmerge::{MergeConfig, ShardSet};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "shardmerge")]
#[command(about = "Merge per-plate SQLite result shards into one database")]
pub struct Cli {
    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate, renumber and merge every shard into the template
    Merge {
        #[command(flatten)]
        shards: ShardArgs,
        /// Delete each shard file once all of its tables were copied
        #[arg(long)]
        discard: bool,
        #[arg(long)]
        no_finalize: bool,
        #[arg(long)]
        no_vacuum: bool,
    },
    /// Classify shards against the template without writing anything
    Validate {
        #[command(flatten)]
        shards: ShardArgs,
    },
    /// Declare primary and foreign keys on an already merged database
    Finalize {
        database: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct ShardArgs {
    /// Shard databases, in merge order
    pub paths: Vec<PathBuf>,
    /// File listing one shard path per line
    #[arg(long)]
    pub list: Option<PathBuf>,
    /// Template shard and merge target (defaults to the first shard)
    #[arg(long)]
    pub template: Option<PathBuf>,
    /// JSON merge configuration
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Children per parent above which grouping starts
    #[arg(long)]
    pub threshold: Option<u64>,
    /// Shards attached to the target at once
    #[arg(long)]
    pub attach_limit: Option<usize>,
}

impl ShardArgs {
    pub fn merge_config(&self) -> Result<MergeConfig> {
        let mut config = load_config(self.config.as_ref())?;
        if let Some(threshold) = self.threshold {
            config = config.group_threshold(threshold);
        }
        if let Some(limit) = self.attach_limit {
            config = config.attach_limit(limit);
        }
        Ok(config)
    }

    /// Positional paths first, then the list file, with the template in front.
    pub fn shard_set(&self) -> Result<ShardSet> {
        let mut paths = self.paths.clone();
        if let Some(list) = &self.list {
            let listed = ShardSet::read_list(list)
                .with_context(|| format!("failed to read shard list {}", list.display()))?;
            paths.extend(listed);
        }
        let set = match &self.template {
            Some(template) => ShardSet::with_template(template.clone(), paths),
            None => ShardSet::new(paths).context("no shard databases given")?,
        };
        Ok(set)
    }
}

pub fn load_config(path: Option<&PathBuf>) -> Result<MergeConfig> {
    match path {
        Some(path) => MergeConfig::from_json_file(path)
            .with_context(|| format!("failed to load configuration {}", path.display())),
        None => Ok(MergeConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_merge_arguments() {
        let cli = Cli::try_parse_from([
            "shardmerge", "merge", "a.db", "t.db", "b.db", "--template", "t.db", "--threshold", "50",
            "--no-vacuum",
        ])
        .unwrap();
        let Command::Merge { shards, no_vacuum, discard, .. } = cli.command else {
            panic!("expected merge");
        };
        assert!(no_vacuum);
        assert!(!discard);
        assert_eq!(
            shards.shard_set().unwrap().all(),
            ["t.db", "a.db", "b.db"].map(PathBuf::from).to_vec()
        );
        assert_eq!(shards.merge_config().unwrap().group_threshold, 50);
    }

    #[test]
    fn test_list_file_extends_positional_paths() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("filenames.txt");
        std::fs::write(&list, "# plates\nplate2.db\n").unwrap();

        let cli = Cli::try_parse_from([
            "shardmerge",
            "validate",
            "plate1.db",
            "--list",
            list.to_str().unwrap(),
        ])
        .unwrap();
        let Command::Validate { shards } = cli.command else {
            panic!("expected validate");
        };
        let set = shards.shard_set().unwrap();
        assert_eq!(set.template(), PathBuf::from("plate1.db"));
        assert_eq!(set.shards(), [dir.path().join("plate2.db")]);
    }
}
