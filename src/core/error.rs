use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Shard '{}' excluded: {reason}", shard.display())]
    SchemaIncompatible { shard: PathBuf, reason: String },

    #[error("No mergeable shards: every candidate was excluded or none were supplied")]
    NoMergeableShards,

    #[error("Shard '{}': table '{table}' has no column '{column}'", shard.display())]
    MissingExpectedColumn {
        shard: PathBuf,
        table: String,
        column: String,
    },

    #[error("Shard '{}': {count} row(s) in '{table}' reference a missing parent", shard.display())]
    OrphanedChildRows {
        shard: PathBuf,
        table: String,
        count: u64,
    },

    #[error("Failed to attach shard '{}': {reason}", shard.display())]
    AttachmentFailure { shard: PathBuf, reason: String },

    #[error("Failed to copy table '{table}' from shard '{}': {reason}", shard.display())]
    CopyFailure {
        shard: PathBuf,
        table: String,
        reason: String,
    },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MergeError {
    /// Shard-scoped errors are logged and collected; everything else aborts the run.
    pub fn is_shard_scoped(&self) -> bool {
        matches!(
            self,
            Self::SchemaIncompatible { .. }
                | Self::AttachmentFailure { .. }
                | Self::CopyFailure { .. }
        )
    }

    /// Shard the error is attributed to, if any.
    pub fn shard(&self) -> Option<&PathBuf> {
        match self {
            Self::SchemaIncompatible { shard, .. }
            | Self::MissingExpectedColumn { shard, .. }
            | Self::OrphanedChildRows { shard, .. }
            | Self::AttachmentFailure { shard, .. }
            | Self::CopyFailure { shard, .. } => Some(shard),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MergeError>;
