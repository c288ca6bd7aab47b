// ============================================================================
// shardmerge Library
// ============================================================================
//
// Consolidates many per-plate SQLite result shards into one database:
// validate every shard against a template, renumber parent and child
// identifiers into disjoint global ranges (grouping oversized parents),
// append the shards block by block, then declare keys on the result.

pub mod core;
pub mod connection;
pub mod storage;
pub mod validator;
pub mod renumber;
pub mod merge;
pub mod finalizer;
pub mod result;
pub mod facade;

// Re-export main types for convenience
pub use core::{ColumnDef, MergeError, Result, ShardClassification, TableSignature};
pub use connection::config::{MergeConfig, ObjectType};
pub use facade::{MergePipeline, ShardSet};
pub use finalizer::ConstraintFinalizer;
pub use merge::{BlockMergeEngine, MergeOutcome};
pub use renumber::{Grouping, MergeOffset, RenumberEngine, RenumberSummary};
pub use result::MergeReport;
pub use validator::{SchemaValidator, ShardVerdict};
