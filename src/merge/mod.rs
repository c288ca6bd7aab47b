//! Block merge engine.
//!
//! Shards are attached to the target at most `attach_limit` at a time and
//! stay attached until their whole block is copied. Every template table of
//! every attached shard is appended into the target with `INSERT ... SELECT`. Failures are isolated per shard and table and handed
//! back to the caller instead of aborting the run.

use crate::connection::{self, config::MergeConfig};
use crate::core::{MergeError, Result, TableSignature};
use crate::storage::{Catalog, column_list, quote_ident};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::{error, info, info_span, warn};

/// Split `shards` into ordered blocks of at most `limit` entries.
pub fn partition_blocks(shards: &[PathBuf], limit: usize) -> Vec<&[PathBuf]> {
    shards.chunks(limit.max(1)).collect()
}

/// Result of merging all blocks.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub blocks: usize,
    /// Shards whose every table copied.
    pub merged: Vec<PathBuf>,
    /// Shard files removed after a clean merge.
    pub discarded: Vec<PathBuf>,
    /// Attachment and copy failures.
    pub issues: Vec<MergeError>,
}

pub struct BlockMergeEngine<'a> {
    config: &'a MergeConfig,
    template: &'a TableSignature,
}

impl<'a> BlockMergeEngine<'a> {
    pub fn new(config: &'a MergeConfig, template: &'a TableSignature) -> Self {
        Self { config, template }
    }

    /// Append every shard into `target`, block by block.
    pub fn merge_into(&self, target: &Path, shards: &[PathBuf]) -> Result<MergeOutcome> {
        let blocks = partition_blocks(shards, self.config.attach_limit);
        let mut outcome = MergeOutcome {
            blocks: blocks.len(),
            ..MergeOutcome::default()
        };
        info!(shards = shards.len(), blocks = blocks.len(), "merging shards");

        for (index, block) in blocks.iter().enumerate() {
            let span = info_span!("block", index = index + 1, of = blocks.len());
            let _guard = span.enter();

            let clean = self.merge_block(target, index, block, &mut outcome.issues)?;
            if self.config.discard_merged {
                for shard in &clean {
                    match std::fs::remove_file(shard) {
                        Ok(()) => outcome.discarded.push(shard.clone()),
                        Err(err) => warn!(shard = %shard.display(), error = %err, "could not discard merged shard"),
                    }
                }
            }
            outcome.merged.extend(clean);
        }

        Ok(outcome)
    }

    /// Merge one block; returns the shards that copied without failure.
    ///
    /// Every shard of the block is attached first, copied in order, and
    /// detached once the whole block is done.
    fn merge_block(
        &self,
        target: &Path,
        index: usize,
        block: &[PathBuf],
        issues: &mut Vec<MergeError>,
    ) -> Result<Vec<PathBuf>> {
        let conn = connection::open(target, self.config)?;
        let tables = self.target_tables(&conn)?;

        let mut attached = Vec::with_capacity(block.len());
        for (position, shard) in block.iter().enumerate() {
            let alias = connection::block_alias(index, position);
            match connection::attach(&conn, shard, &alias) {
                Ok(()) => attached.push((shard, alias)),
                Err(err) => {
                    error!(shard = %shard.display(), error = %err, "attach failed, skipping shard");
                    issues.push(MergeError::AttachmentFailure {
                        shard: shard.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let mut clean = Vec::with_capacity(attached.len());
        for (shard, alias) in &attached {
            let mut failed = false;
            for (table, columns) in &tables {
                if let Err(err) = copy_table(&conn, alias, table, columns) {
                    error!(shard = %shard.display(), table = %table, error = %err, "table copy failed");
                    issues.push(MergeError::CopyFailure {
                        shard: (*shard).clone(),
                        table: table.clone(),
                        reason: err.to_string(),
                    });
                    failed = true;
                }
            }
            if !failed {
                clean.push((*shard).clone());
            }
        }

        for (shard, alias) in &attached {
            if let Err(err) = connection::detach(&conn, alias) {
                warn!(shard = %shard.display(), error = %err, "detach failed");
            }
        }
        conn.close().map_err(|(_, err)| MergeError::Sqlite(err))?;
        info!(merged = clean.len(), attempted = block.len(), "block finished");
        Ok(clean)
    }

    /// Template tables in merge order with the target's current column lists.
    fn target_tables(&self, conn: &Connection) -> Result<Vec<(String, Vec<String>)>> {
        let catalog = Catalog::new(conn);
        self.template
            .merge_order(&self.config.parent_table, &self.config.child_table)
            .into_iter()
            .map(|table| -> Result<(String, Vec<String>)> {
                Ok((table.to_string(), catalog.column_names(table)?))
            })
            .collect()
    }
}

/// Append all rows of `alias.table` into `main.table`.
pub fn copy_table(conn: &Connection, alias: &str, table: &str, columns: &[String]) -> Result<usize> {
    let columns = column_list(columns);
    let sql = format!(
        "INSERT INTO main.{table} ({columns}) SELECT {columns} FROM {alias}.{table}",
        table = quote_ident(table),
        alias = quote_ident(alias),
    );
    Ok(conn.execute(&sql, [])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_blocks_respects_limit() {
        let shards: Vec<PathBuf> = (0..23).map(|i| PathBuf::from(format!("{i}.db"))).collect();
        let blocks = partition_blocks(&shards, 10);
        let sizes: Vec<usize> = blocks.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![10, 10, 3]);
        assert_eq!(blocks[2][0], PathBuf::from("20.db"));
    }

    #[test]
    fn test_partition_empty() {
        assert!(partition_blocks(&[], 10).is_empty());
    }

    #[test]
    fn test_block_stays_attached_until_copied() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.db");
        Connection::open(&target)
            .unwrap()
            .execute_batch("CREATE TABLE t (a INTEGER);")
            .unwrap();
        let shards: Vec<PathBuf> = (1..=3)
            .map(|i| {
                let path = dir.path().join(format!("s{i}.db"));
                Connection::open(&path)
                    .unwrap()
                    .execute_batch(&format!("CREATE TABLE t (a INTEGER); INSERT INTO t VALUES ({i});"))
                    .unwrap();
                path
            })
            .collect();

        // Three shards at once only fit under a limit of three.
        let config = MergeConfig::new().attach_limit(3);
        let mut template = TableSignature::new();
        template.insert("t".to_string(), vec![crate::core::ColumnDef::new("a", "INTEGER")]);
        let engine = BlockMergeEngine::new(&config, &template);

        let mut issues = Vec::new();
        let clean = engine.merge_block(&target, 0, &shards, &mut issues).unwrap();
        assert!(issues.is_empty(), "{:?}", issues);
        assert_eq!(clean, shards);

        let conn = Connection::open(&target).unwrap();
        let total: i64 = conn.query_row("SELECT SUM(a) FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(total, 6);
        let attached: i64 = conn
            .query_row("SELECT COUNT(*) FROM pragma_database_list", [], |r| r.get(0))
            .unwrap();
        assert_eq!(attached, 1);
    }

    #[test]
    fn test_copy_table_appends() {
        let dir = tempfile::tempdir().unwrap();
        let other = dir.path().join("other.db");
        Connection::open(&other)
            .unwrap()
            .execute_batch("CREATE TABLE t (a INTEGER, b TEXT, extra TEXT); INSERT INTO t VALUES (2, 'y', 'z');")
            .unwrap();

        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a INTEGER, b TEXT); INSERT INTO t VALUES (1, 'x');")
            .unwrap();
        connection::attach(&conn, &other, "db_0_0").unwrap();
        let copied = copy_table(&conn, "db_0_0", "t", &["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(copied, 1);
        let total: i64 = conn.query_row("SELECT SUM(a) FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(total, 3);
    }
}
