use crate::connection::config::MergeConfig;
use crate::core::{MergeError, Result};
use crate::storage::{Catalog, quote_ident};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Read-only facts about one shard, gathered before anything is rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSurvey {
    pub shard: PathBuf,
    /// Distinct non-null parent keys, ascending.
    pub parent_keys: Vec<i64>,
    /// Children per parent key; parents without children are absent.
    pub children_per_parent: BTreeMap<i64, u64>,
    /// Non-null child keys.
    pub child_keys: u64,
    /// Non-null identifier count per object type, in configuration order.
    pub type_counts: Vec<u64>,
}

impl ShardSurvey {
    pub fn parent_count(&self) -> u64 {
        self.parent_keys.len() as u64
    }

    pub fn max_children(&self) -> u64 {
        self.children_per_parent.values().copied().max().unwrap_or(0)
    }

    /// Groups this shard yields when every parent is cut into blocks of `threshold`.
    pub fn group_count(&self, threshold: u64) -> u64 {
        self.parent_keys
            .iter()
            .map(|key| {
                let children = self.children_per_parent.get(key).copied().unwrap_or(0);
                children.div_ceil(threshold).max(1)
            })
            .sum()
    }
}

/// Survey `shard`, failing on any missing identifier column, duplicate
/// parent key or orphaned child row.
pub fn survey_shard(conn: &Connection, shard: &Path, config: &MergeConfig) -> Result<ShardSurvey> {
    let catalog = Catalog::new(conn);
    require_columns(&catalog, shard, &config.parent_table, &[config.parent_key.clone()])?;
    require_columns(&catalog, shard, &config.child_table, &config.child_identifier_columns())?;

    let parent = quote_ident(&config.parent_table);
    let child = quote_ident(&config.child_table);
    let key = quote_ident(&config.parent_key);

    let (total, distinct): (i64, i64) = conn.query_row(
        &format!("SELECT COUNT({key}), COUNT(DISTINCT {key}) FROM {parent}"),
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    if total != distinct {
        return Err(MergeError::ConstraintViolation(format!(
            "shard '{}': {} duplicate key(s) in {}.{}",
            shard.display(),
            total - distinct,
            config.parent_table,
            config.parent_key
        )));
    }

    let orphans: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {child} c WHERE c.{key} IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM {parent} p WHERE p.{key} = c.{key})"
        ),
        [],
        |row| row.get(0),
    )?;
    if orphans > 0 {
        return Err(MergeError::OrphanedChildRows {
            shard: shard.to_path_buf(),
            table: config.child_table.clone(),
            count: orphans as u64,
        });
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT {key} FROM {parent} WHERE {key} IS NOT NULL ORDER BY {key}"
    ))?;
    let parent_keys = stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {key}, COUNT(*) FROM {child} WHERE {key} IS NOT NULL GROUP BY {key}"
    ))?;
    let children_per_parent = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as u64)))?
        .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

    let child_keys: i64 = conn.query_row(
        &format!("SELECT COUNT({}) FROM {child}", quote_ident(&config.child_key)),
        [],
        |row| row.get(0),
    )?;

    let type_counts = config
        .object_types
        .iter()
        .map(|object| -> Result<u64> {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT({}) FROM {child}", quote_ident(&object.column())),
                [],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ShardSurvey {
        shard: shard.to_path_buf(),
        parent_keys,
        children_per_parent,
        child_keys: child_keys as u64,
        type_counts,
    })
}

fn require_columns(catalog: &Catalog<'_>, shard: &Path, table: &str, columns: &[String]) -> Result<()> {
    let present = catalog.column_names(table)?;
    match columns.iter().find(|c| !present.contains(c)) {
        Some(missing) => Err(MergeError::MissingExpectedColumn {
            shard: shard.to_path_buf(),
            table: table.to_string(),
            column: missing.clone(),
        }),
        None => Ok(()),
    }
}
