//! Rewriting one shard according to its [`MergeOffset`].

use super::grouping::layout_groups;
use super::plan::{Grouping, MergeOffset};
use super::survey::ShardSurvey;
use crate::connection::config::MergeConfig;
use crate::core::{MergeError, Result, TableSignature};
use crate::storage::{Catalog, ShadowTable, quote_ident};
use rusqlite::{Connection, params};
use tracing::debug;

const PARENT_MAP: &str = "temp.shardmerge_parent_map";
const CHILD_GROUPS: &str = "temp.shardmerge_child_groups";
const PARENT_GROUPS: &str = "temp.shardmerge_parent_groups";

/// What a rewrite produced for one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRewrite {
    pub parents: u64,
    pub groups: u64,
}

/// Rewrite every identifier of one shard inside a single transaction.
///
/// Template tables are first rebuilt without constraints. The child table is
/// rewritten before the parent table, whose new keys depend on the mapping
/// shared with the children.
pub fn rewrite_shard(
    conn: &mut Connection,
    template: &TableSignature,
    survey: &ShardSurvey,
    offset: &MergeOffset,
    grouping: Grouping,
    config: &MergeConfig,
) -> Result<ShardRewrite> {
    let tx = conn.transaction()?;

    strip_constraints(&tx, template)?;
    load_parent_map(&tx, survey, offset)?;
    shift_child_identifiers(&tx, offset, config)?;

    let groups = match grouping {
        Grouping::Disabled => {
            remap_parent_keys(&tx, config)?;
            0
        }
        Grouping::Enabled { threshold } => {
            let group_base = offset.group_base.ok_or_else(|| {
                MergeError::Config(format!(
                    "no group base planned for shard '{}'",
                    offset.shard.display()
                ))
            })?;
            apply_groups(&tx, survey, threshold, group_base, config)?
        }
    };

    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {PARENT_MAP};
         DROP TABLE IF EXISTS {CHILD_GROUPS};
         DROP TABLE IF EXISTS {PARENT_GROUPS};"
    ))?;
    tx.commit()?;

    Ok(ShardRewrite {
        parents: survey.parent_count(),
        groups,
    })
}

/// Rebuild each template table with bare column declarations.
fn strip_constraints(conn: &Connection, template: &TableSignature) -> Result<()> {
    let catalog = Catalog::new(conn);
    for table in template.table_names() {
        let columns = catalog.columns(table)?;
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        ShadowTable::unconstrained(table, &columns).rebuild(conn, &names)?;
    }
    Ok(())
}

/// Old parent key -> dense new key starting at `parent_base`.
fn load_parent_map(conn: &Connection, survey: &ShardSurvey, offset: &MergeOffset) -> Result<()> {
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {PARENT_MAP};
         CREATE TABLE {PARENT_MAP} (old_key INTEGER PRIMARY KEY, new_key INTEGER NOT NULL);"
    ))?;
    let mut insert = conn.prepare(&format!(
        "INSERT INTO {PARENT_MAP} (old_key, new_key) VALUES (?1, ?2)"
    ))?;
    for (rank, old_key) in survey.parent_keys.iter().enumerate() {
        insert.execute(params![old_key, offset.parent_base + rank as i64])?;
    }
    Ok(())
}

fn shift_child_identifiers(conn: &Connection, offset: &MergeOffset, config: &MergeConfig) -> Result<()> {
    let child = quote_ident(&config.child_table);
    let mut shifts = vec![(config.child_key.clone(), offset.child_key_offset)];
    shifts.extend(
        config
            .object_types
            .iter()
            .zip(offset.child_offsets.iter())
            .map(|(object, shift)| (object.column(), *shift)),
    );

    for (column, shift) in shifts {
        if shift == 0 {
            continue;
        }
        let column = quote_ident(&column);
        let updated = conn.execute(
            &format!("UPDATE {child} SET {column} = {column} + ?1 WHERE {column} IS NOT NULL"),
            params![shift],
        )?;
        debug!(column = %column, shift, updated, "shifted child identifiers");
    }
    Ok(())
}

fn remap_parent_keys(conn: &Connection, config: &MergeConfig) -> Result<()> {
    let key = quote_ident(&config.parent_key);
    for table in [&config.child_table, &config.parent_table] {
        let table = quote_ident(table);
        conn.execute(
            &format!(
                "UPDATE {table} SET {key} = \
                 (SELECT m.new_key FROM {PARENT_MAP} m WHERE m.old_key = {table}.{key}) \
                 WHERE {key} IS NOT NULL"
            ),
            [],
        )?;
    }
    Ok(())
}

/// Group ids become the parent key in both tables; the renumbered original
/// key moves to `original_key_column`.
fn apply_groups(
    conn: &Connection,
    survey: &ShardSurvey,
    threshold: u64,
    group_base: i64,
    config: &MergeConfig,
) -> Result<u64> {
    let child = quote_ident(&config.child_table);
    let parent = quote_ident(&config.parent_table);
    let key = quote_ident(&config.parent_key);
    let origin = quote_ident(&config.original_key_column);

    let mut stmt = conn.prepare(&format!("SELECT rowid, {key} FROM {child} ORDER BY rowid"))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<i64>>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);

    let parents: Vec<Option<i64>> = rows.iter().map(|(_, p)| *p).collect();
    let layout = layout_groups(&survey.parent_keys, &parents, threshold, group_base);
    debug_assert_eq!(layout.group_count() as u64, survey.group_count(threshold));

    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {CHILD_GROUPS};
         DROP TABLE IF EXISTS {PARENT_GROUPS};
         CREATE TABLE {CHILD_GROUPS} (row_id INTEGER PRIMARY KEY, group_id INTEGER NOT NULL);
         CREATE TABLE {PARENT_GROUPS} (group_id INTEGER PRIMARY KEY, old_key INTEGER NOT NULL);"
    ))?;
    {
        let mut insert = conn.prepare(&format!(
            "INSERT INTO {CHILD_GROUPS} (row_id, group_id) VALUES (?1, ?2)"
        ))?;
        for ((row_id, _), group) in rows.iter().zip(layout.child_groups.iter()) {
            if let Some(group) = group {
                insert.execute(params![row_id, group])?;
            }
        }
        let mut insert = conn.prepare(&format!(
            "INSERT INTO {PARENT_GROUPS} (group_id, old_key) VALUES (?1, ?2)"
        ))?;
        for (group, old_key) in &layout.groups {
            insert.execute(params![group, old_key])?;
        }
    }

    let catalog = Catalog::new(conn);
    if !catalog.column_names(&config.child_table)?.contains(&config.original_key_column) {
        conn.execute_batch(&format!("ALTER TABLE {child} ADD COLUMN {origin} INTEGER;"))?;
    }
    conn.execute(
        &format!(
            "UPDATE {child} SET \
             {origin} = (SELECT m.new_key FROM {PARENT_MAP} m WHERE m.old_key = {child}.{key}), \
             {key} = (SELECT g.group_id FROM {CHILD_GROUPS} g WHERE g.row_id = {child}.rowid) \
             WHERE {key} IS NOT NULL"
        ),
        [],
    )?;

    // One parent row per group, every group inheriting its parent's attributes.
    let columns = catalog.columns(&config.parent_table)?;
    let mut shadow = ShadowTable::unconstrained(&config.parent_table, &columns);
    let mut insert_columns: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    let mut select: Vec<String> = columns
        .iter()
        .map(|c| {
            if c.name == config.parent_key {
                "g.group_id".to_string()
            } else if c.name == config.original_key_column {
                "m.new_key".to_string()
            } else {
                format!("p.{}", quote_ident(&c.name))
            }
        })
        .collect();
    if !insert_columns.contains(&config.original_key_column) {
        shadow = shadow.column(&config.original_key_column, "INTEGER");
        insert_columns.push(config.original_key_column.clone());
        select.push("m.new_key".to_string());
    }
    let select = format!(
        "SELECT {} FROM {parent} p \
         LEFT JOIN {PARENT_GROUPS} g ON g.old_key = p.{key} \
         LEFT JOIN {PARENT_MAP} m ON m.old_key = p.{key} \
         ORDER BY g.group_id",
        select.join(", ")
    );
    shadow.rebuild_from(conn, &insert_columns, &select)?;

    Ok(layout.group_count() as u64)
}
