//! Constraint finalizer.
//!
//! Declares the merged identifier columns as keys once all shards are in:
//! the parent key becomes a unique primary key, the child key a unique
//! primary key and the child's parent reference a foreign key. Each table is
//! rebuilt through a shadow copy; rows are carried over unchanged.
//!
//! Keys are declared `INT`, not `INTEGER`: an `INTEGER` primary key becomes
//! the rowid alias, and SQLite would then fill every null key with a fresh id.

use crate::connection::{self, config::MergeConfig};
use crate::core::{ColumnDef, MergeError, Result};
use crate::storage::{Catalog, ShadowTable, quote_ident};
use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use tracing::{info, info_span};

/// Integer affinity without becoming the rowid.
const KEY_TYPE: &str = "INT UNIQUE";

pub struct ConstraintFinalizer<'a> {
    config: &'a MergeConfig,
}

impl<'a> ConstraintFinalizer<'a> {
    pub fn new(config: &'a MergeConfig) -> Self {
        Self { config }
    }

    /// Finalize the database at `path`.
    pub fn run(&self, path: &Path) -> Result<()> {
        let span = info_span!("finalize", database = %path.display());
        let _guard = span.enter();

        let mut conn = connection::open(path, self.config)?;
        self.finalize(&mut conn, path)?;
        conn.close().map_err(|(_, err)| MergeError::Sqlite(err))?;
        Ok(())
    }

    pub fn finalize(&self, conn: &mut Connection, path: &Path) -> Result<()> {
        let config = self.config;
        let tx = conn.transaction()?;
        let catalog = Catalog::new(&tx);

        let parent_columns = catalog.columns(&config.parent_table)?;
        require(&parent_columns, path, &config.parent_table, &config.parent_key)?;
        let parent = redeclare(&config.parent_table, &parent_columns, |name| {
            (name == config.parent_key).then_some(KEY_TYPE)
        })
        .constraint(format!("PRIMARY KEY ({})", quote_ident(&config.parent_key)));
        rebuild(&tx, &parent, &parent_columns, &config.parent_table)?;
        info!(table = %config.parent_table, "declared parent key");

        let child_columns = catalog.columns(&config.child_table)?;
        require(&child_columns, path, &config.child_table, &config.parent_key)?;
        require(&child_columns, path, &config.child_table, &config.child_key)?;
        let child = redeclare(&config.child_table, &child_columns, |name| {
            if name == config.child_key {
                Some(KEY_TYPE)
            } else if name == config.parent_key {
                Some("INTEGER")
            } else {
                None
            }
        })
        .constraint(format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_ident(&config.parent_key),
            quote_ident(&config.parent_table),
            quote_ident(&config.parent_key)
        ))
        .constraint(format!("PRIMARY KEY ({})", quote_ident(&config.child_key)));
        rebuild(&tx, &child, &child_columns, &config.child_table)?;
        info!(table = %config.child_table, "declared child key and foreign key");

        tx.commit()?;

        let dangling = dangling_references(conn, &config.child_table)?;
        if dangling > 0 {
            return Err(MergeError::ConstraintViolation(format!(
                "{} row(s) in '{}' reference a missing '{}' row",
                dangling, config.child_table, config.parent_table
            )));
        }
        Ok(())
    }
}

fn require(columns: &[ColumnDef], path: &Path, table: &str, column: &str) -> Result<()> {
    if columns.iter().any(|c| c.name == column) {
        Ok(())
    } else {
        Err(MergeError::MissingExpectedColumn {
            shard: path.to_path_buf(),
            table: table.to_string(),
            column: column.to_string(),
        })
    }
}

/// Same columns, with declared types replaced where `override_type` says so.
fn redeclare(
    table: &str,
    columns: &[ColumnDef],
    override_type: impl Fn(&str) -> Option<&'static str>,
) -> ShadowTable {
    columns.iter().fold(ShadowTable::new(table), |shadow, col| {
        let declared = match override_type(&col.name) {
            Some(declared) => declared,
            None => col.declared_type.as_str(),
        };
        shadow.column(&col.name, declared)
    })
}

fn rebuild(conn: &Connection, shadow: &ShadowTable, columns: &[ColumnDef], table: &str) -> Result<()> {
    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    shadow.rebuild(conn, &names).map_err(|err| match err {
        MergeError::Sqlite(rusqlite::Error::SqliteFailure(code, msg))
            if code.code == ErrorCode::ConstraintViolation =>
        {
            MergeError::ConstraintViolation(format!(
                "'{}' keys are not unique after renumbering: {}",
                table,
                msg.unwrap_or_else(|| code.to_string())
            ))
        }
        other => other,
    })
}

fn dangling_references(conn: &Connection, child_table: &str) -> Result<usize> {
    let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_check({})", quote_ident(child_table)))?;
    let mut rows = stmt.query([])?;
    let mut count = 0;
    while rows.next()?.is_some() {
        count += 1;
    }
    Ok(count)
}
