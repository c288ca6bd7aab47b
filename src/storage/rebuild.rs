//! Shadow-table rebuilds.
//!
//! SQLite cannot add or drop column constraints in place, so a table is
//! redefined by creating `_<table>` with the new definitions, copying every
//! row across, dropping the original and renaming the shadow into place.

use super::catalog::{column_list, quote_ident};
use crate::core::{ColumnDef, Result};
use rusqlite::Connection;
use tracing::debug;

/// Definition of the replacement table.
#[derive(Debug, Clone)]
pub struct ShadowTable {
    table: String,
    definitions: Vec<String>,
}

impl ShadowTable {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            definitions: Vec::new(),
        }
    }

    /// Same columns and declared types, no constraints.
    pub fn unconstrained(table: &str, columns: &[ColumnDef]) -> Self {
        columns
            .iter()
            .fold(Self::new(table), |shadow, col| shadow.column(&col.name, &col.declared_type))
    }

    /// `name type`; an empty type keeps the column typeless.
    pub fn column(mut self, name: &str, declared_type: &str) -> Self {
        let definition = if declared_type.trim().is_empty() {
            quote_ident(name)
        } else {
            format!("{} {}", quote_ident(name), declared_type)
        };
        self.definitions.push(definition);
        self
    }

    /// Table-level constraint such as `PRIMARY KEY ("id")`.
    pub fn constraint(mut self, clause: String) -> Self {
        self.definitions.push(clause);
        self
    }

    pub fn shadow_name(&self) -> String {
        format!("_{}", self.table)
    }

    /// Rebuild copying the listed columns unchanged.
    pub fn rebuild(&self, conn: &Connection, columns: &[String]) -> Result<()> {
        let select = format!(
            "SELECT {} FROM {}",
            column_list(columns),
            quote_ident(&self.table)
        );
        self.rebuild_from(conn, columns, &select)
    }

    /// Rebuild filling `insert_columns` from an arbitrary `SELECT`.
    pub fn rebuild_from(&self, conn: &Connection, insert_columns: &[String], select: &str) -> Result<()> {
        let shadow = quote_ident(&self.shadow_name());
        let original = quote_ident(&self.table);
        debug!(table = %self.table, "rebuilding table through shadow copy");

        conn.execute_batch("PRAGMA legacy_alter_table = ON;")?;
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {shadow};
             CREATE TABLE {shadow} ({});",
            self.definitions.join(", ")
        ))?;
        conn.execute(
            &format!(
                "INSERT INTO {shadow} ({}) {}",
                column_list(insert_columns),
                select
            ),
            [],
        )?;
        conn.execute_batch(&format!(
            "DROP TABLE {original};
             ALTER TABLE {shadow} RENAME TO {original};"
        ))?;
        conn.execute_batch("PRAGMA legacy_alter_table = OFF;")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Catalog;

    #[test]
    fn test_unconstrained_rebuild_drops_unique() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT UNIQUE);
             INSERT INTO t VALUES (1, 'a'), (2, 'b');",
        )
        .unwrap();
        let columns = Catalog::new(&conn).columns("t").unwrap();
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        ShadowTable::unconstrained("t", &columns).rebuild(&conn, &names).unwrap();

        conn.execute("INSERT INTO t VALUES (1, 'a')", []).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 3);
        assert_eq!(Catalog::new(&conn).list_tables().unwrap(), vec!["t"]);
    }

    #[test]
    fn test_constraint_rebuild_preserves_rows() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id, v); INSERT INTO t VALUES (2, 'x'), (1, 'y');")
            .unwrap();
        ShadowTable::new("t")
            .column("id", "INTEGER UNIQUE")
            .column("v", "")
            .constraint("PRIMARY KEY (\"id\")".to_string())
            .rebuild(&conn, &["id".to_string(), "v".to_string()])
            .unwrap();

        assert!(conn.execute("INSERT INTO t VALUES (1, 'z')", []).is_err());
        let v: String = conn.query_row("SELECT v FROM t WHERE id = 2", [], |r| r.get(0)).unwrap();
        assert_eq!(v, "x");
    }
}
