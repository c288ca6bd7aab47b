use crate::core::{ColumnDef, Result, TableSignature};
use rusqlite::{Connection, params};

/// Double-quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"c1", "c2", ...`
pub fn column_list<S: AsRef<str>>(columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read-only view over the schema of one database on a connection.
///
/// `schema` is `main` for the connection's own file or the alias of an
/// attached database.
pub struct Catalog<'a> {
    conn: &'a Connection,
    schema: String,
}

impl<'a> Catalog<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self::for_schema(conn, "main")
    }

    pub fn for_schema(conn: &'a Connection, schema: &str) -> Self {
        Self {
            conn,
            schema: schema.to_string(),
        }
    }

    /// User tables in sorted order, without SQLite bookkeeping tables.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT name FROM {}.sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY name",
            quote_ident(&self.schema)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Columns in declaration order.
    pub fn columns(&self, table: &str) -> Result<Vec<ColumnDef>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1, ?2) ORDER BY cid")?;
        let columns = stmt
            .query_map(params![table, self.schema], |row| {
                Ok(ColumnDef::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    pub fn column_names(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.columns(table)?.into_iter().map(|c| c.name).collect())
    }

    /// Signature of every table except those named in `excluded`.
    pub fn signature(&self, excluded: &[String]) -> Result<TableSignature> {
        let mut signature = TableSignature::new();
        for table in self.list_tables()? {
            if excluded.iter().any(|e| e == &table) {
                continue;
            }
            let columns = self.columns(&table)?;
            signature.insert(table, columns);
        }
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE Per_Object (ImageNumber INTEGER, ObjectNumber INTEGER, Area REAL);
             CREATE TABLE Per_Image (ImageNumber INTEGER PRIMARY KEY, FileName TEXT);
             CREATE TABLE Experiment (name TEXT);
             CREATE TABLE seq (id INTEGER PRIMARY KEY AUTOINCREMENT);
             INSERT INTO seq DEFAULT VALUES;",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_list_tables_sorted_without_bookkeeping() {
        let conn = sample();
        let tables = Catalog::new(&conn).list_tables().unwrap();
        assert_eq!(tables, vec!["Experiment", "Per_Image", "Per_Object", "seq"]);
    }

    #[test]
    fn test_signature_excludes_metadata() {
        let conn = sample();
        let sig = Catalog::new(&conn)
            .signature(&["Experiment".to_string(), "seq".to_string()])
            .unwrap();
        assert_eq!(sig.table_names().collect::<Vec<_>>(), vec!["Per_Image", "Per_Object"]);
        assert_eq!(
            sig.column_names("Per_Object").unwrap(),
            vec!["ImageNumber", "ObjectNumber", "Area"]
        );
        assert_eq!(sig.columns("Per_Image").unwrap()[1].declared_type, "TEXT");
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(column_list(&["x", "y"]), "\"x\", \"y\"");
    }
}
