#![allow(dead_code)]

use rusqlite::{Connection, params};
use shardmerge::{MergeConfig, ObjectType};
use std::path::{Path, PathBuf};

pub const SCHEMA: &str = "
    CREATE TABLE Experiment (Name TEXT, Value TEXT);
    CREATE TABLE Per_Image (ImageNumber INTEGER PRIMARY KEY, Image_Count INTEGER, Plate TEXT);
    CREATE TABLE Per_Object (
        ImageNumber INTEGER,
        ObjectNumber INTEGER,
        Nuclei_Number_Object_Number INTEGER,
        Cells_Number_Object_Number INTEGER,
        Area REAL,
        UNIQUE (ImageNumber, ObjectNumber)
    );
    INSERT INTO Experiment VALUES ('pipeline', 'v1');
";

/// One child row: parent reference, child key, cell id.
pub type Child = (Option<i64>, i64, Option<i64>);

pub fn config() -> MergeConfig {
    MergeConfig::new().object_types(vec![ObjectType::new("Nuclei"), ObjectType::new("Cells")])
}

/// Shard with explicit parent keys and child rows. Nuclei ids mirror the child key.
pub fn write_shard(path: &Path, plate: &str, parents: &[i64], children: &[Child]) -> PathBuf {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    for key in parents {
        let count = children.iter().filter(|(p, _, _)| *p == Some(*key)).count() as i64;
        conn.execute(
            "INSERT INTO Per_Image VALUES (?1, ?2, ?3)",
            params![key, count, plate],
        )
        .unwrap();
    }
    for (parent, object, cell) in children {
        conn.execute(
            "INSERT INTO Per_Object VALUES (?1, ?2, ?2, ?3, ?4)",
            params![parent, object, cell, *object as f64 * 1.5],
        )
        .unwrap();
    }
    path.to_path_buf()
}

/// Shard whose parents `1..=counts.len()` have `counts[i]` children each,
/// numbered from 1 across the whole shard.
pub fn plate(dir: &Path, name: &str, counts: &[usize]) -> PathBuf {
    let parents: Vec<i64> = (1..=counts.len() as i64).collect();
    let mut children = Vec::new();
    let mut next = 1;
    for (parent, count) in parents.iter().zip(counts) {
        for _ in 0..*count {
            children.push((Some(*parent), next, Some(next)));
            next += 1;
        }
    }
    write_shard(&dir.join(format!("{name}.db")), name, &parents, &children)
}

pub fn ints(path: &Path, sql: &str) -> Vec<i64> {
    let conn = Connection::open(path).unwrap();
    let mut stmt = conn.prepare(sql).unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<i64>>>()
        .unwrap()
}

pub fn optional_ints(path: &Path, sql: &str) -> Vec<Option<i64>> {
    let conn = Connection::open(path).unwrap();
    let mut stmt = conn.prepare(sql).unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<Option<i64>>>>()
        .unwrap()
}

pub fn count(path: &Path, table: &str) -> i64 {
    Connection::open(path)
        .unwrap()
        .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))
        .unwrap()
}

pub fn table_names(path: &Path) -> Vec<String> {
    let conn = Connection::open(path).unwrap();
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<String>>>()
        .unwrap()
}
