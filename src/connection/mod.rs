pub mod config;

use crate::core::{MergeError, Result};
use config::MergeConfig;
use rusqlite::{Connection, OpenFlags, params};
use std::path::Path;

/// Open an existing shard or target database for writing.
///
/// Never creates a file: a missing path is reported instead of silently
/// producing an empty database that would then fail validation.
pub fn open(path: &Path, config: &MergeConfig) -> Result<Connection> {
    open_with(path, config, OpenFlags::SQLITE_OPEN_READ_WRITE)
}

/// Open a database for schema inspection and surveys.
pub fn open_read_only(path: &Path, config: &MergeConfig) -> Result<Connection> {
    open_with(path, config, OpenFlags::SQLITE_OPEN_READ_ONLY)
}

fn open_with(path: &Path, config: &MergeConfig, mode: OpenFlags) -> Result<Connection> {
    if !path.is_file() {
        return Err(MergeError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("database '{}' does not exist", path.display()),
        )));
    }
    let flags = mode | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)?;
    conn.busy_timeout(config.busy_timeout_duration())?;
    Ok(conn)
}

/// Attach `path` to `conn` under `alias`.
pub fn attach(conn: &Connection, path: &Path, alias: &str) -> Result<()> {
    conn.execute(
        "ATTACH DATABASE ?1 AS ?2",
        params![path.to_string_lossy(), alias],
    )?;
    Ok(())
}

pub fn detach(conn: &Connection, alias: &str) -> Result<()> {
    conn.execute("DETACH DATABASE ?1", params![alias])?;
    Ok(())
}

/// Alias of the `position`-th shard in block `block`.
pub fn block_alias(block: usize, position: usize) -> String {
    format!("db_{}_{}", block, position)
}
