use crate::core::{MergeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Hard ceiling on simultaneously attached databases (SQLite `SQLITE_MAX_ATTACHED`).
pub const MAX_ATTACHED: usize = 10;

/// Object types a merge can renumber.
pub const MAX_OBJECT_TYPES: usize = 3;

/// Default children per parent before grouping kicks in.
pub const DEFAULT_GROUP_THRESHOLD: u64 = 200;

/// A logical child-object type carried by the child table.
///
/// Each type owns one identifier column in the child table and one running
/// offset during renumbering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectType {
    pub name: String,
    /// Identifier column; `<name>_Number_Object_Number` when absent.
    #[serde(default)]
    pub key_column: Option<String>,
}

impl ObjectType {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            key_column: None,
        }
    }

    /// Override the identifier column
    pub fn key_column(mut self, column: &str) -> Self {
        self.key_column = Some(column.to_string());
        self
    }

    pub fn column(&self) -> String {
        self.key_column
            .clone()
            .unwrap_or_else(|| format!("{}_Number_Object_Number", self.name))
    }
}

/// Merge configuration
///
/// Built with chained setters or read from a JSON file; any field missing
/// from the file keeps its default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Parent table (one row per unit of work)
    pub parent_table: String,

    /// Child table (many rows per parent)
    pub child_table: String,

    /// Parent key; the child table references the parent through a column of the same name
    pub parent_key: String,

    /// Child key
    pub child_key: String,

    /// Keeps the renumbered original parent key once grouping rewrites the parent key
    pub original_key_column: String,

    /// Child-object types, each with its own running offset
    pub object_types: Vec<ObjectType>,

    /// Children per parent before the parent is split into groups
    pub group_threshold: u64,

    /// Shards attached per merge block
    pub attach_limit: usize,

    /// Template-metadata tables that never take part in a merge
    pub metadata_tables: Vec<String>,

    /// SQLite busy timeout in milliseconds
    pub busy_timeout_ms: u64,

    /// Delete each shard file once it merged cleanly
    pub discard_merged: bool,

    /// Declare keys and foreign keys after the merge
    pub finalize: bool,

    /// VACUUM the merged database
    pub vacuum: bool,
}

impl MergeConfig {
    pub fn new() -> Self {
        Self {
            parent_table: "Per_Image".to_string(),
            child_table: "Per_Object".to_string(),
            parent_key: "ImageNumber".to_string(),
            child_key: "ObjectNumber".to_string(),
            original_key_column: "GroupNumber".to_string(),
            object_types: vec![ObjectType::new("Nuclei")],
            group_threshold: DEFAULT_GROUP_THRESHOLD,
            attach_limit: MAX_ATTACHED,
            metadata_tables: vec![
                "Experiment".to_string(),
                "Experiment_Properties".to_string(),
                "Per_Experiment".to_string(),
            ],
            busy_timeout_ms: 15_000,
            discard_merged: false,
            finalize: true,
            vacuum: true,
        }
    }

    /// Load from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            MergeError::Config(format!("Invalid config file '{}': {}", path.display(), e))
        })
    }

    /// Set parent table and key
    pub fn parent(mut self, table: &str, key: &str) -> Self {
        self.parent_table = table.to_string();
        self.parent_key = key.to_string();
        self
    }

    /// Set child table and key
    pub fn child(mut self, table: &str, key: &str) -> Self {
        self.child_table = table.to_string();
        self.child_key = key.to_string();
        self
    }

    /// Set the column that retains the original parent key under grouping
    pub fn original_key_column(mut self, column: &str) -> Self {
        self.original_key_column = column.to_string();
        self
    }

    /// Replace the object types
    pub fn object_types(mut self, types: Vec<ObjectType>) -> Self {
        self.object_types = types;
        self
    }

    /// Set grouping threshold
    pub fn group_threshold(mut self, threshold: u64) -> Self {
        self.group_threshold = threshold;
        self
    }

    /// Set shards per block
    pub fn attach_limit(mut self, limit: usize) -> Self {
        self.attach_limit = limit;
        self
    }

    /// Replace the metadata table list
    pub fn metadata_tables(mut self, tables: Vec<String>) -> Self {
        self.metadata_tables = tables;
        self
    }

    /// Set busy timeout
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Delete merged shard files
    pub fn discard_merged(mut self, discard: bool) -> Self {
        self.discard_merged = discard;
        self
    }

    pub fn finalize(mut self, finalize: bool) -> Self {
        self.finalize = finalize;
        self
    }

    pub fn vacuum(mut self, vacuum: bool) -> Self {
        self.vacuum = vacuum;
        self
    }

    pub fn busy_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn is_metadata_table(&self, table: &str) -> bool {
        self.metadata_tables.iter().any(|t| t == table)
    }

    /// Identifier columns the child table must carry, child key first
    pub fn child_identifier_columns(&self) -> Vec<String> {
        let mut columns = vec![self.parent_key.clone(), self.child_key.clone()];
        columns.extend(self.object_types.iter().map(|t| t.column()));
        columns
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let names = [
            ("parent_table", &self.parent_table),
            ("child_table", &self.child_table),
            ("parent_key", &self.parent_key),
            ("child_key", &self.child_key),
            ("original_key_column", &self.original_key_column),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(MergeError::Config(format!("{} cannot be empty", field)));
            }
        }

        if self.parent_table == self.child_table {
            return Err(MergeError::Config(
                "parent_table and child_table must differ".to_string(),
            ));
        }

        if self.object_types.is_empty() || self.object_types.len() > MAX_OBJECT_TYPES {
            return Err(MergeError::Config(format!(
                "between 1 and {} object types are required, got {}",
                MAX_OBJECT_TYPES,
                self.object_types.len()
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for object in &self.object_types {
            if object.name.trim().is_empty() {
                return Err(MergeError::Config("object type name cannot be empty".to_string()));
            }
            let column = object.column();
            if column == self.parent_key || column == self.child_key {
                return Err(MergeError::Config(format!(
                    "object type column '{}' collides with a key column",
                    column
                )));
            }
            if !seen.insert(column) {
                return Err(MergeError::Config(format!(
                    "object type column '{}' listed twice",
                    object.column()
                )));
            }
        }

        if self.group_threshold == 0 {
            return Err(MergeError::Config("group_threshold must be > 0".to_string()));
        }

        if self.attach_limit == 0 || self.attach_limit > MAX_ATTACHED {
            return Err(MergeError::Config(format!(
                "attach_limit must be within 1..={}",
                MAX_ATTACHED
            )));
        }

        if self.is_metadata_table(&self.parent_table) || self.is_metadata_table(&self.child_table) {
            return Err(MergeError::Config(
                "parent and child tables cannot be metadata tables".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MergeConfig::default();
        assert_eq!(config.parent_table, "Per_Image");
        assert_eq!(config.group_threshold, 200);
        assert_eq!(config.attach_limit, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = MergeConfig::new()
            .parent("Images", "img_id")
            .child("Cells", "cell_id")
            .group_threshold(50)
            .attach_limit(4)
            .object_types(vec![ObjectType::new("Cell"), ObjectType::new("Nucleus").key_column("nuc_id")]);

        assert_eq!(config.parent_key, "img_id");
        assert_eq!(config.child_table, "Cells");
        assert_eq!(config.attach_limit, 4);
        assert_eq!(
            config.child_identifier_columns(),
            vec!["img_id", "cell_id", "Cell_Number_Object_Number", "nuc_id"]
        );
    }

    #[test]
    fn test_validate() {
        assert!(MergeConfig::new().attach_limit(0).validate().is_err());
        assert!(MergeConfig::new().attach_limit(11).validate().is_err());
        assert!(MergeConfig::new().group_threshold(0).validate().is_err());
        assert!(MergeConfig::new().object_types(vec![]).validate().is_err());
        let four = ["Nuclei", "Cells", "Cytoplasm", "Speckles"].map(ObjectType::new).to_vec();
        assert!(MergeConfig::new().object_types(four[..3].to_vec()).validate().is_ok());
        assert!(MergeConfig::new().object_types(four).validate().is_err());
        assert!(
            MergeConfig::new()
                .object_types(vec![ObjectType::new("A"), ObjectType::new("A")])
                .validate()
                .is_err()
        );
        assert!(MergeConfig::new().child("Per_Image", "ObjectNumber").validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: MergeConfig =
            serde_json::from_str(r#"{"group_threshold": 500, "object_types": [{"name": "Cells"}]}"#)
                .unwrap();
        assert_eq!(config.group_threshold, 500);
        assert_eq!(config.parent_table, "Per_Image");
        assert_eq!(config.object_types[0].column(), "Cells_Number_Object_Number");
    }
}
