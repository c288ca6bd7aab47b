use std::collections::BTreeMap;
use std::fmt;

/// Column name plus the type it was declared with (`PRAGMA table_info`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub declared_type: String,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
        }
    }
}

/// Table name -> ordered columns, for every table that takes part in a merge.
///
/// Tables are kept in sorted name order so that two signatures read from
/// different files always iterate the same way. Equality compares table names
/// and column-name sequences only; declared types are reported separately by
/// [`TableSignature::type_differences`].
#[derive(Debug, Clone, Default)]
pub struct TableSignature {
    tables: BTreeMap<String, Vec<ColumnDef>>,
}

impl TableSignature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        self.insert(name, columns);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, columns: Vec<ColumnDef>) {
        self.tables.insert(name.into(), columns);
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|s| s.as_str())
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn columns(&self, table: &str) -> Option<&[ColumnDef]> {
        self.tables.get(table).map(|c| c.as_slice())
    }

    pub fn column_names(&self, table: &str) -> Option<Vec<&str>> {
        self.columns(table)
            .map(|cols| cols.iter().map(|c| c.name.as_str()).collect())
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.columns(table)
            .is_some_and(|cols| cols.iter().any(|c| c.name == column))
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Order in which tables are copied: parent, child, then the rest sorted.
    pub fn merge_order<'a>(&'a self, parent: &'a str, child: &'a str) -> Vec<&'a str> {
        let mut order = Vec::with_capacity(self.tables.len());
        for hoisted in [parent, child] {
            if self.contains_table(hoisted) {
                order.push(hoisted);
            }
        }
        order.extend(self.table_names().filter(|t| *t != parent && *t != child));
        order
    }

    /// `table.column: template -> other` for every shared column whose declared type differs.
    pub fn type_differences(&self, other: &TableSignature) -> Vec<String> {
        let mut drift = Vec::new();
        for (table, columns) in &self.tables {
            let Some(theirs) = other.columns(table) else {
                continue;
            };
            for col in columns {
                if let Some(their) = theirs.iter().find(|c| c.name == col.name)
                    && !their.declared_type.eq_ignore_ascii_case(&col.declared_type)
                {
                    drift.push(format!(
                        "{}.{}: {} -> {}",
                        table, col.name, col.declared_type, their.declared_type
                    ));
                }
            }
        }
        drift
    }
}

impl PartialEq for TableSignature {
    fn eq(&self, other: &Self) -> bool {
        self.tables.len() == other.tables.len()
            && self.tables.iter().zip(other.tables.iter()).all(|((a, ac), (b, bc))| {
                a == b
                    && ac.len() == bc.len()
                    && ac.iter().zip(bc.iter()).all(|(x, y)| x.name == y.name)
            })
    }
}

impl Eq for TableSignature {}

/// Outcome of comparing a candidate shard against the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardClassification {
    Compatible,
    ExcludedMissingTables,
    ExcludedMismatch,
    IncludedSuperset,
}

impl ShardClassification {
    pub fn is_mergeable(self) -> bool {
        matches!(self, Self::Compatible | Self::IncludedSuperset)
    }
}

impl fmt::Display for ShardClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Compatible => "compatible",
            Self::ExcludedMissingTables => "excluded (missing tables)",
            Self::ExcludedMismatch => "excluded (mismatch)",
            Self::IncludedSuperset => "included (superset)",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[(&str, &str)]) -> Vec<ColumnDef> {
        names.iter().map(|(n, t)| ColumnDef::new(*n, *t)).collect()
    }

    #[test]
    fn test_equality_ignores_declared_types() {
        let a = TableSignature::new()
            .with_table("Per_Image", cols(&[("ImageNumber", "INTEGER")]));
        let b = TableSignature::new()
            .with_table("Per_Image", cols(&[("ImageNumber", "BIGINT")]));
        assert_eq!(a, b);
        assert_eq!(a.type_differences(&b), vec!["Per_Image.ImageNumber: INTEGER -> BIGINT"]);
    }

    #[test]
    fn test_equality_respects_column_order() {
        let a = TableSignature::new()
            .with_table("t", cols(&[("a", "INTEGER"), ("b", "TEXT")]));
        let b = TableSignature::new()
            .with_table("t", cols(&[("b", "TEXT"), ("a", "INTEGER")]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_merge_order_hoists_parent_and_child() {
        let sig = TableSignature::new()
            .with_table("Per_Object", vec![])
            .with_table("Per_RelationshipTypes", vec![])
            .with_table("Per_Image", vec![])
            .with_table("A_Table", vec![]);
        assert_eq!(
            sig.merge_order("Per_Image", "Per_Object"),
            vec!["Per_Image", "Per_Object", "A_Table", "Per_RelationshipTypes"]
        );
    }

    #[test]
    fn test_classification_mergeable() {
        assert!(ShardClassification::Compatible.is_mergeable());
        assert!(ShardClassification::IncludedSuperset.is_mergeable());
        assert!(!ShardClassification::ExcludedMismatch.is_mergeable());
        assert!(!ShardClassification::ExcludedMissingTables.is_mergeable());
    }
}
