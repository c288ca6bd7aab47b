//! Schema validation of candidate shards against the template.

use crate::connection::{self, config::MergeConfig};
use crate::core::{MergeError, Result, ShardClassification, TableSignature};
use crate::storage::Catalog;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Classification of one shard with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardVerdict {
    pub shard: PathBuf,
    pub classification: ShardClassification,
    pub reason: String,
}

impl ShardVerdict {
    pub fn is_mergeable(&self) -> bool {
        self.classification.is_mergeable()
    }

    /// Excluded shards become a `SchemaIncompatible` issue for the run report.
    pub fn exclusion(&self) -> Option<MergeError> {
        (!self.is_mergeable()).then(|| MergeError::SchemaIncompatible {
            shard: self.shard.clone(),
            reason: self.reason.clone(),
        })
    }
}

pub struct SchemaValidator {
    template: TableSignature,
    metadata_tables: Vec<String>,
}

impl SchemaValidator {
    pub fn new(template: TableSignature, metadata_tables: Vec<String>) -> Self {
        Self {
            template,
            metadata_tables,
        }
    }

    /// Derive the template signature from the designated shard.
    pub fn from_template(path: &Path, config: &MergeConfig) -> Result<Self> {
        let conn = connection::open_read_only(path, config)?;
        let template = Catalog::new(&conn).signature(&config.metadata_tables)?;
        if template.is_empty() {
            return Err(MergeError::Config(format!(
                "template '{}' has no mergeable tables",
                path.display()
            )));
        }
        for table in [&config.parent_table, &config.child_table] {
            if !template.contains_table(table) {
                return Err(MergeError::Config(format!(
                    "template '{}' has no table '{}'",
                    path.display(),
                    table
                )));
            }
        }
        Ok(Self::new(template, config.metadata_tables.clone()))
    }

    pub fn template(&self) -> &TableSignature {
        &self.template
    }

    /// Compare a candidate signature with the template.
    pub fn classify(&self, candidate: &TableSignature) -> (ShardClassification, String) {
        let missing: Vec<&str> = self
            .template
            .table_names()
            .filter(|t| !candidate.contains_table(t))
            .collect();

        if !missing.is_empty() {
            return if candidate.table_count() < self.template.table_count() {
                (
                    ShardClassification::ExcludedMissingTables,
                    format!("missing table(s) {}", missing.join(", ")),
                )
            } else {
                (
                    ShardClassification::ExcludedMismatch,
                    format!("table(s) did not match, template table(s) {} absent", missing.join(", ")),
                )
            };
        }

        let mut widened = Vec::new();
        for table in self.template.table_names() {
            let expected = self.template.column_names(table).unwrap_or_default();
            let actual = candidate.column_names(table).unwrap_or_default();
            let absent: Vec<&str> = expected
                .iter()
                .filter(|c| !actual.contains(*c))
                .copied()
                .collect();
            if !absent.is_empty() {
                return (
                    ShardClassification::ExcludedMismatch,
                    format!("table '{}' lacks column(s) {}", table, absent.join(", ")),
                );
            }
            if actual.len() > expected.len() {
                widened.push(table);
            }
        }

        let extra: Vec<&str> = candidate
            .table_names()
            .filter(|t| !self.template.contains_table(t))
            .collect();

        let drift = self.template.type_differences(candidate);
        let drift_note = if drift.is_empty() {
            String::new()
        } else {
            format!("; declared types differ: {}", drift.join(", "))
        };

        if extra.is_empty() && widened.is_empty() {
            return (
                ShardClassification::Compatible,
                format!("matches template{}", drift_note),
            );
        }

        let mut parts = Vec::new();
        if !extra.is_empty() {
            parts.push(format!("extra table(s) {} will not be merged", extra.join(", ")));
        }
        if !widened.is_empty() {
            parts.push(format!("extra column(s) in {} will not be merged", widened.join(", ")));
        }
        (
            ShardClassification::IncludedSuperset,
            format!("{}{}", parts.join("; "), drift_note),
        )
    }

    /// Classify the shard stored at `path`.
    ///
    /// A file that cannot be opened or read is excluded as a mismatch rather
    /// than failing the run.
    pub fn validate(&self, path: &Path, config: &MergeConfig) -> ShardVerdict {
        let signature = connection::open_read_only(path, config)
            .and_then(|conn| Catalog::new(&conn).signature(&self.metadata_tables));

        let (classification, reason) = match signature {
            Ok(sig) => {
                for drift in self.template.type_differences(&sig) {
                    warn!(shard = %path.display(), difference = %drift, "declared type differs from template");
                }
                self.classify(&sig)
            }
            Err(err) => (
                ShardClassification::ExcludedMismatch,
                format!("unreadable shard: {}", err),
            ),
        };

        let verdict = ShardVerdict {
            shard: path.to_path_buf(),
            classification,
            reason,
        };
        match verdict.classification {
            ShardClassification::Compatible => {}
            ShardClassification::IncludedSuperset => {
                info!(shard = %path.display(), reason = %verdict.reason, "shard included with extras")
            }
            _ => warn!(shard = %path.display(), reason = %verdict.reason, "shard excluded from merge"),
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ColumnDef;

    fn cols(names: &[&str]) -> Vec<ColumnDef> {
        names.iter().map(|n| ColumnDef::new(*n, "INTEGER")).collect()
    }

    fn template() -> TableSignature {
        TableSignature::new()
            .with_table("Per_Image", cols(&["ImageNumber", "Count"]))
            .with_table("Per_Object", cols(&["ImageNumber", "ObjectNumber"]))
    }

    fn validator() -> SchemaValidator {
        SchemaValidator::new(template(), vec![])
    }

    #[test]
    fn test_identical_is_compatible() {
        let (class, _) = validator().classify(&template());
        assert_eq!(class, ShardClassification::Compatible);
    }

    #[test]
    fn test_missing_table_is_excluded() {
        let candidate = TableSignature::new().with_table("Per_Image", cols(&["ImageNumber", "Count"]));
        let (class, reason) = validator().classify(&candidate);
        assert_eq!(class, ShardClassification::ExcludedMissingTables);
        assert!(reason.contains("Per_Object"));
    }

    #[test]
    fn test_renamed_table_is_mismatch() {
        let candidate = TableSignature::new()
            .with_table("Per_Image", cols(&["ImageNumber", "Count"]))
            .with_table("Per_Cells", cols(&["ImageNumber", "ObjectNumber"]));
        let (class, _) = validator().classify(&candidate);
        assert_eq!(class, ShardClassification::ExcludedMismatch);
    }

    #[test]
    fn test_missing_column_is_mismatch() {
        let candidate = TableSignature::new()
            .with_table("Per_Image", cols(&["ImageNumber"]))
            .with_table("Per_Object", cols(&["ImageNumber", "ObjectNumber"]));
        let (class, reason) = validator().classify(&candidate);
        assert_eq!(class, ShardClassification::ExcludedMismatch);
        assert!(reason.contains("Count"));
    }

    #[test]
    fn test_extra_table_is_superset() {
        let candidate = template().with_table("Per_Extra", cols(&["x"]));
        let (class, reason) = validator().classify(&candidate);
        assert_eq!(class, ShardClassification::IncludedSuperset);
        assert!(reason.contains("Per_Extra"));
    }

    #[test]
    fn test_extra_column_is_superset() {
        let candidate = TableSignature::new()
            .with_table("Per_Image", cols(&["ImageNumber", "Count", "Extra"]))
            .with_table("Per_Object", cols(&["ImageNumber", "ObjectNumber"]));
        let (class, _) = validator().classify(&candidate);
        assert_eq!(class, ShardClassification::IncludedSuperset);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let candidate = template().with_table("Per_Extra", cols(&["x"]));
        let v = validator();
        assert_eq!(v.classify(&candidate), v.classify(&candidate));
    }

    #[test]
    fn test_unreadable_shard_is_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");
        let verdict = validator().validate(&path, &MergeConfig::default());
        assert_eq!(verdict.classification, ShardClassification::ExcludedMismatch);
        assert!(matches!(verdict.exclusion(), Some(MergeError::SchemaIncompatible { .. })));
    }
}
