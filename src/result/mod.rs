use crate::core::MergeError;
use crate::renumber::Grouping;
use crate::validator::ShardVerdict;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Everything a merge run decided and every non-fatal problem it hit.
#[derive(Debug)]
pub struct MergeReport {
    pub target: PathBuf,
    pub verdicts: Vec<ShardVerdict>,
    pub grouping: Grouping,
    /// Parent keys issued; group ids when grouping was on.
    pub parent_keys_allocated: i64,
    /// Next free identifier per object type after the last shard.
    pub final_offsets: Vec<i64>,
    pub blocks: usize,
    /// Shards whose rows reached the target, template included.
    pub merged: Vec<PathBuf>,
    pub discarded: Vec<PathBuf>,
    pub issues: Vec<MergeError>,
    pub finalized: bool,
    pub vacuumed: bool,
}

impl MergeReport {
    pub fn new(target: PathBuf, verdicts: Vec<ShardVerdict>) -> Self {
        Self {
            target,
            verdicts,
            grouping: Grouping::Disabled,
            parent_keys_allocated: 0,
            final_offsets: Vec::new(),
            blocks: 0,
            merged: Vec::new(),
            discarded: Vec::new(),
            issues: Vec::new(),
            finalized: false,
            vacuumed: false,
        }
    }

    /// No attach or copy failed. Schema exclusions alone keep a run clean.
    pub fn is_clean(&self) -> bool {
        !self.issues.iter().any(|issue| {
            matches!(
                issue,
                MergeError::AttachmentFailure { .. } | MergeError::CopyFailure { .. }
            )
        })
    }

    pub fn excluded(&self) -> impl Iterator<Item = &ShardVerdict> {
        self.verdicts.iter().filter(|v| !v.is_mergeable())
    }

    pub fn merged_count(&self) -> usize {
        self.merged.len()
    }

    /// Per-shard classification as an aligned text table.
    pub fn verdict_table(&self) -> String {
        let header = ["shard", "classification", "reason"];
        let rows: Vec<[String; 3]> = self
            .verdicts
            .iter()
            .map(|v| {
                [
                    v.shard.display().to_string(),
                    v.classification.to_string(),
                    v.reason.clone(),
                ]
            })
            .collect();

        let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.len());
            }
        }

        let line = |cells: &[&str]| -> String {
            cells
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };

        let mut out = vec![line(&header)];
        out.push(widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-"));
        for row in &rows {
            out.push(line(&[&row[0], &row[1], &row[2]]));
        }
        out.join("\n")
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.verdict_table())?;
        writeln!(f)?;
        writeln!(f, "target:          {}", self.target.display())?;
        writeln!(
            f,
            "merged shards:   {} of {}",
            self.merged_count(),
            self.verdicts.len()
        )?;
        match self.grouping {
            Grouping::Enabled { threshold } => writeln!(
                f,
                "grouping:        on (threshold {}), {} group(s)",
                threshold, self.parent_keys_allocated
            )?,
            Grouping::Disabled => writeln!(
                f,
                "grouping:        off, {} parent key(s)",
                self.parent_keys_allocated
            )?,
        }
        writeln!(f, "blocks:          {}", self.blocks)?;
        writeln!(f, "finalized:       {}", if self.finalized { "yes" } else { "no" })?;
        writeln!(f, "vacuumed:        {}", if self.vacuumed { "yes" } else { "no" })?;
        if !self.discarded.is_empty() {
            writeln!(f, "discarded:       {} file(s)", self.discarded.len())?;
        }
        if self.issues.is_empty() {
            write!(f, "\nno issues")
        } else {
            writeln!(f, "\n{} issue(s):", self.issues.len())?;
            // Run-wide issues first, then one block per shard.
            let mut by_shard: BTreeMap<Option<&PathBuf>, Vec<&MergeError>> = BTreeMap::new();
            for issue in &self.issues {
                by_shard.entry(issue.shard()).or_default().push(issue);
            }
            for (shard, issues) in by_shard {
                let indent = match shard {
                    Some(shard) => {
                        writeln!(f, "  {}:", shard.display())?;
                        "    "
                    }
                    None => "  ",
                };
                for issue in issues {
                    writeln!(f, "{}- {}", indent, issue)?;
                }
            }
            Ok(())
        }
    }
}
