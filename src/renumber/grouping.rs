//! Splitting oversized parents into synthetic groups.

use std::collections::HashMap;

/// Group assignment for one shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLayout {
    /// Group id of each child row, in the order the rows were given.
    pub child_groups: Vec<Option<i64>>,
    /// `(group id, original parent key)` in ascending group id order.
    pub groups: Vec<(i64, i64)>,
}

impl GroupLayout {
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

/// Assign groups to children listed in stored order.
///
/// Within one parent, positions 1..=threshold form the first group,
/// threshold+1..=2*threshold the next, and so on. Group ids start at
/// `first_group` and are issued in order of first appearance. Parents with no
/// children get one group each afterwards, in `parent_keys` order. Children
/// without a parent reference stay ungrouped.
pub fn layout_groups(
    parent_keys: &[i64],
    child_parents: &[Option<i64>],
    threshold: u64,
    first_group: i64,
) -> GroupLayout {
    struct Cursor {
        seen: u64,
        group: i64,
    }

    let mut next_group = first_group;
    let mut cursors: HashMap<i64, Cursor> = HashMap::new();
    let mut groups = Vec::new();

    let child_groups = child_parents
        .iter()
        .map(|parent| {
            let parent = (*parent)?;
            let cursor = cursors.entry(parent).or_insert(Cursor { seen: 0, group: 0 });
            if cursor.seen % threshold == 0 {
                cursor.group = next_group;
                groups.push((next_group, parent));
                next_group += 1;
            }
            cursor.seen += 1;
            Some(cursor.group)
        })
        .collect();

    for key in parent_keys {
        if !cursors.contains_key(key) {
            groups.push((next_group, *key));
            next_group += 1;
        }
    }

    GroupLayout {
        child_groups,
        groups,
    }
}
