//! Partitioning tables by the value of one column.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use thiserror::Error;

use crate::core::loaders::Table;

/// Errors that can occur during grouping.
#[derive(Debug, Error)]
pub enum GroupingError {
    #[error("Group column index {index} out of range for table with {num_columns} columns")]
    ColumnOutOfRange { index: usize, num_columns: usize },
}

/// Result type for grouping.
pub type Result<T> = std::result::Result<T, GroupingError>;

/// Float key compared by exact value.
///
/// `-0.0` and `0.0` are the same key. NaN keys compare by bit pattern.
#[derive(Debug, Clone, Copy)]
struct GroupKey(f64);

impl GroupKey {
    fn bits(self) -> u64 {
        if self.0 == 0.0 {
            0.0f64.to_bits()
        } else {
            self.0.to_bits()
        }
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// Sub-tables keyed by the value of the grouping column.
///
/// Iteration follows the order in which keys were first seen.
#[derive(Debug, Clone, Default)]
pub struct Groups {
    entries: Vec<(f64, Table)>,
    index: HashMap<GroupKey, usize>,
}

impl Groups {
    /// Returns the number of groups.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the sub-table for `key`, if present.
    pub fn get(&self, key: f64) -> Option<&Table> {
        self.index
            .get(&GroupKey(key))
            .map(|&i| &self.entries[i].1)
    }

    /// Keys in first-seen order.
    pub fn keys(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    /// Keys sorted ascending.
    pub fn sorted_keys(&self) -> Vec<f64> {
        let mut keys: Vec<f64> = self.keys().collect();
        keys.sort_by(|a, b| a.total_cmp(b));
        keys
    }

    /// `(key, table)` pairs sorted ascending by key.
    pub fn sorted(&self) -> Vec<(f64, &Table)> {
        let mut pairs: Vec<(f64, &Table)> = self.iter().collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        pairs
    }

    /// Iterates over `(key, table)` pairs in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &Table)> + '_ {
        self.entries.iter().map(|(k, t)| (*k, t))
    }

    /// Total number of rows across all groups.
    pub fn total_rows(&self) -> usize {
        self.entries.iter().map(|(_, t)| t.num_rows()).sum()
    }

    /// Concatenate all groups back into one table, group by group.
    pub fn reassemble(&self) -> Table {
        let width = self.entries.first().map_or(0, |(_, t)| t.num_columns());
        let total = self.total_rows();
        let mut columns: Vec<Vec<f64>> = (0..width).map(|_| Vec::with_capacity(total)).collect();
        for (_, group) in &self.entries {
            for (dst, src) in columns.iter_mut().zip(group.columns()) {
                dst.extend_from_slice(src);
            }
        }
        Table::from_columns_unchecked(columns)
    }
}

impl IntoIterator for Groups {
    type Item = (f64, Table);
    type IntoIter = std::vec::IntoIter<(f64, Table)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Group the rows of a table by the value in column `col_idx`.
///
/// Every row is assigned to the group of its key (exact float equality);
/// rows keep their input order within a group, and each group keeps the
/// input's column layout.
///
/// # Arguments
///
/// * `table` - Input table
/// * `col_idx` - Column whose value selects the group
///
/// # Returns
///
/// The groups, iterable in first-seen key order.
///
/// # Errors
///
/// Returns an error if `col_idx` is out of range. An empty table with
/// columns still has its index checked; a table without any columns yields
/// no groups.
pub fn group_by(table: &Table, col_idx: usize) -> Result<Groups> {
    let mut groups = Groups::default();
    if table.num_columns() == 0 {
        return Ok(groups);
    }

    let keys = table
        .column(col_idx)
        .ok_or(GroupingError::ColumnOutOfRange {
            index: col_idx,
            num_columns: table.num_columns(),
        })?;

    let columns = table.columns();

    let mut buckets: Vec<Vec<usize>> = Vec::new();
    for (row, &key) in keys.iter().enumerate() {
        let slot = *groups.index.entry(GroupKey(key)).or_insert_with(|| {
            buckets.push(Vec::new());
            groups.entries.push((key, Table::new()));
            buckets.len() - 1
        });
        buckets[slot].push(row);
    }

    for ((_, group), rows) in groups.entries.iter_mut().zip(&buckets) {
        let sub: Vec<Vec<f64>> = columns
            .iter()
            .map(|col| rows.iter().map(|&r| col[r]).collect())
            .collect();
        *group = Table::from_columns_unchecked(sub);
    }

    log::debug!(
        "Grouped {} rows by column {} into {} groups",
        table.num_rows(),
        col_idx,
        groups.len()
    );

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        Table::from_rows(vec![
            vec![0.1, 1.0, 10.0],
            vec![0.2, 1.0, 11.0],
            vec![0.1, 2.0, 12.0],
            vec![0.3, 2.0, 13.0],
            vec![0.2, 3.0, 14.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_group_by_partitions_rows() {
        let table = sample_table();
        let groups = group_by(&table, 0).unwrap();

        assert_eq!(groups.len(), 3);
        assert_eq!(groups.total_rows(), table.num_rows());
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec![0.1, 0.2, 0.3]);

        let g = groups.get(0.1).unwrap();
        assert_eq!(g.num_columns(), 3);
        assert_eq!(g.column(2), Some(&[10.0, 12.0][..]));

        let g = groups.get(0.2).unwrap();
        assert_eq!(g.column(1), Some(&[1.0, 3.0][..]));

        assert!(groups.get(0.4).is_none());
    }

    #[test]
    fn test_every_row_in_exactly_one_group() {
        let table = sample_table();
        let groups = group_by(&table, 1).unwrap();

        let mut seen: Vec<f64> = groups
            .iter()
            .flat_map(|(_, t)| t.column(2).unwrap().to_vec())
            .collect();
        seen.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(seen, vec![10.0, 11.0, 12.0, 13.0, 14.0]);
    }

    #[test]
    fn test_regroup_is_idempotent() {
        let table = sample_table();
        let groups = group_by(&table, 0).unwrap();
        let regrouped = group_by(&groups.reassemble(), 0).unwrap();

        assert_eq!(groups.sorted_keys(), regrouped.sorted_keys());
        for key in groups.keys() {
            assert_eq!(groups.get(key), regrouped.get(key));
        }
    }

    #[test]
    fn test_exact_key_equality() {
        let a = 0.3;
        let b = 0.1 + 0.2;
        let table = Table::from_rows(vec![vec![a], vec![b], vec![0.0], vec![-0.0]]).unwrap();
        let groups = group_by(&table, 0).unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups.get(0.0).map(|t| t.num_rows()), Some(2));
    }

    #[test]
    fn test_sorted_keys() {
        let table = Table::from_rows(vec![vec![3.0], vec![1.0], vec![2.0], vec![1.0]]).unwrap();
        let groups = group_by(&table, 0).unwrap();
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec![3.0, 1.0, 2.0]);
        assert_eq!(groups.sorted_keys(), vec![1.0, 2.0, 3.0]);

        let sorted: Vec<(f64, usize)> = groups
            .sorted()
            .into_iter()
            .map(|(k, t)| (k, t.num_rows()))
            .collect();
        assert_eq!(sorted, vec![(1.0, 2), (2.0, 1), (3.0, 1)]);
    }

    #[test]
    fn test_empty_and_out_of_range() {
        let empty = Table::new();
        assert!(group_by(&empty, 0).unwrap().is_empty());

        let no_rows = Table::from_columns(vec![vec![], vec![]]).unwrap();
        assert!(group_by(&no_rows, 1).unwrap().is_empty());

        let table = sample_table();
        assert!(matches!(
            group_by(&table, 3),
            Err(GroupingError::ColumnOutOfRange {
                index: 3,
                num_columns: 3
            })
        ));
    }
}
