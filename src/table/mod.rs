//! In-process tabular compute.
//!
//! The pipeline stages are written as table algebra (filter, explode, distinct,
//! left join, group-by/aggregate) over `Table` values, and persisted through a
//! `checkpoint::CheckpointStore`.  Aggregations over groups are evaluated in
//! parallel with `rayon`.

pub mod checkpoint;

use std::{collections::BTreeMap, collections::HashMap, hash::Hash};

use rayon::prelude::*;

/// A table with table-level `globals` and a list of `rows`.
///
/// Row order carries no meaning except where an operation documents it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Table<G, R> {
    /// Table-level metadata.
    pub globals: G,
    /// The rows.
    pub rows: Vec<R>,
}

impl<G, R> Table<G, R> {
    pub fn new(globals: G, rows: Vec<R>) -> Self {
        Self { globals, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep only the rows matching `predicate`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&R) -> bool,
    {
        self.rows.retain(|row| predicate(row));
        self
    }

    /// Replace each row by zero or more rows.
    pub fn explode<S, I, F>(self, f: F) -> Table<G, S>
    where
        F: FnMut(R) -> I,
        I: IntoIterator<Item = S>,
    {
        Table {
            globals: self.globals,
            rows: self.rows.into_iter().flat_map(f).collect(),
        }
    }

    /// Collapse rows with equal key, keeping the first one.
    ///
    /// The resulting rows are sorted by key.
    pub fn distinct_by_key<K, F>(mut self, key: F) -> Self
    where
        K: Ord,
        F: Fn(&R) -> K,
    {
        self.rows.sort_by_key(|row| key(row));
        self.rows.dedup_by(|a, b| key(a) == key(b));
        self
    }

    /// Left-join against `lookup`; rows without a match see `None`.
    ///
    /// Every row of `self` is retained.
    pub fn left_join<K, V, S, FK, FC>(
        self,
        lookup: &HashMap<K, V>,
        key: FK,
        combine: FC,
    ) -> Table<G, S>
    where
        K: Eq + Hash,
        FK: Fn(&R) -> K,
        FC: Fn(R, Option<&V>) -> S,
    {
        Table {
            globals: self.globals,
            rows: self
                .rows
                .into_iter()
                .map(|row| {
                    let value = lookup.get(&key(&row));
                    combine(row, value)
                })
                .collect(),
        }
    }

    /// Group rows by `key` and reduce each group with `aggregate`.
    ///
    /// Groups are aggregated in parallel; the result is ordered by key.
    pub fn group_by<K, S, FK, FA>(
        self,
        key: FK,
        aggregate: FA,
    ) -> Result<Table<G, S>, anyhow::Error>
    where
        R: Send,
        K: Ord + Send + Sync,
        S: Send,
        FK: Fn(&R) -> K,
        FA: Fn(&K, Vec<R>) -> Result<S, anyhow::Error> + Sync,
    {
        let mut groups: BTreeMap<K, Vec<R>> = BTreeMap::new();
        for row in self.rows {
            groups.entry(key(&row)).or_default().push(row);
        }

        let rows = groups
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|(key, group)| aggregate(&key, group))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Table {
            globals: self.globals,
            rows,
        })
    }

    /// Replace the globals.
    pub fn with_globals<H>(self, globals: H) -> Table<H, R> {
        Table {
            globals,
            rows: self.rows,
        }
    }
}
