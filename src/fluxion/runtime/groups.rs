//! Group-by key indexing.
//!
//! Maps a tuple of field values to a stable per-group state row. The index
//! is hierarchical: one nesting level per by-field, each level keyed by the
//! inspected value. A miss allocates the next sequential group id and
//! inserts the index path; identical field-value tuples therefore always
//! resolve to the same id for the life of the index, and ids are never
//! reused even after their row is deleted.
//!
//! Rows are created lazily on first reference through a caller-supplied
//! state factory, and reclaimed by the owning proc (`delete_group`,
//! `reset_groups`) when it determines they are no longer needed. The index
//! itself is append-only while the `Groups` instance lives.

use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, HashSet};

use super::types::{Point, Value};

/// Stable identifier of one group
pub type GroupId = u64;

/// Per-group mutable state: the by-field values that key the group plus
/// whatever state the owning proc accumulates.
#[derive(Debug)]
pub struct Row<S> {
    /// The by-field values, in by-list order
    pub key: Vec<Value>,
    /// Proc-specific state
    pub state: S,
}

#[derive(Debug, Default)]
struct IndexNode {
    children: FxHashMap<Value, IndexNode>,
    id: Option<GroupId>,
}

/// Group-by index plus the live row table.
///
/// Iteration via [`Groups::apply`] is in id-allocation order, which is not
/// a time or value order; consumers that need a defined sort must sort
/// explicitly.
#[derive(Debug)]
pub struct Groups<S> {
    by: Vec<String>,
    root: IndexNode,
    rows: BTreeMap<GroupId, Row<S>>,
    next_id: GroupId,
    warned_missing: HashSet<String>,
}

impl<S> Groups<S> {
    /// Create an index over the given by-field list. An empty list means
    /// every point resolves to the single sentinel group.
    pub fn new(by: Vec<String>) -> Self {
        Groups {
            by,
            root: IndexNode::default(),
            rows: BTreeMap::new(),
            next_id: 0,
            warned_missing: HashSet::new(),
        }
    }

    /// The by-field list
    pub fn by(&self) -> &[String] {
        &self.by
    }

    /// True when there is no by-list (single sentinel group)
    pub fn ungrouped(&self) -> bool {
        self.by.is_empty()
    }

    /// Number of live rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows are live
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolve the group id for a point, allocating on first sight.
    ///
    /// Missing by-fields index as `Null`; the first miss of each field
    /// reports through `warn`, later misses are silent.
    pub fn lookup_key(&mut self, point: &Point, mut warn: impl FnMut(String)) -> GroupId {
        let mut node = &mut self.root;
        for field in &self.by {
            let value = match point.get(field) {
                Some(v) => v.clone(),
                None => {
                    if self.warned_missing.insert(field.clone()) {
                        warn(format!("point is missing group-by field '{}'", field));
                    }
                    Value::Null
                }
            };
            node = node.children.entry(value).or_default();
        }
        match node.id {
            Some(id) => id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                node.id = Some(id);
                id
            }
        }
    }

    /// Resolve a point to its mutable row, constructing the row on first
    /// reference via `make`.
    pub fn lookup(
        &mut self,
        point: &Point,
        warn: impl FnMut(String),
        make: impl FnOnce(&Point) -> S,
    ) -> (&mut Row<S>, GroupId) {
        let id = self.lookup_key(point, warn);
        let by = &self.by;
        let row = self.rows.entry(id).or_insert_with(|| Row {
            key: by
                .iter()
                .map(|f| point.get(f).cloned().unwrap_or(Value::Null))
                .collect(),
            state: make(point),
        });
        (row, id)
    }

    /// For the ungrouped case: make sure the sentinel row exists, so a
    /// reduction over an empty stream still produces its one result row.
    pub fn ensure_sentinel(&mut self, make: impl FnOnce(&Point) -> S) {
        if self.by.is_empty() && self.rows.is_empty() {
            let empty = Point::new();
            self.lookup(&empty, |_| {}, make);
        }
    }

    /// Get a live row by id
    pub fn row(&self, id: GroupId) -> Option<&Row<S>> {
        self.rows.get(&id)
    }

    /// Get a live row mutably by id
    pub fn row_mut(&mut self, id: GroupId) -> Option<&mut Row<S>> {
        self.rows.get_mut(&id)
    }

    /// Iterate every live row in id-allocation order
    pub fn apply(&mut self, mut f: impl FnMut(GroupId, &mut Row<S>)) {
        for (id, row) in self.rows.iter_mut() {
            f(*id, row);
        }
    }

    /// Reclaim one row. The id stays allocated: a later point with the
    /// same key tuple resolves to the same id and lazily rebuilds the row.
    pub fn delete_group(&mut self, id: GroupId) -> Option<Row<S>> {
        self.rows.remove(&id)
    }

    /// Reclaim every row, keeping the index (and so the id assignment).
    pub fn reset_groups(&mut self) {
        self.rows.clear();
    }
}
