//! The bidirectional cursor protocol that every index scan and every
//! composite filter evaluation speaks.
//!
//! A cursor never holds the whole candidate set resolved to entries; it
//! walks ordered entry ids and the search evaluator resolves each id to an
//! entry only when it actually needs to inspect one. The composite cursors
//! (`and`/`or`/`not`) compose purely over the ordering, never touching the
//! master table.

use dirsrv_core::EntryId;

/// Where a cursor sits relative to its element sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    BeforeFirst,
    At(usize),
    AfterLast,
}

/// A bidirectional, lazily-advanced iterator over a sorted sequence of
/// entry ids, closeable once a consumer is done with it.
///
/// Every method below mirrors a cursor primitive from the underlying index
/// walk this type is built for: `before_first`/`after_last` reposition
/// without reading, `first`/`last` reposition and read, `next`/`previous`
/// step one element, `before`/`after` seek to a target id without
/// necessarily landing on it, `get` reads without moving, and `available`
/// answers whether a `get` would currently succeed.
pub trait Cursor {
    fn before_first(&mut self);
    fn after_last(&mut self);
    fn first(&mut self) -> Option<EntryId>;
    fn last(&mut self) -> Option<EntryId>;
    fn next(&mut self) -> Option<EntryId>;
    fn previous(&mut self) -> Option<EntryId>;
    fn before(&mut self, id: EntryId);
    fn after(&mut self, id: EntryId);
    fn get(&self) -> Option<EntryId>;
    fn available(&self) -> bool;
    fn close(&mut self);
}

/// A cursor over a materialized, sorted, de-duplicated list of ids.
///
/// The leaf cursors built from an index range scan or a full table scan
/// all end up in this shape: LMDB's prefix iterator is exhausted eagerly
/// into a `Vec` at cursor-construction time rather than kept open across
/// the whole search, trading the fully lazy merge-join a disk-resident
/// B-tree would support for a much simpler composite-cursor implementation.
/// Cardinalities inside one partition's indices are small enough in
/// practice that this is a fair trade, and it keeps read transactions
/// short-lived instead of pinned for the duration of a search.
pub struct VecCursor {
    ids: Vec<EntryId>,
    position: Position,
    closed: bool,
}

impl VecCursor {
    pub fn new(mut ids: Vec<EntryId>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        Self {
            ids,
            position: Position::BeforeFirst,
            closed: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[EntryId] {
        &self.ids
    }

    fn at(&self, idx: usize) -> Option<EntryId> {
        self.ids.get(idx).copied()
    }
}

impl Cursor for VecCursor {
    fn before_first(&mut self) {
        self.position = Position::BeforeFirst;
    }

    fn after_last(&mut self) {
        self.position = Position::AfterLast;
    }

    fn first(&mut self) -> Option<EntryId> {
        if self.ids.is_empty() {
            self.position = Position::AfterLast;
            return None;
        }
        self.position = Position::At(0);
        self.at(0)
    }

    fn last(&mut self) -> Option<EntryId> {
        if self.ids.is_empty() {
            self.position = Position::BeforeFirst;
            return None;
        }
        let idx = self.ids.len() - 1;
        self.position = Position::At(idx);
        self.at(idx)
    }

    fn next(&mut self) -> Option<EntryId> {
        let next_idx = match self.position {
            Position::BeforeFirst => 0,
            Position::At(i) => i + 1,
            Position::AfterLast => return None,
        };
        if next_idx >= self.ids.len() {
            self.position = Position::AfterLast;
            return None;
        }
        self.position = Position::At(next_idx);
        self.at(next_idx)
    }

    fn previous(&mut self) -> Option<EntryId> {
        let prev_idx = match self.position {
            Position::AfterLast => {
                if self.ids.is_empty() {
                    None
                } else {
                    Some(self.ids.len() - 1)
                }
            }
            Position::At(0) => None,
            Position::At(i) => Some(i - 1),
            Position::BeforeFirst => None,
        };
        match prev_idx {
            Some(idx) => {
                self.position = Position::At(idx);
                self.at(idx)
            }
            None => {
                self.position = Position::BeforeFirst;
                None
            }
        }
    }

    fn before(&mut self, id: EntryId) {
        match self.ids.binary_search(&id) {
            Ok(idx) | Err(idx) => {
                if idx == 0 {
                    self.position = Position::BeforeFirst;
                } else {
                    self.position = Position::At(idx - 1);
                }
            }
        }
    }

    fn after(&mut self, id: EntryId) {
        match self.ids.binary_search(&id) {
            Ok(idx) => self.position = Position::At(idx),
            Err(idx) => {
                if idx >= self.ids.len() {
                    self.position = Position::AfterLast;
                } else {
                    self.position = Position::At(idx);
                }
            }
        }
    }

    fn get(&self) -> Option<EntryId> {
        match self.position {
            Position::At(i) => self.at(i),
            _ => None,
        }
    }

    fn available(&self) -> bool {
        matches!(self.position, Position::At(i) if i < self.ids.len())
    }

    fn close(&mut self) {
        self.closed = true;
        self.ids.clear();
        self.position = Position::BeforeFirst;
    }
}

/// Intersection of every child cursor's id set, ascending.
///
/// Built as a sorted-merge rather than repeated membership probes: each
/// child is fully drained once via `next()` and the shortest-estimated
/// child should be supplied first by the caller (the search evaluator
/// reorders `AND` children by estimated cardinality before calling this).
pub fn and_cursor(children: Vec<VecCursor>) -> VecCursor {
    if children.is_empty() {
        return VecCursor::empty();
    }
    let mut sets: Vec<std::collections::BTreeSet<EntryId>> = children
        .into_iter()
        .map(|c| c.ids.into_iter().collect())
        .collect();
    sets.sort_by_key(|s| s.len());
    let mut iter = sets.into_iter();
    let mut acc = iter.next().unwrap_or_default();
    for set in iter {
        acc.retain(|id| set.contains(id));
        if acc.is_empty() {
            break;
        }
    }
    VecCursor::new(acc.into_iter().collect())
}

/// Union of every child cursor's id set, de-duplicated and ascending.
pub fn or_cursor(children: Vec<VecCursor>) -> VecCursor {
    let mut acc: Vec<EntryId> = Vec::new();
    for child in children {
        acc.extend(child.ids);
    }
    VecCursor::new(acc)
}

/// Every id in `universe` not present in `excluded`.
///
/// `NOT` has no index of its own to scan: it always walks the full
/// candidate universe (typically the enclosing scope's id set) and
/// subtracts the negated clause's matches.
pub fn not_cursor(universe: &VecCursor, excluded: &VecCursor) -> VecCursor {
    let excluded_set: std::collections::BTreeSet<EntryId> = excluded.ids.iter().copied().collect();
    let remaining: Vec<EntryId> = universe
        .ids
        .iter()
        .copied()
        .filter(|id| !excluded_set.contains(id))
        .collect();
    VecCursor::new(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[u64]) -> Vec<EntryId> {
        values.iter().copied().map(EntryId::new).collect()
    }

    #[test]
    fn walks_forward_and_backward() {
        let mut c = VecCursor::new(ids(&[3, 1, 2]));
        assert_eq!(c.next(), Some(EntryId::new(1)));
        assert_eq!(c.next(), Some(EntryId::new(2)));
        assert_eq!(c.next(), Some(EntryId::new(3)));
        assert_eq!(c.next(), None);
        assert_eq!(c.previous(), Some(EntryId::new(3)));
        assert_eq!(c.previous(), Some(EntryId::new(2)));
    }

    #[test]
    fn before_and_after_seek_without_landing_exactly() {
        let mut c = VecCursor::new(ids(&[10, 20, 30]));
        c.after(EntryId::new(15));
        assert_eq!(c.get(), Some(EntryId::new(20)));
        c.before(EntryId::new(25));
        assert_eq!(c.get(), Some(EntryId::new(20)));
    }

    #[test]
    fn and_cursor_intersects() {
        let a = VecCursor::new(ids(&[1, 2, 3, 4]));
        let b = VecCursor::new(ids(&[2, 4, 6]));
        let result = and_cursor(vec![a, b]);
        assert_eq!(result.ids, ids(&[2, 4]));
    }

    #[test]
    fn or_cursor_unions_and_dedupes() {
        let a = VecCursor::new(ids(&[1, 2]));
        let b = VecCursor::new(ids(&[2, 3]));
        let result = or_cursor(vec![a, b]);
        assert_eq!(result.ids, ids(&[1, 2, 3]));
    }

    #[test]
    fn not_cursor_subtracts_from_universe() {
        let universe = VecCursor::new(ids(&[1, 2, 3, 4]));
        let excluded = VecCursor::new(ids(&[2, 4]));
        let result = not_cursor(&universe, &excluded);
        assert_eq!(result.ids, ids(&[1, 3]));
    }

    #[test]
    fn closing_clears_state() {
        let mut c = VecCursor::new(ids(&[1, 2]));
        c.first();
        c.close();
        assert!(!c.available());
        assert_eq!(c.get(), None);
    }
}
