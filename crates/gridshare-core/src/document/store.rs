//! Client-side cell cache for the active sheet.
//!
//! Sparse: only cells with content or style are kept. Every local mutation
//! of a cell takes a ticket from that cell's sequence, and a server reply is
//! only applied while its ticket is still the newest. Cells also carry the
//! server's version; a remote update older than what is already held is
//! dropped.

use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};

use gridshare_model::model::{Cell, CellRef};

/// Deep copy of a whole sheet, as stored in history.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SheetSnapshot {
    cells: BTreeMap<CellRef, Cell>,
}

impl SheetSnapshot {
    pub fn get(&self, at: &CellRef) -> Option<&Cell> {
        self.cells.get(at)
    }

    pub fn contains(&self, at: &CellRef) -> bool {
        self.cells.contains_key(at)
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Ticket for one in-flight write of one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteTicket {
    pub cell: CellRef,
    seq: u64,
}

#[derive(Default)]
pub struct CellStore {
    cells: DashMap<CellRef, Cell>,
    sequence: HashMap<CellRef, u64>,
}

impl CellStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding exactly `cells`.
    pub fn from_cells(cells: impl IntoIterator<Item = Cell>) -> Self {
        let store = Self::new();
        for cell in cells {
            store.put(cell);
        }
        store
    }

    pub fn get(&self, at: &CellRef) -> Option<Cell> {
        self.cells.get(at).map(|r| r.clone())
    }

    /// The stored cell, or an empty one at `at`.
    pub fn cell_or_empty(&self, at: CellRef) -> Cell {
        self.get(&at).unwrap_or_else(|| Cell::empty(at))
    }

    /// Text to show in the grid: the computed value, or the formula while
    /// no value has come back for it yet.
    pub fn display_text(&self, at: &CellRef) -> String {
        match self.cells.get(at) {
            Some(cell) if cell.value.is_empty() => cell.formula.clone(),
            Some(cell) => cell.value.clone(),
            None => String::new(),
        }
    }

    /// Text that seeds an edit of `at`: formula if any, else value.
    pub fn input_text(&self, at: &CellRef) -> String {
        self.cells
            .get(at)
            .map(|c| c.input_text().to_string())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Positions of all stored cells, row-major.
    pub fn refs(&self) -> Vec<CellRef> {
        let mut refs: Vec<CellRef> = self.cells.iter().map(|e| *e.key()).collect();
        refs.sort();
        refs
    }

    /// Clones of all stored cells, row-major.
    pub fn cells(&self) -> Vec<Cell> {
        let mut cells: Vec<Cell> = self.cells.iter().map(|e| e.value().clone()).collect();
        cells.sort_by_key(Cell::cell_ref);
        cells
    }

    fn put(&self, cell: Cell) {
        let at = cell.cell_ref();
        if cell.is_blank() {
            self.cells.remove(&at);
        } else {
            self.cells.insert(at, cell);
        }
    }

    fn bump(&mut self, at: CellRef) -> u64 {
        let seq = self.sequence.entry(at).or_insert(0);
        *seq += 1;
        *seq
    }

    /// Apply an optimistic local edit and take a ticket for its server reply.
    pub fn write_local(&mut self, cell: Cell) -> WriteTicket {
        let at = cell.cell_ref();
        let seq = self.bump(at);
        self.put(cell);
        WriteTicket { cell: at, seq }
    }

    /// Overwrite with the server's copy if no newer write happened to the
    /// cell since `ticket` was taken. Returns whether it was applied.
    pub fn settle(&mut self, ticket: WriteTicket, authoritative: Cell) -> bool {
        if self.sequence.get(&ticket.cell) != Some(&ticket.seq) {
            return false;
        }
        if authoritative.cell_ref() != ticket.cell {
            return false;
        }
        self.put(authoritative);
        true
    }

    /// Apply a cell pushed by another session. Versioned updates older than
    /// the local copy are rejected; unversioned ones always win.
    pub fn apply_remote(&mut self, cell: Cell) -> bool {
        let at = cell.cell_ref();
        if cell.version != 0 {
            let local = self.cells.get(&at).map(|c| c.version).unwrap_or(0);
            if cell.version < local {
                return false;
            }
        }
        self.bump(at);
        self.put(cell);
        true
    }

    /// Replace the whole sheet with a freshly loaded cell list.
    pub fn replace_all(&mut self, cells: impl IntoIterator<Item = Cell>) {
        self.cells.clear();
        self.sequence.clear();
        for cell in cells {
            self.put(cell);
        }
    }

    pub fn snapshot(&self) -> SheetSnapshot {
        SheetSnapshot {
            cells: self
                .cells
                .iter()
                .map(|e| (*e.key(), e.value().clone()))
                .collect(),
        }
    }

    /// Make the store equal to `snapshot`. Every cell counts as rewritten.
    pub fn restore(&mut self, snapshot: &SheetSnapshot) {
        let touched: Vec<CellRef> = self
            .refs()
            .into_iter()
            .chain(snapshot.cells.keys().copied())
            .collect();
        for at in touched {
            self.bump(at);
        }
        self.cells.clear();
        for cell in snapshot.cells() {
            self.put(cell.clone());
        }
    }

    /// Matches `snapshot` cell for cell.
    pub fn matches(&self, snapshot: &SheetSnapshot) -> bool {
        self.cells.len() == snapshot.len()
            && snapshot
                .cells()
                .all(|c| self.cells.get(&c.cell_ref()).is_some_and(|local| *local == *c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(row: usize, column: usize, value: &str, version: u64) -> Cell {
        Cell {
            value: value.to_string(),
            version,
            ..Cell::empty(CellRef::new(row, column))
        }
    }

    #[test]
    fn test_blank_cells_are_not_stored() {
        let mut store = CellStore::new();
        store.write_local(literal(1, 1, "x", 0));
        assert_eq!(store.len(), 1);
        store.write_local(Cell::empty(CellRef::new(1, 1)));
        assert!(store.is_empty());
        assert_eq!(store.display_text(&CellRef::new(1, 1)), "");
    }

    #[test]
    fn test_display_text_falls_back_to_formula() {
        let mut store = CellStore::new();
        let mut cell = Cell::empty(CellRef::new(2, 2));
        cell.formula = "=A1+1".into();
        store.write_local(cell);
        assert_eq!(store.display_text(&CellRef::new(2, 2)), "=A1+1");
        assert_eq!(store.input_text(&CellRef::new(2, 2)), "=A1+1");
    }

    #[test]
    fn test_settle_ignores_superseded_ticket() {
        let mut store = CellStore::new();
        let first = store.write_local(literal(1, 1, "1", 0));
        let second = store.write_local(literal(1, 1, "2", 0));

        assert!(!store.settle(first, literal(1, 1, "1", 1)));
        assert_eq!(store.display_text(&CellRef::new(1, 1)), "2");

        assert!(store.settle(second, literal(1, 1, "2", 2)));
        assert_eq!(store.get(&CellRef::new(1, 1)).unwrap().version, 2);
    }

    #[test]
    fn test_remote_update_supersedes_pending_write() {
        let mut store = CellStore::new();
        let ticket = store.write_local(literal(1, 1, "mine", 0));
        assert!(store.apply_remote(literal(1, 1, "theirs", 0)));
        assert!(!store.settle(ticket, literal(1, 1, "mine", 1)));
        assert_eq!(store.display_text(&CellRef::new(1, 1)), "theirs");
    }

    #[test]
    fn test_apply_remote_rejects_older_version() {
        let mut store = CellStore::from_cells(vec![literal(3, 1, "new", 5)]);
        assert!(!store.apply_remote(literal(3, 1, "old", 4)));
        assert_eq!(store.display_text(&CellRef::new(3, 1)), "new");
        assert!(store.apply_remote(literal(3, 1, "newer", 6)));
        assert!(store.apply_remote(literal(3, 1, "unversioned", 0)));
        assert_eq!(store.display_text(&CellRef::new(3, 1)), "unversioned");
    }

    #[test]
    fn test_snapshot_restore_and_matches() {
        let mut store = CellStore::from_cells(vec![literal(1, 1, "a", 0), literal(2, 1, "b", 0)]);
        let snap = store.snapshot();
        assert!(store.matches(&snap));

        store.write_local(literal(3, 3, "c", 0));
        assert!(!store.matches(&snap));

        store.restore(&snap);
        assert!(store.matches(&snap));
        assert_eq!(store.refs(), vec![CellRef::new(1, 1), CellRef::new(2, 1)]);
    }
}
