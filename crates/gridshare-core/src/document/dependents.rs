//! Reverse dependency map for the active sheet.
//!
//! The server evaluates formulas; the client only needs to know whether a
//! literal edit can change some visible formula result, and therefore
//! whether the sheet is worth reloading.

use std::collections::{HashMap, HashSet};

use super::store::CellStore;
use gridshare_model::model::{CellRef, extract_dependencies};

#[derive(Debug, Default)]
pub struct DependencyIndex {
    /// cell -> formula cells that read it
    dependents: HashMap<CellRef, HashSet<CellRef>>,
}

impl DependencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from every formula in `store`, which holds the sheet named
    /// `sheet_name`. Call after cells are added, removed, or their formulas
    /// change.
    pub fn rebuild(&mut self, store: &CellStore, sheet_name: &str) {
        self.dependents.clear();
        for cell in store.cells().into_iter().filter(|c| c.is_formula()) {
            let at = cell.cell_ref();
            for dep in extract_dependencies(&cell.formula, sheet_name) {
                self.dependents.entry(dep).or_default().insert(at);
            }
        }
    }

    pub fn clear(&mut self) {
        self.dependents.clear();
    }

    /// Some formula on the sheet reads `cell`.
    pub fn has_dependents(&self, cell: &CellRef) -> bool {
        self.dependents.get(cell).is_some_and(|d| !d.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridshare_model::model::Cell;

    fn formula(row: usize, column: usize, text: &str) -> Cell {
        Cell {
            formula: text.to_string(),
            ..Cell::empty(CellRef::new(row, column))
        }
    }

    #[test]
    fn test_rebuild_tracks_direct_references() {
        let store = CellStore::from_cells(vec![
            formula(1, 2, "=A1*2"),
            formula(1, 3, "=B1+1"),
            formula(2, 1, "=Other!A1"),
        ]);
        let mut index = DependencyIndex::new();
        index.rebuild(&store, "Sheet1");

        let a1 = CellRef::new(1, 1);
        assert!(index.has_dependents(&a1));
        assert!(index.has_dependents(&CellRef::new(1, 2)));
        assert!(!index.has_dependents(&CellRef::new(1, 3)));
        assert!(!index.has_dependents(&CellRef::new(5, 5)));
    }

    #[test]
    fn test_clear_and_rebuild_replace_entries() {
        let mut store = CellStore::from_cells(vec![formula(1, 1, "=B1")]);
        let mut index = DependencyIndex::new();
        index.rebuild(&store, "Sheet1");
        assert!(index.has_dependents(&CellRef::new(1, 2)));

        store.write_local(Cell::empty(CellRef::new(1, 1)));
        index.rebuild(&store, "Sheet1");
        assert!(!index.has_dependents(&CellRef::new(1, 2)));

        index.rebuild(&CellStore::from_cells(vec![formula(2, 2, "=C3")]), "Sheet1");
        index.clear();
        assert!(!index.has_dependents(&CellRef::new(3, 3)));
    }
}
