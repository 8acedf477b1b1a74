//! Selection and editing state machine.
//!
//! States: idle with a selected cell, range-selecting while the pointer is
//! held down, and editing. While editing exactly one surface (the grid cell
//! or the formula bar) owns the draft; input from the other one is ignored.
//!
//! Handlers never touch the store or the network. They return
//! [`SelectionAction`]s for the session to carry out, in order.

use super::composer::{insert_reference, reference_for};
use super::store::CellStore;
use gridshare_model::model::{CellRange, CellRef, Sheet, SheetId};

/// Surface that can own the live edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditSurface {
    Grid,
    FormulaBar,
}

/// Which surface is editing, if any.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditingSource {
    None,
    Grid,
    FormulaBar,
}

impl From<EditSurface> for EditingSource {
    fn from(surface: EditSurface) -> Self {
        match surface {
            EditSurface::Grid => EditingSource::Grid,
            EditSurface::FormulaBar => EditingSource::FormulaBar,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditState {
    pub cell: CellRef,
    /// Sheet the edited cell lives on. The user may browse other sheets
    /// while the edit is open to pick cross-sheet references.
    pub origin: Sheet,
    pub source: EditSurface,
    pub draft: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    fn delta(self) -> (isize, isize) {
        match self {
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Char(char),
    Arrow(Direction),
    Undo,
    Redo,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionAction {
    /// The selected cell changed (announce it to peers).
    CursorMoved(CellRef),
    DraftChanged,
    Commit {
        cell: CellRef,
        sheet_id: SheetId,
        text: String,
    },
    /// Clear content of every cell in the range.
    Clear(CellRange),
    Undo,
    Redo,
}

#[derive(Clone, Debug)]
pub struct SelectionController {
    active_sheet: Sheet,
    selected: CellRef,
    anchor: CellRef,
    range: Option<CellRange>,
    dragging: bool,
    editing: Option<EditState>,
}

impl SelectionController {
    pub fn new(active_sheet: Sheet) -> Self {
        let home = CellRef::new(1, 1);
        Self {
            active_sheet,
            selected: home,
            anchor: home,
            range: None,
            dragging: false,
            editing: None,
        }
    }

    pub fn selected(&self) -> CellRef {
        self.selected
    }

    /// Explicit multi-cell range, if one is selected.
    pub fn range(&self) -> Option<CellRange> {
        self.range
    }

    /// Range the next range operation applies to.
    pub fn selection_range(&self) -> CellRange {
        self.range.unwrap_or(CellRange::single(self.selected))
    }

    pub fn is_range_selecting(&self) -> bool {
        self.dragging
    }

    pub fn editing(&self) -> Option<&EditState> {
        self.editing.as_ref()
    }

    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    pub fn editing_source(&self) -> EditingSource {
        self.editing
            .as_ref()
            .map_or(EditingSource::None, |e| e.source.into())
    }

    /// Text both surfaces display: the draft while editing.
    pub fn draft(&self) -> Option<&str> {
        self.editing.as_ref().map(|e| e.draft.as_str())
    }

    pub fn active_sheet(&self) -> &Sheet {
        &self.active_sheet
    }

    /// The view moved to another sheet. An open edit survives.
    pub fn set_active_sheet(&mut self, sheet: Sheet) {
        self.active_sheet = sheet;
        self.range = None;
        self.dragging = false;
        self.anchor = self.selected;
    }

    /// Keep sheet names current after a rename.
    pub fn sheet_renamed(&mut self, sheet: &Sheet) {
        if self.active_sheet.id == sheet.id {
            self.active_sheet = sheet.clone();
        }
        if let Some(edit) = self.editing.as_mut()
            && edit.origin.id == sheet.id
        {
            edit.origin = sheet.clone();
        }
    }

    /// Drop the edit without committing. Returns whether one was open.
    pub fn cancel_edit(&mut self) -> bool {
        self.editing.take().is_some()
    }

    fn select(&mut self, cell: CellRef) -> Vec<SelectionAction> {
        let moved = cell != self.selected;
        self.selected = cell;
        self.anchor = cell;
        self.range = None;
        if moved {
            vec![SelectionAction::CursorMoved(cell)]
        } else {
            Vec::new()
        }
    }

    fn begin_edit(&mut self, source: EditSurface, draft: String) {
        self.editing = Some(EditState {
            cell: self.selected,
            origin: self.active_sheet.clone(),
            source,
            draft,
        });
        self.range = None;
        self.dragging = false;
    }

    pub fn pointer_down(&mut self, cell: CellRef, shift: bool) -> Vec<SelectionAction> {
        if !cell.in_bounds() {
            return Vec::new();
        }
        if let Some(edit) = self.editing.as_mut() {
            if edit.cell == cell && edit.origin.id == self.active_sheet.id {
                return Vec::new();
            }
            let reference = reference_for(cell, &self.active_sheet, &edit.origin);
            edit.draft = insert_reference(&edit.draft, &reference);
            return vec![SelectionAction::DraftChanged];
        }

        if shift {
            self.range = Some(CellRange::new(self.anchor, cell));
            return Vec::new();
        }

        let actions = self.select(cell);
        self.dragging = true;
        actions
    }

    pub fn pointer_enter(&mut self, cell: CellRef) -> Vec<SelectionAction> {
        if !self.dragging || self.editing.is_some() || !cell.in_bounds() {
            return Vec::new();
        }
        let range = CellRange::new(self.anchor, cell);
        self.range = (!range.is_single()).then_some(range);
        if cell == self.selected {
            return Vec::new();
        }
        self.selected = cell;
        vec![SelectionAction::CursorMoved(cell)]
    }

    pub fn pointer_up(&mut self) {
        self.dragging = false;
    }

    pub fn double_click(&mut self, cell: CellRef, store: &CellStore) -> Vec<SelectionAction> {
        if self.editing.is_some() || !cell.in_bounds() {
            return Vec::new();
        }
        let mut actions = self.select(cell);
        self.begin_edit(EditSurface::Grid, store.input_text(&cell));
        actions.push(SelectionAction::DraftChanged);
        actions
    }

    /// Move focus to the formula bar: starts an edit there, or takes over
    /// the grid's edit keeping its draft.
    pub fn focus_formula_bar(&mut self, store: &CellStore) -> Vec<SelectionAction> {
        match self.editing.as_mut() {
            Some(edit) => edit.source = EditSurface::FormulaBar,
            None => {
                let seed = store.input_text(&self.selected);
                self.begin_edit(EditSurface::FormulaBar, seed);
            }
        }
        vec![SelectionAction::DraftChanged]
    }

    /// Hand an open formula-bar edit back to the grid cell.
    pub fn focus_grid(&mut self) {
        if let Some(edit) = self.editing.as_mut() {
            edit.source = EditSurface::Grid;
        }
    }

    /// Replace the draft from `surface`. Ignored unless that surface owns
    /// the edit.
    pub fn set_draft(&mut self, surface: EditSurface, text: &str) -> Vec<SelectionAction> {
        match self.editing.as_mut() {
            Some(edit) if edit.source == surface => {
                edit.draft = text.to_string();
                vec![SelectionAction::DraftChanged]
            }
            _ => Vec::new(),
        }
    }

    /// Open a grid edit on the selected cell with `text` as the draft, or
    /// replace the draft of the open edit.
    pub fn begin_edit_with(&mut self, text: String) -> Vec<SelectionAction> {
        match self.editing.as_mut() {
            Some(edit) => edit.draft = text,
            None => self.begin_edit(EditSurface::Grid, text),
        }
        vec![SelectionAction::DraftChanged]
    }

    pub fn key(&mut self, surface: EditSurface, key: Key, store: &CellStore) -> Vec<SelectionAction> {
        match self.editing.as_ref().map(|e| e.source) {
            Some(owner) if owner != surface => Vec::new(),
            Some(_) => self.editing_key(key),
            None => self.idle_key(key, store),
        }
    }

    fn idle_key(&mut self, key: Key, store: &CellStore) -> Vec<SelectionAction> {
        match key {
            Key::Enter => {
                let seed = store.input_text(&self.selected);
                self.begin_edit(EditSurface::Grid, seed);
                vec![SelectionAction::DraftChanged]
            }
            Key::Char(c) => {
                self.begin_edit(EditSurface::Grid, c.to_string());
                vec![SelectionAction::DraftChanged]
            }
            Key::Arrow(direction) => {
                let (d_row, d_col) = direction.delta();
                self.select(self.selected.offset_clamped(d_row, d_col))
            }
            Key::Tab => self.select(self.selected.offset_clamped(0, 1)),
            Key::Backspace | Key::Delete => vec![SelectionAction::Clear(self.selection_range())],
            Key::Escape => {
                self.range = None;
                Vec::new()
            }
            Key::Undo => vec![SelectionAction::Undo],
            Key::Redo => vec![SelectionAction::Redo],
        }
    }

    fn editing_key(&mut self, key: Key) -> Vec<SelectionAction> {
        match key {
            Key::Enter => self.commit_and_move(1, 0),
            Key::Tab => self.commit_and_move(0, 1),
            Key::Escape => {
                self.editing = None;
                Vec::new()
            }
            Key::Char(c) => {
                if let Some(edit) = self.editing.as_mut() {
                    edit.draft.push(c);
                }
                vec![SelectionAction::DraftChanged]
            }
            Key::Backspace => {
                if let Some(edit) = self.editing.as_mut() {
                    edit.draft.pop();
                }
                vec![SelectionAction::DraftChanged]
            }
            Key::Delete | Key::Arrow(_) | Key::Undo | Key::Redo => Vec::new(),
        }
    }

    fn commit_and_move(&mut self, d_row: isize, d_col: isize) -> Vec<SelectionAction> {
        let Some(edit) = self.editing.take() else {
            return Vec::new();
        };
        let mut actions = vec![SelectionAction::Commit {
            cell: edit.cell,
            sheet_id: edit.origin.id,
            text: edit.draft,
        }];
        let next = edit.cell.offset_clamped(d_row, d_col);
        self.selected = next;
        self.anchor = next;
        self.range = None;
        actions.push(SelectionAction::CursorMoved(next));
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridshare_model::model::Cell;

    fn sheet(id: i64, name: &str) -> Sheet {
        Sheet {
            id,
            name: name.to_string(),
            order: id,
        }
    }

    fn controller() -> SelectionController {
        SelectionController::new(sheet(1, "Sheet1"))
    }

    fn store_with(at: CellRef, value: &str, formula: &str) -> CellStore {
        CellStore::from_cells(vec![Cell {
            value: value.to_string(),
            formula: formula.to_string(),
            ..Cell::empty(at)
        }])
    }

    #[test]
    fn test_printable_key_overwrites_draft() {
        let store = store_with(CellRef::new(1, 1), "old", "");
        let mut sel = controller();
        sel.key(EditSurface::Grid, Key::Char('7'), &store);
        assert_eq!(sel.editing_source(), EditingSource::Grid);
        assert_eq!(sel.draft(), Some("7"));
    }

    #[test]
    fn test_enter_and_double_click_seed_formula_first() {
        let at = CellRef::new(2, 2);
        let store = store_with(at, "10", "=A1*2");
        let mut sel = controller();
        sel.pointer_down(at, false);
        sel.pointer_up();
        sel.key(EditSurface::Grid, Key::Enter, &store);
        assert_eq!(sel.draft(), Some("=A1*2"));

        sel.key(EditSurface::Grid, Key::Escape, &store);
        assert!(!sel.is_editing());
        assert_eq!(sel.editing_source(), EditingSource::None);

        sel.double_click(at, &store);
        assert_eq!(sel.draft(), Some("=A1*2"));
    }

    #[test]
    fn test_enter_commits_and_moves_down_clamped() {
        let store = CellStore::new();
        let mut sel = controller();
        sel.pointer_down(CellRef::new(100, 1), false);
        sel.key(EditSurface::Grid, Key::Char('x'), &store);
        let actions = sel.key(EditSurface::Grid, Key::Enter, &store);
        assert_eq!(
            actions,
            vec![
                SelectionAction::Commit {
                    cell: CellRef::new(100, 1),
                    sheet_id: 1,
                    text: "x".into()
                },
                SelectionAction::CursorMoved(CellRef::new(100, 1)),
            ]
        );
        assert_eq!(sel.selected(), CellRef::new(100, 1));
    }

    #[test]
    fn test_tab_commits_and_moves_right() {
        let store = CellStore::new();
        let mut sel = controller();
        sel.pointer_down(CellRef::new(3, 25), false);
        sel.key(EditSurface::Grid, Key::Char('1'), &store);
        sel.key(EditSurface::Grid, Key::Tab, &store);
        assert_eq!(sel.selected(), CellRef::new(3, 26));

        sel.key(EditSurface::Grid, Key::Char('2'), &store);
        sel.key(EditSurface::Grid, Key::Tab, &store);
        assert_eq!(sel.selected(), CellRef::new(3, 26));
    }

    #[test]
    fn test_inactive_surface_is_ignored() {
        let store = CellStore::new();
        let mut sel = controller();
        sel.focus_formula_bar(&store);
        assert_eq!(sel.editing_source(), EditingSource::FormulaBar);

        assert!(sel.key(EditSurface::Grid, Key::Char('a'), &store).is_empty());
        assert!(sel.set_draft(EditSurface::Grid, "nope").is_empty());
        sel.set_draft(EditSurface::FormulaBar, "=1+");
        sel.key(EditSurface::FormulaBar, Key::Char('2'), &store);
        assert_eq!(sel.draft(), Some("=1+2"));

        sel.focus_grid();
        assert_eq!(sel.editing_source(), EditingSource::Grid);
        assert_eq!(sel.draft(), Some("=1+2"));
    }

    #[test]
    fn test_click_while_editing_inserts_reference() {
        let store = CellStore::new();
        let mut sel = controller();
        sel.key(EditSurface::Grid, Key::Char('='), &store);
        sel.pointer_down(CellRef::new(4, 3), false);
        assert_eq!(sel.draft(), Some("=C4"));
        assert_eq!(sel.selected(), CellRef::new(1, 1));

        // clicking the cell being edited does nothing
        assert!(sel.pointer_down(CellRef::new(1, 1), false).is_empty());
        assert_eq!(sel.draft(), Some("=C4"));
    }

    #[test]
    fn test_click_on_other_sheet_qualifies_reference() {
        let store = CellStore::new();
        let mut sel = controller();
        sel.key(EditSurface::Grid, Key::Char('='), &store);
        sel.set_active_sheet(sheet(2, "Data"));
        sel.pointer_down(CellRef::new(1, 1), false);
        assert_eq!(sel.draft(), Some("=Data!A1"));
        assert_eq!(sel.editing().unwrap().origin.id, 1);
    }

    #[test]
    fn test_drag_selects_range() {
        let mut sel = controller();
        sel.pointer_down(CellRef::new(2, 1), false);
        assert!(sel.is_range_selecting());
        sel.pointer_enter(CellRef::new(4, 2));
        sel.pointer_up();
        assert!(!sel.is_range_selecting());
        assert_eq!(sel.selection_range(), CellRange::parse("A2:B4").unwrap());
        assert_eq!(sel.selected(), CellRef::new(4, 2));

        // no drag after release
        sel.pointer_enter(CellRef::new(9, 9));
        assert_eq!(sel.selection_range(), CellRange::parse("A2:B4").unwrap());
    }

    #[test]
    fn test_shift_click_extends_from_selected() {
        let mut sel = controller();
        sel.pointer_down(CellRef::new(5, 5), false);
        sel.pointer_up();
        sel.pointer_down(CellRef::new(2, 3), true);
        assert_eq!(sel.selection_range(), CellRange::parse("C2:E5").unwrap());
        assert_eq!(sel.selected(), CellRef::new(5, 5));
    }

    #[test]
    fn test_delete_and_undo_in_idle_only() {
        let store = CellStore::new();
        let mut sel = controller();
        assert_eq!(
            sel.key(EditSurface::Grid, Key::Delete, &store),
            vec![SelectionAction::Clear(CellRange::single(CellRef::new(1, 1)))]
        );
        assert_eq!(
            sel.key(EditSurface::Grid, Key::Undo, &store),
            vec![SelectionAction::Undo]
        );
        sel.key(EditSurface::Grid, Key::Char('a'), &store);
        assert!(sel.key(EditSurface::Grid, Key::Undo, &store).is_empty());
        assert!(sel.key(EditSurface::Grid, Key::Redo, &store).is_empty());
    }

    #[test]
    fn test_arrows_clamp_and_clear_range() {
        let store = CellStore::new();
        let mut sel = controller();
        assert!(sel.key(EditSurface::Grid, Key::Arrow(Direction::Up), &store).is_empty());
        sel.pointer_down(CellRef::new(1, 1), false);
        sel.pointer_enter(CellRef::new(2, 2));
        sel.pointer_up();
        let actions = sel.key(EditSurface::Grid, Key::Arrow(Direction::Right), &store);
        assert_eq!(actions, vec![SelectionAction::CursorMoved(CellRef::new(2, 3))]);
        assert_eq!(sel.range(), None);
    }
}
