//! In-process backend.
//!
//! Behaves like the server for everything the client relies on (ids, sheet
//! ordering, sharing rules, per-cell versions) but never evaluates formulas:
//! a stored formula keeps an empty value.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Backend, CellWrite};
use crate::error::{GridshareError, Result};
use gridshare_model::model::{
    Cell, CellPatch, CellRef, Sheet, SheetId, Spreadsheet, SpreadsheetId, User, UserId,
};

pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

struct MemoryState {
    current: User,
    users: BTreeMap<UserId, User>,
    spreadsheets: BTreeMap<SpreadsheetId, StoredSpreadsheet>,
    sheets: BTreeMap<SheetId, StoredSheet>,
    next_id: i64,
    failing: bool,
    writes: usize,
    batches: Vec<serde_json::Value>,
}

struct StoredSpreadsheet {
    name: String,
    owner: UserId,
    shared_with: Vec<UserId>,
}

struct StoredSheet {
    spreadsheet_id: SpreadsheetId,
    sheet: Sheet,
    cells: HashMap<CellRef, Cell>,
}

impl MemoryBackend {
    /// A backend where `user` is the signed-in account.
    pub fn new(user: User) -> Self {
        let mut users = BTreeMap::new();
        users.insert(user.id, user.clone());
        let next_id = user.id.max(0) + 1;
        Self {
            state: Mutex::new(MemoryState {
                current: user,
                users,
                spreadsheets: BTreeMap::new(),
                sheets: BTreeMap::new(),
                next_id,
                failing: false,
                writes: 0,
                batches: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make another account known, so it can be shared with.
    pub fn register_user(&self, username: &str) -> User {
        let mut state = self.state();
        if let Some(user) = state.users.values().find(|u| u.username == username) {
            return user.clone();
        }
        let user = User {
            id: state.allocate_id(),
            username: username.to_string(),
        };
        state.users.insert(user.id, user.clone());
        user
    }

    /// While set, every cell write fails with a network error.
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    /// Number of cell writes accepted so far (single or batched).
    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    /// Request bodies of every batch update, as the HTTP backend would send
    /// them.
    pub fn batch_bodies(&self) -> Vec<serde_json::Value> {
        self.state().batches.clone()
    }

    /// Stored cell, as another client would read it.
    pub fn stored_cell(&self, sheet_id: SheetId, at: CellRef) -> Option<Cell> {
        self.state()
            .sheets
            .get(&sheet_id)
            .and_then(|s| s.cells.get(&at).cloned())
    }
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn spreadsheet(&self, id: SpreadsheetId) -> Result<&StoredSpreadsheet> {
        self.spreadsheets
            .get(&id)
            .ok_or_else(|| GridshareError::NotFound(format!("spreadsheet {id}")))
    }

    fn sheet_mut(&mut self, id: SheetId) -> Result<&mut StoredSheet> {
        self.sheets
            .get_mut(&id)
            .ok_or_else(|| GridshareError::NotFound(format!("sheet {id}")))
    }

    fn sheets_of(&self, spreadsheet_id: SpreadsheetId) -> Vec<Sheet> {
        let mut sheets: Vec<Sheet> = self
            .sheets
            .values()
            .filter(|s| s.spreadsheet_id == spreadsheet_id)
            .map(|s| s.sheet.clone())
            .collect();
        sheets.sort_by_key(|s| (s.order, s.id));
        sheets
    }

    fn record(&self, id: SpreadsheetId) -> Result<Spreadsheet> {
        let stored = self.spreadsheet(id)?;
        let username = |uid: &UserId| self.users.get(uid).map(|u| u.username.clone());
        Ok(Spreadsheet {
            id,
            name: stored.name.clone(),
            sheets: self.sheets_of(id),
            owner_username: username(&stored.owner),
            shared_with_usernames: stored.shared_with.iter().filter_map(username).collect(),
        })
    }

    fn insert_sheet(&mut self, spreadsheet_id: SpreadsheetId, name: &str) -> Sheet {
        let order = self
            .sheets
            .values()
            .filter(|s| s.spreadsheet_id == spreadsheet_id)
            .map(|s| s.sheet.order + 1)
            .max()
            .unwrap_or(0);
        let sheet = Sheet {
            id: self.allocate_id(),
            name: name.to_string(),
            order,
        };
        self.sheets.insert(
            sheet.id,
            StoredSheet {
                spreadsheet_id,
                sheet: sheet.clone(),
                cells: HashMap::new(),
            },
        );
        sheet
    }

    fn owned_by_current(&self, id: SpreadsheetId, action: &str) -> Result<()> {
        if self.spreadsheet(id)?.owner != self.current.id {
            return Err(GridshareError::Validation(format!(
                "Only the owner can {action}"
            )));
        }
        Ok(())
    }

    fn user_named(&self, username: &str) -> Result<UserId> {
        self.users
            .values()
            .find(|u| u.username == username)
            .map(|u| u.id)
            .ok_or_else(|| GridshareError::Validation(format!("User {username} not found")))
    }

    fn write_cell(&mut self, sheet_id: SheetId, at: CellRef, patch: &CellPatch) -> Result<Cell> {
        if self.failing {
            return Err(GridshareError::Network("backend unavailable".to_string()));
        }
        let sheet = self.sheet_mut(sheet_id)?;
        let cell = sheet.cells.entry(at).or_insert_with(|| Cell::empty(at));
        patch.apply_to(cell);
        cell.version += 1;
        let stored = cell.clone();
        self.writes += 1;
        Ok(stored)
    }
}

fn require_name(name: &str, what: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(GridshareError::Validation(format!("{what} name is required")));
    }
    Ok(trimmed.to_string())
}

impl Backend for MemoryBackend {
    fn current_user(&self) -> Result<User> {
        Ok(self.state().current.clone())
    }

    fn list_spreadsheets(&self) -> Result<Vec<Spreadsheet>> {
        let state = self.state();
        let me = state.current.id;
        state
            .spreadsheets
            .iter()
            .filter(|(_, s)| s.owner == me || s.shared_with.contains(&me))
            .map(|(id, _)| state.record(*id))
            .collect()
    }

    fn get_spreadsheet(&self, id: SpreadsheetId) -> Result<Spreadsheet> {
        self.state().record(id)
    }

    fn create_spreadsheet(&self, name: &str) -> Result<Spreadsheet> {
        let name = require_name(name, "Spreadsheet")?;
        let mut state = self.state();
        let id = state.allocate_id();
        let owner = state.current.id;
        state.spreadsheets.insert(
            id,
            StoredSpreadsheet {
                name,
                owner,
                shared_with: Vec::new(),
            },
        );
        state.insert_sheet(id, "Sheet1");
        state.record(id)
    }

    fn rename_spreadsheet(&self, id: SpreadsheetId, name: &str) -> Result<Spreadsheet> {
        let name = require_name(name, "Spreadsheet")?;
        let mut state = self.state();
        state
            .spreadsheets
            .get_mut(&id)
            .ok_or_else(|| GridshareError::NotFound(format!("spreadsheet {id}")))?
            .name = name;
        state.record(id)
    }

    fn delete_spreadsheet(&self, id: SpreadsheetId) -> Result<()> {
        let mut state = self.state();
        state.owned_by_current(id, "delete a spreadsheet")?;
        state.spreadsheets.remove(&id);
        state.sheets.retain(|_, s| s.spreadsheet_id != id);
        Ok(())
    }

    fn share(&self, id: SpreadsheetId, username: &str) -> Result<()> {
        let mut state = self.state();
        state.owned_by_current(id, "share a spreadsheet")?;
        let user_id = state.user_named(username)?;
        if user_id == state.current.id {
            return Err(GridshareError::Validation(
                "Cannot share a spreadsheet with yourself".to_string(),
            ));
        }
        if let Some(stored) = state.spreadsheets.get_mut(&id)
            && !stored.shared_with.contains(&user_id)
        {
            stored.shared_with.push(user_id);
        }
        Ok(())
    }

    fn unshare(&self, id: SpreadsheetId, username: &str) -> Result<()> {
        let mut state = self.state();
        state.owned_by_current(id, "revoke access")?;
        let user_id = state.user_named(username)?;
        if let Some(stored) = state.spreadsheets.get_mut(&id) {
            stored.shared_with.retain(|u| *u != user_id);
        }
        Ok(())
    }

    fn shared_users(&self, id: SpreadsheetId) -> Result<Vec<User>> {
        let state = self.state();
        Ok(state
            .spreadsheet(id)?
            .shared_with
            .iter()
            .filter_map(|uid| state.users.get(uid).cloned())
            .collect())
    }

    fn list_sheets(&self, spreadsheet_id: SpreadsheetId) -> Result<Vec<Sheet>> {
        let state = self.state();
        state.spreadsheet(spreadsheet_id)?;
        Ok(state.sheets_of(spreadsheet_id))
    }

    fn add_sheet(&self, spreadsheet_id: SpreadsheetId, name: &str) -> Result<Sheet> {
        let name = require_name(name, "Sheet")?;
        let mut state = self.state();
        state.spreadsheet(spreadsheet_id)?;
        Ok(state.insert_sheet(spreadsheet_id, &name))
    }

    fn rename_sheet(&self, sheet_id: SheetId, name: &str) -> Result<Sheet> {
        let name = require_name(name, "Sheet")?;
        let mut state = self.state();
        let sheet = state.sheet_mut(sheet_id)?;
        sheet.sheet.name = name;
        Ok(sheet.sheet.clone())
    }

    fn delete_sheet(&self, sheet_id: SheetId) -> Result<()> {
        let mut state = self.state();
        let spreadsheet_id = state.sheet_mut(sheet_id)?.spreadsheet_id;
        if state.sheets_of(spreadsheet_id).len() <= 1 {
            return Err(GridshareError::Validation(
                "Cannot delete the last sheet".to_string(),
            ));
        }
        state.sheets.remove(&sheet_id);
        Ok(())
    }

    fn list_cells(&self, sheet_id: SheetId) -> Result<Vec<Cell>> {
        let mut state = self.state();
        let mut cells: Vec<Cell> = state.sheet_mut(sheet_id)?.cells.values().cloned().collect();
        cells.sort_by_key(Cell::cell_ref);
        Ok(cells)
    }

    fn update_cell(&self, sheet_id: SheetId, at: CellRef, patch: &CellPatch) -> Result<Cell> {
        self.state().write_cell(sheet_id, at, patch)
    }

    fn batch_update(&self, sheet_id: SheetId, writes: &[CellWrite]) -> Result<Vec<Cell>> {
        let mut state = self.state();
        state
            .batches
            .push(serde_json::json!({ "sheet_id": sheet_id, "updates": writes }));
        writes
            .iter()
            .map(|w| state.write_cell(sheet_id, w.cell_ref(), &w.patch))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridshare_model::model::CellContent;

    fn backend() -> MemoryBackend {
        MemoryBackend::new(User {
            id: 1,
            username: "alice".into(),
        })
    }

    #[test]
    fn test_create_spreadsheet_has_first_sheet() {
        let backend = backend();
        let sheet = backend.create_spreadsheet("Budget").unwrap();
        assert_eq!(sheet.sheets.len(), 1);
        assert_eq!(sheet.sheets[0].name, "Sheet1");
        assert_eq!(sheet.owner_username.as_deref(), Some("alice"));
        assert!(backend.create_spreadsheet("  ").is_err());
    }

    #[test]
    fn test_update_cell_bumps_version_and_keeps_formula_unevaluated() {
        let backend = backend();
        let sheet_id = backend.create_spreadsheet("S").unwrap().sheets[0].id;
        let at = CellRef::new(1, 1);

        let first = backend
            .update_cell(sheet_id, at, &CellPatch::from_content(&CellContent::Literal("4".into()), None))
            .unwrap();
        assert_eq!(first.version, 1);

        let second = backend
            .update_cell(sheet_id, at, &CellPatch::from_content(&CellContent::Formula("=B1".into()), None))
            .unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.formula, "=B1");
        assert!(second.value.is_empty());
        assert_eq!(backend.write_count(), 2);
    }

    #[test]
    fn test_share_rules() {
        let backend = backend();
        let id = backend.create_spreadsheet("S").unwrap().id;
        backend.register_user("bob");

        backend.share(id, "bob").unwrap();
        backend.share(id, "bob").unwrap();
        assert_eq!(backend.shared_users(id).unwrap().len(), 1);
        assert_eq!(
            backend.get_spreadsheet(id).unwrap().shared_with_usernames,
            vec!["bob".to_string()]
        );

        assert!(matches!(
            backend.share(id, "nobody"),
            Err(GridshareError::Validation(_))
        ));
        assert!(matches!(
            backend.share(id, "alice"),
            Err(GridshareError::Validation(_))
        ));

        backend.unshare(id, "bob").unwrap();
        assert!(backend.shared_users(id).unwrap().is_empty());
    }

    #[test]
    fn test_last_sheet_cannot_be_deleted() {
        let backend = backend();
        let spreadsheet = backend.create_spreadsheet("S").unwrap();
        let first = spreadsheet.sheets[0].id;
        assert!(backend.delete_sheet(first).is_err());

        let second = backend.add_sheet(spreadsheet.id, "Sheet2").unwrap();
        assert_eq!(second.order, 1);
        backend.delete_sheet(first).unwrap();
        assert_eq!(backend.list_sheets(spreadsheet.id).unwrap(), vec![second]);
    }

    #[test]
    fn test_batch_update_records_body_and_applies_in_order() {
        let backend = backend();
        let sheet_id = backend.create_spreadsheet("S").unwrap().sheets[0].id;
        let at = CellRef::new(2, 1);
        backend
            .update_cell(sheet_id, at, &CellPatch::from_content(&CellContent::Formula("=A1".into()), None))
            .unwrap();

        let writes = vec![
            CellWrite::new(at, CellPatch::from_content(&CellContent::Literal("5".into()), None)),
            CellWrite::new(
                CellRef::new(3, 1),
                CellPatch {
                    value: Some("lost".into()),
                    formula: Some(String::new()),
                    style: None,
                },
            ),
        ];
        let stored = backend.batch_update(sheet_id, &writes).unwrap();
        assert_eq!(stored[0].value, "5");
        assert!(stored[0].formula.is_empty());
        assert!(stored[1].value.is_empty());

        let bodies = backend.batch_bodies();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["sheet_id"], sheet_id);
        assert_eq!(bodies[0]["updates"][0]["row"], 2);
        assert_eq!(bodies[0]["updates"][0]["value"], "5");
        assert!(bodies[0]["updates"][0].get("formula").is_none());
    }

    #[test]
    fn test_failing_writes() {
        let backend = backend();
        let sheet_id = backend.create_spreadsheet("S").unwrap().sheets[0].id;
        backend.set_failing(true);
        let patch = CellPatch::from_content(&CellContent::Literal("1".into()), None);
        assert!(matches!(
            backend.update_cell(sheet_id, CellRef::new(1, 1), &patch),
            Err(GridshareError::Network(_))
        ));
        assert_eq!(backend.write_count(), 0);
    }
}
