//! Persistence collaborator.
//!
//! The server owns storage, sharing and formula evaluation. The client only
//! needs the operations below; [`HttpBackend`] talks to the REST API and
//! [`MemoryBackend`] keeps everything in process.

mod http;
mod memory;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use gridshare_model::model::{
    Cell, CellPatch, CellRef, Sheet, SheetId, Spreadsheet, SpreadsheetId, User,
};

/// One entry of a batch update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CellWrite {
    pub row: usize,
    pub column: usize,
    #[serde(flatten)]
    pub patch: CellPatch,
}

impl CellWrite {
    pub fn new(at: CellRef, patch: CellPatch) -> Self {
        Self {
            row: at.row,
            column: at.column,
            patch,
        }
    }

    pub fn cell_ref(&self) -> CellRef {
        CellRef::new(self.row, self.column)
    }
}

pub trait Backend {
    fn current_user(&self) -> Result<User>;

    fn list_spreadsheets(&self) -> Result<Vec<Spreadsheet>>;
    fn get_spreadsheet(&self, id: SpreadsheetId) -> Result<Spreadsheet>;
    fn create_spreadsheet(&self, name: &str) -> Result<Spreadsheet>;
    fn rename_spreadsheet(&self, id: SpreadsheetId, name: &str) -> Result<Spreadsheet>;
    fn delete_spreadsheet(&self, id: SpreadsheetId) -> Result<()>;

    fn share(&self, id: SpreadsheetId, username: &str) -> Result<()>;
    fn unshare(&self, id: SpreadsheetId, username: &str) -> Result<()>;
    fn shared_users(&self, id: SpreadsheetId) -> Result<Vec<User>>;

    /// Sheets of a spreadsheet, ordered by `order`.
    fn list_sheets(&self, spreadsheet_id: SpreadsheetId) -> Result<Vec<Sheet>>;
    fn add_sheet(&self, spreadsheet_id: SpreadsheetId, name: &str) -> Result<Sheet>;
    fn rename_sheet(&self, sheet_id: SheetId, name: &str) -> Result<Sheet>;
    fn delete_sheet(&self, sheet_id: SheetId) -> Result<()>;

    fn list_cells(&self, sheet_id: SheetId) -> Result<Vec<Cell>>;

    /// Create or update one cell and return the stored (evaluated) cell.
    fn update_cell(&self, sheet_id: SheetId, at: CellRef, patch: &CellPatch) -> Result<Cell>;

    /// Apply several writes. Backends without a batch endpoint fall back to
    /// one request per cell, stopping at the first failure.
    fn batch_update(&self, sheet_id: SheetId, writes: &[CellWrite]) -> Result<Vec<Cell>> {
        writes
            .iter()
            .map(|w| self.update_cell(sheet_id, w.cell_ref(), &w.patch))
            .collect()
    }
}

/// Shared backends, so a host can keep a handle next to the session.
impl<B: Backend + ?Sized> Backend for Arc<B> {
    fn current_user(&self) -> Result<User> {
        (**self).current_user()
    }
    fn list_spreadsheets(&self) -> Result<Vec<Spreadsheet>> {
        (**self).list_spreadsheets()
    }
    fn get_spreadsheet(&self, id: SpreadsheetId) -> Result<Spreadsheet> {
        (**self).get_spreadsheet(id)
    }
    fn create_spreadsheet(&self, name: &str) -> Result<Spreadsheet> {
        (**self).create_spreadsheet(name)
    }
    fn rename_spreadsheet(&self, id: SpreadsheetId, name: &str) -> Result<Spreadsheet> {
        (**self).rename_spreadsheet(id, name)
    }
    fn delete_spreadsheet(&self, id: SpreadsheetId) -> Result<()> {
        (**self).delete_spreadsheet(id)
    }
    fn share(&self, id: SpreadsheetId, username: &str) -> Result<()> {
        (**self).share(id, username)
    }
    fn unshare(&self, id: SpreadsheetId, username: &str) -> Result<()> {
        (**self).unshare(id, username)
    }
    fn shared_users(&self, id: SpreadsheetId) -> Result<Vec<User>> {
        (**self).shared_users(id)
    }
    fn list_sheets(&self, spreadsheet_id: SpreadsheetId) -> Result<Vec<Sheet>> {
        (**self).list_sheets(spreadsheet_id)
    }
    fn add_sheet(&self, spreadsheet_id: SpreadsheetId, name: &str) -> Result<Sheet> {
        (**self).add_sheet(spreadsheet_id, name)
    }
    fn rename_sheet(&self, sheet_id: SheetId, name: &str) -> Result<Sheet> {
        (**self).rename_sheet(sheet_id, name)
    }
    fn delete_sheet(&self, sheet_id: SheetId) -> Result<()> {
        (**self).delete_sheet(sheet_id)
    }
    fn list_cells(&self, sheet_id: SheetId) -> Result<Vec<Cell>> {
        (**self).list_cells(sheet_id)
    }
    fn update_cell(&self, sheet_id: SheetId, at: CellRef, patch: &CellPatch) -> Result<Cell> {
        (**self).update_cell(sheet_id, at, patch)
    }
    fn batch_update(&self, sheet_id: SheetId, writes: &[CellWrite]) -> Result<Vec<Cell>> {
        (**self).batch_update(sheet_id, writes)
    }
}
