//! Spreadsheet data model.
//!
//! - [`Cell`], [`CellStyle`], [`CellContent`], [`CellPatch`] - Cell records and edits
//! - [`CellRef`], [`QualifiedRef`] - A1 reference grammar (one-based)
//! - [`CellRange`] - Normalized rectangular ranges
//! - [`extract_dependencies`] - Formula reference scanning
//! - [`Spreadsheet`], [`Sheet`], [`User`] - Server-side records

mod cell;
mod cell_ref;
mod deps;
mod range;
mod workbook;

pub use cell::{Cell, CellContent, CellPatch, CellStyle, ERROR_PREFIX};
pub use cell_ref::{
    CellRef, MAX_COLS, MAX_ROWS, QualifiedRef, quote_sheet_name, unquote_sheet_name,
};
pub use deps::extract_dependencies;
pub use range::CellRange;
pub use workbook::{Sheet, SheetId, Spreadsheet, SpreadsheetId, User, UserId};
