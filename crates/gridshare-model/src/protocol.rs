//! Real-time channel wire format.
//!
//! One WebSocket per open spreadsheet, JSON text frames shaped
//! `{"type": "...", ...fields}`.
//!
//! | direction | type | fields |
//! |---|---|---|
//! | out | `cell_update` | sheet_id, row, column, value, formula, style, version? |
//! | out | `cursor_move` | row, column |
//! | in | `cell_update` | user_id?, sheet_id, row, column, value, formula, style, version? |
//! | in | `cursor_update` | user_id, username, row, column |
//! | in | `user_joined` | user_id, username |
//! | in | `user_left` | user_id, username? |

use serde::{Deserialize, Serialize};

use crate::model::{Cell, CellRef, CellStyle, SheetId, User, UserId};

// =============================================================================
// Client → Server
// =============================================================================

/// Messages sent from this client to the spreadsheet room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CellUpdate(CellUpdateOut),
    CursorMove(CursorMove),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellUpdateOut {
    pub sheet_id: SheetId,
    pub row: usize,
    pub column: usize,
    pub value: String,
    pub formula: String,
    pub style: CellStyle,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub version: u64,
}

impl CellUpdateOut {
    pub fn from_cell(sheet_id: SheetId, cell: &Cell) -> Self {
        Self {
            sheet_id,
            row: cell.row,
            column: cell.column,
            value: cell.value.clone(),
            formula: cell.formula.clone(),
            style: cell.style.clone(),
            version: cell.version,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorMove {
    pub row: usize,
    pub column: usize,
}

impl ClientMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Server → Client
// =============================================================================

/// Messages pushed by the server to everyone in the spreadsheet room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    CellUpdate(RemoteCellUpdate),
    CursorUpdate(CursorUpdate),
    UserJoined(UserJoined),
    UserLeft(UserLeft),
    /// Any `type` this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCellUpdate {
    /// Missing when the server already filters echoes itself.
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub sheet_id: SheetId,
    pub row: usize,
    pub column: usize,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub style: Option<CellStyle>,
    #[serde(default)]
    pub version: u64,
}

impl RemoteCellUpdate {
    pub fn cell_ref(&self) -> CellRef {
        CellRef::new(self.row, self.column)
    }

    pub fn to_cell(&self) -> Cell {
        Cell {
            row: self.row,
            column: self.column,
            value: self.value.clone().unwrap_or_default(),
            formula: self.formula.clone().unwrap_or_default(),
            style: self.style.clone().unwrap_or_default(),
            version: self.version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorUpdate {
    pub user_id: UserId,
    pub username: String,
    pub row: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserJoined {
    pub user_id: UserId,
    pub username: String,
}

impl UserJoined {
    pub fn user(&self) -> User {
        User {
            id: self.user_id,
            username: self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLeft {
    pub user_id: UserId,
    #[serde(default)]
    pub username: Option<String>,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}
