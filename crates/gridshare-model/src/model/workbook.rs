//! Spreadsheet, sheet and user records as returned by the server.

use serde::{Deserialize, Serialize};

pub type SpreadsheetId = i64;
pub type SheetId = i64;
pub type UserId = i64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    pub id: SheetId,
    pub name: String,
    #[serde(default)]
    pub order: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spreadsheet {
    pub id: SpreadsheetId,
    pub name: String,
    #[serde(default)]
    pub sheets: Vec<Sheet>,
    #[serde(default)]
    pub owner_username: Option<String>,
    #[serde(default)]
    pub shared_with_usernames: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}
