//! Cell data structures.
//!
//! - [`Cell`] - A persisted cell: literal value and/or formula plus style
//! - [`CellStyle`] - Optional background/text colors
//! - [`CellContent`] - What a finished edit means once normalized
//! - [`CellPatch`] - Partial update sent to the persistence layer

use serde::{Deserialize, Serialize};

use super::cell_ref::CellRef;

/// Prefix the evaluation engine puts in `value` when a formula fails.
pub const ERROR_PREFIX: char = '#';

/// Visual style attached to a cell.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl CellStyle {
    pub fn is_empty(&self) -> bool {
        self.background_color.is_none() && self.color.is_none()
    }

    pub fn with_background(&self, color: &str) -> CellStyle {
        CellStyle {
            background_color: Some(color.to_string()),
            ..self.clone()
        }
    }

    pub fn with_text_color(&self, color: &str) -> CellStyle {
        CellStyle {
            color: Some(color.to_string()),
            ..self.clone()
        }
    }
}

/// A cell as exchanged with the server.
///
/// When `formula` is non-empty it is authoritative; `value` then holds the
/// last computed result (or an error marker starting with `#`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub row: usize,
    pub column: usize,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub value: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub formula: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub style: CellStyle,
    /// Monotonic per-cell version. Zero means the server does not version cells.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub version: u64,
}

impl Cell {
    pub fn empty(at: CellRef) -> Cell {
        Cell {
            row: at.row,
            column: at.column,
            ..Cell::default()
        }
    }

    pub fn cell_ref(&self) -> CellRef {
        CellRef::new(self.row, self.column)
    }

    pub fn is_formula(&self) -> bool {
        !self.formula.is_empty()
    }

    pub fn is_error(&self) -> bool {
        self.value.starts_with(ERROR_PREFIX)
    }

    /// Cell holds neither content nor style.
    pub fn is_blank(&self) -> bool {
        self.value.is_empty() && self.formula.is_empty() && self.style.is_empty()
    }

    /// Text used to seed an edit: the formula if any, else the value.
    pub fn input_text(&self) -> &str {
        if self.is_formula() {
            &self.formula
        } else {
            &self.value
        }
    }

    /// Apply normalized content, keeping style and position.
    pub fn apply_content(&mut self, content: &CellContent) {
        match content {
            CellContent::Clear => {
                self.value.clear();
                self.formula.clear();
            }
            CellContent::Formula(formula) => {
                self.formula = formula.clone();
                self.value.clear();
            }
            CellContent::Literal(value) => {
                self.value = value.clone();
                self.formula.clear();
            }
        }
    }
}

/// Normalized meaning of a finished edit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CellContent {
    /// Empty input or a lone `=`.
    Clear,
    /// Input starting with `=` (kept with its `=`).
    Formula(String),
    Literal(String),
}

impl CellContent {
    /// Parse user input:
    /// - Empty/whitespace or exactly `=` -> Clear
    /// - Starts with `=` -> Formula
    /// - Otherwise -> Literal (trimmed)
    pub fn from_input(input: &str) -> CellContent {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "=" {
            return CellContent::Clear;
        }
        if trimmed.starts_with('=') {
            return CellContent::Formula(trimmed.to_string());
        }
        CellContent::Literal(trimmed.to_string())
    }

    /// Content of an existing cell, used when re-sending it unchanged.
    pub fn of(cell: &Cell) -> CellContent {
        if cell.is_formula() {
            CellContent::Formula(cell.formula.clone())
        } else if cell.value.is_empty() {
            CellContent::Clear
        } else {
            CellContent::Literal(cell.value.clone())
        }
    }
}

/// Partial cell update for the persistence API. Absent fields are untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<CellStyle>,
}

impl CellPatch {
    /// Patch for a content change, with an optional style change.
    pub fn from_content(content: &CellContent, style: Option<CellStyle>) -> CellPatch {
        let (value, formula) = match content {
            CellContent::Clear => (Some(String::new()), Some(String::new())),
            CellContent::Formula(f) => (None, Some(f.clone())),
            CellContent::Literal(v) => (Some(v.clone()), None),
        };
        CellPatch {
            value,
            formula,
            style,
        }
    }

    /// Patch that recreates `cell` as it is (used by undo/redo replay).
    /// Carries `value` or `formula`, never both: a present `formula`
    /// replaces the value on the server, even when it is empty.
    pub fn restate(cell: &Cell) -> CellPatch {
        let (value, formula) = if cell.is_formula() {
            (None, Some(cell.formula.clone()))
        } else {
            (Some(cell.value.clone()), None)
        };
        CellPatch {
            value,
            formula,
            style: Some(cell.style.clone()),
        }
    }

    /// Apply to a cell the way the server's batch endpoint does: `value`
    /// replaces the content and drops the formula, then a present `formula`
    /// replaces both. The value of a formula is left for the evaluator.
    pub fn apply_to(&self, cell: &mut Cell) {
        if let Some(value) = &self.value {
            cell.value = value.clone();
            cell.formula.clear();
        }
        if let Some(formula) = &self.formula {
            cell.formula = formula.clone();
            cell.value.clear();
        }
        if let Some(style) = &self.style {
            cell.style = style.clone();
        }
    }
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn null_as_empty<'de, D>(de: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(de)?.unwrap_or_default())
}

fn null_as_default<'de, D>(de: D) -> Result<CellStyle, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<CellStyle>::deserialize(de)?.unwrap_or_default())
}
