//! Cell reference parsing and formatting.
//!
//! Provides bidirectional conversion between spreadsheet-style cell references
//! (e.g., "A1", "B2", "Z100") and one-based row/column coordinates, plus the
//! sheet-qualified form `Sheet2!B7` used for cross-sheet formula references.
//!
//! # Examples
//!
//! ```
//! use gridshare_model::model::CellRef;
//!
//! let cell = CellRef::from_str("B3").unwrap();
//! assert_eq!(cell.column, 2); // 1-indexed
//! assert_eq!(cell.row, 3);
//! assert_eq!(cell.to_string(), "B3");
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

/// Number of rows in a sheet.
pub const MAX_ROWS: usize = 100;
/// Number of columns in a sheet (A..Z).
pub const MAX_COLS: usize = 26;

/// A reference to a cell by row and column (both 1-indexed).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub column: usize,
}

impl CellRef {
    pub fn new(row: usize, column: usize) -> CellRef {
        CellRef { row, column }
    }

    /// True if the reference lies inside the 100x26 grid.
    pub fn in_bounds(&self) -> bool {
        (1..=MAX_ROWS).contains(&self.row) && (1..=MAX_COLS).contains(&self.column)
    }

    /// Move by a row/column delta, clamping to the grid (no wraparound).
    pub fn offset_clamped(&self, d_row: isize, d_col: isize) -> CellRef {
        let row = (self.row as isize + d_row).clamp(1, MAX_ROWS as isize);
        let column = (self.column as isize + d_col).clamp(1, MAX_COLS as isize);
        CellRef::new(row as usize, column as usize)
    }

    /// Parse a cell reference from spreadsheet notation (e.g., "A1", "b2", "Z100").
    /// Returns None if the input is invalid or outside the grid.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(name: &str) -> Option<CellRef> {
        Self::parse_a1(name)
    }

    fn parse_a1(name: &str) -> Option<CellRef> {
        let caps = a1_re().captures(name)?;
        let letters = &caps["letters"];
        let numbers = &caps["numbers"];

        let column = Self::letters_to_col(letters)?;
        let row = numbers.parse::<usize>().ok()?;

        let cell = CellRef::new(row, column);
        cell.in_bounds().then_some(cell)
    }

    /// Convert spreadsheet letters to a 1-based column ("A" -> 1, "AA" -> 27).
    pub fn letters_to_col(letters: &str) -> Option<usize> {
        if letters.is_empty() {
            return None;
        }
        let mut acc = 0usize;
        for c in letters.to_ascii_uppercase().bytes() {
            if !c.is_ascii_uppercase() {
                return None;
            }
            let digit = (c - b'A') as usize + 1;
            acc = acc.checked_mul(26)?.checked_add(digit)?;
        }
        Some(acc)
    }

    /// Convert a 1-based column to spreadsheet letters (1 -> A, 26 -> Z, 27 -> AA).
    ///
    /// Bijective base-26: there is no zero digit. Column 0 has no letters.
    pub fn col_to_letters(column: usize) -> String {
        let mut result = String::new();
        let mut n = column as u128;
        while n > 0 {
            n -= 1;
            result.insert(0, (b'A' + (n % 26) as u8) as char);
            n /= 26;
        }
        result
    }
}

impl std::str::FromStr for CellRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_a1(s).ok_or_else(|| format!("Invalid cell reference: {}", s))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CellRef::col_to_letters(self.column), self.row)
    }
}

/// A reference with an optional sheet qualifier (`Sheet2!B7` or plain `B7`).
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct QualifiedRef {
    pub sheet: Option<String>,
    pub cell: CellRef,
}

impl QualifiedRef {
    pub fn bare(cell: CellRef) -> Self {
        Self { sheet: None, cell }
    }

    pub fn on_sheet(sheet: impl Into<String>, cell: CellRef) -> Self {
        Self {
            sheet: Some(sheet.into()),
            cell,
        }
    }

    /// Parse `[SheetName!]A1` or `'Sheet Name'!A1`. The sheet name is
    /// everything before the last `!`.
    pub fn parse(text: &str) -> Option<Self> {
        match text.rsplit_once('!') {
            Some((sheet, cell)) => {
                let sheet = unquote_sheet_name(sheet);
                if sheet.is_empty() {
                    return None;
                }
                Some(Self::on_sheet(sheet, CellRef::from_str(cell)?))
            }
            None => Some(Self::bare(CellRef::from_str(text)?)),
        }
    }
}

impl fmt::Display for QualifiedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sheet {
            Some(sheet) => write!(f, "{}!{}", quote_sheet_name(sheet), self.cell),
            None => write!(f, "{}", self.cell),
        }
    }
}

/// Sheet name as written in a formula. Names other than plain identifiers
/// are wrapped in single quotes, with inner quotes doubled.
pub fn quote_sheet_name(name: &str) -> Cow<'_, str> {
    let mut chars = name.chars();
    let plain = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("'{}'", name.replace('\'', "''")))
    }
}

/// Inverse of [`quote_sheet_name`]; unquoted names pass through.
pub fn unquote_sheet_name(text: &str) -> String {
    match text
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        Some(inner) => inner.replace("''", "'"),
        None => text.to_string(),
    }
}

fn a1_re() -> &'static Regex {
    static A1_RE: OnceLock<Regex> = OnceLock::new();
    A1_RE.get_or_init(|| {
        Regex::new(r"^(?<letters>[A-Za-z]+)(?<numbers>[0-9]+)$")
            .expect("A1 reference regex must compile")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_a1_overflow_returns_none() {
        let huge = format!("{}1", "Z".repeat(40));
        assert!(CellRef::from_str(&huge).is_none());
    }

    #[test]
    fn test_parse_rejects_out_of_grid() {
        assert!(CellRef::from_str("A101").is_none());
        assert!(CellRef::from_str("AA1").is_none());
        assert!(CellRef::from_str("A0").is_none());
        assert_eq!(CellRef::from_str("Z100"), Some(CellRef::new(100, 26)));
    }

    #[test]
    fn test_col_to_letters_handles_max_usize() {
        let letters = CellRef::col_to_letters(usize::MAX);
        assert!(!letters.is_empty());
        assert!(letters.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn test_offset_clamps_at_edges() {
        assert_eq!(CellRef::new(1, 1).offset_clamped(-1, -1), CellRef::new(1, 1));
        assert_eq!(
            CellRef::new(100, 26).offset_clamped(1, 1),
            CellRef::new(100, 26)
        );
        assert_eq!(CellRef::new(5, 5).offset_clamped(1, 0), CellRef::new(6, 5));
    }

    #[test]
    fn test_qualified_ref_parse_and_display() {
        let q = QualifiedRef::parse("Sheet2!B7").unwrap();
        assert_eq!(q.sheet.as_deref(), Some("Sheet2"));
        assert_eq!(q.cell, CellRef::new(7, 2));
        assert_eq!(q.to_string(), "Sheet2!B7");

        let bare = QualifiedRef::parse("c3").unwrap();
        assert_eq!(bare.sheet, None);
        assert_eq!(bare.to_string(), "C3");

        assert!(QualifiedRef::parse("!A1").is_none());
        assert!(QualifiedRef::parse("''!A1").is_none());
        assert!(QualifiedRef::parse("Sheet2!").is_none());
    }

    #[test]
    fn test_sheet_names_with_spaces_are_quoted() {
        let q = QualifiedRef::on_sheet("My Sheet", CellRef::new(1, 1));
        assert_eq!(q.to_string(), "'My Sheet'!A1");
        assert_eq!(QualifiedRef::parse("'My Sheet'!A1"), Some(q));

        let odd = QualifiedRef::on_sheet("Bob's!", CellRef::new(2, 3));
        assert_eq!(odd.to_string(), "'Bob''s!'!C2");
        assert_eq!(QualifiedRef::parse(&odd.to_string()), Some(odd));

        assert_eq!(quote_sheet_name("Sheet_2"), "Sheet_2");
        assert_eq!(quote_sheet_name("2024"), "'2024'");
    }
}
