//! Rectangular cell ranges.

use std::fmt;

use super::cell_ref::CellRef;

/// A rectangular range of cells, inclusive on both ends.
///
/// Always normalized: `start` is the top-left corner and `end` the
/// bottom-right, whatever order the corners were given in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start: CellRef,
    pub end: CellRef,
}

impl CellRange {
    /// Create a range from any two corners.
    pub fn new(a: CellRef, b: CellRef) -> Self {
        Self {
            start: CellRef::new(a.row.min(b.row), a.column.min(b.column)),
            end: CellRef::new(a.row.max(b.row), a.column.max(b.column)),
        }
    }

    pub fn single(cell: CellRef) -> Self {
        Self {
            start: cell,
            end: cell,
        }
    }

    pub fn contains(&self, cell: &CellRef) -> bool {
        cell.row >= self.start.row
            && cell.row <= self.end.row
            && cell.column >= self.start.column
            && cell.column <= self.end.column
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    pub fn cell_count(&self) -> usize {
        (self.end.row - self.start.row + 1) * (self.end.column - self.start.column + 1)
    }

    /// Iterate over all cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = CellRef> {
        let (r1, r2) = (self.start.row, self.end.row);
        let (c1, c2) = (self.start.column, self.end.column);
        (r1..=r2).flat_map(move |r| (c1..=c2).map(move |c| CellRef::new(r, c)))
    }

    /// Parse `A1:B5` (either corner order) or a single `A1`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        match text.split_once(':') {
            Some((a, b)) => Some(Self::new(CellRef::from_str(a)?, CellRef::from_str(b)?)),
            None => Some(Self::single(CellRef::from_str(text)?)),
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_corners() {
        let r = CellRange::new(CellRef::new(4, 2), CellRef::new(2, 1));
        assert_eq!(r.start, CellRef::new(2, 1));
        assert_eq!(r.end, CellRef::new(4, 2));
        assert_eq!(r.cell_count(), 6);
        assert_eq!(r.to_string(), "A2:B4");
    }

    #[test]
    fn test_cells_row_major() {
        let r = CellRange::parse("B2:A1").unwrap();
        let cells: Vec<_> = r.cells().collect();
        assert_eq!(
            cells,
            vec![
                CellRef::new(1, 1),
                CellRef::new(1, 2),
                CellRef::new(2, 1),
                CellRef::new(2, 2)
            ]
        );
    }

    #[test]
    fn test_parse_single_and_invalid() {
        assert_eq!(
            CellRange::parse(" c3 "),
            Some(CellRange::single(CellRef::new(3, 3)))
        );
        assert!(CellRange::parse("A1:").is_none());
        assert!(CellRange::parse("A1:A101").is_none());
    }
}
