//! Building formula text from cell clicks and toolbar templates.

use gridshare_model::model::{CellRange, CellRef, QualifiedRef, Sheet};

/// Reference to `cell` on `clicked_sheet` as written from a formula that is
/// being edited on `origin_sheet`: qualified only when the sheets differ.
pub fn reference_for(cell: CellRef, clicked_sheet: &Sheet, origin_sheet: &Sheet) -> QualifiedRef {
    if clicked_sheet.id == origin_sheet.id {
        QualifiedRef::bare(cell)
    } else {
        QualifiedRef::on_sheet(clicked_sheet.name.clone(), cell)
    }
}

/// Add a clicked reference to the draft.
///
/// A draft that is already a formula gets the reference appended; anything
/// else is replaced by a formula holding just the reference.
pub fn insert_reference(draft: &str, reference: &QualifiedRef) -> String {
    if draft.starts_with('=') {
        format!("{draft}{reference}")
    } else {
        format!("={reference}")
    }
}

/// Formula shortcuts offered by the toolbar / `:formula` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormulaTemplate {
    Sum,
    Average,
    Max,
    Min,
    Count,
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl FormulaTemplate {
    pub const ALL: [FormulaTemplate; 9] = [
        FormulaTemplate::Sum,
        FormulaTemplate::Average,
        FormulaTemplate::Max,
        FormulaTemplate::Min,
        FormulaTemplate::Count,
        FormulaTemplate::Add,
        FormulaTemplate::Subtract,
        FormulaTemplate::Multiply,
        FormulaTemplate::Divide,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FormulaTemplate::Sum => "SUM",
            FormulaTemplate::Average => "AVERAGE",
            FormulaTemplate::Max => "MAX",
            FormulaTemplate::Min => "MIN",
            FormulaTemplate::Count => "COUNT",
            FormulaTemplate::Add => "ADD",
            FormulaTemplate::Subtract => "SUB",
            FormulaTemplate::Multiply => "MUL",
            FormulaTemplate::Divide => "DIV",
        }
    }

    pub fn from_name(name: &str) -> Option<FormulaTemplate> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name.trim()))
    }

    /// The template as shown in menus, on its sample cells.
    pub fn sample(&self) -> String {
        self.fill(
            CellRange::new(CellRef::new(1, 1), CellRef::new(10, 1)),
            CellRef::new(1, 1),
            CellRef::new(1, 2),
        )
    }

    /// Instantiate for the current selection.
    ///
    /// A multi-cell range is used as is (its corners for the binary
    /// operators). A single cell stands for the whole range and the left
    /// operand; the right operand is the neighbour to its right.
    pub fn apply(&self, selection: CellRange) -> String {
        if selection.is_single() {
            let cell = selection.start;
            self.fill(selection, cell, cell.offset_clamped(0, 1))
        } else {
            self.fill(selection, selection.start, selection.end)
        }
    }

    fn fill(&self, range: CellRange, left: CellRef, right: CellRef) -> String {
        let range = if range.is_single() {
            range.start.to_string()
        } else {
            format!("{}:{}", range.start, range.end)
        };
        match self {
            FormulaTemplate::Sum => format!("=SUM({range})"),
            FormulaTemplate::Average => format!("=AVERAGE({range})"),
            FormulaTemplate::Max => format!("=MAX({range})"),
            FormulaTemplate::Min => format!("=MIN({range})"),
            FormulaTemplate::Count => format!("=COUNT({range})"),
            FormulaTemplate::Add => format!("={left}+{right}"),
            FormulaTemplate::Subtract => format!("={left}-{right}"),
            FormulaTemplate::Multiply => format!("={left}*{right}"),
            FormulaTemplate::Divide => format!("={left}/{right}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridshare_model::model::extract_dependencies;

    fn sheet(id: i64, name: &str) -> Sheet {
        Sheet {
            id,
            name: name.to_string(),
            order: 0,
        }
    }

    #[test]
    fn test_reference_qualified_only_across_sheets() {
        let a = sheet(1, "Sheet1");
        let b = sheet(2, "Costs");
        let cell = CellRef::new(7, 2);
        assert_eq!(reference_for(cell, &a, &a).to_string(), "B7");
        assert_eq!(reference_for(cell, &b, &a).to_string(), "Costs!B7");
    }

    #[test]
    fn test_spaced_sheet_reference_is_quoted_and_tracked() {
        let origin = sheet(1, "Sheet1");
        let spaced = sheet(2, "Q1 Costs");
        let reference = reference_for(CellRef::new(2, 2), &spaced, &origin);
        let formula = insert_reference("=", &reference);
        assert_eq!(formula, "='Q1 Costs'!B2");
        assert_eq!(
            extract_dependencies(&formula, "Q1 Costs"),
            vec![CellRef::new(2, 2)]
        );
        assert!(extract_dependencies(&formula, "Costs").is_empty());
    }

    #[test]
    fn test_insert_reference_equals_rule() {
        let r = QualifiedRef::bare(CellRef::new(1, 1));
        assert_eq!(insert_reference("=SUM(", &r), "=SUM(A1");
        assert_eq!(insert_reference("=", &r), "=A1");
        assert_eq!(insert_reference("hello", &r), "=A1");
        assert_eq!(insert_reference("", &r), "=A1");
    }

    #[test]
    fn test_templates_on_range_and_single_cell() {
        let range = CellRange::parse("B2:C5").unwrap();
        assert_eq!(FormulaTemplate::Sum.apply(range), "=SUM(B2:C5)");
        assert_eq!(FormulaTemplate::Divide.apply(range), "=B2/C5");

        let single = CellRange::single(CellRef::new(3, 4));
        assert_eq!(FormulaTemplate::Average.apply(single), "=AVERAGE(D3)");
        assert_eq!(FormulaTemplate::Add.apply(single), "=D3+E3");

        let last_column = CellRange::single(CellRef::new(1, 26));
        assert_eq!(FormulaTemplate::Multiply.apply(last_column), "=Z1*Z1");
    }

    #[test]
    fn test_template_names() {
        assert_eq!(FormulaTemplate::Sum.sample(), "=SUM(A1:A10)");
        assert_eq!(FormulaTemplate::Subtract.sample(), "=A1-B1");
        assert_eq!(FormulaTemplate::from_name("count"), Some(FormulaTemplate::Count));
        assert_eq!(FormulaTemplate::from_name("pow"), None);
    }
}
