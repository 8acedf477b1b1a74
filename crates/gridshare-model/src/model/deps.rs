//! Dependency extraction from formula strings.
//!
//! Parses formula text to find the cells on one sheet that a formula reads
//! (e.g., `A1`, `B2:C5`, `Sheet2!D4`). The client has no evaluation engine;
//! this is only used to decide whether a literal edit can change any visible
//! formula result.
//!
//! Handles:
//! - Simple cell references: `A1`, `B2`
//! - Range references: `SUM(A1:B5)`
//! - Sheet-qualified references (kept only when they name the given sheet)
//! - Ignores references inside string literals

use regex::Regex;
use std::sync::OnceLock;

use super::cell_ref::{CellRef, unquote_sheet_name};
use super::range::CellRange;

/// Extract the references a formula makes to `sheet_name`.
///
/// Unqualified references belong to the sheet holding the formula, which
/// callers pass as `sheet_name`.
pub fn extract_dependencies(formula: &str, sheet_name: &str) -> Vec<CellRef> {
    let mut deps = Vec::new();
    let body = strip_string_literals(formula.strip_prefix('=').unwrap_or(formula));

    for caps in ref_re().captures_iter(&body) {
        if let Some(sheet) = caps.name("sheet") {
            let sheet = unquote_sheet_name(sheet.as_str().trim_end_matches('!'));
            if !sheet.eq_ignore_ascii_case(sheet_name) {
                continue;
            }
        }

        let Some(start) = CellRef::from_str(&caps["start"]) else {
            continue;
        };
        match caps.name("end").and_then(|m| CellRef::from_str(m.as_str())) {
            Some(end) => deps.extend(CellRange::new(start, end).cells()),
            None => deps.push(start),
        }
    }

    deps
}

fn ref_re() -> &'static Regex {
    static REF_RE: OnceLock<Regex> = OnceLock::new();
    REF_RE.get_or_init(|| {
        Regex::new(
            r"(?<sheet>(?:'(?:[^']|'')+'|[A-Za-z_][A-Za-z0-9_]*)!)?\b(?<start>[A-Za-z]+[0-9]+)\b(?::(?<end>[A-Za-z]+[0-9]+)\b)?",
        )
        .expect("dependency reference regex must compile")
    })
}

fn strip_string_literals(script: &str) -> String {
    let mut out = String::with_capacity(script.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in script.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(' ');
                continue;
            }
            if ch == '\\' {
                escaped = true;
                out.push(' ');
                continue;
            }
            if ch == '"' {
                in_string = false;
                out.push('"');
            } else {
                out.push(' ');
            }
        } else if ch == '"' {
            in_string = true;
            out.push('"');
        } else {
            out.push(ch);
        }
    }

    out
}
