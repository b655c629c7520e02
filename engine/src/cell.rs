//! FILENAME: engine/src/cell.rs
//! PURPOSE: The per-location record a `Sheet` stores: raw user input, the
//! cell's current computed value, its parsed formula (if any), and the
//! bookkeeping flags the recomputation engine needs.

use crate::value::CellValue;
use parser::ast::Expression;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A single spreadsheet cell.
///
/// `contents` is the trimmed user input (`""` is stored as `None`).
/// `parsed`/`parse_failed` are populated only when `contents` begins with
/// `=`; a non-formula cell always has `parsed: None, parse_failed: false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cell {
    pub contents: Option<String>,
    pub value: CellValue,
    #[serde(skip)]
    pub parsed: Option<Expression>,
    pub parse_failed: bool,
    /// Set by the recomputation engine's Tarjan pass; true iff this cell is
    /// a member of a dependency-graph SCC of size > 1, or a singleton with
    /// a self-loop.
    pub in_cycle: bool,
}

impl Cell {
    pub fn new() -> Self {
        Cell {
            contents: None,
            value: CellValue::Empty,
            parsed: None,
            parse_failed: false,
            in_cycle: false,
        }
    }

    /// True for a cell with no content and no incoming-edge-only existence
    /// reason — used by `Sheet` to decide whether a vertex can be dropped.
    pub fn is_blank(&self) -> bool {
        self.contents.is_none() && matches!(self.value, CellValue::Empty) && !self.in_cycle
    }

    pub fn is_formula(&self) -> bool {
        self.contents
            .as_deref()
            .map(|s| s.starts_with('='))
            .unwrap_or(false)
    }
}

/// Applies spec.md §6's content-parsing priority to raw user input, setting
/// `contents`/`value`/`parsed`/`parse_failed` on `cell`. Does not touch
/// `in_cycle` — that is the recomputation engine's concern.
///
/// `=`-formulas are parsed but not evaluated here: `cell.value` is left
/// untouched for the caller (`recompute::commit`) to fill in once the
/// dependency graph has been rewired and cycle detection has run.
pub fn set_contents(cell: &mut Cell, raw: Option<&str>) {
    let trimmed = raw.map(str::trim).filter(|s| !s.is_empty());
    match trimmed {
        None => {
            cell.contents = None;
            cell.parsed = None;
            cell.parse_failed = false;
            cell.value = CellValue::Empty;
        }
        Some(t) if t.starts_with('=') => {
            cell.contents = Some(t.to_string());
            match parser::parse(t) {
                Ok(ast) => {
                    cell.parsed = Some(ast);
                    cell.parse_failed = false;
                }
                Err(_) => {
                    cell.parsed = None;
                    cell.parse_failed = true;
                }
            }
        }
        Some(t) if t.starts_with('\'') => {
            let rest = &t[1..];
            cell.contents = Some(rest.to_string());
            cell.parsed = None;
            cell.parse_failed = false;
            cell.value = CellValue::String(rest.to_string());
        }
        Some(t) => {
            cell.contents = Some(t.to_string());
            cell.parsed = None;
            cell.parse_failed = false;
            cell.value = classify_literal(t);
        }
    }
}

fn classify_literal(t: &str) -> CellValue {
    if let Some(kind) = parser::ast::ErrorKind::parse(t) {
        return CellValue::error(kind.into());
    }
    if let Ok(d) = Decimal::from_str(t) {
        return CellValue::Number(crate::value::canonicalize(d));
    }
    match t.to_ascii_lowercase().as_str() {
        "true" => CellValue::Bool(true),
        "false" => CellValue::Bool(false),
        _ => CellValue::String(t.to_string()),
    }
}
