//! FILENAME: engine/src/value.rs
//! PURPOSE: The value domain every cell and every expression evaluates to.
//! CONTEXT: `CellValue` is a tagged union (`Empty | Number | String | Bool |
//! Error`) with the coercion and comparison rules the evaluator applies at
//! operator boundaries. Kept deliberately free of any reference to the
//! dependency graph or workbook — this is the leaf value model everything
//! else builds on.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// The six canonical cell-error kinds. A local type rather than a re-export
/// of `parser::ast::ErrorKind` so this crate's public (de)serializable value
/// model doesn't require the parser crate to carry serde as a dependency;
/// `From` conversions below keep the two in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellErrorKind {
    ParseError,
    CircularReference,
    BadReference,
    BadName,
    TypeError,
    DivideByZero,
}

impl From<parser::ast::ErrorKind> for CellErrorKind {
    fn from(k: parser::ast::ErrorKind) -> Self {
        match k {
            parser::ast::ErrorKind::ParseError => CellErrorKind::ParseError,
            parser::ast::ErrorKind::CircularReference => CellErrorKind::CircularReference,
            parser::ast::ErrorKind::BadReference => CellErrorKind::BadReference,
            parser::ast::ErrorKind::BadName => CellErrorKind::BadName,
            parser::ast::ErrorKind::TypeError => CellErrorKind::TypeError,
            parser::ast::ErrorKind::DivideByZero => CellErrorKind::DivideByZero,
        }
    }
}

impl From<CellErrorKind> for parser::ast::ErrorKind {
    fn from(k: CellErrorKind) -> Self {
        match k {
            CellErrorKind::ParseError => parser::ast::ErrorKind::ParseError,
            CellErrorKind::CircularReference => parser::ast::ErrorKind::CircularReference,
            CellErrorKind::BadReference => parser::ast::ErrorKind::BadReference,
            CellErrorKind::BadName => parser::ast::ErrorKind::BadName,
            CellErrorKind::TypeError => parser::ast::ErrorKind::TypeError,
            CellErrorKind::DivideByZero => parser::ast::ErrorKind::DivideByZero,
        }
    }
}

impl fmt::Display for CellErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ast_kind: parser::ast::ErrorKind = (*self).into();
        write!(f, "{}", ast_kind)
    }
}

/// The value domain of every cell and every evaluated expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Number(Decimal),
    String(String),
    Bool(bool),
    /// `detail` carries an optional human-readable note (e.g. the name
    /// `INDIRECT` failed to resolve); it is never part of equality for
    /// notification purposes — see `recompute::values_equal`.
    Error(CellErrorKind, Option<String>),
}

impl CellValue {
    pub fn error(kind: CellErrorKind) -> Self {
        CellValue::Error(kind, None)
    }

    pub fn error_with_detail(kind: CellErrorKind, detail: impl Into<String>) -> Self {
        CellValue::Error(kind, Some(detail.into()))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CellValue::Error(..))
    }

    pub fn error_kind(&self) -> Option<CellErrorKind> {
        match self {
            CellValue::Error(k, _) => Some(*k),
            _ => None,
        }
    }

    /// `to_number(v)`: `Empty -> 0`, `Bool -> 0|1`, `String ->` parse
    /// trimmed decimal or `TypeError`, `Number ->` self, `Error ->` self.
    pub fn to_number(&self) -> CellValue {
        match self {
            CellValue::Empty => CellValue::Number(Decimal::ZERO),
            CellValue::Bool(b) => CellValue::Number(if *b { Decimal::ONE } else { Decimal::ZERO }),
            CellValue::Number(_) => self.clone(),
            CellValue::String(s) => match Decimal::from_str(s.trim()) {
                Ok(d) => CellValue::Number(canonicalize(d)),
                Err(_) => CellValue::error(CellErrorKind::TypeError),
            },
            CellValue::Error(..) => self.clone(),
        }
    }

    /// `to_string(v)`: `Empty -> ""`, `Bool -> "TRUE"|"FALSE"`, `Number ->`
    /// canonical decimal text, `String ->` self, `Error ->` self.
    pub fn to_text(&self) -> CellValue {
        match self {
            CellValue::Empty => CellValue::String(String::new()),
            CellValue::Bool(b) => {
                CellValue::String(if *b { "TRUE".to_string() } else { "FALSE".to_string() })
            }
            CellValue::Number(n) => CellValue::String(canonicalize(*n).to_string()),
            CellValue::String(_) => self.clone(),
            CellValue::Error(..) => self.clone(),
        }
    }

    /// `to_bool(v)`: `Empty -> false`, `Number ->` nonzero, `String ->`
    /// case-insensitive `"true"|"false"` else `TypeError`, `Bool ->` self.
    pub fn to_bool(&self) -> CellValue {
        match self {
            CellValue::Empty => CellValue::Bool(false),
            CellValue::Number(n) => CellValue::Bool(!n.is_zero()),
            CellValue::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" => CellValue::Bool(true),
                "false" => CellValue::Bool(false),
                _ => CellValue::error(CellErrorKind::TypeError),
            },
            CellValue::Bool(_) => self.clone(),
            CellValue::Error(..) => self.clone(),
        }
    }

    /// Fixed kind rank used for cross-kind comparison: `Number < String <
    /// Bool`. `Empty` and `Error` are handled separately by the caller.
    fn kind_rank(&self) -> Option<u8> {
        match self {
            CellValue::Number(_) => Some(0),
            CellValue::String(_) => Some(1),
            CellValue::Bool(_) => Some(2),
            CellValue::Empty | CellValue::Error(..) => None,
        }
    }

    /// `compare(a, b)` per spec's comparison rules. Returns the ordering of
    /// `a` relative to `b`, or the error kind of whichever operand is an
    /// `Error` (the left operand wins if both are).
    pub fn compare(a: &CellValue, b: &CellValue) -> Result<Ordering, CellErrorKind> {
        if let CellValue::Error(k, _) = a {
            return Err(*k);
        }
        if let CellValue::Error(k, _) = b {
            return Err(*k);
        }

        if matches!(a, CellValue::Empty) && matches!(b, CellValue::Empty) {
            return Ok(Ordering::Equal);
        }

        // One side Empty: coerce it to the other side's kind-appropriate zero.
        if matches!(a, CellValue::Empty) {
            let zero = zero_of_kind(b);
            return Self::compare(&zero, b);
        }
        if matches!(b, CellValue::Empty) {
            let zero = zero_of_kind(a);
            return Self::compare(a, &zero);
        }

        match (a.kind_rank(), b.kind_rank()) {
            (Some(ra), Some(rb)) if ra == rb => Ok(compare_same_kind(a, b)),
            (Some(ra), Some(rb)) => Ok(ra.cmp(&rb)),
            _ => unreachable!("Empty/Error already handled above"),
        }
    }
}

fn zero_of_kind(like: &CellValue) -> CellValue {
    match like {
        CellValue::Number(_) => CellValue::Number(Decimal::ZERO),
        CellValue::String(_) => CellValue::String(String::new()),
        CellValue::Bool(_) => CellValue::Bool(false),
        CellValue::Empty | CellValue::Error(..) => CellValue::Empty,
    }
}

fn compare_same_kind(a: &CellValue, b: &CellValue) -> Ordering {
    match (a, b) {
        (CellValue::Number(x), CellValue::Number(y)) => x.cmp(y),
        (CellValue::String(x), CellValue::String(y)) => {
            x.to_lowercase().cmp(&y.to_lowercase())
        }
        (CellValue::Bool(x), CellValue::Bool(y)) => x.cmp(y),
        _ => unreachable!("compare_same_kind called with mismatched kinds"),
    }
}

/// Strips trailing zeros after `.` and a trailing lone `.`, matching the
/// original `CellValue.strip_trailing_zeros` rule exactly: normalize the
/// scale down to its minimal representation.
pub fn canonicalize(d: Decimal) -> Decimal {
    d.normalize()
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Empty
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            CellValue::String(s) => write!(f, "{}", s),
            _ => unreachable!("to_text always returns CellValue::String for non-error input"),
        }
    }
}
