//! FILENAME: engine/src/evaluator.rs
//! PURPOSE: Tree-walking evaluator over `parser::ast::Expression` (spec.md
//! §4.E): arithmetic/comparison/concatenation operators, cell/range
//! reference resolution, and function-call dispatch to `engine::functions`.
//! CONTEXT: Never recurses into another cell's *formula* — it only ever
//! reads another cell's already-computed `value`. `recompute::commit` is
//! what guarantees precedents are up to date before a cell is evaluated, so
//! there is no recursion-depth risk here regardless of workbook size or
//! cycles (a cycle is caught upstream by Tarjan and short-circuits to
//! `CircularReference` before this module ever runs).

use crate::address::{Address, Region};
use crate::graph::Vertex;
use crate::value::{CellErrorKind, CellValue};
use crate::workbook::Workbook;
use parser::ast::{BinaryOperator, CellRef, Expression, Literal, UnaryOperator};
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::cmp::Ordering;

/// Evaluation context threaded through a single cell's evaluation.
///
/// `indirect_targets` accumulates the vertices `INDIRECT` resolves during
/// this evaluation; `recompute::commit` reads it afterward and adds each as
/// an edge from `current` (spec.md §9: "requires such dynamic references to
/// participate in cycle detection by adding an edge at evaluation time").
/// This is distinct from the *static* edges `rewrite::extract_refs` derives
/// from the AST for invariant I2 — `INDIRECT`'s target is never literally
/// present in the AST, so it needs this separate channel.
pub struct EvalCtx<'a> {
    pub workbook: &'a Workbook,
    pub this_sheet: String,
    pub current: Vertex,
    pub indirect_targets: RefCell<Vec<Vertex>>,
}

impl<'a> EvalCtx<'a> {
    pub fn new(workbook: &'a Workbook, this_sheet: impl Into<String>, current: Vertex) -> Self {
        EvalCtx {
            workbook,
            this_sheet: this_sheet.into(),
            current,
            indirect_targets: RefCell::new(Vec::new()),
        }
    }
}

/// The evaluator's intermediate result: a scalar, or a rectangular matrix of
/// cell values for a range reference (spec.md §4.E "cell range"). Only
/// range-accepting functions consume the latter; every other context
/// coerces via `to_scalar`.
pub enum EvalValue {
    Scalar(CellValue),
    Range(Vec<Vec<CellValue>>),
}

impl EvalValue {
    /// Collapses a range to its single value if it is exactly 1x1;
    /// otherwise a range used where a scalar is expected is a `TypeError`.
    pub fn to_scalar(self) -> CellValue {
        match self {
            EvalValue::Scalar(v) => v,
            EvalValue::Range(rows) => {
                if rows.len() == 1 && rows[0].len() == 1 {
                    rows[0][0].clone()
                } else {
                    CellValue::error(CellErrorKind::TypeError)
                }
            }
        }
    }
}

pub fn eval(expr: &Expression, ctx: &EvalCtx) -> EvalValue {
    match expr {
        Expression::Literal(lit) => EvalValue::Scalar(literal_value(lit)),
        Expression::Cell(cr) => EvalValue::Scalar(eval_cell_ref(cr, ctx)),
        Expression::Range { sheet, start, end } => eval_range(sheet, start, end, ctx),
        Expression::BinaryOp { left, op, right } => {
            EvalValue::Scalar(eval_binary(*op, left, right, ctx))
        }
        Expression::UnaryOp { op, operand } => EvalValue::Scalar(eval_unary(*op, operand, ctx)),
        Expression::FunctionCall { func, args } => crate::functions::call(func, args, ctx),
    }
}

/// Entry point for evaluating a formula cell's top-level result.
pub fn eval_scalar(expr: &Expression, ctx: &EvalCtx) -> CellValue {
    eval(expr, ctx).to_scalar()
}

fn literal_value(lit: &Literal) -> CellValue {
    match lit {
        Literal::Number(d) => CellValue::Number(crate::value::canonicalize(*d)),
        Literal::Text(s) => CellValue::String(s.clone()),
        Literal::Boolean(b) => CellValue::Bool(*b),
        Literal::Error(k) => CellValue::error((*k).into()),
    }
}

/// Resolves a `CellRef`'s sheet qualifier (or the implicit containing
/// sheet) and address, normalized to lowercase/0-based. `None` means a
/// syntactically out-of-bounds address, not a missing sheet.
pub(crate) fn resolve_ref(cr: &CellRef, this_sheet: &str) -> Option<Vertex> {
    let sheet_lc = cr
        .sheet
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_else(|| this_sheet.to_string());
    let addr = Address::from_a1_parts(&cr.col, cr.row).ok()?;
    Some((sheet_lc, addr))
}

pub(crate) fn eval_cell_ref(cr: &CellRef, ctx: &EvalCtx) -> CellValue {
    let (sheet_lc, addr) = match resolve_ref(cr, &ctx.this_sheet) {
        Some(v) => v,
        None => return CellValue::error(CellErrorKind::BadReference),
    };
    match ctx.workbook.sheet_lc(&sheet_lc) {
        Some(sheet) => sheet.cell_value(&addr),
        None => CellValue::error(CellErrorKind::BadReference),
    }
}

/// Resolves an `INDIRECT` target, recording it into `ctx.indirect_targets`
/// for the caller to wire into the dependency graph.
pub(crate) fn eval_indirect_ref(cr: &CellRef, ctx: &EvalCtx) -> CellValue {
    let (sheet_lc, addr) = match resolve_ref(cr, &ctx.this_sheet) {
        Some(v) => v,
        None => return CellValue::error(CellErrorKind::BadReference),
    };
    match ctx.workbook.sheet_lc(&sheet_lc) {
        Some(sheet) => {
            ctx.indirect_targets.borrow_mut().push((sheet_lc, addr));
            sheet.cell_value(&addr)
        }
        None => CellValue::error(CellErrorKind::BadReference),
    }
}

fn eval_range(sheet: &Option<String>, start: &CellRef, end: &CellRef, ctx: &EvalCtx) -> EvalValue {
    let sheet_lc = sheet
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_else(|| ctx.this_sheet.clone());
    let (s, e) = match (
        Address::from_a1_parts(&start.col, start.row),
        Address::from_a1_parts(&end.col, end.row),
    ) {
        (Ok(s), Ok(e)) => (s, e),
        _ => return EvalValue::Scalar(CellValue::error(CellErrorKind::BadReference)),
    };
    let sheet_ref = match ctx.workbook.sheet_lc(&sheet_lc) {
        Some(s) => s,
        None => return EvalValue::Scalar(CellValue::error(CellErrorKind::BadReference)),
    };
    let region = Region::new(s, e);
    let rows = region
        .rows()
        .map(|r| {
            region
                .cols()
                .map(|c| sheet_ref.cell_value(&Address::new(c, r)))
                .collect()
        })
        .collect();
    EvalValue::Range(rows)
}

fn eval_binary(op: BinaryOperator, left: &Expression, right: &Expression, ctx: &EvalCtx) -> CellValue {
    use BinaryOperator::*;
    match op {
        Equal | NotEqual | LessThan | GreaterThan | LessEqual | GreaterEqual => {
            let a = eval_scalar(left, ctx);
            let b = eval_scalar(right, ctx);
            match CellValue::compare(&a, &b) {
                Err(k) => CellValue::error(k),
                Ok(ord) => CellValue::Bool(match op {
                    Equal => ord == Ordering::Equal,
                    NotEqual => ord != Ordering::Equal,
                    LessThan => ord == Ordering::Less,
                    GreaterThan => ord == Ordering::Greater,
                    LessEqual => ord != Ordering::Greater,
                    GreaterEqual => ord != Ordering::Less,
                    _ => unreachable!(),
                }),
            }
        }
        Concat => {
            let a = eval_scalar(left, ctx).to_text();
            if a.is_error() {
                return a;
            }
            let b = eval_scalar(right, ctx).to_text();
            if b.is_error() {
                return b;
            }
            match (a, b) {
                (CellValue::String(x), CellValue::String(y)) => CellValue::String(x + &y),
                _ => unreachable!("to_text always yields String for non-error input"),
            }
        }
        Add | Subtract | Multiply | Divide => {
            let a = eval_scalar(left, ctx).to_number();
            if a.is_error() {
                return a;
            }
            let b = eval_scalar(right, ctx).to_number();
            if b.is_error() {
                return b;
            }
            match (a, b) {
                (CellValue::Number(x), CellValue::Number(y)) => arithmetic(op, x, y),
                _ => unreachable!("to_number always yields Number for non-error input"),
            }
        }
    }
}

fn arithmetic(op: BinaryOperator, x: Decimal, y: Decimal) -> CellValue {
    if matches!(op, BinaryOperator::Divide) && y.is_zero() {
        // Finite numerator or not, division by zero is always DivideByZero
        // (spec.md §4.E: "the type-error from zero-as-operand does not
        // apply").
        return CellValue::error(CellErrorKind::DivideByZero);
    }
    let result = match op {
        BinaryOperator::Add => x.checked_add(y),
        BinaryOperator::Subtract => x.checked_sub(y),
        BinaryOperator::Multiply => x.checked_mul(y),
        BinaryOperator::Divide => x.checked_div(y),
        _ => unreachable!(),
    };
    match result {
        Some(d) => CellValue::Number(crate::value::canonicalize(d)),
        None => CellValue::error(CellErrorKind::TypeError),
    }
}

fn eval_unary(op: UnaryOperator, operand: &Expression, ctx: &EvalCtx) -> CellValue {
    let v = eval_scalar(operand, ctx).to_number();
    if v.is_error() {
        return v;
    }
    let n = match v {
        CellValue::Number(n) => n,
        _ => unreachable!("to_number always yields Number for non-error input"),
    };
    match op {
        UnaryOperator::Plus => CellValue::Number(crate::value::canonicalize(n)),
        UnaryOperator::Negate => CellValue::Number(crate::value::canonicalize(-n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use parser::parse;
    use pretty_assertions::assert_eq;

    fn ctx_with(wb: &Workbook) -> EvalCtx<'_> {
        EvalCtx::new(wb, "sheet1", ("sheet1".to_string(), Address::new(0, 0)))
    }

    fn workbook_with(sheet_name: &str, cells: &[(&str, &str)]) -> Workbook {
        let mut wb = Workbook::new();
        wb.new_sheet(Some(sheet_name.to_string())).unwrap();
        for (addr, text) in cells {
            wb.set_cell_contents(sheet_name, &Address::parse(addr).unwrap(), Some(text.to_string()))
                .unwrap();
        }
        wb
    }

    #[test]
    fn arithmetic_and_references() {
        // S1
        let wb = workbook_with("Sheet1", &[("A1", "5"), ("A2", "=A1 + 2"), ("A3", "=5 * A1")]);
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A2").unwrap()),
            CellValue::Number(Decimal::from(7))
        );
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A3").unwrap()),
            CellValue::Number(Decimal::from(25))
        );
    }

    #[test]
    fn division_by_zero_always_div0() {
        let ast = parse("=5/0").unwrap();
        let wb = Workbook::new();
        let ctx = ctx_with(&wb);
        assert_eq!(eval_scalar(&ast, &ctx), CellValue::error(CellErrorKind::DivideByZero));
        let ast2 = parse("=0/0").unwrap();
        assert_eq!(eval_scalar(&ast2, &ctx), CellValue::error(CellErrorKind::DivideByZero));
    }

    #[test]
    fn conditional_laziness_avoids_div_by_zero() {
        // S4
        let ast = parse("=IFERROR(1/0, \"ok\")").unwrap();
        let wb = Workbook::new();
        let ctx = ctx_with(&wb);
        assert_eq!(eval_scalar(&ast, &ctx), CellValue::String("ok".to_string()));

        let ast2 = parse("=IF(FALSE, 1/0, 42)").unwrap();
        assert_eq!(eval_scalar(&ast2, &ctx), CellValue::Number(Decimal::from(42)));
    }

    #[test]
    fn missing_sheet_is_bad_reference() {
        let ast = parse("=Nope!A1").unwrap();
        let wb = Workbook::new();
        let ctx = ctx_with(&wb);
        assert_eq!(eval_scalar(&ast, &ctx), CellValue::error(CellErrorKind::BadReference));
    }

    #[test]
    fn empty_cell_reads_as_empty_not_zero() {
        let mut wb = Workbook::new();
        wb.new_sheet(Some("Sheet1".to_string())).unwrap();
        let ast = Expression::Cell(CellRef {
            sheet: None,
            col: "A".to_string(),
            row: 1,
            col_absolute: false,
            row_absolute: false,
        });
        let ctx = ctx_with(&wb);
        assert_eq!(eval_scalar(&ast, &ctx), CellValue::Empty);
    }

    #[test]
    fn range_used_as_scalar_1x1_collapses() {
        let wb = workbook_with("Sheet1", &[("A1", "9")]);
        let ast = parse("=A1:A1").unwrap();
        let ctx = ctx_with(&wb);
        assert_eq!(eval_scalar(&ast, &ctx), CellValue::Number(Decimal::from(9)));
    }

    #[test]
    fn range_used_as_scalar_non_1x1_is_type_error() {
        let wb = workbook_with("Sheet1", &[("A1", "1"), ("A2", "2")]);
        let ast = parse("=A1:A2").unwrap();
        let ctx = ctx_with(&wb);
        assert_eq!(eval_scalar(&ast, &ctx), CellValue::error(CellErrorKind::TypeError));
    }
}
