//! FILENAME: engine/src/functions.rs
//! PURPOSE: The built-in function table (spec.md §4.E): logical functions,
//! control-flow functions, lookup/aggregate functions over ranges, and
//! `INDIRECT`'s dynamic reference resolution.
//! CONTEXT: Every function here receives unevaluated argument expressions
//! and its own `EvalCtx`, so short-circuiting functions (`IF`, `IFERROR`,
//! `CHOOSE`, `AND`/`OR` in principle) only evaluate the branches they take.

use crate::evaluator::{eval, eval_scalar, EvalCtx, EvalValue};
use crate::value::{CellErrorKind, CellValue};
use parser::ast::{Expression, FunctionId};
use rust_decimal::Decimal;
use std::cmp::Ordering;

pub const ENGINE_VERSION: &str = "1.0";

pub fn call(func: &FunctionId, args: &[Expression], ctx: &EvalCtx) -> EvalValue {
    EvalValue::Scalar(match func {
        FunctionId::And => fn_and(args, ctx),
        FunctionId::Or => fn_or(args, ctx),
        FunctionId::Not => fn_not(args, ctx),
        FunctionId::Xor => fn_xor(args, ctx),
        FunctionId::Exact => fn_exact(args, ctx),
        FunctionId::If => fn_if(args, ctx),
        FunctionId::IfError => fn_iferror(args, ctx),
        FunctionId::Choose => fn_choose(args, ctx),
        FunctionId::IsBlank => fn_isblank(args, ctx),
        FunctionId::IsError => fn_iserror(args, ctx),
        FunctionId::Version => fn_version(args),
        FunctionId::Indirect => fn_indirect(args, ctx),
        FunctionId::Min => fn_aggregate(args, ctx, Aggregate::Min),
        FunctionId::Max => fn_aggregate(args, ctx, Aggregate::Max),
        FunctionId::Sum => fn_aggregate(args, ctx, Aggregate::Sum),
        FunctionId::Average => fn_aggregate(args, ctx, Aggregate::Average),
        FunctionId::HLookup => fn_lookup(args, ctx, LookupKind::HLookup),
        FunctionId::VLookup => fn_lookup(args, ctx, LookupKind::VLookup),
        FunctionId::Custom(_) => CellValue::error(CellErrorKind::BadName),
    })
}

fn fn_and(args: &[Expression], ctx: &EvalCtx) -> CellValue {
    if args.is_empty() {
        return CellValue::error(CellErrorKind::TypeError);
    }
    let mut result = true;
    for a in args {
        match eval_scalar(a, ctx).to_bool() {
            CellValue::Bool(b) => result &= b,
            err => return err,
        }
    }
    CellValue::Bool(result)
}

fn fn_or(args: &[Expression], ctx: &EvalCtx) -> CellValue {
    if args.is_empty() {
        return CellValue::error(CellErrorKind::TypeError);
    }
    let mut result = false;
    for a in args {
        match eval_scalar(a, ctx).to_bool() {
            CellValue::Bool(b) => result |= b,
            err => return err,
        }
    }
    CellValue::Bool(result)
}

fn fn_xor(args: &[Expression], ctx: &EvalCtx) -> CellValue {
    if args.is_empty() {
        return CellValue::error(CellErrorKind::TypeError);
    }
    let mut count = 0u32;
    for a in args {
        match eval_scalar(a, ctx).to_bool() {
            CellValue::Bool(true) => count += 1,
            CellValue::Bool(false) => {}
            err => return err,
        }
    }
    CellValue::Bool(count % 2 == 1)
}

fn fn_not(args: &[Expression], ctx: &EvalCtx) -> CellValue {
    if args.len() != 1 {
        return CellValue::error(CellErrorKind::TypeError);
    }
    match eval_scalar(&args[0], ctx).to_bool() {
        CellValue::Bool(b) => CellValue::Bool(!b),
        err => err,
    }
}

fn fn_exact(args: &[Expression], ctx: &EvalCtx) -> CellValue {
    if args.len() != 2 {
        return CellValue::error(CellErrorKind::TypeError);
    }
    let a = eval_scalar(&args[0], ctx).to_text();
    if a.is_error() {
        return a;
    }
    let b = eval_scalar(&args[1], ctx).to_text();
    if b.is_error() {
        return b;
    }
    match (a, b) {
        (CellValue::String(x), CellValue::String(y)) => CellValue::Bool(x == y),
        _ => unreachable!("to_text always yields String for non-error input"),
    }
}

/// `IF(cond, then[, else])`. The branch not taken is never evaluated (spec.md
/// §8 S4): this is the mechanism that makes `IF(FALSE, 1/0, 42)` safe.
fn fn_if(args: &[Expression], ctx: &EvalCtx) -> CellValue {
    if args.len() != 2 && args.len() != 3 {
        return CellValue::error(CellErrorKind::TypeError);
    }
    match eval_scalar(&args[0], ctx).to_bool() {
        CellValue::Bool(true) => eval_scalar(&args[1], ctx),
        CellValue::Bool(false) => {
            if args.len() == 3 {
                eval_scalar(&args[2], ctx)
            } else {
                CellValue::Bool(false)
            }
        }
        err => err,
    }
}

/// `IFERROR(value[, fallback])`. `value` is evaluated once; `fallback` only
/// if it turned out to be an error.
fn fn_iferror(args: &[Expression], ctx: &EvalCtx) -> CellValue {
    if args.len() != 1 && args.len() != 2 {
        return CellValue::error(CellErrorKind::TypeError);
    }
    let v = eval_scalar(&args[0], ctx);
    if v.is_error() {
        if args.len() == 2 {
            eval_scalar(&args[1], ctx)
        } else {
            CellValue::String(String::new())
        }
    } else {
        v
    }
}

/// `CHOOSE(index, v1, v2, ...)`. Only the selected `vN` is evaluated.
fn fn_choose(args: &[Expression], ctx: &EvalCtx) -> CellValue {
    if args.len() < 2 {
        return CellValue::error(CellErrorKind::TypeError);
    }
    let idx = eval_scalar(&args[0], ctx).to_number();
    let n = match idx {
        CellValue::Number(d) => d,
        err => return err,
    };
    let i: i64 = match n.trunc().to_string().parse() {
        Ok(v) => v,
        Err(_) => return CellValue::error(CellErrorKind::TypeError),
    };
    let choices = &args[1..];
    if i < 1 || i as usize > choices.len() {
        return CellValue::error(CellErrorKind::TypeError);
    }
    eval_scalar(&choices[(i - 1) as usize], ctx)
}

fn fn_isblank(args: &[Expression], ctx: &EvalCtx) -> CellValue {
    if args.len() != 1 {
        return CellValue::error(CellErrorKind::TypeError);
    }
    let v = eval_scalar(&args[0], ctx);
    if v.is_error() {
        return v;
    }
    CellValue::Bool(matches!(v, CellValue::Empty))
}

fn fn_iserror(args: &[Expression], ctx: &EvalCtx) -> CellValue {
    if args.len() != 1 {
        return CellValue::error(CellErrorKind::TypeError);
    }
    CellValue::Bool(eval_scalar(&args[0], ctx).is_error())
}

fn fn_version(args: &[Expression]) -> CellValue {
    if !args.is_empty() {
        return CellValue::error(CellErrorKind::TypeError);
    }
    CellValue::String(ENGINE_VERSION.to_string())
}

/// `INDIRECT(ref_text)`. Parses `ref_text` as a bare cell reference and
/// delegates to `evaluator::eval_indirect_ref`, which both reads the target's
/// current value and records it for the caller to wire into the dependency
/// graph (this target is never syntactically present in the formula's own
/// AST, so it can't be picked up by static extraction).
fn fn_indirect(args: &[Expression], ctx: &EvalCtx) -> CellValue {
    if args.len() != 1 {
        return CellValue::error(CellErrorKind::TypeError);
    }
    let s = eval_scalar(&args[0], ctx).to_text();
    let text = match s {
        CellValue::String(t) => t,
        err => return err,
    };
    let formula = format!("={}", text.trim());
    match parser::parse(&formula) {
        Ok(Expression::Cell(cr)) => crate::evaluator::eval_indirect_ref(&cr, ctx),
        _ => CellValue::error(CellErrorKind::BadReference),
    }
}

enum Aggregate {
    Min,
    Max,
    Sum,
    Average,
}

/// `SUM`/`MIN`/`MAX`/`AVERAGE` walk every argument, which may be scalars or
/// ranges; text and `Bool` arguments are skipped rather than coerced (a
/// range full of mixed content shouldn't fail the whole aggregate), but an
/// explicit error value anywhere propagates.
fn fn_aggregate(args: &[Expression], ctx: &EvalCtx, kind: Aggregate) -> CellValue {
    if args.is_empty() {
        return CellValue::error(CellErrorKind::TypeError);
    }
    let mut numbers: Vec<Decimal> = Vec::new();
    for a in args {
        match eval(a, ctx) {
            EvalValue::Scalar(v) => {
                if let Some(err) = numeric_or_skip(&v, &mut numbers) {
                    return err;
                }
            }
            EvalValue::Range(rows) => {
                for row in rows {
                    for v in row {
                        if let Some(err) = numeric_or_skip(&v, &mut numbers) {
                            return err;
                        }
                    }
                }
            }
        }
    }
    match kind {
        Aggregate::Sum => CellValue::Number(crate::value::canonicalize(
            numbers.iter().fold(Decimal::ZERO, |a, b| a + b),
        )),
        Aggregate::Min => numbers
            .iter()
            .min()
            .cloned()
            .map(|d| CellValue::Number(crate::value::canonicalize(d)))
            .unwrap_or(CellValue::Number(Decimal::ZERO)),
        Aggregate::Max => numbers
            .iter()
            .max()
            .cloned()
            .map(|d| CellValue::Number(crate::value::canonicalize(d)))
            .unwrap_or(CellValue::Number(Decimal::ZERO)),
        Aggregate::Average => {
            if numbers.is_empty() {
                return CellValue::error(CellErrorKind::DivideByZero);
            }
            let sum: Decimal = numbers.iter().fold(Decimal::ZERO, |a, b| a + b);
            CellValue::Number(crate::value::canonicalize(
                sum / Decimal::from(numbers.len() as u64),
            ))
        }
    }
}

/// `Empty` is skipped (not counted as zero); text/bool are skipped rather
/// than coerced; an explicit error short-circuits the whole aggregate.
fn numeric_or_skip(v: &CellValue, out: &mut Vec<Decimal>) -> Option<CellValue> {
    match v {
        CellValue::Empty => None,
        CellValue::Error(..) => Some(v.clone()),
        CellValue::Number(d) => {
            out.push(*d);
            None
        }
        CellValue::String(_) | CellValue::Bool(_) => None,
    }
}

enum LookupKind {
    HLookup,
    VLookup,
}

/// `VLOOKUP(key, table, index)` / `HLOOKUP(key, table, index)`. The spec's
/// six-kind error lattice has no #N/A-equivalent, so an unmatched key maps to
/// `TypeError` (see DESIGN.md's open-question decisions).
fn fn_lookup(args: &[Expression], ctx: &EvalCtx, kind: LookupKind) -> CellValue {
    if args.len() != 3 {
        return CellValue::error(CellErrorKind::TypeError);
    }
    let key = eval_scalar(&args[0], ctx);
    if key.is_error() {
        return key;
    }
    let table = match eval(&args[1], ctx) {
        EvalValue::Range(rows) => rows,
        EvalValue::Scalar(err) if err.is_error() => return err,
        EvalValue::Scalar(_) => return CellValue::error(CellErrorKind::TypeError),
    };
    let idx_val = eval_scalar(&args[2], ctx).to_number();
    let idx: i64 = match idx_val {
        CellValue::Number(d) => match d.trunc().to_string().parse() {
            Ok(i) => i,
            Err(_) => return CellValue::error(CellErrorKind::TypeError),
        },
        err => return err,
    };
    if table.is_empty() || table[0].is_empty() {
        return CellValue::error(CellErrorKind::TypeError);
    }
    match kind {
        LookupKind::VLookup => {
            let pos = table.iter().position(|row| values_equal_for_lookup(&row[0], &key));
            let row_i = match pos {
                Some(p) => p,
                None => return CellValue::error(CellErrorKind::TypeError),
            };
            if idx < 1 || idx as usize > table[row_i].len() {
                return CellValue::error(CellErrorKind::TypeError);
            }
            table[row_i][(idx - 1) as usize].clone()
        }
        LookupKind::HLookup => {
            let first_row = &table[0];
            let pos = first_row.iter().position(|v| values_equal_for_lookup(v, &key));
            let col_i = match pos {
                Some(p) => p,
                None => return CellValue::error(CellErrorKind::TypeError),
            };
            if idx < 1 || idx as usize > table.len() {
                return CellValue::error(CellErrorKind::TypeError);
            }
            table[(idx - 1) as usize][col_i].clone()
        }
    }
}

fn values_equal_for_lookup(a: &CellValue, b: &CellValue) -> bool {
    CellValue::compare(a, b) == Ok(Ordering::Equal)
}
