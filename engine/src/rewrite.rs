//! FILENAME: engine/src/rewrite.rs
//! PURPOSE: AST-to-AST reference transformers used by sheet rename and
//! region operations (spec.md §4.F, §9 "Reference rewriting"), plus the
//! canonical formula-text re-emitter they both need to turn a rewritten
//! `Expression` back into a storable `contents` string.
//! CONTEXT: Grounded on the tree-walk shape of
//! `core/engine/src/dependency_extractor.rs` (the teacher's AST visitor),
//! generalized from "extract references" to "produce a new tree."

use crate::address::{col_to_index, index_to_col, Address, MAX_COL, MAX_ROW};
use crate::graph::Vertex;
use parser::ast::{BinaryOperator, CellRef, Expression, FunctionId, Literal, UnaryOperator};
use std::collections::HashSet;

/// Static reference extraction for `recompute::commit` step 5 / invariant
/// I2: "`outgoing[v]` equals exactly the set of distinct references in its
/// AST". This walks every branch of the tree regardless of which would
/// actually be selected at evaluation time (conditional laziness is an
/// evaluation-time concern — see `engine::evaluator` — not a graph-edge
/// one); a reference whose address is syntactically out of bounds
/// contributes no edge, since it can never be a valid graph vertex.
pub fn extract_refs(expr: &Expression, this_sheet: &str) -> HashSet<Vertex> {
    let mut refs = HashSet::new();
    collect_refs(expr, this_sheet, &mut refs);
    refs
}

fn collect_refs(expr: &Expression, this_sheet: &str, out: &mut HashSet<Vertex>) {
    match expr {
        Expression::Literal(_) => {}
        Expression::Cell(cr) => {
            if let Some(v) = cell_ref_vertex(cr, this_sheet) {
                out.insert(v);
            }
        }
        Expression::Range { sheet, start, end } => {
            let sheet_lc = sheet
                .as_deref()
                .map(str::to_lowercase)
                .unwrap_or_else(|| this_sheet.to_string());
            if let (Some(s), Some(e)) = (addr_of(start), addr_of(end)) {
                let region = crate::address::Region::new(s, e);
                for addr in region.addresses() {
                    out.insert((sheet_lc.clone(), addr));
                }
            }
        }
        Expression::BinaryOp { left, right, .. } => {
            collect_refs(left, this_sheet, out);
            collect_refs(right, this_sheet, out);
        }
        Expression::UnaryOp { operand, .. } => collect_refs(operand, this_sheet, out),
        Expression::FunctionCall { args, .. } => {
            for a in args {
                collect_refs(a, this_sheet, out);
            }
        }
    }
}

fn cell_ref_vertex(cr: &CellRef, this_sheet: &str) -> Option<Vertex> {
    let sheet_lc = cr
        .sheet
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_else(|| this_sheet.to_string());
    let addr = addr_of(cr)?;
    Some((sheet_lc, addr))
}

fn addr_of(cr: &CellRef) -> Option<Address> {
    Address::from_a1_parts(&cr.col, cr.row).ok()
}

/// Shifts every non-absolute component of every reference in `expr` by
/// `(dx, dy)`. A reference (single cell or range endpoint) that would land
/// outside `[A1, ZZZZ9999]` is replaced wholesale by the `#REF!` literal,
/// per spec.md §4.F `move_cells`/`copy_cells`.
pub fn shift(expr: &Expression, dx: i64, dy: i64) -> Expression {
    match expr {
        Expression::Literal(_) => expr.clone(),
        Expression::Cell(cr) => match shift_cell_ref(cr, dx, dy) {
            Some(new_cr) => Expression::Cell(new_cr),
            None => ref_error(),
        },
        Expression::Range { sheet, start, end } => {
            match (shift_cell_ref(start, dx, dy), shift_cell_ref(end, dx, dy)) {
                (Some(s), Some(e)) => Expression::Range {
                    sheet: sheet.clone(),
                    start: Box::new(s),
                    end: Box::new(e),
                },
                _ => ref_error(),
            }
        }
        Expression::BinaryOp { left, op, right } => Expression::BinaryOp {
            left: Box::new(shift(left, dx, dy)),
            op: *op,
            right: Box::new(shift(right, dx, dy)),
        },
        Expression::UnaryOp { op, operand } => Expression::UnaryOp {
            op: *op,
            operand: Box::new(shift(operand, dx, dy)),
        },
        Expression::FunctionCall { func, args } => Expression::FunctionCall {
            func: func.clone(),
            args: args.iter().map(|a| shift(a, dx, dy)).collect(),
        },
    }
}

/// Substitutes every reference in `expr` qualified by `old` (case-
/// insensitive) with `new`, for `Workbook::rename_sheet`. References with
/// no sheet qualifier (implicitly the containing sheet) are left alone —
/// the caller only invokes this on formulas it already determined name
/// `old` explicitly.
pub fn substitute_sheet(expr: &Expression, old: &str, new: &str) -> Expression {
    match expr {
        Expression::Literal(_) => expr.clone(),
        Expression::Cell(cr) => {
            let mut cr = cr.clone();
            if let Some(s) = &cr.sheet {
                if s.eq_ignore_ascii_case(old) {
                    cr.sheet = Some(new.to_string());
                }
            }
            Expression::Cell(cr)
        }
        Expression::Range { sheet, start, end } => {
            let new_sheet = match sheet {
                Some(s) if s.eq_ignore_ascii_case(old) => Some(new.to_string()),
                other => other.clone(),
            };
            Expression::Range {
                sheet: new_sheet,
                start: start.clone(),
                end: end.clone(),
            }
        }
        Expression::BinaryOp { left, op, right } => Expression::BinaryOp {
            left: Box::new(substitute_sheet(left, old, new)),
            op: *op,
            right: Box::new(substitute_sheet(right, old, new)),
        },
        Expression::UnaryOp { op, operand } => Expression::UnaryOp {
            op: *op,
            operand: Box::new(substitute_sheet(operand, old, new)),
        },
        Expression::FunctionCall { func, args } => Expression::FunctionCall {
            func: func.clone(),
            args: args.iter().map(|a| substitute_sheet(a, old, new)).collect(),
        },
    }
}

/// True iff any reference in `expr` names `sheet` (case-insensitive),
/// including implicit range-level qualifiers.
pub fn references_sheet(expr: &Expression, sheet: &str) -> bool {
    match expr {
        Expression::Literal(_) => false,
        Expression::Cell(cr) => cr
            .sheet
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case(sheet))
            .unwrap_or(false),
        Expression::Range { sheet: s, .. } => {
            s.as_deref().map(|x| x.eq_ignore_ascii_case(sheet)).unwrap_or(false)
        }
        Expression::BinaryOp { left, right, .. } => {
            references_sheet(left, sheet) || references_sheet(right, sheet)
        }
        Expression::UnaryOp { operand, .. } => references_sheet(operand, sheet),
        Expression::FunctionCall { args, .. } => {
            args.iter().any(|a| references_sheet(a, sheet))
        }
    }
}

/// Shifts only the references that both qualify `region_sheet` (explicitly
/// or implicitly) and land inside `region`, leaving every other reference
/// untouched. Used by `region::move_cells` to re-point formulas elsewhere
/// in the workbook at cells a move relocated.
///
/// A range reference is retargeted only when *both* endpoints fall inside
/// `region`; a range that merely overlaps `region` is left as-is — the
/// spreadsheet-wide problem of splitting a partially-overlapping range
/// reference has no single right answer and is out of scope here.
pub fn retarget_moved_refs(
    expr: &Expression,
    formula_sheet: &str,
    region_sheet: &str,
    region: crate::address::Region,
    dx: i64,
    dy: i64,
) -> Expression {
    match expr {
        Expression::Literal(_) => expr.clone(),
        Expression::Cell(cr) => {
            if ref_in_region(cr, formula_sheet, region_sheet, region) {
                match shift_cell_ref(cr, dx, dy) {
                    Some(new_cr) => Expression::Cell(new_cr),
                    None => ref_error(),
                }
            } else {
                expr.clone()
            }
        }
        Expression::Range { sheet, start, end } => {
            let both_inside = ref_in_region(start, formula_sheet, region_sheet, region)
                && ref_in_region(end, formula_sheet, region_sheet, region);
            if both_inside {
                match (shift_cell_ref(start, dx, dy), shift_cell_ref(end, dx, dy)) {
                    (Some(s), Some(e)) => Expression::Range {
                        sheet: sheet.clone(),
                        start: Box::new(s),
                        end: Box::new(e),
                    },
                    _ => ref_error(),
                }
            } else {
                expr.clone()
            }
        }
        Expression::BinaryOp { left, op, right } => Expression::BinaryOp {
            left: Box::new(retarget_moved_refs(left, formula_sheet, region_sheet, region, dx, dy)),
            op: *op,
            right: Box::new(retarget_moved_refs(right, formula_sheet, region_sheet, region, dx, dy)),
        },
        Expression::UnaryOp { op, operand } => Expression::UnaryOp {
            op: *op,
            operand: Box::new(retarget_moved_refs(operand, formula_sheet, region_sheet, region, dx, dy)),
        },
        Expression::FunctionCall { func, args } => Expression::FunctionCall {
            func: func.clone(),
            args: args
                .iter()
                .map(|a| retarget_moved_refs(a, formula_sheet, region_sheet, region, dx, dy))
                .collect(),
        },
    }
}

/// Re-points references inside `region` on `region_sheet` to follow the row
/// permutation `row_map` produced by `region::sort_region`. Column
/// components are never touched — sorting rows never rearranges columns.
/// A row-absolute reference is left exactly as written: an absolute row
/// means "always this row", which a sort must not disturb.
pub fn retarget_sorted_rows(
    expr: &Expression,
    formula_sheet: &str,
    region_sheet: &str,
    region: crate::address::Region,
    row_map: &std::collections::HashMap<u32, u32>,
) -> Expression {
    match expr {
        Expression::Literal(_) => expr.clone(),
        Expression::Cell(cr) => {
            if !cr.row_absolute && ref_in_region(cr, formula_sheet, region_sheet, region) {
                Expression::Cell(remap_row(cr, row_map))
            } else {
                expr.clone()
            }
        }
        Expression::Range { sheet, start, end } => {
            let both_inside = !start.row_absolute
                && !end.row_absolute
                && ref_in_region(start, formula_sheet, region_sheet, region)
                && ref_in_region(end, formula_sheet, region_sheet, region);
            if both_inside {
                Expression::Range {
                    sheet: sheet.clone(),
                    start: Box::new(remap_row(start, row_map)),
                    end: Box::new(remap_row(end, row_map)),
                }
            } else {
                expr.clone()
            }
        }
        Expression::BinaryOp { left, op, right } => Expression::BinaryOp {
            left: Box::new(retarget_sorted_rows(left, formula_sheet, region_sheet, region, row_map)),
            op: *op,
            right: Box::new(retarget_sorted_rows(right, formula_sheet, region_sheet, region, row_map)),
        },
        Expression::UnaryOp { op, operand } => Expression::UnaryOp {
            op: *op,
            operand: Box::new(retarget_sorted_rows(operand, formula_sheet, region_sheet, region, row_map)),
        },
        Expression::FunctionCall { func, args } => Expression::FunctionCall {
            func: func.clone(),
            args: args
                .iter()
                .map(|a| retarget_sorted_rows(a, formula_sheet, region_sheet, region, row_map))
                .collect(),
        },
    }
}

fn remap_row(cr: &CellRef, row_map: &std::collections::HashMap<u32, u32>) -> CellRef {
    let addr = addr_of(cr).expect("ref_in_region already confirmed this reference parses");
    let new_row0 = row_map.get(&addr.row).copied().unwrap_or(addr.row);
    CellRef {
        row: new_row0 + 1,
        ..cr.clone()
    }
}

fn ref_in_region(
    cr: &CellRef,
    formula_sheet: &str,
    region_sheet: &str,
    region: crate::address::Region,
) -> bool {
    let cr_sheet = cr.sheet.as_deref().unwrap_or(formula_sheet);
    if !cr_sheet.eq_ignore_ascii_case(region_sheet) {
        return false;
    }
    match addr_of(cr) {
        Some(addr) => region.contains(&addr),
        None => false,
    }
}

fn shift_cell_ref(cr: &CellRef, dx: i64, dy: i64) -> Option<CellRef> {
    let col_idx = col_to_index(&cr.col)?;
    let row0 = cr.row.checked_sub(1)?;
    let new_col = if cr.col_absolute {
        col_idx as i64
    } else {
        col_idx as i64 + dx
    };
    let new_row = if cr.row_absolute {
        row0 as i64
    } else {
        row0 as i64 + dy
    };
    if new_col < 0 || new_row < 0 || new_col > MAX_COL as i64 || new_row > MAX_ROW as i64 {
        return None;
    }
    Some(CellRef {
        sheet: cr.sheet.clone(),
        col: index_to_col(new_col as u32),
        row: new_row as u32 + 1,
        col_absolute: cr.col_absolute,
        row_absolute: cr.row_absolute,
    })
}

fn ref_error() -> Expression {
    Expression::Literal(Literal::Error(parser::ast::ErrorKind::BadReference))
}

/// Re-emits `expr` as formula text (without the leading `=`). Every binary
/// operation is fully parenthesized; this is always reparseable even
/// though it may not byte-for-byte match what the user originally typed —
/// spec.md only requires formulas to retain their *meaning* after a
/// rewrite, not their original spelling.
pub fn format_expr(expr: &Expression) -> String {
    match expr {
        Expression::Literal(lit) => format_literal(lit),
        Expression::Cell(cr) => format_cell_ref(cr, true),
        Expression::Range { sheet, start, end } => {
            let prefix = sheet.as_deref().map(format_sheet_prefix).unwrap_or_default();
            format!(
                "{}{}:{}",
                prefix,
                format_cell_ref(start, false),
                format_cell_ref(end, false)
            )
        }
        Expression::BinaryOp { left, op, right } => {
            format!("({}{}{})", format_expr(left), op, format_expr(right))
        }
        Expression::UnaryOp { op, operand } => format!("{}{}", op, format_expr(operand)),
        Expression::FunctionCall { func, args } => format!(
            "{}({})",
            function_name(func),
            args.iter().map(format_expr).collect::<Vec<_>>().join(",")
        ),
    }
}

/// Wraps `format_expr`'s output with the leading `=` every formula cell's
/// `contents` carries.
pub fn format_formula(expr: &Expression) -> String {
    format!("={}", format_expr(expr))
}

fn format_literal(lit: &Literal) -> String {
    match lit {
        Literal::Text(s) => format!("\"{}\"", s),
        other => other.to_string(),
    }
}

fn format_cell_ref(cr: &CellRef, with_sheet: bool) -> String {
    let prefix = if with_sheet {
        cr.sheet.as_deref().map(format_sheet_prefix).unwrap_or_default()
    } else {
        String::new()
    };
    format!(
        "{}{}{}{}{}",
        prefix,
        if cr.col_absolute { "$" } else { "" },
        cr.col,
        if cr.row_absolute { "$" } else { "" },
        cr.row
    )
}

/// Sheet-name alphabet test from spec.md §6: quoting in formulas is
/// required iff the name is not of the form `[A-Za-z_][A-Za-z0-9_]*`.
pub fn sheet_needs_quoting(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return true,
    }
    !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn format_sheet_prefix(name: &str) -> String {
    if sheet_needs_quoting(name) {
        format!("'{}'!", name.replace('\'', "''"))
    } else {
        format!("{}!", name)
    }
}

fn function_name(func: &FunctionId) -> String {
    match func {
        FunctionId::And => "AND".to_string(),
        FunctionId::Or => "OR".to_string(),
        FunctionId::Not => "NOT".to_string(),
        FunctionId::Xor => "XOR".to_string(),
        FunctionId::Exact => "EXACT".to_string(),
        FunctionId::If => "IF".to_string(),
        FunctionId::IfError => "IFERROR".to_string(),
        FunctionId::Choose => "CHOOSE".to_string(),
        FunctionId::IsBlank => "ISBLANK".to_string(),
        FunctionId::IsError => "ISERROR".to_string(),
        FunctionId::Version => "VERSION".to_string(),
        FunctionId::Indirect => "INDIRECT".to_string(),
        FunctionId::Min => "MIN".to_string(),
        FunctionId::Max => "MAX".to_string(),
        FunctionId::Sum => "SUM".to_string(),
        FunctionId::Average => "AVERAGE".to_string(),
        FunctionId::HLookup => "HLOOKUP".to_string(),
        FunctionId::VLookup => "VLOOKUP".to_string(),
        FunctionId::Custom(name) => name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::parse;

    #[test]
    fn shift_moves_relative_references() {
        let ast = parse("=B1+B2").unwrap();
        let shifted = shift(&ast, 0, 9998);
        assert_eq!(format_formula(&shifted), "=(B9999+#REF!)");
    }

    #[test]
    fn shift_preserves_absolute_components() {
        let ast = parse("=$B$1").unwrap();
        let shifted = shift(&ast, 5, 5);
        assert_eq!(format_formula(&shifted), "=$B$1");
    }

    #[test]
    fn shift_out_of_bounds_becomes_ref_error() {
        let ast = parse("=A1").unwrap();
        let shifted = shift(&ast, -1, 0);
        assert_eq!(format_formula(&shifted), "=#REF!");
    }

    #[test]
    fn substitute_sheet_rewrites_matching_qualifier_only() {
        let ast = parse("=Sheet1!A1+A2").unwrap();
        let renamed = substitute_sheet(&ast, "sheet1", "Data");
        assert_eq!(format_formula(&renamed), "=(Data!A1+A2)");
    }

    #[test]
    fn sheet_quoting_rule() {
        assert!(!sheet_needs_quoting("Sheet1"));
        assert!(!sheet_needs_quoting("_abc"));
        assert!(sheet_needs_quoting("My Sheet"));
        assert!(sheet_needs_quoting("2024"));
    }

    #[test]
    fn retarget_sorted_rows_follows_row_permutation() {
        let ast = parse("=A2").unwrap();
        let region = crate::address::Region::new(
            crate::address::Address::new(0, 0),
            crate::address::Address::new(0, 2),
        );
        let mut row_map = std::collections::HashMap::new();
        row_map.insert(1, 0); // old row 2 (0-based 1) now sits at row 1 (0-based 0)
        let retargeted = retarget_sorted_rows(&ast, "sheet1", "sheet1", region, &row_map);
        assert_eq!(format_formula(&retargeted), "=A1");
    }

    #[test]
    fn retarget_sorted_rows_leaves_absolute_row_untouched() {
        let ast = parse("=A$2").unwrap();
        let region = crate::address::Region::new(
            crate::address::Address::new(0, 0),
            crate::address::Address::new(0, 2),
        );
        let mut row_map = std::collections::HashMap::new();
        row_map.insert(1, 0);
        let retargeted = retarget_sorted_rows(&ast, "sheet1", "sheet1", region, &row_map);
        assert_eq!(format_formula(&retargeted), "=A$2");
    }

    #[test]
    fn extract_refs_collects_distinct_lowercased_vertices() {
        let ast = parse("=A1+A1+Sheet2!B2").unwrap();
        let refs = extract_refs(&ast, "sheet1");
        assert_eq!(refs.len(), 2);
        assert!(refs.contains(&("sheet1".to_string(), crate::address::Address::new(0, 0))));
        assert!(refs.contains(&("sheet2".to_string(), crate::address::Address::new(1, 1))));
    }

    #[test]
    fn extract_refs_walks_both_branches_of_conditionals() {
        // Static extraction is not lazy: both the taken and not-taken
        // branch contribute edges (recompute::commit relies on this for I2).
        let ast = parse("=IF(TRUE,A1,B1)").unwrap();
        let refs = extract_refs(&ast, "sheet1");
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn extract_refs_range_covers_rectangle() {
        let ast = parse("=SUM(A1:B2)").unwrap();
        let refs = extract_refs(&ast, "sheet1");
        assert_eq!(refs.len(), 4);
    }

    #[test]
    fn format_quotes_sheet_name_needing_it() {
        let ast = parse("=A1").unwrap();
        let renamed = substitute_sheet(&Expression::Cell(CellRef {
            sheet: None,
            ..match ast {
                Expression::Cell(cr) => cr,
                _ => unreachable!(),
            }
        }), "x", "y");
        // sanity: a ref with no sheet is untouched by substitution
        assert_eq!(format_formula(&renamed), "=A1");
    }
}
