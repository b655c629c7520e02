//! FILENAME: engine/src/region.rs
//! PURPOSE: Rectangular-region operations over a workbook: move, copy, and
//! sort (spec.md §4.F). Each operation validates its arguments entirely
//! before touching any cell, then drives `recompute::commit` per affected
//! address and batches the resulting notifications through a single
//! `Workbook::dispatch` call, the same protocol `Workbook::del_sheet` and
//! `Workbook::new_sheet` already follow.
//! CONTEXT: Built on `engine::rewrite`'s AST transformers (`shift`,
//! `retarget_moved_refs`, `retarget_sorted_rows`, `format_formula`); the
//! teacher has no move/copy/sort of its own to generalize from, since its
//! single-sheet grid model never needed one.

use crate::address::{Address, Region, MAX_COL, MAX_ROW};
use crate::error::{CallerError, CallerResult};
use crate::recompute::{self, CellChange};
use crate::value::CellValue;
use crate::workbook::Workbook;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Moves `start..end` on `sheet` so its top-left corner lands at `to` (on
/// `to_sheet`, defaulting to `sheet`). Every reference inside the moved
/// region is shifted by `(dx, dy)`; every formula elsewhere in the workbook
/// that referenced a cell inside the source region is re-pointed at the
/// cell's new location. A source cell not also covered by the destination
/// is erased; one that is (an overlapping same-sheet move) is left to the
/// destination write.
pub fn move_cells(
    wb: &mut Workbook,
    sheet: &str,
    start: Address,
    end: Address,
    to: Address,
    to_sheet: Option<&str>,
) -> CallerResult<Vec<CellChange>> {
    let sheet_lc = sheet.to_lowercase();
    if wb.sheet_lc(&sheet_lc).is_none() {
        return Err(CallerError::UnknownSheet(sheet.to_string()));
    }
    let dest_name = to_sheet.unwrap_or(sheet);
    let dest_lc = dest_name.to_lowercase();
    if wb.sheet_lc(&dest_lc).is_none() {
        return Err(CallerError::UnknownSheet(dest_name.to_string()));
    }

    let region = Region::new(start, end);
    let dest_region = compute_dest_region(region, to)?;
    let dx = to.col as i64 - region.top_left.col as i64;
    let dy = to.row as i64 - region.top_left.row as i64;
    let same_sheet = sheet_lc == dest_lc;

    let snapshot = snapshot_region(wb, &sheet_lc, region);
    let mut changes = Vec::new();
    let mut handled: HashSet<(String, Address)> = HashSet::new();

    for (&(ox, oy), raw) in &snapshot {
        let dest_addr = Address::new(to.col + ox, to.row + oy);
        let new_raw = shifted_contents(raw, dx, dy);
        changes.extend(recompute::commit(wb, &dest_lc, dest_addr, new_raw));
        handled.insert((dest_lc.clone(), dest_addr));
    }

    for addr in region.addresses() {
        if same_sheet && dest_region.contains(&addr) {
            continue;
        }
        changes.extend(recompute::commit(wb, &sheet_lc, addr, None));
        handled.insert((sheet_lc.clone(), addr));
    }

    changes.extend(retarget_references(wb, &sheet_lc, region, &handled, dx, dy));

    wb.dispatch(&changes);
    Ok(changes)
}

/// Copies `start..end` on `sheet` to a duplicate whose top-left corner lands
/// at `to` (on `to_sheet`, defaulting to `sheet`). References inside the
/// copy are shifted by `(dx, dy)` exactly as `move_cells` shifts them; the
/// source region and every formula elsewhere that references it are left
/// untouched, since the original cells still mean what they always meant.
pub fn copy_cells(
    wb: &mut Workbook,
    sheet: &str,
    start: Address,
    end: Address,
    to: Address,
    to_sheet: Option<&str>,
) -> CallerResult<Vec<CellChange>> {
    let sheet_lc = sheet.to_lowercase();
    if wb.sheet_lc(&sheet_lc).is_none() {
        return Err(CallerError::UnknownSheet(sheet.to_string()));
    }
    let dest_name = to_sheet.unwrap_or(sheet);
    let dest_lc = dest_name.to_lowercase();
    if wb.sheet_lc(&dest_lc).is_none() {
        return Err(CallerError::UnknownSheet(dest_name.to_string()));
    }

    let region = Region::new(start, end);
    compute_dest_region(region, to)?;
    let dx = to.col as i64 - region.top_left.col as i64;
    let dy = to.row as i64 - region.top_left.row as i64;

    let snapshot = snapshot_region(wb, &sheet_lc, region);
    let mut changes = Vec::new();
    for (&(ox, oy), raw) in &snapshot {
        let dest_addr = Address::new(to.col + ox, to.row + oy);
        let new_raw = shifted_contents(raw, dx, dy);
        changes.extend(recompute::commit(wb, &dest_lc, dest_addr, new_raw));
    }

    wb.dispatch(&changes);
    Ok(changes)
}

/// Stably sorts the rows of `start..end` on `sheet` by `sort_cols`: each
/// entry is a 1-based column offset within the region, negated for
/// descending order; earlier entries take priority over later ones on ties.
/// References elsewhere in the workbook that named a row inside the region
/// (by relative row) follow the permutation, so a formula that pointed at a
/// particular piece of data before the sort still points at it afterward.
pub fn sort_region(
    wb: &mut Workbook,
    sheet: &str,
    start: Address,
    end: Address,
    sort_cols: &[i64],
) -> CallerResult<Vec<CellChange>> {
    let sheet_lc = sheet.to_lowercase();
    if wb.sheet_lc(&sheet_lc).is_none() {
        return Err(CallerError::UnknownSheet(sheet.to_string()));
    }
    let region = Region::new(start, end);
    let width = region.width();
    let height = region.height();

    if sort_cols.is_empty() {
        return Err(CallerError::InvalidSortSpec(
            "at least one sort column is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for &c in sort_cols {
        let idx = c.unsigned_abs();
        if idx == 0 || idx > width as u64 {
            return Err(CallerError::InvalidSortSpec(format!(
                "sort column {} is out of range for a region {} columns wide",
                c, width
            )));
        }
        if !seen.insert(idx) {
            return Err(CallerError::InvalidSortSpec(format!(
                "sort column {} is repeated",
                idx
            )));
        }
    }

    let sheet_ref = wb.sheet_lc(&sheet_lc).expect("checked above");
    let mut rows: Vec<Vec<Option<String>>> = Vec::with_capacity(height as usize);
    let mut keys: Vec<Vec<CellValue>> = Vec::with_capacity(height as usize);
    for row_off in 0..height {
        let mut row_contents = Vec::with_capacity(width as usize);
        for col_off in 0..width {
            let addr = Address::new(region.top_left.col + col_off, region.top_left.row + row_off);
            row_contents.push(sheet_ref.cell(&addr).and_then(|c| c.contents.clone()));
        }
        rows.push(row_contents);

        let mut row_keys = Vec::with_capacity(sort_cols.len());
        for &c in sort_cols {
            let col_off = c.unsigned_abs() as u32 - 1;
            let addr = Address::new(region.top_left.col + col_off, region.top_left.row + row_off);
            row_keys.push(sheet_ref.cell_value(&addr));
        }
        keys.push(row_keys);
    }

    let mut order: Vec<u32> = (0..height).collect();
    order.sort_by(|&a, &b| {
        for (i, &c) in sort_cols.iter().enumerate() {
            let ord = sort_value_cmp(&keys[a as usize][i], &keys[b as usize][i]);
            let ord = if c < 0 { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });

    let mut row_map = HashMap::new();
    for (new_row, &old_row) in order.iter().enumerate() {
        row_map.insert(region.top_left.row + old_row, region.top_left.row + new_row as u32);
    }

    let mut changes = Vec::new();
    for (new_row, &old_row) in order.iter().enumerate() {
        for col_off in 0..width {
            let addr = Address::new(region.top_left.col + col_off, region.top_left.row + new_row as u32);
            let raw = rows[old_row as usize][col_off as usize].clone();
            changes.extend(recompute::commit(wb, &sheet_lc, addr, raw));
        }
    }

    changes.extend(retarget_sorted(wb, &sheet_lc, region, &row_map));

    wb.dispatch(&changes);
    Ok(changes)
}

fn compute_dest_region(region: Region, to: Address) -> CallerResult<Region> {
    let width = region.width() as i64 - 1;
    let height = region.height() as i64 - 1;
    let new_right = to.col as i64 + width;
    let new_bottom = to.row as i64 + height;
    if new_right > MAX_COL as i64 || new_bottom > MAX_ROW as i64 {
        return Err(CallerError::MalformedRegion(format!(
            "a region starting at {} would extend past the addressable sheet",
            to.to_a1()
        )));
    }
    Ok(Region::new(to, Address::new(new_right as u32, new_bottom as u32)))
}

fn snapshot_region(
    wb: &Workbook,
    sheet_lc: &str,
    region: Region,
) -> HashMap<(u32, u32), Option<String>> {
    let sheet = wb.sheet_lc(sheet_lc);
    region
        .addresses()
        .map(|addr| {
            let off = (addr.col - region.top_left.col, addr.row - region.top_left.row);
            let raw = sheet.and_then(|s| s.cell(&addr)).and_then(|c| c.contents.clone());
            (off, raw)
        })
        .collect()
}

/// Shifts a formula's references by `(dx, dy)` for its new location; a
/// non-formula literal's text is position-independent and copies verbatim.
/// A formula that failed to parse in its original location is carried over
/// unshifted — there is no reference inside it to move.
fn shifted_contents(raw: &Option<String>, dx: i64, dy: i64) -> Option<String> {
    match raw {
        None => None,
        Some(text) if text.starts_with('=') => match parser::parse(text) {
            Ok(ast) => Some(crate::rewrite::format_formula(&crate::rewrite::shift(&ast, dx, dy))),
            Err(_) => Some(text.clone()),
        },
        Some(text) => Some(text.clone()),
    }
}

/// Re-points every formula elsewhere in the workbook (skipping the cells
/// `move_cells` already wrote or erased directly) that referenced a cell
/// inside the moved source region, so it still names the same cell at its
/// new location.
fn retarget_references(
    wb: &mut Workbook,
    source_sheet: &str,
    region: Region,
    handled: &HashSet<(String, Address)>,
    dx: i64,
    dy: i64,
) -> Vec<CellChange> {
    let mut changes = Vec::new();
    for sheet_lc in wb.sheet_names().iter().map(|n| n.to_lowercase()).collect::<Vec<_>>() {
        let addrs: Vec<Address> = match wb.sheet_lc(&sheet_lc) {
            Some(s) => s
                .iter()
                .filter(|(addr, c)| {
                    c.parsed.is_some() && !handled.contains(&(sheet_lc.clone(), **addr))
                })
                .map(|(addr, _)| *addr)
                .collect(),
            None => continue,
        };
        for addr in addrs {
            let (ast, original) = {
                let sheet = wb.sheet_lc(&sheet_lc).unwrap();
                let cell = sheet.cell(&addr).unwrap();
                (cell.parsed.clone().unwrap(), cell.contents.clone())
            };
            let rewritten =
                crate::rewrite::retarget_moved_refs(&ast, &sheet_lc, source_sheet, region, dx, dy);
            let new_raw = crate::rewrite::format_formula(&rewritten);
            if Some(new_raw.clone()) != original {
                changes.extend(recompute::commit(wb, &sheet_lc, addr, Some(new_raw)));
            }
        }
    }
    changes
}

/// Re-points every formula elsewhere in the workbook that referenced a row
/// inside the sorted region (by relative row) so it follows the
/// permutation, the sort counterpart of `retarget_references`.
fn retarget_sorted(
    wb: &mut Workbook,
    region_sheet: &str,
    region: Region,
    row_map: &HashMap<u32, u32>,
) -> Vec<CellChange> {
    let mut changes = Vec::new();
    for sheet_lc in wb.sheet_names().iter().map(|n| n.to_lowercase()).collect::<Vec<_>>() {
        let addrs: Vec<Address> = match wb.sheet_lc(&sheet_lc) {
            Some(s) => s
                .iter()
                .filter(|(_, c)| c.parsed.is_some())
                .map(|(addr, _)| *addr)
                .collect(),
            None => continue,
        };
        for addr in addrs {
            let (ast, original) = {
                let sheet = wb.sheet_lc(&sheet_lc).unwrap();
                let cell = sheet.cell(&addr).unwrap();
                (cell.parsed.clone().unwrap(), cell.contents.clone())
            };
            let rewritten =
                crate::rewrite::retarget_sorted_rows(&ast, &sheet_lc, region_sheet, region, row_map);
            let new_raw = crate::rewrite::format_formula(&rewritten);
            if Some(new_raw.clone()) != original {
                changes.extend(recompute::commit(wb, &sheet_lc, addr, Some(new_raw)));
            }
        }
    }
    changes
}

/// Row-comparison rule for `sort_region`: `Empty < Error < Number < String <
/// Bool`; errors order by their declared variant order, strings
/// case-insensitively. Distinct from `CellValue::compare`, which treats an
/// `Error` operand as aborting the comparison outright rather than giving it
/// a place in a total order — a sort needs every row to land somewhere.
fn sort_value_cmp(a: &CellValue, b: &CellValue) -> Ordering {
    fn rank(v: &CellValue) -> u8 {
        match v {
            CellValue::Empty => 0,
            CellValue::Error(..) => 1,
            CellValue::Number(_) => 2,
            CellValue::String(_) => 3,
            CellValue::Bool(_) => 4,
        }
    }
    let (ra, rb) = (rank(a), rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (CellValue::Empty, CellValue::Empty) => Ordering::Equal,
        (CellValue::Error(ka, _), CellValue::Error(kb, _)) => (*ka as u8).cmp(&(*kb as u8)),
        (CellValue::Number(x), CellValue::Number(y)) => x.cmp(y),
        (CellValue::String(x), CellValue::String(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        (CellValue::Bool(x), CellValue::Bool(y)) => x.cmp(y),
        _ => unreachable!("equal rank implies matching variant"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::CellErrorKind;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    fn wb_with(sheet: &str, cells: &[(&str, &str)]) -> Workbook {
        let mut wb = Workbook::new();
        wb.new_sheet(Some(sheet.to_string())).unwrap();
        for (addr, text) in cells {
            wb.set_cell_contents(sheet, &Address::parse(addr).unwrap(), Some(text.to_string()))
                .unwrap();
        }
        wb
    }

    #[test]
    fn move_cells_shifts_contents_and_internal_formulas() {
        let mut wb = wb_with("Sheet1", &[("A1", "5"), ("A2", "=A1*2")]);
        wb.move_cells(
            "Sheet1",
            Address::parse("A1").unwrap(),
            Address::parse("A2").unwrap(),
            Address::parse("C1").unwrap(),
            None,
        )
        .unwrap();
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("C1").unwrap()),
            CellValue::Number(Decimal::from(5))
        );
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("C2").unwrap()),
            CellValue::Number(Decimal::from(10))
        );
        // Source cells are erased.
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A1").unwrap()),
            CellValue::Empty
        );
    }

    #[test]
    fn move_cells_retargets_external_references() {
        let mut wb = wb_with("Sheet1", &[("A1", "5"), ("B1", "=A1+1")]);
        wb.move_cells(
            "Sheet1",
            Address::parse("A1").unwrap(),
            Address::parse("A1").unwrap(),
            Address::parse("D1").unwrap(),
            None,
        )
        .unwrap();
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("B1").unwrap()),
            CellValue::Number(Decimal::from(6))
        );
        let cell = wb
            .sheet_lc("sheet1")
            .unwrap()
            .cell(&Address::parse("B1").unwrap())
            .unwrap();
        assert_eq!(cell.contents.as_deref(), Some("=(D1+1)"));
    }

    #[test]
    fn move_cells_shift_past_the_edge_turns_refs_into_bad_reference() {
        // S5
        let mut wb = wb_with("Sheet1", &[("A1", "=B1+B2+B3+B4")]);
        wb.move_cells(
            "Sheet1",
            Address::parse("A1").unwrap(),
            Address::parse("A1").unwrap(),
            Address::parse("A9999").unwrap(),
            None,
        )
        .unwrap();
        let cell = wb
            .sheet_lc("sheet1")
            .unwrap()
            .cell(&Address::parse("A9999").unwrap())
            .unwrap();
        // B1 shifts in bounds to B9999; B2/B3/B4 each shift past row 9999.
        assert!(cell.contents.as_deref().unwrap().contains("B9999"));
        assert_eq!(cell.contents.as_deref().unwrap().matches("#REF!").count(), 3);
    }

    #[test]
    fn move_cells_out_of_bounds_is_caller_error() {
        let mut wb = wb_with("Sheet1", &[("A1", "1"), ("B1", "2")]);
        let result = wb.move_cells(
            "Sheet1",
            Address::parse("A1").unwrap(),
            Address::parse("B1").unwrap(),
            Address::new(MAX_COL, 0),
            None,
        );
        assert!(matches!(result, Err(CallerError::MalformedRegion(_))));
        // Nothing was mutated.
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A1").unwrap()),
            CellValue::Number(Decimal::from(1))
        );
    }

    #[test]
    fn move_cells_overlapping_region_keeps_moved_value() {
        let mut wb = wb_with("Sheet1", &[("A1", "1"), ("A2", "2")]);
        wb.move_cells(
            "Sheet1",
            Address::parse("A1").unwrap(),
            Address::parse("A2").unwrap(),
            Address::parse("A2").unwrap(),
            None,
        )
        .unwrap();
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A2").unwrap()),
            CellValue::Number(Decimal::from(1))
        );
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A3").unwrap()),
            CellValue::Number(Decimal::from(2))
        );
    }

    #[test]
    fn copy_cells_leaves_source_and_external_refs_untouched() {
        let mut wb = wb_with("Sheet1", &[("A1", "5"), ("B1", "=A1+1")]);
        wb.copy_cells(
            "Sheet1",
            Address::parse("A1").unwrap(),
            Address::parse("A1").unwrap(),
            Address::parse("D1").unwrap(),
            None,
        )
        .unwrap();
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A1").unwrap()),
            CellValue::Number(Decimal::from(5))
        );
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("D1").unwrap()),
            CellValue::Number(Decimal::from(5))
        );
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("B1").unwrap()),
            CellValue::Number(Decimal::from(6))
        );
    }

    #[test]
    fn copy_cells_to_another_sheet_shifts_formula_refs() {
        let mut wb = wb_with("Sheet1", &[("A1", "5"), ("A2", "=A1*2")]);
        wb.new_sheet(Some("Sheet2".to_string())).unwrap();
        wb.copy_cells(
            "Sheet1",
            Address::parse("A1").unwrap(),
            Address::parse("A2").unwrap(),
            Address::parse("A1").unwrap(),
            Some("Sheet2"),
        )
        .unwrap();
        assert_eq!(
            wb.get_cell_value("Sheet2", &Address::parse("A2").unwrap()),
            CellValue::Number(Decimal::from(10))
        );
    }

    #[test]
    fn sort_region_orders_rows_by_single_ascending_column() {
        let mut wb = wb_with(
            "Sheet1",
            &[("A1", "3"), ("A2", "1"), ("A3", "2")],
        );
        wb.sort_region(
            "Sheet1",
            Address::parse("A1").unwrap(),
            Address::parse("A3").unwrap(),
            &[1],
        )
        .unwrap();
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A1").unwrap()),
            CellValue::Number(Decimal::from(1))
        );
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A2").unwrap()),
            CellValue::Number(Decimal::from(2))
        );
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A3").unwrap()),
            CellValue::Number(Decimal::from(3))
        );
    }

    #[test]
    fn sort_region_descending_key_reverses_order() {
        let mut wb = wb_with("Sheet1", &[("A1", "1"), ("A2", "2"), ("A3", "3")]);
        wb.sort_region(
            "Sheet1",
            Address::parse("A1").unwrap(),
            Address::parse("A3").unwrap(),
            &[-1],
        )
        .unwrap();
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A1").unwrap()),
            CellValue::Number(Decimal::from(3))
        );
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A3").unwrap()),
            CellValue::Number(Decimal::from(1))
        );
    }

    #[test]
    fn sort_region_moves_whole_row_not_just_key_column() {
        let mut wb = wb_with(
            "Sheet1",
            &[("A1", "2"), ("B1", "two"), ("A2", "1"), ("B2", "one")],
        );
        wb.sort_region(
            "Sheet1",
            Address::parse("A1").unwrap(),
            Address::parse("B2").unwrap(),
            &[1],
        )
        .unwrap();
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("B1").unwrap()),
            CellValue::String("one".to_string())
        );
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("B2").unwrap()),
            CellValue::String("two".to_string())
        );
    }

    #[test]
    fn sort_region_retargets_external_relative_row_reference() {
        let mut wb = wb_with(
            "Sheet1",
            &[("A1", "2"), ("A2", "1"), ("C1", "=A2")],
        );
        // C1 names whatever data ends up on row 2; that data (1) moves to
        // row 1 after the sort, so C1's reference should follow it.
        wb.sort_region(
            "Sheet1",
            Address::parse("A1").unwrap(),
            Address::parse("A2").unwrap(),
            &[1],
        )
        .unwrap();
        let cell = wb
            .sheet_lc("sheet1")
            .unwrap()
            .cell(&Address::parse("C1").unwrap())
            .unwrap();
        assert_eq!(cell.contents.as_deref(), Some("=A1"));
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("C1").unwrap()),
            CellValue::Number(Decimal::from(1))
        );
    }

    #[test]
    fn sort_region_multi_key_tiebreak() {
        // S6
        let mut wb = wb_with(
            "Sheet1",
            &[
                ("A1", "Alice"), ("B1", "25"), ("C1", "Engineer"),
                ("A2", "Bob"), ("B2", "30"), ("C2", "Designer"),
                ("A3", "Charlie"), ("B3", "25"), ("C3", "Manager"),
            ],
        );
        wb.sort_region(
            "Sheet1",
            Address::parse("A1").unwrap(),
            Address::parse("C3").unwrap(),
            &[2, -1],
        )
        .unwrap();
        let row = |r: u32| {
            [
                wb.get_cell_value("Sheet1", &Address::new(0, r)),
                wb.get_cell_value("Sheet1", &Address::new(1, r)),
                wb.get_cell_value("Sheet1", &Address::new(2, r)),
            ]
        };
        assert_eq!(
            row(0),
            [
                CellValue::String("Charlie".to_string()),
                CellValue::Number(Decimal::from(25)),
                CellValue::String("Manager".to_string())
            ]
        );
        assert_eq!(
            row(1),
            [
                CellValue::String("Alice".to_string()),
                CellValue::Number(Decimal::from(25)),
                CellValue::String("Engineer".to_string())
            ]
        );
        assert_eq!(
            row(2),
            [
                CellValue::String("Bob".to_string()),
                CellValue::Number(Decimal::from(30)),
                CellValue::String("Designer".to_string())
            ]
        );
    }

    #[test]
    fn sort_region_rejects_out_of_range_column() {
        let mut wb = wb_with("Sheet1", &[("A1", "1")]);
        let result = wb.sort_region(
            "Sheet1",
            Address::parse("A1").unwrap(),
            Address::parse("A1").unwrap(),
            &[2],
        );
        assert!(matches!(result, Err(CallerError::InvalidSortSpec(_))));
    }

    #[test]
    fn sort_region_rejects_empty_spec() {
        let mut wb = wb_with("Sheet1", &[("A1", "1")]);
        let result = wb.sort_region(
            "Sheet1",
            Address::parse("A1").unwrap(),
            Address::parse("A1").unwrap(),
            &[],
        );
        assert!(matches!(result, Err(CallerError::InvalidSortSpec(_))));
    }

    #[test]
    fn sort_value_rank_orders_empty_error_number_string_bool() {
        assert_eq!(sort_value_cmp(&CellValue::Empty, &CellValue::error(CellErrorKind::BadName)), Ordering::Less);
        assert_eq!(
            sort_value_cmp(&CellValue::error(CellErrorKind::BadName), &CellValue::Number(Decimal::ZERO)),
            Ordering::Less
        );
        assert_eq!(
            sort_value_cmp(&CellValue::Number(Decimal::ZERO), &CellValue::String("a".to_string())),
            Ordering::Less
        );
        assert_eq!(
            sort_value_cmp(&CellValue::String("z".to_string()), &CellValue::Bool(false)),
            Ordering::Less
        );
    }

    #[test]
    fn unknown_sheet_on_move_is_caller_error() {
        let mut wb = wb_with("Sheet1", &[("A1", "1")]);
        let result = wb.move_cells(
            "Nope",
            Address::parse("A1").unwrap(),
            Address::parse("A1").unwrap(),
            Address::parse("B1").unwrap(),
            None,
        );
        assert_eq!(result, Err(CallerError::UnknownSheet("Nope".to_string())));
    }
}
