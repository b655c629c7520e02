//! FILENAME: engine/src/recompute.rs
//! PURPOSE: The recomputation engine's commit protocol:
//! parse/store one cell's new contents, rewire its dependency-graph edges,
//! detect cycles with Tarjan's algorithm, evaluate the changed cell and
//! everything transitively downstream of it in topological order, and
//! report which cells' values actually changed.
//! CONTEXT: Edge rewiring (step 3 below) always uses static AST extraction
//! (`rewrite::extract_refs`), which walks every branch of a conditional —
//! this is what keeps `outgoing[v]` equal to exactly the distinct
//! references in `v`'s formula text regardless of which branch evaluation
//! actually takes. `INDIRECT`'s dynamically resolved target is not in the
//! AST at all, so it is wired in separately, after this commit's Tarjan
//! pass has already run — it only affects cycle detection in a later
//! commit, never this one.

use crate::address::Address;
use crate::cell;
use crate::evaluator::{self, EvalCtx};
use crate::graph::Vertex;
use crate::value::{CellErrorKind, CellValue};
use crate::workbook::Workbook;
use std::collections::{HashMap, HashSet, VecDeque};

/// One cell whose value changed as a result of a commit, reported via the
/// notification interface. `old_value`/`new_value` are compared
/// with `PartialEq` on `CellValue`, which ignores nothing — an `Error`'s
/// `detail` string does participate, so two errors of the same kind but
/// different detail still count as a change.
#[derive(Debug, Clone, PartialEq)]
pub struct CellChange {
    pub sheet: String,
    pub address: Address,
    pub old_value: CellValue,
    pub new_value: CellValue,
}

/// Applies the full commit protocol for setting `(sheet_lc, addr)`'s raw
/// contents to `raw`. `sheet_lc` must already be a valid, existing,
/// lowercased sheet key — callers (`Workbook`) validate that before
/// calling in.
pub(crate) fn commit(
    wb: &mut Workbook,
    sheet_lc: &str,
    addr: Address,
    raw: Option<String>,
) -> Vec<CellChange> {
    let target: Vertex = (sheet_lc.to_string(), addr);
    #[cfg(feature = "tracing")]
    tracing::debug!(sheet = sheet_lc, addr = %addr, "committing cell");

    // Step 2: parse and store the new contents.
    {
        let has_content = raw.is_some();
        let sheet = wb
            .sheet_lc_mut(sheet_lc)
            .expect("caller validated sheet exists before calling commit");
        let c = sheet.cell_mut_or_insert(addr);
        cell::set_contents(c, raw.as_deref());
        if has_content {
            sheet.grow_extent(addr);
        } else {
            sheet.recompute_extent();
        }
    }

    // Step 3: static reference extraction, then rewire this cell's
    // outgoing edges to match exactly.
    let parsed = wb
        .sheet_lc(sheet_lc)
        .and_then(|s| s.cell(&addr))
        .and_then(|c| c.parsed.clone());
    wb.graph_mut().clear_outgoing(&target);
    if let Some(ast) = &parsed {
        for r in crate::rewrite::extract_refs(ast, sheet_lc) {
            wb.graph_mut().add_edge(target.clone(), r);
        }
    }

    // Step 4: Tarjan SCC over the union of this cell's ancestor and
    // descendant closures, flagging every member of a nontrivial SCC (or a
    // self-loop) as `in_cycle`.
    let closure = relevant_closure(wb, &target);
    let cyclic = tarjan_cyclic_nodes(wb, &closure);
    #[cfg(feature = "tracing")]
    if !cyclic.is_empty() {
        tracing::warn!(members = cyclic.len(), "circular reference detected");
    }
    for v in &closure {
        set_in_cycle(wb, v, cyclic.contains(v));
    }

    // Step 5: evaluate the target itself (the `in_cycle`/`parse_failed`
    // overrides above/on the cell already take precedence inside
    // `evaluate_one`).
    let mut d = bfs(wb, &target, false);
    d.insert(target.clone());
    let pre: HashMap<Vertex, CellValue> = d.iter().map(|v| (v.clone(), read_value(wb, v))).collect();

    evaluate_one(wb, &target);

    // Step 6: propagate to everything downstream of the target, in
    // topological order.
    let mut pending = d.clone();
    pending.remove(&target);
    for v in kahn_order(wb, &pending, &target) {
        evaluate_one(wb, &v);
    }

    // Step 7: diff pre/post values over D and report.
    let mut changes = Vec::new();
    for v in &d {
        let old = pre.get(v).cloned().unwrap_or(CellValue::Empty);
        let new = read_value(wb, v);
        if old != new {
            changes.push(CellChange {
                sheet: v.0.clone(),
                address: v.1,
                old_value: old,
                new_value: new,
            });
        }
    }

    // Lifecycle (spec.md §3): a cell whose contents were just erased keeps
    // its record only while something still depends on it; otherwise the
    // vertex is dropped entirely rather than lingering as a blank cell.
    let has_incoming = !wb.graph().incoming(&target).is_empty();
    if let Some(sheet) = wb.sheet_lc_mut(sheet_lc) {
        sheet.drop_if_unused(&addr, has_incoming);
    }

    #[cfg(feature = "tracing")]
    tracing::trace!(changed = changes.len(), "commit finished");

    changes
}

fn relevant_closure(wb: &Workbook, start: &Vertex) -> HashSet<Vertex> {
    let mut nodes = bfs(wb, start, true);
    nodes.extend(bfs(wb, start, false));
    nodes.insert(start.clone());
    nodes
}

/// Breadth-first traversal from `start`, following `outgoing` edges
/// (descendants/precedents) or `incoming` edges (ancestors/dependents).
/// `start` itself is never included in the result.
fn bfs(wb: &Workbook, start: &Vertex, follow_outgoing: bool) -> HashSet<Vertex> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(start.clone());
    queue.push_back(start.clone());
    while let Some(v) = queue.pop_front() {
        let neighbors: Vec<Vertex> = if follow_outgoing {
            wb.graph().outgoing(&v).to_vec()
        } else {
            wb.graph().incoming(&v).to_vec()
        };
        for n in neighbors {
            if seen.insert(n.clone()) {
                queue.push_back(n);
            }
        }
    }
    seen.remove(start);
    seen
}

fn set_in_cycle(wb: &mut Workbook, v: &Vertex, in_cycle: bool) {
    if let Some(sheet) = wb.sheet_lc_mut(&v.0) {
        sheet.cell_mut_or_insert(v.1).in_cycle = in_cycle;
    }
}

fn read_value(wb: &Workbook, v: &Vertex) -> CellValue {
    wb.sheet_lc(&v.0).map(|s| s.cell_value(&v.1)).unwrap_or(CellValue::Empty)
}

/// Evaluates a single cell and stores the result. `in_cycle`/`parse_failed`
/// short-circuit to their fixed error value; a non-formula cell's value was
/// already set by `cell::set_contents` and is left untouched.
fn evaluate_one(wb: &mut Workbook, v: &Vertex) {
    let (sheet_lc, addr) = (v.0.clone(), v.1);
    let (in_cycle, parse_failed, parsed) = match wb.sheet_lc(&sheet_lc).and_then(|s| s.cell(&addr)) {
        Some(c) => (c.in_cycle, c.parse_failed, c.parsed.clone()),
        None => return,
    };

    let new_value = if in_cycle {
        CellValue::error(CellErrorKind::CircularReference)
    } else if parse_failed {
        CellValue::error(CellErrorKind::ParseError)
    } else {
        match parsed {
            Some(ast) => {
                let indirect_targets;
                let result;
                {
                    let ctx = EvalCtx::new(wb, sheet_lc.clone(), v.clone());
                    result = evaluator::eval_scalar(&ast, &ctx);
                    indirect_targets = ctx.indirect_targets.into_inner();
                }
                for target in indirect_targets {
                    wb.graph_mut().add_edge(v.clone(), target);
                }
                result
            }
            None => return,
        }
    };

    if let Some(sheet) = wb.sheet_lc_mut(&sheet_lc) {
        sheet.cell_mut_or_insert(addr).value = new_value;
    }
}

/// Topological order of `pending` (cells downstream of `already_done`),
/// computed by Kahn's algorithm restricted to `pending ∪ {already_done}`.
/// Any node left over once the queue drains (only possible if `pending`
/// itself contains a cycle) is appended in arbitrary order — its `in_cycle`
/// flag already forces its evaluated value regardless of precedent order.
fn kahn_order(wb: &Workbook, pending: &HashSet<Vertex>, already_done: &Vertex) -> Vec<Vertex> {
    let mut full = pending.clone();
    full.insert(already_done.clone());

    let mut indeg: HashMap<Vertex, usize> = HashMap::new();
    for v in &full {
        let count = wb
            .graph()
            .outgoing(v)
            .iter()
            .filter(|w| pending.contains(*w))
            .count();
        indeg.insert(v.clone(), count);
    }

    let mut done: HashSet<Vertex> = HashSet::new();
    done.insert(already_done.clone());
    let mut queue: VecDeque<Vertex> = VecDeque::new();
    queue.push_back(already_done.clone());

    let mut order = Vec::new();
    while let Some(v) = queue.pop_front() {
        for dependent in wb.graph().incoming(&v).to_vec() {
            if !pending.contains(&dependent) || done.contains(&dependent) {
                continue;
            }
            let d = indeg.get_mut(&dependent).expect("every pending node has an indegree entry");
            *d -= 1;
            if *d == 0 {
                done.insert(dependent.clone());
                order.push(dependent.clone());
                queue.push_back(dependent);
            }
        }
    }
    for v in pending {
        if !done.contains(v) {
            order.push(v.clone());
        }
    }
    order
}

/// One still-open `strongconnect` activation: the vertex it was entered
/// for, its (filtered-to-`nodes`) outgoing neighbors, and how many of those
/// neighbors have already been visited. Standing in for a recursive call
/// frame — see `tarjan_cyclic_nodes`.
struct TarjanFrame {
    v: Vertex,
    neighbors: Vec<Vertex>,
    next: usize,
}

/// Tarjan's strongly-connected-components algorithm, restricted to edges
/// whose endpoints both lie in `nodes`. A component of size > 1, or a
/// singleton with a self-loop, contributes every one of its members to the
/// returned cyclic set (spec.md §4.D/§4.F: cycle membership, not mere
/// participation in a cyclic workbook, is what sets `in_cycle`).
///
/// Implemented as an explicit work-stack rather than recursive
/// `strongconnect` calls (spec.md §9: "recursive formulations overflow for
/// deep chains") — a single formula chain spanning a whole row or column is
/// thousands of cells long, well past a comfortable native stack depth.
fn tarjan_cyclic_nodes(wb: &Workbook, nodes: &HashSet<Vertex>) -> HashSet<Vertex> {
    let mut counter = 0usize;
    let mut index: HashMap<Vertex, usize> = HashMap::new();
    let mut lowlink: HashMap<Vertex, usize> = HashMap::new();
    let mut on_stack: HashSet<Vertex> = HashSet::new();
    let mut stack: Vec<Vertex> = Vec::new();
    let mut sccs: Vec<Vec<Vertex>> = Vec::new();

    let neighbors_of = |wb: &Workbook, v: &Vertex| -> Vec<Vertex> {
        wb.graph()
            .outgoing(v)
            .iter()
            .filter(|w| nodes.contains(*w))
            .cloned()
            .collect()
    };

    for start in nodes {
        if index.contains_key(start) {
            continue;
        }

        let mut work: Vec<TarjanFrame> = Vec::new();
        index.insert(start.clone(), counter);
        lowlink.insert(start.clone(), counter);
        counter += 1;
        stack.push(start.clone());
        on_stack.insert(start.clone());
        work.push(TarjanFrame {
            v: start.clone(),
            neighbors: neighbors_of(wb, start),
            next: 0,
        });

        while let Some(frame) = work.last_mut() {
            if frame.next < frame.neighbors.len() {
                let w = frame.neighbors[frame.next].clone();
                frame.next += 1;
                if !index.contains_key(&w) {
                    index.insert(w.clone(), counter);
                    lowlink.insert(w.clone(), counter);
                    counter += 1;
                    stack.push(w.clone());
                    on_stack.insert(w.clone());
                    let w_neighbors = neighbors_of(wb, &w);
                    work.push(TarjanFrame {
                        v: w,
                        neighbors: w_neighbors,
                        next: 0,
                    });
                } else if on_stack.contains(&w) {
                    let wi = index[&w];
                    let vl = lowlink[&frame.v];
                    lowlink.insert(frame.v.clone(), vl.min(wi));
                }
            } else {
                let v = frame.v.clone();
                work.pop();
                if let Some(parent) = work.last() {
                    let vl = lowlink[&v];
                    let pl = lowlink[&parent.v];
                    lowlink.insert(parent.v.clone(), pl.min(vl));
                }
                if lowlink[&v] == index[&v] {
                    let mut scc = Vec::new();
                    loop {
                        let w = stack.pop().expect("v's own SCC root is still on the stack");
                        on_stack.remove(&w);
                        let done = w == v;
                        scc.push(w);
                        if done {
                            break;
                        }
                    }
                    sccs.push(scc);
                }
            }
        }
    }

    let mut cyclic = HashSet::new();
    for scc in sccs {
        if scc.len() > 1 {
            cyclic.extend(scc);
        } else if wb.graph().outgoing(&scc[0]).contains(&scc[0]) {
            cyclic.insert(scc[0].clone());
        }
    }
    cyclic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
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
    fn simple_chain_recomputes_downstream() {
        // S1
        let mut wb = wb_with("Sheet1", &[("A1", "5"), ("A2", "=A1+2"), ("A3", "=A2*2")]);
        let changes = wb
            .set_cell_contents("Sheet1", &Address::parse("A1").unwrap(), Some("10".to_string()))
            .unwrap();
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A2").unwrap()),
            CellValue::Number(Decimal::from(12))
        );
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A3").unwrap()),
            CellValue::Number(Decimal::from(24))
        );
        assert_eq!(changes.len(), 3);
    }

    #[test]
    fn self_reference_is_circular() {
        // S2
        let mut wb = Workbook::new();
        wb.new_sheet(Some("Sheet1".to_string())).unwrap();
        wb.set_cell_contents("Sheet1", &Address::parse("A1").unwrap(), Some("=A1+1".to_string()))
            .unwrap();
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A1").unwrap()),
            CellValue::error(CellErrorKind::CircularReference)
        );
    }

    #[test]
    fn mutual_cycle_both_flagged() {
        // S3
        let mut wb = Workbook::new();
        wb.new_sheet(Some("Sheet1".to_string())).unwrap();
        wb.set_cell_contents("Sheet1", &Address::parse("A1").unwrap(), Some("=A2".to_string()))
            .unwrap();
        wb.set_cell_contents("Sheet1", &Address::parse("A2").unwrap(), Some("=A1".to_string()))
            .unwrap();
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A1").unwrap()),
            CellValue::error(CellErrorKind::CircularReference)
        );
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A2").unwrap()),
            CellValue::error(CellErrorKind::CircularReference)
        );
    }

    #[test]
    fn breaking_a_cycle_clears_the_flag() {
        let mut wb = Workbook::new();
        wb.new_sheet(Some("Sheet1".to_string())).unwrap();
        wb.set_cell_contents("Sheet1", &Address::parse("A1").unwrap(), Some("=A2".to_string()))
            .unwrap();
        wb.set_cell_contents("Sheet1", &Address::parse("A2").unwrap(), Some("=A1".to_string()))
            .unwrap();
        wb.set_cell_contents("Sheet1", &Address::parse("A2").unwrap(), Some("5".to_string()))
            .unwrap();
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A1").unwrap()),
            CellValue::Number(Decimal::from(5))
        );
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A2").unwrap()),
            CellValue::Number(Decimal::from(5))
        );
    }

    #[test]
    fn unparseable_formula_is_parse_error() {
        let mut wb = Workbook::new();
        wb.new_sheet(Some("Sheet1".to_string())).unwrap();
        wb.set_cell_contents("Sheet1", &Address::parse("A1").unwrap(), Some("=A1+".to_string()))
            .unwrap();
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("A1").unwrap()),
            CellValue::error(CellErrorKind::ParseError)
        );
    }

    #[test]
    fn no_op_edit_reports_no_changes() {
        let mut wb = wb_with("Sheet1", &[("A1", "5")]);
        let changes = wb
            .set_cell_contents("Sheet1", &Address::parse("A1").unwrap(), Some("5".to_string()))
            .unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn indirect_target_joins_graph_for_a_later_commit() {
        let mut wb = wb_with("Sheet1", &[("A1", "'A2"), ("B1", "=INDIRECT(A1)")]);
        // Evaluating B1 once resolves INDIRECT("A2") to A2 and records that
        // edge; a subsequent edit to A2 must now recompute B1 too.
        wb.set_cell_contents("Sheet1", &Address::parse("A2").unwrap(), Some("7".to_string()))
            .unwrap();
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::parse("B1").unwrap()),
            CellValue::Number(Decimal::from(7))
        );
    }

    /// spec.md §9 requires iterative Tarjan precisely because a deep
    /// reference chain like this one would overflow a recursive
    /// implementation's native stack.
    #[test]
    fn long_chain_recomputes_without_overflow() {
        const LEN: u32 = 4000;
        let mut wb = Workbook::new();
        wb.new_sheet(Some("Sheet1".to_string())).unwrap();
        wb.set_cell_contents("Sheet1", &Address::new(0, 0), Some("1".to_string()))
            .unwrap();
        for row in 1..LEN {
            let formula = format!("=A{}+1", row);
            wb.set_cell_contents("Sheet1", &Address::new(0, row), Some(formula))
                .unwrap();
        }
        assert_eq!(
            wb.get_cell_value("Sheet1", &Address::new(0, LEN - 1)),
            CellValue::Number(Decimal::from(LEN))
        );
    }

    #[test]
    fn long_cyclic_chain_flags_every_member() {
        const LEN: u32 = 4000;
        let mut wb = Workbook::new();
        wb.new_sheet(Some("Sheet1".to_string())).unwrap();
        for row in 0..LEN {
            let next = (row + 1) % LEN;
            let formula = format!("=A{}", next + 1);
            wb.set_cell_contents("Sheet1", &Address::new(0, row), Some(formula))
                .unwrap();
        }
        for row in 0..LEN {
            assert_eq!(
                wb.get_cell_value("Sheet1", &Address::new(0, row)),
                CellValue::error(CellErrorKind::CircularReference)
            );
        }
    }
}
