//! FILENAME: engine/src/workbook.rs
//! PURPOSE: Owns every sheet and the cross-sheet dependency graph; the
//! single entry point for every mutation spec.md §4.A-F describes (sheet
//! lifecycle, cell writes, and the region operations in `engine::region`).
//! CONTEXT: Sheet order is insertion order (spec.md: workbook order must
//! survive `move_sheet`/`copy_sheet`), hence `IndexMap` rather than
//! `HashMap` — the same structural reason the teacher's `engine/Cargo.toml`
//! already carried this dependency.

use crate::address::Address;
use crate::error::{CallerError, CallerResult};
use crate::graph::{DependencyGraph, Vertex};
use crate::recompute::{self, CellChange};
use crate::sheet::Sheet;
use crate::value::CellValue;
use indexmap::IndexMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// A registered notification callback (spec.md §6): invoked once per
/// commit with every cell whose value actually changed. A panicking
/// callback is isolated via `catch_unwind` so one misbehaving observer
/// can't corrupt the commit that is already complete by the time
/// notification runs.
pub type ChangeCallback = Box<dyn Fn(&[CellChange]) + Send + Sync>;

/// A workbook: an ordered collection of named sheets plus the dependency
/// graph spanning all of them.
pub struct Workbook {
    sheets: IndexMap<String, Sheet>,
    graph: DependencyGraph,
    callbacks: Vec<ChangeCallback>,
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl Workbook {
    pub fn new() -> Self {
        Workbook {
            sheets: IndexMap::new(),
            graph: DependencyGraph::new(),
            callbacks: Vec::new(),
        }
    }

    /// Registers a callback invoked after every commit that produced at
    /// least one change. Callbacks fire in registration order.
    pub fn register_callback(&mut self, cb: impl Fn(&[CellChange]) + Send + Sync + 'static) {
        self.callbacks.push(Box::new(cb));
    }

    pub fn sheet_lc(&self, lc: &str) -> Option<&Sheet> {
        self.sheets.get(lc)
    }

    pub(crate) fn sheet_lc_mut(&mut self, lc: &str) -> Option<&mut Sheet> {
        self.sheets.get_mut(lc)
    }

    pub(crate) fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut DependencyGraph {
        &mut self.graph
    }

    /// Sheet names in workbook order, original case.
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.values().map(|s| s.name.clone()).collect()
    }

    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets.get_index_of(&name.to_lowercase())
    }

    /// Sheet-name alphabet (spec.md §6): letters, digits, spaces, and
    /// `.?!,:;@#$%^&*()-_`; must not start or end with whitespace; must not
    /// contain any quote character; must not be empty.
    fn validate_sheet_name(&self, name: &str) -> CallerResult<()> {
        const PUNCT: &str = ".?!,:;@#$%^&*()-_";
        let alphabet_ok = !name.is_empty()
            && name.chars().all(|c| c.is_alphanumeric() || c == ' ' || PUNCT.contains(c));
        let no_quotes = !name.chars().any(|c| c == '\'' || c == '"');
        let no_edge_whitespace = name.chars().next().map_or(false, |c| !c.is_whitespace())
            && name.chars().next_back().map_or(false, |c| !c.is_whitespace());
        let ok = alphabet_ok && no_quotes && no_edge_whitespace;
        if ok {
            Ok(())
        } else {
            Err(CallerError::InvalidSheetName(name.to_string()))
        }
    }

    fn next_default_name(&self) -> String {
        let mut n = self.sheets.len() + 1;
        loop {
            let candidate = format!("Sheet{}", n);
            if !self.sheets.contains_key(&candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Probes `{base}_1`, `{base}_2`, ... for the first unused name
    /// (spec.md §4.F: `copy_sheet`'s auto-generated name is `name_k`).
    fn next_copy_name(&self, base: &str) -> String {
        let mut n = 1usize;
        loop {
            let candidate = format!("{}_{}", base, n);
            if !self.sheets.contains_key(&candidate.to_lowercase()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Creates a new, empty sheet, appended at the end of workbook order.
    /// `name: None` assigns the next unused `SheetN`. If some other cell's
    /// formula already referenced this name before it existed (a forward-
    /// declared reference, evaluating to `BadReference`), that vertex is
    /// already present in the graph as an incoming-edge target; re-running
    /// the commit protocol on each such vertex (as a no-op empty write)
    /// re-evaluates every cell that referenced it, so it can resolve now
    /// that the sheet exists (spec.md §4.F sheet lifecycle).
    pub fn new_sheet(&mut self, name: Option<String>) -> CallerResult<String> {
        let name = name.unwrap_or_else(|| self.next_default_name());
        self.validate_sheet_name(&name)?;
        let lc = name.to_lowercase();
        if self.sheets.contains_key(&lc) {
            return Err(CallerError::DuplicateSheetName(name));
        }
        self.sheets.insert(lc.clone(), Sheet::new(name.clone()));
        #[cfg(feature = "tracing")]
        tracing::debug!(sheet = name, "new sheet created");

        let forward_declared: Vec<Address> = self
            .graph
            .vertices_with_edges()
            .into_iter()
            .filter(|v| v.0 == lc)
            .map(|v| v.1)
            .collect();
        let mut changes = Vec::new();
        for addr in forward_declared {
            changes.extend(recompute::commit(self, &lc, addr, None));
        }
        self.dispatch(&changes);
        Ok(name)
    }

    /// Deletes a sheet. Every surviving formula elsewhere in the workbook
    /// that referenced a cell on the deleted sheet is recomputed to
    /// `#REF!` (spec.md §4.F sheet lifecycle); the snapshot of affected
    /// dependents is taken *before* the sheet's vertices are dropped from
    /// the graph, since `drop_sheet` itself prunes the edges that would
    /// otherwise tell us who to re-evaluate.
    pub fn del_sheet(&mut self, name: &str) -> CallerResult<Vec<CellChange>> {
        let lc = name.to_lowercase();
        if !self.sheets.contains_key(&lc) {
            return Err(CallerError::UnknownSheet(name.to_string()));
        }

        let dependents: Vec<Vertex> = self
            .graph
            .vertices_with_edges()
            .into_iter()
            .filter(|v| v.0 != lc)
            .filter(|v| self.graph.outgoing(v).iter().any(|target| target.0 == lc))
            .collect();

        self.sheets.shift_remove(&lc);
        self.graph.drop_sheet(&lc);
        #[cfg(feature = "tracing")]
        tracing::info!(sheet = name, dependents = dependents.len(), "sheet deleted");

        let mut changes = Vec::new();
        for (dep_sheet, dep_addr) in dependents {
            let raw = self
                .sheet_lc(&dep_sheet)
                .and_then(|s| s.cell(&dep_addr))
                .and_then(|c| c.contents.clone());
            changes.extend(recompute::commit(self, &dep_sheet, dep_addr, raw));
        }
        self.dispatch(&changes);
        Ok(changes)
    }

    /// Renames a sheet, rewriting every formula in the workbook that
    /// qualifies a reference with the old name, then re-keying the
    /// dependency graph. Formulas with no sheet qualifier (implicitly the
    /// renamed sheet itself) need no rewriting — their meaning is
    /// unaffected by the sheet's own name.
    ///
    /// Two kinds of vertex need re-evaluating once the rename lands: the
    /// cells whose formula text was just rewritten (their own value is
    /// unaffected by the rename, but re-running the commit protocol keeps
    /// their graph edges and this commit's notification batch consistent),
    /// and any cell elsewhere that forward-declared a reference to `new`
    /// before this sheet existed under that name — those are already
    /// present in the graph as incoming-edge targets on `new_lc` and may
    /// have been sitting on `BadReference` (spec.md §4.F sheet lifecycle;
    /// mirrors `new_sheet`'s forward-declaration handling above).
    pub fn rename_sheet(&mut self, old: &str, new: &str) -> CallerResult<Vec<CellChange>> {
        let old_lc = old.to_lowercase();
        if !self.sheets.contains_key(&old_lc) {
            return Err(CallerError::UnknownSheet(old.to_string()));
        }
        self.validate_sheet_name(new)?;
        let new_lc = new.to_lowercase();
        if new_lc != old_lc && self.sheets.contains_key(&new_lc) {
            return Err(CallerError::DuplicateSheetName(new.to_string()));
        }

        let mut rewritten_vertices: Vec<Vertex> = Vec::new();
        for lc_key in self.sheets.keys().cloned().collect::<Vec<_>>() {
            let addrs: Vec<Address> = self.sheets[&lc_key]
                .iter()
                .filter_map(|(addr, c)| {
                    c.parsed
                        .as_ref()
                        .filter(|ast| crate::rewrite::references_sheet(ast, old))
                        .map(|_| *addr)
                })
                .collect();
            for addr in addrs {
                let rewritten = {
                    let sheet = &self.sheets[&lc_key];
                    let ast = sheet.cell(&addr).and_then(|c| c.parsed.as_ref()).unwrap();
                    crate::rewrite::substitute_sheet(ast, old, new)
                };
                let sheet = self.sheets.get_mut(&lc_key).unwrap();
                let cell = sheet.cell_mut_or_insert(addr);
                cell.contents = Some(crate::rewrite::format_formula(&rewritten));
                cell.parsed = Some(rewritten);
                rewritten_vertices.push((lc_key.clone(), addr));
            }
        }

        let mut sheet = self.sheets.shift_remove(&old_lc).unwrap();
        sheet.name = new.to_string();
        self.sheets.insert(new_lc.clone(), sheet);
        self.graph.rename_sheet(&old_lc, &new_lc);
        #[cfg(feature = "tracing")]
        tracing::debug!(old_name = old, new_name = new, "sheet renamed");

        let forward_declared: Vec<Vertex> = self
            .graph
            .vertices_with_edges()
            .into_iter()
            .filter(|v| v.0 == new_lc)
            .collect();

        let mut to_commit: Vec<Vertex> = rewritten_vertices;
        for v in forward_declared {
            if !to_commit.contains(&v) {
                to_commit.push(v);
            }
        }

        let mut changes = Vec::new();
        for (sheet_lc, addr) in to_commit {
            let raw = self
                .sheet_lc(&sheet_lc)
                .and_then(|s| s.cell(&addr))
                .and_then(|c| c.contents.clone());
            changes.extend(recompute::commit(self, &sheet_lc, addr, raw));
        }
        self.dispatch(&changes);
        Ok(changes)
    }

    /// Moves a sheet to `new_index` in workbook order (0-based).
    pub fn move_sheet(&mut self, name: &str, new_index: usize) -> CallerResult<()> {
        let lc = name.to_lowercase();
        let cur = self
            .sheets
            .get_index_of(&lc)
            .ok_or_else(|| CallerError::UnknownSheet(name.to_string()))?;
        if new_index >= self.sheets.len() {
            return Err(CallerError::IndexOutOfRange(new_index));
        }
        self.sheets.move_index(cur, new_index);
        Ok(())
    }

    /// Copies a sheet's cells (contents, not derived formulas' meaning —
    /// references keep pointing wherever they pointed before, now
    /// evaluated in the new sheet's own right) into a new sheet appended
    /// at the end of workbook order.
    pub fn copy_sheet(&mut self, name: &str, new_name: Option<String>) -> CallerResult<String> {
        let lc = name.to_lowercase();
        let source = self
            .sheets
            .get(&lc)
            .ok_or_else(|| CallerError::UnknownSheet(name.to_string()))?
            .clone();
        let new_name = match new_name {
            Some(n) => n,
            None => self.next_copy_name(&source.name),
        };
        self.validate_sheet_name(&new_name)?;
        let new_lc = new_name.to_lowercase();
        if self.sheets.contains_key(&new_lc) {
            return Err(CallerError::DuplicateSheetName(new_name));
        }

        let mut copy = source;
        copy.name = new_name.clone();
        self.sheets.insert(new_lc.clone(), copy);

        // Re-run the commit protocol for every formula cell on the copy so
        // its own outgoing edges exist under its own vertex identities
        // (the cloned `Cell`s carry stale values computed under the
        // source sheet's name).
        let addrs: Vec<Address> = self.sheets[&new_lc].iter().map(|(a, _)| *a).collect();
        let mut changes = Vec::new();
        for addr in addrs {
            let raw = self.sheets[&new_lc].cell(&addr).and_then(|c| c.contents.clone());
            changes.extend(recompute::commit(self, &new_lc, addr, raw));
        }
        self.dispatch(&changes);
        Ok(new_name)
    }

    /// Sets one cell's raw contents and runs the full commit protocol
    /// (spec.md §4.F), returning every cell whose value changed.
    pub fn set_cell_contents(
        &mut self,
        sheet: &str,
        addr: &Address,
        raw: Option<String>,
    ) -> CallerResult<Vec<CellChange>> {
        let lc = sheet.to_lowercase();
        if !self.sheets.contains_key(&lc) {
            return Err(CallerError::UnknownSheet(sheet.to_string()));
        }
        let changes = recompute::commit(self, &lc, *addr, raw);
        self.dispatch(&changes);
        Ok(changes)
    }

    /// The cell's current computed value; `Empty` for an absent cell or an
    /// unknown sheet (I3/I5: both read like a never-written cell).
    pub fn get_cell_value(&self, sheet: &str, addr: &Address) -> CellValue {
        self.sheet_lc(&sheet.to_lowercase())
            .map(|s| s.cell_value(addr))
            .unwrap_or(CellValue::Empty)
    }

    /// Moves the rectangular region `start..end` on `sheet` so its top-left
    /// corner lands at `to` (on `to_sheet`, defaulting to `sheet`); see
    /// `engine::region`.
    pub fn move_cells(
        &mut self,
        sheet: &str,
        start: Address,
        end: Address,
        to: Address,
        to_sheet: Option<&str>,
    ) -> CallerResult<Vec<CellChange>> {
        crate::region::move_cells(self, sheet, start, end, to, to_sheet)
    }

    /// Copies the rectangular region `start..end` on `sheet` so a duplicate's
    /// top-left corner lands at `to` (on `to_sheet`, defaulting to `sheet`);
    /// see `engine::region`.
    pub fn copy_cells(
        &mut self,
        sheet: &str,
        start: Address,
        end: Address,
        to: Address,
        to_sheet: Option<&str>,
    ) -> CallerResult<Vec<CellChange>> {
        crate::region::copy_cells(self, sheet, start, end, to, to_sheet)
    }

    /// Stably sorts the rows of `start..end` on `sheet` by the given 1-based,
    /// optionally-negated (descending) column offsets within the region; see
    /// `engine::region`.
    pub fn sort_region(
        &mut self,
        sheet: &str,
        start: Address,
        end: Address,
        sort_cols: &[i64],
    ) -> CallerResult<Vec<CellChange>> {
        crate::region::sort_region(self, sheet, start, end, sort_cols)
    }

    pub(crate) fn dispatch(&self, changes: &[CellChange]) {
        if changes.is_empty() {
            return;
        }
        for cb in &self.callbacks {
            let _ = catch_unwind(AssertUnwindSafe(|| cb(changes)));
        }
    }
}
