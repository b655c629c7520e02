//! FILENAME: engine/src/sheet.rs
//! PURPOSE: A single named sheet: a sparse mapping from `Address` to `Cell`
//! plus the tight bounding-box `extent` of its non-empty contents.
//! CONTEXT: The sparse storage representation itself is specified only
//! abstractly ("a sparse mapping from cell address to cell record"); a
//! `HashMap` is the obvious, idiomatic choice and is what the teacher's
//! grid module used before this crate moved to a multi-sheet model.

use crate::address::{Address, Region};
use crate::cell::Cell;
use std::collections::HashMap;

/// One sheet of a workbook: a name (original case preserved; lookups are
/// case-insensitive at the `Workbook` level) and a sparse cell store.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    cells: HashMap<Address, Cell>,
    extent: Option<Region>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Sheet {
            name: name.into(),
            cells: HashMap::new(),
            extent: None,
        }
    }

    pub fn cell(&self, addr: &Address) -> Option<&Cell> {
        self.cells.get(addr)
    }

    pub fn cell_mut_or_insert(&mut self, addr: Address) -> &mut Cell {
        self.cells.entry(addr).or_insert_with(Cell::new)
    }

    /// The cell's current value, or `Empty` if the address has never been
    /// written (I3/I5: an absent cell behaves like an `Empty` one).
    pub fn cell_value(&self, addr: &Address) -> crate::value::CellValue {
        self.cells
            .get(addr)
            .map(|c| c.value.clone())
            .unwrap_or(crate::value::CellValue::Empty)
    }

    /// Removes a cell's record entirely (used when a vertex has no
    /// remaining reason to exist — see `Sheet::drop_if_unused`).
    pub fn remove(&mut self, addr: &Address) {
        self.cells.remove(addr);
        self.recompute_extent();
    }

    pub fn extent(&self) -> Option<Region> {
        self.extent
    }

    /// Grows the tight extent to include `addr`, called whenever `addr`'s
    /// `contents` becomes non-`None`.
    pub fn grow_extent(&mut self, addr: Address) {
        self.extent = Some(match self.extent {
            Some(r) => Region::new(
                Address::new(r.top_left.col.min(addr.col), r.top_left.row.min(addr.row)),
                Address::new(
                    r.bottom_right.col.max(addr.col),
                    r.bottom_right.row.max(addr.row),
                ),
            ),
            None => Region::new(addr, addr),
        });
    }

    /// Recomputes the extent from scratch by scanning all cells with
    /// non-`None` contents (I4: the extent shrinks when the boundary cell's
    /// contents are erased). Called after any removal that could have been
    /// on the boundary; a full scan is O(n) but only runs on erase, not on
    /// every write.
    pub fn recompute_extent(&mut self) {
        let mut bounds: Option<Region> = None;
        for (addr, cell) in self.cells.iter() {
            if cell.contents.is_some() {
                bounds = Some(match bounds {
                    Some(r) => Region::new(
                        Address::new(r.top_left.col.min(addr.col), r.top_left.row.min(addr.row)),
                        Address::new(
                            r.bottom_right.col.max(addr.col),
                            r.bottom_right.row.max(addr.row),
                        ),
                    ),
                    None => Region::new(*addr, *addr),
                });
            }
        }
        self.extent = bounds;
    }

    /// Drops the cell's record if it has no content and is not kept alive
    /// by being a dependency-graph vertex with incoming edges. Call after
    /// clearing `contents` on a cell; `has_incoming` should reflect the
    /// graph's current state for this address.
    pub fn drop_if_unused(&mut self, addr: &Address, has_incoming: bool) {
        if has_incoming {
            return;
        }
        if let Some(cell) = self.cells.get(addr) {
            if cell.is_blank() {
                self.cells.remove(addr);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Cell)> {
        self.cells.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
