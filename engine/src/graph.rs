//! FILENAME: engine/src/graph.rs
//! PURPOSE: The bidirectional (sheet, addr) dependency graph: `outgoing[v]`
//! are the cells `v`'s formula references, `incoming[v]` are the cells
//! that reference `v`.
//! CONTEXT: Generalizes a single-sheet `precedents`/`dependents` map shape
//! to multi-sheet `(lower(sheet), addr)` keys, and keeps edges as a
//! multiset rather than a `HashSet` — duplicate references are permitted
//! and must be removed symmetrically, which only makes sense if an edge
//! can occur more than once. `Workbook` is the layer responsible for
//! deduplicating distinct references, not the graph itself.

use crate::address::Address;
use std::collections::HashMap;

/// A graph vertex: a sheet name already normalized to lowercase, paired
/// with a 0-based cell address. Vertices may exist for addresses whose
/// cell is `Empty` and for sheets that do not (yet) exist — both are
/// first-class, since a forward-declared reference needs somewhere to
/// record its incoming edge before the target exists.
pub type Vertex = (String, Address);

/// Bidirectional edge map over `Vertex`. Lookups on vertices with no
/// recorded edges return an empty slice rather than failing.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    outgoing: HashMap<Vertex, Vec<Vertex>>,
    incoming: HashMap<Vertex, Vec<Vertex>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph {
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
        }
    }

    /// Adds one edge `u -> v`. Symmetrically records `u` in `incoming[v]`.
    /// Does not deduplicate — callers that need a "distinct references"
    /// guarantee (i.e. `recompute::commit`) dedup before calling this.
    pub fn add_edge(&mut self, u: Vertex, v: Vertex) {
        self.outgoing.entry(u.clone()).or_default().push(v.clone());
        self.incoming.entry(v).or_default().push(u);
    }

    /// Removes one occurrence of the edge `u -> v`, if present. Removes the
    /// matching `u` entry from `incoming[v]` regardless of list ordering.
    pub fn remove_edge(&mut self, u: &Vertex, v: &Vertex) {
        if let Some(list) = self.outgoing.get_mut(u) {
            if let Some(pos) = list.iter().position(|x| x == v) {
                list.remove(pos);
            }
            if list.is_empty() {
                self.outgoing.remove(u);
            }
        }
        if let Some(list) = self.incoming.get_mut(v) {
            if let Some(pos) = list.iter().position(|x| x == u) {
                list.remove(pos);
            }
            if list.is_empty() {
                self.incoming.remove(v);
            }
        }
    }

    pub fn outgoing(&self, u: &Vertex) -> &[Vertex] {
        self.outgoing.get(u).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn incoming(&self, v: &Vertex) -> &[Vertex] {
        self.incoming.get(v).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Removes every outgoing edge from `u`, returning the distinct set of
    /// targets that were removed (used by `recompute::commit` step 5 to
    /// know what to diff against the freshly parsed reference set).
    pub fn clear_outgoing(&mut self, u: &Vertex) -> Vec<Vertex> {
        let old = self.outgoing.remove(u).unwrap_or_default();
        for v in &old {
            self.remove_one_incoming(v, u);
        }
        old
    }

    fn remove_one_incoming(&mut self, v: &Vertex, u: &Vertex) {
        if let Some(list) = self.incoming.get_mut(v) {
            if let Some(pos) = list.iter().position(|x| x == u) {
                list.remove(pos);
            }
            if list.is_empty() {
                self.incoming.remove(v);
            }
        }
    }

    /// Drops every vertex belonging to `sheet` (lowercased) from both maps.
    /// Used by `Workbook::del_sheet`: cells of the deleted sheet are gone,
    /// but vertices that are *targets* of edges from other sheets survive
    /// this call implicitly, because only vertices whose sheet matches are
    /// removed as keys — edges pointing *into* a removed vertex from a
    /// surviving sheet are pruned from that sheet's outgoing list too, so
    /// the graph never references a dangling key.
    pub fn drop_sheet(&mut self, sheet: &str) {
        let to_remove: Vec<Vertex> = self
            .outgoing
            .keys()
            .chain(self.incoming.keys())
            .filter(|(s, _)| s == sheet)
            .cloned()
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        for v in &to_remove {
            self.clear_outgoing(v);
        }
        // Any remaining edges targeting a vertex of `sheet` (from a
        // surviving formula elsewhere) must also be removed, since
        // `del_sheet` retains the *vertex* (for BadReference re-evaluation
        // of dependents) but the dependents' outgoing edge to it is
        // unaffected by this call — callers re-wire via a fresh commit.
        for v in to_remove {
            self.incoming.remove(&v);
        }
    }

    /// All vertices with either outgoing or incoming edges, deduplicated.
    pub fn vertices_with_edges(&self) -> std::collections::HashSet<Vertex> {
        self.outgoing
            .keys()
            .cloned()
            .chain(self.incoming.keys().cloned())
            .collect()
    }

    /// Re-keys every vertex belonging to `old` (lowercased) to `new`
    /// (lowercased), both as map keys and wherever they appear inside
    /// another vertex's edge list. Used by `Workbook::rename_sheet`.
    pub fn rename_sheet(&mut self, old: &str, new: &str) {
        let rekey = |v: &Vertex| -> Vertex {
            if v.0 == old {
                (new.to_string(), v.1)
            } else {
                v.clone()
            }
        };

        for map in [&mut self.outgoing, &mut self.incoming] {
            let moved: Vec<(Vertex, Vec<Vertex>)> = map
                .keys()
                .filter(|k| k.0 == old)
                .map(|k| (k.clone(), map[k].clone()))
                .collect();
            for (k, _) in &moved {
                map.remove(k);
            }
            for (k, edges) in moved {
                map.insert(rekey(&k), edges.iter().map(rekey).collect());
            }
            for edges in map.values_mut() {
                for v in edges.iter_mut() {
                    if v.0 == old {
                        v.0 = new.to_string();
                    }
                }
            }
        }
    }
}
