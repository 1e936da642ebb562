// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use petgraph::dot::{Config, Dot};
use petgraph::graph::{DefaultIx, EdgeIndex, NodeIndex};
use petgraph::visit::{EdgeRef, IntoNodeReferences};
use petgraph::Graph;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use crate::errors::PtaResult;
use crate::ir::call_site::{BaseCallSite, CSBaseCallSite, CSMethodId, CallKind, SiteKind};
use crate::ir::program::{MethodId, Program};
use crate::util::chunked_queue::{ChunkedQueue, QueueReader};

/// Unique identifiers for call graph nodes.
pub type CGNodeId = NodeIndex<DefaultIx>;
/// Unique identifiers for call graph edges.
pub type CGEdgeId = EdgeIndex<DefaultIx>;
// Context-sensitive call graph.
pub type CSCallGraph = CallGraph<CSMethodId, CSBaseCallSite>;

pub trait CGFunction: Copy + Clone + PartialEq + Eq + Hash + Debug {
    fn method(&self) -> MethodId;

    fn dot_label(&self, program: &Program) -> String;
}

impl CGFunction for MethodId {
    fn method(&self) -> MethodId {
        *self
    }

    fn dot_label(&self, program: &Program) -> String {
        program.method_name(*self)
    }
}

impl CGFunction for CSMethodId {
    fn method(&self) -> MethodId {
        self.method
    }

    fn dot_label(&self, program: &Program) -> String {
        format!("{} [{}]", program.method_name(self.method), self.cid.index())
    }
}

pub trait CGCallSite: Copy + Clone + PartialEq + Eq + Hash + Debug {
    fn dot_label(&self) -> String;
}

impl CGCallSite for BaseCallSite {
    fn dot_label(&self) -> String {
        match self.site_kind {
            SiteKind::Invoke => format!("#{}", self.stmt),
            kind => format!("#{} {:?}", self.stmt, kind),
        }
    }
}

impl CGCallSite for CSBaseCallSite {
    fn dot_label(&self) -> String {
        match self.site_kind {
            SiteKind::Invoke => format!("#{}", self.stmt),
            kind => format!("#{} {:?}", self.stmt, kind),
        }
    }
}

#[derive(Debug)]
pub struct CallGraphNode<F: CGFunction> {
    pub(crate) func: F,
}

impl<F: CGFunction> CallGraphNode<F> {
    pub fn new(func: F) -> Self {
        CallGraphNode { func }
    }
}

#[derive(Debug)]
pub struct CallGraphEdge<S: CGCallSite> {
    pub(crate) callsite: S,
    pub(crate) kind: CallKind,
}

impl<S: CGCallSite> CallGraphEdge<S> {
    pub fn new(callsite: S, kind: CallKind) -> Self {
        CallGraphEdge { callsite, kind }
    }
}

pub struct CallGraph<F: CGFunction, S: CGCallSite> {
    /// The graph structure capturing call relationships.
    pub graph: Graph<CallGraphNode<F>, CallGraphEdge<S>>,
    /// A map from functions to their corresponding call graph nodes.
    pub func_nodes: HashMap<F, CGNodeId>,
    /// A map from call sites to call graph edges.
    pub callsite_to_edges: HashMap<S, HashSet<CGEdgeId>>,
    /// Every node in the order it became reachable.
    pub(crate) reach_funcs: ChunkedQueue<F>,
}

impl<F: CGFunction, S: CGCallSite> Default for CallGraph<F, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: CGFunction, S: CGCallSite> CallGraph<F, S> {
    pub fn new() -> Self {
        CallGraph {
            graph: Graph::<CallGraphNode<F>, CallGraphEdge<S>>::new(),
            func_nodes: HashMap::new(),
            callsite_to_edges: HashMap::new(),
            reach_funcs: ChunkedQueue::new(),
        }
    }

    /// Add a new node to the call graph. Returns false if it was already reachable.
    pub fn add_node(&mut self, func: F) -> bool {
        if self.func_nodes.contains_key(&func) {
            return false;
        }
        self.get_or_insert_node(func);
        true
    }

    /// Helper function to get a node or insert a new
    /// node if it does not exist in the map.
    fn get_or_insert_node(&mut self, func: F) -> CGNodeId {
        match self.func_nodes.entry(func) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                self.reach_funcs.push(func);
                let node_id = self.graph.add_node(CallGraphNode::new(func));
                *v.insert(node_id)
            }
        }
    }

    #[inline]
    pub fn contains_node(&self, func: &F) -> bool {
        self.func_nodes.contains_key(func)
    }

    /// Returns all callees of a call site.
    pub fn get_callees(&self, callsite: &S) -> HashSet<F> {
        self.callsite_to_edges
            .get(callsite)
            .into_iter()
            .flatten()
            .filter_map(|edge_id| self.graph.edge_endpoints(*edge_id))
            .map(|(_, target)| self.graph[target].func)
            .collect()
    }

    /// Returns true if an edge to the callee already existed for the callsite.
    pub fn has_edge(&self, callsite: &S, callee: F) -> bool {
        self.callsite_to_edges.get(callsite).map_or(false, |edges| {
            edges.iter().any(|edge_id| {
                self.graph
                    .edge_endpoints(*edge_id)
                    .map_or(false, |(_, target)| self.graph[target].func == callee)
            })
        })
    }

    /// Adds a new edge to the call graph.
    /// The edge is a call from `caller` to `callee` at `callsite`.
    /// Returns false if the edge already existed, and true otherwise.
    pub fn add_edge(&mut self, callsite: S, caller: F, callee: F, kind: CallKind) -> bool {
        if self.has_edge(&callsite, callee) {
            return false;
        }
        let caller_node = self.get_or_insert_node(caller);
        let callee_node = self.get_or_insert_node(callee);
        let edge_id = self
            .graph
            .add_edge(caller_node, callee_node, CallGraphEdge::new(callsite, kind));
        self.callsite_to_edges
            .entry(callsite)
            .or_default()
            .insert(edge_id);
        true
    }

    #[inline]
    pub fn reach_funcs(&self) -> &ChunkedQueue<F> {
        &self.reach_funcs
    }

    /// Returns a fresh reader over the reachable functions.
    #[inline]
    pub fn reach_funcs_reader(&self) -> QueueReader {
        self.reach_funcs.reader()
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Iterates over `(caller, callsite, callee, kind)` for every edge.
    pub fn edges(&self) -> impl Iterator<Item = (F, S, F, CallKind)> + '_ {
        self.graph.edge_references().map(move |edge| {
            let weight = edge.weight();
            (
                self.graph[edge.source()].func,
                weight.callsite,
                self.graph[edge.target()].func,
                weight.kind,
            )
        })
    }

    /// Produce a dot file representation of the call graph
    /// for displaying with Graphviz.
    pub fn to_dot(&self, program: &Program, dot_path: &std::path::Path) -> PtaResult<()> {
        let escape = |s: String| s.replace('"', "\\\"");
        let output = format!(
            "{:?}",
            Dot::with_attr_getters(
                &self.graph,
                &[Config::NodeNoLabel, Config::EdgeNoLabel],
                &|_, edge| format!(
                    "label = \"{} ({:?})\"",
                    edge.weight().callsite.dot_label(),
                    edge.weight().kind
                ),
                &|_, (_, node)| format!("label = \"{}\"", escape(node.func.dot_label(program))),
            )
        );
        std::fs::write(dot_path, output)?;
        Ok(())
    }

    /// Projects the graph onto methods, merging all contexts.
    pub fn methods(&self) -> HashSet<MethodId> {
        self.graph.node_references().map(|(_, node)| node.func.method()).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::context::ContextId;

    fn method(i: usize) -> CSMethodId {
        CSMethodId::new(ContextId::EMPTY, MethodId::new(i))
    }

    #[test]
    fn edges_are_deduplicated_per_call_site() {
        let mut cg = CSCallGraph::new();
        assert!(cg.add_node(method(0)));
        assert!(!cg.add_node(method(0)));
        let site = CSBaseCallSite::new(method(0), 3);
        assert!(cg.add_edge(site, method(0), method(1), CallKind::Virtual));
        assert!(!cg.add_edge(site, method(0), method(1), CallKind::Virtual));
        assert!(cg.add_edge(site, method(0), method(2), CallKind::Virtual));
        assert_eq!(cg.edge_count(), 2);
        assert_eq!(
            cg.get_callees(&site),
            [method(1), method(2)].into_iter().collect::<HashSet<_>>()
        );
        assert!(cg.get_callees(&CSBaseCallSite::new(method(0), 4)).is_empty());

        // An initializer triggered by the same statement keeps its own site.
        let clinit_site = CSBaseCallSite::new_implicit(method(0), 3, SiteKind::Clinit);
        assert!(cg.add_edge(clinit_site, method(0), method(1), CallKind::Clinit));
        assert_eq!(cg.get_callees(&site).len(), 2);
        assert_eq!(cg.get_callees(&clinit_site), [method(1)].into_iter().collect::<HashSet<_>>());
        assert_eq!(clinit_site.dot_label(), "#3 Clinit");
    }

    #[test]
    fn reachable_functions_are_logged_in_order() {
        let mut cg = CSCallGraph::new();
        cg.add_node(method(0));
        let mut reader = cg.reach_funcs_reader();
        assert_eq!(reader.next_copied(cg.reach_funcs()), Some(method(0)));
        cg.add_edge(CSBaseCallSite::new(method(0), 0), method(0), method(5), CallKind::Static);
        cg.add_edge(CSBaseCallSite::new(method(5), 1), method(5), method(0), CallKind::Static);
        assert_eq!(reader.next_copied(cg.reach_funcs()), Some(method(5)));
        assert_eq!(reader.next_copied(cg.reach_funcs()), None);
        assert_eq!(cg.methods().len(), 2);
    }
}
