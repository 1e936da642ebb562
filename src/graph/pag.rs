// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use log::*;
use petgraph::graph::{DefaultIx, EdgeIndex, NodeIndex};
use petgraph::Graph;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use super::method_pag::MethodPAG;
use crate::errors::{PtaError, PtaResult};
use crate::ir::context::ContextId;
use crate::ir::path::{Path, PathEnum};
use crate::ir::program::{FieldSig, MethodId, Program};
use crate::util::bit_vec::Idx;
use crate::util::chunked_queue::{ChunkedQueue, QueueReader};

// Unique identifiers for graph node and edges.
pub type PAGNodeId = NodeIndex<DefaultIx>;
pub type PAGEdgeId = EdgeIndex<DefaultIx>;

impl Idx for PAGNodeId {
    #[inline]
    fn new(idx: usize) -> Self {
        NodeIndex::new(idx)
    }

    #[inline]
    fn index(self) -> usize {
        NodeIndex::index(self)
    }
}

/// A pointer or an abstract object, qualified by a context where it has one.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum PAGNode {
    /// A local variable, return value, throw variable or static field.
    Var { cid: ContextId, path: Rc<Path> },
    /// An abstract object; `cid` is its heap context.
    Alloc { cid: ContextId, path: Rc<Path> },
    /// `base.field` where base is a variable node.
    FieldRef { base: PAGNodeId, field: FieldSig },
    /// The value of `field` across all objects.
    FieldVal { field: FieldSig },
    /// The `field_val` slot of one abstract object.
    ContextField { heap: PAGNodeId, field_val: PAGNodeId },
}

impl PAGNode {
    #[inline]
    pub fn is_var(&self) -> bool {
        matches!(self, PAGNode::Var { .. })
    }

    #[inline]
    pub fn is_alloc(&self) -> bool {
        matches!(self, PAGNode::Alloc { .. })
    }

    /// Returns the raw path of a variable or allocation node.
    pub fn path(&self) -> Option<&Rc<Path>> {
        match self {
            PAGNode::Var { path, .. } | PAGNode::Alloc { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn cid(&self) -> Option<ContextId> {
        match self {
            PAGNode::Var { cid, .. } | PAGNode::Alloc { cid, .. } => Some(*cid),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PAGEdgeKind {
    /// `x = new T`: from an allocation node to a variable.
    Alloc,
    /// `x = y`: between variables and object field slots.
    Simple,
    /// `x = y.f`: from a field reference to a variable.
    Load,
    /// `x.f = y`: from a variable to a field reference.
    Store,
}

#[derive(Debug)]
pub struct PAGEdge {
    pub kind: PAGEdgeKind,
}

type EdgeMap = HashMap<PAGNodeId, BTreeSet<PAGEdgeId>>;

pub struct PAG {
    /// The graph structure capturing assignment relations between nodes.
    pub(crate) graph: Graph<PAGNode, PAGEdge>,
    /// Canonical node of every qualified pointer, so that materialization is idempotent.
    pub(crate) values: HashMap<PAGNode, PAGNodeId>,
    /// The constraint template of each method, built on first request.
    pub(crate) method_pags: HashMap<MethodId, Rc<MethodPAG>>,
    /// The contexts each method template has been materialized under.
    pub(crate) materialized: HashMap<MethodId, HashSet<ContextId>>,
    /// Field references dereferencing each variable node.
    pub(crate) field_refs: HashMap<PAGNodeId, BTreeSet<PAGNodeId>>,
    /// Every edge in insertion order. Consumers replay it with their own reader.
    pub(crate) new_edges: ChunkedQueue<PAGEdgeId>,

    pub(crate) alloc_out_edges: EdgeMap,
    pub(crate) simple_in_edges: EdgeMap,
    pub(crate) simple_out_edges: EdgeMap,
    pub(crate) load_out_edges: EdgeMap,
    pub(crate) store_in_edges: EdgeMap,
}

impl Default for PAG {
    fn default() -> Self {
        Self::new()
    }
}

impl PAG {
    /// Constructor
    pub fn new() -> Self {
        PAG {
            graph: Graph::<PAGNode, PAGEdge>::new(),
            values: HashMap::new(),
            method_pags: HashMap::new(),
            materialized: HashMap::new(),
            field_refs: HashMap::new(),
            new_edges: ChunkedQueue::new(),

            alloc_out_edges: EdgeMap::new(),
            simple_in_edges: EdgeMap::new(),
            simple_out_edges: EdgeMap::new(),
            load_out_edges: EdgeMap::new(),
            store_in_edges: EdgeMap::new(),
        }
    }

    /// Returns a reference to the pag graph.
    #[inline]
    pub fn graph(&self) -> &Graph<PAGNode, PAGEdge> {
        &self.graph
    }

    /// Returns the node for the given node_id.
    #[inline]
    pub fn node(&self, node_id: PAGNodeId) -> &PAGNode {
        &self.graph[node_id]
    }

    /// Returns the node_id for the given node if it has been created.
    pub fn get_node_id(&self, node: &PAGNode) -> Option<PAGNodeId> {
        self.values.get(node).copied()
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the source, target and kind of an edge.
    pub fn edge(&self, edge_id: PAGEdgeId) -> Option<(PAGNodeId, PAGNodeId, PAGEdgeKind)> {
        let (src, dst) = self.graph.edge_endpoints(edge_id)?;
        let kind = self.graph.edge_weight(edge_id)?.kind;
        Some((src, dst, kind))
    }

    #[inline]
    pub fn new_edges(&self) -> &ChunkedQueue<PAGEdgeId> {
        &self.new_edges
    }

    #[inline]
    pub fn new_edges_reader(&self) -> QueueReader {
        self.new_edges.reader()
    }

    /// Helper function to get a node or insert a new
    /// node if it does not exist in the map.
    pub fn get_or_insert_node(&mut self, node: PAGNode) -> PAGNodeId {
        match self.values.entry(node) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                let node_id = self.graph.add_node(v.key().clone());
                *v.insert(node_id)
            }
        }
    }

    /// Returns the canonical node of `path` qualified by `cid`, creating it on
    /// first request. For heap paths `cid` is the heap context. Static fields
    /// and the empty array object are never qualified.
    pub fn parameterize(&mut self, path: &Rc<Path>, cid: ContextId) -> PAGNodeId {
        if let PathEnum::FieldRef { base, field } = &path.value {
            let base_id = self.parameterize(base, cid);
            let field_ref = self.get_or_insert_node(PAGNode::FieldRef {
                base: base_id,
                field: *field,
            });
            self.field_refs.entry(base_id).or_default().insert(field_ref);
            return field_ref;
        }
        let cid = if path.is_global() { ContextId::EMPTY } else { cid };
        if path.is_heap() {
            self.get_or_insert_node(PAGNode::Alloc { cid, path: path.clone() })
        } else {
            self.get_or_insert_node(PAGNode::Var { cid, path: path.clone() })
        }
    }

    /// Returns the canonical field value node of `field`.
    pub fn make_field_val_node(&mut self, field: FieldSig) -> PAGNodeId {
        self.get_or_insert_node(PAGNode::FieldVal { field })
    }

    /// Refines the field value node of `field` by the abstract object `heap`,
    /// giving the slot holding `heap.field`.
    pub fn make_context_field_node(&mut self, heap: PAGNodeId, field: FieldSig) -> PAGNodeId {
        let field_val = self.make_field_val_node(field);
        self.get_or_insert_node(PAGNode::ContextField { heap, field_val })
    }

    /// Returns the base and field of a field reference node.
    pub fn field_ref_parts(&self, node_id: PAGNodeId) -> Option<(PAGNodeId, FieldSig)> {
        match self.node(node_id) {
            PAGNode::FieldRef { base, field } => Some((*base, *field)),
            _ => None,
        }
    }

    /// Field references `base.f` materialized so far for a variable node.
    pub fn field_refs_of(&self, base: PAGNodeId) -> Vec<PAGNodeId> {
        self.field_refs
            .get(&base)
            .map(|refs| refs.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns true if `node_id` is the abstract object standing for all empty arrays.
    pub fn is_empty_array(&self, node_id: PAGNodeId) -> bool {
        matches!(self.node(node_id), PAGNode::Alloc { path, .. } if path.is_empty_array())
    }

    /// Returns true if the edge from `src` to `dst` of the `kind` exists.
    pub fn contains_edge(&self, src: PAGNodeId, dst: PAGNodeId, kind: PAGEdgeKind) -> bool {
        self.graph
            .edges_connecting(src, dst)
            .any(|edge| edge.weight().kind == kind)
    }

    /// Adds an edge from `src` to `dst`, classifying it by the kinds of its endpoints.
    /// Returns the edge id if this edge is newly added to the graph.
    pub fn add_edge(&mut self, src: PAGNodeId, dst: PAGNodeId) -> PtaResult<Option<PAGEdgeId>> {
        let kind = match (self.node(src), self.node(dst)) {
            (PAGNode::Alloc { .. }, PAGNode::Var { .. }) => PAGEdgeKind::Alloc,
            (
                PAGNode::Var { .. } | PAGNode::ContextField { .. },
                PAGNode::Var { .. } | PAGNode::ContextField { .. },
            ) => PAGEdgeKind::Simple,
            (PAGNode::FieldRef { .. }, PAGNode::Var { .. }) => PAGEdgeKind::Load,
            (PAGNode::Var { .. }, PAGNode::FieldRef { .. }) => PAGEdgeKind::Store,
            (src_node, dst_node) => {
                return Err(PtaError::MalformedEdge {
                    src: format!("{:?}", src_node),
                    dst: format!("{:?}", dst_node),
                })
            }
        };
        if self.contains_edge(src, dst, kind) {
            return Ok(None);
        }
        let edge_id = self.graph.add_edge(src, dst, PAGEdge { kind });
        match kind {
            PAGEdgeKind::Alloc => {
                self.alloc_out_edges.entry(src).or_default().insert(edge_id);
            }
            PAGEdgeKind::Simple => {
                self.simple_out_edges.entry(src).or_default().insert(edge_id);
                self.simple_in_edges.entry(dst).or_default().insert(edge_id);
            }
            PAGEdgeKind::Load => {
                self.load_out_edges.entry(src).or_default().insert(edge_id);
            }
            PAGEdgeKind::Store => {
                self.store_in_edges.entry(dst).or_default().insert(edge_id);
            }
        }
        trace!("new {:?} edge {:?} -> {:?}", kind, src, dst);
        self.new_edges.push(edge_id);
        Ok(Some(edge_id))
    }

    fn targets(&self, edges: Option<&BTreeSet<PAGEdgeId>>) -> Vec<PAGNodeId> {
        edges
            .into_iter()
            .flatten()
            .filter_map(|edge| self.graph.edge_endpoints(*edge).map(|(_, dst)| dst))
            .collect()
    }

    fn sources(&self, edges: Option<&BTreeSet<PAGEdgeId>>) -> Vec<PAGNodeId> {
        edges
            .into_iter()
            .flatten()
            .filter_map(|edge| self.graph.edge_endpoints(*edge).map(|(src, _)| src))
            .collect()
    }

    /// Nodes reachable from `node_id` by one simple edge.
    pub fn simple_lookup(&self, node_id: PAGNodeId) -> Vec<PAGNodeId> {
        self.targets(self.simple_out_edges.get(&node_id))
    }

    /// Nodes with a simple edge into `node_id`.
    pub fn simple_inv_lookup(&self, node_id: PAGNodeId) -> Vec<PAGNodeId> {
        self.sources(self.simple_in_edges.get(&node_id))
    }

    /// Variables stored into the field reference.
    pub fn store_inv_lookup(&self, field_ref: PAGNodeId) -> Vec<PAGNodeId> {
        self.sources(self.store_in_edges.get(&field_ref))
    }

    /// Variables loaded from the field reference.
    pub fn load_lookup(&self, field_ref: PAGNodeId) -> Vec<PAGNodeId> {
        self.targets(self.load_out_edges.get(&field_ref))
    }

    /// Variables an abstract object is directly assigned to.
    pub fn alloc_lookup(&self, heap: PAGNodeId) -> Vec<PAGNodeId> {
        self.targets(self.alloc_out_edges.get(&heap))
    }

    /// Returns the constraint template of `method`, building it on first request.
    pub fn get_method_pag(&mut self, program: &Program, method: MethodId) -> PtaResult<Rc<MethodPAG>> {
        if let Some(mpag) = self.method_pags.get(&method) {
            return Ok(mpag.clone());
        }
        let mpag = Rc::new(MethodPAG::build(program, method)?);
        debug!(
            "Built method PAG for {} with {} edges",
            program.method_name(method),
            mpag.internal_edges().len()
        );
        self.method_pags.insert(method, mpag.clone());
        Ok(mpag)
    }

    /// Records that `method` is materialized under `cid`. Returns false if it already was.
    pub fn mark_materialized(&mut self, method: MethodId, cid: ContextId) -> bool {
        self.materialized.entry(method).or_default().insert(cid)
    }

    /// Contexts `method` has been materialized under.
    pub fn materialized_contexts(&self, method: MethodId) -> Vec<ContextId> {
        let mut cids: Vec<ContextId> = self
            .materialized
            .get(&method)
            .map(|cids| cids.iter().copied().collect())
            .unwrap_or_default();
        cids.sort_unstable();
        cids
    }

    /// Renders a node with program names.
    pub fn node_display(&self, program: &Program, node_id: PAGNodeId) -> String {
        match self.node(node_id) {
            PAGNode::Var { cid, path } | PAGNode::Alloc { cid, path } => {
                format!("{}[{}]", path.display(program), cid.index())
            }
            PAGNode::FieldRef { base, field } => {
                format!("{}.{}", self.node_display(program, *base), field_display(program, *field))
            }
            PAGNode::FieldVal { field } => format!("*.{}", field_display(program, *field)),
            PAGNode::ContextField { heap, field_val } => match self.node(*field_val) {
                PAGNode::FieldVal { field } => {
                    format!("{}.{}", self.node_display(program, *heap), field_display(program, *field))
                }
                _ => format!("{}.?", self.node_display(program, *heap)),
            },
        }
    }
}

pub(crate) fn field_display(program: &Program, field: FieldSig) -> String {
    match field {
        FieldSig::Field(f) => program.field(f).name.clone(),
        FieldSig::ArrayElement => "[*]".to_string(),
    }
}
