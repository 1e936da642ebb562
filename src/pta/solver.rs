// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! The key component of our pointer analysis.
//!
//! The solver propagates points-to sets along the PAG until a fixpoint. Only
//! the part of a set that was not yet propagated (its diff) travels along the
//! outgoing edges of a node. Whatever is discovered on the way (reachable
//! methods, call sites, throw sites, edges) lands in append-only logs that
//! the solver drains between two worklist steps, pushing the already
//! propagated sets through anything it missed.

use log::*;
use std::collections::BTreeSet;
use std::rc::Rc;

use super::context_strategy::ContextStrategy;
use super::{DiffPTDataTy, NodeId, PointsTo};
use crate::builder::call_graph_builder::{invoke_at, CallGraphBuilder};
use crate::builder::exception_handler::ExceptionHandler;
use crate::errors::{PtaError, PtaResult};
use crate::graph::pag::{PAGEdgeId, PAGEdgeKind, PAG};
use crate::ir::call_site::{
    BaseCallSite, CSBaseCallSite, CSMethodId, CallKind, ExceptionThrowSite, SiteKind, VirtualCallSite,
};
use crate::ir::context::ContextId;
use crate::ir::path::Path;
use crate::ir::program::{FieldSig, MethodId, Program, Stmt};
use crate::pts_set::points_to::PointsToSet;
use crate::util::chunked_queue::QueueReader;
use crate::util::options::{AnalysisOptions, ClinitMode};

pub struct Solver<'pta, S: ContextStrategy> {
    program: &'pta Program,
    options: &'pta AnalysisOptions,
    pag: &'pta mut PAG,
    pt_data: &'pta mut DiffPTDataTy,
    cgb: &'pta mut CallGraphBuilder,
    eh: &'pta mut ExceptionHandler,
    strategy: &'pta mut S,

    /// Nodes with a non-empty diff, popped in node id order.
    worklist: BTreeSet<NodeId>,

    reach_methods_reader: QueueReader,
    new_edges_reader: QueueReader,
    throw_sites_reader: QueueReader,
    virtual_call_sites_reader: QueueReader,
}

impl<'pta, S: ContextStrategy> Solver<'pta, S> {
    /// Constructor. The readers start at the beginning of every log, so a new
    /// solver replays everything recorded so far.
    pub fn new(
        program: &'pta Program,
        options: &'pta AnalysisOptions,
        pag: &'pta mut PAG,
        pt_data: &'pta mut DiffPTDataTy,
        cgb: &'pta mut CallGraphBuilder,
        eh: &'pta mut ExceptionHandler,
        strategy: &'pta mut S,
    ) -> Self {
        let reach_methods_reader = cgb.reach_methods_reader();
        let new_edges_reader = pag.new_edges_reader();
        let throw_sites_reader = eh.throw_sites_reader();
        let virtual_call_sites_reader = cgb.virtual_call_sites_reader();
        Solver {
            program,
            options,
            pag,
            pt_data,
            cgb,
            eh,
            strategy,
            worklist: BTreeSet::new(),
            reach_methods_reader,
            new_edges_reader,
            throw_sites_reader,
            virtual_call_sites_reader,
        }
    }

    /// Propagates until the worklist and all discovery logs are empty.
    pub fn propagate(&mut self) -> PtaResult<()> {
        self.init()?;
        while self.step()? {}
        Ok(())
    }

    /// Materializes the methods known to be reachable and seeds the worklist.
    pub fn init(&mut self) -> PtaResult<()> {
        self.process_reach_methods()?;
        self.activate_constraints()
    }

    /// Processes one node of the worklist. Returns false once the worklist is empty.
    pub fn step(&mut self) -> PtaResult<bool> {
        match self.worklist.pop_first() {
            Some(node) => {
                self.process_node(node)?;
                self.activate_constraints()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The points-to set of `node` as computed so far.
    pub fn points_to(&self, node: NodeId) -> PointsTo<NodeId> {
        self.pt_data.get_pts(node)
    }

    #[inline]
    pub fn pag(&self) -> &PAG {
        &*self.pag
    }

    fn process_node(&mut self, node: NodeId) -> PtaResult<()> {
        let diff = match self.pt_data.get_diff_pts(node) {
            Some(diff) if !diff.is_empty() => diff.clone(),
            _ => return Ok(()),
        };
        for dst in self.pag.simple_lookup(node) {
            if self.pt_data.union_pts_to(dst, &diff) {
                self.worklist.insert(dst);
            }
        }

        if self.pag.node(node).is_var() {
            let heaps: Vec<NodeId> = diff.iter().collect();
            self.handle_throw_sites(node, &heaps)?;
            self.handle_load_and_store(node, &heaps)?;
            self.handle_virtual_calls(node, &heaps)?;
            self.process_reach_methods()?;
        }

        self.pt_data.flush_elems(node, &diff);
        if self.pt_data.has_diff(node) {
            self.worklist.insert(node);
        }
        Ok(())
    }

    /// Drains the discovery logs until none of them yields anything new.
    fn activate_constraints(&mut self) -> PtaResult<()> {
        loop {
            let mut changed = false;
            while let Some(site) = self
                .virtual_call_sites_reader
                .next_cloned(self.cgb.virtual_call_sites())
            {
                changed = true;
                // Sites found late must also see the objects that reached the receiver earlier.
                let heaps = self.old_pts(site.receiver);
                self.dispatch_virtual_call(&site, &heaps)?;
            }
            while let Some(method) = self.reach_methods_reader.next_copied(self.cgb.reach_methods()) {
                changed = true;
                self.process_stmts(method)?;
            }
            while let Some(site) = self.throw_sites_reader.next_cloned(self.eh.throw_sites()) {
                changed = true;
                let heaps = self.old_pts(site.throw_node);
                self.dispatch_exception(&site, &heaps)?;
            }
            while let Some(edge) = self.new_edges_reader.next_copied(self.pag.new_edges()) {
                changed = true;
                self.process_new_edge(edge)?;
            }
            if !changed {
                return Ok(());
            }
        }
    }

    /// Pushes the propagated part of the source set through an edge added after
    /// the source was processed. The diff part follows when the source is popped.
    fn process_new_edge(&mut self, edge: PAGEdgeId) -> PtaResult<()> {
        let (src, dst, kind) = self
            .pag
            .edge(edge)
            .ok_or_else(|| PtaError::malformed(format!("unknown PAG edge {:?}", edge)))?;
        match kind {
            PAGEdgeKind::Alloc => {
                if self.pt_data.add_pts(dst, src) {
                    self.worklist.insert(dst);
                }
            }
            PAGEdgeKind::Simple => {
                if let Some(old) = self.pt_data.get_propa_pts(src).cloned() {
                    if self.pt_data.union_pts_to(dst, &old) {
                        self.worklist.insert(dst);
                    }
                }
            }
            PAGEdgeKind::Load => {
                let (base, field) = self.field_ref_parts(src)?;
                for heap in self.old_pts(base) {
                    if self.pag.is_empty_array(heap) {
                        continue;
                    }
                    let slot = self.pag.make_context_field_node(heap, field);
                    self.pag.add_edge(slot, dst)?;
                }
            }
            PAGEdgeKind::Store => {
                let (base, field) = self.field_ref_parts(dst)?;
                for heap in self.old_pts(base) {
                    if self.pag.is_empty_array(heap) {
                        continue;
                    }
                    let slot = self.pag.make_context_field_node(heap, field);
                    self.pag.add_edge(src, slot)?;
                }
            }
        }
        Ok(())
    }

    fn field_ref_parts(&self, field_ref: NodeId) -> PtaResult<(NodeId, FieldSig)> {
        self.pag.field_ref_parts(field_ref).ok_or_else(|| {
            PtaError::malformed(format!("{:?} is not a field reference", self.pag.node(field_ref)))
        })
    }

    fn old_pts(&self, node: NodeId) -> Vec<NodeId> {
        self.pt_data
            .get_propa_pts(node)
            .map(|pts| pts.iter().collect())
            .unwrap_or_default()
    }

    /// Connects every store into and load from `base.f` to the field slots of
    /// the objects newly pointed to by `base`.
    fn handle_load_and_store(&mut self, base: NodeId, heaps: &[NodeId]) -> PtaResult<()> {
        for field_ref in self.pag.field_refs_of(base) {
            let (_, field) = self.field_ref_parts(field_ref)?;
            let stores = self.pag.store_inv_lookup(field_ref);
            let loads = self.pag.load_lookup(field_ref);
            for heap in heaps {
                // The empty array object has no elements to read or write.
                if self.pag.is_empty_array(*heap) {
                    continue;
                }
                let slot = self.pag.make_context_field_node(*heap, field);
                for src in &stores {
                    self.pag.add_edge(*src, slot)?;
                }
                for dst in &loads {
                    self.pag.add_edge(slot, *dst)?;
                }
            }
        }
        Ok(())
    }

    fn handle_virtual_calls(&mut self, receiver: NodeId, heaps: &[NodeId]) -> PtaResult<()> {
        if !self.cgb.has_virtual_call_sites(receiver) {
            return Ok(());
        }
        for site in self.cgb.virtual_call_sites_of(receiver) {
            self.dispatch_virtual_call(&site, heaps)?;
        }
        Ok(())
    }

    fn dispatch_virtual_call(&mut self, site: &VirtualCallSite, heaps: &[NodeId]) -> PtaResult<()> {
        for heap in heaps {
            self.cgb
                .virtual_call_dispatch(self.program, &mut *self.pag, &mut *self.strategy, *heap, site)?;
        }
        Ok(())
    }

    fn handle_throw_sites(&mut self, throw_node: NodeId, heaps: &[NodeId]) -> PtaResult<()> {
        if !self.eh.has_throw_sites(throw_node) {
            return Ok(());
        }
        for site in self.eh.throw_sites_lookup(throw_node) {
            self.dispatch_exception(&site, heaps)?;
        }
        Ok(())
    }

    fn dispatch_exception(&mut self, site: &ExceptionThrowSite, heaps: &[NodeId]) -> PtaResult<()> {
        if heaps.is_empty() {
            return Ok(());
        }
        let delivered = self.eh.exception_dispatch(self.program, &mut *self.pag, heaps, site)?;
        for (dst, heap) in delivered {
            if self.pt_data.add_pts(dst, heap) {
                self.worklist.insert(dst);
            }
        }
        Ok(())
    }

    fn process_reach_methods(&mut self) -> PtaResult<()> {
        while let Some(method) = self.reach_methods_reader.next_copied(self.cgb.reach_methods()) {
            self.process_stmts(method)?;
        }
        Ok(())
    }

    /// Materializes the constraint template of a method under its context.
    fn process_stmts(&mut self, method: CSMethodId) -> PtaResult<()> {
        let program = self.program;
        if program.method(method.method).is_phantom() {
            return Ok(());
        }
        if !self.pag.mark_materialized(method.method, method.cid) {
            return Ok(());
        }
        debug!(
            "Processing method {}, context: {:?}",
            program.method_name(method.method),
            method.cid
        );
        let mpag = self.pag.get_method_pag(program, method.method)?;

        for (src, dst) in mpag.internal_edges() {
            let src = self.mk_node(src, method.cid);
            let dst = self.mk_node(dst, method.cid);
            self.pag.add_edge(src, dst)?;
        }

        if self.options.clinit_mode == ClinitMode::OnTheFly {
            for (stmt, clinit) in mpag.clinits() {
                let callsite = CSBaseCallSite::new_implicit(method, *stmt, SiteKind::Clinit);
                let callee = CSMethodId::new(ContextId::EMPTY, *clinit);
                self.cgb.inject_call_edge(callsite, callee, CallKind::Clinit);
            }
        }

        if self.options.handle_finalizers {
            if let Some(register) = program.finalizer_register() {
                for (stmt, heap) in mpag.finalizable_allocs() {
                    self.register_finalizer(method, *stmt, heap, register)?;
                }
            }
        }

        for stmt in mpag.invoke_stmts() {
            let callsite = CSBaseCallSite::new(method, *stmt);
            let (_, expr) = invoke_at(program, BaseCallSite::from(callsite))?;
            if expr.kind.is_instance() {
                let base = expr.base.ok_or_else(|| {
                    PtaError::malformed(format!(
                        "instance invoke at {}#{} has no receiver",
                        program.method_name(method.method),
                        stmt
                    ))
                })?;
                let receiver = self.pag.parameterize(&Path::new_local(method.method, base), method.cid);
                self.cgb
                    .record_virtual_call_site(VirtualCallSite::new(receiver, callsite, expr));
            } else {
                self.cgb
                    .add_static_edge(program, &mut *self.pag, &mut *self.strategy, callsite)?;
            }
        }

        for stmt in mpag.throw_stmts() {
            let throw_path = self.throw_path(method.method, *stmt)?;
            let throw_node = self.pag.parameterize(&throw_path, method.cid);
            self.eh
                .add_throw_site(ExceptionThrowSite::new(throw_node, method, *stmt));
        }
        Ok(())
    }

    /// The variable holding what a statement may throw.
    fn throw_path(&self, method: MethodId, stmt: usize) -> PtaResult<Rc<Path>> {
        let stmt_ref = self
            .program
            .method(method)
            .body
            .as_ref()
            .and_then(|body| body.stmts.get(stmt));
        match stmt_ref {
            Some(Stmt::Throw { op }) => Ok(Path::new_local(method, *op)),
            Some(Stmt::Invoke { .. }) => Ok(Path::new_invoke_throw(method, stmt)),
            _ => Err(PtaError::malformed(format!(
                "{}#{} cannot throw",
                self.program.method_name(method),
                stmt
            ))),
        }
    }

    /// Makes the finalizer register method reachable under the empty context,
    /// with the allocated object bound to its first parameter.
    fn register_finalizer(
        &mut self,
        method: CSMethodId,
        stmt: usize,
        heap: &Rc<Path>,
        register: MethodId,
    ) -> PtaResult<()> {
        let callsite = CSBaseCallSite::new_implicit(method, stmt, SiteKind::Finalize);
        let callee_cid = ContextId::EMPTY;
        let callee = CSMethodId::new(callee_cid, register);
        self.cgb.inject_call_edge(callsite, callee, CallKind::Finalize);
        let param = self
            .program
            .method(register)
            .body
            .as_ref()
            .and_then(|body| body.params.first().copied());
        if let Some(param) = param {
            let heap_node = self.mk_node(heap, method.cid);
            let param_node = self.pag.parameterize(&Path::new_local(register, param), callee_cid);
            self.pag.add_edge(heap_node, param_node)?;
        }
        Ok(())
    }

    /// Qualifies a path of a method analyzed under `cid`. Heap objects are
    /// qualified by the heap context the strategy derives from `cid`.
    fn mk_node(&mut self, path: &Rc<Path>, cid: ContextId) -> NodeId {
        if path.is_heap() {
            let heap_cid = self.strategy.new_heap_context(cid, path);
            self.pag.parameterize(path, heap_cid)
        } else {
            self.pag.parameterize(path, cid)
        }
    }
}
