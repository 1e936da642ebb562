// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! This module provides essential functions for resolving call targets and
//! connecting callers to callees on the fly.

use itertools::Itertools;
use log::*;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::errors::{PtaError, PtaResult};
use crate::graph::call_graph::CSCallGraph;
use crate::graph::pag::{PAGNode, PAGNodeId, PAG};
use crate::ir::call_site::{BaseCallSite, CSBaseCallSite, CSMethodId, CallKind, VirtualCallSite};
use crate::ir::context::ContextId;
use crate::ir::path::Path;
use crate::ir::program::{Dispatch, InvokeExpr, InvokeKind, LocalId, MethodId, Program, Stmt};
use crate::pta::context_strategy::ContextStrategy;
use crate::util::chunked_queue::{ChunkedQueue, QueueReader};

/// Returns the invoke statement at `callsite`.
pub fn invoke_at(program: &Program, callsite: BaseCallSite) -> PtaResult<(Option<LocalId>, &InvokeExpr)> {
    let stmt = program
        .method(callsite.method)
        .body
        .as_ref()
        .and_then(|body| body.stmts.get(callsite.stmt));
    match stmt {
        Some(Stmt::Invoke { lhs, expr }) => Ok((*lhs, expr)),
        _ => Err(PtaError::malformed(format!(
            "{}#{} is not an invoke statement",
            program.method_name(callsite.method),
            callsite.stmt
        ))),
    }
}

/// Builds the context-sensitive call graph while points-to sets grow.
pub struct CallGraphBuilder {
    pub call_graph: CSCallGraph,
    /// Virtual call sites keyed by their receiver node.
    receiver_to_sites: HashMap<PAGNodeId, HashSet<Rc<VirtualCallSite>>>,
    /// Every virtual call site in registration order.
    virtual_call_site_queue: ChunkedQueue<Rc<VirtualCallSite>>,
    ignore_resolution_errors: bool,
}

impl CallGraphBuilder {
    pub fn new(ignore_resolution_errors: bool) -> Self {
        CallGraphBuilder {
            call_graph: CSCallGraph::new(),
            receiver_to_sites: HashMap::new(),
            virtual_call_site_queue: ChunkedQueue::new(),
            ignore_resolution_errors,
        }
    }

    /// Makes `method` reachable without a caller, e.g. an entry point.
    pub fn add_reachable(&mut self, method: CSMethodId) -> bool {
        self.call_graph.add_node(method)
    }

    #[inline]
    pub fn reach_methods(&self) -> &ChunkedQueue<CSMethodId> {
        self.call_graph.reach_funcs()
    }

    #[inline]
    pub fn reach_methods_reader(&self) -> QueueReader {
        self.call_graph.reach_funcs_reader()
    }

    #[inline]
    pub fn virtual_call_sites(&self) -> &ChunkedQueue<Rc<VirtualCallSite>> {
        &self.virtual_call_site_queue
    }

    #[inline]
    pub fn virtual_call_sites_reader(&self) -> QueueReader {
        self.virtual_call_site_queue.reader()
    }

    /// Registers a virtual call site on its receiver.
    /// Returns false if the site was already registered.
    pub fn record_virtual_call_site(&mut self, site: VirtualCallSite) -> bool {
        let site = Rc::new(site);
        if self
            .receiver_to_sites
            .entry(site.receiver)
            .or_default()
            .insert(site.clone())
        {
            self.virtual_call_site_queue.push(site);
            true
        } else {
            false
        }
    }

    /// Virtual call sites whose receiver is `receiver`.
    pub fn virtual_call_sites_of(&self, receiver: PAGNodeId) -> Vec<Rc<VirtualCallSite>> {
        self.receiver_to_sites
            .get(&receiver)
            .map(|sites| sites.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[inline]
    pub fn has_virtual_call_sites(&self, receiver: PAGNodeId) -> bool {
        self.receiver_to_sites.contains_key(&receiver)
    }

    /// Fails in strict mode, logs and skips the call otherwise.
    fn unresolved(&self, program: &Program, callsite: BaseCallSite, expr: &InvokeExpr) -> PtaResult<()> {
        if self.ignore_resolution_errors {
            warn!(
                "Skipping unresolved call {}: {} at {}#{}",
                program.class(expr.class).name,
                expr.sub_signature,
                program.method_name(callsite.method),
                callsite.stmt
            );
            Ok(())
        } else {
            Err(PtaError::UnresolvedCall {
                method: program.method_name(callsite.method),
                stmt: callsite.stmt,
                class: program.class(expr.class).name.clone(),
                sub_signature: expr.sub_signature.clone(),
            })
        }
    }

    /// Dispatches `site` on the abstract object `heap`: resolves the target
    /// against the object's runtime type, binds the object to the callee's
    /// `this` and connects arguments, return value and exceptions when the
    /// call edge is new.
    pub fn virtual_call_dispatch<S: ContextStrategy>(
        &mut self,
        program: &Program,
        pag: &mut PAG,
        strategy: &mut S,
        heap: PAGNodeId,
        site: &VirtualCallSite,
    ) -> PtaResult<()> {
        let (heap_path, heap_cid) = match pag.node(heap) {
            PAGNode::Alloc { cid, path } => (path.clone(), *cid),
            node => {
                return Err(PtaError::malformed(format!(
                    "receiver points to a non-object node {:?}",
                    node
                )))
            }
        };
        let callsite = BaseCallSite::from(site.callsite);
        let (_, expr) = invoke_at(program, callsite)?;
        let heap_type = match heap_path.heap_type(program) {
            Some(ty) => ty,
            None => return self.unresolved(program, callsite, expr),
        };
        let target = match program.resolve_instance_call(&heap_type, expr) {
            Dispatch::Target(target) => target,
            Dispatch::Incompatible => return Ok(()),
            Dispatch::Unresolved => return self.unresolved(program, callsite, expr),
        };

        let caller = site.callsite.method;
        let callee_cid = strategy.new_instance_call_context(caller.cid, &callsite, &heap_path, heap_cid);
        let callee = CSMethodId::new(callee_cid, target);
        // Only this object flows into `this`, even when the call edge already exists.
        if let Some(this) = program.method(target).body.as_ref().and_then(|body| body.this_local) {
            let this_node = pag.parameterize(&Path::new_local(target, this), callee_cid);
            pag.add_edge(heap, this_node)?;
        }
        self.add_call_edge(program, pag, site.callsite, callee, CallKind::from(site.kind))
    }

    /// Resolves a call with no receiver points-to set. Dynamic invocations
    /// are left without callees: their declared class names a bootstrap
    /// target, not the method that runs.
    pub fn add_static_edge<S: ContextStrategy>(
        &mut self,
        program: &Program,
        pag: &mut PAG,
        strategy: &mut S,
        callsite: CSBaseCallSite,
    ) -> PtaResult<()> {
        let base_callsite = BaseCallSite::from(callsite);
        let (_, expr) = invoke_at(program, base_callsite)?;
        if expr.kind == InvokeKind::Dynamic {
            debug!(
                "Skipping dynamic call {} at {}#{}",
                expr.sub_signature,
                program.method_name(base_callsite.method),
                base_callsite.stmt
            );
            return Ok(());
        }
        let target = match program.resolve_static(expr.class, &expr.sub_signature) {
            Some(target) => target,
            None => return self.unresolved(program, base_callsite, expr),
        };
        let callee_cid = strategy.new_static_call_context(callsite.method.cid, &base_callsite);
        let kind = CallKind::from(expr.kind);
        self.add_call_edge(program, pag, callsite, CSMethodId::new(callee_cid, target), kind)
    }

    /// Adds a call edge with no argument passing, e.g. to a static initializer.
    /// Returns false if the edge already existed.
    pub fn inject_call_edge(
        &mut self,
        callsite: CSBaseCallSite,
        callee: CSMethodId,
        kind: CallKind,
    ) -> bool {
        self.call_graph.add_edge(callsite, callsite.method, callee, kind)
    }

    /// Adds the call edge and, when it is new, the inter-procedural PAG edges.
    fn add_call_edge(
        &mut self,
        program: &Program,
        pag: &mut PAG,
        callsite: CSBaseCallSite,
        callee: CSMethodId,
        kind: CallKind,
    ) -> PtaResult<()> {
        if !self.call_graph.add_edge(callsite, callsite.method, callee, kind) {
            return Ok(());
        }
        trace!(
            "New call edge {}#{} -> {}",
            program.method_name(callsite.method.method),
            callsite.stmt,
            program.method_name(callee.method)
        );
        let callee_body = match &program.method(callee.method).body {
            Some(body) => body,
            // Phantom callees get an edge but have nothing to connect.
            None => return Ok(()),
        };
        let caller = callsite.method;
        let (lhs, expr) = invoke_at(program, BaseCallSite::from(callsite))?;

        for (arg, param) in expr.args.iter().zip(callee_body.params.iter()) {
            let arg = pag.parameterize(&Path::new_local(caller.method, *arg), caller.cid);
            let param = pag.parameterize(&Path::new_local(callee.method, *param), callee.cid);
            pag.add_edge(arg, param)?;
        }
        if let Some(lhs) = lhs {
            let ret = pag.parameterize(&Path::new_return_value(callee.method), callee.cid);
            let dst = pag.parameterize(&Path::new_local(caller.method, lhs), caller.cid);
            pag.add_edge(ret, dst)?;
        }
        let method_throw = pag.parameterize(&Path::new_method_throw(callee.method), callee.cid);
        let invoke_throw = pag.parameterize(
            &Path::new_invoke_throw(caller.method, callsite.stmt),
            caller.cid,
        );
        pag.add_edge(method_throw, invoke_throw)?;
        Ok(())
    }

    /// The callees of an invoke statement, merged over all contexts.
    /// Implicit calls triggered by the statement are not included.
    pub fn callees_of(&self, method: MethodId, stmt: usize) -> HashSet<MethodId> {
        self.call_graph
            .edges()
            .filter(|(caller, callsite, _, _)| {
                caller.method == method && callsite.stmt == stmt && callsite.is_invoke()
            })
            .map(|(_, _, callee, _)| callee.method)
            .collect()
    }

    /// The contexts a method has become reachable in.
    pub fn contexts_of(&self, method: MethodId) -> Vec<ContextId> {
        self.call_graph
            .func_nodes
            .keys()
            .filter(|func| func.method == method)
            .map(|func| func.cid)
            .sorted()
            .collect_vec()
    }
}
