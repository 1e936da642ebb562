// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashSet;
use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;
use std::time::Instant;

use log::*;

use super::context_strategy::{ContextInsensitive, ContextStrategy, KCallSiteSensitive, KObjectSensitive};
use super::solver::Solver;
use super::{DiffPTDataTy, NodeId, PointerAnalysis, PointsTo};
use crate::builder::call_graph_builder::CallGraphBuilder;
use crate::builder::exception_handler::ExceptionHandler;
use crate::errors::PtaResult;
use crate::graph::call_graph::CSCallGraph;
use crate::graph::pag::{PAGNode, PAG};
use crate::ir::call_site::CSMethodId;
use crate::ir::context::{Context, ContextId};
use crate::ir::path::Path;
use crate::ir::program::{FieldId, LocalId, MethodId, Program};
use crate::pts_set::points_to::PointsToSet;
use crate::util::options::{AnalysisOptions, ClinitMode};
use crate::util::pta_statistics::ContextSensitiveStat;
use crate::util::results_dumper;

pub type ContextInsensitivePTA<'pta> = ContextSensitivePTA<'pta, ContextInsensitive>;
pub type CallSiteSensitivePTA<'pta> = ContextSensitivePTA<'pta, KCallSiteSensitive>;
pub type ObjectSensitivePTA<'pta> = ContextSensitivePTA<'pta, KObjectSensitive>;

/// One analysis run over a program: owns the PAG, the points-to data, the
/// call graph and the context policy.
pub struct ContextSensitivePTA<'pta, S: ContextStrategy> {
    pub(crate) program: &'pta Program,
    pub(crate) options: AnalysisOptions,
    /// Points-to data
    pub(crate) pt_data: DiffPTDataTy,
    /// Pointer Assignment Graph
    pub(crate) pag: PAG,
    pub(crate) cgb: CallGraphBuilder,
    pub(crate) eh: ExceptionHandler,
    pub(crate) ctx_strategy: S,
}

impl<'pta, S: ContextStrategy> Debug for ContextSensitivePTA<'pta, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        "ContextSensitivePTA".fmt(f)
    }
}

/// Constructor
impl<'pta, S: ContextStrategy> ContextSensitivePTA<'pta, S> {
    pub fn new(program: &'pta Program, options: AnalysisOptions, ctx_strategy: S) -> Self {
        let cgb = CallGraphBuilder::new(options.ignore_resolution_errors);
        ContextSensitivePTA {
            program,
            options,
            pt_data: DiffPTDataTy::new(),
            pag: PAG::new(),
            cgb,
            eh: ExceptionHandler::new(),
            ctx_strategy,
        }
    }

    /// Makes the entry points reachable under the empty context, together
    /// with every static initializer in full clinit mode.
    pub fn initialize(&mut self) {
        let empty_cid = self.ctx_strategy.empty_context_id();
        for entry in self.program.entry_points() {
            self.cgb.add_reachable(CSMethodId::new(empty_cid, *entry));
        }
        if self.options.clinit_mode == ClinitMode::Full {
            for clinit in self.program.all_clinits() {
                self.cgb.add_reachable(CSMethodId::new(empty_cid, clinit));
            }
        }
    }

    /// Solves the constraints to a fixpoint.
    pub fn propagate(&mut self) -> PtaResult<()> {
        let mut solver = Solver::new(
            self.program,
            &self.options,
            &mut self.pag,
            &mut self.pt_data,
            &mut self.cgb,
            &mut self.eh,
            &mut self.ctx_strategy,
        );
        solver.propagate()
    }

    /// Returns a solver over this run, for driving the propagation step by step.
    pub fn solver(&mut self) -> Solver<'_, S> {
        Solver::new(
            self.program,
            &self.options,
            &mut self.pag,
            &mut self.pt_data,
            &mut self.cgb,
            &mut self.eh,
            &mut self.ctx_strategy,
        )
    }

    #[inline]
    pub fn program(&self) -> &Program {
        self.program
    }

    #[inline]
    pub fn pag(&self) -> &PAG {
        &self.pag
    }

    #[inline]
    pub fn get_pt_data(&self) -> &DiffPTDataTy {
        &self.pt_data
    }

    #[inline]
    pub fn call_graph(&self) -> &CSCallGraph {
        &self.cgb.call_graph
    }

    #[inline]
    pub fn get_context_by_id(&self, context_id: ContextId) -> Option<Rc<Context<S::E>>> {
        self.ctx_strategy.get_context_by_id(context_id)
    }

    #[inline]
    pub fn num_contexts(&self) -> usize {
        self.ctx_strategy.num_contexts()
    }

    /// The points-to set of a qualified node.
    pub fn points_to(&self, node: NodeId) -> PointsTo<NodeId> {
        self.pt_data.get_pts(node)
    }

    /// Objects a local variable may point to, merged over all contexts of its method.
    pub fn pts_of_local(&self, method: MethodId, local: LocalId) -> HashSet<Rc<Path>> {
        self.pts_of_method_var(method, &Path::new_local(method, local))
    }

    /// Objects a variable of `method` (a local, its return value or its
    /// throw variables) may point to, merged over all contexts of the method.
    pub fn pts_of_method_var(&self, method: MethodId, path: &Rc<Path>) -> HashSet<Rc<Path>> {
        self.pag
            .materialized_contexts(method)
            .into_iter()
            .flat_map(|cid| self.pts_of_path(path, cid))
            .collect()
    }

    pub fn pts_of_static_field(&self, field: FieldId) -> HashSet<Rc<Path>> {
        self.pts_of_path(&Path::new_static_field(field), ContextId::EMPTY)
    }

    /// Objects the variable `path` qualified by `cid` may point to.
    pub fn pts_of_path(&self, path: &Rc<Path>, cid: ContextId) -> HashSet<Rc<Path>> {
        let node = PAGNode::Var { cid, path: path.clone() };
        match self.pag.get_node_id(&node) {
            Some(node_id) => self
                .pt_data
                .get_pts(node_id)
                .iter()
                .filter_map(|heap| self.pag.node(heap).path().cloned())
                .collect(),
            None => HashSet::new(),
        }
    }

    /// Methods called by an invoke statement, merged over all contexts.
    pub fn callees_of(&self, method: MethodId, stmt: usize) -> HashSet<MethodId> {
        self.cgb.callees_of(method, stmt)
    }

    pub fn reachable_methods(&self) -> HashSet<MethodId> {
        self.cgb.call_graph.methods()
    }

    /// Contexts a method has been reached in.
    pub fn contexts_of(&self, method: MethodId) -> Vec<ContextId> {
        self.cgb.contexts_of(method)
    }

    #[inline]
    pub fn num_call_edges(&self) -> usize {
        self.cgb.call_graph.edge_count()
    }
}

impl<'pta, S: ContextStrategy> PointerAnalysis for ContextSensitivePTA<'pta, S> {
    fn analyze(&mut self) -> PtaResult<()> {
        let now = Instant::now();

        // Initialization for the analysis.
        self.initialize();

        // Solve the worklist problem.
        self.propagate()?;

        let elapsed = now.elapsed();
        info!("Context-sensitive PTA completed.");
        info!("Analysis time: {}", humantime::format_duration(elapsed));
        Ok(())
    }

    /// Dump call graph, points-to results and statistics.
    fn finalize(&self) -> PtaResult<()> {
        results_dumper::dump_results(self.program, &self.options, &self.cgb.call_graph, &self.pt_data, &self.pag)?;
        if self.options.dump_stats {
            ContextSensitiveStat::new(self).dump_stats()?;
        }
        Ok(())
    }
}
