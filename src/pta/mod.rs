// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use log::*;

use self::context_sensitive::ContextSensitivePTA;
use self::context_strategy::{ContextInsensitive, KCallSiteSensitive, KObjectSensitive};
use crate::errors::PtaResult;
use crate::graph::pag::*;
use crate::ir::program::Program;
use crate::pts_set::points_to::HybridPointsToSet;
use crate::pts_set::pt_data::DiffPTData;
use crate::util::options::AnalysisOptions;

pub mod context_sensitive;
pub mod context_strategy;
pub mod solver;

#[cfg(test)]
mod tests;

pub type NodeId = PAGNodeId;
pub type EdgeId = PAGEdgeId;
pub type PointsTo<T> = HybridPointsToSet<T>;
pub type DiffPTDataTy = DiffPTData<NodeId, NodeId, PointsTo<NodeId>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PTAType {
    ContextInsensitive,
    CallSiteSensitive,
    ObjectSensitive,
}

pub trait PointerAnalysis {
    /// Runs the analysis to a fixpoint.
    fn analyze(&mut self) -> PtaResult<()>;

    /// Dumps the results requested by the options.
    fn finalize(&self) -> PtaResult<()>;
}

/// Runs the analysis selected by `options` on `program` and dumps its results.
pub fn run_pointer_analysis(program: &Program, options: &AnalysisOptions) -> PtaResult<()> {
    let depth = options.context_depth as usize;
    let mut pta: Box<dyn PointerAnalysis + '_> = match options.pta_type {
        PTAType::ContextInsensitive => Box::new(ContextSensitivePTA::new(
            program,
            options.clone(),
            ContextInsensitive::new(),
        )),
        PTAType::CallSiteSensitive => Box::new(ContextSensitivePTA::new(
            program,
            options.clone(),
            KCallSiteSensitive::new(depth),
        )),
        PTAType::ObjectSensitive => Box::new(ContextSensitivePTA::new(
            program,
            options.clone(),
            KObjectSensitive::new(depth),
        )),
    };
    debug!("Running {:?} pointer analysis", options.pta_type);
    pta.analyze()?;
    pta.finalize()
}
