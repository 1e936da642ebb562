// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use log::*;
use std::collections::{HashMap, HashSet};
use std::io::{BufWriter, Write};
use std::rc::Rc;

use crate::errors::PtaResult;
use crate::graph::call_graph::CSCallGraph;
use crate::graph::pag::{PAGNode, PAGNodeId, PAG};
use crate::ir::call_site::{BaseCallSite, CallKind};
use crate::ir::path::Path;
use crate::pta::context_sensitive::ContextSensitivePTA;
use crate::pta::context_strategy::ContextStrategy;
use crate::pta::DiffPTDataTy;
use crate::pts_set::points_to::PointsToSet;

const SEPARATOR: &str = "##########################################################";
const SUB_SEPARATOR: &str = "----------------------------------------------------------";

/// Pointer count and points-to relation count of one projection of the results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PointsToStat {
    pub num_pointers: usize,
    pub num_pts_relations: usize,
}

impl PointsToStat {
    pub fn avg_pts_size(&self) -> f64 {
        if self.num_pointers == 0 {
            0.0
        } else {
            self.num_pts_relations as f64 / self.num_pointers as f64
        }
    }

    fn dump<W: Write>(&self, title: &str, stat_writer: &mut W) -> PtaResult<()> {
        writeln!(stat_writer, "{} Points-to Statistics: ", title)?;
        writeln!(stat_writer, "#Pointers: {}", self.num_pointers)?;
        writeln!(stat_writer, "#Points-to relations: {}", self.num_pts_relations)?;
        writeln!(stat_writer, "#Avg points-to size: {}", self.avg_pts_size())?;
        Ok(())
    }
}

/// A pointer with its contexts dropped.
#[derive(Clone, PartialEq, Eq, Hash)]
enum CIPointer {
    Path(Rc<Path>),
    /// A field slot of every clone of one abstract object.
    Field(Rc<Path>, PAGNodeId),
    Other(PAGNodeId),
}

fn ci_pointer(pag: &PAG, node: PAGNodeId) -> CIPointer {
    match pag.node(node) {
        PAGNode::Var { path, .. } | PAGNode::Alloc { path, .. } => CIPointer::Path(path.clone()),
        PAGNode::ContextField { heap, field_val } => match pag.node(*heap).path() {
            Some(path) => CIPointer::Field(path.clone(), *field_val),
            None => CIPointer::Other(node),
        },
        _ => CIPointer::Other(node),
    }
}

/// Counts the context-sensitive results and their context-insensitive projection.
pub fn pts_stat(pt_data: &DiffPTDataTy, pag: &PAG) -> (PointsToStat, PointsToStat) {
    let mut cs_stat = PointsToStat::default();
    let mut ci_pts_map: HashMap<CIPointer, HashSet<CIPointer>> = HashMap::new();
    for node in pt_data.keys() {
        let pts = pt_data.get_pts(node);
        cs_stat.num_pointers += 1;
        cs_stat.num_pts_relations += pts.count();

        let ci_pts = ci_pts_map.entry(ci_pointer(pag, node)).or_default();
        for pointee in pts.iter() {
            ci_pts.insert(ci_pointer(pag, pointee));
        }
    }
    let ci_stat = PointsToStat {
        num_pointers: ci_pts_map.len(),
        num_pts_relations: ci_pts_map.values().map(|pts| pts.len()).sum(),
    };
    (cs_stat, ci_stat)
}

/// Call graph edge and call site counts for one kind of call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallKindStat {
    pub num_call_sites: usize,
    pub num_call_edges: usize,
}

pub fn call_kind_stat(call_graph: &CSCallGraph) -> HashMap<CallKind, CallKindStat> {
    let mut sites: HashMap<CallKind, HashSet<BaseCallSite>> = HashMap::new();
    let mut stats: HashMap<CallKind, CallKindStat> = HashMap::new();
    for (_caller, callsite, _callee, kind) in call_graph.edges() {
        stats.entry(kind).or_default().num_call_edges += 1;
        sites.entry(kind).or_default().insert(callsite.into());
    }
    for (kind, sites) in sites {
        stats.entry(kind).or_default().num_call_sites = sites.len();
    }
    stats
}

pub struct ContextSensitiveStat<'a, 'pta, S: ContextStrategy> {
    pta: &'a ContextSensitivePTA<'pta, S>,
}

impl<'a, 'pta, S: ContextStrategy> ContextSensitiveStat<'a, 'pta, S> {
    pub fn new(pta: &'a ContextSensitivePTA<'pta, S>) -> Self {
        ContextSensitiveStat { pta }
    }

    pub fn dump_stats(&self) -> PtaResult<()> {
        let mut stat_writer = BufWriter::new(Box::new(std::io::stdout()) as Box<dyn Write>);

        info!("Dumping pta statistics...");
        writeln!(stat_writer, "{}", SEPARATOR)?;
        self.dump_call_graph_stat(&mut stat_writer)?;
        writeln!(stat_writer, "{}", SUB_SEPARATOR)?;
        self.dump_pts_stat(&mut stat_writer)?;
        writeln!(stat_writer, "{}", SEPARATOR)?;
        stat_writer.flush()?;
        Ok(())
    }

    pub fn dump_call_graph_stat<W: Write>(&self, stat_writer: &mut W) -> PtaResult<()> {
        let call_graph = self.pta.call_graph();
        writeln!(stat_writer, "Call Graph Statistics: ")?;
        writeln!(stat_writer, "#Reachable methods (CS): {}", call_graph.reach_funcs().len())?;
        writeln!(stat_writer, "#Reachable methods (CI): {}", self.pta.reachable_methods().len())?;
        writeln!(stat_writer, "#Contexts: {}", self.pta.num_contexts())?;
        writeln!(stat_writer, "#Call graph edges: {}", call_graph.edge_count())?;
        let stats = call_kind_stat(call_graph);
        for kind in [
            CallKind::Static,
            CallKind::Virtual,
            CallKind::Interface,
            CallKind::Special,
            CallKind::Dynamic,
            CallKind::Clinit,
            CallKind::Finalize,
        ] {
            let stat = stats.get(&kind).copied().unwrap_or_default();
            writeln!(
                stat_writer,
                "\t#{:?} calls: {}, #call graph edges: {}",
                kind, stat.num_call_sites, stat.num_call_edges
            )?;
        }
        writeln!(stat_writer, "#Throw sites: {}", self.pta.eh.num_throw_sites())?;
        Ok(())
    }

    pub fn dump_pts_stat<W: Write>(&self, stat_writer: &mut W) -> PtaResult<()> {
        let pag = self.pta.pag();
        writeln!(stat_writer, "#PAG nodes: {}", pag.node_count())?;
        writeln!(stat_writer, "#PAG edges: {}", pag.edge_count())?;
        let (cs_stat, ci_stat) = pts_stat(self.pta.get_pt_data(), pag);
        cs_stat.dump("CS", stat_writer)?;
        ci_stat.dump("CI", stat_writer)?;
        Ok(())
    }
}
